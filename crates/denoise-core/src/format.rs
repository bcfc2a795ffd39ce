//! Pixel formats understood by the runtime.
//!
//! A [`Format`] combines a scalar [`DataFormat`] (half or single precision
//! float) with a channel count of 1 to 4. Filters consume the first three
//! channels of color, albedo, normal and output images, so only formats with
//! at least three channels are usable there.
//!
//! ```rust
//! use denoise_core::format::{DataFormat, Format};
//!
//! assert_eq!(Format::Float3.channels(), 3);
//! assert_eq!(Format::Half4.data_format(), DataFormat::F16);
//! assert_eq!(Format::Half3.byte_size(), 6);
//! ```

/// Scalar storage type of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataFormat {
    /// 16-bit half-precision float.
    F16,
    /// 32-bit single-precision float.
    #[default]
    F32,
}

impl DataFormat {
    /// Number of bytes per channel.
    #[inline]
    pub const fn bytes_per_channel(&self) -> usize {
        match self {
            Self::F16 => 2,
            Self::F32 => 4,
        }
    }

    /// Short name for display.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::F16 => "f16",
            Self::F32 => "f32",
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Pixel format: scalar type plus channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    /// 1 x f32
    Float,
    /// 2 x f32
    Float2,
    /// 3 x f32 (RGB, the common case)
    #[default]
    Float3,
    /// 4 x f32
    Float4,
    /// 1 x f16
    Half,
    /// 2 x f16
    Half2,
    /// 3 x f16
    Half3,
    /// 4 x f16
    Half4,
}

impl Format {
    /// Builds a format from scalar type and channel count (1..=4).
    pub const fn from_parts(data: DataFormat, channels: usize) -> Option<Self> {
        match (data, channels) {
            (DataFormat::F32, 1) => Some(Self::Float),
            (DataFormat::F32, 2) => Some(Self::Float2),
            (DataFormat::F32, 3) => Some(Self::Float3),
            (DataFormat::F32, 4) => Some(Self::Float4),
            (DataFormat::F16, 1) => Some(Self::Half),
            (DataFormat::F16, 2) => Some(Self::Half2),
            (DataFormat::F16, 3) => Some(Self::Half3),
            (DataFormat::F16, 4) => Some(Self::Half4),
            _ => None,
        }
    }

    /// Scalar storage type.
    #[inline]
    pub const fn data_format(&self) -> DataFormat {
        match self {
            Self::Float | Self::Float2 | Self::Float3 | Self::Float4 => DataFormat::F32,
            Self::Half | Self::Half2 | Self::Half3 | Self::Half4 => DataFormat::F16,
        }
    }

    /// Number of channels.
    #[inline]
    pub const fn channels(&self) -> usize {
        match self {
            Self::Float | Self::Half => 1,
            Self::Float2 | Self::Half2 => 2,
            Self::Float3 | Self::Half3 => 3,
            Self::Float4 | Self::Half4 => 4,
        }
    }

    /// Size of one pixel in bytes.
    #[inline]
    pub const fn byte_size(&self) -> usize {
        self.channels() * self.data_format().bytes_per_channel()
    }

    /// Whether the format carries an RGB triple.
    #[inline]
    pub const fn has_rgb(&self) -> bool {
        self.channels() >= 3
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.data_format(), self.channels())
    }
}
