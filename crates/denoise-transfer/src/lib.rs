//! # denoise-transfer
//!
//! Transfer functions between image values and a network's working space.
//!
//! The denoising networks are trained on encoded, bounded values. Before a
//! tile is packed into the input tensor its color is scaled by the input
//! scale, clamped to the curve's valid range and encoded with
//! [`TransferFunction::forward`]. The network output goes back through
//! [`TransferFunction::inverse`], which decodes, clamps and undoes the scale.
//!
//! | Constructor | Curve | Valid range | Used by |
//! |---|---|---|---|
//! | [`TransferFunction::hdr`] | [`pu`] | [0, 65504] | RT filter, `hdr = true` |
//! | [`TransferFunction::ldr`] | [`srgb`] | [0, 1] | RT filter, linear LDR |
//! | [`TransferFunction::linear_ldr`] | identity | [0, 1] | RT filter, `srgb = true` |
//! | [`TransferFunction::log`] | [`log`] | [0, 65504] | lightmap filter |
//! | [`TransferFunction::directional`] | identity | unbounded | lightmap filter, `directional = true` |
//!
//! # Usage
//!
//! ```rust
//! use denoise_transfer::TransferFunction;
//!
//! let tf = TransferFunction::hdr().with_input_scale(2.0);
//! let x = tf.forward(0.5);
//! let y = tf.inverse(x);
//! assert!((y - 0.5).abs() < 1e-4);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod autoexposure;
pub mod log;
pub mod pu;
pub mod srgb;

pub use autoexposure::{autoexposure, luminance};

/// Largest finite half-float value; upper bound of HDR input.
pub const HDR_Y_MAX: f32 = 65504.0;

/// Encoding curve applied after scaling and clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    /// Identity.
    Linear,
    /// sRGB OETF / EOTF.
    Srgb,
    /// Perceptually uniform HDR encoding.
    Pu,
    /// Normalized logarithm.
    Log,
}

impl Curve {
    /// Encodes a clamped, scaled value.
    #[inline]
    pub fn forward(self, y: f32) -> f32 {
        match self {
            Self::Linear => y,
            Self::Srgb => srgb::oetf(y),
            Self::Pu => pu::forward(y),
            Self::Log => log::forward(y),
        }
    }

    /// Decodes a network output value.
    #[inline]
    pub fn inverse(self, x: f32) -> f32 {
        match self {
            Self::Linear => x,
            Self::Srgb => srgb::eotf(x),
            Self::Pu => pu::inverse(x),
            Self::Log => log::inverse(x),
        }
    }

    /// Short name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Srgb => "srgb",
            Self::Pu => "pu",
            Self::Log => "log",
        }
    }
}

/// Color transform for one filter execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferFunction {
    curve: Curve,
    range: Option<(f32, f32)>,
    input_scale: f32,
}

impl TransferFunction {
    /// PU curve for HDR color in [0, HDR_Y_MAX].
    pub const fn hdr() -> Self {
        Self::new(Curve::Pu, Some((0.0, HDR_Y_MAX)))
    }

    /// sRGB curve for linear LDR color in [0, 1].
    pub const fn ldr() -> Self {
        Self::new(Curve::Srgb, Some((0.0, 1.0)))
    }

    /// Identity for LDR color that is already sRGB encoded.
    pub const fn linear_ldr() -> Self {
        Self::new(Curve::Linear, Some((0.0, 1.0)))
    }

    /// Log curve for HDR lightmaps.
    pub const fn log() -> Self {
        Self::new(Curve::Log, Some((0.0, HDR_Y_MAX)))
    }

    /// Identity without clamping, for signed directional lightmap coefficients.
    pub const fn directional() -> Self {
        Self::new(Curve::Linear, None)
    }

    const fn new(curve: Curve, range: Option<(f32, f32)>) -> Self {
        Self {
            curve,
            range,
            input_scale: 1.0,
        }
    }

    /// Returns a copy using `scale` as the input scale.
    pub fn with_input_scale(mut self, scale: f32) -> Self {
        self.input_scale = scale;
        self
    }

    /// Encoding curve.
    #[inline]
    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Valid input range after scaling, if clamped.
    #[inline]
    pub fn range(&self) -> Option<(f32, f32)> {
        self.range
    }

    /// Multiplier applied to values before encoding.
    #[inline]
    pub fn input_scale(&self) -> f32 {
        self.input_scale
    }

    /// Whether the curve covers HDR values.
    #[inline]
    pub fn is_hdr(&self) -> bool {
        matches!(self.curve, Curve::Pu | Curve::Log)
    }

    /// Image value to network value.
    #[inline]
    pub fn forward(&self, y: f32) -> f32 {
        self.curve.forward(self.clamp(y * self.input_scale))
    }

    /// Network value to image value.
    #[inline]
    pub fn inverse(&self, x: f32) -> f32 {
        self.clamp(self.curve.inverse(x)) / self.input_scale
    }

    #[inline]
    fn clamp(&self, v: f32) -> f32 {
        match self.range {
            Some((lo, hi)) => v.clamp(lo, hi),
            None => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hdr_roundtrip_with_scale() {
        let tf = TransferFunction::hdr().with_input_scale(0.25);
        for &y in &[0.0, 0.01, 1.0, 37.5, 1000.0] {
            assert_relative_eq!(tf.inverse(tf.forward(y)), y, max_relative = 1e-4, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_hdr_clamps_negative_and_huge() {
        let tf = TransferFunction::hdr();
        assert_eq!(tf.forward(-5.0), 0.0);
        assert_relative_eq!(tf.forward(1e9), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_ldr_clamps_to_unit_range() {
        let tf = TransferFunction::ldr();
        assert_relative_eq!(tf.forward(2.0), 1.0, epsilon = 1e-6);
        assert_eq!(tf.forward(-0.5), 0.0);
        assert_relative_eq!(tf.inverse(1.5), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_linear_ldr_is_identity_inside_range() {
        let tf = TransferFunction::linear_ldr();
        assert_eq!(tf.forward(0.3), 0.3);
        assert_eq!(tf.inverse(0.7), 0.7);
    }

    #[test]
    fn test_directional_is_unclamped() {
        let tf = TransferFunction::directional();
        assert_eq!(tf.forward(-0.75), -0.75);
        assert_eq!(tf.inverse(3.0), 3.0);
        assert!(!tf.is_hdr());
    }

    #[test]
    fn test_log_curve() {
        let tf = TransferFunction::log();
        assert!(tf.is_hdr());
        assert_relative_eq!(tf.inverse(tf.forward(12.0)), 12.0, max_relative = 1e-4);
    }
}
