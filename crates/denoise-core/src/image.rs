//! Shared pixel buffers and image views.
//!
//! An [`Image`] does not own its pixels. It is a view (format, size, offset,
//! strides) into a [`Buffer`], a reference-counted block of bytes guarded by a
//! reader/writer lock. Several images may point into the same buffer, and
//! their byte ranges may overlap: a filter writing its output over its own
//! input is a supported configuration, detected with [`Image::overlaps`].
//!
//! # Memory Layout
//!
//! ```text
//! buffer: [ .. byte_offset .. | px px px .. | pad | px px px .. | pad | ...]
//!                               ^ row 0       ^row_stride
//! ```
//!
//! Pixel `(x, y)` channel `c` lives at
//! `byte_offset + y * row_stride + x * pixel_stride + c * bytes_per_channel`.
//!
//! # Usage
//!
//! ```rust
//! use denoise_core::{Image, Format};
//!
//! let img = Image::alloc(Format::Float3, 4, 2).unwrap();
//! img.write().set3(1, 1, [0.25, 0.5, 1.0]);
//! assert_eq!(img.read().get3(1, 1), [0.25, 0.5, 1.0]);
//!
//! // A second view over the same memory aliases the first one
//! let alias = img.clone();
//! assert!(img.overlaps(&alias));
//! ```

use std::ops::Range;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use half::f16;

use crate::error::{Error, Result};
use crate::format::{DataFormat, Format};

/// Reference-counted pixel memory shared by any number of [`Image`] views.
#[derive(Clone, Default)]
pub struct Buffer {
    bytes: Arc<RwLock<Vec<u8>>>,
    len: usize,
}

impl Buffer {
    /// Allocates a zero-filled buffer of `size` bytes.
    pub fn new(size: usize) -> Result<Self> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| Error::out_of_memory(size, "image buffer"))?;
        bytes.resize(size, 0);
        Ok(Self::from_bytes(bytes))
    }

    /// Wraps existing bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            bytes: Arc::new(RwLock::new(bytes)),
            len,
        }
    }

    /// Copies `f32` samples into a new buffer (native endianness).
    pub fn from_f32(data: &[f32]) -> Self {
        Self::from_bytes(bytemuck::cast_slice(data).to_vec())
    }

    /// Size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the buffer holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether both handles refer to the same memory.
    #[inline]
    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    /// Shared access to the raw bytes.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.bytes.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access to the raw bytes.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.bytes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len)
            .field("ptr", &Arc::as_ptr(&self.bytes))
            .finish()
    }
}

/// A view over pixel memory in a [`Buffer`].
#[derive(Clone)]
pub struct Image {
    buffer: Buffer,
    format: Format,
    width: usize,
    height: usize,
    byte_offset: usize,
    pixel_stride: usize,
    row_stride: usize,
}

impl Image {
    /// Creates a view into `buffer`.
    ///
    /// A stride of `0` means tightly packed (`format.byte_size()` per pixel,
    /// `width * pixel_stride` per row).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if the dimensions are zero, the strides are
    /// smaller than the packed size, or the view does not fit in the buffer.
    pub fn new(
        buffer: Buffer,
        format: Format,
        width: usize,
        height: usize,
        byte_offset: usize,
        pixel_stride: usize,
        row_stride: usize,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_argument(format!(
                "invalid image dimensions {width}x{height}"
            )));
        }

        let pixel_stride = if pixel_stride == 0 { format.byte_size() } else { pixel_stride };
        if pixel_stride < format.byte_size() {
            return Err(Error::invalid_argument(format!(
                "pixel stride {pixel_stride} is less than pixel size {}",
                format.byte_size()
            )));
        }
        let row_stride = if row_stride == 0 { width * pixel_stride } else { row_stride };
        if row_stride < width * pixel_stride {
            return Err(Error::invalid_argument(format!(
                "row stride {row_stride} is less than minimum {} for width {width}",
                width * pixel_stride
            )));
        }

        let image = Self {
            buffer,
            format,
            width,
            height,
            byte_offset,
            pixel_stride,
            row_stride,
        };
        let end = image.byte_range().end;
        if end > image.buffer.len() {
            return Err(Error::invalid_argument(format!(
                "image region ends at byte {end}, buffer holds {}",
                image.buffer.len()
            )));
        }
        Ok(image)
    }

    /// Allocates a new zero-filled, tightly packed image.
    pub fn alloc(format: Format, width: usize, height: usize) -> Result<Self> {
        let size = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(format.byte_size()))
            .ok_or_else(|| Error::invalid_argument(format!("image {width}x{height} is too large")))?;
        Self::new(Buffer::new(size)?, format, width, height, 0, 0, 0)
    }

    /// Creates a packed `Float3` image from interleaved RGB samples.
    pub fn from_rgb(data: &[f32], width: usize, height: usize) -> Result<Self> {
        let expected = width * height * 3;
        if data.len() != expected {
            return Err(Error::invalid_argument(format!(
                "expected {expected} samples for {width}x{height} RGB, got {}",
                data.len()
            )));
        }
        Self::new(Buffer::from_f32(data), Format::Float3, width, height, 0, 0, 0)
    }

    /// Underlying buffer.
    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Pixel format.
    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// (width, height)
    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Offset of pixel (0, 0) in the buffer.
    #[inline]
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Bytes between horizontally adjacent pixels.
    #[inline]
    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }

    /// Bytes between vertically adjacent pixels.
    #[inline]
    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    /// Byte range of the buffer touched by this view.
    pub fn byte_range(&self) -> Range<usize> {
        let last = (self.height - 1) * self.row_stride + (self.width - 1) * self.pixel_stride;
        self.byte_offset..self.byte_offset + last + self.format.byte_size()
    }

    /// Whether the two views share any byte of the same buffer.
    ///
    /// Uses the conservative byte range of each view, so interleaved views
    /// (e.g. two planes sharing a row stride) are reported as overlapping.
    pub fn overlaps(&self, other: &Image) -> bool {
        if !self.buffer.ptr_eq(&other.buffer) {
            return false;
        }
        let a = self.byte_range();
        let b = other.byte_range();
        a.start < b.end && b.start < a.end
    }

    /// Whether both views map every pixel (x, y) to the same bytes.
    ///
    /// Views that merely [`overlap`](Self::overlaps) may place pixel (x, y)
    /// over a different pixel of the other view.
    pub fn same_pixels(&self, other: &Image) -> bool {
        self.buffer.ptr_eq(&other.buffer)
            && self.format == other.format
            && self.byte_offset == other.byte_offset
            && self.pixel_stride == other.pixel_stride
            && self.row_stride == other.row_stride
    }

    /// Locks the buffer for reading.
    pub fn read(&self) -> ImageReader<'_> {
        ImageReader {
            image: self,
            bytes: self.buffer.read(),
        }
    }

    /// Locks the buffer for writing.
    pub fn write(&self) -> ImageWriter<'_> {
        ImageWriter {
            image: self,
            bytes: self.buffer.write(),
        }
    }

    /// Copies the first three channels into interleaved RGB samples.
    pub fn to_rgb_vec(&self) -> Vec<f32> {
        let reader = self.read();
        let mut out = Vec::with_capacity(self.width * self.height * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                out.extend_from_slice(&reader.get3(x, y));
            }
        }
        out
    }

    #[inline]
    fn sample_offset(&self, x: usize, y: usize, c: usize) -> usize {
        self.byte_offset
            + y * self.row_stride
            + x * self.pixel_stride
            + c * self.format.data_format().bytes_per_channel()
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("byte_offset", &self.byte_offset)
            .field("pixel_stride", &self.pixel_stride)
            .field("row_stride", &self.row_stride)
            .finish()
    }
}

/// Read access to an [`Image`], holding the buffer's shared lock.
pub struct ImageReader<'a> {
    image: &'a Image,
    bytes: RwLockReadGuard<'a, Vec<u8>>,
}

impl ImageReader<'_> {
    /// Reads channel `c` of pixel (x, y). Missing channels read as zero.
    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> f32 {
        if c >= self.image.format.channels() {
            return 0.0;
        }
        let o = self.image.sample_offset(x, y, c);
        read_sample(&self.bytes, o, self.image.format.data_format())
    }

    /// Reads the first three channels of pixel (x, y).
    #[inline]
    pub fn get3(&self, x: usize, y: usize) -> [f32; 3] {
        [self.get(x, y, 0), self.get(x, y, 1), self.get(x, y, 2)]
    }
}

/// Write access to an [`Image`], holding the buffer's exclusive lock.
pub struct ImageWriter<'a> {
    image: &'a Image,
    bytes: RwLockWriteGuard<'a, Vec<u8>>,
}

impl ImageWriter<'_> {
    /// Reads channel `c` of pixel (x, y) through the write lock.
    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> f32 {
        if c >= self.image.format.channels() {
            return 0.0;
        }
        let o = self.image.sample_offset(x, y, c);
        read_sample(&self.bytes, o, self.image.format.data_format())
    }

    /// Writes channel `c` of pixel (x, y). Missing channels are ignored.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, c: usize, value: f32) {
        if c >= self.image.format.channels() {
            return;
        }
        let o = self.image.sample_offset(x, y, c);
        write_sample(&mut self.bytes, o, self.image.format.data_format(), value);
    }

    /// Writes the first three channels of pixel (x, y).
    #[inline]
    pub fn set3(&mut self, x: usize, y: usize, rgb: [f32; 3]) {
        for (c, v) in rgb.into_iter().enumerate() {
            self.set(x, y, c, v);
        }
    }
}

#[inline]
fn read_sample(bytes: &[u8], offset: usize, data: DataFormat) -> f32 {
    match data {
        DataFormat::F32 => bytemuck::pod_read_unaligned::<f32>(&bytes[offset..offset + 4]),
        DataFormat::F16 => {
            f16::from_bits(bytemuck::pod_read_unaligned::<u16>(&bytes[offset..offset + 2])).to_f32()
        }
    }
}

#[inline]
fn write_sample(bytes: &mut [u8], offset: usize, data: DataFormat, value: f32) {
    match data {
        DataFormat::F32 => bytes[offset..offset + 4].copy_from_slice(bytemuck::bytes_of(&value)),
        DataFormat::F16 => {
            let bits = f16::from_f32(value).to_bits();
            bytes[offset..offset + 2].copy_from_slice(bytemuck::bytes_of(&bits));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_alloc_and_access() {
        let img = Image::alloc(Format::Float3, 3, 2).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.byte_range(), 0..3 * 2 * 12);

        img.write().set3(2, 1, [1.0, 2.0, 3.0]);
        assert_eq!(img.read().get3(2, 1), [1.0, 2.0, 3.0]);
        assert_eq!(img.read().get3(0, 0), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_half_precision() {
        let img = Image::alloc(Format::Half3, 2, 2).unwrap();
        img.write().set3(1, 0, [0.5, 0.25, 2.0]);
        let px = img.read().get3(1, 0);
        assert_relative_eq!(px[0], 0.5);
        assert_relative_eq!(px[1], 0.25);
        assert_relative_eq!(px[2], 2.0);
    }

    #[test]
    fn test_four_channel_ignores_alpha() {
        let img = Image::alloc(Format::Float4, 1, 1).unwrap();
        img.write().set(0, 0, 3, 0.75);
        img.write().set3(0, 0, [0.1, 0.2, 0.3]);
        assert_eq!(img.read().get(0, 0, 3), 0.75);
    }

    #[test]
    fn test_strided_view() {
        // Two RGB planes interleaved in one buffer: [color px][output px] per pixel
        let buffer = Buffer::new(4 * 4 * 24).unwrap();
        let color = Image::new(buffer.clone(), Format::Float3, 4, 4, 0, 24, 0).unwrap();
        let output = Image::new(buffer.clone(), Format::Float3, 4, 4, 12, 24, 0).unwrap();
        assert!(color.overlaps(&output)); // interleaved ranges intersect

        let top = Image::new(buffer.clone(), Format::Float3, 4, 2, 0, 0, 0).unwrap();
        let bottom = Image::new(buffer, Format::Float3, 4, 2, 4 * 2 * 12, 0, 0).unwrap();
        assert!(!top.overlaps(&bottom));
    }

    #[test]
    fn test_same_pixels_requires_identical_mapping() {
        let buffer = Buffer::new(8 * 10 * 12).unwrap();
        let full = Image::new(buffer.clone(), Format::Float3, 8, 8, 0, 0, 0).unwrap();
        let alias = Image::new(buffer.clone(), Format::Float3, 8, 8, 0, 0, 0).unwrap();
        let shifted = Image::new(buffer, Format::Float3, 8, 8, 2 * 8 * 12, 0, 0).unwrap();

        assert!(full.same_pixels(&alias));
        assert!(full.overlaps(&shifted));
        assert!(!full.same_pixels(&shifted));
        assert!(!full.same_pixels(&Image::alloc(Format::Float3, 8, 8).unwrap()));
    }

    #[test]
    fn test_distinct_buffers_never_overlap() {
        let a = Image::alloc(Format::Float3, 8, 8).unwrap();
        let b = Image::alloc(Format::Float3, 8, 8).unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&a.clone()));
    }

    #[test]
    fn test_invalid_views() {
        let buffer = Buffer::new(100).unwrap();
        assert!(Image::new(buffer.clone(), Format::Float3, 0, 4, 0, 0, 0).is_err());
        assert!(Image::new(buffer.clone(), Format::Float3, 4, 4, 0, 0, 0).is_err());
        assert!(Image::new(buffer.clone(), Format::Float3, 2, 2, 0, 8, 0).is_err());
        assert!(Image::new(buffer, Format::Float3, 2, 2, 0, 0, 0).is_ok());
    }

    #[test]
    fn test_from_rgb() {
        let data = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let img = Image::from_rgb(&data, 2, 1).unwrap();
        assert_eq!(img.to_rgb_vec(), data);
        assert!(Image::from_rgb(&data, 3, 1).is_err());
    }
}
