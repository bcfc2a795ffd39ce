//! Automatic input scale for HDR color.
//!
//! The HDR networks expect scene values roughly centered on middle grey.
//! When the caller leaves the input scale unset, the filter derives one from
//! the color image:
//!
//! 1. Downsample by averaging luminance over ~16x16 pixel blocks (reduces
//!    sensitivity to noise).
//! 2. Average `log2` of the block luminances that exceed a small epsilon.
//! 3. Return `KEY / 2^average`, mapping the log-average to [`KEY`].
//!
//! An image with no block above epsilon (e.g. all black) yields `1.0`.

use denoise_core::Image;
use tracing::debug;

/// Target log-average luminance (middle grey).
pub const KEY: f32 = 0.18;

const EPS: f32 = 1e-8;
const BLOCK: usize = 16;

/// Rec. 709 relative luminance.
#[inline]
pub fn luminance(rgb: [f32; 3]) -> f32 {
    0.212_671 * rgb[0] + 0.715_160 * rgb[1] + 0.072_169 * rgb[2]
}

/// Computes the automatic input scale for `color`.
pub fn autoexposure(color: &Image) -> f32 {
    let (width, height) = color.dimensions();
    let hk = ((height + BLOCK / 2) / BLOCK).max(1);
    let wk = ((width + BLOCK / 2) / BLOCK).max(1);

    let reader = color.read();
    let mut sum = 0.0f64;
    let mut count = 0usize;

    for i in 0..hk {
        let begin_h = i * height / hk;
        let end_h = (i + 1) * height / hk;
        for j in 0..wk {
            let begin_w = j * width / wk;
            let end_w = (j + 1) * width / wk;

            let mut l = 0.0f32;
            for y in begin_h..end_h {
                for x in begin_w..end_w {
                    let rgb = reader.get3(x, y).map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 });
                    l += luminance(rgb);
                }
            }
            l /= ((end_h - begin_h) * (end_w - begin_w)) as f32;

            if l > EPS {
                sum += f64::from(l.log2());
                count += 1;
            }
        }
    }

    let scale = if count > 0 {
        KEY / ((sum / count as f64) as f32).exp2()
    } else {
        1.0
    };
    debug!(width, height, blocks = hk * wk, lit_blocks = count, scale, "autoexposure");
    scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use denoise_core::Format;

    fn constant_image(width: usize, height: usize, value: f32) -> Image {
        let img = Image::alloc(Format::Float3, width, height).unwrap();
        {
            let mut w = img.write();
            for y in 0..height {
                for x in 0..width {
                    w.set3(x, y, [value; 3]);
                }
            }
        }
        img
    }

    #[test]
    fn test_grey_image_maps_to_key() {
        let img = constant_image(64, 48, 0.18);
        assert_relative_eq!(autoexposure(&img), 1.0, epsilon = 1e-4);

        let img = constant_image(64, 48, 1.8);
        assert_relative_eq!(autoexposure(&img), 0.1, epsilon = 1e-4);
    }

    #[test]
    fn test_black_image() {
        let img = constant_image(32, 32, 0.0);
        assert_eq!(autoexposure(&img), 1.0);
    }

    #[test]
    fn test_tiny_image() {
        // Smaller than one block still produces a single block
        let img = constant_image(3, 2, 0.36);
        assert_relative_eq!(autoexposure(&img), 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_non_finite_pixels_ignored() {
        let img = constant_image(16, 16, 0.18);
        img.write().set3(3, 3, [f32::NAN, f32::INFINITY, 0.18]);
        assert!(autoexposure(&img).is_finite());
    }

    #[test]
    fn test_luminance_weights_sum_to_one() {
        assert_relative_eq!(luminance([1.0, 1.0, 1.0]), 1.0, epsilon = 1e-5);
    }
}
