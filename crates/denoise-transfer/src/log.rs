//! Logarithmic encoding used by the lightmap networks.
//!
//! ```text
//! forward(y) = ln(y + 1) / ln(HDR_Y_MAX + 1)
//! inverse(x) = exp(x * ln(HDR_Y_MAX + 1)) - 1
//! ```

use crate::HDR_Y_MAX;

#[inline]
fn scale() -> f32 {
    (HDR_Y_MAX + 1.0).ln()
}

/// Encodes linear irradiance to normalized log space.
#[inline]
pub fn forward(y: f32) -> f32 {
    y.ln_1p() / scale()
}

/// Decodes normalized log space to linear irradiance.
#[inline]
pub fn inverse(x: f32) -> f32 {
    (x * scale()).exp_m1()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        assert_eq!(forward(0.0), 0.0);
        assert!((forward(HDR_Y_MAX) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_roundtrip() {
        for &y in &[0.0f32, 0.001, 0.5, 1.0, 100.0, 50000.0] {
            let back = inverse(forward(y));
            assert!((back - y).abs() <= 1e-4 * y.max(1.0), "y={y}, back={back}");
        }
    }
}
