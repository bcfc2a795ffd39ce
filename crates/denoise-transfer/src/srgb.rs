//! sRGB curve, used as the working space of the LDR networks.
//!
//! LDR networks are trained on sRGB-encoded values. Linear LDR input is
//! encoded with [`oetf`] before inference and decoded with [`eotf`] after.
//!
//! # Range
//!
//! - Input/Output: [0, 1]
//!
//! # Reference
//!
//! IEC 61966-2-1:1999

const LINEAR_BREAK: f32 = 0.0031308;
const ENCODED_BREAK: f32 = 0.04045;
const SLOPE: f32 = 12.92;
const GAMMA: f32 = 2.4;

/// Decodes an sRGB value to linear.
///
/// ```text
/// if V <= 0.04045:  L = V / 12.92
/// else:             L = ((V + 0.055) / 1.055)^2.4
/// ```
#[inline]
pub fn eotf(v: f32) -> f32 {
    if v <= ENCODED_BREAK {
        v / SLOPE
    } else {
        ((v + 0.055) / 1.055).powf(GAMMA)
    }
}

/// Encodes a linear value to sRGB.
///
/// ```text
/// if L <= 0.0031308:  V = L * 12.92
/// else:               V = 1.055 * L^(1/2.4) - 0.055
/// ```
///
/// ```rust
/// use denoise_transfer::srgb::oetf;
///
/// assert!((oetf(0.214) - 0.5).abs() < 0.01);
/// ```
#[inline]
pub fn oetf(l: f32) -> f32 {
    if l <= LINEAR_BREAK {
        l * SLOPE
    } else {
        1.055 * l.powf(1.0 / GAMMA) - 0.055
    }
}
