//! Perceptually uniform (PU) encoding for HDR input.
//!
//! Maps linear luminance in [0, [`HDR_Y_MAX`]] to an approximately
//! perceptually uniform [0, 1] signal: linear near black, a power segment in
//! the mid tones and a logarithm for highlights. The HDR networks are trained
//! on PU-encoded color.
//!
//! # Range
//!
//! - Linear: [0, 65504] (largest finite half float)
//! - Encoded: [0, 1]

use crate::HDR_Y_MAX;

const A: f32 = 1.412_837_6e3;
const B: f32 = 1.645_931_7;
const C: f32 = 4.313_849_8e-1;
const D: f32 = -2.941_396_1e-3;
const E: f32 = 1.926_532_5e-1;
const F: f32 = 6.260_261e-3;
const G: f32 = 9.986_201_5e-1;
const Y0: f32 = 1.579_457_6e-6;
const Y1: f32 = 3.220_876_3e-2;
const X0: f32 = 2.231_517_1e-3;
const X1: f32 = 3.709_747_5e-1;

#[inline]
fn pu_forward(y: f32) -> f32 {
    if y <= Y0 {
        A * y
    } else if y <= Y1 {
        B * y.powf(C) + D
    } else {
        E * (y + F).ln() + G
    }
}

#[inline]
fn pu_inverse(x: f32) -> f32 {
    if x <= X0 {
        x / A
    } else if x <= X1 {
        ((x - D) / B).powf(1.0 / C)
    } else {
        ((x - G) / E).exp() - F
    }
}

/// Normalization so that `forward(HDR_Y_MAX) == 1`.
#[inline]
fn norm_scale() -> f32 {
    1.0 / pu_forward(HDR_Y_MAX)
}

/// Encodes linear luminance to normalized PU.
#[inline]
pub fn forward(y: f32) -> f32 {
    pu_forward(y) * norm_scale()
}

/// Decodes normalized PU back to linear luminance.
#[inline]
pub fn inverse(x: f32) -> f32 {
    pu_inverse(x / norm_scale())
}
