//! Portable float map (PFM) reading and writing.
//!
//! ```text
//! PF            color (Pf for grayscale)
//! <w> <h>
//! <scale>       negative = little-endian
//! <f32 data, bottom row first>
//! ```
//!
//! Grayscale files are expanded to RGB on read. Files are always written as
//! little-endian RGB.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use denoise_core::Image;

/// Reads a PFM file into an RGB float image.
pub fn read(path: &Path) -> Result<Image> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    decode(&bytes).with_context(|| format!("invalid PFM file {}", path.display()))
}

/// Writes `image` as a little-endian RGB PFM file.
pub fn write(path: &Path, image: &Image) -> Result<()> {
    let bytes = encode(image);
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

pub fn decode(bytes: &[u8]) -> Result<Image> {
    let mut pos = 0;
    let magic = token(bytes, &mut pos)?;
    let channels = match magic {
        "PF" => 3,
        "Pf" => 1,
        other => bail!("unknown magic '{other}'"),
    };
    let width: usize = token(bytes, &mut pos)?.parse().context("bad width")?;
    let height: usize = token(bytes, &mut pos)?.parse().context("bad height")?;
    let scale: f32 = token(bytes, &mut pos)?.parse().context("bad scale")?;
    ensure!(width > 0 && height > 0, "empty image {width}x{height}");
    ensure!(scale != 0.0 && scale.is_finite(), "bad scale {scale}");
    // Single whitespace byte ends the header
    pos += 1;

    let count = width * height * channels;
    let data = bytes.get(pos..).unwrap_or_default();
    ensure!(data.len() >= count * 4, "expected {} data bytes, found {}", count * 4, data.len());

    let little_endian = scale < 0.0;
    let samples: Vec<f32> = data[..count * 4]
        .chunks_exact(4)
        .map(|b| {
            let b = [b[0], b[1], b[2], b[3]];
            if little_endian { f32::from_le_bytes(b) } else { f32::from_be_bytes(b) }
        })
        .collect();

    let mut rgb = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let row = &samples[(height - 1 - y) * width * channels..][..width * channels];
        if channels == 3 {
            rgb.extend_from_slice(row);
        } else {
            rgb.extend(row.iter().flat_map(|&v| [v, v, v]));
        }
    }
    Ok(Image::from_rgb(&rgb, width, height)?)
}

pub fn encode(image: &Image) -> Vec<u8> {
    let (width, height) = image.dimensions();
    let rgb = image.to_rgb_vec();

    let mut out = Vec::with_capacity(32 + rgb.len() * 4);
    // Writing to a Vec cannot fail
    let _ = write!(out, "PF\n{width} {height}\n-1.0\n");
    for y in (0..height).rev() {
        for v in &rgb[y * width * 3..(y + 1) * width * 3] {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}

/// Next whitespace-separated header token.
fn token<'a>(bytes: &'a [u8], pos: &mut usize) -> Result<&'a str> {
    while bytes.get(*pos).is_some_and(u8::is_ascii_whitespace) {
        *pos += 1;
    }
    let start = *pos;
    while bytes.get(*pos).is_some_and(|b| !b.is_ascii_whitespace()) {
        *pos += 1;
    }
    ensure!(*pos > start, "truncated header");
    std::str::from_utf8(&bytes[start..*pos]).context("header is not ASCII")
}
