//! Packing images into network tensors and unpacking results.
//!
//! Input channel layout of the tensor:
//!
//! | Channels | Source | Mapping |
//! |---|---|---|
//! | 0..3 | color | transfer function forward |
//! | 3..6 | albedo | clamp to [0, 1] |
//! | 6..9 | normal | clamp to [-1, 1], then `* 0.5 + 0.5` |
//!
//! Non-finite samples become zero before any mapping. Pixels outside the
//! tile's input region stay zero.

use denoise_compute::{Tensor, Tile};
use denoise_core::{Image, Rect, Result};
use denoise_transfer::TransferFunction;

/// Input images of one execution.
#[derive(Debug, Clone, Copy)]
pub struct InputImages<'a> {
    pub color: &'a Image,
    pub albedo: Option<&'a Image>,
    pub normal: Option<&'a Image>,
}

impl InputImages<'_> {
    pub fn channels(&self) -> usize {
        3 + 3 * usize::from(self.albedo.is_some()) + 3 * usize::from(self.normal.is_some())
    }
}

#[inline]
fn sanitize(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}

/// Packs the tile's input region into a zero-filled `tensor`.
///
/// Each image is locked on its own, so no two buffer locks are held at once.
pub fn reorder_input(
    tile: &Tile,
    inputs: &InputImages<'_>,
    transfer: &TransferFunction,
    tensor: &mut Tensor,
) {
    let (tx, ty) = tile.tensor_origin;
    let rect = tile.input;

    let mut pack = |image: &Image, first: usize, map: &dyn Fn(f32) -> f32| {
        let reader = image.read();
        for (x, y) in rect.iter_coords() {
            let rgb = reader.get3(x, y);
            for (c, v) in rgb.into_iter().enumerate() {
                tensor.set(first + c, ty + y - rect.y, tx + x - rect.x, map(sanitize(v)));
            }
        }
    };

    pack(inputs.color, 0, &|v| transfer.forward(v));

    let mut next = 3;
    if let Some(albedo) = inputs.albedo {
        pack(albedo, next, &|v| v.clamp(0.0, 1.0));
        next += 3;
    }
    if let Some(normal) = inputs.normal {
        pack(normal, next, &|v| v.clamp(-1.0, 1.0) * 0.5 + 0.5);
    }
}

/// Decodes the tile's output region of `tensor` into interleaved RGB.
pub fn reorder_output(tile: &Tile, tensor: &Tensor, transfer: &TransferFunction) -> Vec<f32> {
    let (ox, oy) = tile.output_origin();
    let rect = tile.output;

    let mut out = Vec::with_capacity(rect.area() * 3);
    for (x, y) in rect.iter_coords() {
        let ty = oy + y - rect.y;
        let tx = ox + x - rect.x;
        for c in 0..3 {
            out.push(transfer.inverse(tensor.get(c, ty, tx)));
        }
    }
    out
}

/// Writes interleaved RGB for `rect` into `image`.
pub fn write_region(image: &Image, rect: Rect, rgb: &[f32]) {
    let mut writer = image.write();
    for ((x, y), px) in rect.iter_coords().zip(rgb.chunks_exact(3)) {
        writer.set3(x, y, [px[0], px[1], px[2]]);
    }
}

/// Full-size RGB staging image for in-place execution.
///
/// Allocated on top of the tile working set; commit warns when the sum
/// exceeds `maxMemoryMB`.
#[derive(Debug)]
pub struct Scratch {
    width: usize,
    data: Vec<f32>,
}

impl Scratch {
    /// Allocates staging for a `width x height` image.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        let len = width * height * 3;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| denoise_core::Error::out_of_memory(len * 4, "in-place output staging"))?;
        data.resize(len, 0.0);
        Ok(Self { width, data })
    }

    /// Bytes held by the staging buffer.
    pub fn byte_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Stores interleaved RGB for `rect`.
    pub fn store(&mut self, rect: Rect, rgb: &[f32]) {
        for (row, src) in rgb.chunks_exact(rect.width * 3).enumerate() {
            let start = ((rect.y + row) * self.width + rect.x) * 3;
            self.data[start..start + src.len()].copy_from_slice(src);
        }
    }

    /// Interleaved RGB of `rect`.
    pub fn region(&self, rect: Rect) -> Vec<f32> {
        let mut out = Vec::with_capacity(rect.area() * 3);
        for y in rect.y..rect.bottom() {
            let start = (y * self.width + rect.x) * 3;
            out.extend_from_slice(&self.data[start..start + rect.width * 3]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use denoise_core::Format;

    fn full_tile() -> Tile {
        Tile {
            index: 0,
            row: 0,
            col: 0,
            input: Rect::new(0, 0, 4, 3),
            output: Rect::new(0, 0, 4, 3),
            tensor_origin: (0, 0),
        }
    }

    #[test]
    fn test_input_mapping() {
        let color = Image::from_rgb(&[2.0; 36], 4, 3).unwrap();
        let albedo = Image::from_rgb(&[1.5; 36], 4, 3).unwrap();
        let normal = Image::from_rgb(&[-3.0; 36], 4, 3).unwrap();
        color.write().set3(1, 1, [f32::NAN, f32::INFINITY, -f32::INFINITY]);

        let inputs = InputImages { color: &color, albedo: Some(&albedo), normal: Some(&normal) };
        assert_eq!(inputs.channels(), 9);

        let mut tensor = Tensor::zeros(9, 16, 16).unwrap();
        let tf = TransferFunction::ldr();
        reorder_input(&full_tile(), &inputs, &tf, &mut tensor);

        assert_relative_eq!(tensor.get(0, 0, 0), 1.0, epsilon = 1e-6);
        assert_eq!(tensor.get(0, 1, 1), 0.0);
        assert_eq!(tensor.get(1, 1, 1), 0.0);
        assert_eq!(tensor.get(3, 0, 0), 1.0);
        assert_eq!(tensor.get(6, 2, 3), 0.0);
        // Outside the input region
        assert_eq!(tensor.get(0, 3, 0), 0.0);
        assert_eq!(tensor.get(0, 0, 4), 0.0);
    }

    #[test]
    fn test_input_honors_tensor_origin() {
        let color = Image::from_rgb(&[0.5; 12], 2, 2).unwrap();
        let inputs = InputImages { color: &color, albedo: None, normal: None };
        let tile = Tile {
            input: Rect::new(0, 0, 2, 2),
            output: Rect::new(0, 0, 2, 2),
            tensor_origin: (3, 5),
            ..full_tile()
        };
        let mut tensor = Tensor::zeros(3, 16, 16).unwrap();
        reorder_input(&tile, &inputs, &TransferFunction::linear_ldr(), &mut tensor);
        assert_eq!(tensor.get(2, 5, 3), 0.5);
        assert_eq!(tensor.get(2, 6, 4), 0.5);
        assert_eq!(tensor.get(2, 4, 3), 0.0);
    }

    #[test]
    fn test_output_roundtrip_through_image() {
        let tile = Tile {
            input: Rect::new(0, 0, 4, 3),
            output: Rect::new(1, 1, 2, 2),
            tensor_origin: (0, 0),
            ..full_tile()
        };
        let mut tensor = Tensor::zeros(3, 16, 16).unwrap();
        tensor.set(0, 1, 1, 0.25);
        tensor.set(2, 2, 2, 0.75);

        let rgb = reorder_output(&tile, &tensor, &TransferFunction::linear_ldr());
        assert_eq!(rgb.len(), 12);

        let image = Image::alloc(Format::Half3, 4, 3).unwrap();
        write_region(&image, tile.output, &rgb);
        let reader = image.read();
        assert_eq!(reader.get(1, 1, 0), 0.25);
        assert_eq!(reader.get(2, 2, 2), 0.75);
        assert_eq!(reader.get(0, 0, 0), 0.0);
    }

    #[test]
    fn test_scratch_store_and_region() {
        let mut scratch = Scratch::new(5, 4).unwrap();
        let rect = Rect::new(1, 2, 3, 2);
        let rgb: Vec<f32> = (0..18).map(|i| i as f32).collect();
        scratch.store(rect, &rgb);
        assert_eq!(scratch.region(rect), rgb);
        assert_eq!(scratch.region(Rect::new(0, 0, 1, 1)), vec![0.0; 3]);
        assert_eq!(scratch.byte_size(), 5 * 4 * 3 * 4);
    }
}
