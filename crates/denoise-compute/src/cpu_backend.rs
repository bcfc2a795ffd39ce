//! Reference CPU backend using rayon for parallelization.
//!
//! Interprets a plain stack of "same" convolutions from a
//! [`WeightContainer`]: tensors `conv{N}.weight` with shape
//! `[out, in, k, k]` and `conv{N}.bias` with shape `[out]`, for `N = 0, 1, ...`
//! until the next index is missing. ReLU sits between layers; the last layer
//! is linear and must produce 3 channels.
//!
//! This is not a production UNet. It exists so the tiling engine can be run
//! and checked end to end without an external inference library.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, trace};

use denoise_core::{Error, Result};

use crate::container::{NamedTensor, WeightContainer};
use crate::network::{MemoryCost, Network, NetworkBuilder, NetworkConstants};
use crate::tensor::Tensor;
use crate::weights::{WeightLibrary, WeightSlot, WeightTable, Weights};

/// Tensor alignment of the RT network family.
pub const ALIGNMENT: usize = 16;
/// Receptive field of the RT network family.
pub const RECEPTIVE_FIELD: usize = 174;
/// Fixed working-set cost per network instance.
pub const BASE_MEMORY_BYTES: usize = 16 * 1024 * 1024;
/// Working-set cost per tile pixel.
pub const MEMORY_BYTES_PER_PIXEL: usize = 854;

/// One convolution layer.
#[derive(Debug, Clone)]
struct Conv {
    out_channels: usize,
    in_channels: usize,
    kernel: usize,
    /// `[out][in][ky][kx]`
    weight: Vec<f32>,
    bias: Vec<f32>,
}

impl Conv {
    fn from_container(container: &WeightContainer, index: usize) -> Result<Option<Self>> {
        let weight_name = format!("conv{index}.weight");
        let Some(weight) = container.get(&weight_name) else {
            return Ok(None);
        };
        let bias_name = format!("conv{index}.bias");
        let bias = container
            .get(&bias_name)
            .ok_or_else(|| Error::invalid_weights(format!("missing tensor '{bias_name}'")))?;

        let &[out_channels, in_channels, kh, kw] = weight.dims.as_slice() else {
            return Err(Error::invalid_weights(format!(
                "'{weight_name}' must have rank 4, got dims {:?}",
                weight.dims
            )));
        };
        if kh != kw || kh % 2 == 0 {
            return Err(Error::invalid_weights(format!(
                "'{weight_name}' kernel {kh}x{kw} must be square and odd"
            )));
        }
        if bias.dims != [out_channels] {
            return Err(Error::invalid_weights(format!(
                "'{bias_name}' dims {:?} do not match {out_channels} output channels",
                bias.dims
            )));
        }

        Ok(Some(Self {
            out_channels,
            in_channels,
            kernel: kh,
            weight: weight.data.clone(),
            bias: bias.data.clone(),
        }))
    }

    /// Zero-padded "same" convolution, one output plane per task.
    fn forward(&self, input: &Tensor, relu: bool) -> Result<Tensor> {
        let (_, h, w) = input.shape();
        let mut output = Tensor::zeros(self.out_channels, h, w)?;
        let k = self.kernel;
        let r = (k / 2) as isize;
        let plane_len = h * w;

        output
            .as_mut_slice()
            .par_chunks_mut(plane_len.max(1))
            .enumerate()
            .for_each(|(oc, plane)| {
                plane.fill(self.bias[oc]);

                for ic in 0..self.in_channels {
                    let src = input.plane(ic);
                    let taps = &self.weight[(oc * self.in_channels + ic) * k * k..][..k * k];

                    for ky in 0..k {
                        let dy = ky as isize - r;
                        let y0 = (-dy).max(0) as usize;
                        let y1 = (h as isize - dy).min(h as isize).max(0) as usize;

                        for kx in 0..k {
                            let tap = taps[ky * k + kx];
                            if tap == 0.0 {
                                continue;
                            }
                            let dx = kx as isize - r;
                            let x0 = (-dx).max(0) as usize;
                            let x1 = (w as isize - dx).min(w as isize).max(0) as usize;

                            for y in y0..y1 {
                                let sy = (y as isize + dy) as usize;
                                let dst = &mut plane[y * w..(y + 1) * w];
                                let row = &src[sy * w..(sy + 1) * w];
                                for x in x0..x1 {
                                    dst[x] += tap * row[(x as isize + dx) as usize];
                                }
                            }
                        }
                    }
                }

                if relu {
                    plane.iter_mut().for_each(|v| *v = v.max(0.0));
                }
            });

        Ok(output)
    }
}

/// Network interpreted by [`CpuNetworkBuilder`].
#[derive(Debug)]
pub struct CpuNetwork {
    layers: Vec<Conv>,
    tile_h: usize,
    tile_w: usize,
}

impl CpuNetwork {
    /// Receptive field of the layer stack.
    pub fn receptive_field(&self) -> usize {
        1 + self.layers.iter().map(|l| l.kernel - 1).sum::<usize>()
    }
}

impl Network for CpuNetwork {
    fn input_channels(&self) -> usize {
        self.layers.first().map_or(0, |l| l.in_channels)
    }

    fn tile_size(&self) -> (usize, usize) {
        (self.tile_h, self.tile_w)
    }

    fn run(&self, input: &Tensor) -> Result<Tensor> {
        let expected = (self.input_channels(), self.tile_h, self.tile_w);
        if input.shape() != expected {
            return Err(Error::backend(format!(
                "input tensor {:?} does not match network shape {expected:?}",
                input.shape()
            )));
        }
        trace!(shape = ?input.shape(), layers = self.layers.len(), "cpu network run");

        let last = self.layers.len() - 1;
        let mut x = self.layers[0].forward(input, last > 0)?;
        for (i, layer) in self.layers.iter().enumerate().skip(1) {
            x = layer.forward(&x, i < last)?;
        }
        Ok(x)
    }
}

/// Builds [`CpuNetwork`]s from [`WeightContainer`] blobs.
#[derive(Debug, Clone)]
pub struct CpuNetworkBuilder {
    constants: NetworkConstants,
    cost: MemoryCost,
}

impl CpuNetworkBuilder {
    pub fn new(constants: NetworkConstants, cost: MemoryCost) -> Self {
        Self { constants, cost }
    }
}

impl Default for CpuNetworkBuilder {
    fn default() -> Self {
        Self::new(
            NetworkConstants::new(ALIGNMENT, RECEPTIVE_FIELD),
            MemoryCost::new(BASE_MEMORY_BYTES, MEMORY_BYTES_PER_PIXEL),
        )
    }
}

impl NetworkBuilder for CpuNetworkBuilder {
    fn name(&self) -> &str {
        "cpu"
    }

    fn constants(&self) -> NetworkConstants {
        self.constants
    }

    fn memory_cost(&self) -> MemoryCost {
        self.cost
    }

    fn build(
        &self,
        weights: &Weights,
        input_channels: usize,
        tile_h: usize,
        tile_w: usize,
    ) -> Result<Arc<dyn Network>> {
        let container = WeightContainer::decode(weights.as_bytes())?;

        let mut layers = Vec::new();
        while let Some(conv) = Conv::from_container(&container, layers.len())? {
            layers.push(conv);
        }

        let Some(first) = layers.first() else {
            return Err(Error::invalid_weights("weights contain no 'conv0' layer"));
        };
        if first.in_channels != input_channels {
            return Err(Error::invalid_weights(format!(
                "network expects {} input channels, filter provides {input_channels}",
                first.in_channels
            )));
        }
        for pair in layers.windows(2) {
            if pair[1].in_channels != pair[0].out_channels {
                return Err(Error::invalid_weights(format!(
                    "layer takes {} channels but previous layer produces {}",
                    pair[1].in_channels, pair[0].out_channels
                )));
            }
        }
        let out_channels = layers.last().map_or(0, |l| l.out_channels);
        if out_channels != 3 {
            return Err(Error::invalid_weights(format!(
                "last layer must produce 3 channels, got {out_channels}"
            )));
        }

        let network = CpuNetwork { layers, tile_h, tile_w };
        if network.receptive_field() > self.constants.receptive_field {
            return Err(Error::invalid_weights(format!(
                "network receptive field {} exceeds {}",
                network.receptive_field(),
                self.constants.receptive_field
            )));
        }

        // Largest activation must be allocatable before the network is handed out.
        let widest = network.layers.iter().map(|l| l.out_channels).max().unwrap_or(3);
        Tensor::zeros(widest.max(input_channels), tile_h, tile_w)
            .map_err(|_| Error::out_of_memory(widest * tile_h * tile_w * 4, "network activations"))?;

        debug!(
            layers = network.layers.len(),
            input_channels,
            tile_h,
            tile_w,
            receptive_field = network.receptive_field(),
            "built cpu network"
        );
        Ok(Arc::new(network))
    }
}

/// Deterministic reference weights for `slot`.
///
/// Two 3x3 layers: the first box-filters each color channel and mixes in a
/// small amount of every auxiliary channel, the second blends the filtered
/// color with a luminance feature.
pub fn reference_weights(slot: WeightSlot) -> Result<Weights> {
    let c = slot.input_channels();
    let aux_gain = match slot {
        WeightSlot::Hdr | WeightSlot::Ldr | WeightSlot::Dir => 0.0,
        WeightSlot::HdrAlb | WeightSlot::LdrAlb => 0.02,
        WeightSlot::HdrAlbNrm | WeightSlot::LdrAlbNrm => 0.01,
    };

    let k = 3;
    let mut w0 = vec![0.0f32; 4 * c * k * k];
    for oc in 0..3 {
        for t in 0..k * k {
            w0[(oc * c + oc) * k * k + t] = 1.0 / 9.0;
        }
        for ic in 3..c {
            w0[(oc * c + ic) * k * k + 4] = aux_gain;
        }
    }
    for ic in 0..3 {
        w0[(3 * c + ic) * k * k + 4] = 1.0 / 3.0;
    }

    let mut w1 = vec![0.0f32; 3 * 4 * k * k];
    for oc in 0..3 {
        w1[(oc * 4 + oc) * k * k + 4] = 0.9;
        w1[(oc * 4 + 3) * k * k + 4] = 0.1;
    }

    let mut container = WeightContainer::new();
    container.push(NamedTensor::new("conv0.weight", vec![4, c, k, k], w0));
    container.push(NamedTensor::new("conv0.bias", vec![4], vec![0.0; 4]));
    container.push(NamedTensor::new("conv1.weight", vec![3, 4, k, k], w1));
    container.push(NamedTensor::new("conv1.bias", vec![3], vec![0.0; 3]));
    container.to_weights()
}

/// Built-in weight library for the reference backend.
///
/// The RT table fills every color tier; the lightmap table holds the HDR
/// color-only and directional blobs.
pub fn reference_library() -> Result<WeightLibrary> {
    let mut rt = WeightTable::new();
    for slot in WeightSlot::ALL {
        if slot != WeightSlot::Dir {
            rt.set(slot, reference_weights(slot)?);
        }
    }
    let rt_lightmap = WeightTable::new()
        .with(WeightSlot::Hdr, reference_weights(WeightSlot::Hdr)?)
        .with(WeightSlot::Dir, reference_weights(WeightSlot::Dir)?);

    Ok(WeightLibrary { rt, rt_lightmap })
}
