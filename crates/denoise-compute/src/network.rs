//! Network backend abstraction.
//!
//! A backend is split in two halves:
//!
//! ```text
//! NetworkBuilder (one per device)
//!     +-- constants()    alignment + receptive field
//!     +-- memory_cost()  working-set model used for tile sizing
//!     +-- build()        weights + tile shape -> Arc<dyn Network>
//!
//! Network (one per committed filter)
//!     +-- run()          input tensor -> 3-channel output tensor
//! ```
//!
//! The filter never looks inside a network. It only needs the geometry
//! constants to place tiles and the cost model to honor the memory budget.

use std::sync::Arc;

use denoise_core::{round_up, Result};

use crate::tensor::Tensor;
use crate::weights::Weights;

/// Geometry constants of a network family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConstants {
    /// Tensor height and width must be multiples of this.
    pub alignment: usize,
    /// Receptive field in pixels.
    pub receptive_field: usize,
}

impl NetworkConstants {
    pub const fn new(alignment: usize, receptive_field: usize) -> Self {
        Self {
            alignment,
            receptive_field,
        }
    }

    /// Context each tile reads beyond its output region on interior edges.
    #[inline]
    pub const fn overlap(&self) -> usize {
        round_up(self.receptive_field / 2, self.alignment)
    }
}

/// Working-set model: `base_bytes + bytes_per_pixel * tile_pixels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCost {
    pub base_bytes: usize,
    pub bytes_per_pixel: usize,
}

impl MemoryCost {
    pub const fn new(base_bytes: usize, bytes_per_pixel: usize) -> Self {
        Self {
            base_bytes,
            bytes_per_pixel,
        }
    }

    /// Estimated bytes for a tile of `pixels` pixels.
    #[inline]
    pub fn bytes(&self, pixels: usize) -> usize {
        self.base_bytes.saturating_add(self.bytes_per_pixel.saturating_mul(pixels))
    }

    /// Largest tile area that fits `budget_bytes`; zero when even the base
    /// cost exceeds the budget.
    #[inline]
    pub fn max_tile_pixels(&self, budget_bytes: usize) -> usize {
        budget_bytes.saturating_sub(self.base_bytes) / self.bytes_per_pixel.max(1)
    }
}

/// A network built for a fixed input shape.
///
/// Shared read-only across worker threads; per-run scratch lives inside
/// [`Network::run`].
pub trait Network: Send + Sync {
    /// Packed input channel count.
    fn input_channels(&self) -> usize;

    /// `(tile_h, tile_w)` the network was built for.
    fn tile_size(&self) -> (usize, usize);

    /// Runs inference. The output has 3 channels and the input's height and width.
    fn run(&self, input: &Tensor) -> Result<Tensor>;
}

/// Creates networks from weight blobs.
pub trait NetworkBuilder: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    fn constants(&self) -> NetworkConstants;

    fn memory_cost(&self) -> MemoryCost;

    /// Builds a network for `input_channels x tile_h x tile_w` tensors.
    ///
    /// # Errors
    ///
    /// Configuration errors for weights that do not decode or do not match
    /// the channel count, resource errors when the backend cannot allocate.
    fn build(
        &self,
        weights: &Weights,
        input_channels: usize,
        tile_h: usize,
        tile_w: usize,
    ) -> Result<Arc<dyn Network>>;
}
