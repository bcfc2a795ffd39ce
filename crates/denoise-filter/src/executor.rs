//! Tiled execution loop.
//!
//! ```text
//! for each tile (row-major)
//!     reorder_input   image region  -> zero-filled tensor
//!     Network::run    tensor        -> 3-channel tensor
//!     reorder_output  output region -> RGB
//!     write           output image      (not in place, tiles in parallel)
//!                     scratch + flush   (in place, tiles in order)
//! ```
//!
//! In place, a tile's result is staged and copied to the output once no
//! later tile reads the bytes it lands on. When the output maps each pixel
//! onto the same bytes as every input it aliases, that is after the last
//! tile reading the same region. Otherwise output pixel (x, y) may cover a
//! different input pixel, and everything is copied after the last tile.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, trace};

use denoise_compute::{Network, Tensor, Tile, TileLayout};
use denoise_core::{Image, Result};
use denoise_transfer::TransferFunction;

use crate::reorder::{reorder_input, reorder_output, write_region, InputImages, Scratch};

/// When staged in-place results are copied to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushMode {
    /// Per region, after its last reader. Output and aliased inputs share the pixel mapping.
    Eager,
    /// All at once, after the last tile.
    Deferred,
}

/// One execution of a committed filter.
pub(crate) struct TileExecutor<'a> {
    pub network: &'a dyn Network,
    pub layout: &'a TileLayout,
    pub inputs: InputImages<'a>,
    pub output: &'a Image,
    pub transfer: TransferFunction,
}

impl TileExecutor<'_> {
    fn run_tile(&self, tile: &Tile) -> Result<Vec<f32>> {
        let start = Instant::now();
        let mut tensor = Tensor::zeros(self.inputs.channels(), self.layout.tile_h, self.layout.tile_w)?;
        reorder_input(tile, &self.inputs, &self.transfer, &mut tensor);

        let result = self.network.run(&tensor)?;
        let rgb = reorder_output(tile, &result, &self.transfer);
        trace!(
            tile = tile.index,
            input = %tile.input,
            output = %tile.output,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "tile done"
        );
        Ok(rgb)
    }

    /// Tiles in parallel, written straight to the output.
    pub fn run_parallel(&self) -> Result<()> {
        let tiles = self.layout.tiles();
        debug!(tiles = tiles.len(), "executing tiles in parallel");

        tiles.par_iter().try_for_each(|tile| {
            let rgb = self.run_tile(tile)?;
            write_region(self.output, tile.output, &rgb);
            Ok(())
        })
    }

    /// Tiles in order through `scratch`, for outputs aliasing an input.
    pub fn run_in_place(&self, scratch: &mut Scratch, mode: FlushMode) -> Result<()> {
        let tiles = self.layout.tiles();
        let last_readers = match mode {
            FlushMode::Eager => self.layout.last_readers(),
            FlushMode::Deferred => vec![tiles.len(); tiles.len()],
        };
        debug!(tiles = tiles.len(), ?mode, "executing tiles in place");

        let flush = |scratch: &Scratch, tile: &Tile| {
            write_region(self.output, tile.output, &scratch.region(tile.output));
            trace!(tile = tile.index, "flushed");
        };

        let mut pending: Vec<usize> = Vec::new();
        for tile in &tiles {
            let rgb = self.run_tile(tile)?;
            scratch.store(tile.output, &rgb);
            pending.push(tile.index);

            pending.retain(|&t| {
                let ready = last_readers[t] <= tile.index;
                if ready {
                    flush(scratch, &tiles[t]);
                }
                !ready
            });
        }

        for t in pending {
            flush(scratch, &tiles[t]);
        }
        Ok(())
    }
}
