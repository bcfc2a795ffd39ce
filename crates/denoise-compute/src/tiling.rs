//! Memory-budgeted tiling for network inference.
//!
//! Picks the largest aligned tile whose working set fits the memory budget,
//! then splits the image into overlapping tiles. Each tile reads `overlap`
//! extra pixels on every interior edge so the network sees the same context
//! it would see in a whole-image run.
//!
//! # Geometry
//!
//! ```text
//!            tile_h (multiple of A, includes overlap)
//!   |<------------------------------------------>|
//!   | overlap |       output rows       | overlap |
//!   |<------->|                         |<------->|
//!             |<-- step = tile_h - 2V ->|
//! ```
//!
//! Tile sizes include the overlap; consecutive tiles start `step` pixels
//! apart. Because the step is a multiple of the alignment, every tile keeps
//! the same distance between the true image edge and the tensor edge as a
//! single-tile run, which makes tiling invisible in the output.
//!
//! # Example
//!
//! ```rust
//! use denoise_compute::tiling::compute_tile_layout;
//! use denoise_compute::{MemoryCost, NetworkConstants};
//!
//! let constants = NetworkConstants::new(16, 174);
//! let cost = MemoryCost::new(16 << 20, 854);
//! let layout = compute_tile_layout(512, 512, constants, cost, 138 << 20);
//!
//! assert_eq!((layout.tile_h, layout.tile_w), (352, 352));
//! assert_eq!((layout.count_h, layout.count_w), (2, 2));
//! ```

use denoise_core::{round_up, Rect};
use tracing::{debug, warn};

use crate::network::{MemoryCost, NetworkConstants};

/// Tile grid for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    /// Tile height including overlap.
    pub tile_h: usize,
    /// Tile width including overlap.
    pub tile_w: usize,
    /// Tiles per column.
    pub count_h: usize,
    /// Tiles per row.
    pub count_w: usize,
    height: usize,
    width: usize,
    overlap: usize,
    alignment: usize,
}

/// One tile of a [`TileLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Row-major index.
    pub index: usize,
    pub row: usize,
    pub col: usize,
    /// Image pixels packed into the tensor (output plus interior overlap).
    pub input: Rect,
    /// Image pixels this tile writes.
    pub output: Rect,
    /// Tensor position `(x, y)` of `input`'s origin.
    pub tensor_origin: (usize, usize),
}

impl Tile {
    /// Tensor position `(x, y)` of `output`'s origin.
    #[inline]
    pub fn output_origin(&self) -> (usize, usize) {
        (
            self.tensor_origin.0 + self.output.x - self.input.x,
            self.tensor_origin.1 + self.output.y - self.input.y,
        )
    }
}

/// Computes the tile grid for an `height x width` image.
///
/// Starts from a single tile covering the image and splits the longer tile
/// dimension until the [`MemoryCost`] of one tile fits `budget_bytes`. The
/// budget is soft: tiles never shrink below `3 * overlap`, and that smallest
/// legal tile is accepted even when it still exceeds the budget.
///
/// Pure and deterministic.
pub fn compute_tile_layout(
    height: usize,
    width: usize,
    constants: NetworkConstants,
    cost: MemoryCost,
    budget_bytes: usize,
) -> TileLayout {
    let a = constants.alignment.max(1);
    let overlap = constants.overlap();
    let max_tile_pixels = cost.max_tile_pixels(budget_bytes);
    let min_tile = (3 * overlap).max(a);

    let mut tile_h = round_up(height, a);
    let mut tile_w = round_up(width, a);
    let mut count_h = 1;
    let mut count_w = 1;

    while tile_h * tile_w > max_tile_pixels {
        if tile_h > min_tile && tile_h > tile_w {
            count_h += 1;
            tile_h = split(height, count_h, overlap, a).max(min_tile);
        } else if tile_w > min_tile {
            count_w += 1;
            tile_w = split(width, count_w, overlap, a).max(min_tile);
        } else {
            warn!(
                tile_h,
                tile_w,
                bytes = cost.bytes(tile_h * tile_w),
                budget = budget_bytes,
                "memory budget too small, using smallest tile"
            );
            break;
        }
    }

    let layout = TileLayout {
        tile_h,
        tile_w,
        count_h: tile_count(height, tile_h, overlap),
        count_w: tile_count(width, tile_w, overlap),
        height,
        width,
        overlap,
        alignment: a,
    };
    debug!(
        height,
        width,
        tile_h = layout.tile_h,
        tile_w = layout.tile_w,
        count_h = layout.count_h,
        count_w = layout.count_w,
        overlap,
        "tile layout"
    );
    layout
}

/// Tile size when `size` is split into `count` tiles.
fn split(size: usize, count: usize, overlap: usize, a: usize) -> usize {
    round_up(size.saturating_sub(2 * overlap).div_ceil(count), a) + 2 * overlap
}

fn tile_count(size: usize, tile: usize, overlap: usize) -> usize {
    if size > tile {
        (size - 2 * overlap).div_ceil(tile - 2 * overlap)
    } else {
        1
    }
}

impl TileLayout {
    /// Total number of tiles.
    #[inline]
    pub fn count(&self) -> usize {
        self.count_h * self.count_w
    }

    #[inline]
    pub fn is_single(&self) -> bool {
        self.count() == 1
    }

    /// Image `(height, width)`.
    #[inline]
    pub fn image_size(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    #[inline]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Tile `(row, col)`.
    pub fn tile(&self, row: usize, col: usize) -> Tile {
        let (in_y, in_h, out_y, out_h, off_y) =
            axis(row, self.count_h, self.tile_h, self.height, self.overlap, self.alignment);
        let (in_x, in_w, out_x, out_w, off_x) =
            axis(col, self.count_w, self.tile_w, self.width, self.overlap, self.alignment);

        Tile {
            index: row * self.count_w + col,
            row,
            col,
            input: Rect::new(in_x, in_y, in_w, in_h),
            output: Rect::new(out_x, out_y, out_w, out_h),
            tensor_origin: (off_x, off_y),
        }
    }

    /// All tiles in row-major order.
    pub fn tiles(&self) -> Vec<Tile> {
        (0..self.count_h)
            .flat_map(|i| (0..self.count_w).map(move |j| self.tile(i, j)))
            .collect()
    }

    /// For each tile, the index of the last tile (row-major) whose input
    /// region intersects its output region.
    ///
    /// When tiles run in order over an image that is both input and output,
    /// a tile's result may be written back once that reader has run.
    pub fn last_readers(&self) -> Vec<usize> {
        let tiles = self.tiles();
        tiles
            .iter()
            .map(|t| {
                tiles
                    .iter()
                    .rev()
                    .find(|r| r.input.overlaps(&t.output))
                    .map_or(t.index, |r| r.index)
            })
            .collect()
    }
}

/// Per-axis geometry of tile `i`:
/// `(input_begin, input_len, output_begin, output_len, tensor_offset)`.
fn axis(
    i: usize,
    count: usize,
    tile: usize,
    size: usize,
    overlap: usize,
    a: usize,
) -> (usize, usize, usize, usize, usize) {
    let begin = i * (tile - 2 * overlap);
    let overlap_begin = if i > 0 { overlap } else { 0 };
    let overlap_end = if i + 1 < count { overlap } else { 0 };

    let input_len = (size - begin).min(tile);
    let output_len = input_len - overlap_begin - overlap_end;
    let tensor_offset = tile - round_up(input_len, a);

    (begin, input_len, begin + overlap_begin, output_len, tensor_offset)
}
