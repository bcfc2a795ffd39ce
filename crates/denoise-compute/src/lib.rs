//! Compute layer of the denoise runtime.
//!
//! Everything between a filter and the inference backend: CHW tensors, the
//! [`Network`]/[`NetworkBuilder`] seam, weight blobs and tables, the
//! memory-budgeted tile scheduler and a reference CPU backend.
//!
//! # Architecture
//!
//! ```text
//! Filter (denoise-filter)
//!     |
//!     +-- compute_tile_layout() ---> TileLayout / Tile
//!     |        uses NetworkConstants + MemoryCost from the builder
//!     |
//!     +-- NetworkBuilder::build(weights, channels, tile_h, tile_w)
//!              +-- CpuNetworkBuilder (rayon, WeightContainer blobs)
//! ```
//!
//! # Example
//!
//! ```rust
//! use denoise_compute::{reference_library, CpuNetworkBuilder, NetworkBuilder, Tensor, WeightSlot};
//!
//! let library = reference_library()?;
//! let weights = library.rt.get(WeightSlot::Ldr).unwrap();
//! let network = CpuNetworkBuilder::default().build(weights, 3, 32, 32)?;
//!
//! let output = network.run(&Tensor::zeros(3, 32, 32)?)?;
//! assert_eq!(output.shape(), (3, 32, 32));
//! # Ok::<(), denoise_core::Error>(())
//! ```

pub mod container;
pub mod cpu_backend;
pub mod memory;
pub mod network;
pub mod tensor;
pub mod tiling;
pub mod weights;

pub use container::{NamedTensor, WeightContainer};
pub use cpu_backend::{reference_library, reference_weights, CpuNetwork, CpuNetworkBuilder};
pub use network::{MemoryCost, Network, NetworkBuilder, NetworkConstants};
pub use tensor::Tensor;
pub use tiling::{compute_tile_layout, Tile, TileLayout};
pub use weights::{WeightLibrary, WeightSlot, WeightTable, Weights};
