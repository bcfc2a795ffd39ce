//! # denoise-core
//!
//! Core types shared by every crate of the denoise runtime:
//!
//! - [`Error`], [`ErrorKind`], [`Result`] - the single error channel
//! - [`Rect`] - pixel rectangles for tile regions
//! - [`Format`], [`DataFormat`] - pixel formats (f32 / f16, 1-4 channels)
//! - [`Buffer`], [`Image`] - shared pixel memory and aliasing-aware views
//!
//! ## Crate Structure
//!
//! ```text
//! denoise-core (this crate)
//!    ^
//!    +-- denoise-transfer (transfer functions, autoexposure)
//!    +-- denoise-compute  (tensors, networks, weights, tile scheduling)
//!    +-- denoise-filter   (weight selection, filters, device)
//!    +-- denoise-cli
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod format;
pub mod image;
pub mod rect;

pub use error::{Error, ErrorKind, Result};
pub use format::{DataFormat, Format};
pub use image::{Buffer, Image, ImageReader, ImageWriter};
pub use rect::{round_up, Rect};
