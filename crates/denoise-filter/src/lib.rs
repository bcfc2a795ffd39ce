//! UNet denoising filters.
//!
//! A [`Device`] hands out [`Filter`]s. A filter collects images and
//! flags through a named option surface, resolves them into weights, a tile
//! layout and a network on [`Filter::commit`], and denoises on
//! [`Filter::execute`].
//!
//! # Filter types
//!
//! | Type | Inputs | Transfer |
//! |---|---|---|
//! | `RT` | color, albedo, normal | PU (hdr), sRGB curve, or identity (srgb) |
//! | `RTLightmap` | color | log, or identity (directional) |
//!
//! # Example
//!
//! ```rust
//! use denoise_core::{Format, Image};
//! use denoise_filter::Device;
//!
//! let device = Device::cpu()?;
//! let color = Image::alloc(Format::Float3, 32, 32)?;
//!
//! // Denoise in place
//! let mut filter = device.new_filter("RT")?;
//! filter.set_image("color", color.clone())?;
//! filter.set_image("output", color)?;
//! filter.commit()?;
//! assert_eq!(filter.is_inplace(), Some(true));
//! filter.execute()?;
//! # Ok::<(), denoise_core::Error>(())
//! ```

pub mod device;
mod executor;
pub mod filter;
pub mod options;
pub mod reorder;
pub mod selector;
pub mod variant;

pub use device::{Device, DeviceConfig};
pub use filter::{Filter, FilterState};
pub use options::{FilterOptions, OptionKind, OptionSpec};
pub use selector::{select_weights, SelectionInputs};
pub use variant::{FilterKind, FilterVariant};
