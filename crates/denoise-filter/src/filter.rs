//! The UNet filter orchestrator.
//!
//! # Lifecycle
//!
//! ```text
//!                 commit()                   set_*() / unset()
//! Uncommitted ------------> Committed -------------------------> Dirty
//!      |                        ^                                  |
//!      | set_*()                |            commit()              |
//!      +-- (stays Uncommitted)  +----------------------------------+
//! ```
//!
//! `commit()` is the only place that selects weights, computes the tile
//! layout and builds the network. It works on locals and assigns them only
//! once everything succeeded, so a failing commit leaves the filter as it
//! was. `execute()` requires the `Committed` state.
//!
//! # Example
//!
//! ```rust
//! use denoise_core::{Format, Image};
//! use denoise_filter::Device;
//!
//! let device = Device::cpu()?;
//! let color = Image::alloc(Format::Float3, 64, 48)?;
//! let output = Image::alloc(Format::Float3, 64, 48)?;
//!
//! let mut filter = device.new_filter("RT")?;
//! filter.set_color(color)?;
//! filter.set_output(output)?;
//! filter.set_hdr(true)?;
//! filter.commit()?;
//! filter.execute()?;
//! # Ok::<(), denoise_core::Error>(())
//! ```

use std::sync::Arc;
use std::time::Instant;

use rayon::ThreadPool;
use tracing::{debug, info, trace, warn};

use denoise_compute::{compute_tile_layout, memory, Network, NetworkBuilder, TileLayout, WeightLibrary, Weights};
use denoise_core::{Error, ErrorKind, Image, Result};
use denoise_transfer::{autoexposure, TransferFunction};

use crate::executor::{FlushMode, TileExecutor};
use crate::options::{FilterOptions, OptionKind, OptionSpec};
use crate::reorder::{InputImages, Scratch};
use crate::selector::select_weights;
use crate::variant::FilterVariant;

/// Commit state of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Never committed.
    Uncommitted,
    /// Committed and unchanged since.
    Committed,
    /// An option changed after the last commit.
    Dirty,
}

/// Everything `commit()` derives from the options.
struct Committed {
    weights: Weights,
    network: Arc<dyn Network>,
    layout: TileLayout,
    input_channels: usize,
    transfer: TransferFunction,
    inplace: bool,
    flush: FlushMode,
    /// Staging for in-place runs.
    scratch: Option<Scratch>,
}

/// A denoising filter created by a [`crate::Device`].
pub struct Filter {
    variant: FilterVariant,
    builder: Arc<dyn NetworkBuilder>,
    library: Arc<WeightLibrary>,
    pool: Option<Arc<ThreadPool>>,
    options: FilterOptions,
    state: FilterState,
    committed: Option<Committed>,
    verbose: u32,
}

impl Filter {
    /// Creates a filter that runs on the global rayon pool.
    pub fn new(variant: FilterVariant, builder: Arc<dyn NetworkBuilder>, library: Arc<WeightLibrary>) -> Self {
        Self {
            variant,
            builder,
            library,
            pool: None,
            options: FilterOptions::default(),
            state: FilterState::Uncommitted,
            committed: None,
            verbose: 0,
        }
    }

    pub(crate) fn with_device_settings(mut self, pool: Option<Arc<ThreadPool>>, max_memory_mb: i32, verbose: u32) -> Self {
        self.pool = pool;
        self.options.max_memory_mb = max_memory_mb;
        self.verbose = verbose;
        self
    }

    #[inline]
    pub fn variant(&self) -> &FilterVariant {
        &self.variant
    }

    #[inline]
    pub fn state(&self) -> FilterState {
        self.state
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        self.state == FilterState::Committed
    }

    /// Pending option values.
    #[inline]
    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Tile layout of the current commit.
    pub fn tile_layout(&self) -> Option<&TileLayout> {
        self.current().map(|c| &c.layout)
    }

    /// Whether the current commit runs in place.
    pub fn is_inplace(&self) -> Option<bool> {
        self.current().map(|c| c.inplace)
    }

    /// Weights of the current commit.
    pub fn committed_weights(&self) -> Option<&Weights> {
        self.current().map(|c| &c.weights)
    }

    fn current(&self) -> Option<&Committed> {
        if self.is_committed() { self.committed.as_ref() } else { None }
    }

    fn mark_dirty(&mut self) {
        if self.state == FilterState::Committed {
            trace!(filter = self.variant.name(), "filter dirty");
            self.state = FilterState::Dirty;
        }
    }

    // =========================================================================
    // Named options
    // =========================================================================

    fn lookup(&self, name: &str, kind: OptionKind) -> Result<&'static OptionSpec> {
        let spec = self
            .variant
            .option(name)
            .ok_or_else(|| Error::unsupported_option(name, self.variant.name()))?;
        if spec.kind != kind {
            return Err(Error::type_mismatch(name, kind.name(), spec.kind.name()));
        }
        Ok(spec)
    }

    fn lookup_writable(&self, name: &str, kind: OptionKind) -> Result<&'static OptionSpec> {
        let spec = self.lookup(name, kind)?;
        if spec.read_only {
            return Err(Error::invalid_argument(format!("option '{name}' is read-only")));
        }
        Ok(spec)
    }

    /// Binds or clears an image option.
    pub fn set_image(&mut self, name: &str, image: impl Into<Option<Image>>) -> Result<()> {
        let spec = self.lookup_writable(name, OptionKind::Image)?;
        let slot = self
            .options
            .image_slot(spec.name)
            .ok_or_else(|| Error::unsupported_option(name, self.variant.name()))?;
        *slot = image.into();
        self.mark_dirty();
        Ok(())
    }

    pub fn get_image(&self, name: &str) -> Result<Option<Image>> {
        let spec = self.lookup(name, OptionKind::Image)?;
        self.options
            .image(spec.name)
            .cloned()
            .ok_or_else(|| Error::unsupported_option(name, self.variant.name()))
    }

    pub fn set_bool(&mut self, name: &str, value: bool) -> Result<()> {
        let spec = self.lookup_writable(name, OptionKind::Bool)?;
        let slot = self
            .options
            .bool_slot(spec.name)
            .ok_or_else(|| Error::unsupported_option(name, self.variant.name()))?;
        *slot = value;
        self.mark_dirty();
        Ok(())
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        let spec = self.lookup(name, OptionKind::Bool)?;
        self.options
            .bool_value(spec.name)
            .ok_or_else(|| Error::unsupported_option(name, self.variant.name()))
    }

    pub fn set_int(&mut self, name: &str, value: i32) -> Result<()> {
        self.lookup_writable(name, OptionKind::Int)?;
        match name {
            "maxMemoryMB" => self.options.max_memory_mb = value,
            _ => return Err(Error::unsupported_option(name, self.variant.name())),
        }
        self.mark_dirty();
        Ok(())
    }

    pub fn get_int(&self, name: &str) -> Result<i32> {
        self.lookup(name, OptionKind::Int)?;
        let constants = self.builder.constants();
        let value = match name {
            "maxMemoryMB" => return Ok(self.options.max_memory_mb),
            "alignment" => constants.alignment,
            "overlap" => constants.overlap(),
            _ => return Err(Error::unsupported_option(name, self.variant.name())),
        };
        i32::try_from(value).map_err(|_| Error::invalid_argument(format!("option '{name}' does not fit in an int")))
    }

    /// Sets a float option. `NaN` for `inputScale` / `hdrScale` selects the
    /// automatic scale.
    pub fn set_float(&mut self, name: &str, value: f32) -> Result<()> {
        self.lookup_writable(name, OptionKind::Float)?;
        match name {
            "inputScale" | "hdrScale" => {
                self.options.input_scale = if value.is_nan() { None } else { Some(value) };
            }
            _ => return Err(Error::unsupported_option(name, self.variant.name())),
        }
        self.mark_dirty();
        Ok(())
    }

    pub fn get_float(&self, name: &str) -> Result<f32> {
        self.lookup(name, OptionKind::Float)?;
        match name {
            "inputScale" | "hdrScale" => Ok(self.options.input_scale.unwrap_or(f32::NAN)),
            _ => Err(Error::unsupported_option(name, self.variant.name())),
        }
    }

    pub fn set_data(&mut self, name: &str, weights: Weights) -> Result<()> {
        self.lookup_writable(name, OptionKind::Data)?;
        self.options.user_weights = Some(weights);
        self.mark_dirty();
        Ok(())
    }

    /// Clears an image or data option.
    pub fn unset(&mut self, name: &str) -> Result<()> {
        let spec = self
            .variant
            .option(name)
            .ok_or_else(|| Error::unsupported_option(name, self.variant.name()))?;
        match spec.kind {
            OptionKind::Image => self.set_image(name, None::<Image>),
            OptionKind::Data => {
                self.options.user_weights = None;
                self.mark_dirty();
                Ok(())
            }
            other => Err(Error::type_mismatch(name, "data", other.name())),
        }
    }

    // =========================================================================
    // Typed setters
    // =========================================================================

    pub fn set_color(&mut self, image: impl Into<Option<Image>>) -> Result<()> {
        self.set_image("color", image)
    }

    pub fn set_albedo(&mut self, image: impl Into<Option<Image>>) -> Result<()> {
        self.set_image("albedo", image)
    }

    pub fn set_normal(&mut self, image: impl Into<Option<Image>>) -> Result<()> {
        self.set_image("normal", image)
    }

    pub fn set_output(&mut self, image: impl Into<Option<Image>>) -> Result<()> {
        self.set_image("output", image)
    }

    pub fn set_hdr(&mut self, hdr: bool) -> Result<()> {
        self.set_bool("hdr", hdr)
    }

    pub fn set_srgb(&mut self, srgb: bool) -> Result<()> {
        self.set_bool("srgb", srgb)
    }

    pub fn set_directional(&mut self, directional: bool) -> Result<()> {
        self.set_bool("directional", directional)
    }

    /// Stored only; no weight table has clean-aux blobs, so commit ignores it.
    pub fn set_clean_aux(&mut self, clean_aux: bool) -> Result<()> {
        self.set_bool("cleanAux", clean_aux)
    }

    /// `None` derives the scale from the color image for HDR transfers.
    pub fn set_input_scale(&mut self, scale: Option<f32>) -> Result<()> {
        self.set_float("inputScale", scale.unwrap_or(f32::NAN))
    }

    pub fn set_max_memory_mb(&mut self, mb: i32) -> Result<()> {
        self.set_int("maxMemoryMB", mb)
    }

    pub fn set_weights(&mut self, weights: Option<Weights>) -> Result<()> {
        match weights {
            Some(w) => self.set_data("weights", w),
            None => self.unset("weights"),
        }
    }

    // =========================================================================
    // Commit / execute
    // =========================================================================

    /// Resolves weights, tile layout and network for the current options.
    ///
    /// Does nothing when already committed.
    pub fn commit(&mut self) -> Result<()> {
        trace!(filter = self.variant.name(), state = ?self.state, "Filter::commit");
        if self.state == FilterState::Committed {
            return Ok(());
        }
        let committed = self.prepare()?;

        let layout = committed.layout;
        if self.verbose > 0 {
            info!(
                filter = self.variant.name(),
                tile_h = layout.tile_h,
                tile_w = layout.tile_w,
                tiles = layout.count(),
                inplace = committed.inplace,
                flush = ?committed.flush,
                scratch_bytes = committed.scratch.as_ref().map_or(0, Scratch::byte_size),
                "filter committed"
            );
        } else {
            debug!(
                filter = self.variant.name(),
                tile_h = layout.tile_h,
                tile_w = layout.tile_w,
                tiles = layout.count(),
                inplace = committed.inplace,
                flush = ?committed.flush,
                scratch_bytes = committed.scratch.as_ref().map_or(0, Scratch::byte_size),
                "filter committed"
            );
        }

        self.committed = Some(committed);
        self.state = FilterState::Committed;
        Ok(())
    }

    fn prepare(&self) -> Result<Committed> {
        let opts = &self.options;
        let color = opts.color.as_ref().ok_or(Error::MissingImage("color"))?;
        let output = opts.output.as_ref().ok_or(Error::MissingImage("output"))?;
        let (width, height) = color.dimensions();

        for (name, image) in opts.inputs().chain(std::iter::once(("output", output))) {
            if !image.format().has_rgb() {
                return Err(Error::unsupported_format(image.format(), name));
            }
            if image.dimensions() != (width, height) {
                return Err(Error::dimension_mismatch(name, image.dimensions(), (width, height)));
            }
        }

        let max_memory_mb = usize::try_from(opts.max_memory_mb).map_err(|_| {
            Error::invalid_argument(format!("maxMemoryMB must not be negative, got {}", opts.max_memory_mb))
        })?;
        if let Some(scale) = opts.input_scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(Error::invalid_argument(format!(
                    "inputScale must be finite and positive, got {scale}"
                )));
            }
        }

        if opts.clean_aux {
            warn!(filter = self.variant.name(), "cleanAux has no dedicated weights and is ignored");
        }
        if opts.hdr && opts.srgb {
            warn!(filter = self.variant.name(), "both hdr and srgb set, srgb is ignored");
        }
        let transfer = self.variant.transfer(opts);
        let table = self.variant.weight_table(&self.library);
        let weights = select_weights(table, opts.user_weights.as_ref(), self.variant.selection_inputs(opts))?;

        let layout = compute_tile_layout(
            height,
            width,
            self.builder.constants(),
            self.builder.memory_cost(),
            memory::mb_to_bytes(max_memory_mb),
        );
        let inplace = opts.inputs().any(|(_, image)| output.overlaps(image));
        let flush = if opts
            .inputs()
            .all(|(_, image)| !output.overlaps(image) || output.same_pixels(image))
        {
            FlushMode::Eager
        } else {
            FlushMode::Deferred
        };
        let input_channels = opts.input_channels();

        let reusable = self.committed.as_ref().filter(|prev| {
            prev.weights.ptr_eq(&weights)
                && prev.input_channels == input_channels
                && (prev.layout.tile_h, prev.layout.tile_w) == (layout.tile_h, layout.tile_w)
        });
        let network = match reusable {
            Some(prev) => {
                debug!("reusing network");
                prev.network.clone()
            }
            None => self
                .builder
                .build(&weights, input_channels, layout.tile_h, layout.tile_w)
                .map_err(|e| match e.kind() {
                    ErrorKind::Configuration | ErrorKind::Resource => e,
                    _ => Error::backend(format!("{} backend: {e}", self.builder.name())),
                })?,
        };

        let scratch = if inplace {
            let scratch = Scratch::new(width, height)?;
            let tile_bytes = self.builder.memory_cost().bytes(layout.tile_h * layout.tile_w);
            let budget = memory::mb_to_bytes(max_memory_mb);
            if tile_bytes.saturating_add(scratch.byte_size()) > budget {
                warn!(
                    scratch = %memory::format_bytes(scratch.byte_size()),
                    tiles = %memory::format_bytes(tile_bytes),
                    budget = %memory::format_bytes(budget),
                    "in-place staging exceeds memory budget"
                );
            }
            Some(scratch)
        } else {
            None
        };

        Ok(Committed {
            weights,
            network,
            layout,
            input_channels,
            transfer,
            inplace,
            flush,
            scratch,
        })
    }

    /// Denoises the color image into the output image.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperation`] unless committed; the output is untouched.
    /// Any tile failure aborts the call.
    pub fn execute(&mut self) -> Result<()> {
        trace!(filter = self.variant.name(), state = ?self.state, "Filter::execute");
        if self.state != FilterState::Committed {
            return Err(Error::invalid_operation("execute() called before commit()"));
        }
        match self.pool.clone() {
            Some(pool) => pool.install(|| self.run()),
            None => self.run(),
        }
    }

    fn run(&mut self) -> Result<()> {
        let start = Instant::now();
        let opts = &self.options;
        let committed = self
            .committed
            .as_mut()
            .ok_or_else(|| Error::invalid_operation("filter has no committed state"))?;
        let (Some(color), Some(output)) = (opts.color.as_ref(), opts.output.as_ref()) else {
            return Err(Error::invalid_operation("filter has no committed images"));
        };

        let scale = match opts.input_scale {
            Some(scale) => scale,
            None if committed.transfer.is_hdr() => autoexposure(color),
            None => 1.0,
        };
        let transfer = committed.transfer.with_input_scale(scale);

        let executor = TileExecutor {
            network: committed.network.as_ref(),
            layout: &committed.layout,
            inputs: InputImages {
                color,
                albedo: opts.albedo.as_ref(),
                normal: opts.normal.as_ref(),
            },
            output,
            transfer,
        };

        match committed.scratch.as_mut() {
            Some(scratch) => executor.run_in_place(scratch, committed.flush)?,
            None => executor.run_parallel()?,
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        if self.verbose > 0 {
            info!(filter = self.variant.name(), scale, elapsed_ms, "filter executed");
        } else {
            debug!(filter = self.variant.name(), scale, elapsed_ms, "filter executed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("variant", &self.variant.name())
            .field("backend", &self.builder.name())
            .field("state", &self.state)
            .field("layout", &self.tile_layout())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denoise_compute::{reference_library, CpuNetworkBuilder};
    use denoise_core::Format;

    fn rt_filter() -> Filter {
        Filter::new(
            FilterVariant::rt(),
            Arc::new(CpuNetworkBuilder::default()),
            Arc::new(reference_library().unwrap()),
        )
    }

    fn image(w: usize, h: usize) -> Image {
        Image::alloc(Format::Float3, w, h).unwrap()
    }

    #[test]
    fn test_state_machine() {
        let mut f = rt_filter();
        assert_eq!(f.state(), FilterState::Uncommitted);

        f.set_color(image(32, 32)).unwrap();
        assert_eq!(f.state(), FilterState::Uncommitted);
        f.set_output(image(32, 32)).unwrap();
        f.commit().unwrap();
        assert_eq!(f.state(), FilterState::Committed);

        f.set_hdr(true).unwrap();
        assert_eq!(f.state(), FilterState::Dirty);
        assert!(f.tile_layout().is_none());

        f.commit().unwrap();
        assert!(f.is_committed());
        assert!(f.tile_layout().is_some());
    }

    #[test]
    fn test_failed_commit_keeps_previous_state() {
        let mut f = rt_filter();
        f.set_color(image(32, 32)).unwrap();
        f.set_output(image(32, 32)).unwrap();
        f.commit().unwrap();

        f.set_max_memory_mb(-1).unwrap();
        assert!(f.commit().unwrap_err().is_configuration_error());
        assert_eq!(f.state(), FilterState::Dirty);

        f.set_max_memory_mb(100).unwrap();
        f.commit().unwrap();
        assert!(f.is_committed());
    }

    #[test]
    fn test_network_reused_when_key_unchanged() {
        let mut f = rt_filter();
        f.set_color(image(40, 40)).unwrap();
        f.set_output(image(40, 40)).unwrap();
        f.commit().unwrap();
        let first = f.committed.as_ref().unwrap().network.clone();

        // A different output image of the same size keeps weights and tile shape
        f.set_output(image(40, 40)).unwrap();
        f.commit().unwrap();
        let second = f.committed.as_ref().unwrap().network.clone();
        assert!(Arc::ptr_eq(&first, &second));

        f.set_hdr(true).unwrap();
        f.commit().unwrap();
        let third = f.committed.as_ref().unwrap().network.clone();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_input_scale_validation() {
        let mut f = rt_filter();
        f.set_color(image(16, 16)).unwrap();
        f.set_output(image(16, 16)).unwrap();
        f.set_input_scale(Some(-2.0)).unwrap();
        assert!(f.commit().is_err());
        f.set_input_scale(Some(f32::INFINITY)).unwrap();
        assert!(f.commit().is_err());
        f.set_input_scale(Some(0.5)).unwrap();
        f.commit().unwrap();
    }

    #[test]
    fn test_rejects_non_rgb_format() {
        let mut f = rt_filter();
        f.set_color(Image::alloc(Format::Float2, 16, 16).unwrap()).unwrap();
        f.set_output(image(16, 16)).unwrap();
        let err = f.commit().unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_inplace_detection() {
        let mut f = rt_filter();
        let color = image(24, 24);
        f.set_color(color.clone()).unwrap();
        f.set_output(color).unwrap();
        f.commit().unwrap();
        assert_eq!(f.is_inplace(), Some(true));

        f.set_output(image(24, 24)).unwrap();
        f.commit().unwrap();
        assert_eq!(f.is_inplace(), Some(false));
    }
}
