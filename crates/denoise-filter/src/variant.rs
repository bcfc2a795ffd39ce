//! Filter variants as capability records.
//!
//! A variant bundles what differs between filter types: the options it
//! accepts, how options map to a transfer function, which weight table it
//! draws from and which flags drive weight selection. The orchestrator in
//! [`crate::filter`] is shared.

use std::fmt;

use denoise_compute::{WeightLibrary, WeightTable};
use denoise_core::{Error, Result};
use denoise_transfer::TransferFunction;

use crate::options::{FilterOptions, OptionKind, OptionSpec, COMMON_OPTIONS};
use crate::selector::SelectionInputs;

/// Filter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// Ray-traced beauty with optional albedo and normal.
    Rt,
    /// Lightmaps, optionally directional.
    RtLightmap,
}

impl FilterKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rt => "RT",
            Self::RtLightmap => "RTLightmap",
        }
    }

    /// Parses a filter type name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "RT" => Ok(Self::Rt),
            "RTLightmap" => Ok(Self::RtLightmap),
            other => Err(Error::unsupported_option(other, "device (filter type)")),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const RT_OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("albedo", OptionKind::Image),
    OptionSpec::new("normal", OptionKind::Image),
    OptionSpec::new("hdr", OptionKind::Bool),
    OptionSpec::new("srgb", OptionKind::Bool),
    OptionSpec::new("cleanAux", OptionKind::Bool),
];

const RT_LIGHTMAP_OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("directional", OptionKind::Bool),
    OptionSpec::new("cleanAux", OptionKind::Bool),
];

/// Capability record of a filter type.
#[derive(Clone, Copy)]
pub struct FilterVariant {
    pub kind: FilterKind,
    options: &'static [OptionSpec],
    transfer: fn(&FilterOptions) -> TransferFunction,
    weight_table: fn(&WeightLibrary) -> &WeightTable,
    hdr_weights: fn(&FilterOptions) -> bool,
}

impl FilterVariant {
    /// RT: HDR (PU curve), linear LDR (sRGB curve) or sRGB LDR (identity).
    pub fn rt() -> Self {
        Self {
            kind: FilterKind::Rt,
            options: RT_OPTIONS,
            transfer: |o| {
                if o.hdr {
                    TransferFunction::hdr()
                } else if o.srgb {
                    TransferFunction::linear_ldr()
                } else {
                    TransferFunction::ldr()
                }
            },
            weight_table: rt_table,
            hdr_weights: |o| o.hdr,
        }
    }

    /// RTLightmap: always HDR, log curve or unclamped identity when directional.
    pub fn rt_lightmap() -> Self {
        Self {
            kind: FilterKind::RtLightmap,
            options: RT_LIGHTMAP_OPTIONS,
            transfer: |o| {
                if o.directional {
                    TransferFunction::directional()
                } else {
                    TransferFunction::log()
                }
            },
            weight_table: rt_lightmap_table,
            hdr_weights: |_| true,
        }
    }

    pub fn for_kind(kind: FilterKind) -> Self {
        match kind {
            FilterKind::Rt => Self::rt(),
            FilterKind::RtLightmap => Self::rt_lightmap(),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Looks up an option accepted by this variant.
    pub fn option(&self, name: &str) -> Option<&'static OptionSpec> {
        COMMON_OPTIONS
            .iter()
            .chain(self.options)
            .find(|o| o.name == name)
    }

    /// Every option accepted by this variant.
    pub fn options(&self) -> impl Iterator<Item = &'static OptionSpec> {
        COMMON_OPTIONS.iter().chain(self.options)
    }

    /// Transfer function for `options`, before the input scale is applied.
    pub fn transfer(&self, options: &FilterOptions) -> TransferFunction {
        (self.transfer)(options)
    }

    pub fn weight_table<'a>(&self, library: &'a WeightLibrary) -> &'a WeightTable {
        (self.weight_table)(library)
    }

    /// Inputs for weight selection.
    pub fn selection_inputs(&self, options: &FilterOptions) -> SelectionInputs {
        SelectionInputs {
            albedo: options.albedo.is_some(),
            normal: options.normal.is_some(),
            hdr: (self.hdr_weights)(options),
            directional: options.directional,
        }
    }
}

impl fmt::Debug for FilterVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterVariant")
            .field("kind", &self.kind)
            .field("options", &self.options().map(|o| o.name).collect::<Vec<_>>())
            .finish()
    }
}

fn rt_table(library: &WeightLibrary) -> &WeightTable {
    &library.rt
}

fn rt_lightmap_table(library: &WeightLibrary) -> &WeightTable {
    &library.rt_lightmap
}
