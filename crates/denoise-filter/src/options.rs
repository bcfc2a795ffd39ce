//! Filter options and their named surface.
//!
//! Options are addressed by name, the way host applications usually bind
//! them. Every filter variant publishes a table of [`OptionSpec`]s; the
//! filter checks each access against that table before touching
//! [`FilterOptions`].

use std::fmt;

use denoise_compute::{memory, Weights};
use denoise_core::Image;

/// Value type of an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Image,
    Bool,
    Int,
    Float,
    Data,
}

impl OptionKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of a variant's option table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: OptionKind,
    pub read_only: bool,
}

impl OptionSpec {
    pub const fn new(name: &'static str, kind: OptionKind) -> Self {
        Self {
            name,
            kind,
            read_only: false,
        }
    }

    pub const fn read_only(name: &'static str, kind: OptionKind) -> Self {
        Self {
            name,
            kind,
            read_only: true,
        }
    }
}

/// Options shared by every filter variant.
pub const COMMON_OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("color", OptionKind::Image),
    OptionSpec::new("output", OptionKind::Image),
    OptionSpec::new("weights", OptionKind::Data),
    OptionSpec::new("inputScale", OptionKind::Float),
    OptionSpec::new("hdrScale", OptionKind::Float),
    OptionSpec::new("maxMemoryMB", OptionKind::Int),
    OptionSpec::read_only("alignment", OptionKind::Int),
    OptionSpec::read_only("overlap", OptionKind::Int),
];

/// Pending option values of a filter.
#[derive(Debug, Clone)]
pub struct FilterOptions {
    pub color: Option<Image>,
    pub albedo: Option<Image>,
    pub normal: Option<Image>,
    pub output: Option<Image>,
    pub hdr: bool,
    pub srgb: bool,
    pub directional: bool,
    /// Accepted and readable but ignored: the weight tables carry no
    /// clean-aux blobs, so selection does not depend on it.
    pub clean_aux: bool,
    /// `None` derives the scale from the color image for HDR transfers.
    pub input_scale: Option<f32>,
    pub max_memory_mb: i32,
    pub user_weights: Option<Weights>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            color: None,
            albedo: None,
            normal: None,
            output: None,
            hdr: false,
            srgb: false,
            directional: false,
            clean_aux: false,
            input_scale: None,
            max_memory_mb: memory::DEFAULT_MAX_MEMORY_MB as i32,
            user_weights: None,
        }
    }
}

impl FilterOptions {
    /// Bound input images with their option names.
    pub fn inputs(&self) -> impl Iterator<Item = (&'static str, &Image)> {
        [
            ("color", self.color.as_ref()),
            ("albedo", self.albedo.as_ref()),
            ("normal", self.normal.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, image)| image.map(|i| (name, i)))
    }

    /// Packed network input channels for the bound images.
    pub fn input_channels(&self) -> usize {
        3 + 3 * usize::from(self.albedo.is_some()) + 3 * usize::from(self.normal.is_some())
    }

    pub(crate) fn image_slot(&mut self, name: &str) -> Option<&mut Option<Image>> {
        match name {
            "color" => Some(&mut self.color),
            "albedo" => Some(&mut self.albedo),
            "normal" => Some(&mut self.normal),
            "output" => Some(&mut self.output),
            _ => None,
        }
    }

    pub(crate) fn image(&self, name: &str) -> Option<&Option<Image>> {
        match name {
            "color" => Some(&self.color),
            "albedo" => Some(&self.albedo),
            "normal" => Some(&self.normal),
            "output" => Some(&self.output),
            _ => None,
        }
    }

    pub(crate) fn bool_slot(&mut self, name: &str) -> Option<&mut bool> {
        match name {
            "hdr" => Some(&mut self.hdr),
            "srgb" => Some(&mut self.srgb),
            "directional" => Some(&mut self.directional),
            "cleanAux" => Some(&mut self.clean_aux),
            _ => None,
        }
    }

    pub(crate) fn bool_value(&self, name: &str) -> Option<bool> {
        match name {
            "hdr" => Some(self.hdr),
            "srgb" => Some(self.srgb),
            "directional" => Some(self.directional),
            "cleanAux" => Some(self.clean_aux),
            _ => None,
        }
    }
}
