//! Weight blobs and the per-filter tables they are selected from.
//!
//! A [`Weights`] value is an opaque, shared byte blob. Its identity (not its
//! content) decides whether a committed network can be reused, so cloning is
//! cheap and [`Weights::ptr_eq`] is the comparison the filter uses.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use denoise_core::Result;

/// Shared, immutable weight blob.
#[derive(Clone)]
pub struct Weights {
    bytes: Arc<[u8]>,
}

impl Weights {
    /// Wraps a blob.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::from(bytes.into().into_boxed_slice()),
        }
    }

    /// Reads a blob from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether both handles refer to the same blob.
    #[inline]
    pub fn ptr_eq(&self, other: &Weights) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for Weights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Weights")
            .field("len", &self.bytes.len())
            .field("ptr", &self.bytes.as_ptr())
            .finish()
    }
}

/// Slot of a [`WeightTable`].
///
/// Tiers follow the bound auxiliary inputs: color only, color + albedo,
/// color + albedo + normal, each for HDR and LDR input, plus the directional
/// lightmap blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeightSlot {
    Hdr,
    HdrAlb,
    HdrAlbNrm,
    Ldr,
    LdrAlb,
    LdrAlbNrm,
    Dir,
}

impl WeightSlot {
    /// All slots in table order.
    pub const ALL: [WeightSlot; 7] = [
        Self::Hdr,
        Self::HdrAlb,
        Self::HdrAlbNrm,
        Self::Ldr,
        Self::LdrAlb,
        Self::LdrAlbNrm,
        Self::Dir,
    ];

    /// Slot for a color-tier selection.
    pub fn for_inputs(hdr: bool, albedo: bool, normal: bool) -> Self {
        match (hdr, albedo, normal) {
            (true, true, true) => Self::HdrAlbNrm,
            (true, true, false) => Self::HdrAlb,
            (true, false, _) => Self::Hdr,
            (false, true, true) => Self::LdrAlbNrm,
            (false, true, false) => Self::LdrAlb,
            (false, false, _) => Self::Ldr,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Hdr => "hdr",
            Self::HdrAlb => "hdr_alb",
            Self::HdrAlbNrm => "hdr_alb_nrm",
            Self::Ldr => "ldr",
            Self::LdrAlb => "ldr_alb",
            Self::LdrAlbNrm => "ldr_alb_nrm",
            Self::Dir => "dir",
        }
    }

    /// Packed input channels of a network trained for this slot.
    pub const fn input_channels(self) -> usize {
        match self {
            Self::Hdr | Self::Ldr | Self::Dir => 3,
            Self::HdrAlb | Self::LdrAlb => 6,
            Self::HdrAlbNrm | Self::LdrAlbNrm => 9,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for WeightSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Built-in weights of one filter type. Empty slots are legal.
#[derive(Debug, Clone, Default)]
pub struct WeightTable {
    slots: [Option<Weights>; 7],
}

impl WeightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, slot: WeightSlot, weights: Weights) -> Self {
        self.set(slot, weights);
        self
    }

    pub fn set(&mut self, slot: WeightSlot, weights: Weights) {
        self.slots[slot.index()] = Some(weights);
    }

    pub fn get(&self, slot: WeightSlot) -> Option<&Weights> {
        self.slots[slot.index()].as_ref()
    }

    /// Slots holding a blob.
    pub fn available(&self) -> impl Iterator<Item = WeightSlot> + '_ {
        WeightSlot::ALL.into_iter().filter(|s| self.get(*s).is_some())
    }
}

/// Weight tables for every filter type a device can create.
#[derive(Debug, Clone, Default)]
pub struct WeightLibrary {
    /// Ray-tracing beauty filter.
    pub rt: WeightTable,
    /// Lightmap filter.
    pub rt_lightmap: WeightTable,
}
