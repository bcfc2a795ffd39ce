//! Weight selection from the bound inputs.

use denoise_compute::{WeightSlot, WeightTable, Weights};
use denoise_core::{Error, Result};
use tracing::debug;

/// Which inputs a selection is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionInputs {
    pub albedo: bool,
    pub normal: bool,
    pub hdr: bool,
    pub directional: bool,
}

/// Picks the weight blob for a filter.
///
/// 1. A normal image without an albedo image is rejected, even when the
///    caller supplied its own weights.
/// 2. User weights win over the table.
/// 3. Directional input with no auxiliary images uses the `dir` slot.
/// 4. Otherwise the tier follows the bound images and the HDR flag.
///
/// # Errors
///
/// [`Error::InvalidArgument`] for normal without albedo, or when the table
/// has no blob in the required slot.
pub fn select_weights(
    table: &WeightTable,
    user: Option<&Weights>,
    inputs: SelectionInputs,
) -> Result<Weights> {
    if inputs.normal && !inputs.albedo {
        return Err(Error::invalid_argument(
            "a normal image requires an albedo image",
        ));
    }

    if let Some(weights) = user {
        debug!(len = weights.len(), "using user weights");
        return Ok(weights.clone());
    }

    let slot = if inputs.directional && !inputs.albedo {
        WeightSlot::Dir
    } else {
        WeightSlot::for_inputs(inputs.hdr, inputs.albedo, inputs.normal)
    };

    let weights = table.get(slot).ok_or_else(|| {
        Error::invalid_argument(format!("no built-in weights for '{slot}' input combination"))
    })?;
    debug!(%slot, "selected built-in weights");
    Ok(weights.clone())
}
