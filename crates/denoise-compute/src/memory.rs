//! Memory budgeting and environment overrides.
//!
//! # Environment Variables
//!
//! - `DENOISE_MAX_MEMORY_MB` - Default memory budget of new filters, in MB
//! - `DENOISE_NUM_THREADS` - Worker threads of a device (0 = rayon default)
//! - `DENOISE_VERBOSE` - Verbosity level of a device (0-3)

use std::env;
use std::sync::OnceLock;

/// Default memory budget of a filter in megabytes.
pub const DEFAULT_MAX_MEMORY_MB: usize = 2000;

const MB: usize = 1024 * 1024;

/// Cache for system memory detection.
static SYSTEM_MEMORY: OnceLock<Option<u64>> = OnceLock::new();

/// Total system RAM in bytes, if it can be detected.
pub fn system_memory() -> Option<u64> {
    *SYSTEM_MEMORY.get_or_init(|| sys_info::mem_info().ok().map(|m| m.total * 1024))
}

/// Megabytes to bytes, saturating.
#[inline]
pub fn mb_to_bytes(mb: usize) -> usize {
    mb.saturating_mul(MB)
}

/// Whether a budget of `budget_mb` exceeds the detected system RAM.
pub fn exceeds_system_memory(budget_mb: usize) -> bool {
    system_memory().is_some_and(|total| mb_to_bytes(budget_mb) as u64 > total)
}

/// `DENOISE_MAX_MEMORY_MB` override.
pub fn max_memory_override() -> Option<usize> {
    env_usize("DENOISE_MAX_MEMORY_MB")
}

/// `DENOISE_NUM_THREADS` override.
pub fn num_threads_override() -> Option<usize> {
    env_usize("DENOISE_NUM_THREADS")
}

/// `DENOISE_VERBOSE` override, clamped to 3.
pub fn verbose_override() -> Option<u32> {
    env::var("DENOISE_VERBOSE")
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .map(|v| v.min(3))
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Format bytes as human-readable string.
pub fn format_bytes(bytes: usize) -> String {
    let bytes = bytes as u64;
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{} KB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
