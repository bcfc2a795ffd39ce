//! Devices own a network backend, the builtin weights and a worker pool.
//!
//! Filters created by one device share all three.

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use denoise_compute::{memory, reference_library, CpuNetworkBuilder, NetworkBuilder, WeightLibrary};
use denoise_core::{Error, Result};

use crate::filter::Filter;
use crate::variant::{FilterKind, FilterVariant};

/// Device settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Worker threads. 0 uses the global rayon pool.
    pub num_threads: usize,
    /// 0 = quiet, higher logs filter commits and executions at info level.
    pub verbose: u32,
    /// Initial `maxMemoryMB` of new filters.
    pub max_memory_mb: usize,
}

impl Default for DeviceConfig {
    /// Defaults, overridden by `DENOISE_NUM_THREADS`, `DENOISE_VERBOSE` and
    /// `DENOISE_MAX_MEMORY_MB`.
    fn default() -> Self {
        Self {
            num_threads: memory::num_threads_override().unwrap_or(0),
            verbose: memory::verbose_override().unwrap_or(0),
            max_memory_mb: memory::max_memory_override().unwrap_or(memory::DEFAULT_MAX_MEMORY_MB),
        }
    }
}

/// Factory for filters.
pub struct Device {
    builder: Arc<dyn NetworkBuilder>,
    library: Arc<WeightLibrary>,
    pool: Option<Arc<ThreadPool>>,
    config: DeviceConfig,
}

impl Device {
    /// Device with the default config.
    pub fn new(builder: Arc<dyn NetworkBuilder>, library: WeightLibrary) -> Result<Self> {
        Self::with_config(builder, library, DeviceConfig::default())
    }

    pub fn with_config(builder: Arc<dyn NetworkBuilder>, library: WeightLibrary, config: DeviceConfig) -> Result<Self> {
        let max_memory_mb = i32::try_from(config.max_memory_mb)
            .map_err(|_| Error::invalid_argument(format!("max memory of {} MB is out of range", config.max_memory_mb)))?;
        if memory::exceeds_system_memory(config.max_memory_mb) {
            warn!(
                max_memory_mb,
                system = %memory::system_memory().map_or_else(|| "unknown".into(), |b| memory::format_bytes(b as usize)),
                "memory budget exceeds system memory"
            );
        }

        let pool = if config.num_threads > 0 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.num_threads)
                .thread_name(|i| format!("denoise-{i}"))
                .build()
                .map_err(|e| Error::backend(format!("failed to create thread pool: {e}")))?;
            Some(Arc::new(pool))
        } else {
            None
        };

        debug!(
            backend = builder.name(),
            threads = pool.as_ref().map_or_else(rayon::current_num_threads, |p| p.current_num_threads()),
            max_memory_mb,
            "device created"
        );

        Ok(Self {
            builder,
            library: Arc::new(library),
            pool,
            config,
        })
    }

    /// CPU device with the reference network and builtin weights.
    pub fn cpu() -> Result<Self> {
        Self::new(Arc::new(CpuNetworkBuilder::default()), reference_library()?)
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.builder.name()
    }

    /// Worker threads filters of this device execute on.
    pub fn num_threads(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, |p| p.current_num_threads())
    }

    /// Creates a filter by type name (`"RT"` or `"RTLightmap"`).
    pub fn new_filter(&self, kind: &str) -> Result<Filter> {
        let kind = FilterKind::parse(kind)?;
        Ok(self.new_filter_of(kind))
    }

    pub fn new_filter_of(&self, kind: FilterKind) -> Filter {
        // Fits i32, checked in with_config
        let max_memory_mb = self.config.max_memory_mb as i32;
        Filter::new(FilterVariant::for_kind(kind), self.builder.clone(), self.library.clone()).with_device_settings(
            self.pool.clone(),
            max_memory_mb,
            self.config.verbose,
        )
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("backend", &self.builder.name())
            .field("config", &self.config)
            .finish()
    }
}
