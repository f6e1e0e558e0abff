//! Render system configuration.
//!
//! Configuration documents are JSON. Every field is optional; missing fields take the defaults
//! below. The cache capacity accepts either a byte count or a human-readable size like `"64M"`.

pub mod size;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pipeline::prefetch::{PrefetchStrategy, strategy_from_name};
use crate::types::CacheBudget;

pub use size::{ByteSize, format_size, parse_size};

pub type Result<T> = std::result::Result<T, ConfigError>;

const DEFAULT_PREFETCH_STRATEGY: &str = "transitions";
const DEFAULT_PREFETCH_DEPTH: u32 = 2;
const MAX_DEFAULT_WORKERS: usize = 8;

/// Which prefetch strategy to run and how far ahead it looks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrefetchConfig {
    pub strategy: String,
    pub depth: u32,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self { strategy: DEFAULT_PREFETCH_STRATEGY.to_string(), depth: DEFAULT_PREFETCH_DEPTH }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Upper bound on the summed cost of cached renders.
    pub cache_capacity: ByteSize,
    /// Number of render worker threads.
    pub workers: usize,
    /// zlib level used for cached pixels, 0 to 9.
    pub compression_level: u32,
    pub prefetch: PrefetchConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cache_capacity: ByteSize(CacheBudget::default().bytes_max),
            workers: default_workers(),
            compression_level: crate::codec::DEFAULT_COMPRESSION_LEVEL,
            prefetch: PrefetchConfig::default(),
        }
    }
}

impl RenderConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the cache capacity with a human-readable size such as `"10k"`.
    pub fn with_cache_capacity(mut self, capacity: &str) -> Result<Self> {
        self.cache_capacity = capacity.parse()?;
        Ok(self)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_prefetch(mut self, strategy: impl Into<String>, depth: u32) -> Self {
        self.prefetch = PrefetchConfig { strategy: strategy.into(), depth };
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        strategy_from_name(&self.prefetch.strategy, self.prefetch.depth).map(|_| ())
    }

    pub fn budget(&self) -> CacheBudget {
        CacheBudget { bytes_max: self.cache_capacity.bytes() }
    }

    /// Instantiate the configured prefetch strategy.
    pub fn build_strategy(&self) -> Result<Box<dyn PrefetchStrategy>> {
        strategy_from_name(&self.prefetch.strategy, self.prefetch.depth)
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
        .clamp(1, MAX_DEFAULT_WORKERS)
}
