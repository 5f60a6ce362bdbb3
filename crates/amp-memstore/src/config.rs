//! Memstore configuration

use serde::{Deserialize, Serialize};

use amp_connector::config::ConnectorConfig;
use amp_connector::error::{ConnectorError, ConnectorResult};
use amp_connector::types::ModuleId;

/// Default number of rows in a read page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Nesting depth after which the generator stops filling optional properties.
pub const DEFAULT_GENERATOR_DEPTH: usize = 5;

/// Attempts made to produce a value that is not already taken.
pub const DEFAULT_UNIQUE_RETRIES: u32 = 100;

/// Configuration of a [`MemoryConnector`](crate::MemoryConnector).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemStoreConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "ModuleId::root")]
    pub module: ModuleId,

    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Maximum nesting depth of generated records.
    #[serde(default = "default_generator_depth")]
    pub generator_depth: usize,

    /// Retry budget for unique generated values.
    #[serde(default = "default_unique_retries")]
    pub unique_retries: u32,
}

fn default_provider() -> String {
    "memstore".to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_generator_depth() -> usize {
    DEFAULT_GENERATOR_DEPTH
}

fn default_unique_retries() -> u32 {
    DEFAULT_UNIQUE_RETRIES
}

impl Default for MemStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            module: ModuleId::root(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            generator_depth: DEFAULT_GENERATOR_DEPTH,
            unique_retries: DEFAULT_UNIQUE_RETRIES,
        }
    }
}

impl MemStoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_module(mut self, module: impl Into<ModuleId>) -> Self {
        self.module = module.into();
        self
    }

    pub fn with_page_size(mut self, default_size: usize, max_size: usize) -> Self {
        self.default_page_size = default_size;
        self.max_page_size = max_size;
        self
    }

    pub fn with_generator_depth(mut self, depth: usize) -> Self {
        self.generator_depth = depth;
        self
    }

    pub fn with_unique_retries(mut self, retries: u32) -> Self {
        self.unique_retries = retries;
        self
    }

    /// Effective page size for a requested size, clamped to `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

impl ConnectorConfig for MemStoreConfig {
    fn validate(&self) -> ConnectorResult<()> {
        if self.provider.is_empty() {
            return Err(ConnectorError::invalid_config("provider is required"));
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(ConnectorError::invalid_config("page sizes must be positive"));
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConnectorError::invalid_config(format!(
                "default page size {} exceeds maximum {}",
                self.default_page_size, self.max_page_size
            )));
        }
        if self.unique_retries == 0 {
            return Err(ConnectorError::invalid_config("unique_retries must be positive"));
        }
        Ok(())
    }

    fn redacted(&self) -> Self {
        self.clone()
    }
}
