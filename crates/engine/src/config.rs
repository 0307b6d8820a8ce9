//! Engine configuration
//!
//! # Persistence Modes
//!
//! | Mode | Save point | Data loss window |
//! |------|------------|------------------|
//! | Immediate | Every mutation, inside the write lock | None |
//! | Deferred | `flush()`, `evict()`, `close()` | Mutations since the last flush |
//!
//! Deferred mode writes a `{file}.dirty` marker before the first unsaved
//! mutation. A marker found at load time means the process stopped without
//! flushing; the last saved snapshot is loaded, rebuilt and re-saved.
//!
//! # Example
//!
//! ```ignore
//! let config = EngineConfig::builder()
//!     .index_path("./data")
//!     .deferred()
//!     .build()?;
//! ```

use quiver_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default directory for index files
pub const DEFAULT_INDEX_PATH: &str = "./quiver-data";

/// Default fraction of stale records that triggers an IVF rebuild
pub const DEFAULT_REBUILD_STALE_RATIO: f64 = 0.2;

/// When mutations reach disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// Save after every mutation (safest)
    #[default]
    Immediate,
    /// Save on flush, eviction or close (fastest)
    Deferred,
}

impl PersistMode {
    /// Whether every mutation is saved before it returns
    pub fn is_immediate(&self) -> bool {
        matches!(self, PersistMode::Immediate)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            PersistMode::Immediate => "Save after every mutation (no loss window)",
            PersistMode::Deferred => "Save on flush (loss window until flush)",
        }
    }
}

/// Configuration for a [`CollectionManager`](crate::CollectionManager)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding `.qvec` files
    pub index_path: PathBuf,

    /// When mutations are saved
    pub persist_mode: PersistMode,

    /// After a delete, an IVF collection whose stale records exceed this
    /// fraction of its size is rebuilt
    pub rebuild_stale_ratio: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            persist_mode: PersistMode::default(),
            rebuild_stale_ratio: DEFAULT_REBUILD_STALE_RATIO,
        }
    }
}

impl EngineConfig {
    /// Defaults with the given index directory
    pub fn new(index_path: impl AsRef<Path>) -> Self {
        EngineConfig {
            index_path: index_path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Start a builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Parse from TOML text; missing keys take defaults
    ///
    /// # Errors
    /// `InvalidParameters` if the text is not valid configuration.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)
            .map_err(|e| Error::invalid(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// `Io` if the file cannot be read, `InvalidParameters` if it does not
    /// parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check field ranges
    ///
    /// # Errors
    /// `InvalidParameters` for an empty path or a negative or non-finite
    /// rebuild ratio.
    pub fn validate(&self) -> Result<()> {
        if self.index_path.as_os_str().is_empty() {
            return Err(Error::invalid("index_path must not be empty"));
        }
        if !self.rebuild_stale_ratio.is_finite() || self.rebuild_stale_ratio < 0.0 {
            return Err(Error::invalid(format!(
                "rebuild_stale_ratio must be a non-negative number, got {}",
                self.rebuild_stale_ratio
            )));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`]
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the index directory
    pub fn index_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.index_path = path.as_ref().to_path_buf();
        self
    }

    /// Save after every mutation
    pub fn immediate(mut self) -> Self {
        self.config.persist_mode = PersistMode::Immediate;
        self
    }

    /// Save only on flush, eviction or close
    pub fn deferred(mut self) -> Self {
        self.config.persist_mode = PersistMode::Deferred;
        self
    }

    /// Set the auto-rebuild threshold
    pub fn rebuild_stale_ratio(mut self, ratio: f64) -> Self {
        self.config.rebuild_stale_ratio = ratio;
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
