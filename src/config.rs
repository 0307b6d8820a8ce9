//! Provider configuration.
//!
//! Supplied by the host application and treated as read-only input. Keys
//! follow the host's settings names; `index_type` and `distance_metric` are
//! accepted as aliases.
//!
//! ```toml
//! index_path = "/var/lib/app/vectors"
//! index_kind = "IndexIVFFlat"
//! metric = "cosine"
//! nlist = 64
//! ```

use crate::error::{Error, Result};
use quiver_core::{DistanceMetric, IndexKind, IndexParams};
use quiver_engine::{EngineConfig, PersistMode, DEFAULT_REBUILD_STALE_RATIO};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Default IVF cluster count
pub const DEFAULT_NLIST: usize = 100;

/// Provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Directory holding the index files
    pub index_path: PathBuf,

    /// Index structure for new collections
    #[serde(alias = "index_type")]
    pub index_kind: IndexKind,

    /// Default metric, reported in the settings summary
    #[serde(alias = "distance_metric")]
    pub metric: DistanceMetric,

    /// Cluster count for IVF kinds
    pub nlist: usize,

    /// When mutations reach disk
    pub persist_mode: PersistMode,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            index_path: PathBuf::new(),
            index_kind: IndexKind::Flat,
            metric: DistanceMetric::L2,
            nlist: DEFAULT_NLIST,
            persist_mode: PersistMode::Immediate,
        }
    }
}

impl ProviderConfig {
    /// Defaults with the given index directory
    pub fn new(index_path: impl AsRef<Path>) -> Self {
        ProviderConfig {
            index_path: index_path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Set the index kind for new collections
    pub fn with_kind(mut self, kind: IndexKind) -> Self {
        self.index_kind = kind;
        self
    }

    /// Set the IVF cluster count
    pub fn with_nlist(mut self, nlist: usize) -> Self {
        self.nlist = nlist;
        self
    }

    /// Save only on flush or close
    pub fn deferred(mut self) -> Self {
        self.persist_mode = PersistMode::Deferred;
        self
    }

    /// Parse TOML settings
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Configuration(format!("invalid settings: {}", e)))
    }

    /// Parse JSON settings
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid settings: {}", e)))
    }

    /// Whether an index path has been configured at all
    pub fn is_setup(&self) -> bool {
        !self.index_path.as_os_str().is_empty()
    }

    /// Check that the settings can serve collection operations
    ///
    /// # Errors
    /// `Configuration` if the index path is unset, is not an existing
    /// directory or is not writable, or if `nlist` is 0.
    pub fn validate(&self) -> Result<()> {
        if !self.is_setup() {
            return Err(Error::Configuration("index path is not configured".into()));
        }
        if !self.index_path.is_dir() {
            return Err(Error::Configuration(format!(
                "index path {} is not a directory",
                self.index_path.display()
            )));
        }
        probe_writable(&self.index_path)?;
        if self.nlist == 0 {
            return Err(Error::Configuration("nlist must be > 0".into()));
        }
        Ok(())
    }

    /// Engine settings derived from these
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            index_path: self.index_path.clone(),
            persist_mode: self.persist_mode,
            rebuild_stale_ratio: DEFAULT_REBUILD_STALE_RATIO,
        }
    }

    /// Index parameters for new collections
    pub fn index_params(&self) -> IndexParams {
        IndexParams::with_nlist(self.nlist)
    }
}

fn probe_writable(dir: &Path) -> Result<()> {
    let probe = dir.join(format!(".quiver-probe-{}", uuid::Uuid::new_v4().simple()));
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)
        .map_err(|e| {
            Error::Configuration(format!(
                "index path {} is not writable: {}",
                dir.display(),
                e
            ))
        })?;
    if let Err(e) = fs::remove_file(&probe) {
        tracing::warn!(target: "quiver::provider", path = %probe.display(), error = %e, "Failed to remove probe file");
    }
    Ok(())
}
