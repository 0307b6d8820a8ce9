//! Convenient imports for Quiver.
//!
//! ```ignore
//! use quiverdb::prelude::*;
//!
//! let provider = LocalProvider::new(ProviderConfig::new("./vectors"))?;
//! ```

// Provider surface
pub use crate::config::ProviderConfig;
pub use crate::provider::{LocalProvider, SimilarityMetric, VdbProvider, DEFAULT_DATABASE};

// Error handling
pub use crate::error::{Error, Result};

// Engine types
pub use quiver_core::{DistanceMetric, IndexKind, IndexParams, SearchHit, VectorRecord};
pub use quiver_engine::{
    CollectionManager, DropStatus, EngineConfig, PersistMode, QueryRequest, SearchRequest,
};

// Re-export serde_json for convenience
pub use serde_json::json;
