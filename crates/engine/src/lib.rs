//! Collection management for Quiver
//!
//! This crate ties the index and storage layers together:
//! - Registry of resident collections with lazy loading ([`CollectionManager`])
//! - Per-collection readers-writer locking
//! - Persistence policy and auto-rebuild threshold ([`EngineConfig`])
//!
//! # Example
//!
//! ```ignore
//! let manager = CollectionManager::new(EngineConfig::new("./data"))?;
//! manager.create_collection("docs", "default", 384, DistanceMetric::Cosine, IndexKind::Flat, IndexParams::default())?;
//! manager.insert("docs", "default", records)?;
//! let hits = manager.search("docs", "default", &SearchRequest::new(query, 10))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod manager;

pub use config::{
    EngineConfig, EngineConfigBuilder, PersistMode, DEFAULT_INDEX_PATH,
    DEFAULT_REBUILD_STALE_RATIO,
};
pub use manager::{CollectionHandle, CollectionManager, DropStatus, QueryRequest, SearchRequest};
