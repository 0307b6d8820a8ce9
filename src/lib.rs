//! # Quiver
//!
//! Local, file-backed vector similarity index.
//!
//! Quiver stores fixed-dimension `f32` vectors in named collections, one
//! `.qvec` file per collection, and answers nearest-neighbour searches with
//! optional metadata filters. It is meant to sit behind a host application's
//! generic vector-store interface ([`VdbProvider`]).
//!
//! ## Quick Start
//!
//! ```ignore
//! use quiverdb::prelude::*;
//!
//! let provider = LocalProvider::new(ProviderConfig::new("./vectors"))?;
//! provider.create_collection("docs", 3, SimilarityMetric::EuclideanDistance, "site")?;
//! provider.insert_into_collection(
//!     "docs",
//!     &[json!({"id": "a", "vector": [1.0, 0.0, 0.0], "lang": "en"})],
//!     "site",
//! )?;
//! let hits = provider.vector_search("docs", &[1.0, 0.0, 0.0], &[], "lang == 'en'", 10, 0, "site")?;
//! ```
//!
//! ## Layers
//!
//! - [`quiver_core`] - records, metadata, errors, configuration types
//! - [`quiver_index`] - distance kernels, IVF/PQ training, filters, `IndexStore`
//! - [`quiver_storage`] - file format and atomic persistence
//! - [`quiver_engine`] - collection registry and locking
//!
//! ## Index Kinds
//!
//! | Kind | Search | Training |
//! |------|--------|----------|
//! | `flat` | Exhaustive, exact | None |
//! | `ivf_flat` | `nprobe` nearest clusters, exact scores | Once `nlist` records exist |
//! | `ivf_pq` | `nprobe` clusters, PQ shortlist, exact re-score | Once `nlist` records exist |

#![warn(missing_docs)]

mod config;
mod error;
mod provider;

pub mod prelude;

pub use config::{ProviderConfig, DEFAULT_NLIST};
pub use error::{Error, Result};
pub use provider::{
    LocalProvider, SettingsEntry, SettingsStatus, SimilarityMetric, VdbProvider,
    DEFAULT_DATABASE,
};

// Re-export engine types used in the provider surface
pub use quiver_core::{DistanceMetric, IndexKind, IndexParams, SearchHit, VectorRecord};
pub use quiver_engine::{DropStatus, PersistMode};

pub use quiver_core;
pub use quiver_engine;
pub use quiver_index;
pub use quiver_storage;
