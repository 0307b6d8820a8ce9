//! Core types for Quiver
//!
//! This crate defines the types shared by every layer:
//! - Error taxonomy ([`Error`], [`Result`])
//! - Collection configuration ([`DistanceMetric`], [`IndexKind`], [`IndexParams`])
//! - Records and results ([`VectorRecord`], [`SearchHit`], [`MetadataValue`])
//! - Deterministic record codec ([`codec`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod metadata;
pub mod record;
pub mod types;

pub use error::{Error, Result};
pub use metadata::{metadata_from_json_object, Metadata, MetadataValue};
pub use record::{SearchHit, VectorRecord};
pub use types::{
    validate_database_name, validate_name, CollectionConfig, CollectionId, CollectionInfo,
    DistanceMetric, IndexKind, IndexParams, FILE_SEPARATOR,
};
