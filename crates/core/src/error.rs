//! Error taxonomy for the vector index engine.
//!
//! Every layer (index, storage, engine) reports failures through this one
//! enum so callers can match on the category without caring which layer
//! produced it.

use std::path::PathBuf;
use thiserror::Error;

/// All engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Dimension, index parameters or names are invalid
    #[error("invalid parameters: {message}")]
    InvalidParameters {
        /// What was wrong
        message: String,
    },

    /// Vector length does not match the collection dimension
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Collection dimension
        expected: usize,
        /// Length of the offending vector
        got: usize,
    },

    /// A collection with this name already exists in the database
    #[error("collection already exists: {database}/{name}")]
    CollectionAlreadyExists {
        /// Database (file prefix)
        database: String,
        /// Collection name
        name: String,
    },

    /// The collection does not exist
    #[error("collection not found: {database}/{name}")]
    CollectionNotFound {
        /// Database (file prefix)
        database: String,
        /// Collection name
        name: String,
    },

    /// A metadata value is not a string, integer, float or boolean
    #[error("unsupported metadata type for field '{field}': {found}")]
    UnsupportedMetadataType {
        /// Metadata field name
        field: String,
        /// Type that was found (e.g. "array")
        found: &'static str,
    },

    /// The filter expression could not be parsed
    #[error("invalid filter syntax at position {position}: {message}")]
    InvalidFilterSyntax {
        /// Byte offset into the filter string
        position: usize,
        /// Parser message
        message: String,
    },

    /// An index file is unreadable or fails checksum validation
    #[error("corrupt index file {}: {message}", path.display())]
    CorruptFile {
        /// File that failed to load
        path: PathBuf,
        /// What was wrong with it
        message: String,
    },

    /// An index file was written by a newer format version
    #[error("unsupported index format version {found} (max supported {supported})")]
    UnsupportedVersion {
        /// Version found in the file header
        found: u16,
        /// Newest version this build can read
        supported: u16,
    },

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for [`Error::InvalidParameters`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidParameters {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::CorruptFile`].
    pub fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::CorruptFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::CollectionNotFound`].
    pub fn not_found(database: &str, name: &str) -> Self {
        Error::CollectionNotFound {
            database: database.to_string(),
            name: name.to_string(),
        }
    }

    /// Check if this error is transient.
    ///
    /// Only I/O failures may succeed on retry. Corrupt or incompatible files
    /// never do.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Check if this is a missing-collection error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::CollectionNotFound { .. })
    }

    /// Check if the on-disk state is unusable.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            Error::CorruptFile { .. } | Error::UnsupportedVersion { .. }
        )
    }
}
