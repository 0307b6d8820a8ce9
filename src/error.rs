//! Unified error type for the provider facade.
//!
//! Engine failures pass through unchanged inside [`Error::Engine`] so callers
//! can still match the full taxonomy; the facade adds the two failure kinds
//! that only exist at this layer.

use thiserror::Error;

/// All provider errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Provider configuration is missing or unusable
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An insert row could not be turned into a record
    #[error("invalid row {index}: {message}")]
    InvalidRow {
        /// Position of the row in the batch
        index: usize,
        /// What was wrong with it
        message: String,
    },

    /// Error raised by the index engine
    #[error(transparent)]
    Engine(#[from] quiver_core::Error),
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn row(index: usize, message: impl Into<String>) -> Self {
        Error::InvalidRow {
            index,
            message: message.into(),
        }
    }

    /// Check if this error is retryable.
    ///
    /// Only filesystem failures may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Engine(e) if e.is_retryable())
    }

    /// Check if this is a missing-collection error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Engine(e) if e.is_not_found())
    }

    /// Check if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// The engine error, if this wraps one
    pub fn engine(&self) -> Option<&quiver_core::Error> {
        match self {
            Error::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Engine(quiver_core::Error::Io(e))
    }
}
