//! Persistence for Quiver indexes
//!
//! This crate implements the on-disk side of a collection:
//! - `.qvec` file format with header and body checksums ([`format`])
//! - Atomic save via temp file and rename ([`persist`])
//! - File naming, database listing and dirty markers ([`paths`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod paths;
pub mod persist;

pub use format::{FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use paths::{
    clear_dirty, collection_path, dirty_marker, is_marked_dirty, list_collection_names, mark_dirty,
};
pub use persist::{delete, exists, load, save, DeleteStatus};
