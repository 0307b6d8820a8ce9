//! Index file naming and dirty markers
//!
//! A collection `name` in database `db` lives at `{root}/{db}_{name}.qvec`.
//! Database names never contain `_`, so every file belongs to exactly one
//! `(db, name)` pair and listing a database by its `{db}_` prefix is exact.
//!
//! A dirty marker `{file}.dirty` records that in-memory changes have not
//! yet been saved.

use crate::persist::{parent_dir, sync_dir};
use quiver_core::{CollectionId, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Index file extension
pub const EXTENSION: &str = "qvec";

const DIRTY_SUFFIX: &str = ".dirty";

/// Path of the index file for `id`
pub fn collection_path(root: &Path, id: &CollectionId) -> PathBuf {
    root.join(format!("{}.{}", id.file_stem(), EXTENSION))
}

/// Collection names stored for `database`, sorted
///
/// A missing root directory yields an empty list.
///
/// # Errors
/// `Io` if the directory exists but cannot be read.
pub fn list_collection_names(root: &Path, database: &str) -> Result<Vec<String>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let prefix = format!("{}_", database);
    let suffix = format!(".{}", EXTENSION);
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(name) = file_name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(&suffix))
        {
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Path of the dirty marker for the index at `path`
pub fn dirty_marker(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(DIRTY_SUFFIX);
    PathBuf::from(os)
}

/// Durably record that the index at `path` has unsaved changes
///
/// # Errors
/// `Io` if the marker cannot be written.
pub fn mark_dirty(path: &Path) -> Result<()> {
    let marker = dirty_marker(path);
    if marker.exists() {
        return Ok(());
    }
    let dir = parent_dir(path);
    fs::create_dir_all(&dir)?;
    File::create(&marker)?.sync_all()?;
    sync_dir(&dir)?;
    Ok(())
}

/// Remove the dirty marker, if any
///
/// # Errors
/// `Io` for failures other than the marker being absent.
pub fn clear_dirty(path: &Path) -> Result<()> {
    match fs::remove_file(dirty_marker(path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Whether a dirty marker exists for the index at `path`
pub fn is_marked_dirty(path: &Path) -> bool {
    dirty_marker(path).exists()
}
