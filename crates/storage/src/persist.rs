//! Atomic save, load and delete of index files
//!
//! Saves write a uniquely named temp file in the target directory, fsync
//! it, rename it over the destination and fsync the directory. A reader
//! therefore sees either the previous complete file or the new one.

use crate::format::{decode_store, encode_store};
use quiver_core::Result;
use quiver_index::IndexStore;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of [`delete`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// The file existed and was removed
    Deleted,
    /// There was no file
    NotFound,
}

/// Write `store` to `path` atomically, creating the directory if needed
///
/// # Errors
/// `Io` on any filesystem failure; the destination is left untouched.
pub fn save(path: &Path, store: &IndexStore) -> Result<()> {
    let bytes = encode_store(store)?;
    let dir = parent_dir(path);
    fs::create_dir_all(&dir)?;

    let tmp = temp_path(path);
    if let Err(e) = write_synced(&tmp, &bytes).and_then(|_| fs::rename(&tmp, path)) {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            if cleanup.kind() != io::ErrorKind::NotFound {
                warn!(target: "quiver::storage", path = %tmp.display(), error = %cleanup, "Failed to remove temp file");
            }
        }
        return Err(e.into());
    }
    sync_dir(&dir)?;
    debug!(
        target: "quiver::storage",
        path = %path.display(),
        bytes = bytes.len(),
        records = store.len(),
        "Saved index"
    );
    Ok(())
}

/// Read and verify the index at `path`
///
/// # Errors
/// - `Io` if the file cannot be read
/// - `CorruptFile` if it fails validation
/// - `UnsupportedVersion` if written by a newer format
pub fn load(path: &Path) -> Result<IndexStore> {
    let bytes = fs::read(path)?;
    let store = decode_store(path, &bytes)?;
    debug!(
        target: "quiver::storage",
        path = %path.display(),
        records = store.len(),
        "Loaded index"
    );
    Ok(store)
}

/// Whether an index file exists at `path`
pub fn exists(path: &Path) -> bool {
    path.is_file()
}

/// Remove the index at `path` and its dirty marker
///
/// # Errors
/// `Io` for failures other than the file being absent.
pub fn delete(path: &Path) -> Result<DeleteStatus> {
    crate::paths::clear_dirty(path)?;
    match fs::remove_file(path) {
        Ok(()) => {
            sync_dir(&parent_dir(path))?;
            Ok(DeleteStatus::Deleted)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DeleteStatus::NotFound),
        Err(e) => Err(e.into()),
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parent_dir(path).join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}
