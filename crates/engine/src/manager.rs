//! Collection manager
//!
//! The manager owns a registry of resident collections keyed by their index
//! file, so a file is never held by two handles. Each entry is a [`CollectionHandle`] wrapping the
//! collection's [`IndexStore`] in a readers-writer lock: searches and queries
//! share it, mutations take it exclusively. Collections are loaded lazily on
//! first access.
//!
//! Lock order is handle lock, then registry shard. The registry is never
//! held while waiting for a handle lock. Loads happen under the vacant
//! registry entry, so a file is read and repaired by one loader at a time.
//!
//! A handle can leave the registry two ways:
//! - dropped: the collection is gone; holders see `CollectionNotFound`
//! - retired: the in-memory copy was discarded (failed save or eviction);
//!   holders re-resolve and reload from disk

use crate::config::{EngineConfig, PersistMode};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use quiver_core::{
    CollectionConfig, CollectionId, CollectionInfo, DistanceMetric, Error, IndexKind,
    IndexParams, Result, SearchHit, VectorRecord,
};
use quiver_index::{FilterExpr, IndexState, IndexStore};
use quiver_storage as storage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of [`CollectionManager::drop_collection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropStatus {
    /// The collection existed and was removed
    Dropped,
    /// There was no such collection
    NotFound,
}

/// Nearest-neighbour search parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Query vector
    pub vector: Vec<f32>,
    /// Maximum hits returned
    pub limit: usize,
    /// Hits skipped from the top of the ranking
    pub offset: usize,
    /// Metadata filter expression
    pub filter: Option<String>,
    /// Rank by this metric instead of the collection's
    pub metric_override: Option<DistanceMetric>,
}

impl SearchRequest {
    /// Search for the `limit` nearest records
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        SearchRequest {
            vector,
            limit,
            offset: 0,
            filter: None,
            metric_override: None,
        }
    }

    /// Skip the first `offset` hits
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Only consider records matching `filter`
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Rank with `metric`
    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric_override = Some(metric);
        self
    }
}

/// Metadata-only query parameters
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Metadata filter expression; `None` matches all
    pub filter: Option<String>,
    /// Maximum records returned
    pub limit: usize,
    /// Matches skipped in insertion order
    pub offset: usize,
}

impl QueryRequest {
    /// Query up to `limit` matches of `filter`
    pub fn new(filter: Option<&str>, limit: usize) -> Self {
        QueryRequest {
            filter: filter.map(str::to_string),
            limit,
            offset: 0,
        }
    }

    /// Skip the first `offset` matches
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// A resident collection
#[derive(Debug)]
pub struct CollectionHandle {
    id: CollectionId,
    path: PathBuf,
    store: RwLock<IndexStore>,
    dropped: AtomicBool,
    retired: AtomicBool,
    unsaved: AtomicBool,
}

impl CollectionHandle {
    fn new(id: CollectionId, path: PathBuf, store: IndexStore) -> Self {
        CollectionHandle {
            id,
            path,
            store: RwLock::new(store),
            dropped: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            unsaved: AtomicBool::new(false),
        }
    }

    /// Collection identity
    pub fn id(&self) -> &CollectionId {
        &self.id
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

fn info_of(id: &CollectionId, store: &IndexStore) -> CollectionInfo {
    CollectionInfo {
        id: id.clone(),
        config: *store.config(),
        count: store.len(),
        created_at: store.created_at(),
        clean: store.state() == IndexState::Clean,
    }
}

/// Registry of collections backed by one index directory
#[derive(Debug)]
pub struct CollectionManager {
    config: EngineConfig,
    collections: DashMap<PathBuf, Arc<CollectionHandle>>,
}

impl CollectionManager {
    /// Create a manager; no files are touched until the first operation
    ///
    /// # Errors
    /// `InvalidParameters` if the config does not validate.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        info!(
            target: "quiver::engine",
            path = %config.index_path.display(),
            mode = ?config.persist_mode,
            "Collection manager ready"
        );
        Ok(CollectionManager {
            config,
            collections: DashMap::new(),
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of collections currently held in memory
    pub fn resident_count(&self) -> usize {
        self.collections.len()
    }

    fn path_for(&self, id: &CollectionId) -> PathBuf {
        storage::collection_path(&self.config.index_path, id)
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Load from disk, repairing an unclean deferred shutdown
    ///
    /// Callers hold the vacant registry entry for `path`.
    fn load_store(&self, id: &CollectionId, path: &Path) -> Result<IndexStore> {
        let mut store = storage::load(path)?;
        if storage::is_marked_dirty(path) {
            warn!(
                target: "quiver::engine",
                collection = %id,
                "Unsaved changes were lost; rebuilding from last saved snapshot"
            );
            store.rebuild();
            storage::save(path, &store)?;
            storage::clear_dirty(path)?;
        }
        debug!(target: "quiver::engine", collection = %id, records = store.len(), "Loaded collection");
        Ok(store)
    }

    fn resolve(&self, id: &CollectionId) -> Result<Arc<CollectionHandle>> {
        let path = self.path_for(id);
        if let Some(handle) = self.collections.get(&path) {
            return Ok(Arc::clone(handle.value()));
        }
        match self.collections.entry(path.clone()) {
            Entry::Occupied(e) => Ok(Arc::clone(e.get())),
            Entry::Vacant(v) => {
                if !storage::exists(&path) {
                    return Err(Error::not_found(&id.database, &id.name));
                }
                let store = self.load_store(id, &path)?;
                let handle = Arc::new(CollectionHandle::new(id.clone(), path, store));
                v.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    fn unregister(&self, handle: &Arc<CollectionHandle>) {
        self.collections
            .remove_if(&handle.path, |_, h| Arc::ptr_eq(h, handle));
    }

    fn with_read<T>(&self, id: &CollectionId, f: impl FnOnce(&IndexStore) -> Result<T>) -> Result<T> {
        loop {
            let handle = self.resolve(id)?;
            let store = handle.store.read();
            if handle.is_dropped() {
                return Err(Error::not_found(&id.database, &id.name));
            }
            if handle.is_retired() {
                continue;
            }
            return f(&store);
        }
    }

    fn with_write<T>(
        &self,
        id: &CollectionId,
        f: impl FnOnce(&mut IndexStore) -> Result<T>,
    ) -> Result<T> {
        loop {
            let handle = self.resolve(id)?;
            let mut store = handle.store.write();
            if handle.is_dropped() {
                return Err(Error::not_found(&id.database, &id.name));
            }
            if handle.is_retired() {
                continue;
            }
            if self.config.persist_mode == PersistMode::Deferred
                && !handle.unsaved.load(Ordering::Acquire)
            {
                storage::mark_dirty(&handle.path)?;
                handle.unsaved.store(true, Ordering::Release);
            }
            let out = f(&mut store)?;
            if self.config.persist_mode == PersistMode::Immediate {
                if let Err(e) = storage::save(&handle.path, &store) {
                    warn!(
                        target: "quiver::engine",
                        collection = %id,
                        error = %e,
                        "Save failed; discarding in-memory changes"
                    );
                    handle.retired.store(true, Ordering::Release);
                    drop(store);
                    self.unregister(&handle);
                    return Err(e);
                }
            }
            return Ok(out);
        }
    }

    // ========================================================================
    // Collection lifecycle
    // ========================================================================

    /// Create an empty collection from a validated config
    ///
    /// # Errors
    /// - `InvalidParameters` for bad names
    /// - `CollectionAlreadyExists` if resident or already on disk
    /// - `Io` if the file cannot be written
    pub fn create_with_config(
        &self,
        name: &str,
        database: &str,
        config: CollectionConfig,
    ) -> Result<CollectionInfo> {
        let id = CollectionId::validated(database, name)?;
        let store = IndexStore::with_config(config);
        let path = self.path_for(&id);
        match self.collections.entry(path.clone()) {
            Entry::Occupied(_) => Err(Error::CollectionAlreadyExists {
                database: id.database,
                name: id.name,
            }),
            Entry::Vacant(v) => {
                if storage::exists(&path) {
                    return Err(Error::CollectionAlreadyExists {
                        database: id.database,
                        name: id.name,
                    });
                }
                storage::save(&path, &store)?;
                let info = info_of(&id, &store);
                v.insert(Arc::new(CollectionHandle::new(id.clone(), path, store)));
                info!(
                    target: "quiver::engine",
                    collection = %id,
                    dimension = config.dimension,
                    metric = %config.metric,
                    kind = %config.kind,
                    "Created collection"
                );
                Ok(info)
            }
        }
    }

    /// Create an empty collection and persist it
    ///
    /// # Errors
    /// As [`create_with_config`](Self::create_with_config), plus
    /// `InvalidParameters` if `params` do not fit `kind` and `dimension`.
    pub fn create_collection(
        &self,
        name: &str,
        database: &str,
        dimension: usize,
        metric: DistanceMetric,
        kind: IndexKind,
        params: IndexParams,
    ) -> Result<CollectionInfo> {
        let config = CollectionConfig::new(dimension, metric, kind, params)?;
        self.create_with_config(name, database, config)
    }

    /// Remove a collection and its file
    ///
    /// Never fails for a missing collection. Holders of the dropped
    /// collection observe `CollectionNotFound` on their next operation.
    ///
    /// # Errors
    /// `InvalidParameters` for bad names, `Io` if the file cannot be removed.
    pub fn drop_collection(&self, name: &str, database: &str) -> Result<DropStatus> {
        let id = CollectionId::validated(database, name)?;
        let path = self.path_for(&id);
        loop {
            let resident = self.collections.get(&path).map(|h| Arc::clone(h.value()));
            if let Some(handle) = resident {
                let guard = handle.store.write();
                if handle.is_dropped() || handle.is_retired() {
                    drop(guard);
                    self.unregister(&handle);
                    continue;
                }
                storage::delete(&handle.path)?;
                handle.dropped.store(true, Ordering::Release);
                drop(guard);
                self.unregister(&handle);
                info!(target: "quiver::engine", collection = %id, "Dropped collection");
                return Ok(DropStatus::Dropped);
            }
            match self.collections.entry(path.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(_) => {
                    let status = storage::delete(&path)?;
                    return Ok(match status {
                        storage::DeleteStatus::Deleted => {
                            info!(target: "quiver::engine", collection = %id, "Dropped collection");
                            DropStatus::Dropped
                        }
                        storage::DeleteStatus::NotFound => DropStatus::NotFound,
                    });
                }
            }
        }
    }

    /// Names of the collections stored for `database`
    ///
    /// Names are sorted, but callers should treat the order as unspecified.
    ///
    /// # Errors
    /// `InvalidParameters` for a bad database name, `Io` if the index
    /// directory cannot be read.
    pub fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        quiver_core::validate_database_name(database)?;
        storage::list_collection_names(&self.config.index_path, database)
    }

    /// Whether a collection exists (resident or on disk)
    pub fn exists(&self, name: &str, database: &str) -> bool {
        let path = self.path_for(&CollectionId::new(database, name));
        self.collections.contains_key(&path) || storage::exists(&path)
    }

    /// Configuration and size of a collection
    ///
    /// # Errors
    /// `CollectionNotFound` if it does not exist.
    pub fn collection_info(&self, name: &str, database: &str) -> Result<CollectionInfo> {
        let id = CollectionId::validated(database, name)?;
        self.with_read(&id, |store| Ok(info_of(&id, store)))
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Insert or replace records
    ///
    /// # Errors
    /// - `CollectionNotFound` if the collection does not exist
    /// - `DimensionMismatch` / `InvalidParameters` for bad records (nothing
    ///   is written)
    /// - `Io` if the save fails (nothing is kept)
    pub fn insert(&self, name: &str, database: &str, records: Vec<VectorRecord>) -> Result<usize> {
        let id = CollectionId::validated(database, name)?;
        let count = self.with_write(&id, |store| store.add(records))?;
        debug!(target: "quiver::engine", collection = %id, count, "Inserted records");
        Ok(count)
    }

    /// Remove records by id; unknown ids are ignored
    ///
    /// IVF collections whose stale share exceeds `rebuild_stale_ratio`, or
    /// whose structure was discarded, are rebuilt before the call returns.
    ///
    /// # Errors
    /// `CollectionNotFound` if the collection does not exist, `Io` if the
    /// save fails.
    pub fn delete<S: AsRef<str>>(&self, name: &str, database: &str, ids: &[S]) -> Result<usize> {
        let id = CollectionId::validated(database, name)?;
        let ratio = self.config.rebuild_stale_ratio;
        let removed = self.with_write(&id, |store| {
            let removed = store.remove(ids);
            // An untrained Dirty store lost its structure to compaction or
            // was saved mid-rebuild
            if store.config().kind.is_ivf()
                && store.state() == IndexState::Dirty
                && (!store.is_trained()
                    || store.stale_removals() as f64 > ratio * store.len() as f64)
            {
                info!(
                    target: "quiver::engine",
                    collection = %id,
                    stale = store.stale_removals(),
                    records = store.len(),
                    "Stale threshold reached; rebuilding"
                );
                store.rebuild();
            }
            Ok(removed)
        })?;
        debug!(target: "quiver::engine", collection = %id, removed, "Deleted records");
        Ok(removed)
    }

    /// Retrain the collection's search structure
    ///
    /// # Errors
    /// `CollectionNotFound` if the collection does not exist, `Io` if the
    /// save fails.
    pub fn rebuild(&self, name: &str, database: &str) -> Result<()> {
        let id = CollectionId::validated(database, name)?;
        self.with_write(&id, |store| {
            store.rebuild();
            Ok(())
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Nearest records to `request.vector`
    ///
    /// The filter is parsed before the collection is touched.
    ///
    /// # Errors
    /// - `InvalidFilterSyntax` for a malformed filter
    /// - `CollectionNotFound` if the collection does not exist
    /// - `DimensionMismatch` for a query of the wrong length
    pub fn search(
        &self,
        name: &str,
        database: &str,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>> {
        let filter = FilterExpr::parse_optional(request.filter.as_deref())?;
        let id = CollectionId::validated(database, name)?;
        let k = request.offset.saturating_add(request.limit);
        self.with_read(&id, |store| {
            let hits = store.search_filtered(
                &request.vector,
                k,
                request.metric_override,
                filter.as_ref(),
            )?;
            Ok(hits.into_iter().skip(request.offset).collect())
        })
    }

    /// Records matching `request.filter`, in insertion order
    ///
    /// # Errors
    /// `InvalidFilterSyntax` for a malformed filter, `CollectionNotFound`
    /// if the collection does not exist.
    pub fn query(
        &self,
        name: &str,
        database: &str,
        request: &QueryRequest,
    ) -> Result<Vec<VectorRecord>> {
        let filter = FilterExpr::parse_optional(request.filter.as_deref())?;
        let id = CollectionId::validated(database, name)?;
        self.with_read(&id, |store| {
            Ok(store
                .scan(filter.as_ref())
                .skip(request.offset)
                .take(request.limit)
                .cloned()
                .collect())
        })
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    fn persist_handle(&self, handle: &CollectionHandle, store: &IndexStore) -> Result<()> {
        if handle.unsaved.load(Ordering::Acquire) {
            storage::save(&handle.path, store)?;
            storage::clear_dirty(&handle.path)?;
            handle.unsaved.store(false, Ordering::Release);
            debug!(target: "quiver::engine", collection = %handle.id, "Flushed collection");
        }
        Ok(())
    }

    /// Save every collection with unsaved changes
    ///
    /// All collections are attempted; the first error is returned.
    pub fn flush(&self) -> Result<()> {
        let handles: Vec<Arc<CollectionHandle>> = self
            .collections
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        let mut first_error = None;
        let mut flushed = 0usize;
        for handle in handles {
            let store = handle.store.write();
            if handle.is_dropped() || handle.is_retired() {
                continue;
            }
            let was_unsaved = handle.unsaved.load(Ordering::Acquire);
            match self.persist_handle(&handle, &store) {
                Ok(()) if was_unsaved => flushed += 1,
                Ok(()) => {}
                Err(e) => {
                    warn!(target: "quiver::engine", collection = %handle.id, error = %e, "Flush failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if flushed > 0 {
            info!(target: "quiver::engine", flushed, "Flushed collections");
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Save and release a resident collection
    ///
    /// Returns whether it was resident.
    ///
    /// # Errors
    /// `Io` if the save fails; the collection then stays resident.
    pub fn evict(&self, name: &str, database: &str) -> Result<bool> {
        let id = CollectionId::validated(database, name)?;
        let Some(handle) = self
            .collections
            .get(&self.path_for(&id))
            .map(|h| Arc::clone(h.value()))
        else {
            return Ok(false);
        };
        let store = handle.store.write();
        if handle.is_dropped() || handle.is_retired() {
            return Ok(false);
        }
        self.persist_handle(&handle, &store)?;
        handle.retired.store(true, Ordering::Release);
        drop(store);
        self.unregister(&handle);
        debug!(target: "quiver::engine", collection = %id, "Evicted collection");
        Ok(true)
    }

    /// Flush and release every collection
    ///
    /// # Errors
    /// The first flush error; collections that failed to save stay resident.
    pub fn close(&self) -> Result<()> {
        let result = self.flush();
        let handles: Vec<Arc<CollectionHandle>> = self
            .collections
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for handle in handles {
            let store = handle.store.write();
            if handle.unsaved.load(Ordering::Acquire) {
                continue;
            }
            handle.retired.store(true, Ordering::Release);
            drop(store);
            self.unregister(&handle);
        }
        info!(target: "quiver::engine", "Collection manager closed");
        result
    }
}

impl Drop for CollectionManager {
    fn drop(&mut self) {
        if self.config.persist_mode == PersistMode::Deferred {
            if let Err(e) = self.flush() {
                warn!(target: "quiver::engine", error = %e, "Flush on drop failed");
            }
        }
    }
}
