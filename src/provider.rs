//! Vector database provider interface and its local implementation.
//!
//! A host application talks to any vector store through [`VdbProvider`].
//! [`LocalProvider`] serves it from `.qvec` files in one directory; the
//! host's database name becomes the file prefix.
//!
//! Rows and results are JSON objects so the host never depends on engine
//! types:
//!
//! ```json
//! {"id": "node:1", "vector": [0.1, 0.2, 0.3], "lang": "en", "weight": 2}
//! ```

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use quiver_core::{metadata_from_json_object, DistanceMetric, VectorRecord};
use quiver_engine::{CollectionManager, DropStatus, QueryRequest, SearchRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Database used when the host does not name one
pub const DEFAULT_DATABASE: &str = "default";

const VECTOR_KEYS: [&str; 2] = ["vector", "embedding"];
const RESERVED_KEYS: [&str; 3] = ["id", "vector", "embedding"];

/// Host-side similarity metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimilarityMetric {
    /// Euclidean distance (`l2`)
    EuclideanDistance,
    /// Cosine similarity (`cosine`)
    #[default]
    CosineSimilarity,
    /// Inner product (`ip`)
    InnerProduct,
}

impl From<SimilarityMetric> for DistanceMetric {
    fn from(metric: SimilarityMetric) -> Self {
        match metric {
            SimilarityMetric::EuclideanDistance => DistanceMetric::L2,
            SimilarityMetric::CosineSimilarity => DistanceMetric::Cosine,
            SimilarityMetric::InnerProduct => DistanceMetric::InnerProduct,
        }
    }
}

/// Health of a settings entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingsStatus {
    /// Working as configured
    Ok,
    /// Usable but needs attention
    Warning,
    /// Not usable
    Error,
}

/// One line of the settings summary shown by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsEntry {
    /// Short label
    pub label: &'static str,
    /// Value or message
    pub info: String,
    /// Health, where it applies
    pub status: Option<SettingsStatus>,
}

impl SettingsEntry {
    fn new(label: &'static str, info: impl Into<String>) -> Self {
        SettingsEntry {
            label,
            info: info.into(),
            status: None,
        }
    }

    fn with_status(mut self, status: SettingsStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Call surface a host uses to drive a vector store
pub trait VdbProvider: Send + Sync {
    /// Whether the store is reachable and usable
    fn ping(&self) -> bool;

    /// Whether the provider has been configured
    fn is_setup(&self) -> bool;

    /// Human-readable settings overview
    fn settings_summary(&self) -> Vec<SettingsEntry>;

    /// Collections in `database`
    fn list_collections(&self, database: &str) -> Result<Vec<String>>;

    /// Create an empty collection
    fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: SimilarityMetric,
        database: &str,
    ) -> Result<()>;

    /// Remove a collection; absence is reported, not an error
    fn drop_collection(&self, name: &str, database: &str) -> Result<DropStatus>;

    /// Insert or replace JSON rows; returns the number written
    fn insert_into_collection(&self, name: &str, rows: &[Value], database: &str)
        -> Result<usize>;

    /// Remove records by id; returns the number removed
    fn delete_from_collection(&self, name: &str, ids: &[String], database: &str)
        -> Result<usize>;

    /// Metadata-only query; an empty filter matches everything
    fn query_search(
        &self,
        name: &str,
        output_fields: &[String],
        filter: &str,
        limit: usize,
        offset: usize,
        database: &str,
    ) -> Result<Vec<Value>>;

    /// Nearest-neighbour search with an optional filter
    #[allow(clippy::too_many_arguments)]
    fn vector_search(
        &self,
        name: &str,
        vector: &[f32],
        output_fields: &[String],
        filter: &str,
        limit: usize,
        offset: usize,
        database: &str,
    ) -> Result<Vec<Value>>;
}

/// Provider backed by index files in a local directory
#[derive(Debug)]
pub struct LocalProvider {
    config: ProviderConfig,
    manager: CollectionManager,
}

impl LocalProvider {
    /// Validate `config` and open the provider
    ///
    /// # Errors
    /// `Configuration` if the settings do not validate.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let manager = CollectionManager::new(config.engine_config())?;
        info!(
            target: "quiver::provider",
            path = %config.index_path.display(),
            kind = %config.index_kind,
            "Local provider opened"
        );
        Ok(LocalProvider { config, manager })
    }

    /// Provider settings
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Underlying collection manager
    pub fn manager(&self) -> &CollectionManager {
        &self.manager
    }

    /// Save pending changes (deferred mode)
    pub fn flush(&self) -> Result<()> {
        Ok(self.manager.flush()?)
    }

    /// Save pending changes and release all collections
    pub fn close(&self) -> Result<()> {
        Ok(self.manager.close()?)
    }
}

impl VdbProvider for LocalProvider {
    fn ping(&self) -> bool {
        self.config.validate().is_ok()
    }

    fn is_setup(&self) -> bool {
        self.config.is_setup()
    }

    fn settings_summary(&self) -> Vec<SettingsEntry> {
        let path = &self.config.index_path;
        let status = if path.is_dir() {
            SettingsStatus::Ok
        } else {
            SettingsStatus::Warning
        };
        let mut entries = vec![
            SettingsEntry::new("Status", format!("Index path: {}", path.display()))
                .with_status(status),
            SettingsEntry::new("Index Type", self.config.index_kind.name()),
            SettingsEntry::new("Distance Metric", self.config.metric.name()),
        ];
        if self.config.index_kind.is_ivf() {
            entries.push(SettingsEntry::new("Lists", self.config.nlist.to_string()));
        }
        entries.push(SettingsEntry::new(
            "Persistence",
            self.config.persist_mode.description(),
        ));
        entries
    }

    fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        Ok(self.manager.list_collections(database)?)
    }

    fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: SimilarityMetric,
        database: &str,
    ) -> Result<()> {
        self.manager.create_collection(
            name,
            database,
            dimension,
            metric.into(),
            self.config.index_kind,
            self.config.index_params(),
        )?;
        Ok(())
    }

    fn drop_collection(&self, name: &str, database: &str) -> Result<DropStatus> {
        Ok(self.manager.drop_collection(name, database)?)
    }

    fn insert_into_collection(
        &self,
        name: &str,
        rows: &[Value],
        database: &str,
    ) -> Result<usize> {
        let records = rows
            .iter()
            .enumerate()
            .map(|(i, row)| record_from_row(i, row))
            .collect::<Result<Vec<_>>>()?;
        let count = self.manager.insert(name, database, records)?;
        debug!(target: "quiver::provider", collection = name, database, count, "Inserted rows");
        Ok(count)
    }

    fn delete_from_collection(
        &self,
        name: &str,
        ids: &[String],
        database: &str,
    ) -> Result<usize> {
        Ok(self.manager.delete(name, database, ids)?)
    }

    fn query_search(
        &self,
        name: &str,
        output_fields: &[String],
        filter: &str,
        limit: usize,
        offset: usize,
        database: &str,
    ) -> Result<Vec<Value>> {
        let request = QueryRequest::new(Some(filter), limit).offset(offset);
        let records = self.manager.query(name, database, &request)?;
        Ok(records.iter().map(|r| r.to_json(output_fields)).collect())
    }

    fn vector_search(
        &self,
        name: &str,
        vector: &[f32],
        output_fields: &[String],
        filter: &str,
        limit: usize,
        offset: usize,
        database: &str,
    ) -> Result<Vec<Value>> {
        let mut request = SearchRequest::new(vector.to_vec(), limit).offset(offset);
        if !filter.trim().is_empty() {
            request = request.filter(filter);
        }
        match self.manager.search(name, database, &request) {
            Ok(hits) => Ok(hits.iter().map(|h| h.to_json(output_fields)).collect()),
            Err(e) if e.is_not_found() => {
                debug!(target: "quiver::provider", collection = name, database, "Search on missing collection");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Convert one JSON row into a record
fn record_from_row(index: usize, row: &Value) -> Result<VectorRecord> {
    let object = row
        .as_object()
        .ok_or_else(|| Error::row(index, "row must be a JSON object"))?;

    let id = match object.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
        Some(other) => {
            return Err(Error::row(
                index,
                format!("id must be a string or integer, got {}", other),
            ))
        }
        None => return Err(Error::row(index, "missing id")),
    };

    let components = VECTOR_KEYS
        .iter()
        .find_map(|key| object.get(*key))
        .ok_or_else(|| Error::row(index, "missing vector"))?
        .as_array()
        .ok_or_else(|| Error::row(index, "vector must be an array"))?;
    let vector = components
        .iter()
        .map(|c| c.as_f64().map(|x| x as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| Error::row(index, "vector components must be numbers"))?;

    let metadata = metadata_from_json_object(object, &RESERVED_KEYS)?;
    Ok(VectorRecord {
        id,
        vector,
        metadata,
    })
}
