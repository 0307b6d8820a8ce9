//! Vector records and search results

use crate::metadata::{Metadata, MetadataValue};
use serde::{Deserialize, Serialize};

/// One stored vector with its identifier and scalar metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Caller-assigned identifier, unique within a collection
    pub id: String,

    /// Embedding components
    pub vector: Vec<f32>,

    /// Scalar metadata
    #[serde(default)]
    pub metadata: Metadata,
}

impl VectorRecord {
    /// Create a record without metadata
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        VectorRecord {
            id: id.into(),
            vector,
            metadata: Metadata::new(),
        }
    }

    /// Add a metadata field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Vector length
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    /// Project into a JSON object with `id` plus the requested metadata fields
    ///
    /// An empty `output_fields` slice returns every metadata field.
    pub fn to_json(&self, output_fields: &[String]) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert("id".to_string(), serde_json::Value::String(self.id.clone()));
        project_metadata(&self.metadata, output_fields, &mut object);
        serde_json::Value::Object(object)
    }
}

/// Search result entry
///
/// `distance` carries the raw metric value: squared L2 distance for `l2`,
/// inner product for `ip`, cosine similarity for `cosine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Record identifier
    pub id: String,

    /// Metric value
    pub distance: f32,

    /// Record metadata
    pub metadata: Metadata,
}

impl SearchHit {
    /// Create a new SearchHit
    pub fn new(id: impl Into<String>, distance: f32, metadata: Metadata) -> Self {
        SearchHit {
            id: id.into(),
            distance,
            metadata,
        }
    }

    /// Project into a JSON object with `id`, `distance` and requested fields
    pub fn to_json(&self, output_fields: &[String]) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert("id".to_string(), serde_json::Value::String(self.id.clone()));
        object.insert(
            "distance".to_string(),
            serde_json::Number::from_f64(self.distance as f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        );
        project_metadata(&self.metadata, output_fields, &mut object);
        serde_json::Value::Object(object)
    }
}

fn project_metadata(
    metadata: &Metadata,
    output_fields: &[String],
    object: &mut serde_json::Map<String, serde_json::Value>,
) {
    if output_fields.is_empty() {
        for (key, value) in metadata {
            object.entry(key.clone()).or_insert_with(|| value.to_json());
        }
        return;
    }
    for field in output_fields {
        if field == "id" || field == "distance" {
            continue;
        }
        if let Some(value) = metadata.get(field) {
            object.insert(field.clone(), value.to_json());
        }
    }
}
