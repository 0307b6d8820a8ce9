//! Scalar metadata attached to vector records
//!
//! Metadata is a closed set of scalar types. Anything richer (arrays,
//! objects, null) is rejected at insert time with
//! [`Error::UnsupportedMetadataType`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Metadata mapping; BTreeMap so iteration (and encoding) is key-ordered
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean value
    Bool(bool),
    /// Signed integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
}

impl MetadataValue {
    /// Convert a JSON value, rejecting non-scalars
    ///
    /// Integers that fit in `i64` become `Int`; other numbers become `Float`.
    pub fn from_json(field: &str, value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value as J;
        match value {
            J::Bool(b) => Ok(MetadataValue::Bool(*b)),
            J::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(MetadataValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(MetadataValue::Float(f))
                } else {
                    Err(Error::UnsupportedMetadataType {
                        field: field.to_string(),
                        found: "number",
                    })
                }
            }
            J::String(s) => Ok(MetadataValue::String(s.clone())),
            J::Null => Err(unsupported(field, "null")),
            J::Array(_) => Err(unsupported(field, "array")),
            J::Object(_) => Err(unsupported(field, "object")),
        }
    }

    /// Convert to a JSON value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            MetadataValue::Bool(b) => serde_json::Value::Bool(*b),
            MetadataValue::Int(i) => serde_json::Value::from(*i),
            MetadataValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            MetadataValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Type name for messages
    pub fn type_name(&self) -> &'static str {
        match self {
            MetadataValue::Bool(_) => "bool",
            MetadataValue::Int(_) => "int",
            MetadataValue::Float(_) => "float",
            MetadataValue::String(_) => "string",
        }
    }

    /// Numeric view; ints widen to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String view
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values of compatible types
    ///
    /// Ints and floats compare numerically with each other, strings
    /// lexicographically, booleans only with booleans. Returns `None` for
    /// incompatible types or NaN.
    pub fn compare(&self, other: &MetadataValue) -> Option<Ordering> {
        use MetadataValue::*;
        match (self, other) {
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (String(a), String(b)) => Some(a.as_str().cmp(b.as_str())),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

fn unsupported(field: &str, found: &'static str) -> Error {
    Error::UnsupportedMetadataType {
        field: field.to_string(),
        found,
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Int(i) => write!(f, "{}", i),
            MetadataValue::Float(x) => write!(f, "{}", x),
            MetadataValue::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        MetadataValue::Int(v as i64)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::String(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}

/// Convert a JSON object into metadata, skipping the given reserved keys
pub fn metadata_from_json_object(
    object: &serde_json::Map<String, serde_json::Value>,
    reserved: &[&str],
) -> Result<Metadata> {
    let mut out = Metadata::new();
    for (key, value) in object {
        if reserved.contains(&key.as_str()) {
            continue;
        }
        out.insert(key.clone(), MetadataValue::from_json(key, value)?);
    }
    Ok(out)
}
