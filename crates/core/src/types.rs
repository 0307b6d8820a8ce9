//! Collection-level types: metric, index kind, parameters and identifiers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance metric used to rank vectors
///
/// Scores keep the metric's natural direction:
/// `L2` is a distance (lower = more similar), `InnerProduct` and `Cosine`
/// are similarities (higher = more similar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Squared Euclidean distance, ascending
    #[default]
    #[serde(rename = "l2", alias = "euclidean")]
    L2,

    /// Raw inner product, descending
    #[serde(rename = "ip", alias = "inner_product", alias = "dot")]
    InnerProduct,

    /// Inner product of L2-normalized vectors, descending
    #[serde(rename = "cosine")]
    Cosine,
}

impl DistanceMetric {
    /// Short name used in configuration and file headers
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "ip",
            DistanceMetric::Cosine => "cosine",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "l2" | "euclidean" => Some(DistanceMetric::L2),
            "ip" | "inner_product" | "dot" | "dot_product" => Some(DistanceMetric::InnerProduct),
            "cosine" => Some(DistanceMetric::Cosine),
            _ => None,
        }
    }

    /// True when larger scores mean more similar
    pub fn higher_is_better(&self) -> bool {
        !matches!(self, DistanceMetric::L2)
    }

    /// Serialization value for the index file header
    pub fn to_byte(&self) -> u8 {
        match self {
            DistanceMetric::L2 => 0,
            DistanceMetric::InnerProduct => 1,
            DistanceMetric::Cosine => 2,
        }
    }

    /// Deserialization from the index file header
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(DistanceMetric::L2),
            1 => Some(DistanceMetric::InnerProduct),
            2 => Some(DistanceMetric::Cosine),
            _ => None,
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DistanceMetric::parse(s).ok_or_else(|| Error::invalid(format!("unknown metric '{}'", s)))
    }
}

/// Index structure backing a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IndexKind {
    /// Exhaustive exact search
    #[default]
    #[serde(rename = "flat", alias = "IndexFlatL2", alias = "IndexFlatIP")]
    Flat,

    /// Inverted file over k-means clusters, exact distances within clusters
    #[serde(rename = "ivf_flat", alias = "IndexIVFFlat")]
    IvfFlat,

    /// Inverted file with product-quantized codes
    #[serde(rename = "ivf_pq", alias = "IndexIVFPQ")]
    IvfPq,
}

impl IndexKind {
    /// Short name used in configuration and logs
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Flat => "flat",
            IndexKind::IvfFlat => "ivf_flat",
            IndexKind::IvfPq => "ivf_pq",
        }
    }

    /// Parse from string
    ///
    /// Accepts the short names as well as `IndexFlatL2`, `IndexFlatIP`,
    /// `IndexIVFFlat` and `IndexIVFPQ`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IndexFlatL2" | "IndexFlatIP" => return Some(IndexKind::Flat),
            "IndexIVFFlat" => return Some(IndexKind::IvfFlat),
            "IndexIVFPQ" => return Some(IndexKind::IvfPq),
            _ => {}
        }
        match s.to_lowercase().as_str() {
            "flat" => Some(IndexKind::Flat),
            "ivf_flat" | "ivfflat" => Some(IndexKind::IvfFlat),
            "ivf_pq" | "ivfpq" => Some(IndexKind::IvfPq),
            _ => None,
        }
    }

    /// True for the inverted-file kinds
    pub fn is_ivf(&self) -> bool {
        !matches!(self, IndexKind::Flat)
    }

    /// Serialization value for the index file header
    pub fn to_byte(&self) -> u8 {
        match self {
            IndexKind::Flat => 0,
            IndexKind::IvfFlat => 1,
            IndexKind::IvfPq => 2,
        }
    }

    /// Deserialization from the index file header
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(IndexKind::Flat),
            1 => Some(IndexKind::IvfFlat),
            2 => Some(IndexKind::IvfPq),
            _ => None,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        IndexKind::parse(s).ok_or_else(|| Error::invalid(format!("unknown index kind '{}'", s)))
    }
}

/// Default number of IVF clusters
pub const DEFAULT_NLIST: usize = 100;

/// Upper bound for the default `nprobe`
pub const DEFAULT_MAX_NPROBE: usize = 8;

/// Default PQ code width in bits (256 centroids per sub-quantizer)
pub const DEFAULT_PQ_BITS: u8 = 8;

/// Default IVF-PQ shortlist multiplier
pub const DEFAULT_REFINE_FACTOR: usize = 4;

/// Default k-means seed; fixed so training is reproducible
pub const DEFAULT_SEED: u64 = 0x5eed_cafe;

/// Index-kind parameters
///
/// Zero means "derive a default" for `nprobe`, `pq_m`, `min_train_size`
/// and `refine_factor`. [`IndexParams::resolve`] replaces those zeros with
/// concrete values for a given kind and dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    /// Number of clusters (IVF kinds)
    pub nlist: usize,
    /// Clusters probed per search
    pub nprobe: usize,
    /// Number of PQ sub-quantizers; must divide the dimension
    pub pq_m: usize,
    /// Bits per PQ code (1..=8)
    pub pq_bits: u8,
    /// Records required before the first IVF training
    pub min_train_size: usize,
    /// IVF-PQ shortlist is `k * refine_factor` before exact re-scoring
    pub refine_factor: usize,
    /// k-means seed
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        IndexParams {
            nlist: DEFAULT_NLIST,
            nprobe: 0,
            pq_m: 0,
            pq_bits: DEFAULT_PQ_BITS,
            min_train_size: 0,
            refine_factor: DEFAULT_REFINE_FACTOR,
            seed: DEFAULT_SEED,
        }
    }
}

impl IndexParams {
    /// Params with a given cluster count and defaults elsewhere
    pub fn with_nlist(nlist: usize) -> Self {
        IndexParams {
            nlist,
            ..Default::default()
        }
    }

    /// Set the probe count
    pub fn nprobe(mut self, nprobe: usize) -> Self {
        self.nprobe = nprobe;
        self
    }

    /// Set the training threshold
    pub fn min_train_size(mut self, n: usize) -> Self {
        self.min_train_size = n;
        self
    }

    /// Set the number of PQ sub-quantizers
    pub fn pq_m(mut self, m: usize) -> Self {
        self.pq_m = m;
        self
    }

    /// Set the PQ code width
    pub fn pq_bits(mut self, bits: u8) -> Self {
        self.pq_bits = bits;
        self
    }

    /// Validate against an index kind and dimension, filling in defaults
    ///
    /// # Errors
    /// - `InvalidParameters` if `dimension` is 0
    /// - `InvalidParameters` if `nlist` is 0 for an IVF kind
    /// - `InvalidParameters` if `pq_bits` is outside 1..=8 or `pq_m` does not
    ///   divide `dimension` (IVF-PQ)
    pub fn resolve(&self, kind: IndexKind, dimension: usize) -> Result<IndexParams> {
        if dimension == 0 {
            return Err(Error::invalid("dimension must be > 0"));
        }
        let mut out = *self;
        if !kind.is_ivf() {
            return Ok(out);
        }

        if out.nlist == 0 {
            return Err(Error::invalid(format!(
                "nlist must be > 0 for index kind {}",
                kind
            )));
        }
        if out.nprobe == 0 {
            out.nprobe = out.nlist.min(DEFAULT_MAX_NPROBE);
        }
        out.nprobe = out.nprobe.min(out.nlist);
        out.min_train_size = out.min_train_size.max(out.nlist);
        if out.refine_factor == 0 {
            out.refine_factor = DEFAULT_REFINE_FACTOR;
        }

        if kind == IndexKind::IvfPq {
            if !(1..=8).contains(&out.pq_bits) {
                return Err(Error::invalid(format!(
                    "pq_bits must be in 1..=8, got {}",
                    out.pq_bits
                )));
            }
            if out.pq_m == 0 {
                out.pq_m = default_pq_m(dimension);
            }
            if dimension % out.pq_m != 0 {
                return Err(Error::invalid(format!(
                    "pq_m {} does not divide dimension {}",
                    out.pq_m, dimension
                )));
            }
        }
        Ok(out)
    }
}

/// Largest divisor of `dimension` that is at most 8
fn default_pq_m(dimension: usize) -> usize {
    (1..=8.min(dimension))
        .rev()
        .find(|m| dimension % m == 0)
        .unwrap_or(1)
}

/// Collection configuration - immutable after creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Vector dimension, > 0
    pub dimension: usize,
    /// Ranking metric
    pub metric: DistanceMetric,
    /// Index structure
    pub kind: IndexKind,
    /// Resolved kind parameters
    pub params: IndexParams,
}

impl CollectionConfig {
    /// Build and validate a config
    pub fn new(
        dimension: usize,
        metric: DistanceMetric,
        kind: IndexKind,
        params: IndexParams,
    ) -> Result<Self> {
        let params = params.resolve(kind, dimension)?;
        Ok(CollectionConfig {
            dimension,
            metric,
            kind,
            params,
        })
    }

    /// Flat config with default parameters
    pub fn flat(dimension: usize, metric: DistanceMetric) -> Result<Self> {
        Self::new(dimension, metric, IndexKind::Flat, IndexParams::default())
    }
}

/// Identifies a collection: database prefix plus collection name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionId {
    /// Database name (file prefix)
    pub database: String,
    /// Collection name
    pub name: String,
}

impl CollectionId {
    /// Create a new CollectionId without validation
    pub fn new(database: impl Into<String>, name: impl Into<String>) -> Self {
        CollectionId {
            database: database.into(),
            name: name.into(),
        }
    }

    /// Create a CollectionId, rejecting names that cannot form a file name
    pub fn validated(database: &str, name: &str) -> Result<Self> {
        validate_database_name(database)?;
        validate_name("collection", name)?;
        Ok(Self::new(database, name))
    }

    /// File stem `{database}_{name}`
    pub fn file_stem(&self) -> String {
        format!("{}{}{}", self.database, FILE_SEPARATOR, self.name)
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.database, self.name)
    }
}

/// Validate a database or collection name
///
/// Names become part of a file name, so they must be non-empty and free of
/// path separators, dots and NUL bytes.
pub fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid(format!("{} name must not be empty", what)));
    }
    if name.len() > 200 {
        return Err(Error::invalid(format!("{} name too long", what)));
    }
    if let Some(c) = name
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '.' | '\0') || c.is_control())
    {
        return Err(Error::invalid(format!(
            "{} name '{}' contains invalid character {:?}",
            what, name, c
        )));
    }
    Ok(())
}

/// Separator between database and collection name in a file stem
pub const FILE_SEPARATOR: char = '_';

/// Validate a database name
///
/// Database names may not contain [`FILE_SEPARATOR`], so a file stem splits
/// back into exactly one `(database, name)` pair.
pub fn validate_database_name(database: &str) -> Result<()> {
    validate_name("database", database)?;
    if database.contains(FILE_SEPARATOR) {
        return Err(Error::invalid(format!(
            "database name '{}' must not contain {:?}",
            database, FILE_SEPARATOR
        )));
    }
    Ok(())
}

/// Collection metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection identity
    pub id: CollectionId,
    /// Immutable configuration
    pub config: CollectionConfig,
    /// Live record count
    pub count: usize,
    /// Creation timestamp (microseconds since epoch)
    pub created_at: i64,
    /// False when the IVF structure awaits a rebuild
    pub clean: bool,
}
