//! Provider Integration Tests
//!
//! Drives `LocalProvider` end to end against a temporary index directory.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test provider
//!
//! # Search tests only
//! cargo test --test provider search::
//! ```

use quiverdb::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

mod durability;
mod edge_cases;
mod query;
mod search;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// Flat provider over a fresh directory
pub fn provider() -> (TempDir, LocalProvider) {
    provider_with(|c| c)
}

/// Provider over a fresh directory with adjusted settings
pub fn provider_with(
    configure: impl FnOnce(ProviderConfig) -> ProviderConfig,
) -> (TempDir, LocalProvider) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = TempDir::new().unwrap();
    let config = configure(ProviderConfig::new(dir.path()));
    let provider = LocalProvider::new(config).unwrap();
    (dir, provider)
}

/// Insert row with no metadata
pub fn row(id: &str, vector: &[f32]) -> Value {
    json!({"id": id, "vector": vector})
}

/// Ids of result objects, in order
pub fn ids(results: &[Value]) -> Vec<String> {
    results
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect()
}

/// Distances of result objects, in order
pub fn distances(results: &[Value]) -> Vec<f64> {
    results
        .iter()
        .map(|r| r["distance"].as_f64().unwrap())
        .collect()
}

/// Deterministic pseudo-random vectors
pub fn vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    (0..count)
        .map(|_| {
            (0..dim)
                .map(|_| {
                    state = state
                        .wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407);
                    ((state >> 33) as f32 / (1u64 << 31) as f32) * 2.0 - 1.0
                })
                .collect()
        })
        .collect()
}

/// Create `name` and fill it with `rows`
pub fn seeded(
    provider: &LocalProvider,
    name: &str,
    dim: usize,
    metric: SimilarityMetric,
    rows: &[Value],
) {
    provider
        .create_collection(name, dim, metric, DEFAULT_DATABASE)
        .unwrap();
    if !rows.is_empty() {
        provider
            .insert_into_collection(name, rows, DEFAULT_DATABASE)
            .unwrap();
    }
}
