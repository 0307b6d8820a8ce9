//! Durability Tests
//!
//! Tests for reopening, deferred persistence and damaged files.

use crate::*;
use quiverdb::quiver_core::Error as EngineError;
use quiverdb::quiver_storage;
use std::fs;

fn reopen(dir: &TempDir, configure: impl FnOnce(ProviderConfig) -> ProviderConfig) -> LocalProvider {
    LocalProvider::new(configure(ProviderConfig::new(dir.path()))).unwrap()
}

#[test]
fn test_reopen_returns_identical_results() {
    for kind in [IndexKind::Flat, IndexKind::IvfFlat, IndexKind::IvfPq] {
        let (dir, p) = provider_with(|c| c.with_kind(kind).with_nlist(4));
        let data = vectors(80, 8, 31);
        let rows: Vec<Value> = data
            .iter()
            .enumerate()
            .map(|(i, v)| json!({"id": i, "vector": v, "bucket": i % 3}))
            .collect();
        seeded(&p, "docs", 8, SimilarityMetric::CosineSimilarity, &rows);
        p.delete_from_collection("docs", &["5".to_string()], DEFAULT_DATABASE)
            .unwrap();

        let queries = vectors(6, 8, 1234);
        let before: Vec<Vec<Value>> = queries
            .iter()
            .map(|q| {
                p.vector_search("docs", q, &[], "bucket != 1", 10, 0, DEFAULT_DATABASE)
                    .unwrap()
            })
            .collect();
        drop(p);

        let p = reopen(&dir, |c| c.with_kind(kind).with_nlist(4));
        for (q, expected) in queries.iter().zip(&before) {
            let got = p
                .vector_search("docs", q, &[], "bucket != 1", 10, 0, DEFAULT_DATABASE)
                .unwrap();
            assert_eq!(&got, expected, "{:?}", kind);
        }
    }
}

#[test]
fn test_each_mutation_is_saved_immediately() {
    let (dir, p) = provider();
    seeded(
        &p,
        "docs",
        2,
        SimilarityMetric::EuclideanDistance,
        &[row("a", &[0.0, 1.0]), row("b", &[1.0, 0.0])],
    );
    let file = dir.path().join("default_docs.qvec");
    let on_disk = quiver_storage::load(&file).unwrap();
    assert_eq!(on_disk.len(), 2);

    p.delete_from_collection("docs", &["a".to_string()], DEFAULT_DATABASE)
        .unwrap();
    let on_disk = quiver_storage::load(&file).unwrap();
    assert_eq!(on_disk.len(), 1);
    assert!(on_disk.contains("b"));
}

#[test]
fn test_deferred_flush_and_reopen() {
    let (dir, p) = provider_with(|c| c.deferred());
    seeded(
        &p,
        "docs",
        2,
        SimilarityMetric::EuclideanDistance,
        &[row("a", &[0.0, 1.0])],
    );
    let file = dir.path().join("default_docs.qvec");
    assert!(quiver_storage::is_marked_dirty(&file));

    p.flush().unwrap();
    assert!(!quiver_storage::is_marked_dirty(&file));

    p.insert_into_collection("docs", &[row("b", &[1.0, 1.0])], DEFAULT_DATABASE)
        .unwrap();
    p.close().unwrap();
    assert!(!quiver_storage::is_marked_dirty(&file));
    drop(p);

    let p = reopen(&dir, |c| c);
    let all = p
        .query_search("docs", &[], "", 10, 0, DEFAULT_DATABASE)
        .unwrap();
    assert_eq!(ids(&all), vec!["a", "b"]);
}

#[test]
fn test_deferred_drop_flushes() {
    let (dir, p) = provider_with(|c| c.deferred());
    seeded(
        &p,
        "docs",
        1,
        SimilarityMetric::EuclideanDistance,
        &[row("a", &[1.0]), row("b", &[2.0])],
    );
    drop(p);

    let p = reopen(&dir, |c| c);
    assert_eq!(
        p.manager()
            .collection_info("docs", DEFAULT_DATABASE)
            .unwrap()
            .count,
        2
    );
}

#[test]
fn test_unflushed_changes_repaired_on_load() {
    let (dir, p) = provider_with(|c| c.deferred());
    seeded(
        &p,
        "docs",
        1,
        SimilarityMetric::EuclideanDistance,
        &[row("a", &[1.0])],
    );
    p.flush().unwrap();
    p.insert_into_collection("docs", &[row("lost", &[2.0])], DEFAULT_DATABASE)
        .unwrap();
    // Abrupt stop: no flush, no Drop
    std::mem::forget(p);

    let p = reopen(&dir, |c| c);
    let all = p
        .query_search("docs", &[], "", 10, 0, DEFAULT_DATABASE)
        .unwrap();
    assert_eq!(ids(&all), vec!["a"]);
    assert!(!quiver_storage::is_marked_dirty(
        &dir.path().join("default_docs.qvec")
    ));
}

#[test]
fn test_corrupt_file_fails_cleanly() {
    let (dir, p) = provider();
    seeded(
        &p,
        "docs",
        2,
        SimilarityMetric::EuclideanDistance,
        &[row("a", &[0.0, 1.0])],
    );
    drop(p);

    let file = dir.path().join("default_docs.qvec");
    let mut bytes = fs::read(&file).unwrap();
    let last = bytes.len() - 10;
    bytes[last] ^= 0xff;
    fs::write(&file, &bytes).unwrap();

    let p = reopen(&dir, |c| c);
    let err = p
        .vector_search("docs", &[0.0, 1.0], &[], "", 1, 0, DEFAULT_DATABASE)
        .unwrap_err();
    assert!(matches!(err.engine(), Some(EngineError::CorruptFile { .. })));
    assert!(err.engine().unwrap().is_unrecoverable());
    assert!(!err.is_retryable());

    // Still listed and still droppable
    assert_eq!(p.list_collections(DEFAULT_DATABASE).unwrap(), vec!["docs"]);
    assert_eq!(
        p.drop_collection("docs", DEFAULT_DATABASE).unwrap(),
        DropStatus::Dropped
    );
}

#[test]
fn test_truncated_file_fails_cleanly() {
    let (dir, p) = provider();
    seeded(&p, "docs", 2, SimilarityMetric::EuclideanDistance, &[]);
    drop(p);
    let file = dir.path().join("default_docs.qvec");
    let bytes = fs::read(&file).unwrap();
    fs::write(&file, &bytes[..bytes.len() / 2]).unwrap();

    let p = reopen(&dir, |c| c);
    let err = p
        .insert_into_collection("docs", &[row("a", &[0.0, 1.0])], DEFAULT_DATABASE)
        .unwrap_err();
    assert!(matches!(err.engine(), Some(EngineError::CorruptFile { .. })));
}

#[test]
fn test_future_version_rejected() {
    let (dir, p) = provider();
    seeded(&p, "docs", 2, SimilarityMetric::EuclideanDistance, &[]);
    drop(p);
    let file = dir.path().join("default_docs.qvec");
    let mut bytes = fs::read(&file).unwrap();
    bytes[4..6].copy_from_slice(&(quiver_storage::FORMAT_VERSION + 1).to_le_bytes());
    fs::write(&file, &bytes).unwrap();

    let p = reopen(&dir, |c| c);
    let err = p
        .query_search("docs", &[], "", 10, 0, DEFAULT_DATABASE)
        .unwrap_err();
    assert!(matches!(
        err.engine(),
        Some(EngineError::UnsupportedVersion { .. })
    ));
}

#[test]
fn test_directory_created_on_first_write() {
    let dir = TempDir::new().unwrap();
    let manager = CollectionManager::new(EngineConfig::new(dir.path().join("nested/index"))).unwrap();
    assert!(manager.list_collections(DEFAULT_DATABASE).unwrap().is_empty());
    manager
        .create_collection(
            "docs",
            DEFAULT_DATABASE,
            2,
            DistanceMetric::L2,
            IndexKind::Flat,
            IndexParams::default(),
        )
        .unwrap();
    assert!(dir.path().join("nested/index/default_docs.qvec").is_file());
}
