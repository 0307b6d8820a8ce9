//! Edge Case Tests
//!
//! Tests for bad input, idempotence and upsert behavior.

use crate::*;
use quiverdb::quiver_core::Error as EngineError;

#[test]
fn test_dimension_mismatch_on_insert() {
    let (_dir, p) = provider();
    seeded(&p, "docs", 3, SimilarityMetric::EuclideanDistance, &[]);
    let err = p
        .insert_into_collection("docs", &[row("a", &[1.0, 0.0])], DEFAULT_DATABASE)
        .unwrap_err();
    assert!(matches!(
        err.engine(),
        Some(EngineError::DimensionMismatch {
            expected: 3,
            got: 2
        })
    ));
}

#[test]
fn test_failed_batch_writes_nothing() {
    let (_dir, p) = provider();
    seeded(&p, "docs", 2, SimilarityMetric::EuclideanDistance, &[]);
    let err = p
        .insert_into_collection(
            "docs",
            &[row("ok", &[1.0, 0.0]), row("bad", &[1.0, 0.0, 0.0])],
            DEFAULT_DATABASE,
        )
        .unwrap_err();
    assert!(matches!(
        err.engine(),
        Some(EngineError::DimensionMismatch { .. })
    ));
    assert!(p
        .query_search("docs", &[], "", 10, 0, DEFAULT_DATABASE)
        .unwrap()
        .is_empty());
}

#[test]
fn test_query_dimension_mismatch() {
    let (_dir, p) = provider();
    seeded(
        &p,
        "docs",
        3,
        SimilarityMetric::EuclideanDistance,
        &[row("a", &[1.0, 0.0, 0.0])],
    );
    let err = p
        .vector_search("docs", &[1.0], &[], "", 1, 0, DEFAULT_DATABASE)
        .unwrap_err();
    assert!(matches!(
        err.engine(),
        Some(EngineError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_delete_is_idempotent() {
    let (_dir, p) = provider();
    seeded(
        &p,
        "docs",
        1,
        SimilarityMetric::EuclideanDistance,
        &[row("a", &[1.0]), row("b", &[2.0])],
    );
    let ids_to_delete = vec!["a".to_string(), "zzz".to_string()];
    assert_eq!(
        p.delete_from_collection("docs", &ids_to_delete, DEFAULT_DATABASE)
            .unwrap(),
        1
    );
    assert_eq!(
        p.delete_from_collection("docs", &ids_to_delete, DEFAULT_DATABASE)
            .unwrap(),
        0
    );
    assert_eq!(
        p.delete_from_collection("docs", &[], DEFAULT_DATABASE)
            .unwrap(),
        0
    );
}

#[test]
fn test_mutations_on_missing_collection() {
    let (_dir, p) = provider();
    assert!(p
        .insert_into_collection("nope", &[row("a", &[1.0])], DEFAULT_DATABASE)
        .unwrap_err()
        .is_not_found());
    assert!(p
        .delete_from_collection("nope", &["a".to_string()], DEFAULT_DATABASE)
        .unwrap_err()
        .is_not_found());
    // Search on a missing collection is an empty result at this layer
    assert!(p
        .vector_search("nope", &[1.0], &[], "", 5, 0, DEFAULT_DATABASE)
        .unwrap()
        .is_empty());
    // The engine itself reports it
    assert!(p
        .manager()
        .search("nope", DEFAULT_DATABASE, &SearchRequest::new(vec![1.0], 5))
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_upsert_replaces_in_place() {
    let (_dir, p) = provider();
    seeded(
        &p,
        "docs",
        1,
        SimilarityMetric::EuclideanDistance,
        &[
            json!({"id": "a", "vector": [1.0], "v": 1}),
            json!({"id": "b", "vector": [2.0], "v": 1}),
        ],
    );
    p.insert_into_collection(
        "docs",
        &[json!({"id": "a", "vector": [9.0], "v": 2})],
        DEFAULT_DATABASE,
    )
    .unwrap();

    let all = p
        .query_search("docs", &[], "", 10, 0, DEFAULT_DATABASE)
        .unwrap();
    assert_eq!(ids(&all), vec!["a", "b"]);
    assert_eq!(all[0]["v"], 2);

    let hits = p
        .vector_search("docs", &[9.0], &[], "", 1, 0, DEFAULT_DATABASE)
        .unwrap();
    assert_eq!(ids(&hits), vec!["a"]);
    assert_eq!(distances(&hits), vec![0.0]);
}

#[test]
fn test_zero_limit_and_empty_collection() {
    let (_dir, p) = provider();
    seeded(&p, "docs", 2, SimilarityMetric::CosineSimilarity, &[]);
    assert!(p
        .vector_search("docs", &[1.0, 0.0], &[], "", 10, 0, DEFAULT_DATABASE)
        .unwrap()
        .is_empty());
    p.insert_into_collection("docs", &[row("a", &[1.0, 0.0])], DEFAULT_DATABASE)
        .unwrap();
    assert!(p
        .vector_search("docs", &[1.0, 0.0], &[], "", 0, 0, DEFAULT_DATABASE)
        .unwrap()
        .is_empty());
}

#[test]
fn test_cosine_zero_vector_scores_zero() {
    let (_dir, p) = provider();
    seeded(
        &p,
        "docs",
        2,
        SimilarityMetric::CosineSimilarity,
        &[row("zero", &[0.0, 0.0]), row("unit", &[1.0, 0.0])],
    );
    let hits = p
        .vector_search("docs", &[1.0, 0.0], &[], "", 2, 0, DEFAULT_DATABASE)
        .unwrap();
    assert_eq!(ids(&hits), vec!["unit", "zero"]);
    assert_eq!(distances(&hits)[1], 0.0);
}

#[test]
fn test_non_finite_components_rejected() {
    let (_dir, p) = provider();
    seeded(&p, "docs", 2, SimilarityMetric::EuclideanDistance, &[]);
    let err = p
        .manager()
        .insert(
            "docs",
            DEFAULT_DATABASE,
            vec![VectorRecord::new("a", vec![f32::NAN, 0.0])],
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameters { .. }));

    let err = p
        .vector_search("docs", &[f32::INFINITY, 0.0], &[], "", 1, 0, DEFAULT_DATABASE)
        .unwrap_err();
    assert!(matches!(
        err.engine(),
        Some(EngineError::InvalidParameters { .. })
    ));
}

#[test]
fn test_bad_rows_report_index() {
    let (_dir, p) = provider();
    seeded(&p, "docs", 1, SimilarityMetric::EuclideanDistance, &[]);
    let err = p
        .insert_into_collection(
            "docs",
            &[row("a", &[1.0]), json!({"id": "b"})],
            DEFAULT_DATABASE,
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRow { index: 1, .. }));

    let err = p
        .insert_into_collection(
            "docs",
            &[json!({"id": "c", "vector": [1.0], "tags": {"a": 1}})],
            DEFAULT_DATABASE,
        )
        .unwrap_err();
    assert!(matches!(
        err.engine(),
        Some(EngineError::UnsupportedMetadataType { .. })
    ));
}

#[test]
fn test_ping_and_settings() {
    let (dir, p) = provider_with(|c| c.with_kind(IndexKind::IvfPq).with_nlist(32));
    assert!(p.ping());
    assert!(p.is_setup());
    let summary = p.settings_summary();
    let labels: Vec<&str> = summary.iter().map(|e| e.label).collect();
    assert_eq!(
        labels,
        vec!["Status", "Index Type", "Distance Metric", "Lists", "Persistence"]
    );
    assert_eq!(summary[0].status, Some(quiverdb::SettingsStatus::Ok));
    assert_eq!(summary[1].info, "ivf_pq");
    assert_eq!(summary[3].info, "32");

    let path = dir.path().to_path_buf();
    drop(dir);
    assert!(!path.exists());
    assert!(!p.ping());
    assert_eq!(
        p.settings_summary()[0].status,
        Some(quiverdb::SettingsStatus::Warning)
    );
}

#[test]
fn test_unconfigured_provider_rejected() {
    let err = LocalProvider::new(ProviderConfig::default()).unwrap_err();
    assert!(err.is_configuration());
    let err = LocalProvider::new(ProviderConfig::new("/definitely/not/here")).unwrap_err();
    assert!(err.is_configuration());
}
