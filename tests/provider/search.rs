//! Vector Search Tests
//!
//! Tests for ranking, filtering, pagination and the IVF kinds.

use crate::*;
use proptest::prelude::*;

fn rows_of(vectors: &[Vec<f32>]) -> Vec<Value> {
    vectors
        .iter()
        .enumerate()
        .map(|(i, v)| row(&format!("v{}", i), v))
        .collect()
}

// =============================================================================
// RANKING
// =============================================================================

#[test]
fn test_site_docs_scenario() {
    let (_dir, p) = provider();
    p.create_collection("docs", 3, SimilarityMetric::EuclideanDistance, "site")
        .unwrap();
    p.insert_into_collection(
        "docs",
        &[row("a", &[1.0, 0.0, 0.0]), row("b", &[0.0, 1.0, 0.0])],
        "site",
    )
    .unwrap();

    let hits = p
        .vector_search("docs", &[1.0, 0.0, 0.0], &[], "", 1, 0, "site")
        .unwrap();
    assert_eq!(ids(&hits), vec!["a"]);
    assert_eq!(distances(&hits), vec![0.0]);
}

#[test]
fn test_l2_ascending() {
    let (_dir, p) = provider();
    let data = vectors(50, 6, 7);
    seeded(&p, "docs", 6, SimilarityMetric::EuclideanDistance, &rows_of(&data));
    for query in vectors(5, 6, 99) {
        let hits = p
            .vector_search("docs", &query, &[], "", 20, 0, DEFAULT_DATABASE)
            .unwrap();
        let d = distances(&hits);
        assert_eq!(d.len(), 20);
        assert!(d.windows(2).all(|w| w[0] <= w[1]), "{:?}", d);
    }
}

#[test]
fn test_similarity_metrics_descending() {
    for metric in [
        SimilarityMetric::CosineSimilarity,
        SimilarityMetric::InnerProduct,
    ] {
        let (_dir, p) = provider();
        let data = vectors(40, 5, 3);
        seeded(&p, "docs", 5, metric, &rows_of(&data));
        let hits = p
            .vector_search("docs", &data[0], &[], "", 40, 0, DEFAULT_DATABASE)
            .unwrap();
        let d = distances(&hits);
        assert_eq!(d.len(), 40);
        assert!(d.windows(2).all(|w| w[0] >= w[1]), "{:?}: {:?}", metric, d);
    }
}

#[test]
fn test_cosine_scores_in_range() {
    let (_dir, p) = provider();
    let data = vectors(30, 4, 11);
    seeded(&p, "docs", 4, SimilarityMetric::CosineSimilarity, &rows_of(&data));
    let hits = p
        .vector_search("docs", &data[3], &[], "", 30, 0, DEFAULT_DATABASE)
        .unwrap();
    assert_eq!(ids(&hits)[0], "v3");
    assert!((distances(&hits)[0] - 1.0).abs() < 1e-5);
    assert!(distances(&hits).iter().all(|d| (-1.0001..=1.0001).contains(d)));
}

#[test]
fn test_ties_keep_insertion_order() {
    let (_dir, p) = provider();
    seeded(
        &p,
        "docs",
        2,
        SimilarityMetric::EuclideanDistance,
        &[
            row("first", &[1.0, 0.0]),
            row("second", &[0.0, 1.0]),
            row("third", &[-1.0, 0.0]),
        ],
    );
    let hits = p
        .vector_search("docs", &[0.0, 0.0], &[], "", 3, 0, DEFAULT_DATABASE)
        .unwrap();
    assert_eq!(ids(&hits), vec!["first", "second", "third"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_flat_l2_self_search(
        data in prop::collection::vec(prop::collection::vec(-100.0f32..100.0, 4), 1..24)
    ) {
        let (_dir, p) = provider();
        seeded(&p, "docs", 4, SimilarityMetric::EuclideanDistance, &rows_of(&data));
        for (i, v) in data.iter().enumerate() {
            let hits = p
                .vector_search("docs", v, &[], "", 1, 0, DEFAULT_DATABASE)
                .unwrap();
            prop_assert_eq!(hits.len(), 1);
            // Top hit is the vector itself or an exact duplicate of it
            let top = &ids(&hits)[0];
            prop_assert!(
                top == &format!("v{}", i) || distances(&hits)[0] == 0.0,
                "query v{} returned {}", i, top
            );
        }
    }
}

// =============================================================================
// FILTERS AND PROJECTION
// =============================================================================

#[test]
fn test_filter_applies_before_truncation() {
    let (_dir, p) = provider();
    let rows: Vec<Value> = (0..20)
        .map(|i| json!({"id": format!("r{}", i), "vector": [i as f32], "parity": if i % 2 == 0 { "even" } else { "odd" }}))
        .collect();
    seeded(&p, "docs", 1, SimilarityMetric::EuclideanDistance, &rows);

    let hits = p
        .vector_search("docs", &[0.0], &[], "parity == 'odd'", 3, 0, DEFAULT_DATABASE)
        .unwrap();
    assert_eq!(ids(&hits), vec!["r1", "r3", "r5"]);

    let hits = p
        .vector_search("docs", &[0.0], &[], "parity == 'none'", 3, 0, DEFAULT_DATABASE)
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_compound_filter() {
    let (_dir, p) = provider();
    let rows: Vec<Value> = (0..10)
        .map(|i| json!({"id": i, "vector": [i as f32, 0.0], "n": i, "lang": if i < 5 { "en" } else { "de" }}))
        .collect();
    seeded(&p, "docs", 2, SimilarityMetric::EuclideanDistance, &rows);

    let hits = p
        .vector_search(
            "docs",
            &[0.0, 0.0],
            &[],
            "(lang == 'de' and n >= 7) or id in ['1', '2']",
            10,
            0,
            DEFAULT_DATABASE,
        )
        .unwrap();
    assert_eq!(ids(&hits), vec!["1", "2", "7", "8", "9"]);
}

#[test]
fn test_output_fields_projection() {
    let (_dir, p) = provider();
    seeded(
        &p,
        "docs",
        2,
        SimilarityMetric::EuclideanDistance,
        &[json!({"id": "a", "vector": [0.0, 0.0], "title": "A", "lang": "en", "rank": 3})],
    );

    let all = p
        .vector_search("docs", &[0.0, 0.0], &[], "", 1, 0, DEFAULT_DATABASE)
        .unwrap();
    assert_eq!(all[0]["title"], "A");
    assert_eq!(all[0]["rank"], 3);

    let some = p
        .vector_search(
            "docs",
            &[0.0, 0.0],
            &["title".to_string()],
            "",
            1,
            0,
            DEFAULT_DATABASE,
        )
        .unwrap();
    let object = some[0].as_object().unwrap();
    assert_eq!(object["title"], "A");
    assert!(object.contains_key("id"));
    assert!(object.contains_key("distance"));
    assert!(!object.contains_key("lang"));
    assert!(!object.contains_key("vector"));
}

#[test]
fn test_metric_override() {
    let (_dir, p) = provider();
    seeded(
        &p,
        "docs",
        2,
        SimilarityMetric::EuclideanDistance,
        &[row("near", &[1.0, 0.0]), row("long", &[10.0, 0.0])],
    );
    let by_l2 = p
        .manager()
        .search("docs", DEFAULT_DATABASE, &SearchRequest::new(vec![1.0, 0.0], 2))
        .unwrap();
    assert_eq!(by_l2[0].id, "near");

    let by_ip = p
        .manager()
        .search(
            "docs",
            DEFAULT_DATABASE,
            &SearchRequest::new(vec![1.0, 0.0], 2).metric(DistanceMetric::InnerProduct),
        )
        .unwrap();
    assert_eq!(by_ip[0].id, "long");
    assert_eq!(by_ip[0].distance, 10.0);
}

// =============================================================================
// PAGINATION
// =============================================================================

#[test]
fn test_search_pages_are_disjoint() {
    let (_dir, p) = provider();
    let data = vectors(30, 3, 21);
    seeded(&p, "docs", 3, SimilarityMetric::EuclideanDistance, &rows_of(&data));
    let q = [0.1, 0.2, 0.3];

    let first = ids(&p.vector_search("docs", &q, &[], "", 5, 0, DEFAULT_DATABASE).unwrap());
    let second = ids(&p.vector_search("docs", &q, &[], "", 5, 5, DEFAULT_DATABASE).unwrap());
    let both = ids(&p.vector_search("docs", &q, &[], "", 10, 0, DEFAULT_DATABASE).unwrap());

    assert!(first.iter().all(|id| !second.contains(id)));
    assert_eq!([first, second].concat(), both);

    let beyond = p
        .vector_search("docs", &q, &[], "", 5, 100, DEFAULT_DATABASE)
        .unwrap();
    assert!(beyond.is_empty());
}

// =============================================================================
// IVF KINDS
// =============================================================================

#[test]
fn test_ivf_full_probe_matches_flat() {
    let (_dir, p) = provider();
    let m = p.manager();
    let data = vectors(200, 8, 5);
    let records: Vec<VectorRecord> = data
        .iter()
        .enumerate()
        .map(|(i, v)| VectorRecord::new(format!("v{}", i), v.clone()))
        .collect();

    m.create_collection(
        "flat",
        DEFAULT_DATABASE,
        8,
        DistanceMetric::L2,
        IndexKind::Flat,
        IndexParams::default(),
    )
    .unwrap();
    m.create_collection(
        "ivf",
        DEFAULT_DATABASE,
        8,
        DistanceMetric::L2,
        IndexKind::IvfFlat,
        IndexParams::with_nlist(8).nprobe(8),
    )
    .unwrap();
    // Split inserts so some records arrive after training
    m.insert("flat", DEFAULT_DATABASE, records.clone()).unwrap();
    m.insert("ivf", DEFAULT_DATABASE, records[..100].to_vec()).unwrap();
    m.insert("ivf", DEFAULT_DATABASE, records[100..].to_vec()).unwrap();

    for query in vectors(10, 8, 77) {
        let request = SearchRequest::new(query, 10);
        let expected: Vec<String> = m
            .search("flat", DEFAULT_DATABASE, &request)
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        let got: Vec<String> = m
            .search("ivf", DEFAULT_DATABASE, &request)
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(got, expected);
    }
}

#[test]
fn test_ivf_partial_probe_returns_sorted_subset() {
    let (_dir, p) = provider_with(|c| c.with_kind(IndexKind::IvfFlat).with_nlist(16));
    let data = vectors(300, 4, 9);
    seeded(&p, "docs", 4, SimilarityMetric::EuclideanDistance, &rows_of(&data));
    let hits = p
        .vector_search("docs", &data[10], &[], "", 5, 0, DEFAULT_DATABASE)
        .unwrap();
    assert!(!hits.is_empty() && hits.len() <= 5);
    // The query's own cluster is always probed
    assert_eq!(ids(&hits)[0], "v10");
    let d = distances(&hits);
    assert!(d.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_ivf_pq_recall() {
    let (_dir, p) = provider();
    let m = p.manager();
    let data = vectors(64, 8, 13);
    m.create_collection(
        "pq",
        DEFAULT_DATABASE,
        8,
        DistanceMetric::L2,
        IndexKind::IvfPq,
        IndexParams::with_nlist(4).nprobe(4).pq_m(4),
    )
    .unwrap();
    m.insert(
        "pq",
        DEFAULT_DATABASE,
        data.iter()
            .enumerate()
            .map(|(i, v)| VectorRecord::new(format!("v{}", i), v.clone()))
            .collect(),
    )
    .unwrap();
    assert!(m.collection_info("pq", DEFAULT_DATABASE).unwrap().clean);

    let mut found = 0;
    for (i, v) in data.iter().enumerate() {
        let hits = m
            .search("pq", DEFAULT_DATABASE, &SearchRequest::new(v.clone(), 1))
            .unwrap();
        if hits[0].id == format!("v{}", i) {
            found += 1;
            // Re-scored exactly
            assert!(hits[0].distance.abs() < 1e-6);
        }
    }
    assert!(found >= 58, "recall@1 {}/64", found);
}

#[test]
fn test_ivf_before_training_is_exhaustive() {
    let (_dir, p) = provider_with(|c| c.with_kind(IndexKind::IvfFlat).with_nlist(50));
    let data = vectors(10, 3, 4);
    seeded(&p, "docs", 3, SimilarityMetric::EuclideanDistance, &rows_of(&data));
    let info = p
        .manager()
        .collection_info("docs", DEFAULT_DATABASE)
        .unwrap();
    assert_eq!(info.count, 10);
    let hits = p
        .vector_search("docs", &data[0], &[], "", 10, 0, DEFAULT_DATABASE)
        .unwrap();
    assert_eq!(hits.len(), 10);
}
