//! Metadata Query Tests
//!
//! Tests for filter-only queries and their pagination.

use crate::*;
use quiverdb::quiver_core::Error as EngineError;

fn catalog(p: &LocalProvider) {
    let rows: Vec<Value> = (0..25)
        .map(|i| {
            json!({
                "id": format!("item{:02}", i),
                "vector": [i as f32, 1.0],
                "price": i as f64 * 1.5,
                "stock": i % 4,
                "category": (["books", "music", "games"][i % 3]),
                "featured": i % 5 == 0,
            })
        })
        .collect();
    seeded(p, "items", 2, SimilarityMetric::EuclideanDistance, &rows);
}

fn query(p: &LocalProvider, filter: &str, limit: usize, offset: usize) -> Vec<String> {
    ids(&p
        .query_search("items", &[], filter, limit, offset, DEFAULT_DATABASE)
        .unwrap())
}

#[test]
fn test_empty_filter_matches_all_in_insertion_order() {
    let (_dir, p) = provider();
    catalog(&p);
    let all = query(&p, "", 100, 0);
    assert_eq!(all.len(), 25);
    assert_eq!(all[0], "item00");
    assert_eq!(all[24], "item24");
    assert_eq!(query(&p, "   ", 100, 0).len(), 25);
}

#[test]
fn test_host_default_filter_matches_all() {
    let (_dir, p) = provider();
    catalog(&p);
    assert_eq!(query(&p, "id not in [0]", 100, 0).len(), 25);
}

#[test]
fn test_comparisons() {
    let (_dir, p) = provider();
    catalog(&p);
    assert_eq!(query(&p, "price > 33", 100, 0), vec!["item23", "item24"]);
    assert_eq!(query(&p, "price <= 1.5", 100, 0), vec!["item00", "item01"]);
    assert_eq!(
        query(&p, "category = 'music' AND stock == 0", 100, 0),
        vec!["item04", "item16"]
    );
    assert_eq!(
        query(&p, "featured == true && !(category == \"books\")", 100, 0),
        vec!["item05", "item10", "item20"]
    );
    assert_eq!(query(&p, "id == 'item07'", 100, 0), vec!["item07"]);
}

#[test]
fn test_membership_and_exists() {
    let (_dir, p) = provider();
    catalog(&p);
    assert_eq!(
        query(&p, "stock in [3] and category not in ['books', 'games']", 100, 0),
        vec!["item07", "item19"]
    );
    assert_eq!(query(&p, "price exists", 100, 0).len(), 25);
    assert!(query(&p, "color exists", 100, 0).is_empty());
}

#[test]
fn test_unknown_field_and_type_mismatch_do_not_match() {
    let (_dir, p) = provider();
    catalog(&p);
    assert!(query(&p, "color == 'red'", 100, 0).is_empty());
    assert!(query(&p, "category > 5", 100, 0).is_empty());
    assert!(query(&p, "featured == 1", 100, 0).is_empty());
    // Mixed numeric types compare by value
    assert_eq!(query(&p, "stock == 2.0", 100, 0).len(), 6);
}

#[test]
fn test_pagination_disjoint_and_union() {
    let (_dir, p) = provider();
    catalog(&p);
    for filter in ["", "stock != 1", "category in ['books', 'games']"] {
        for limit in [1, 3, 7] {
            for offset in [0, 2, 5, 20] {
                let a = query(&p, filter, limit, offset);
                let b = query(&p, filter, limit, offset + limit);
                let whole = query(&p, filter, 2 * limit, offset);
                assert!(a.iter().all(|id| !b.contains(id)));
                assert_eq!([a, b].concat(), whole, "{} {} {}", filter, limit, offset);
            }
        }
    }
}

#[test]
fn test_offset_beyond_count_is_empty() {
    let (_dir, p) = provider();
    catalog(&p);
    assert!(query(&p, "", 10, 25).is_empty());
    assert!(query(&p, "", 10, 1000).is_empty());
    assert!(query(&p, "", 0, 0).is_empty());
}

#[test]
fn test_output_fields() {
    let (_dir, p) = provider();
    catalog(&p);
    let rows = p
        .query_search(
            "items",
            &["price".to_string(), "missing".to_string()],
            "id == 'item02'",
            1,
            0,
            DEFAULT_DATABASE,
        )
        .unwrap();
    let object = rows[0].as_object().unwrap();
    assert_eq!(object["id"], "item02");
    assert_eq!(object["price"], 3.0);
    assert!(!object.contains_key("category"));
    assert!(!object.contains_key("distance"));
}

#[test]
fn test_bad_filter_fails_before_lookup() {
    let (_dir, p) = provider();
    catalog(&p);
    for bad in ["price >", "(stock == 1", "stock in [1,]", "price ~ 3", "'x' == 1"] {
        let err = p
            .query_search("items", &[], bad, 10, 0, DEFAULT_DATABASE)
            .unwrap_err();
        assert!(
            matches!(err.engine(), Some(EngineError::InvalidFilterSyntax { .. })),
            "{:?} gave {:?}",
            bad,
            err
        );
    }
    // Reported even when the collection does not exist
    let err = p
        .query_search("nope", &[], "a ==", 10, 0, DEFAULT_DATABASE)
        .unwrap_err();
    assert!(matches!(
        err.engine(),
        Some(EngineError::InvalidFilterSyntax { .. })
    ));
}

#[test]
fn test_query_missing_collection() {
    let (_dir, p) = provider();
    let err = p
        .query_search("nope", &[], "", 10, 0, DEFAULT_DATABASE)
        .unwrap_err();
    assert!(err.is_not_found());
}
