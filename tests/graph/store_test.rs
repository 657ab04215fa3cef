//! Integration tests for the SQLite-backed graph store.
//!
//! Everything rides on the upsert merge semantics: identical observations
//! collapse onto one record, re-observations only ever widen what is known.

use trellis::graph::{
    AttemptStatus, Edge, EdgeKind, GraphStore, LogEntry, Node, ObjectId, ObjectType,
    TransformationKind,
};

fn copy_edge(source: &str, target: &str, confidence: f64, ts: i64) -> Edge {
    Edge::new(
        ObjectId::new(source),
        ObjectId::new(target),
        EdgeKind::Lineage(TransformationKind::DirectCopy),
        confidence,
        ts,
    )
}

fn seed_node(store: &GraphStore, id: &str, ts: i64) {
    store
        .upsert_node(&Node::new(ObjectId::new(id), ObjectType::Column, ts))
        .unwrap();
}

// ============================================================================
// Edge identity
// ============================================================================

#[test]
fn test_edge_id_is_deterministic_across_observations() {
    let first = copy_edge("a.b.c.x", "a.b.d.y", 1.0, 1_000);
    let second = copy_edge("a.b.c.x", "a.b.d.y", 0.5, 9_000);
    assert_eq!(first.id, second.id);

    let other_kind = Edge::new(
        ObjectId::new("a.b.c.x"),
        ObjectId::new("a.b.d.y"),
        EdgeKind::Lineage(TransformationKind::Filter),
        1.0,
        1_000,
    );
    assert_ne!(first.id, other_kind.id);
}

#[test]
fn test_same_endpoints_different_kinds_coexist() {
    let store = GraphStore::open_in_memory().unwrap();
    seed_node(&store, "t1.a", 1_000);
    seed_node(&store, "t2.b", 1_000);

    let copy = copy_edge("t1.a", "t2.b", 1.0, 1_000);
    let filter = Edge::new(
        ObjectId::new("t1.a"),
        ObjectId::new("t2.b"),
        EdgeKind::Lineage(TransformationKind::Filter),
        0.6,
        1_000,
    );
    store.upsert_edge(&copy, 8).unwrap();
    store.upsert_edge(&filter, 8).unwrap();

    let out = store.edges_from(&ObjectId::new("t1.a")).unwrap();
    assert_eq!(out.len(), 2);
}

// ============================================================================
// Merge semantics
// ============================================================================

#[test]
fn test_reobservation_keeps_max_confidence_and_widens_the_window() {
    let store = GraphStore::open_in_memory().unwrap();
    seed_node(&store, "t1.a", 1_000);
    seed_node(&store, "t2.b", 1_000);

    store
        .upsert_edge(&copy_edge("t1.a", "t2.b", 0.9, 5_000).with_query("q1"), 8)
        .unwrap();
    store
        .upsert_edge(&copy_edge("t1.a", "t2.b", 0.4, 1_000).with_query("q2"), 8)
        .unwrap();

    let edges = store.edges_from(&ObjectId::new("t1.a")).unwrap();
    assert_eq!(edges.len(), 1);
    let merged = &edges[0];
    assert!((merged.confidence - 0.9).abs() < f64::EPSILON);
    assert_eq!(merged.first_seen_ts, 1_000);
    assert_eq!(merged.observed_ts, 5_000);
    assert_eq!(merged.supporting_queries, vec!["q1".to_string(), "q2".to_string()]);
}

#[test]
fn test_supporting_queries_deduplicate_and_cap_drops_oldest() {
    let store = GraphStore::open_in_memory().unwrap();
    seed_node(&store, "t1.a", 1_000);
    seed_node(&store, "t2.b", 1_000);

    for (i, query_id) in ["q1", "q2", "q1", "q3", "q4"].iter().enumerate() {
        let edge = copy_edge("t1.a", "t2.b", 1.0, 1_000 + i as i64).with_query(*query_id);
        store.upsert_edge(&edge, 3).unwrap();
    }

    let edges = store.edges_from(&ObjectId::new("t1.a")).unwrap();
    // q1 repeated once (dropped as duplicate), then the cap of three pushed
    // the oldest surviving id out
    assert_eq!(
        edges[0].supporting_queries,
        vec!["q2".to_string(), "q3".to_string(), "q4".to_string()]
    );
}

#[test]
fn test_usage_observations_accumulate_access_counts() {
    let store = GraphStore::open_in_memory().unwrap();
    store
        .upsert_node(&Node::new(ObjectId::new("analyst"), ObjectType::Role, 1_000))
        .unwrap();
    seed_node(&store, "db.s.t", 1_000);

    let usage = Edge::new(
        ObjectId::new("analyst"),
        ObjectId::new("db.s.t"),
        EdgeKind::usage("analyst"),
        1.0,
        1_000,
    )
    .with_access();
    store.upsert_edge(&usage, 8).unwrap();
    store.upsert_edge(&usage, 8).unwrap();

    let edges = store.edges_from(&ObjectId::new("analyst")).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].access_count, 2);
}

#[test]
fn test_node_reobservation_widens_the_seen_window() {
    let store = GraphStore::open_in_memory().unwrap();
    let id = ObjectId::new("db.s.t");
    store
        .upsert_node(&Node::new(id.clone(), ObjectType::Table, 5_000))
        .unwrap();
    store
        .upsert_node(&Node::new(id.clone(), ObjectType::Table, 2_000))
        .unwrap();

    let node = store.node(&id).unwrap().unwrap();
    assert_eq!(node.first_seen_ts, 2_000);
    assert_eq!(node.last_seen_ts, 5_000);
}

// ============================================================================
// Adjacency
// ============================================================================

#[test]
fn test_edges_from_and_into_partition_by_endpoint() {
    let store = GraphStore::open_in_memory().unwrap();
    for id in ["a", "b", "c"] {
        seed_node(&store, id, 1_000);
    }
    store.upsert_edge(&copy_edge("a", "b", 1.0, 1_000), 8).unwrap();
    store.upsert_edge(&copy_edge("b", "c", 1.0, 1_000), 8).unwrap();

    let from_b = store.edges_from(&ObjectId::new("b")).unwrap();
    assert_eq!(from_b.len(), 1);
    assert_eq!(from_b[0].target.as_str(), "c");

    let into_b = store.edges_into(&ObjectId::new("b")).unwrap();
    assert_eq!(into_b.len(), 1);
    assert_eq!(into_b[0].source.as_str(), "a");
}

// ============================================================================
// Watermark and processing log
// ============================================================================

#[test]
fn test_watermark_starts_at_zero_and_persists() {
    let store = GraphStore::open_in_memory().unwrap();
    assert_eq!(store.watermark().unwrap(), 0);
    store.set_watermark(42_000).unwrap();
    assert_eq!(store.watermark().unwrap(), 42_000);
}

#[test]
fn test_failure_queries_filter_by_status_and_time() {
    let store = GraphStore::open_in_memory().unwrap();
    let entries = [
        ("ok", AttemptStatus::Success, 1_000),
        ("old-fail", AttemptStatus::Failed, 2_000),
        ("skip", AttemptStatus::Skipped, 3_000),
        ("new-fail", AttemptStatus::Failed, 9_000),
    ];
    for (query_id, status, attempted_at) in entries {
        store
            .log_attempt(&LogEntry {
                query_id: query_id.to_string(),
                status,
                detail: None,
                parse_method: None,
                attempted_at,
                batch_id: "batch-1".to_string(),
            })
            .unwrap();
    }

    let failures = store.recent_failures(10).unwrap();
    assert_eq!(failures.len(), 2);
    // newest first
    assert_eq!(failures[0].query_id, "new-fail");
    assert_eq!(failures[1].query_id, "old-fail");

    assert_eq!(store.failure_count_since(5_000).unwrap(), 1);
    assert_eq!(store.failure_count_since(0).unwrap(), 2);
}

// ============================================================================
// Search and stats
// ============================================================================

#[test]
fn test_search_matches_substrings_case_insensitively() {
    let store = GraphStore::open_in_memory().unwrap();
    store
        .upsert_node(&Node::new(
            ObjectId::new("db.crm.users"),
            ObjectType::Table,
            1_000,
        ))
        .unwrap();
    store
        .upsert_node(&Node::new(
            ObjectId::new("db.crm.users.email"),
            ObjectType::Column,
            1_000,
        ))
        .unwrap();
    store
        .upsert_node(&Node::new(
            ObjectId::new("db.billing.invoices"),
            ObjectType::Table,
            1_000,
        ))
        .unwrap();

    let hits = store.search("USERS", None, 10).unwrap();
    assert_eq!(hits.len(), 2);

    let tables_only = store.search("users", Some(&[ObjectType::Table]), 10).unwrap();
    assert_eq!(tables_only.len(), 1);
    assert_eq!(tables_only[0].id.as_str(), "db.crm.users");

    let limited = store.search("db", None, 2).unwrap();
    assert_eq!(limited.len(), 2);
}

#[test]
fn test_stats_aggregate_counts_and_confidence_bands() {
    let store = GraphStore::open_in_memory().unwrap();
    seed_node(&store, "t1.a", 1_000);
    seed_node(&store, "t2.b", 1_000);
    store
        .upsert_node(&Node::new(ObjectId::new("db.s.t1"), ObjectType::Table, 1_000))
        .unwrap();

    store.upsert_edge(&copy_edge("t1.a", "t2.b", 1.0, 1_000), 8).unwrap();
    let weak = Edge::new(
        ObjectId::new("t2.b"),
        ObjectId::new("t1.a"),
        EdgeKind::Lineage(TransformationKind::Unknown),
        0.3,
        1_000,
    );
    store.upsert_edge(&weak, 8).unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.nodes_total, 3);
    assert_eq!(stats.edges_total, 2);
    assert!(stats
        .nodes_by_type
        .contains(&("COLUMN".to_string(), 2)));
    assert!(stats
        .edges_by_kind
        .contains(&("LINEAGE:DIRECT_COPY".to_string(), 1)));
    assert!(stats
        .confidence_histogram
        .contains(&("0.0-0.5".to_string(), 1)));
    assert!(stats.confidence_histogram.contains(&("1.0".to_string(), 1)));
}
