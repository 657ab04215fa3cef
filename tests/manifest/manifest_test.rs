//! Integration tests for dbt manifest import feeding the rest of the
//! system: declared dependencies land as walkable edges and declared column
//! lists improve later SQL extraction.

use trellis::extract::ObjectCatalog;
use trellis::feed::{MemoryFeed, QueryHistoryRow};
use trellis::graph::{Direction, EdgeKind, GraphStore, ObjectId, TransformationKind, Traversal};
use trellis::ingest::Pipeline;
use trellis::manifest::{import_manifest, Manifest};

const MANIFEST: &str = r#"{
    "nodes": {
        "model.shop.stg_orders": {
            "resource_type": "model",
            "name": "stg_orders",
            "database": "analytics",
            "schema": "staging",
            "depends_on": {"nodes": ["source.shop.raw.orders"]},
            "columns": {
                "order_id": {"name": "order_id", "description": "pk"},
                "amount": {"name": "amount"}
            }
        },
        "model.shop.fct_orders": {
            "resource_type": "model",
            "name": "fct_orders",
            "database": "analytics",
            "schema": "marts",
            "depends_on": {"nodes": ["model.shop.stg_orders"]}
        }
    }
}"#;

// ============================================================================
// Declared lineage
// ============================================================================

#[test]
fn test_imported_dependencies_are_walkable() {
    let store = GraphStore::open_in_memory().unwrap();
    let mut catalog = ObjectCatalog::new();
    let manifest = Manifest::from_json(MANIFEST).unwrap();

    let report = import_manifest(&store, &mut catalog, &manifest, 1_000).unwrap();
    assert_eq!(report.models, 2);
    assert_eq!(report.edges, 2);
    assert_eq!(report.cataloged, 1);

    // raw source -> staging model -> mart model, declared end to end
    let downstream = Traversal::new(
        ObjectId::new("source.shop.raw.orders"),
        Direction::Downstream,
    )
    .with_max_depth(3)
    .run(&store)
    .unwrap();
    let mut ids: Vec<&str> = downstream
        .reached()
        .into_iter()
        .map(ObjectId::as_str)
        .collect();
    ids.sort();
    assert_eq!(
        ids,
        vec!["analytics.marts.fct_orders", "analytics.staging.stg_orders"]
    );

    for edge in &downstream.edges {
        assert_eq!(edge.kind, EdgeKind::Lineage(TransformationKind::Unknown));
        assert!((edge.confidence - 1.0).abs() < f64::EPSILON);
    }
}

// ============================================================================
// Catalog handoff to extraction
// ============================================================================

#[test]
fn test_declared_columns_expand_wildcards_in_ingestion() {
    let store = GraphStore::open_in_memory().unwrap();
    let mut catalog = ObjectCatalog::new();
    let manifest = Manifest::from_json(MANIFEST).unwrap();
    import_manifest(&store, &mut catalog, &manifest, 1_000).unwrap();

    let mut pipeline = Pipeline::new(&store).with_catalog(catalog);
    let feed = MemoryFeed::new(vec![QueryHistoryRow::new(
        "q1",
        "INSERT INTO export SELECT * FROM stg_orders",
        5_000,
    )
    .with_context("analytics", "staging")]);
    let report = pipeline.process_batch(&feed).unwrap();
    assert_eq!(report.processed, 1);

    // without the declared columns this would be a single object-level
    // unknown edge; with them the copy resolves column to column
    let from_order_id = store
        .edges_from(&ObjectId::new("analytics.staging.stg_orders.order_id"))
        .unwrap();
    assert_eq!(from_order_id.len(), 1);
    assert_eq!(
        from_order_id[0].target.as_str(),
        "analytics.staging.export.order_id"
    );
    assert_eq!(
        from_order_id[0].kind,
        EdgeKind::Lineage(TransformationKind::DirectCopy)
    );
    store
        .edges_from(&ObjectId::new("analytics.staging.stg_orders.amount"))
        .unwrap()
        .iter()
        .find(|e| e.target.as_str() == "analytics.staging.export.amount")
        .expect("declared amount column should map across");
}

// ============================================================================
// Shared nodes across layers
// ============================================================================

#[test]
fn test_declared_and_parsed_observations_merge_on_one_node() {
    let store = GraphStore::open_in_memory().unwrap();
    let mut catalog = ObjectCatalog::new();
    let manifest = Manifest::from_json(MANIFEST).unwrap();
    import_manifest(&store, &mut catalog, &manifest, 1_000).unwrap();

    let mut pipeline = Pipeline::new(&store).with_catalog(catalog);
    let feed = MemoryFeed::new(vec![QueryHistoryRow::new(
        "q1",
        "INSERT INTO audit (amount) SELECT amount FROM stg_orders",
        5_000,
    )
    .with_context("analytics", "staging")]);
    pipeline.process_batch(&feed).unwrap();

    // the manifest created the node, the statement re-observed it
    let node = store
        .node(&ObjectId::new("analytics.staging.stg_orders"))
        .unwrap()
        .unwrap();
    assert_eq!(node.first_seen_ts, 1_000);
    assert_eq!(node.last_seen_ts, 5_000);
}
