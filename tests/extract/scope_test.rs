//! Integration tests for name resolution through nested query structure.
//!
//! CTEs and derived tables must substitute down to base-table columns, with
//! the transformation kind composing to the strongest along the chain and
//! confidence multiplying through it.

use trellis::extract::{
    extract, Candidate, ExtractedEdge, Extraction, ExtractorConfig, ObjectCatalog, StatementKind,
};
use trellis::graph::{ObjectId, TransformationKind};

fn candidate(sql: &str) -> Candidate {
    Candidate {
        statement_text: sql.to_string(),
        default_database: Some("db".to_string()),
        default_schema: Some("s".to_string()),
        declared_kind: StatementKind::Insert,
    }
}

fn run(sql: &str) -> Extraction {
    extract(&candidate(sql), &ObjectCatalog::new(), &ExtractorConfig::default())
        .unwrap_or_else(|err| panic!("extraction failed for {sql:?}: {err}"))
}

fn edge<'a>(extraction: &'a Extraction, source: &str, target: &str) -> &'a ExtractedEdge {
    extraction
        .edges
        .iter()
        .find(|e| e.source.as_str() == source && e.target.as_str() == target)
        .unwrap_or_else(|| panic!("no edge {} -> {}", source, target))
}

// ============================================================================
// CTE substitution
// ============================================================================

#[test]
fn test_cte_chain_composes_kind_and_multiplies_confidence() {
    let extraction = run(
        "INSERT INTO tgt (total) \
         WITH mid AS (SELECT price * quantity AS revenue FROM sales) \
         SELECT SUM(revenue) FROM mid",
    );

    // calculation inside the layer, aggregation outside: the chain reports
    // the strongest transformation and the product of both confidences
    for source in ["db.s.sales.price", "db.s.sales.quantity"] {
        let e = edge(&extraction, source, "db.s.tgt.total");
        assert_eq!(e.kind, TransformationKind::Aggregation);
        assert!((e.confidence - 0.81).abs() < 1e-9, "got {}", e.confidence);
    }
    // the intermediate relation never appears as a node
    assert!(extraction.nodes.iter().all(|n| n.id.as_str() != "db.s.mid"));
}

#[test]
fn test_bare_copies_through_layers_do_not_decay() {
    let extraction = run(
        "INSERT INTO tgt (v) \
         WITH a AS (SELECT x + 1 AS c1 FROM base), \
              b AS (SELECT c1 AS c2 FROM a) \
         SELECT c2 FROM b",
    );

    let e = edge(&extraction, "db.s.base.x", "db.s.tgt.v");
    assert_eq!(e.kind, TransformationKind::Calculation);
    assert!((e.confidence - 0.9).abs() < f64::EPSILON);
}

#[test]
fn test_chain_confidence_never_drops_below_the_floor() {
    let config = ExtractorConfig {
        calculation: 0.2,
        chain_floor: 0.1,
        ..ExtractorConfig::default()
    };
    let extraction = extract(
        &candidate(
            "INSERT INTO tgt (v) \
             WITH m AS (SELECT x * 2 AS c FROM base) \
             SELECT c + 1 FROM m",
        ),
        &ObjectCatalog::new(),
        &config,
    )
    .unwrap();

    // 0.2 * 0.2 would be 0.04; the floor catches it
    let e = edge(&extraction, "db.s.base.x", "db.s.tgt.v");
    assert!((e.confidence - 0.1).abs() < f64::EPSILON);
}

#[test]
fn test_cte_inner_filter_gates_the_outer_write() {
    let extraction = run(
        "INSERT INTO tgt (v) \
         WITH recent AS (SELECT id FROM events WHERE ts > 0) \
         SELECT id FROM recent",
    );

    let copy = edge(&extraction, "db.s.events.id", "db.s.tgt.v");
    assert_eq!(copy.kind, TransformationKind::DirectCopy);
    let gate = edge(&extraction, "db.s.events.ts", "db.s.tgt.v");
    assert_eq!(gate.kind, TransformationKind::Filter);
}

// ============================================================================
// Derived tables
// ============================================================================

#[test]
fn test_derived_table_substitutes_to_base_columns() {
    let extraction =
        run("INSERT INTO t (x) SELECT v.x FROM (SELECT a AS x FROM base) v");
    let e = edge(&extraction, "db.s.base.a", "db.s.t.x");
    assert_eq!(e.kind, TransformationKind::DirectCopy);
    assert!((e.confidence - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_derived_table_alias_columns_rename_positions() {
    let extraction = run(
        "INSERT INTO t (x) SELECT d.renamed FROM (SELECT a FROM base) AS d (renamed)",
    );
    edge(&extraction, "db.s.base.a", "db.s.t.x");
}

#[test]
fn test_scalar_subquery_in_projection_is_resolved() {
    let extraction =
        run("INSERT INTO tgt (v) SELECT (SELECT MAX(m) FROM other) FROM t1");
    let e = edge(&extraction, "db.s.other.m", "db.s.tgt.v");
    assert_eq!(e.kind, TransformationKind::Aggregation);
    assert!((e.confidence - 0.81).abs() < 1e-9);
}

// ============================================================================
// Set operations
// ============================================================================

#[test]
fn test_union_branches_merge_per_position() {
    let extraction =
        run("INSERT INTO tgt (v) SELECT a FROM t1 UNION ALL SELECT b FROM t2");
    let first = edge(&extraction, "db.s.t1.a", "db.s.tgt.v");
    let second = edge(&extraction, "db.s.t2.b", "db.s.tgt.v");
    assert_eq!(first.kind, TransformationKind::DirectCopy);
    assert_eq!(second.kind, TransformationKind::DirectCopy);
}

// ============================================================================
// Attribution across relations
// ============================================================================

#[test]
fn test_unqualified_column_attributed_by_catalog_schema() {
    let mut catalog = ObjectCatalog::new();
    catalog.record(ObjectId::new("db.s.b"), vec!["x".to_string()]);
    let extraction = extract(
        &candidate("INSERT INTO tgt (v) SELECT x FROM a JOIN b ON a.id = b.id"),
        &catalog,
        &ExtractorConfig::default(),
    )
    .unwrap();

    edge(&extraction, "db.s.b.x", "db.s.tgt.v");
    assert!(extraction
        .edges
        .iter()
        .all(|e| e.source.as_str() != "db.s.a.x"));
}

#[test]
fn test_alias_qualification_resolves_to_the_aliased_table() {
    let extraction = run(
        "INSERT INTO tgt (amount) SELECT o.amount FROM orders o, customers c",
    );
    edge(&extraction, "db.s.orders.amount", "db.s.tgt.amount");
}

#[test]
fn test_using_join_collects_the_shared_key_as_a_join_edge() {
    let extraction =
        run("INSERT INTO tgt (v) SELECT a FROM t1 JOIN t2 USING (id)");
    let gate = edge(&extraction, "db.s.t1.id", "db.s.tgt.v");
    assert_eq!(gate.kind, TransformationKind::Join);
}

// ============================================================================
// Session context
// ============================================================================

#[test]
fn test_missing_session_context_degrades_to_bare_names() {
    let extraction = extract(
        &Candidate {
            statement_text: "INSERT INTO t2 (b) SELECT a FROM t1".to_string(),
            default_database: None,
            default_schema: None,
            declared_kind: StatementKind::Insert,
        },
        &ObjectCatalog::new(),
        &ExtractorConfig::default(),
    )
    .unwrap();

    edge(&extraction, "t1.a", "t2.b");
}
