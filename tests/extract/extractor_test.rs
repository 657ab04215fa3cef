//! Integration tests for column dependency extraction.
//!
//! Statements go in as the classifier would hand them over; assertions run
//! against the resolved edges: canonical ids, transformation kinds, and the
//! relative ordering of confidence values.

use trellis::extract::{
    extract, Candidate, ExtractError, ExtractedEdge, Extraction, ExtractorConfig, ObjectCatalog,
    StatementKind,
};
use trellis::graph::TransformationKind;

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
// Canonical scenarios
// ============================================================================

#[test]
fn test_plain_copy_yields_direct_copy_at_full_confidence() {
    let extraction = run("INSERT INTO t2 (b) SELECT a FROM t1");
    assert_eq!(extraction.edges.len(), 1);
    let e = edge(&extraction, "db.s.t1.a", "db.s.t2.b");
    assert_eq!(e.kind, TransformationKind::DirectCopy);
    assert!((e.confidence - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_sum_yields_aggregation() {
    let extraction = run("INSERT INTO t2 (total) SELECT SUM(amount) FROM t1");
    assert_eq!(extraction.edges.len(), 1);
    let e = edge(&extraction, "db.s.t1.amount", "db.s.t2.total");
    assert_eq!(e.kind, TransformationKind::Aggregation);
}

#[test]
fn test_arithmetic_yields_calculation() {
    let extraction = run("INSERT INTO t2 (margin) SELECT price - cost FROM t1");
    let price = edge(&extraction, "db.s.t1.price", "db.s.t2.margin");
    let cost = edge(&extraction, "db.s.t1.cost", "db.s.t2.margin");
    assert_eq!(price.kind, TransformationKind::Calculation);
    assert_eq!(cost.kind, TransformationKind::Calculation);
}

#[test]
fn test_where_clause_yields_filter_edges_onto_written_columns() {
    let extraction = run("INSERT INTO t2 (b) SELECT a FROM t1 WHERE region = 'emea'");
    let e = edge(&extraction, "db.s.t1.region", "db.s.t2.b");
    assert_eq!(e.kind, TransformationKind::Filter);
}

#[test]
fn test_join_key_yields_join_edges() {
    let extraction = run(
        "INSERT INTO t2 (amount) \
         SELECT o.amount FROM orders o JOIN customers c ON o.customer_id = c.id",
    );
    let left = edge(&extraction, "db.s.orders.customer_id", "db.s.t2.amount");
    let right = edge(&extraction, "db.s.customers.id", "db.s.t2.amount");
    assert_eq!(left.kind, TransformationKind::Join);
    assert_eq!(right.kind, TransformationKind::Join);
}

// ============================================================================
// Confidence ordering
// ============================================================================

// The shipped constants are tunable; what must hold is the order:
// copies beat calculations, calculations are at least as certain as
// aggregations, value flow beats row gating, and unknown trails everything.
#[test]
fn test_confidence_order_across_transformation_kinds() {
    let copy = edge(
        &run("INSERT INTO t2 (b) SELECT a FROM t1"),
        "db.s.t1.a",
        "db.s.t2.b",
    )
    .confidence;
    let calc = edge(
        &run("INSERT INTO t2 (b) SELECT a + 1 FROM t1"),
        "db.s.t1.a",
        "db.s.t2.b",
    )
    .confidence;
    let agg = edge(
        &run("INSERT INTO t2 (b) SELECT MAX(a) FROM t1"),
        "db.s.t1.a",
        "db.s.t2.b",
    )
    .confidence;
    let filter = edge(
        &run("INSERT INTO t2 (b) SELECT a FROM t1 WHERE c = 1"),
        "db.s.t1.c",
        "db.s.t2.b",
    )
    .confidence;
    let unknown = edge(
        &run("INSERT INTO t2 (b) SELECT * FROM t1"),
        "db.s.t1",
        "db.s.t2.b",
    )
    .confidence;

    assert!(copy > calc, "copy {copy} vs calculation {calc}");
    assert!(calc >= agg, "calculation {calc} vs aggregation {agg}");
    assert!(agg > filter, "aggregation {agg} vs filter {filter}");
    assert!(filter > unknown, "filter {filter} vs unknown {unknown}");
}

#[test]
fn test_tuned_constants_flow_through() {
    let config = ExtractorConfig {
        aggregation: 0.7,
        ..ExtractorConfig::default()
    };
    let extraction = extract(
        &candidate("INSERT INTO t2 (total) SELECT SUM(amount) FROM t1"),
        &ObjectCatalog::new(),
        &config,
    )
    .unwrap();
    let e = edge(&extraction, "db.s.t1.amount", "db.s.t2.total");
    assert!((e.confidence - 0.7).abs() < f64::EPSILON);
}

// ============================================================================
// Determinism and normalization
// ============================================================================

#[test]
fn test_extraction_is_deterministic() {
    let sql = "INSERT INTO t2 (b, total) \
               SELECT a, SUM(amount) FROM t1 JOIN t3 ON t1.id = t3.id \
               WHERE t3.kind = 'x' GROUP BY a";
    let first = run(sql);
    let second = run(sql);
    assert_eq!(first.edges, second.edges);
    assert_eq!(first.nodes, second.nodes);
}

#[test]
fn test_identifiers_are_lowercased() {
    let extraction = run("INSERT INTO T2 (B) SELECT A FROM T1");
    edge(&extraction, "db.s.t1.a", "db.s.t2.b");
}

#[test]
fn test_qualified_names_override_session_context() {
    let extraction = run(
        "INSERT INTO warehouse.mart.fact (b) SELECT a FROM warehouse.staging.raw",
    );
    edge(
        &extraction,
        "warehouse.staging.raw.a",
        "warehouse.mart.fact.b",
    );
}

#[test]
fn test_schema_qualified_names_take_the_session_database() {
    let extraction = run("INSERT INTO mart.fact (b) SELECT a FROM staging.raw");
    edge(&extraction, "db.staging.raw.a", "db.mart.fact.b");
}

// ============================================================================
// Degradation and errors
// ============================================================================

#[test]
fn test_unresolvable_wildcard_degrades_instead_of_failing() {
    let extraction = run("INSERT INTO t2 SELECT * FROM mystery");
    assert_eq!(extraction.edges.len(), 1);
    let e = edge(&extraction, "db.s.mystery", "db.s.t2");
    assert_eq!(e.kind, TransformationKind::Unknown);
}

#[test]
fn test_catalog_turns_the_same_wildcard_into_column_edges() {
    let mut catalog = ObjectCatalog::new();
    catalog.record(
        trellis::graph::ObjectId::new("db.s.mystery"),
        vec!["a".to_string(), "b".to_string()],
    );
    let extraction = extract(
        &candidate("INSERT INTO t2 SELECT * FROM mystery"),
        &catalog,
        &ExtractorConfig::default(),
    )
    .unwrap();

    assert_eq!(extraction.edges.len(), 2);
    edge(&extraction, "db.s.mystery.a", "db.s.t2.a");
    edge(&extraction, "db.s.mystery.b", "db.s.t2.b");
}

#[test]
fn test_garbage_is_a_parse_error() {
    let err = extract(
        &candidate("INSERT INTO t2 SELEC a FRM t1"),
        &ObjectCatalog::new(),
        &ExtractorConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ExtractError::Parse { .. }));
}

#[test]
fn test_read_only_text_is_unsupported_not_a_parse_error() {
    let err = extract(
        &candidate("SELECT a FROM t1"),
        &ObjectCatalog::new(),
        &ExtractorConfig::default(),
    )
    .unwrap_err();
    match err {
        ExtractError::UnsupportedStatement(found) => assert_eq!(found, "SELECT"),
        other => panic!("expected unsupported statement, got {other}"),
    }
}

#[test]
fn test_first_handled_statement_in_a_batch_wins() {
    let extraction = run("SELECT 1; INSERT INTO t2 (b) SELECT a FROM t1");
    assert_eq!(extraction.target_object.as_str(), "db.s.t2");
    edge(&extraction, "db.s.t1.a", "db.s.t2.b");
}
