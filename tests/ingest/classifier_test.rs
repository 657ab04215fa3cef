//! Integration tests for statement classification.
//!
//! Classification gates the extractor: failed rows drop out, the feed's
//! declared statement type is trusted when present, and the leading keyword
//! is sniffed when it is not.

use trellis::extract::StatementKind;
use trellis::feed::QueryHistoryRow;
use trellis::ingest::{classify, Classification};

fn kind_of(classification: &Classification) -> Option<StatementKind> {
    match classification {
        Classification::Candidate(candidate) => Some(candidate.declared_kind),
        Classification::NotRelevant { .. } => None,
    }
}

// ============================================================================
// Success gate
// ============================================================================

#[test]
fn test_failed_statement_never_reaches_the_extractor() {
    let row = QueryHistoryRow::new("q1", "INSERT INTO t2 (b) SELECT a FROM t1", 1_000)
        .with_status("FAILED");
    assert!(matches!(
        classify(&row),
        Classification::NotRelevant { .. }
    ));
}

#[test]
fn test_success_status_is_case_insensitive() {
    let row = QueryHistoryRow::new("q1", "INSERT INTO t2 (b) SELECT a FROM t1", 1_000)
        .with_status("success");
    assert_eq!(kind_of(&classify(&row)), Some(StatementKind::Insert));
}

#[test]
fn test_blank_statement_text_is_not_relevant() {
    let row = QueryHistoryRow::new("q1", "   \n  ", 1_000);
    assert!(matches!(
        classify(&row),
        Classification::NotRelevant { .. }
    ));
}

// ============================================================================
// Declared statement types
// ============================================================================

#[test]
fn test_declared_type_routes_without_sniffing() {
    // The text starts with a CTE, which the keyword sniff would not
    // recognize; the declared type carries it through.
    let row = QueryHistoryRow::new(
        "q1",
        "WITH src AS (SELECT a FROM t1) INSERT INTO t2 (b) SELECT a FROM src",
        1_000,
    )
    .with_type("INSERT");
    assert_eq!(kind_of(&classify(&row)), Some(StatementKind::Insert));
}

#[test]
fn test_declared_type_is_normalized() {
    let row = QueryHistoryRow::new("q1", "merge into d using s on d.id = s.id", 1_000)
        .with_type("merge");
    assert_eq!(kind_of(&classify(&row)), Some(StatementKind::Merge));
}

#[test]
fn test_declared_read_only_type_is_not_relevant() {
    let row = QueryHistoryRow::new("q1", "SELECT a FROM t1", 1_000).with_type("SELECT");
    assert!(matches!(
        classify(&row),
        Classification::NotRelevant { .. }
    ));
}

#[test]
fn test_blank_declared_type_falls_back_to_sniffing() {
    let row = QueryHistoryRow::new("q1", "UPDATE t SET a = 1", 1_000).with_type("  ");
    assert_eq!(kind_of(&classify(&row)), Some(StatementKind::Update));
}

// ============================================================================
// Keyword sniffing
// ============================================================================

#[test]
fn test_sniff_recognizes_every_lineage_form() {
    let cases = [
        ("INSERT INTO t2 SELECT a FROM t1", StatementKind::Insert),
        ("MERGE INTO d USING s ON d.id = s.id", StatementKind::Merge),
        ("UPDATE t SET a = b", StatementKind::Update),
        ("CREATE VIEW v AS SELECT a FROM t1", StatementKind::CreateView),
        (
            "CREATE OR REPLACE MATERIALIZED VIEW v AS SELECT a FROM t1",
            StatementKind::CreateView,
        ),
        (
            "CREATE TABLE t2 AS SELECT a FROM t1",
            StatementKind::CreateTableAsSelect,
        ),
        (
            "CREATE OR REPLACE TRANSIENT TABLE t2 AS SELECT a FROM t1",
            StatementKind::CreateTableAsSelect,
        ),
    ];
    for (sql, expected) in cases {
        let row = QueryHistoryRow::new("q", sql, 1_000);
        assert_eq!(kind_of(&classify(&row)), Some(expected), "sql: {sql}");
    }
}

#[test]
fn test_sniff_skips_leading_comments() {
    let row = QueryHistoryRow::new(
        "q1",
        "-- nightly load\n/* owner: etl */ INSERT INTO t2 (b) SELECT a FROM t1",
        1_000,
    );
    assert_eq!(kind_of(&classify(&row)), Some(StatementKind::Insert));
}

#[test]
fn test_comment_only_text_is_not_relevant() {
    let row = QueryHistoryRow::new("q1", "-- just a note", 1_000);
    assert!(matches!(
        classify(&row),
        Classification::NotRelevant { .. }
    ));
}

#[test]
fn test_plain_create_table_is_not_a_candidate() {
    // DDL without AS SELECT defines a schema but moves no data.
    let row = QueryHistoryRow::new("q1", "CREATE TABLE t (a INT, b TEXT)", 1_000);
    assert!(matches!(
        classify(&row),
        Classification::NotRelevant { .. }
    ));
}

#[test]
fn test_read_only_statements_are_not_relevant() {
    for sql in ["SELECT a FROM t1", "SHOW TABLES", "GRANT SELECT ON t TO r"] {
        let row = QueryHistoryRow::new("q", sql, 1_000);
        assert!(
            matches!(classify(&row), Classification::NotRelevant { .. }),
            "sql: {sql}"
        );
    }
}

// ============================================================================
// Session context
// ============================================================================

#[test]
fn test_candidate_carries_session_context() {
    let row = QueryHistoryRow::new("q1", "INSERT INTO t2 (b) SELECT a FROM t1", 1_000)
        .with_context("analytics", "public");
    match classify(&row) {
        Classification::Candidate(candidate) => {
            assert_eq!(candidate.default_database.as_deref(), Some("analytics"));
            assert_eq!(candidate.default_schema.as_deref(), Some("public"));
            assert_eq!(candidate.statement_text, row.query_text);
        }
        Classification::NotRelevant { reason } => panic!("unexpected skip: {reason}"),
    }
}
