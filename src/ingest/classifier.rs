//! Statement classification: deciding which history rows are worth parsing.
//!
//! Classification is a cheap gate in front of the extractor. It never parses
//! SQL; it trusts the feed's declared statement type when one is present and
//! falls back to a leading-keyword sniff when it is not. Rows that did not
//! complete successfully are dropped outright so failed statements never
//! contribute edges.

use std::sync::LazyLock;

use regex::Regex;

use crate::extract::{Candidate, StatementKind};
use crate::feed::QueryHistoryRow;

/// Outcome of classifying one history row.
#[derive(Debug, Clone)]
pub enum Classification {
    /// Hand this statement to the extractor.
    Candidate(Candidate),
    /// Not worth parsing; the reason lands in the processing log.
    NotRelevant { reason: &'static str },
}

static INSERT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^INSERT\b").unwrap());
static MERGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^MERGE\b").unwrap());
static UPDATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^UPDATE\b").unwrap());
static VIEW_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^CREATE\s+(?:OR\s+REPLACE\s+)?(?:SECURE\s+)?(?:MATERIALIZED\s+)?VIEW\b")
        .unwrap()
});
static CTAS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^CREATE\s+(?:OR\s+REPLACE\s+)?(?:TRANSIENT\s+|TEMP(?:ORARY)?\s+)?TABLE\b.*\bAS\b",
    )
    .unwrap()
});

pub fn classify(row: &QueryHistoryRow) -> Classification {
    if !row.execution_status.eq_ignore_ascii_case("SUCCESS") {
        return Classification::NotRelevant {
            reason: "statement did not complete",
        };
    }
    if row.query_text.trim().is_empty() {
        return Classification::NotRelevant {
            reason: "empty statement text",
        };
    }

    let kind = match row.query_type.as_deref().map(str::trim) {
        Some(declared) if !declared.is_empty() => match kind_from_declared(declared) {
            Some(kind) => kind,
            None => {
                return Classification::NotRelevant {
                    reason: "statement type carries no lineage",
                }
            }
        },
        _ => match sniff_kind(&row.query_text) {
            Some(kind) => kind,
            None => {
                return Classification::NotRelevant {
                    reason: "no lineage-bearing statement form",
                }
            }
        },
    };

    Classification::Candidate(Candidate {
        statement_text: row.query_text.clone(),
        default_database: row.database.clone(),
        default_schema: row.schema.clone(),
        declared_kind: kind,
    })
}

fn kind_from_declared(declared: &str) -> Option<StatementKind> {
    match declared.to_uppercase().as_str() {
        "CREATE_TABLE_AS_SELECT" => Some(StatementKind::CreateTableAsSelect),
        "INSERT" => Some(StatementKind::Insert),
        "MERGE" => Some(StatementKind::Merge),
        "UPDATE" => Some(StatementKind::Update),
        "CREATE_VIEW" => Some(StatementKind::CreateView),
        _ => None,
    }
}

fn sniff_kind(sql: &str) -> Option<StatementKind> {
    let head = statement_head(sql);
    if INSERT_PATTERN.is_match(head) {
        Some(StatementKind::Insert)
    } else if MERGE_PATTERN.is_match(head) {
        Some(StatementKind::Merge)
    } else if UPDATE_PATTERN.is_match(head) {
        Some(StatementKind::Update)
    } else if VIEW_PATTERN.is_match(head) {
        Some(StatementKind::CreateView)
    } else if CTAS_PATTERN.is_match(head) {
        Some(StatementKind::CreateTableAsSelect)
    } else {
        None
    }
}

/// Skip leading whitespace and comments so the keyword patterns can anchor.
fn statement_head(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix("--") {
            match after.find('\n') {
                Some(i) => rest = &after[i + 1..],
                None => return "",
            }
        } else if let Some(after) = trimmed.strip_prefix("/*") {
            match after.find("*/") {
                Some(i) => rest = &after[i + 2..],
                None => return "",
            }
        } else {
            return trimmed;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
