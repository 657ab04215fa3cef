//! External feed shapes: query history, grants, usage.
//!
//! These are the engine's only inputs. The shapes mirror what warehouse
//! account views export, reduced to the fields ingestion consumes. Feeds
//! order rows by start time; the engine never reaches into warehouse system
//! tables itself.

pub mod jsonl;

use serde::{Deserialize, Serialize};

pub use jsonl::JsonlFeed;

/// Errors reading or decoding a feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed feed row: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;

/// One row of warehouse query history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHistoryRow {
    pub query_id: String,
    pub query_text: String,
    /// Warehouse-declared statement type, e.g. "INSERT". Some feeds omit it
    /// and the classifier sniffs the text instead.
    #[serde(default)]
    pub query_type: Option<String>,
    pub execution_status: String,
    /// Session database context for resolving unqualified names.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    /// Statement start, epoch milliseconds. Orders the feed and drives the
    /// watermark.
    pub start_time: i64,
    #[serde(default)]
    pub end_time: Option<i64>,
}

impl QueryHistoryRow {
    /// A successful row with no declared type or session context.
    pub fn new(query_id: impl Into<String>, query_text: impl Into<String>, start_time: i64) -> Self {
        Self {
            query_id: query_id.into(),
            query_text: query_text.into(),
            query_type: None,
            execution_status: "SUCCESS".to_string(),
            database: None,
            schema: None,
            start_time,
            end_time: None,
        }
    }

    #[must_use]
    pub fn with_type(mut self, query_type: impl Into<String>) -> Self {
        self.query_type = Some(query_type.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.execution_status = status.into();
        self
    }

    #[must_use]
    pub fn with_context(mut self, database: impl Into<String>, schema: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self.schema = Some(schema.into());
        self
    }
}

/// One grant fact.
///
/// For object privileges, `role_name` holds `privilege` on `object_name`.
/// For grants of roles (`granted_on == "ROLE"`), `object_name` is the role
/// being granted and `role_name` the role receiving it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantRow {
    pub role_name: String,
    pub privilege: String,
    /// Securable kind: TABLE, VIEW, MATERIALIZED_VIEW, SCHEMA, DATABASE or
    /// ROLE.
    pub granted_on: String,
    /// Dotted object name, or the bare role name for ROLE grants.
    pub object_name: String,
    /// Role that issued the grant. Carried through for audit output; not
    /// part of the edge.
    #[serde(default)]
    pub grantor: Option<String>,
    pub granted_at: i64,
}

/// One usage fact: a user (under a role) read an object, optionally down to
/// the column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRow {
    #[serde(default)]
    pub user_name: Option<String>,
    pub role_name: String,
    pub object_name: String,
    /// Securable kind of the accessed object; TABLE when absent.
    #[serde(default)]
    pub object_domain: Option<String>,
    #[serde(default)]
    pub column_name: Option<String>,
    pub accessed_at: i64,
}

/// Source of query-history rows for the ingestion pipeline.
///
/// Implementations return rows ascending by `start_time`. When the limit
/// falls inside a group of rows sharing one timestamp, the whole group is
/// returned anyway: the watermark advances to the last attempted row's
/// timestamp with a strictly-greater fetch, so splitting such a group would
/// hide its tail from the next batch.
pub trait QueryHistoryFeed {
    /// Rows with `start_time` strictly greater than `watermark`.
    fn fetch_after(&self, watermark: i64, limit: usize) -> FeedResult<Vec<QueryHistoryRow>>;

    /// Rows within the half-open range `[start, end)`, for workers assigned
    /// disjoint time slices.
    fn fetch_range(&self, start: i64, end: i64, limit: usize) -> FeedResult<Vec<QueryHistoryRow>>;
}

/// In-memory feed over a fixed set of rows, sorted on construction.
pub struct MemoryFeed {
    rows: Vec<QueryHistoryRow>,
}

impl MemoryFeed {
    pub fn new(mut rows: Vec<QueryHistoryRow>) -> Self {
        rows.sort_by_key(|row| row.start_time);
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

impl QueryHistoryFeed for MemoryFeed {
    fn fetch_after(&self, watermark: i64, limit: usize) -> FeedResult<Vec<QueryHistoryRow>> {
        Ok(take_group(
            self.rows.iter().filter(|row| row.start_time > watermark),
            limit,
        ))
    }

    fn fetch_range(&self, start: i64, end: i64, limit: usize) -> FeedResult<Vec<QueryHistoryRow>> {
        Ok(take_group(
            self.rows
                .iter()
                .filter(|row| row.start_time >= start && row.start_time < end),
            limit,
        ))
    }
}

/// Take up to `limit` rows, then keep taking while the timestamp matches the
/// last taken row so a timestamp group is never split.
fn take_group<'a>(
    rows: impl Iterator<Item = &'a QueryHistoryRow>,
    limit: usize,
) -> Vec<QueryHistoryRow> {
    let mut out: Vec<QueryHistoryRow> = Vec::new();
    for row in rows {
        if out.len() >= limit {
            match out.last() {
                Some(last) if last.start_time == row.start_time => {}
                _ => break,
            }
        }
        out.push(row.clone());
    }
    out
}
