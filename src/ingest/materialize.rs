//! Materialize an extraction into the graph store.
//!
//! Node and edge writes go through the store's read-merge-write upserts, so
//! replaying the same statement is a no-op beyond widening timestamps. A
//! busy database gets a few spaced retries before the batch gives up.

use std::thread;
use std::time::Duration;

use crate::extract::Extraction;
use crate::graph::model::{Edge, EdgeKind, Node, DEFAULT_SUPPORTING_QUERIES_CAP};
use crate::graph::store::{GraphStore, StoreError, StoreResult};

const BUSY_RETRIES: u64 = 3;
const BUSY_BACKOFF_MS: u64 = 50;

/// What one extraction wrote.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterializeReport {
    pub nodes_written: usize,
    pub edges_written: usize,
}

/// Upsert every node and edge of one extraction, stamping the statement's
/// own timestamp as the observation time.
pub fn materialize(
    store: &GraphStore,
    extraction: &Extraction,
    query_id: &str,
    observed_ts: i64,
) -> StoreResult<MaterializeReport> {
    materialize_with_cap(
        store,
        extraction,
        query_id,
        observed_ts,
        DEFAULT_SUPPORTING_QUERIES_CAP,
    )
}

/// [`materialize`] with an explicit bound on retained supporting-query ids.
pub fn materialize_with_cap(
    store: &GraphStore,
    extraction: &Extraction,
    query_id: &str,
    observed_ts: i64,
    supporting_queries_cap: usize,
) -> StoreResult<MaterializeReport> {
    let mut report = MaterializeReport::default();
    for node_ref in &extraction.nodes {
        let node = Node::new(node_ref.id.clone(), node_ref.object_type, observed_ts);
        with_retry(|| store.upsert_node(&node))?;
        report.nodes_written += 1;
    }
    for extracted in &extraction.edges {
        let edge = Edge::new(
            extracted.source.clone(),
            extracted.target.clone(),
            EdgeKind::Lineage(extracted.kind),
            extracted.confidence,
            observed_ts,
        )
        .with_query(query_id);
        with_retry(|| store.upsert_edge(&edge, supporting_queries_cap))?;
        report.edges_written += 1;
    }
    Ok(report)
}

/// Retry a store operation a few times when the database is locked by a
/// concurrent writer. Everything else propagates immediately.
fn with_retry<T>(mut op: impl FnMut() -> StoreResult<T>) -> StoreResult<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(StoreError::Sqlite(err)) if is_busy(&err) && attempt < BUSY_RETRIES => {
                attempt += 1;
                log::warn!("store busy, retry {} of {}", attempt, BUSY_RETRIES);
                thread::sleep(Duration::from_millis(BUSY_BACKOFF_MS * attempt));
            }
            other => return other,
        }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::DatabaseBusy
    )
}

// ============================================================================
// Tests
// ============================================================================
