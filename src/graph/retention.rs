//! Age-based retention sweep.
//!
//! Ingestion only ever adds; this is the one place graph data is removed.
//! The sweep runs in a single transaction and is invoked explicitly, never
//! from the pipeline.

use log::info;
use rusqlite::params;
use serde::Serialize;

use crate::graph::store::{GraphStore, StoreResult};

/// What the sweep removes.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Edges whose last observation is older than this many days are
    /// dropped, along with nodes nothing references afterwards.
    pub edge_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { edge_days: 90 }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Serialize)]
pub struct RetentionReport {
    pub edges_deleted: usize,
    pub nodes_deleted: usize,
    pub cutoff_ts: i64,
}

/// Delete edges last observed before the policy cutoff, then nodes that are
/// both unreferenced by any remaining edge and themselves unseen since the
/// cutoff. The second condition keeps freshly created nodes that have no
/// edges yet.
pub fn apply_retention(
    store: &GraphStore,
    policy: &RetentionPolicy,
    now_ts: i64,
) -> StoreResult<RetentionReport> {
    let cutoff_ts = now_ts - policy.edge_days * 24 * 60 * 60 * 1000;
    let tx = store.connection().unchecked_transaction()?;

    let edges_deleted = tx.execute(
        "DELETE FROM edges WHERE observed_ts < ?1",
        params![cutoff_ts],
    )?;
    let nodes_deleted = tx.execute(
        "DELETE FROM nodes
         WHERE last_seen_ts < ?1
           AND id NOT IN (SELECT source FROM edges)
           AND id NOT IN (SELECT target FROM edges)",
        params![cutoff_ts],
    )?;

    tx.commit()?;

    info!(
        "retention sweep removed {} edges and {} nodes older than {}",
        edges_deleted, nodes_deleted, cutoff_ts
    );

    Ok(RetentionReport {
        edges_deleted,
        nodes_deleted,
        cutoff_ts,
    })
}
