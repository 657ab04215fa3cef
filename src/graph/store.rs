//! SQLite-backed graph store.
//!
//! Holds the node/edge arena, the ingestion watermark and the append-only
//! processing log in a single database file (`~/.trellis/graph.db` by
//! default).
//!
//! # Design
//!
//! - Stable-id tables, no in-memory object graph: nodes keyed by canonical
//!   id, edges keyed by their deterministic hash
//! - Upserts merge instead of overwrite (max confidence, widened
//!   seen-windows), so replaying history is safe
//! - Versioned - auto-clears on version mismatch
//! - Edge upserts run in their own transaction; readers may hold a second
//!   connection and observe per-edge atomicity, nothing stronger

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::graph::model::{Edge, EdgeId, EdgeKind, Node, ObjectId, ObjectType};

/// Current store schema version. Bump this when the schema changes.
const STORE_VERSION: i32 = 1;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to determine store directory")]
    NoStoreDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown node: {0}")]
    UnknownNode(ObjectId),

    #[error("Corrupt store row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Processing log records
// =============================================================================

/// Outcome of one ingestion attempt on one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    Success,
    Failed,
    Skipped,
}

impl AttemptStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "SUCCESS",
            AttemptStatus::Failed => "FAILED",
            AttemptStatus::Skipped => "SKIPPED",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "SUCCESS" => Some(AttemptStatus::Success),
            "FAILED" => Some(AttemptStatus::Failed),
            "SKIPPED" => Some(AttemptStatus::Skipped),
            _ => None,
        }
    }
}

/// One row of the append-only processing log. Entries are never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub query_id: String,
    pub status: AttemptStatus,
    /// Failure or skip reason, when there is one.
    pub detail: Option<String>,
    /// Which extraction path handled the statement.
    pub parse_method: Option<String>,
    /// Feed timestamp of the statement this attempt covered.
    pub attempted_at: i64,
    pub batch_id: String,
}

/// Aggregate counts for operational reporting.
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub nodes_total: i64,
    pub edges_total: i64,
    pub nodes_by_type: Vec<(String, i64)>,
    pub edges_by_kind: Vec<(String, i64)>,
    /// Edge counts in fixed confidence bands, lowest band first.
    pub confidence_histogram: Vec<(String, i64)>,
}

// =============================================================================
// Store
// =============================================================================

/// SQLite-backed graph store.
pub struct GraphStore {
    conn: Connection,
}

// Raw edge row, finished into an Edge outside the rusqlite closure so label
// and JSON failures surface as StoreError.
struct EdgeRow {
    id: String,
    source: String,
    target: String,
    kind: String,
    confidence: f64,
    access_count: i64,
    queries_json: String,
    first_seen_ts: i64,
    observed_ts: i64,
}

impl GraphStore {
    /// Open or create a graph store at the given path.
    ///
    /// If the stored schema version doesn't match, all graph data is cleared.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Open or create the store at the default location,
    /// `~/.trellis/graph.db`.
    pub fn open_default() -> StoreResult<Self> {
        Self::open(Self::default_path()?)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Default store location under the user's home directory.
    pub fn default_path() -> StoreResult<PathBuf> {
        let base = dirs::home_dir().ok_or(StoreError::NoStoreDir)?;
        Ok(base.join(".trellis").join("graph.db"))
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Initialize the schema and check the version.
    fn init(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                object_type TEXT NOT NULL,
                first_seen_ts INTEGER NOT NULL,
                last_seen_ts INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                target TEXT NOT NULL,
                kind TEXT NOT NULL,
                confidence REAL NOT NULL,
                access_count INTEGER NOT NULL DEFAULT 0,
                supporting_queries TEXT NOT NULL,
                first_seen_ts INTEGER NOT NULL,
                observed_ts INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);
            CREATE INDEX IF NOT EXISTS idx_edges_observed ON edges(observed_ts);

            CREATE TABLE IF NOT EXISTS processing_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query_id TEXT NOT NULL,
                status TEXT NOT NULL,
                detail TEXT,
                parse_method TEXT,
                attempted_at INTEGER NOT NULL,
                batch_id TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_log_attempted ON processing_log(attempted_at);

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        let stored_version: Option<i32> = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == STORE_VERSION => {}
            Some(_) => {
                self.clear_all()?;
                self.set_version()?;
            }
            None => {
                self.set_version()?;
            }
        }

        Ok(())
    }

    fn set_version(&self) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
            params![STORE_VERSION.to_string()],
        )?;
        Ok(())
    }

    /// Drop all graph data, the processing log and the watermark.
    pub fn clear_all(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "
            DELETE FROM nodes;
            DELETE FROM edges;
            DELETE FROM processing_log;
            DELETE FROM meta WHERE key = 'watermark';
            ",
        )?;
        Ok(())
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Insert a node or widen the seen-window of the existing one.
    ///
    /// The object type recorded at first sight wins; later observations only
    /// touch the timestamps.
    pub fn upsert_node(&self, node: &Node) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO nodes (id, object_type, first_seen_ts, last_seen_ts)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 first_seen_ts = MIN(first_seen_ts, excluded.first_seen_ts),
                 last_seen_ts = MAX(last_seen_ts, excluded.last_seen_ts)",
            params![
                node.id.as_str(),
                node.object_type.label(),
                node.first_seen_ts,
                node.last_seen_ts
            ],
        )?;
        Ok(())
    }

    pub fn node(&self, id: &ObjectId) -> StoreResult<Option<Node>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, object_type, first_seen_ts, last_seen_ts
                 FROM nodes WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, type_label, first_seen_ts, last_seen_ts)) => {
                let object_type = ObjectType::from_label(&type_label).ok_or_else(|| {
                    StoreError::Corrupt(format!("unknown object type label: {}", type_label))
                })?;
                Ok(Some(Node {
                    id: ObjectId::new(id),
                    object_type,
                    first_seen_ts,
                    last_seen_ts,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn node_count(&self) -> StoreResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Substring search over node ids, optionally restricted to some object
    /// types. Results come back ordered by id.
    pub fn search(
        &self,
        pattern: &str,
        types: Option<&[ObjectType]>,
        limit: usize,
    ) -> StoreResult<Vec<Node>> {
        let like = format!("%{}%", pattern.to_lowercase());
        let mut sql = String::from(
            "SELECT id, object_type, first_seen_ts, last_seen_ts FROM nodes WHERE id LIKE ?1",
        );
        let mut params: Vec<String> = vec![like];
        if let Some(types) = types {
            let placeholders = (0..types.len())
                .map(|i| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" AND object_type IN ({})", placeholders));
            for ty in types {
                params.push(ty.label().to_string());
            }
        }
        sql.push_str(&format!(" ORDER BY id LIMIT {}", limit));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, type_label, first_seen_ts, last_seen_ts)| {
                let object_type = ObjectType::from_label(&type_label).ok_or_else(|| {
                    StoreError::Corrupt(format!("unknown object type label: {}", type_label))
                })?;
                Ok(Node {
                    id: ObjectId::new(id),
                    object_type,
                    first_seen_ts,
                    last_seen_ts,
                })
            })
            .collect()
    }

    // =========================================================================
    // Edges
    // =========================================================================

    /// Insert an edge observation or merge it into the existing edge.
    ///
    /// Merging keeps the maximum confidence, adds access counts, appends
    /// unseen supporting query ids up to `cap` and widens the seen-window.
    /// The read-merge-write runs in one transaction keyed by the edge id.
    pub fn upsert_edge(&self, observation: &Edge, cap: usize) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        let existing = Self::edge_on(&tx, &observation.id)?;
        let merged = match existing {
            Some(mut have) => {
                have.absorb(observation, cap);
                have
            }
            None => observation.clone(),
        };

        let queries_json = serde_json::to_string(&merged.supporting_queries)?;
        tx.execute(
            "INSERT OR REPLACE INTO edges
             (id, source, target, kind, confidence, access_count,
              supporting_queries, first_seen_ts, observed_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                merged.id.as_str(),
                merged.source.as_str(),
                merged.target.as_str(),
                merged.kind.label(),
                merged.confidence,
                merged.access_count,
                queries_json,
                merged.first_seen_ts,
                merged.observed_ts
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn edge(&self, id: &EdgeId) -> StoreResult<Option<Edge>> {
        Self::edge_on(&self.conn, id)
    }

    fn edge_on(conn: &Connection, id: &EdgeId) -> StoreResult<Option<Edge>> {
        let row = conn
            .query_row(
                "SELECT id, source, target, kind, confidence, access_count,
                        supporting_queries, first_seen_ts, observed_ts
                 FROM edges WHERE id = ?1",
                params![id.as_str()],
                Self::edge_row,
            )
            .optional()?;
        row.map(Self::finish_edge).transpose()
    }

    /// All edges whose source is the given node.
    pub fn edges_from(&self, id: &ObjectId) -> StoreResult<Vec<Edge>> {
        self.edge_query(
            "SELECT id, source, target, kind, confidence, access_count,
                    supporting_queries, first_seen_ts, observed_ts
             FROM edges WHERE source = ?1 ORDER BY id",
            id,
        )
    }

    /// All edges whose target is the given node.
    pub fn edges_into(&self, id: &ObjectId) -> StoreResult<Vec<Edge>> {
        self.edge_query(
            "SELECT id, source, target, kind, confidence, access_count,
                    supporting_queries, first_seen_ts, observed_ts
             FROM edges WHERE target = ?1 ORDER BY id",
            id,
        )
    }

    fn edge_query(&self, sql: &str, id: &ObjectId) -> StoreResult<Vec<Edge>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![id.as_str()], Self::edge_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Self::finish_edge).collect()
    }

    pub fn edge_count(&self) -> StoreResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(count)
    }

    fn edge_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EdgeRow> {
        Ok(EdgeRow {
            id: row.get(0)?,
            source: row.get(1)?,
            target: row.get(2)?,
            kind: row.get(3)?,
            confidence: row.get(4)?,
            access_count: row.get(5)?,
            queries_json: row.get(6)?,
            first_seen_ts: row.get(7)?,
            observed_ts: row.get(8)?,
        })
    }

    fn finish_edge(row: EdgeRow) -> StoreResult<Edge> {
        let kind = EdgeKind::from_label(&row.kind)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown edge kind label: {}", row.kind)))?;
        let supporting_queries: Vec<String> = serde_json::from_str(&row.queries_json)?;
        Ok(Edge {
            id: EdgeId(row.id),
            source: ObjectId::new(row.source),
            target: ObjectId::new(row.target),
            kind,
            confidence: row.confidence,
            access_count: row.access_count,
            supporting_queries,
            first_seen_ts: row.first_seen_ts,
            observed_ts: row.observed_ts,
        })
    }

    // =========================================================================
    // Watermark
    // =========================================================================

    /// The ingestion watermark. Zero when no batch has completed yet.
    pub fn watermark(&self) -> StoreResult<i64> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'watermark'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|s| s.parse().ok()).unwrap_or(0))
    }

    /// Persist the ingestion watermark. Called once per batch, after the
    /// batch's log entries and edges are durably recorded.
    pub fn set_watermark(&self, ts: i64) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('watermark', ?)",
            params![ts.to_string()],
        )?;
        Ok(())
    }

    // =========================================================================
    // Processing log
    // =========================================================================

    /// Append one attempt record. The log is insert-only.
    pub fn log_attempt(&self, entry: &LogEntry) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO processing_log
             (query_id, status, detail, parse_method, attempted_at, batch_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.query_id,
                entry.status.label(),
                entry.detail,
                entry.parse_method,
                entry.attempted_at,
                entry.batch_id
            ],
        )?;
        Ok(())
    }

    /// Most recent failures, newest first.
    pub fn recent_failures(&self, limit: usize) -> StoreResult<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT query_id, status, detail, parse_method, attempted_at, batch_id
             FROM processing_log WHERE status = 'FAILED'
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(query_id, status_label, detail, parse_method, attempted_at, batch_id)| {
                let status = AttemptStatus::from_label(&status_label).ok_or_else(|| {
                    StoreError::Corrupt(format!("unknown attempt status: {}", status_label))
                })?;
                Ok(LogEntry {
                    query_id,
                    status,
                    detail,
                    parse_method,
                    attempted_at,
                    batch_id,
                })
            })
            .collect()
    }

    /// Count of failed attempts on statements at or after the given feed
    /// timestamp.
    pub fn failure_count_since(&self, attempted_after: i64) -> StoreResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM processing_log
             WHERE status = 'FAILED' AND attempted_at >= ?1",
            params![attempted_after],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // =========================================================================
    // Stats
    // =========================================================================

    pub fn stats(&self) -> StoreResult<GraphStats> {
        let nodes_total = self.node_count()?;
        let edges_total = self.edge_count()?;

        let mut stmt = self
            .conn
            .prepare("SELECT object_type, COUNT(*) FROM nodes GROUP BY object_type ORDER BY object_type")?;
        let nodes_by_type = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM edges GROUP BY kind ORDER BY kind")?;
        let edges_by_kind = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        // Bands match the defaults meaningful to traversal: below the floor,
        // above it, and certain.
        let bands = [
            ("0.0-0.5", 0.0, 0.5),
            ("0.5-0.8", 0.5, 0.8),
            ("0.8-1.0", 0.8, 1.0),
        ];
        let mut confidence_histogram = Vec::with_capacity(bands.len() + 1);
        for (label, low, high) in bands {
            let count: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM edges WHERE confidence >= ?1 AND confidence < ?2",
                params![low, high],
                |row| row.get(0),
            )?;
            confidence_histogram.push((label.to_string(), count));
        }
        let exact: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE confidence >= 1.0",
            [],
            |row| row.get(0),
        )?;
        confidence_histogram.push(("1.0".to_string(), exact));

        Ok(GraphStats {
            nodes_total,
            edges_total,
            nodes_by_type,
            edges_by_kind,
            confidence_histogram,
        })
    }
}
