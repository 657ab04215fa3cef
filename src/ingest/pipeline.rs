//! Ingestion pipeline: cursor, batch processing, processing log.
//!
//! `process_batch` reads the persisted watermark, pulls the next slice of
//! query history, and runs classify -> extract -> materialize per row. Every
//! attempt is logged; a statement that fails to parse or to write is
//! recorded and skipped, never fatal. The watermark advances to the newest attempted
//! row's timestamp and is persisted only after the batch finishes, so a
//! crashed batch replays rather than skips - materialization is idempotent,
//! replay is safe.
//!
//! Watermark reads and writes are the one hard dependency: if the cursor
//! cannot be loaded or saved the batch fails as a whole.

use serde::Serialize;
use uuid::Uuid;

use crate::extract::{extract, learn_schema, ExtractError, ExtractorConfig, ObjectCatalog};
use crate::feed::{FeedError, QueryHistoryFeed, QueryHistoryRow};
use crate::graph::model::DEFAULT_SUPPORTING_QUERIES_CAP;
use crate::graph::store::{AttemptStatus, GraphStore, LogEntry, StoreError};
use crate::ingest::classifier::{classify, Classification};
use crate::ingest::materialize::materialize_with_cap;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Errors from the ingestion layer.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The cursor could not be loaded or saved. Fatal to the batch: without
    /// a trustworthy watermark, processing would re-skip or re-fetch.
    #[error("watermark access failed: {0}")]
    Watermark(#[source] StoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Feed(#[from] FeedError),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Counters for one processed batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub fetched: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub nodes_written: usize,
    pub edges_written: usize,
    /// Cursor position after this batch.
    pub watermark: i64,
}

/// Ingestion state snapshot for operators.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingStatus {
    pub watermark: i64,
    pub failed_last_24h: i64,
    pub recent_failures: Vec<LogEntry>,
}

/// Drives batches of query history into the graph store.
///
/// The catalog accumulates column lists learned from DDL and from CREATE
/// forms as batches run, improving wildcard expansion for later statements.
/// It lives in memory for the life of the pipeline; manifest imports can
/// preload it.
pub struct Pipeline<'a> {
    store: &'a GraphStore,
    batch_size: usize,
    extractor_config: ExtractorConfig,
    catalog: ObjectCatalog,
    supporting_queries_cap: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            extractor_config: ExtractorConfig::default(),
            catalog: ObjectCatalog::new(),
            supporting_queries_cap: DEFAULT_SUPPORTING_QUERIES_CAP,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_extractor_config(mut self, config: ExtractorConfig) -> Self {
        self.extractor_config = config;
        self
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: ObjectCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn with_supporting_queries_cap(mut self, cap: usize) -> Self {
        self.supporting_queries_cap = cap;
        self
    }

    pub fn catalog(&self) -> &ObjectCatalog {
        &self.catalog
    }

    /// Process the next batch after the persisted watermark and advance it.
    pub fn process_batch(&mut self, feed: &dyn QueryHistoryFeed) -> IngestResult<BatchReport> {
        let watermark = self.store.watermark().map_err(IngestError::Watermark)?;
        let rows = feed.fetch_after(watermark, self.batch_size)?;
        self.process_rows(rows, watermark, true)
    }

    /// Process one explicit time slice without touching the watermark, for
    /// backfills running alongside the incremental cursor.
    pub fn process_slice(
        &mut self,
        feed: &dyn QueryHistoryFeed,
        start_ts: i64,
        end_ts: i64,
    ) -> IngestResult<BatchReport> {
        let watermark = self.store.watermark().map_err(IngestError::Watermark)?;
        let rows = feed.fetch_range(start_ts, end_ts, self.batch_size)?;
        self.process_rows(rows, watermark, false)
    }

    fn process_rows(
        &mut self,
        rows: Vec<QueryHistoryRow>,
        prior_watermark: i64,
        advance: bool,
    ) -> IngestResult<BatchReport> {
        let batch_id = Uuid::new_v4().to_string();
        let mut report = BatchReport {
            batch_id: batch_id.clone(),
            fetched: rows.len(),
            processed: 0,
            failed: 0,
            skipped: 0,
            nodes_written: 0,
            edges_written: 0,
            watermark: prior_watermark,
        };

        let mut watermark = prior_watermark;
        for row in &rows {
            match classify(row) {
                Classification::NotRelevant { reason } => {
                    // A skipped row may still teach us a table's columns.
                    learn_schema(
                        &row.query_text,
                        row.database.as_deref(),
                        row.schema.as_deref(),
                        &mut self.catalog,
                    );
                    self.log(&batch_id, row, AttemptStatus::Skipped, Some(reason.to_string()), None)?;
                    report.skipped += 1;
                }
                Classification::Candidate(candidate) => {
                    match extract(&candidate, &self.catalog, &self.extractor_config) {
                        Ok(extraction) => {
                            if let Some((object, columns)) = &extraction.learned_columns {
                                self.catalog.record(object.clone(), columns.clone());
                            }
                            // A store fault on one statement's writes is that
                            // statement's failure, not the batch's. Replay
                            // after the watermark advances is safe because
                            // materialization is idempotent.
                            match materialize_with_cap(
                                self.store,
                                &extraction,
                                &row.query_id,
                                row.start_time,
                                self.supporting_queries_cap,
                            ) {
                                Ok(written) => {
                                    report.nodes_written += written.nodes_written;
                                    report.edges_written += written.edges_written;
                                    self.log(
                                        &batch_id,
                                        row,
                                        AttemptStatus::Success,
                                        None,
                                        Some(extraction.parse_method),
                                    )?;
                                    report.processed += 1;
                                }
                                Err(err) => {
                                    log::warn!(
                                        "query {} failed to materialize: {}",
                                        row.query_id,
                                        err
                                    );
                                    self.log(
                                        &batch_id,
                                        row,
                                        AttemptStatus::Failed,
                                        Some(err.to_string()),
                                        None,
                                    )?;
                                    report.failed += 1;
                                }
                            }
                        }
                        Err(ExtractError::Parse { reason }) => {
                            log::warn!("query {} failed to parse: {}", row.query_id, reason);
                            self.log(&batch_id, row, AttemptStatus::Failed, Some(reason), None)?;
                            report.failed += 1;
                        }
                        Err(ExtractError::UnsupportedStatement(found)) => {
                            learn_schema(
                                &row.query_text,
                                row.database.as_deref(),
                                row.schema.as_deref(),
                                &mut self.catalog,
                            );
                            let detail = format!(
                                "declared {} but found {}",
                                candidate.declared_kind, found
                            );
                            self.log(&batch_id, row, AttemptStatus::Skipped, Some(detail), None)?;
                            report.skipped += 1;
                        }
                    }
                }
            }
            watermark = watermark.max(row.start_time);
        }

        if advance && watermark > prior_watermark {
            self.store
                .set_watermark(watermark)
                .map_err(IngestError::Watermark)?;
        }
        report.watermark = watermark;
        log::info!(
            "batch {}: {} fetched, {} processed, {} failed, {} skipped, watermark {}",
            report.batch_id,
            report.fetched,
            report.processed,
            report.failed,
            report.skipped,
            report.watermark
        );
        Ok(report)
    }

    fn log(
        &self,
        batch_id: &str,
        row: &QueryHistoryRow,
        status: AttemptStatus,
        detail: Option<String>,
        parse_method: Option<&str>,
    ) -> IngestResult<()> {
        let entry = LogEntry {
            query_id: row.query_id.clone(),
            status,
            detail,
            parse_method: parse_method.map(str::to_string),
            attempted_at: row.start_time,
            batch_id: batch_id.to_string(),
        };
        self.store.log_attempt(&entry)?;
        Ok(())
    }
}

/// Cursor position plus recent failures, for a status command or endpoint.
pub fn processing_status(store: &GraphStore, now_ts: i64) -> IngestResult<ProcessingStatus> {
    let watermark = store.watermark()?;
    let since = now_ts - 24 * 60 * 60 * 1000;
    Ok(ProcessingStatus {
        watermark,
        failed_last_24h: store.failure_count_since(since)?,
        recent_failures: store.recent_failures(10)?,
    })
}

// ============================================================================
// Tests
// ============================================================================
