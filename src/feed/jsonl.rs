//! JSON-lines file adapters for the feeds.
//!
//! Each line is one serialized row. Files are read fully and sorted at open
//! time, which suits the export-file sizes these feeds arrive as.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::feed::{
    FeedResult, GrantRow, MemoryFeed, QueryHistoryFeed, QueryHistoryRow, UsageRow,
};

/// Query-history feed backed by a JSONL file.
pub struct JsonlFeed {
    inner: MemoryFeed,
}

impl JsonlFeed {
    pub fn open(path: impl AsRef<Path>) -> FeedResult<Self> {
        let rows: Vec<QueryHistoryRow> = read_jsonl(path)?;
        Ok(Self {
            inner: MemoryFeed::new(rows),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl QueryHistoryFeed for JsonlFeed {
    fn fetch_after(&self, watermark: i64, limit: usize) -> FeedResult<Vec<QueryHistoryRow>> {
        self.inner.fetch_after(watermark, limit)
    }

    fn fetch_range(&self, start: i64, end: i64, limit: usize) -> FeedResult<Vec<QueryHistoryRow>> {
        self.inner.fetch_range(start, end, limit)
    }
}

/// Read a grants export, one [`GrantRow`] per line.
pub fn read_grants(path: impl AsRef<Path>) -> FeedResult<Vec<GrantRow>> {
    read_jsonl(path)
}

/// Read a usage export, one [`UsageRow`] per line.
pub fn read_usage(path: impl AsRef<Path>) -> FeedResult<Vec<UsageRow>> {
    read_jsonl(path)
}

fn read_jsonl<T: DeserializeOwned>(path: impl AsRef<Path>) -> FeedResult<Vec<T>> {
    let text = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        rows.push(serde_json::from_str(line)?);
    }
    Ok(rows)
}
