//! Column dependency extraction from SQL statements.
//!
//! Given one statement that writes data, extraction derives which source
//! columns feed which target columns and how: copied, computed, aggregated,
//! or merely gating rows through predicates. Names are resolved against the
//! statement's session context, CTEs and derived tables are substituted down
//! to base-table columns, and anything unresolvable degrades to an
//! object-level UNKNOWN dependency instead of failing.
//!
//! # Design
//!
//! The extractor is syntactic: it never executes SQL or consults the
//! warehouse, and it prefers dropping a dependency over inventing one.
//! Confidence constants are configuration, not behavior: only their
//! ordering is fixed (copy > calculation >= aggregation > predicate >
//! unknown).

pub mod extractor;
pub(crate) mod scope;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::graph::model::{ObjectId, ObjectType, TransformationKind};

pub use extractor::{extract, learn_schema};

/// Errors from the extraction layer.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The statement text could not be parsed at all. Recorded in the
    /// processing log; never fatal to a batch.
    #[error("parse failure: {reason}")]
    Parse { reason: String },

    /// The text parsed but contains no statement form extraction handles.
    #[error("statement form not handled: {0}")]
    UnsupportedStatement(String),
}

pub type ExtractResult<T> = Result<T, ExtractError>;

/// Statement forms that can carry column lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementKind {
    CreateTableAsSelect,
    Insert,
    Merge,
    Update,
    CreateView,
}

impl StatementKind {
    pub fn label(&self) -> &'static str {
        match self {
            StatementKind::CreateTableAsSelect => "CREATE_TABLE_AS_SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Merge => "MERGE",
            StatementKind::Update => "UPDATE",
            StatementKind::CreateView => "CREATE_VIEW",
        }
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A statement the classifier nominated for extraction.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub statement_text: String,
    /// Session database, for qualifying bare table names.
    pub default_database: Option<String>,
    pub default_schema: Option<String>,
    /// What the feed (or the keyword sniff) declared this statement to be.
    /// Routing information only; the parsed tree decides what is extracted.
    pub declared_kind: StatementKind,
}

/// Confidence constants for the extraction rules.
///
/// Defaults follow the shipped ordering; deployments tune the values, never
/// the ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Bare column copied with no function applied.
    pub direct_copy: f64,
    /// Scalar expression over source columns.
    pub calculation: f64,
    /// Aggregate function over source columns.
    pub aggregation: f64,
    /// WHERE/HAVING/JOIN predicate participation.
    pub predicate: f64,
    /// Wildcard expanded from catalog metadata rather than the statement.
    pub wildcard_copy: f64,
    /// Wildcard with no resolvable schema: object-level UNKNOWN.
    pub wildcard_unknown: f64,
    /// Lower bound when multiplying confidence through CTE chains.
    pub chain_floor: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            direct_copy: 1.0,
            calculation: 0.9,
            aggregation: 0.9,
            predicate: 0.6,
            wildcard_copy: 0.8,
            wildcard_unknown: 0.3,
            chain_floor: 0.1,
        }
    }
}

/// Known column lists per object, fed by parsed CREATE TABLE definitions and
/// manifest imports. Consulted for wildcard expansion and for attributing
/// unqualified columns among multiple relations.
#[derive(Debug, Clone, Default)]
pub struct ObjectCatalog {
    columns: HashMap<ObjectId, Vec<String>>,
}

impl ObjectCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, object: ObjectId, columns: Vec<String>) {
        let columns = columns.into_iter().map(|c| c.to_lowercase()).collect();
        self.columns.insert(object, columns);
    }

    pub fn columns(&self, object: &ObjectId) -> Option<&[String]> {
        self.columns.get(object).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A node reference with enough typing to materialize it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRef {
    pub id: ObjectId,
    pub object_type: ObjectType,
}

/// One derived dependency, endpoints by canonical id.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEdge {
    pub source: ObjectId,
    pub target: ObjectId,
    pub kind: TransformationKind,
    pub confidence: f64,
}

/// Everything one statement yielded.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// The object the statement writes.
    pub target_object: ObjectId,
    /// All endpoints (and their parent objects), deduplicated, target first.
    pub nodes: Vec<NodeRef>,
    /// Dependencies, deduplicated by (source, target, kind) keeping the
    /// highest confidence.
    pub edges: Vec<ExtractedEdge>,
    /// Which extraction path handled the statement, for the processing log.
    pub parse_method: &'static str,
    /// Target column list worth remembering in the catalog, when the
    /// statement defined one.
    pub learned_columns: Option<(ObjectId, Vec<String>)>,
}
