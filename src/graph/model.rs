//! Core graph data model: nodes, edges, and their identities.
//!
//! Every node is addressed by a canonical [`ObjectId`] and every edge by a
//! deterministic [`EdgeId`] derived from (source, target, kind). Re-deriving
//! the same fact from history therefore lands on the same row, which is what
//! makes ingestion idempotent.

use serde::{Deserialize, Serialize};

use crate::graph::hash;

/// Default cap on the supporting-query set carried by an edge.
pub const DEFAULT_SUPPORTING_QUERIES_CAP: usize = 8;

// =============================================================================
// Identifiers
// =============================================================================

/// Canonical identifier for a graph node.
///
/// Objects and columns use the dotted path `database.schema.object[.column]`;
/// roles and users use their bare name. Identifier parts are normalized to
/// lowercase so the same object observed through different casings maps to a
/// single node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wrap an already-canonical identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an identifier from name parts, lowercasing each and skipping
    /// empty segments.
    pub fn from_parts(parts: &[&str]) -> Self {
        let joined = parts
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.to_lowercase())
            .collect::<Vec<_>>()
            .join(".");
        Self(joined)
    }

    /// Append a column segment to an object identifier.
    pub fn column(&self, column: &str) -> Self {
        Self(format!("{}.{}", self.0, column.to_lowercase()))
    }

    /// The identifier one segment up (a column's object, an object's schema).
    /// Returns None for single-segment identifiers such as role names.
    pub fn parent(&self) -> Option<Self> {
        self.0.rsplit_once('.').map(|(head, _)| Self(head.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic edge identifier: hex SHA-256 of (source, target, kind label).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub(crate) String);

impl EdgeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Kinds
// =============================================================================

/// What a graph node denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    Database,
    Schema,
    Table,
    View,
    MaterializedView,
    Column,
    Role,
    User,
}

impl ObjectType {
    /// Stable storage label.
    pub fn label(&self) -> &'static str {
        match self {
            ObjectType::Database => "DATABASE",
            ObjectType::Schema => "SCHEMA",
            ObjectType::Table => "TABLE",
            ObjectType::View => "VIEW",
            ObjectType::MaterializedView => "MATERIALIZED_VIEW",
            ObjectType::Column => "COLUMN",
            ObjectType::Role => "ROLE",
            ObjectType::User => "USER",
        }
    }

    /// Parse a storage label. Returns None for unknown labels.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "DATABASE" => Some(ObjectType::Database),
            "SCHEMA" => Some(ObjectType::Schema),
            "TABLE" => Some(ObjectType::Table),
            "VIEW" => Some(ObjectType::View),
            "MATERIALIZED_VIEW" => Some(ObjectType::MaterializedView),
            "COLUMN" => Some(ObjectType::Column),
            "ROLE" => Some(ObjectType::Role),
            "USER" => Some(ObjectType::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// How a lineage edge's target was produced from its source.
///
/// Closed set: parse results that fit none of the specific kinds degrade to
/// `Unknown` rather than growing the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformationKind {
    /// Column copied as-is, no function applied.
    DirectCopy,
    /// Scalar expression over one or more source columns.
    Calculation,
    /// Aggregate function over the source column.
    Aggregation,
    /// Source column gates rows via WHERE/HAVING.
    Filter,
    /// Source column participates in a join predicate.
    Join,
    /// Dependency observed but its shape could not be determined.
    Unknown,
}

impl TransformationKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransformationKind::DirectCopy => "DIRECT_COPY",
            TransformationKind::Calculation => "CALCULATION",
            TransformationKind::Aggregation => "AGGREGATION",
            TransformationKind::Filter => "FILTER",
            TransformationKind::Join => "JOIN",
            TransformationKind::Unknown => "UNKNOWN",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "DIRECT_COPY" => Some(TransformationKind::DirectCopy),
            "CALCULATION" => Some(TransformationKind::Calculation),
            "AGGREGATION" => Some(TransformationKind::Aggregation),
            "FILTER" => Some(TransformationKind::Filter),
            "JOIN" => Some(TransformationKind::Join),
            "UNKNOWN" => Some(TransformationKind::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransformationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Broad family of edges, used to scope traversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeClass {
    /// Data-flow edges derived from SQL statements or declared artifacts.
    Lineage,
    /// Privilege, usage and role-inheritance edges.
    Access,
}

/// The relationship an edge records.
///
/// The privilege and role qualifiers are part of edge identity: a role
/// holding both SELECT and INSERT on a table owns two edges, and usage by
/// two different roles of the same object stays two edges. The label form is
/// what gets hashed and stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Data flows from source column/object into target column/object.
    Lineage(TransformationKind),
    /// Role holds the named privilege on the target object.
    Privilege(String),
    /// User (or role) has read the target object, attributed to a role.
    Usage { role: String },
    /// Source role inherits the target role's privileges.
    Inherits,
}

impl EdgeKind {
    pub fn privilege(name: impl Into<String>) -> Self {
        EdgeKind::Privilege(name.into().to_uppercase())
    }

    pub fn usage(role: impl Into<String>) -> Self {
        EdgeKind::Usage {
            role: role.into().to_lowercase(),
        }
    }

    /// Stable label, used for both hashing and storage.
    pub fn label(&self) -> String {
        match self {
            EdgeKind::Lineage(kind) => format!("LINEAGE:{}", kind.label()),
            EdgeKind::Privilege(privilege) => format!("PRIVILEGE:{}", privilege),
            EdgeKind::Usage { role } => format!("USAGE:{}", role),
            EdgeKind::Inherits => "INHERITS".to_string(),
        }
    }

    /// Parse a storage label. Returns None for unknown labels.
    pub fn from_label(label: &str) -> Option<Self> {
        if label == "INHERITS" {
            return Some(EdgeKind::Inherits);
        }
        if let Some(rest) = label.strip_prefix("LINEAGE:") {
            return TransformationKind::from_label(rest).map(EdgeKind::Lineage);
        }
        if let Some(rest) = label.strip_prefix("PRIVILEGE:") {
            return Some(EdgeKind::Privilege(rest.to_string()));
        }
        if let Some(rest) = label.strip_prefix("USAGE:") {
            return Some(EdgeKind::Usage {
                role: rest.to_string(),
            });
        }
        None
    }

    pub fn class(&self) -> EdgeClass {
        match self {
            EdgeKind::Lineage(_) => EdgeClass::Lineage,
            EdgeKind::Privilege(_) | EdgeKind::Usage { .. } | EdgeKind::Inherits => {
                EdgeClass::Access
            }
        }
    }

    /// The transformation behind a lineage edge, if this is one.
    pub fn transformation(&self) -> Option<TransformationKind> {
        match self {
            EdgeKind::Lineage(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Serialize for EdgeKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for EdgeKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        EdgeKind::from_label(&label).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown edge kind label: {}", label))
        })
    }
}

// =============================================================================
// Records
// =============================================================================

/// A node in the graph: a warehouse object, column, role or user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: ObjectId,
    pub object_type: ObjectType,
    /// When the node was first derived from a feed, feed time.
    pub first_seen_ts: i64,
    /// Most recent feed observation. Never decreases.
    pub last_seen_ts: i64,
}

impl Node {
    pub fn new(id: ObjectId, object_type: ObjectType, observed_ts: i64) -> Self {
        Self {
            id,
            object_type,
            first_seen_ts: observed_ts,
            last_seen_ts: observed_ts,
        }
    }

    /// Widen the seen-window to cover another observation.
    pub fn observe(&mut self, ts: i64) {
        self.first_seen_ts = self.first_seen_ts.min(ts);
        self.last_seen_ts = self.last_seen_ts.max(ts);
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: ObjectId,
    pub target: ObjectId,
    pub kind: EdgeKind,
    /// Extraction confidence in [0.0, 1.0]. Merges keep the historical max.
    pub confidence: f64,
    /// Observation count for usage edges; 0 for other kinds.
    pub access_count: i64,
    /// Query ids that evidenced this edge, bounded, oldest dropped first.
    pub supporting_queries: Vec<String>,
    pub first_seen_ts: i64,
    /// Most recent observation. Never decreases.
    pub observed_ts: i64,
}

impl Edge {
    /// Build an edge observation. The id is fully determined by
    /// (source, target, kind).
    pub fn new(
        source: ObjectId,
        target: ObjectId,
        kind: EdgeKind,
        confidence: f64,
        observed_ts: i64,
    ) -> Self {
        let id = hash::edge_id(&source, &target, &kind);
        Self {
            id,
            source,
            target,
            kind,
            confidence,
            access_count: 0,
            supporting_queries: Vec::new(),
            first_seen_ts: observed_ts,
            observed_ts,
        }
    }

    /// Attach a supporting query id to a fresh observation.
    #[must_use]
    pub fn with_query(mut self, query_id: impl Into<String>) -> Self {
        self.supporting_queries.push(query_id.into());
        self
    }

    /// Mark this observation as one access (usage edges).
    #[must_use]
    pub fn with_access(mut self) -> Self {
        self.access_count = 1;
        self
    }

    /// Fold a re-observation of the same edge into this record.
    ///
    /// Confidence keeps its historical maximum, access counts add, the
    /// supporting-query set grows up to `cap` entries with duplicates
    /// skipped and the oldest dropped, and the seen-window widens. Applying
    /// the same (query, observation) twice is a no-op past the first
    /// application, except that usage observations always count.
    pub fn absorb(&mut self, other: &Edge, cap: usize) {
        debug_assert_eq!(self.id, other.id);
        if other.confidence > self.confidence {
            self.confidence = other.confidence;
        }
        self.access_count += other.access_count;
        for query_id in &other.supporting_queries {
            if !self.supporting_queries.iter().any(|have| have == query_id) {
                self.supporting_queries.push(query_id.clone());
            }
        }
        while self.supporting_queries.len() > cap {
            self.supporting_queries.remove(0);
        }
        self.first_seen_ts = self.first_seen_ts.min(other.first_seen_ts);
        self.observed_ts = self.observed_ts.max(other.observed_ts);
    }
}
