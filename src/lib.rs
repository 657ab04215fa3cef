//! # Trellis
//!
//! Column-level lineage and access graphs derived from warehouse query
//! history.
//!
//! ## Architecture
//!
//! Query history flows through a classify/extract/materialize pipeline into
//! one persistent graph that also carries grant and usage facts:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Query history feed (JSONL warehouse export)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [classifier]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Lineage-bearing statements (INSERT, CTAS, MERGE,       │
//! │   UPDATE, CREATE VIEW)                                   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [extractor]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Column dependencies + transformation kinds, resolved   │
//! │   through CTEs, derived tables and wildcards             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [materializer]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Graph store (SQLite): nodes, merged edges, processing  │
//! │   log, watermark  +  access edges from grant/usage feeds │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [traversal]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Impact subgraphs, shortest paths, access reachability  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is derived: feeds are the only inputs, re-running ingestion
//! over the same history converges to the same graph, and dropping the store
//! loses no source of truth.

pub mod access;
pub mod config;
pub mod extract;
pub mod feed;
pub mod graph;
pub mod ingest;
pub mod manifest;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::access::{access_graph, AccessGraphBuilder};
    pub use crate::config::{Settings, SettingsError};
    pub use crate::extract::{
        extract, Candidate, ExtractError, Extraction, ExtractorConfig, ObjectCatalog,
        StatementKind,
    };
    pub use crate::feed::{
        GrantRow, JsonlFeed, MemoryFeed, QueryHistoryFeed, QueryHistoryRow, UsageRow,
    };
    pub use crate::graph::{
        apply_retention, shortest_path, Direction, Edge, EdgeClass, EdgeKind, GraphStore, Node,
        ObjectId, ObjectType, RetentionPolicy, StoreError, StoreResult, Subgraph,
        TransformationKind, Traversal,
    };
    pub use crate::ingest::{classify, materialize, Classification, IngestError, Pipeline};
    pub use crate::manifest::{import_manifest, Manifest};
}

// Also export the core graph types at the crate root for convenience
pub use graph::{Edge, EdgeKind, GraphStore, Node, ObjectId, ObjectType, TransformationKind};
pub use ingest::Pipeline;
