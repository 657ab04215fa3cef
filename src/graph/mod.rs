//! The lineage/access graph: data model, persistence, traversal, retention.
//!
//! Nodes and edges live in stable-id SQLite tables rather than an in-memory
//! object graph, so cyclic lineage is representable and traversals bound
//! their own work with a visited set.

pub mod hash;
pub mod model;
pub mod retention;
pub mod store;
pub mod traverse;

pub use model::{
    Edge, EdgeClass, EdgeId, EdgeKind, Node, ObjectId, ObjectType, TransformationKind,
};
pub use retention::{apply_retention, RetentionPolicy, RetentionReport};
pub use store::{AttemptStatus, GraphStats, GraphStore, LogEntry, StoreError, StoreResult};
pub use traverse::{shortest_path, Direction, Subgraph, SubgraphNode, Traversal};
