//! Access-graph construction from grant and usage feeds.
//!
//! Grants and usage facts land in the same store as lineage, as a second edge
//! family (`EdgeClass::Access`): roles hold privileges on objects, roles
//! inherit roles, users touch objects under a role. Because both families
//! share node identifiers, one traversal scoped to access kinds answers "who
//! can reach this table" the same way a lineage walk answers "what feeds it".
//!
//! # Design
//!
//! Grant and usage rows are declarative facts, so every access edge carries
//! confidence 1.0 and merges through the same deterministic-id upsert as
//! lineage. Usage edges additionally count observations: re-applying a usage
//! row bumps `access_count` instead of creating a duplicate edge.

use crate::feed::{GrantRow, UsageRow};
use crate::graph::model::DEFAULT_SUPPORTING_QUERIES_CAP;
use crate::graph::{
    Direction, Edge, EdgeClass, EdgeKind, GraphStore, Node, ObjectId, ObjectType, StoreError,
    StoreResult, Subgraph, Traversal,
};

// =============================================================================
// Builder
// =============================================================================

/// Writes grant and usage facts into the graph store.
pub struct AccessGraphBuilder<'a> {
    store: &'a GraphStore,
}

impl<'a> AccessGraphBuilder<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// Apply one grant fact.
    ///
    /// Object privileges become a role→object `Privilege(<privilege>)` edge.
    /// Grants of roles (`granted_on == "ROLE"`) become a grantee→granted
    /// `Inherits` edge, so a downstream walk from a role crosses into
    /// everything its granted roles can reach.
    pub fn apply_grant(&self, row: &GrantRow) -> StoreResult<()> {
        let ts = row.granted_at;
        let grantee = ObjectId::from_parts(&[row.role_name.as_str()]);
        self.store
            .upsert_node(&Node::new(grantee.clone(), ObjectType::Role, ts))?;

        if row.granted_on.eq_ignore_ascii_case("ROLE") {
            let granted = ObjectId::from_parts(&[row.object_name.as_str()]);
            self.store
                .upsert_node(&Node::new(granted.clone(), ObjectType::Role, ts))?;
            let edge = Edge::new(grantee, granted, EdgeKind::Inherits, 1.0, ts);
            return self.store.upsert_edge(&edge, DEFAULT_SUPPORTING_QUERIES_CAP);
        }

        let object = ObjectId::from_parts(&[row.object_name.as_str()]);
        self.store.upsert_node(&Node::new(
            object.clone(),
            object_type_for(&row.granted_on),
            ts,
        ))?;
        let edge = Edge::new(
            grantee,
            object,
            EdgeKind::privilege(&row.privilege),
            1.0,
            ts,
        );
        self.store.upsert_edge(&edge, DEFAULT_SUPPORTING_QUERIES_CAP)
    }

    /// Apply one usage fact.
    ///
    /// The edge runs actor→object, where the actor is the user, or the role
    /// itself for feeds that only report roles. Rows naming a column target
    /// the column node under the object. Each application counts one access
    /// on the merged edge.
    pub fn apply_usage(&self, row: &UsageRow) -> StoreResult<()> {
        let ts = row.accessed_at;
        let (actor, actor_type) = match &row.user_name {
            Some(user) => (ObjectId::from_parts(&[user.as_str()]), ObjectType::User),
            None => (
                ObjectId::from_parts(&[row.role_name.as_str()]),
                ObjectType::Role,
            ),
        };
        self.store
            .upsert_node(&Node::new(actor.clone(), actor_type, ts))?;

        let object = ObjectId::from_parts(&[row.object_name.as_str()]);
        let object_type = row
            .object_domain
            .as_deref()
            .map(object_type_for)
            .unwrap_or(ObjectType::Table);
        self.store
            .upsert_node(&Node::new(object.clone(), object_type, ts))?;

        let target = match &row.column_name {
            Some(column) => {
                let column_id = object.column(column);
                self.store
                    .upsert_node(&Node::new(column_id.clone(), ObjectType::Column, ts))?;
                column_id
            }
            None => object,
        };

        let edge = Edge::new(actor, target, EdgeKind::usage(&row.role_name), 1.0, ts)
            .with_access();
        self.store.upsert_edge(&edge, DEFAULT_SUPPORTING_QUERIES_CAP)
    }

    /// Apply a batch of grant facts, returning how many were written.
    pub fn apply_grants(&self, rows: &[GrantRow]) -> StoreResult<usize> {
        for row in rows {
            self.apply_grant(row)?;
        }
        Ok(rows.len())
    }

    /// Apply a batch of usage facts, returning how many were written.
    pub fn apply_usages(&self, rows: &[UsageRow]) -> StoreResult<usize> {
        for row in rows {
            self.apply_usage(row)?;
        }
        Ok(rows.len())
    }
}

/// Map a feed's securable kind onto a node type. Unrecognized kinds are
/// treated as tables.
fn object_type_for(granted_on: &str) -> ObjectType {
    match granted_on.to_uppercase().as_str() {
        "DATABASE" => ObjectType::Database,
        "SCHEMA" => ObjectType::Schema,
        "VIEW" => ObjectType::View,
        "MATERIALIZED VIEW" | "MATERIALIZED_VIEW" => ObjectType::MaterializedView,
        "ROLE" => ObjectType::Role,
        _ => ObjectType::Table,
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Walk the access neighborhood of a role, user or object.
///
/// Starting from a role or user the walk runs DOWNSTREAM over privilege,
/// usage and inheritance edges: everything the principal can reach. Starting
/// from an object it runs UPSTREAM: every principal that can reach it.
pub fn access_graph(store: &GraphStore, name: &str, depth: usize) -> StoreResult<Subgraph> {
    let start = ObjectId::from_parts(&[name]);
    let node = store
        .node(&start)?
        .ok_or_else(|| StoreError::UnknownNode(start.clone()))?;

    let direction = match node.object_type {
        ObjectType::Role | ObjectType::User => Direction::Downstream,
        _ => Direction::Upstream,
    };

    Traversal::new(start, direction)
        .with_max_depth(depth)
        .with_edge_class(EdgeClass::Access)
        .run(store)
}

// ============================================================================
// Tests
// ============================================================================
