//! dbt manifest import: declared model dependencies as object lineage.
//!
//! A dbt `manifest.json` states, per model, which relations it reads. Those
//! are declarations rather than inferences, so they import as object-level
//! `Lineage(Unknown)` edges at confidence 1.0: the dependency is certain,
//! the column mapping is not. Declared column lists feed the extraction
//! catalog so later wildcard queries over the same models expand.

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::extract::ObjectCatalog;
use crate::graph::model::DEFAULT_SUPPORTING_QUERIES_CAP;
use crate::graph::{
    Edge, EdgeKind, GraphStore, Node, ObjectId, ObjectType, StoreResult, TransformationKind,
};

// =============================================================================
// Manifest shapes
// =============================================================================

/// The subset of a dbt `manifest.json` the importer reads.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub nodes: HashMap<String, ManifestNode>,
}

impl Manifest {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// One entry of the manifest's `nodes` map. Only `resource_type == "model"`
/// entries are imported.
#[derive(Debug, Deserialize)]
pub struct ManifestNode {
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    /// Relation name override; the model materializes under it when set.
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub depends_on: DependsOn,
    /// Declared columns in document order.
    #[serde(default, deserialize_with = "columns_in_order")]
    pub columns: Vec<ManifestColumn>,
}

impl ManifestNode {
    /// The relation this model materializes as.
    pub fn relation_id(&self) -> ObjectId {
        let table = self.alias.as_deref().unwrap_or(&self.name);
        ObjectId::from_parts(&[
            self.database.as_deref().unwrap_or(""),
            self.schema.as_deref().unwrap_or(""),
            table,
        ])
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DependsOn {
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestColumn {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// dbt serializes columns as a JSON object keyed by name. Deserializing into
/// a map would lose document order, which positional column pairing needs,
/// so the values are collected into a Vec as they appear.
fn columns_in_order<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<ManifestColumn>, D::Error> {
    struct ColumnsVisitor;

    impl<'de> Visitor<'de> for ColumnsVisitor {
        type Value = Vec<ManifestColumn>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "a map of column definitions")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut columns = Vec::new();
            while let Some((_, column)) = map.next_entry::<String, ManifestColumn>()? {
                columns.push(column);
            }
            Ok(columns)
        }
    }

    deserializer.deserialize_map(ColumnsVisitor)
}

// =============================================================================
// Import
// =============================================================================

/// Counts from one manifest import.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ManifestReport {
    pub models: usize,
    pub edges: usize,
    pub cataloged: usize,
}

/// Import every model of a manifest: a Table node per model, a
/// `Lineage(Unknown)` edge per declared dependency, and declared column
/// lists into the catalog.
///
/// Dependency keys that name another model in the manifest resolve to that
/// model's relation; keys the manifest does not define (sources, packages
/// outside the project) keep their dbt identifier as the node id.
pub fn import_manifest(
    store: &GraphStore,
    catalog: &mut ObjectCatalog,
    manifest: &Manifest,
    observed_ts: i64,
) -> StoreResult<ManifestReport> {
    let mut report = ManifestReport::default();

    for node in manifest.nodes.values() {
        if node.resource_type != "model" {
            continue;
        }
        report.models += 1;

        let target = node.relation_id();
        store.upsert_node(&Node::new(target.clone(), ObjectType::Table, observed_ts))?;

        for dep_key in &node.depends_on.nodes {
            let source = resolve_dependency(manifest, dep_key);
            store.upsert_node(&Node::new(source.clone(), ObjectType::Table, observed_ts))?;
            let edge = Edge::new(
                source,
                target.clone(),
                EdgeKind::Lineage(TransformationKind::Unknown),
                1.0,
                observed_ts,
            );
            store.upsert_edge(&edge, DEFAULT_SUPPORTING_QUERIES_CAP)?;
            report.edges += 1;
        }

        if !node.columns.is_empty() {
            let names = node.columns.iter().map(|c| c.name.clone()).collect();
            catalog.record(target, names);
            report.cataloged += 1;
        }
    }

    log::info!(
        "manifest import: {} models, {} dependency edges, {} column lists",
        report.models,
        report.edges,
        report.cataloged
    );
    Ok(report)
}

fn resolve_dependency(manifest: &Manifest, dep_key: &str) -> ObjectId {
    match manifest.nodes.get(dep_key) {
        Some(node) => node.relation_id(),
        None => ObjectId::from_parts(&[dep_key]),
    }
}

// ============================================================================
// Tests
// ============================================================================
