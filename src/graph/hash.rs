//! Deterministic identity hashing for edges.

use sha2::{Digest, Sha256};

use crate::graph::model::{EdgeId, EdgeKind, ObjectId};

/// Compute the deterministic id for an edge.
///
/// Hashes the `source|target|kind-label` encoding with SHA-256 and returns a
/// 64-character lowercase hexadecimal string. The same triple always hashes
/// to the same id, which is what lets a re-ingested statement merge into the
/// existing edge instead of duplicating it.
pub fn edge_id(source: &ObjectId, target: &ObjectId, kind: &EdgeKind) -> EdgeId {
    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(target.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(kind.label().as_bytes());
    EdgeId(format!("{:x}", hasher.finalize()))
}
