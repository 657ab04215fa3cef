//! Bounded impact traversal over the stored graph.
//!
//! Walks breadth-first from a start node, upstream toward sources or
//! downstream toward derivations, visiting each node once so cycles and
//! diamond shapes terminate. Nodes come back in BFS-discovery order with
//! their hop count; the edges are everything relaxed during the walk.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::graph::model::{Edge, EdgeClass, Node, ObjectId};
use crate::graph::store::{GraphStore, StoreError, StoreResult};

/// Default confidence floor: edges below it are left out of a walk unless
/// the caller opts in to low-confidence lineage.
pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.5;

/// Default hop bound for traversals.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Which way to walk from the start node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Toward the sources the start node is derived from.
    Upstream,
    /// Toward everything derived from the start node.
    Downstream,
}

/// A visited node and the hop count at which the walk discovered it.
#[derive(Debug, Clone, Serialize)]
pub struct SubgraphNode {
    pub node: Node,
    pub depth: usize,
}

/// Result of a traversal.
#[derive(Debug, Clone, Serialize)]
pub struct Subgraph {
    pub start: ObjectId,
    pub direction: Direction,
    /// Visited nodes in BFS-discovery order, the start node first at depth 0.
    pub nodes: Vec<SubgraphNode>,
    /// Every admitted edge relaxed during the walk, deduplicated by id.
    pub edges: Vec<Edge>,
}

impl Subgraph {
    /// Ids of the visited nodes, excluding the start node.
    pub fn reached(&self) -> Vec<&ObjectId> {
        self.nodes[1..].iter().map(|sn| &sn.node.id).collect()
    }

    /// Detect dependency cycles among the subgraph's nodes via Tarjan's
    /// strongly-connected-components algorithm. Each cycle lists the ids
    /// involved; self-loops count as single-node cycles.
    pub fn cycles(&self) -> Vec<Vec<ObjectId>> {
        let mut graph: DiGraph<ObjectId, ()> = DiGraph::new();
        let mut index: HashMap<&ObjectId, NodeIndex> = HashMap::new();
        for sn in &self.nodes {
            let idx = graph.add_node(sn.node.id.clone());
            index.insert(&sn.node.id, idx);
        }
        for edge in &self.edges {
            if let (Some(&s), Some(&t)) = (index.get(&edge.source), index.get(&edge.target)) {
                graph.add_edge(s, t, ());
            }
        }

        tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.find_edge(scc[0], scc[0]).is_some())
            .map(|scc| scc.into_iter().map(|idx| graph[idx].clone()).collect())
            .collect()
    }
}

/// Builder for a bounded BFS walk.
#[derive(Debug, Clone)]
pub struct Traversal {
    start: ObjectId,
    direction: Direction,
    max_depth: usize,
    confidence_floor: f64,
    include_low_confidence: bool,
    class: EdgeClass,
}

impl Traversal {
    pub fn new(start: ObjectId, direction: Direction) -> Self {
        Self {
            start,
            direction,
            max_depth: DEFAULT_MAX_DEPTH,
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            include_low_confidence: false,
            class: EdgeClass::Lineage,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_confidence_floor(mut self, floor: f64) -> Self {
        self.confidence_floor = floor;
        self
    }

    /// Admit edges below the confidence floor.
    #[must_use]
    pub fn include_low_confidence(mut self) -> Self {
        self.include_low_confidence = true;
        self
    }

    /// Walk access edges (privilege, usage, inheritance) instead of lineage.
    #[must_use]
    pub fn with_edge_class(mut self, class: EdgeClass) -> Self {
        self.class = class;
        self
    }

    /// Run the walk against the store.
    ///
    /// Errors with [`StoreError::UnknownNode`] when the start node does not
    /// exist.
    pub fn run(&self, store: &GraphStore) -> StoreResult<Subgraph> {
        let start_node = store
            .node(&self.start)?
            .ok_or_else(|| StoreError::UnknownNode(self.start.clone()))?;

        let mut visited: HashSet<ObjectId> = HashSet::new();
        let mut seen_edges: HashSet<crate::graph::model::EdgeId> = HashSet::new();
        let mut queue: VecDeque<(ObjectId, usize)> = VecDeque::new();
        let mut nodes = vec![SubgraphNode {
            node: start_node,
            depth: 0,
        }];
        let mut edges: Vec<Edge> = Vec::new();

        visited.insert(self.start.clone());
        queue.push_back((self.start.clone(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= self.max_depth {
                continue;
            }
            let candidates = match self.direction {
                Direction::Downstream => store.edges_from(&current)?,
                Direction::Upstream => store.edges_into(&current)?,
            };
            for edge in candidates {
                if !self.admits(&edge) {
                    continue;
                }
                let neighbor = match self.direction {
                    Direction::Downstream => edge.target.clone(),
                    Direction::Upstream => edge.source.clone(),
                };
                if seen_edges.insert(edge.id.clone()) {
                    edges.push(edge);
                }
                if visited.insert(neighbor.clone()) {
                    if let Some(node) = store.node(&neighbor)? {
                        nodes.push(SubgraphNode {
                            node,
                            depth: depth + 1,
                        });
                    }
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }

        Ok(Subgraph {
            start: self.start.clone(),
            direction: self.direction,
            nodes,
            edges,
        })
    }

    fn admits(&self, edge: &Edge) -> bool {
        if edge.kind.class() != self.class {
            return false;
        }
        self.include_low_confidence || edge.confidence >= self.confidence_floor
    }
}

/// Shortest lineage path from `source` downstream to `target`, ignoring the
/// confidence floor. Returns the node ids along the path inclusive of both
/// ends, or None when `target` is unreachable within `max_hops`.
pub fn shortest_path(
    store: &GraphStore,
    source: &ObjectId,
    target: &ObjectId,
    max_hops: usize,
) -> StoreResult<Option<Vec<ObjectId>>> {
    if store.node(source)?.is_none() {
        return Err(StoreError::UnknownNode(source.clone()));
    }
    if source == target {
        return Ok(Some(vec![source.clone()]));
    }

    let mut parent: HashMap<ObjectId, ObjectId> = HashMap::new();
    let mut queue: VecDeque<(ObjectId, usize)> = VecDeque::new();
    queue.push_back((source.clone(), 0));

    while let Some((current, hops)) = queue.pop_front() {
        if hops >= max_hops {
            continue;
        }
        for edge in store.edges_from(&current)? {
            if edge.kind.class() != EdgeClass::Lineage {
                continue;
            }
            if edge.target == *source || parent.contains_key(&edge.target) {
                continue;
            }
            parent.insert(edge.target.clone(), current.clone());
            if edge.target == *target {
                let mut path = vec![target.clone()];
                let mut cursor = target;
                while let Some(prev) = parent.get(cursor) {
                    path.push(prev.clone());
                    cursor = prev;
                }
                path.reverse();
                return Ok(Some(path));
            }
            queue.push_back((edge.target.clone(), hops + 1));
        }
    }

    Ok(None)
}
