//! Resource dependency graph wrapping petgraph's `DiGraph`.
//!
//! Edges point from a dependency to its dependent, so topological order is
//! apply order. Edges come from two places: explicit `depends_on` entries
//! and references embedded in node inputs.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::error::{PlanError, PlanResult};
use crate::node::{NodeId, ResourceNode};

/// Why an edge exists between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// Listed in the node's `depends_on` set.
    Declared,
    /// Implied by an input referencing the other node's output.
    OutputRef,
}

/// Validated resource dependency graph.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    /// The underlying directed graph; weights are node ids.
    graph: DiGraph<NodeId, DependencyKind>,
    /// Map from NodeId to NodeIndex for O(1) lookups.
    node_map: HashMap<NodeId, NodeIndex>,
    /// The declared nodes themselves.
    nodes: HashMap<NodeId, ResourceNode>,
}

impl ResourceGraph {
    /// Build a graph from a set of declared nodes.
    ///
    /// # Errors
    ///
    /// - [`PlanError::DuplicateNode`] when two nodes share an id
    /// - [`PlanError::SelfDependency`] when a node references itself
    /// - [`PlanError::UnknownDependency`] when a `depends_on` entry or
    ///   input ref names a node absent from the set (including nodes the
    ///   manifest disabled)
    pub fn from_nodes(declared: Vec<ResourceNode>) -> PlanResult<Self> {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();
        let mut nodes = HashMap::new();

        for node in declared {
            if nodes.contains_key(&node.id) {
                return Err(PlanError::duplicate_node(node.id));
            }
            let index = graph.add_node(node.id.clone());
            node_map.insert(node.id.clone(), index);
            nodes.insert(node.id.clone(), node);
        }

        // depends_on edges first, then input-ref edges; duplicates between
        // the two sources collapse to the Declared edge.
        for node in nodes.values() {
            let to = node_map
                .get(&node.id)
                .copied()
                .ok_or_else(|| PlanError::unknown_dependency(node.id.clone(), node.id.clone()))?;

            for target in &node.depends_on {
                if *target == node.id {
                    return Err(PlanError::self_dependency(node.id.clone()));
                }
                let from = node_map.get(target).copied().ok_or_else(|| {
                    PlanError::unknown_dependency(node.id.clone(), target.clone())
                })?;
                graph.update_edge(from, to, DependencyKind::Declared);
            }

            for target in node.inputs.values().filter_map(|v| v.referenced_node()) {
                if *target == node.id {
                    return Err(PlanError::self_dependency(node.id.clone()));
                }
                let from = node_map.get(target).copied().ok_or_else(|| {
                    PlanError::unknown_dependency(node.id.clone(), target.clone())
                })?;
                if graph.find_edge(from, to).is_none() {
                    graph.add_edge(from, to, DependencyKind::OutputRef);
                }
            }
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Resource graph built"
        );

        Ok(Self {
            graph,
            node_map,
            nodes,
        })
    }

    /// Get a declared node by id.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    /// Iterate over all declared nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    /// Ids of the nodes this node waits on.
    pub fn dependencies(&self, id: &NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Ids of the nodes waiting on this node.
    pub fn dependents(&self, id: &NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub(crate) fn index_of(&self, id: &NodeId) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    pub(crate) fn inner(&self) -> &DiGraph<NodeId, DependencyKind> {
        &self.graph
    }

    fn neighbors(&self, id: &NodeId, direction: Direction) -> Vec<NodeId> {
        let Some(index) = self.node_map.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<NodeId> = self
            .graph
            .neighbors_directed(*index, direction)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect();
        ids.sort();
        ids
    }
}
