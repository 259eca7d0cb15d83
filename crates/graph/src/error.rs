//! Planning-time error types.
//!
//! Every variant here is fatal at plan time: no backend mutation may happen
//! once planning has failed.

use thiserror::Error;

use crate::node::NodeId;

/// Result type for planning operations.
pub type PlanResult<T> = std::result::Result<T, PlanError>;

/// Planning-time error types.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    /// Two nodes in the manifest share an id.
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// A dependency or input reference names a node absent from the graph.
    #[error("node '{node}' references unknown node '{target}'")]
    UnknownDependency { node: NodeId, target: NodeId },

    /// A node depends on itself.
    #[error("node '{0}' depends on itself")]
    SelfDependency(NodeId),

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected involving nodes: {nodes:?}")]
    CycleDetected { nodes: Vec<NodeId> },

    /// A node references an output that only exists in a later stage.
    ///
    /// This is the circular provider-configuration dependency that staging
    /// exists to break; if it survives staging, a human has to split the
    /// run, so it is reported rather than silently retried.
    #[error("node '{node}' in stage {node_stage} references '{target}' in later stage {target_stage}")]
    UnresolvableReference {
        node: NodeId,
        node_stage: crate::node::Stage,
        target: NodeId,
        target_stage: crate::node::Stage,
    },
}

impl PlanError {
    /// Create a duplicate node error.
    pub fn duplicate_node(id: impl Into<NodeId>) -> Self {
        Self::DuplicateNode(id.into())
    }

    /// Create an unknown dependency error.
    pub fn unknown_dependency(node: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self::UnknownDependency {
            node: node.into(),
            target: target.into(),
        }
    }

    /// Create a self-dependency error.
    pub fn self_dependency(id: impl Into<NodeId>) -> Self {
        Self::SelfDependency(id.into())
    }

    /// Create a cycle error from the nodes left unsorted.
    pub fn cycle_detected(nodes: Vec<NodeId>) -> Self {
        Self::CycleDetected { nodes }
    }
}
