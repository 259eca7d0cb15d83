//! Apply-time error types.
//!
//! Every apply-time failure is node-scoped: it names the node id (and kind
//! where known) so a report can attribute each failure without context.

use std::time::Duration;

use thiserror::Error;

use strata_graph::{NodeId, NodeKind};

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
///
/// `Clone` so one root-cause error can appear both on the failed node and
/// in the provider-binding failures derived from it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A collaborator call failed; wraps the backend's own message.
    #[error("backend call failed for node '{node_id}' ({kind}): {reason}")]
    BackendCallFailed {
        node_id: NodeId,
        kind: NodeKind,
        reason: String,
    },

    /// A readiness wait exceeded its budget.
    #[error("timed out waiting for {resource} after {waited:?} (budget {budget:?})")]
    TimedOut {
        resource: String,
        waited: Duration,
        budget: Duration,
    },

    /// Destroy exceeded the bounded recovery window even after the forced
    /// finalizer clear.
    #[error("deletion of node '{node_id}' still stuck after {waited:?}; manual cleanup required")]
    StuckDeletion { node_id: NodeId, waited: Duration },

    /// Destroy attempted against a protect-policy node.
    #[error("node '{node_id}' has deletion policy 'protect'; refusing to destroy")]
    ProtectedResource { node_id: NodeId },

    /// An Application-stage operation ran while its provider binding had
    /// unresolved source outputs.
    #[error("provider binding '{binding}' unresolved: missing output '{missing}'")]
    BindingUnresolved { binding: String, missing: String },

    /// A fetched manifest failed or parsed to garbage; the apply fails
    /// closed rather than applying a partial document set.
    #[error("manifest from '{url}' rejected: {reason}")]
    ManifestRejected { url: String, reason: String },

    /// An input reference pointed at an output the dependency never
    /// produced.
    #[error("node '{node_id}' needs output '{output}' of '{dependency}', which is not available")]
    MissingOutput {
        node_id: NodeId,
        dependency: NodeId,
        output: String,
    },

    /// An input attribute had the wrong shape for the node's backend call.
    #[error("node '{node_id}' has invalid input: {reason}")]
    InvalidInput { node_id: NodeId, reason: String },

    /// The run was aborted before this node was launched.
    #[error("apply aborted before node '{node_id}' started")]
    Aborted { node_id: NodeId },
}

impl Error {
    /// Create a backend call failure attributed to one node.
    pub fn backend_call_failed(
        node_id: impl Into<NodeId>,
        kind: NodeKind,
        reason: impl Into<String>,
    ) -> Self {
        Self::BackendCallFailed {
            node_id: node_id.into(),
            kind,
            reason: reason.into(),
        }
    }

    /// Create a timeout error.
    pub fn timed_out(resource: impl Into<String>, waited: Duration, budget: Duration) -> Self {
        Self::TimedOut {
            resource: resource.into(),
            waited,
            budget,
        }
    }

    /// Create a stuck-deletion error.
    pub fn stuck_deletion(node_id: impl Into<NodeId>, waited: Duration) -> Self {
        Self::StuckDeletion {
            node_id: node_id.into(),
            waited,
        }
    }

    /// Create a protected-resource error.
    pub fn protected_resource(node_id: impl Into<NodeId>) -> Self {
        Self::ProtectedResource {
            node_id: node_id.into(),
        }
    }

    /// Create an unresolved-binding error.
    pub fn binding_unresolved(binding: impl Into<String>, missing: impl Into<String>) -> Self {
        Self::BindingUnresolved {
            binding: binding.into(),
            missing: missing.into(),
        }
    }

    /// Create a rejected-manifest error.
    pub fn manifest_rejected(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ManifestRejected {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing-output error.
    pub fn missing_output(
        node_id: impl Into<NodeId>,
        dependency: impl Into<NodeId>,
        output: impl Into<String>,
    ) -> Self {
        Self::MissingOutput {
            node_id: node_id.into(),
            dependency: dependency.into(),
            output: output.into(),
        }
    }

    /// Create an invalid-input error.
    pub fn invalid_input(node_id: impl Into<NodeId>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an aborted-before-launch error.
    pub fn aborted(node_id: impl Into<NodeId>) -> Self {
        Self::Aborted {
            node_id: node_id.into(),
        }
    }

    /// Whether this error is a readiness timeout (distinct exit code).
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}
