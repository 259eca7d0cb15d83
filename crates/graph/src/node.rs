//! Typed resource nodes: the unit of desired state.
//!
//! A [`ResourceNode`] is pure declaration - ids, kind, stage, dependencies
//! and inputs. Observed outputs and live status belong to the reconciler's
//! state store, never to the node itself.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable node identifier, unique within a graph.
///
/// Ordering is lexicographic; the planner uses it as the deterministic
/// tie-break for topological sorting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new node id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// View the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Which apply phase owns a node.
///
/// Infrastructure-stage nodes must all reach a terminal state before any
/// Application-stage node starts, because Application-stage backends are
/// configured from Infrastructure-stage outputs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    #[default]
    Infrastructure,
    Application,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infrastructure => f.write_str("infrastructure"),
            Self::Application => f.write_str("application"),
        }
    }
}

/// Which external collaborator serves a node's CRUD calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendClass {
    /// Cloud resource API (networks, databases, clusters, identities).
    Cloud,
    /// Cluster workload API, scoped by a resolved cluster connection.
    Cluster,
    /// Relational grant interface, scoped by a resolved database connection.
    Grant,
}

/// What happens to a node on destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeletionPolicy {
    /// Destroy fails fast, the backend delete API is never called.
    Protect,
    /// Ordinary backend delete plus disappearance polling.
    #[default]
    Standard,
    /// Dropped from tracked state without any backend call. Used for
    /// associations whose owning service deletes unreliably enough that
    /// out-of-band cleanup is safer than automation.
    Abandon,
}

/// Live status of a node within an apply pass.
///
/// Transitions: Planned -> Creating -> Ready -> {Updating -> Ready |
/// Destroying -> Destroyed | Destroying -> Failed}. Failed is terminal for
/// the pass; a later pass starts the node over at Planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStatus {
    #[default]
    Planned,
    Creating,
    Ready,
    Updating,
    Destroying,
    Destroyed,
    Failed,
}

impl NodeStatus {
    /// Whether this status ends the node's participation in the pass.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Destroyed | Self::Failed)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planned => "planned",
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Updating => "updating",
            Self::Destroying => "destroying",
            Self::Destroyed => "destroyed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The kind of backend resource a node declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Network,
    Subnet,
    PeeringRange,
    PeeringConnection,
    DatabaseInstance,
    Database,
    DatabaseUser,
    DatabaseGrant,
    Cluster,
    ServiceIdentity,
    IdentityBinding,
    Namespace,
    WorkloadServiceAccount,
    CustomResourceDefinition,
    OperatorDeployment,
    Secret,
    WorkloadInstance,
    NetworkPolicyConfig,
    Certificate,
    Ingress,
}

impl NodeKind {
    /// The collaborator class that serves this kind.
    #[must_use]
    pub fn backend_class(self) -> BackendClass {
        match self {
            Self::Network
            | Self::Subnet
            | Self::PeeringRange
            | Self::PeeringConnection
            | Self::DatabaseInstance
            | Self::Database
            | Self::DatabaseUser
            | Self::Cluster
            | Self::ServiceIdentity
            | Self::IdentityBinding => BackendClass::Cloud,
            Self::DatabaseGrant => BackendClass::Grant,
            Self::Namespace
            | Self::WorkloadServiceAccount
            | Self::CustomResourceDefinition
            | Self::OperatorDeployment
            | Self::Secret
            | Self::WorkloadInstance
            | Self::NetworkPolicyConfig
            | Self::Certificate
            | Self::Ingress => BackendClass::Cluster,
        }
    }

    /// The stage a node of this kind belongs to unless the manifest says
    /// otherwise. Everything served by a binding-scoped backend defaults to
    /// Application, since its client cannot exist before stage one runs.
    #[must_use]
    pub fn default_stage(self) -> Stage {
        match self.backend_class() {
            BackendClass::Cloud => Stage::Infrastructure,
            BackendClass::Cluster | BackendClass::Grant => Stage::Application,
        }
    }

    /// Kinds whose create must be followed by a readiness wait before
    /// dependents may observe their outputs.
    #[must_use]
    pub fn needs_readiness_wait(self) -> bool {
        matches!(
            self,
            Self::Cluster | Self::CustomResourceDefinition | Self::Certificate
        )
    }

    /// Kinds whose backend is known to accept deletes it never finishes
    /// (dangling finalizers on dependent objects). These get the bounded
    /// stuck-deletion recovery ladder on destroy.
    #[must_use]
    pub fn deletion_sticks(self) -> bool {
        matches!(self, Self::Namespace)
    }

    /// Kinds whose spec documents are fetched from a versioned manifest URL
    /// before the create call.
    #[must_use]
    pub fn fetches_manifest(self) -> bool {
        matches!(self, Self::CustomResourceDefinition | Self::OperatorDeployment)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::PeeringRange => "peering-range",
            Self::PeeringConnection => "peering-connection",
            Self::DatabaseInstance => "database-instance",
            Self::Database => "database",
            Self::DatabaseUser => "database-user",
            Self::DatabaseGrant => "database-grant",
            Self::Cluster => "cluster",
            Self::ServiceIdentity => "service-identity",
            Self::IdentityBinding => "identity-binding",
            Self::Namespace => "namespace",
            Self::WorkloadServiceAccount => "workload-service-account",
            Self::CustomResourceDefinition => "custom-resource-definition",
            Self::OperatorDeployment => "operator-deployment",
            Self::Secret => "secret",
            Self::WorkloadInstance => "workload-instance",
            Self::NetworkPolicyConfig => "network-policy-config",
            Self::Certificate => "certificate",
            Self::Ingress => "ingress",
        };
        f.write_str(s)
    }
}

/// An input attribute value: either a literal or a reference to another
/// node's output attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    /// Reference to `output` on `node`, resolved at execute time from the
    /// state snapshot.
    Ref {
        #[serde(rename = "ref")]
        node: NodeId,
        output: String,
    },
    /// A literal value passed through to the backend spec.
    Literal(serde_json::Value),
}

impl InputValue {
    /// Create a literal input.
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Create a reference input.
    pub fn reference(node: impl Into<NodeId>, output: impl Into<String>) -> Self {
        Self::Ref {
            node: node.into(),
            output: output.into(),
        }
    }

    /// The node this input references, if it is a reference.
    #[must_use]
    pub fn referenced_node(&self) -> Option<&NodeId> {
        match self {
            Self::Ref { node, .. } => Some(node),
            Self::Literal(_) => None,
        }
    }
}

/// A unit of desired state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Stable identifier, unique within the graph.
    pub id: NodeId,
    /// Backend resource kind.
    pub kind: NodeKind,
    /// Which apply phase owns this node.
    pub stage: Stage,
    /// Explicit ordering dependencies; references in `inputs` add implicit
    /// edges on top of these.
    #[serde(default)]
    pub depends_on: BTreeSet<NodeId>,
    /// Attribute name to value or output reference.
    #[serde(default)]
    pub inputs: BTreeMap<String, InputValue>,
    /// What destroy does with this node.
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

impl ResourceNode {
    /// Create a node with the kind's default stage and policies.
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            stage: kind.default_stage(),
            depends_on: BTreeSet::new(),
            inputs: BTreeMap::new(),
            deletion_policy: DeletionPolicy::default(),
        }
    }

    /// Override the owning stage.
    #[must_use]
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// Add an explicit dependency.
    #[must_use]
    pub fn with_dependency(mut self, id: impl Into<NodeId>) -> Self {
        self.depends_on.insert(id.into());
        self
    }

    /// Add a literal input attribute.
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.inputs.insert(name.into(), InputValue::literal(value));
        self
    }

    /// Add an input referencing another node's output.
    #[must_use]
    pub fn with_input_ref(
        mut self,
        name: impl Into<String>,
        node: impl Into<NodeId>,
        output: impl Into<String>,
    ) -> Self {
        self.inputs
            .insert(name.into(), InputValue::reference(node, output));
        self
    }

    /// Override the deletion policy.
    #[must_use]
    pub fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = policy;
        self
    }

    /// All nodes this one references: explicit dependencies plus input refs.
    pub fn referenced_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.depends_on
            .iter()
            .chain(self.inputs.values().filter_map(InputValue::referenced_node))
    }
}
