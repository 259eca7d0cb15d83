//! External collaborator traits.
//!
//! The orchestrator core never speaks a wire protocol; it consumes four
//! collaborator classes through these seams. Tests substitute counting
//! fakes; production front-ends plug in real clients.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use strata_graph::{NodeId, NodeKind};

use crate::binding::{ClusterConnection, DatabaseConnection};

/// Resolved attribute map sent to a backend create/update call.
pub type Spec = BTreeMap<String, serde_json::Value>;

/// Output attributes returned by a backend.
pub type Outputs = BTreeMap<String, serde_json::Value>;

/// Opaque collaborator failure; the executor wraps it with node attribution.
#[derive(Debug, Clone)]
pub struct BackendError(String);

impl BackendError {
    /// Create a backend error from any message.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for BackendError {}

/// Result alias for collaborator calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Lifecycle phase a backend reports for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePhase {
    /// Create accepted, not yet usable.
    Provisioning,
    /// Usable; outputs are final.
    Ready,
    /// Delete accepted, still present.
    Terminating,
    /// Not present (deleted, or never created).
    Gone,
}

/// Point-in-time view of a backend resource.
///
/// Backends are eventually consistent: a `get` immediately after `create`
/// may be stale, which is why readiness is polled rather than assumed.
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub phase: ResourcePhase,
    pub outputs: Outputs,
}

impl ResourceState {
    /// Convenience constructor for a phase with no outputs.
    #[must_use]
    pub fn phase(phase: ResourcePhase) -> Self {
        Self {
            phase,
            outputs: Outputs::new(),
        }
    }
}

/// Cloud resource API: networks, subnets, peerings, database instances,
/// managed clusters, identities and their bindings.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Create a resource; returns the outputs the backend assigned.
    async fn create(&self, kind: NodeKind, id: &NodeId, spec: &Spec) -> BackendResult<Outputs>;

    /// Update a resource in place.
    async fn update(&self, kind: NodeKind, id: &NodeId, spec: &Spec) -> BackendResult<Outputs>;

    /// Read current state. Side-effect free.
    async fn get(&self, kind: NodeKind, id: &NodeId) -> BackendResult<ResourceState>;

    /// Ask the backend to delete; completion is observed via `get`.
    async fn delete(&self, kind: NodeKind, id: &NodeId) -> BackendResult<()>;
}

/// Cluster workload API, scoped by a resolved cluster connection.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn create(
        &self,
        conn: &ClusterConnection,
        kind: NodeKind,
        id: &NodeId,
        spec: &Spec,
    ) -> BackendResult<Outputs>;

    async fn update(
        &self,
        conn: &ClusterConnection,
        kind: NodeKind,
        id: &NodeId,
        spec: &Spec,
    ) -> BackendResult<Outputs>;

    /// Read current state. Side-effect free.
    async fn get(
        &self,
        conn: &ClusterConnection,
        kind: NodeKind,
        id: &NodeId,
    ) -> BackendResult<ResourceState>;

    async fn delete(
        &self,
        conn: &ClusterConnection,
        kind: NodeKind,
        id: &NodeId,
    ) -> BackendResult<()>;

    /// Low-level patch clearing the blocking finalizer list of a resource
    /// stuck in Terminating. Only the stuck-deletion recovery ladder calls
    /// this, and at most once per destroy.
    async fn clear_finalizers(
        &self,
        conn: &ClusterConnection,
        kind: NodeKind,
        id: &NodeId,
    ) -> BackendResult<()>;
}

/// Relational grant interface. Assumes the target object exists and the
/// principal identity is already provisioned.
#[async_trait]
pub trait GrantApi: Send + Sync {
    async fn grant(
        &self,
        conn: &DatabaseConnection,
        principal: &str,
        target: &str,
        privilege: &str,
    ) -> BackendResult<()>;

    async fn revoke(
        &self,
        conn: &DatabaseConnection,
        principal: &str,
        target: &str,
        privilege: &str,
    ) -> BackendResult<()>;
}

/// One document of a fetched manifest set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestDoc {
    pub kind: String,
    pub name: String,
    pub body: serde_json::Value,
}

/// Remote manifest fetch for versioned CRD / operator documents.
///
/// Implementations must return an error for unreachable URLs *and* for
/// unparsable payloads; the executor fails closed on either, never applying
/// a partial document set.
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> BackendResult<Vec<ManifestDoc>>;
}

/// The four collaborator classes bundled for the executor.
#[derive(Clone)]
pub struct Backends {
    pub cloud: Arc<dyn CloudApi>,
    pub cluster: Arc<dyn ClusterApi>,
    pub grants: Arc<dyn GrantApi>,
    pub manifests: Arc<dyn ManifestFetcher>,
}
