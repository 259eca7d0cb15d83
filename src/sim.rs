//! Local simulation backends.
//!
//! Real provider plugins are integrated through the `strata-reconciler`
//! backend traits and live outside this binary. These simulated backends
//! give `apply`/`destroy` a deterministic local realization: resources
//! "exist" in process memory, become Ready immediately and emit placeholder
//! outputs shaped like their real counterparts (cluster endpoint, database
//! connection name). That is enough to exercise a manifest end to end -
//! staging, bindings, grants, teardown - without touching a provider.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use strata_graph::{NodeId, NodeKind};
use strata_reconciler::{
    BackendResult, Backends, CloudApi, ClusterApi, ClusterConnection, DatabaseConnection,
    GrantApi, ManifestDoc, ManifestFetcher, Outputs, ResourcePhase, ResourceState, Spec,
};

fn simulated_outputs(kind: NodeKind, id: &NodeId) -> Outputs {
    let mut outputs = Outputs::new();
    outputs.insert("name".to_string(), id.as_str().into());
    outputs.insert(
        "self_link".to_string(),
        format!("local/{kind}/{id}").into(),
    );
    match kind {
        NodeKind::Cluster => {
            outputs.insert("endpoint".to_string(), "127.0.0.1:6443".into());
            outputs.insert("ca_certificate".to_string(), "simulated-ca".into());
            outputs.insert("access_token".to_string(), "simulated-token".into());
        }
        NodeKind::DatabaseInstance => {
            outputs.insert("connection_name".to_string(), format!("local:sim:{id}").into());
            outputs.insert("admin_user".to_string(), "admin".into());
        }
        _ => {}
    }
    outputs
}

/// In-memory set of "live" resource ids shared by both CRUD fakes.
#[derive(Debug, Default)]
struct LiveSet {
    ids: Mutex<HashSet<String>>,
}

impl LiveSet {
    fn insert(&self, id: &NodeId) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
    }

    fn remove(&self, id: &NodeId) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id.as_str());
    }

    fn contains(&self, id: &NodeId) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id.as_str())
    }
}

#[derive(Debug, Default)]
struct SimulatedCloud {
    live: LiveSet,
}

#[async_trait]
impl CloudApi for SimulatedCloud {
    async fn create(&self, kind: NodeKind, id: &NodeId, _spec: &Spec) -> BackendResult<Outputs> {
        debug!(%kind, %id, "Simulated cloud create");
        self.live.insert(id);
        Ok(simulated_outputs(kind, id))
    }

    async fn update(&self, kind: NodeKind, id: &NodeId, _spec: &Spec) -> BackendResult<Outputs> {
        debug!(%kind, %id, "Simulated cloud update");
        self.live.insert(id);
        Ok(simulated_outputs(kind, id))
    }

    async fn get(&self, kind: NodeKind, id: &NodeId) -> BackendResult<ResourceState> {
        if self.live.contains(id) {
            Ok(ResourceState {
                phase: ResourcePhase::Ready,
                outputs: simulated_outputs(kind, id),
            })
        } else {
            Ok(ResourceState::phase(ResourcePhase::Gone))
        }
    }

    async fn delete(&self, kind: NodeKind, id: &NodeId) -> BackendResult<()> {
        debug!(%kind, %id, "Simulated cloud delete");
        self.live.remove(id);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SimulatedCluster {
    live: LiveSet,
}

#[async_trait]
impl ClusterApi for SimulatedCluster {
    async fn create(
        &self,
        conn: &ClusterConnection,
        kind: NodeKind,
        id: &NodeId,
        _spec: &Spec,
    ) -> BackendResult<Outputs> {
        debug!(endpoint = %conn.endpoint, %kind, %id, "Simulated cluster create");
        self.live.insert(id);
        Ok(simulated_outputs(kind, id))
    }

    async fn update(
        &self,
        _conn: &ClusterConnection,
        kind: NodeKind,
        id: &NodeId,
        _spec: &Spec,
    ) -> BackendResult<Outputs> {
        self.live.insert(id);
        Ok(simulated_outputs(kind, id))
    }

    async fn get(
        &self,
        _conn: &ClusterConnection,
        _kind: NodeKind,
        id: &NodeId,
    ) -> BackendResult<ResourceState> {
        if self.live.contains(id) {
            Ok(ResourceState::phase(ResourcePhase::Ready))
        } else {
            Ok(ResourceState::phase(ResourcePhase::Gone))
        }
    }

    async fn delete(
        &self,
        _conn: &ClusterConnection,
        kind: NodeKind,
        id: &NodeId,
    ) -> BackendResult<()> {
        debug!(%kind, %id, "Simulated cluster delete");
        self.live.remove(id);
        Ok(())
    }

    async fn clear_finalizers(
        &self,
        _conn: &ClusterConnection,
        _kind: NodeKind,
        id: &NodeId,
    ) -> BackendResult<()> {
        self.live.remove(id);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SimulatedGrants;

#[async_trait]
impl GrantApi for SimulatedGrants {
    async fn grant(
        &self,
        conn: &DatabaseConnection,
        principal: &str,
        target: &str,
        privilege: &str,
    ) -> BackendResult<()> {
        debug!(host = %conn.host, principal, target, privilege, "Simulated grant");
        Ok(())
    }

    async fn revoke(
        &self,
        conn: &DatabaseConnection,
        principal: &str,
        target: &str,
        privilege: &str,
    ) -> BackendResult<()> {
        debug!(host = %conn.host, principal, target, privilege, "Simulated revoke");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SimulatedFetcher;

#[async_trait]
impl ManifestFetcher for SimulatedFetcher {
    async fn fetch(&self, url: &str) -> BackendResult<Vec<ManifestDoc>> {
        debug!(url, "Simulated manifest fetch");
        Ok(vec![ManifestDoc {
            kind: "SimulatedManifest".to_string(),
            name: url.rsplit('/').next().unwrap_or(url).to_string(),
            body: serde_json::json!({ "source": url }),
        }])
    }
}

/// The simulated collaborator bundle used by `apply` and `destroy`.
#[must_use]
pub fn simulated_backends() -> Backends {
    Backends {
        cloud: Arc::new(SimulatedCloud::default()),
        cluster: Arc::new(SimulatedCluster::default()),
        grants: Arc::new(SimulatedGrants),
        manifests: Arc::new(SimulatedFetcher),
    }
}
