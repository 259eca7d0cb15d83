//! Counting fake collaborators shared by the integration tests.
#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use strata_graph::{NodeId, NodeKind};
use strata_reconciler::{
    BackendError, BackendResult, Backends, CloudApi, ClusterApi, ClusterConnection,
    DatabaseConnection, GrantApi, ManifestDoc, ManifestFetcher, Outputs, ResourcePhase,
    ResourceState, Spec,
};

fn default_outputs(id: &NodeId) -> Outputs {
    [("name".to_string(), id.as_str().into())].into_iter().collect()
}

/// Cloud fake: every create succeeds (unless injected to fail), resources
/// become Ready immediately, deletes disappear immediately.
#[derive(Debug, Default)]
pub struct FakeCloudApi {
    configured: Mutex<HashMap<String, Outputs>>,
    fail_create: Mutex<HashSet<String>>,
    phases: Mutex<HashMap<String, ResourcePhase>>,
    live_outputs: Mutex<HashMap<String, Outputs>>,
    pub creates: Mutex<Vec<String>>,
    pub updates: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
}

impl FakeCloudApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra outputs returned (on top of the default `name`) when `id` is
    /// created.
    pub fn set_outputs(&self, id: &str, outputs: Outputs) {
        self.configured.lock().unwrap().insert(id.to_string(), outputs);
    }

    pub fn fail_create_of(&self, id: &str) {
        self.fail_create.lock().unwrap().insert(id.to_string());
    }

    pub fn create_count(&self, id: &str) -> usize {
        self.creates.lock().unwrap().iter().filter(|c| *c == id).count()
    }

    pub fn delete_count(&self, id: &str) -> usize {
        self.deletes.lock().unwrap().iter().filter(|c| *c == id).count()
    }

    fn outputs_for(&self, id: &NodeId) -> Outputs {
        let mut outputs = default_outputs(id);
        if let Some(extra) = self.configured.lock().unwrap().get(id.as_str()) {
            outputs.extend(extra.clone());
        }
        outputs
    }
}

#[async_trait]
impl CloudApi for FakeCloudApi {
    async fn create(&self, _kind: NodeKind, id: &NodeId, _spec: &Spec) -> BackendResult<Outputs> {
        if self.fail_create.lock().unwrap().contains(id.as_str()) {
            return Err(BackendError::new("injected create failure"));
        }
        self.creates.lock().unwrap().push(id.to_string());
        let outputs = self.outputs_for(id);
        self.phases
            .lock()
            .unwrap()
            .insert(id.to_string(), ResourcePhase::Ready);
        self.live_outputs
            .lock()
            .unwrap()
            .insert(id.to_string(), outputs.clone());
        Ok(outputs)
    }

    async fn update(&self, _kind: NodeKind, id: &NodeId, _spec: &Spec) -> BackendResult<Outputs> {
        self.updates.lock().unwrap().push(id.to_string());
        Ok(self.outputs_for(id))
    }

    async fn get(&self, _kind: NodeKind, id: &NodeId) -> BackendResult<ResourceState> {
        let phase = self
            .phases
            .lock()
            .unwrap()
            .get(id.as_str())
            .copied()
            .unwrap_or(ResourcePhase::Gone);
        let outputs = if phase == ResourcePhase::Ready {
            self.live_outputs
                .lock()
                .unwrap()
                .get(id.as_str())
                .cloned()
                .unwrap_or_default()
        } else {
            Outputs::new()
        };
        Ok(ResourceState { phase, outputs })
    }

    async fn delete(&self, _kind: NodeKind, id: &NodeId) -> BackendResult<()> {
        self.deletes.lock().unwrap().push(id.to_string());
        self.phases
            .lock()
            .unwrap()
            .insert(id.to_string(), ResourcePhase::Gone);
        Ok(())
    }
}

/// Cluster fake: records every spec it applies and the endpoint of every
/// connection it is handed. Ids marked stuck ignore deletes until their
/// finalizers are cleared; hopeless ids ignore even that.
#[derive(Debug, Default)]
pub struct FakeClusterApi {
    stuck: Mutex<HashSet<String>>,
    hopeless: Mutex<HashSet<String>>,
    phases: Mutex<HashMap<String, ResourcePhase>>,
    pub creates: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
    pub finalizer_clears: Mutex<Vec<String>>,
    pub specs: Mutex<HashMap<String, Spec>>,
    pub seen_endpoints: Mutex<Vec<String>>,
}

impl FakeClusterApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletes of `id` hang in Terminating until finalizers are cleared.
    pub fn mark_stuck(&self, id: &str) {
        self.stuck.lock().unwrap().insert(id.to_string());
    }

    /// Deletes of `id` hang in Terminating forever, finalizer clear or not.
    pub fn mark_hopeless(&self, id: &str) {
        self.mark_stuck(id);
        self.hopeless.lock().unwrap().insert(id.to_string());
    }

    pub fn create_count(&self, id: &str) -> usize {
        self.creates.lock().unwrap().iter().filter(|c| *c == id).count()
    }

    pub fn clear_count(&self, id: &str) -> usize {
        self.finalizer_clears
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == id)
            .count()
    }

    pub fn applied_spec(&self, id: &str) -> Option<Spec> {
        self.specs.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl ClusterApi for FakeClusterApi {
    async fn create(
        &self,
        conn: &ClusterConnection,
        _kind: NodeKind,
        id: &NodeId,
        spec: &Spec,
    ) -> BackendResult<Outputs> {
        self.seen_endpoints.lock().unwrap().push(conn.endpoint.clone());
        self.creates.lock().unwrap().push(id.to_string());
        self.specs.lock().unwrap().insert(id.to_string(), spec.clone());
        self.phases
            .lock()
            .unwrap()
            .insert(id.to_string(), ResourcePhase::Ready);
        Ok(default_outputs(id))
    }

    async fn update(
        &self,
        _conn: &ClusterConnection,
        _kind: NodeKind,
        id: &NodeId,
        spec: &Spec,
    ) -> BackendResult<Outputs> {
        self.specs.lock().unwrap().insert(id.to_string(), spec.clone());
        Ok(default_outputs(id))
    }

    async fn get(
        &self,
        _conn: &ClusterConnection,
        _kind: NodeKind,
        id: &NodeId,
    ) -> BackendResult<ResourceState> {
        let phase = self
            .phases
            .lock()
            .unwrap()
            .get(id.as_str())
            .copied()
            .unwrap_or(ResourcePhase::Gone);
        Ok(ResourceState::phase(phase))
    }

    async fn delete(
        &self,
        _conn: &ClusterConnection,
        _kind: NodeKind,
        id: &NodeId,
    ) -> BackendResult<()> {
        self.deletes.lock().unwrap().push(id.to_string());
        let phase = if self.stuck.lock().unwrap().contains(id.as_str()) {
            ResourcePhase::Terminating
        } else {
            ResourcePhase::Gone
        };
        self.phases.lock().unwrap().insert(id.to_string(), phase);
        Ok(())
    }

    async fn clear_finalizers(
        &self,
        _conn: &ClusterConnection,
        _kind: NodeKind,
        id: &NodeId,
    ) -> BackendResult<()> {
        self.finalizer_clears.lock().unwrap().push(id.to_string());
        if !self.hopeless.lock().unwrap().contains(id.as_str()) {
            self.stuck.lock().unwrap().remove(id.as_str());
            self.phases
                .lock()
                .unwrap()
                .insert(id.to_string(), ResourcePhase::Gone);
        }
        Ok(())
    }
}

/// Grant fake with per-principal failure injection.
#[derive(Debug, Default)]
pub struct FakeGrantApi {
    fail_principals: Mutex<HashSet<String>>,
    pub grants: Mutex<Vec<(String, String, String)>>,
    pub revokes: Mutex<Vec<(String, String, String)>>,
    pub seen_hosts: Mutex<Vec<String>>,
}

impl FakeGrantApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_grants_for(&self, principal: &str) {
        self.fail_principals.lock().unwrap().insert(principal.to_string());
    }

    pub fn granted(&self, principal: &str) -> bool {
        self.grants.lock().unwrap().iter().any(|(p, _, _)| p == principal)
    }
}

#[async_trait]
impl GrantApi for FakeGrantApi {
    async fn grant(
        &self,
        conn: &DatabaseConnection,
        principal: &str,
        target: &str,
        privilege: &str,
    ) -> BackendResult<()> {
        if self.fail_principals.lock().unwrap().contains(principal) {
            return Err(BackendError::new("injected grant failure"));
        }
        self.seen_hosts.lock().unwrap().push(conn.host.clone());
        self.grants.lock().unwrap().push((
            principal.to_string(),
            target.to_string(),
            privilege.to_string(),
        ));
        Ok(())
    }

    async fn revoke(
        &self,
        _conn: &DatabaseConnection,
        principal: &str,
        target: &str,
        privilege: &str,
    ) -> BackendResult<()> {
        self.revokes.lock().unwrap().push((
            principal.to_string(),
            target.to_string(),
            privilege.to_string(),
        ));
        Ok(())
    }
}

/// Manifest fake: only configured URLs resolve.
#[derive(Debug, Default)]
pub struct FakeFetcher {
    docs: Mutex<HashMap<String, Vec<ManifestDoc>>>,
    pub fetches: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, docs: Vec<ManifestDoc>) {
        self.docs.lock().unwrap().insert(url.to_string(), docs);
    }
}

#[async_trait]
impl ManifestFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> BackendResult<Vec<ManifestDoc>> {
        self.fetches.lock().unwrap().push(url.to_string());
        self.docs
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| BackendError::new(format!("unreachable url: {url}")))
    }
}

/// All four fakes plus the `Backends` bundle wired to them.
pub struct FakeBackends {
    pub cloud: Arc<FakeCloudApi>,
    pub cluster: Arc<FakeClusterApi>,
    pub grants: Arc<FakeGrantApi>,
    pub manifests: Arc<FakeFetcher>,
}

impl FakeBackends {
    pub fn new() -> Self {
        Self {
            cloud: Arc::new(FakeCloudApi::new()),
            cluster: Arc::new(FakeClusterApi::new()),
            grants: Arc::new(FakeGrantApi::new()),
            manifests: Arc::new(FakeFetcher::new()),
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            cloud: Arc::clone(&self.cloud) as Arc<dyn CloudApi>,
            cluster: Arc::clone(&self.cluster) as Arc<dyn ClusterApi>,
            grants: Arc::clone(&self.grants) as Arc<dyn GrantApi>,
            manifests: Arc::clone(&self.manifests) as Arc<dyn ManifestFetcher>,
        }
    }

    /// Configure the outputs the provider bindings resolve from.
    pub fn configure_platform_outputs(&self, cluster_id: &str, instance_id: &str) {
        self.cloud.set_outputs(
            cluster_id,
            [
                ("endpoint".to_string(), "34.1.2.3".into()),
                ("ca_certificate".to_string(), "LS0tLS1CRUdJTg==".into()),
                ("access_token".to_string(), "ya29.token".into()),
            ]
            .into_iter()
            .collect(),
        );
        self.cloud.set_outputs(
            instance_id,
            [
                ("connection_name".to_string(), "proj:region:db".into()),
                ("admin_user".to_string(), "postgres".into()),
            ]
            .into_iter()
            .collect(),
        );
    }
}
