//! Reconciliation executor: per-node create/update/destroy.
//!
//! The executor owns every status transition of a node within a pass:
//! `Planned -> Creating -> Ready -> {Updating -> Ready | Destroying ->
//! Destroyed | Destroying -> Failed}`. Failures are never silently skipped;
//! each one carries the node id and kind.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use strata_graph::{BackendClass, DeletionPolicy, NodeId, NodeStatus, ResourceNode};

use crate::backend::{Backends, Outputs, ResourcePhase, Spec};
use crate::binding::{ClusterConnection, DatabaseConnection};
use crate::error::{Error, Result};
use crate::state::StateStore;
use crate::wait::{WaitPolicy, wait_until_ready};

/// Bounded windows for the stuck-deletion recovery ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Cadence of deletion-status polls.
    pub poll_interval: Duration,
    /// First window: how long a Terminating resource may linger before the
    /// forced finalizer clear.
    pub stuck_after: Duration,
    /// Second window: how long to re-poll for disappearance after the clear.
    pub verify_window: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            stuck_after: Duration::from_secs(60),
            verify_window: Duration::from_secs(30),
        }
    }
}

/// Executor configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorConfig {
    /// Budget for create-side readiness waits and ordinary deletion waits.
    pub readiness: WaitPolicy,
    /// Stuck-deletion recovery windows.
    pub recovery: RecoveryPolicy,
}

/// Provider bindings resolved (or not) for one stage run.
///
/// Carries a `Result` per backend class so a node that needs an unresolved
/// binding fails with the original resolution error, not a generic one.
#[derive(Debug, Clone)]
pub struct ResolvedProviders {
    cluster: Result<ClusterConnection>,
    database: Result<DatabaseConnection>,
}

impl ResolvedProviders {
    /// Providers before stage one has produced anything.
    #[must_use]
    pub fn unresolved() -> Self {
        Self {
            cluster: Err(Error::binding_unresolved(
                "cluster-connection",
                "infrastructure stage has not completed",
            )),
            database: Err(Error::binding_unresolved(
                "database-connection",
                "infrastructure stage has not completed",
            )),
        }
    }

    /// Bundle resolution outcomes.
    #[must_use]
    pub fn new(cluster: Result<ClusterConnection>, database: Result<DatabaseConnection>) -> Self {
        Self { cluster, database }
    }

    /// The cluster connection, or the error that kept it unresolved.
    pub fn cluster(&self) -> Result<&ClusterConnection> {
        self.cluster.as_ref().map_err(Clone::clone)
    }

    /// The database connection, or the error that kept it unresolved.
    pub fn database(&self) -> Result<&DatabaseConnection> {
        self.database.as_ref().map_err(Clone::clone)
    }
}

/// Applies single-node operations against the collaborator backends.
pub struct Executor {
    backends: Backends,
    state: Arc<StateStore>,
    config: ExecutorConfig,
}

impl Executor {
    /// Create an executor.
    pub fn new(backends: Backends, state: Arc<StateStore>, config: ExecutorConfig) -> Self {
        Self {
            backends,
            state,
            config,
        }
    }

    /// Shared state store handle.
    #[must_use]
    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// Create a node's backend resource and record its outputs.
    ///
    /// # Errors
    ///
    /// Node-scoped: [`Error::BackendCallFailed`], [`Error::MissingOutput`],
    /// [`Error::ManifestRejected`], [`Error::TimedOut`],
    /// [`Error::BindingUnresolved`].
    pub async fn create(&self, node: &ResourceNode, providers: &ResolvedProviders) -> Result<()> {
        info!(node = %node.id, kind = %node.kind, "Creating resource");
        self.state.set_status(&node.id, NodeStatus::Creating);

        match self.call_create(node, providers).await {
            Ok(outputs) => {
                self.state
                    .record_applied(&node.id, node.inputs.clone(), outputs);
                info!(node = %node.id, "Resource ready");
                Ok(())
            }
            Err(e) => {
                self.state.set_status(&node.id, NodeStatus::Failed);
                warn!(node = %node.id, kind = %node.kind, error = %e, "Create failed");
                Err(e)
            }
        }
    }

    /// Update a Ready node in place with its changed inputs.
    ///
    /// # Errors
    ///
    /// Same node-scoped taxonomy as [`Executor::create`].
    pub async fn update(&self, node: &ResourceNode, providers: &ResolvedProviders) -> Result<()> {
        info!(node = %node.id, kind = %node.kind, "Updating resource");
        self.state.set_status(&node.id, NodeStatus::Updating);

        match self.call_update(node, providers).await {
            Ok(outputs) => {
                self.state
                    .record_applied(&node.id, node.inputs.clone(), outputs);
                info!(node = %node.id, "Resource ready");
                Ok(())
            }
            Err(e) => {
                self.state.set_status(&node.id, NodeStatus::Failed);
                warn!(node = %node.id, kind = %node.kind, error = %e, "Update failed");
                Err(e)
            }
        }
    }

    /// Destroy a node's backend resource per its deletion policy.
    ///
    /// # Errors
    ///
    /// [`Error::ProtectedResource`] for protect-policy nodes (no backend
    /// call is made), [`Error::StuckDeletion`] when the recovery ladder is
    /// exhausted, plus the usual node-scoped taxonomy.
    pub async fn destroy(&self, node: &ResourceNode, providers: &ResolvedProviders) -> Result<()> {
        match node.deletion_policy {
            DeletionPolicy::Protect => {
                warn!(node = %node.id, "Destroy refused: deletion policy is protect");
                return Err(Error::protected_resource(node.id.clone()));
            }
            DeletionPolicy::Abandon => {
                // Remove from desired state without calling the backend;
                // the owning service's deletion is too unreliable to automate.
                info!(node = %node.id, kind = %node.kind, "Abandoning resource (no backend delete)");
                self.state.remove(&node.id);
                return Ok(());
            }
            DeletionPolicy::Standard => {}
        }

        info!(node = %node.id, kind = %node.kind, "Destroying resource");
        self.state.set_status(&node.id, NodeStatus::Destroying);

        match self.call_destroy(node, providers).await {
            Ok(()) => {
                self.state.set_status(&node.id, NodeStatus::Destroyed);
                self.state.remove(&node.id);
                info!(node = %node.id, "Resource destroyed");
                Ok(())
            }
            Err(e) => {
                self.state.set_status(&node.id, NodeStatus::Failed);
                warn!(node = %node.id, kind = %node.kind, error = %e, "Destroy failed");
                Err(e)
            }
        }
    }

    async fn call_create(
        &self,
        node: &ResourceNode,
        providers: &ResolvedProviders,
    ) -> Result<Outputs> {
        let mut spec = self.resolve_inputs(node)?;
        if node.kind.fetches_manifest() {
            self.attach_manifest(node, &mut spec).await?;
        }

        let outputs = match node.kind.backend_class() {
            BackendClass::Cloud => self
                .backends
                .cloud
                .create(node.kind, &node.id, &spec)
                .await
                .map_err(|e| Error::backend_call_failed(node.id.clone(), node.kind, e.to_string()))?,
            BackendClass::Cluster => {
                let conn = providers.cluster()?;
                self.backends
                    .cluster
                    .create(conn, node.kind, &node.id, &spec)
                    .await
                    .map_err(|e| {
                        Error::backend_call_failed(node.id.clone(), node.kind, e.to_string())
                    })?
            }
            BackendClass::Grant => {
                let conn = providers.database()?;
                let (principal, target, privilege) = grant_args(&node.id, &spec)?;
                self.backends
                    .grants
                    .grant(conn, &principal, &target, &privilege)
                    .await
                    .map_err(|e| {
                        Error::backend_call_failed(node.id.clone(), node.kind, e.to_string())
                    })?;
                Outputs::new()
            }
        };

        if node.kind.needs_readiness_wait() {
            self.wait_ready(node, providers).await?;
            // Outputs like cluster endpoints are only final once Ready.
            if let Some(refreshed) = self.refresh_outputs(node, providers).await? {
                return Ok(refreshed);
            }
        }
        Ok(outputs)
    }

    async fn call_update(
        &self,
        node: &ResourceNode,
        providers: &ResolvedProviders,
    ) -> Result<Outputs> {
        let mut spec = self.resolve_inputs(node)?;
        if node.kind.fetches_manifest() {
            self.attach_manifest(node, &mut spec).await?;
        }

        match node.kind.backend_class() {
            BackendClass::Cloud => self
                .backends
                .cloud
                .update(node.kind, &node.id, &spec)
                .await
                .map_err(|e| Error::backend_call_failed(node.id.clone(), node.kind, e.to_string())),
            BackendClass::Cluster => {
                let conn = providers.cluster()?;
                self.backends
                    .cluster
                    .update(conn, node.kind, &node.id, &spec)
                    .await
                    .map_err(|e| {
                        Error::backend_call_failed(node.id.clone(), node.kind, e.to_string())
                    })
            }
            // A grant update is a re-grant; the interface is idempotent.
            BackendClass::Grant => {
                let conn = providers.database()?;
                let (principal, target, privilege) = grant_args(&node.id, &spec)?;
                self.backends
                    .grants
                    .grant(conn, &principal, &target, &privilege)
                    .await
                    .map_err(|e| {
                        Error::backend_call_failed(node.id.clone(), node.kind, e.to_string())
                    })?;
                Ok(Outputs::new())
            }
        }
    }

    async fn call_destroy(&self, node: &ResourceNode, providers: &ResolvedProviders) -> Result<()> {
        match node.kind.backend_class() {
            BackendClass::Grant => {
                let conn = providers.database()?;
                let spec = self.resolve_inputs(node)?;
                let (principal, target, privilege) = grant_args(&node.id, &spec)?;
                self.backends
                    .grants
                    .revoke(conn, &principal, &target, &privilege)
                    .await
                    .map_err(|e| {
                        Error::backend_call_failed(node.id.clone(), node.kind, e.to_string())
                    })
            }
            BackendClass::Cloud => {
                self.backends
                    .cloud
                    .delete(node.kind, &node.id)
                    .await
                    .map_err(|e| {
                        Error::backend_call_failed(node.id.clone(), node.kind, e.to_string())
                    })?;
                self.wait_gone(node, providers, self.config.readiness.timeout)
                    .await
            }
            BackendClass::Cluster => {
                let conn = providers.cluster()?;
                self.backends
                    .cluster
                    .delete(conn, node.kind, &node.id)
                    .await
                    .map_err(|e| {
                        Error::backend_call_failed(node.id.clone(), node.kind, e.to_string())
                    })?;

                if node.kind.deletion_sticks() {
                    self.recover_stuck_deletion(node, providers).await
                } else {
                    self.wait_gone(node, providers, self.config.readiness.timeout)
                        .await
                }
            }
        }
    }

    /// The bounded recovery ladder for deletions known to hang on dangling
    /// finalizers: first window -> exactly one forced finalizer clear ->
    /// second window -> fail loudly.
    async fn recover_stuck_deletion(
        &self,
        node: &ResourceNode,
        providers: &ResolvedProviders,
    ) -> Result<()> {
        let recovery = self.config.recovery;

        match self.wait_gone(node, providers, recovery.stuck_after).await {
            Ok(()) => return Ok(()),
            Err(Error::TimedOut { .. }) => {
                warn!(
                    node = %node.id,
                    window = ?recovery.stuck_after,
                    "Stuck deletion detected; forcing finalizer clear"
                );
            }
            Err(e) => return Err(e),
        }

        let conn = providers.cluster()?;
        self.backends
            .cluster
            .clear_finalizers(conn, node.kind, &node.id)
            .await
            .map_err(|e| Error::backend_call_failed(node.id.clone(), node.kind, e.to_string()))?;
        info!(node = %node.id, "Finalizers cleared; re-polling for disappearance");

        match self.wait_gone(node, providers, recovery.verify_window).await {
            Ok(()) => {
                info!(node = %node.id, "Stuck deletion recovered");
                Ok(())
            }
            Err(Error::TimedOut { .. }) => {
                let waited = recovery.stuck_after + recovery.verify_window;
                warn!(node = %node.id, ?waited, "Forced finalizer clear did not unblock deletion");
                Err(Error::stuck_deletion(node.id.clone(), waited))
            }
            Err(e) => Err(e),
        }
    }

    async fn wait_ready(&self, node: &ResourceNode, providers: &ResolvedProviders) -> Result<()> {
        let label = format!("{} '{}'", node.kind, node.id);
        wait_until_ready(
            &label,
            || async move {
                let phase = self.phase_of(node, providers).await?;
                Ok(phase == ResourcePhase::Ready)
            },
            self.config.readiness,
        )
        .await
    }

    async fn wait_gone(
        &self,
        node: &ResourceNode,
        providers: &ResolvedProviders,
        timeout: Duration,
    ) -> Result<()> {
        let label = format!("deletion of {} '{}'", node.kind, node.id);
        let policy = WaitPolicy::new(timeout, self.config.recovery.poll_interval);
        wait_until_ready(
            &label,
            || async move {
                let phase = self.phase_of(node, providers).await?;
                Ok(phase == ResourcePhase::Gone)
            },
            policy,
        )
        .await
    }

    async fn phase_of(
        &self,
        node: &ResourceNode,
        providers: &ResolvedProviders,
    ) -> Result<ResourcePhase> {
        let state = match node.kind.backend_class() {
            BackendClass::Cloud => self
                .backends
                .cloud
                .get(node.kind, &node.id)
                .await
                .map_err(|e| Error::backend_call_failed(node.id.clone(), node.kind, e.to_string()))?,
            BackendClass::Cluster => {
                let conn = providers.cluster()?;
                self.backends
                    .cluster
                    .get(conn, node.kind, &node.id)
                    .await
                    .map_err(|e| {
                        Error::backend_call_failed(node.id.clone(), node.kind, e.to_string())
                    })?
            }
            // Grants have no observable phase; they are done when acked.
            BackendClass::Grant => return Ok(ResourcePhase::Gone),
        };
        Ok(state.phase)
    }

    async fn refresh_outputs(
        &self,
        node: &ResourceNode,
        providers: &ResolvedProviders,
    ) -> Result<Option<Outputs>> {
        let state = match node.kind.backend_class() {
            BackendClass::Cloud => self
                .backends
                .cloud
                .get(node.kind, &node.id)
                .await
                .map_err(|e| Error::backend_call_failed(node.id.clone(), node.kind, e.to_string()))?,
            BackendClass::Cluster => {
                let conn = providers.cluster()?;
                self.backends
                    .cluster
                    .get(conn, node.kind, &node.id)
                    .await
                    .map_err(|e| {
                        Error::backend_call_failed(node.id.clone(), node.kind, e.to_string())
                    })?
            }
            BackendClass::Grant => return Ok(None),
        };
        if state.outputs.is_empty() {
            Ok(None)
        } else {
            Ok(Some(state.outputs))
        }
    }

    /// Resolve a node's declared inputs against the current state snapshot.
    fn resolve_inputs(&self, node: &ResourceNode) -> Result<Spec> {
        let snapshot = self.state.snapshot();
        let mut spec = Spec::new();
        for (name, value) in &node.inputs {
            let resolved = match value {
                strata_graph::InputValue::Literal(v) => v.clone(),
                strata_graph::InputValue::Ref { node: dep, output } => snapshot
                    .output(dep, output)
                    .cloned()
                    .ok_or_else(|| {
                        Error::missing_output(node.id.clone(), dep.clone(), output.clone())
                    })?,
            };
            spec.insert(name.clone(), resolved);
        }
        debug!(node = %node.id, attributes = spec.len(), "Inputs resolved");
        Ok(spec)
    }

    /// Fetch the versioned manifest documents for CRD/operator kinds and
    /// attach them to the spec. Fails closed: fetch errors, parse errors
    /// and empty document sets all abort before any apply call.
    async fn attach_manifest(&self, node: &ResourceNode, spec: &mut Spec) -> Result<()> {
        let url = spec
            .get("manifest_url")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::invalid_input(node.id.clone(), "missing string input 'manifest_url'")
            })?;

        let docs = self
            .backends
            .manifests
            .fetch(&url)
            .await
            .map_err(|e| Error::manifest_rejected(url.clone(), e.to_string()))?;
        if docs.is_empty() {
            return Err(Error::manifest_rejected(url, "empty document set"));
        }

        let documents = serde_json::to_value(&docs)
            .map_err(|e| Error::manifest_rejected(url.clone(), e.to_string()))?;
        debug!(node = %node.id, url, documents = docs.len(), "Manifest attached");
        spec.insert("documents".to_string(), documents);
        Ok(())
    }
}

/// Extract the three string arguments of a grant call from a resolved spec.
fn grant_args(node_id: &NodeId, spec: &Spec) -> Result<(String, String, String)> {
    let get = |key: &str| -> Result<String> {
        spec.get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::invalid_input(node_id.clone(), format!("missing string input '{key}'"))
            })
    };
    Ok((get("principal")?, get("target")?, get("privilege")?))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_grant_args_requires_all_three_strings() {
        let id = NodeId::from("grant-app");
        let mut spec = Spec::new();
        spec.insert("principal".into(), "app-user".into());
        spec.insert("target".into(), "appdb".into());

        let err = grant_args(&id, &spec).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
        assert!(err.to_string().contains("privilege"));

        spec.insert("privilege".into(), "ALL".into());
        let (principal, target, privilege) = grant_args(&id, &spec).unwrap();
        assert_eq!(principal, "app-user");
        assert_eq!(target, "appdb");
        assert_eq!(privilege, "ALL");
    }

    #[test]
    fn test_unresolved_providers_surface_binding_errors() {
        let providers = ResolvedProviders::unresolved();
        assert!(matches!(
            providers.cluster(),
            Err(Error::BindingUnresolved { .. })
        ));
        assert!(matches!(
            providers.database(),
            Err(Error::BindingUnresolved { .. })
        ));
    }
}
