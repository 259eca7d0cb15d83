//! Two-phase apply coordinator.
//!
//! Runs the Infrastructure bucket of a plan to completion, resolves the
//! provider bindings from the captured outputs, then runs the Application
//! bucket. Within a bucket nodes run in bounded-parallel waves: a node
//! launches as soon as every prerequisite converged, capped by a semaphore.
//! A prerequisite failure skips the whole downstream cone; unrelated
//! branches keep converging.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use strata_graph::{
    NodeId, NodeKind, Operation, PlanResult, PlannedNode, ResourceGraph, Stage, plan, plan_destroy,
};

use crate::backend::Backends;
use crate::binding::ProviderBinding;
use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorConfig, ResolvedProviders};
use crate::state::StateStore;

/// Coordinator configuration.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// Per-node execution policies.
    pub executor: ExecutorConfig,
    /// Cap on concurrently executing nodes.
    pub max_in_flight: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            max_in_flight: 10,
        }
    }
}

/// Handle to stop a running pass.
///
/// Abort is graceful: in-flight nodes finish their current operation, but
/// nothing new launches.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Request that the pass stop launching nodes.
    pub fn abort(&self) {
        // Receiver may be gone if the pass already finished.
        let _ = self.tx.send(true);
    }
}

/// Outcome of one apply or destroy pass.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// Nodes that converged this pass (created, updated or destroyed).
    pub succeeded: Vec<NodeId>,
    /// Ready nodes the plan left untouched.
    pub unchanged: Vec<NodeId>,
    /// Nodes whose own operation failed, with the error.
    pub failed: Vec<(NodeId, Error)>,
    /// Nodes never launched because a prerequisite failed; pairs the node
    /// with the root-cause node.
    pub skipped: Vec<(NodeId, NodeId)>,
    /// Nodes never launched because the pass was aborted.
    pub aborted: Vec<NodeId>,
}

impl ApplyReport {
    /// Whether every planned node converged.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && self.aborted.is_empty()
    }

    /// Whether any failure was a readiness timeout.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.failed.iter().any(|(_, e)| e.is_timeout())
    }
}

/// Drives whole passes over a resource graph.
pub struct Coordinator {
    executor: Arc<Executor>,
    state: Arc<StateStore>,
    config: CoordinatorConfig,
    abort_tx: watch::Sender<bool>,
    abort_rx: watch::Receiver<bool>,
}

impl Coordinator {
    /// Create a coordinator over the given collaborators and state store.
    pub fn new(backends: Backends, state: Arc<StateStore>, config: CoordinatorConfig) -> Self {
        let executor = Arc::new(Executor::new(
            backends,
            Arc::clone(&state),
            config.executor,
        ));
        let (abort_tx, abort_rx) = watch::channel(false);
        Self {
            executor,
            state,
            config,
            abort_tx,
            abort_rx,
        }
    }

    /// Handle that aborts this coordinator's running pass.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort_tx.clone(),
        }
    }

    /// Run one full apply pass: plan, converge Infrastructure, resolve
    /// provider bindings, converge Application.
    ///
    /// Re-entrant: Ready nodes with unchanged inputs are reported unchanged
    /// and never touch a backend.
    ///
    /// # Errors
    ///
    /// Planning errors only; execution failures land inside the report.
    pub async fn apply(&self, graph: &ResourceGraph) -> PlanResult<ApplyReport> {
        let prior = self.state.snapshot().prior_state();
        let plan = plan(graph, &prior)?;
        info!(
            nodes = plan.len(),
            pending = plan.pending(),
            "Apply pass starting"
        );

        let mut report = ApplyReport::default();
        let mut completed = HashSet::new();
        let mut failed_root: HashMap<NodeId, NodeId> = HashMap::new();

        let providers = ResolvedProviders::unresolved();
        self.run_bucket(
            graph,
            plan.stage(Stage::Infrastructure),
            &providers,
            false,
            &mut completed,
            &mut failed_root,
            &mut report,
        )
        .await;

        let providers = self.resolve_providers(graph);
        self.run_bucket(
            graph,
            plan.stage(Stage::Application),
            &providers,
            false,
            &mut completed,
            &mut failed_root,
            &mut report,
        )
        .await;

        info!(
            succeeded = report.succeeded.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            aborted = report.aborted.len(),
            "Apply pass finished"
        );
        Ok(report)
    }

    /// Run one full destroy pass: Application bucket first, then
    /// Infrastructure, each in reverse dependency order.
    ///
    /// # Errors
    ///
    /// Planning errors only; execution failures land inside the report.
    pub async fn destroy(&self, graph: &ResourceGraph) -> PlanResult<ApplyReport> {
        let prior = self.state.snapshot().prior_state();
        let plan = plan_destroy(graph, &prior)?;
        info!(nodes = plan.len(), "Destroy pass starting");

        // Workload teardown still needs live connections, resolved from the
        // state that exists before anything is removed.
        let providers = self.resolve_providers(graph);

        let mut report = ApplyReport::default();
        let mut completed = HashSet::new();
        let mut failed_root: HashMap<NodeId, NodeId> = HashMap::new();

        self.run_bucket(
            graph,
            plan.stage(Stage::Application),
            &providers,
            true,
            &mut completed,
            &mut failed_root,
            &mut report,
        )
        .await;
        self.run_bucket(
            graph,
            plan.stage(Stage::Infrastructure),
            &providers,
            true,
            &mut completed,
            &mut failed_root,
            &mut report,
        )
        .await;

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            aborted = report.aborted.len(),
            "Destroy pass finished"
        );
        Ok(report)
    }

    /// Resolve the stage-two provider bindings from the current snapshot.
    ///
    /// Resolution failures are stored per class, not raised here: a pass
    /// whose Application bucket never touches that class should not fail on
    /// it.
    fn resolve_providers(&self, graph: &ResourceGraph) -> ResolvedProviders {
        let snapshot = self.state.snapshot();

        let cluster = match find_kind(graph, NodeKind::Cluster) {
            Some(id) => {
                let mut binding = ProviderBinding::cluster_connection(id);
                binding
                    .resolve(&snapshot)
                    .and_then(|()| binding.as_cluster_connection())
            }
            None => Err(Error::binding_unresolved(
                "cluster-connection",
                "no cluster node declared",
            )),
        };

        let database = match find_kind(graph, NodeKind::DatabaseInstance) {
            Some(id) => {
                let mut binding = ProviderBinding::database_connection(id);
                binding
                    .resolve(&snapshot)
                    .and_then(|()| binding.as_database_connection())
            }
            None => Err(Error::binding_unresolved(
                "database-connection",
                "no database-instance node declared",
            )),
        };

        if let Err(e) = &cluster {
            debug!(error = %e, "Cluster binding not resolved");
        }
        if let Err(e) = &database {
            debug!(error = %e, "Database binding not resolved");
        }
        ResolvedProviders::new(cluster, database)
    }

    /// Converge one stage bucket with bounded-parallel waves.
    #[allow(clippy::too_many_arguments)]
    async fn run_bucket(
        &self,
        graph: &ResourceGraph,
        entries: &[PlannedNode],
        providers: &ResolvedProviders,
        destroying: bool,
        completed: &mut HashSet<NodeId>,
        failed_root: &mut HashMap<NodeId, NodeId>,
        report: &mut ApplyReport,
    ) {
        let mut pending: VecDeque<PlannedNode> = VecDeque::new();
        for entry in entries {
            if entry.operation == Operation::Noop {
                completed.insert(entry.id.clone());
                report.unchanged.push(entry.id.clone());
            } else {
                pending.push_back(entry.clone());
            }
        }

        // Only planned, non-noop nodes gate each other; prerequisites outside
        // this set (noop, untracked, earlier bucket) count as satisfied.
        let universe: HashSet<NodeId> = pending.iter().map(|p| p.id.clone()).collect();

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut in_flight: JoinSet<(NodeId, Result<()>)> = JoinSet::new();
        let abort_rx = self.abort_rx.clone();

        loop {
            if *abort_rx.borrow() {
                for entry in pending.drain(..) {
                    let cause = Error::aborted(entry.id.clone());
                    warn!(error = %cause, "Not launched");
                    report.aborted.push(entry.id);
                }
            }

            let launched = self.launch_wave(
                graph,
                &mut pending,
                &universe,
                providers,
                destroying,
                completed,
                failed_root,
                report,
                &semaphore,
                &mut in_flight,
            );

            if in_flight.is_empty() {
                if pending.is_empty() {
                    break;
                }
                if !launched {
                    // Nothing running and nothing launchable: classify the
                    // remainder by root cause before giving up on the bucket.
                    while let Some(entry) = pending.pop_front() {
                        let prereqs = if destroying {
                            graph.dependents(&entry.id)
                        } else {
                            graph.dependencies(&entry.id)
                        };
                        match prereqs.iter().find_map(|p| failed_root.get(p)).cloned() {
                            Some(root) => {
                                warn!(node = %entry.id, root_cause = %root, "Skipped: prerequisite failed");
                                failed_root.insert(entry.id.clone(), root.clone());
                                report.skipped.push((entry.id, root));
                            }
                            None => {
                                warn!(node = %entry.id, "Not launched: prerequisites never ran");
                                report.aborted.push(entry.id);
                            }
                        }
                    }
                    break;
                }
            }

            match in_flight.join_next().await {
                Some(Ok((id, Ok(())))) => {
                    completed.insert(id.clone());
                    report.succeeded.push(id);
                }
                Some(Ok((id, Err(e)))) => {
                    failed_root.insert(id.clone(), id.clone());
                    report.failed.push((id, e));
                }
                Some(Err(join_err)) => {
                    // A worker panic; the node record stays non-terminal and
                    // the next pass replans it.
                    error!(error = %join_err, "Node task aborted abnormally");
                }
                None => {}
            }
        }
    }

    /// Launch every pending node whose prerequisites are settled; returns
    /// whether anything was launched or skipped.
    #[allow(clippy::too_many_arguments)]
    fn launch_wave(
        &self,
        graph: &ResourceGraph,
        pending: &mut VecDeque<PlannedNode>,
        universe: &HashSet<NodeId>,
        providers: &ResolvedProviders,
        destroying: bool,
        completed: &HashSet<NodeId>,
        failed_root: &mut HashMap<NodeId, NodeId>,
        report: &mut ApplyReport,
        semaphore: &Arc<Semaphore>,
        in_flight: &mut JoinSet<(NodeId, Result<()>)>,
    ) -> bool {
        let mut progressed = false;
        let mut still_waiting = VecDeque::with_capacity(pending.len());

        while let Some(entry) = pending.pop_front() {
            // Apply gates on dependencies; destroy gates on dependents.
            let prereqs = if destroying {
                graph.dependents(&entry.id)
            } else {
                graph.dependencies(&entry.id)
            };

            let blocked_by = prereqs
                .iter()
                .find_map(|p| failed_root.get(p))
                .cloned();
            if let Some(root) = blocked_by {
                // A skipped node blocks its own dependents too, with the
                // original failure as root cause; the cone follows the
                // transitive closure, across stage buckets included.
                warn!(node = %entry.id, root_cause = %root, "Skipped: prerequisite failed");
                failed_root.insert(entry.id.clone(), root.clone());
                report.skipped.push((entry.id, root));
                progressed = true;
                continue;
            }

            let satisfied = prereqs
                .iter()
                .all(|p| completed.contains(p) || !universe.contains(p));
            if !satisfied {
                still_waiting.push_back(entry);
                continue;
            }

            let Ok(permit) = Arc::clone(semaphore).try_acquire_owned() else {
                // At the concurrency cap; retry after a completion.
                still_waiting.push_back(entry);
                continue;
            };

            let Some(node) = graph.node(&entry.id).cloned() else {
                still_waiting.push_back(entry);
                continue;
            };
            let executor = Arc::clone(&self.executor);
            let providers = providers.clone();
            let operation = entry.operation;
            debug!(node = %entry.id, ?operation, "Launching node");
            in_flight.spawn(async move {
                let result = match operation {
                    Operation::Create | Operation::Noop => {
                        executor.create(&node, &providers).await
                    }
                    Operation::Update => executor.update(&node, &providers).await,
                    Operation::Destroy => executor.destroy(&node, &providers).await,
                };
                drop(permit);
                (node.id, result)
            });
            progressed = true;
        }

        *pending = still_waiting;
        progressed
    }
}

/// First node of a kind, by ascending id, or None.
fn find_kind(graph: &ResourceGraph, kind: NodeKind) -> Option<&NodeId> {
    graph.nodes().filter(|n| n.kind == kind).map(|n| &n.id).min()
}
