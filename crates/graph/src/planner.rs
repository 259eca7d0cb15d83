//! Dependency resolver and two-stage planner.
//!
//! Orders nodes topologically (Kahn's algorithm, deterministic tie-break by
//! ascending node id), partitions the order into stage buckets, and decides
//! the per-node operation by diffing against prior state. Planning is pure:
//! no backend call happens here, so every error below aborts a run before
//! any mutation.

use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::cmp::Reverse;

use itertools::Itertools;
use petgraph::Direction;
use tracing::debug;

use crate::error::{PlanError, PlanResult};
use crate::graph::ResourceGraph;
use crate::node::{InputValue, NodeId, NodeStatus, Stage};

/// Operation the executor will run for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Node is absent from tracked state (or failed last pass).
    Create,
    /// Node is Ready but its declared inputs changed.
    Update,
    /// Node is Ready and unchanged; re-apply must not touch it.
    Noop,
    /// Node is being removed from desired state.
    Destroy,
}

/// One entry of an apply plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNode {
    pub id: NodeId,
    pub operation: Operation,
}

/// An ordered sequence of planned operations, partitioned by stage.
///
/// Within each bucket every dependency precedes its dependents (the reverse
/// for destroy plans). All Infrastructure entries run before any Application
/// entry; destroy runs the buckets in the opposite order.
#[derive(Debug, Clone, Default)]
pub struct ApplyPlan {
    pub infrastructure: Vec<PlannedNode>,
    pub application: Vec<PlannedNode>,
}

impl ApplyPlan {
    /// Entries for one stage.
    #[must_use]
    pub fn stage(&self, stage: Stage) -> &[PlannedNode] {
        match stage {
            Stage::Infrastructure => &self.infrastructure,
            Stage::Application => &self.application,
        }
    }

    /// All entries in apply order.
    pub fn iter(&self) -> impl Iterator<Item = &PlannedNode> {
        self.infrastructure.iter().chain(self.application.iter())
    }

    /// Total number of planned entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infrastructure.len() + self.application.len()
    }

    /// Whether the plan holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infrastructure.is_empty() && self.application.is_empty()
    }

    /// Number of entries that actually mutate the backend.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.iter()
            .filter(|p| p.operation != Operation::Noop)
            .count()
    }
}

/// What an earlier pass recorded about a node.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorRecord {
    pub status: NodeStatus,
    /// Inputs as they were applied, for update detection.
    pub inputs: BTreeMap<String, InputValue>,
}

/// Prior knowledge keyed by node id, taken from a state-store snapshot.
pub type PriorState = BTreeMap<NodeId, PriorRecord>;

/// Plan an apply pass over the graph.
///
/// # Errors
///
/// - [`PlanError::CycleDetected`] when `depends_on`/input references form a
///   cycle
/// - [`PlanError::UnresolvableReference`] when a node references a node
///   owned by a later stage - the circular provider dependency staging
///   cannot break
pub fn plan(graph: &ResourceGraph, prior: &PriorState) -> PlanResult<ApplyPlan> {
    check_stage_references(graph)?;
    let order = topological_order(graph)?;

    let mut plan = ApplyPlan::default();
    for id in order {
        let Some(node) = graph.node(&id) else {
            continue;
        };
        let operation = match prior.get(&id) {
            Some(record) if record.status == NodeStatus::Ready => {
                if record.inputs == node.inputs {
                    Operation::Noop
                } else {
                    Operation::Update
                }
            }
            // Failed, Destroyed or mid-flight records start over.
            _ => Operation::Create,
        };
        let planned = PlannedNode {
            id: id.clone(),
            operation,
        };
        match node.stage {
            Stage::Infrastructure => plan.infrastructure.push(planned),
            Stage::Application => plan.application.push(planned),
        }
    }

    debug!(
        infrastructure = plan.infrastructure.len(),
        application = plan.application.len(),
        pending = plan.pending(),
        "Apply plan computed"
    );
    Ok(plan)
}

/// Plan a destroy pass: reverse topological order, Application bucket
/// intended to run before Infrastructure. Nodes never recorded (or already
/// Destroyed) have nothing to tear down and are omitted.
///
/// # Errors
///
/// Same planning errors as [`plan`]; a graph that cannot be ordered cannot
/// be safely torn down either.
pub fn plan_destroy(graph: &ResourceGraph, prior: &PriorState) -> PlanResult<ApplyPlan> {
    check_stage_references(graph)?;
    let mut order = topological_order(graph)?;
    order.reverse();

    let mut plan = ApplyPlan::default();
    for id in order {
        let Some(node) = graph.node(&id) else {
            continue;
        };
        match prior.get(&id) {
            None => continue,
            Some(record) if record.status == NodeStatus::Destroyed => continue,
            Some(_) => {}
        }
        let planned = PlannedNode {
            id: id.clone(),
            operation: Operation::Destroy,
        };
        match node.stage {
            Stage::Infrastructure => plan.infrastructure.push(planned),
            Stage::Application => plan.application.push(planned),
        }
    }

    debug!(
        infrastructure = plan.infrastructure.len(),
        application = plan.application.len(),
        "Destroy plan computed"
    );
    Ok(plan)
}

/// Kahn's algorithm with a min-heap of ready node ids, so equal-depth nodes
/// always come out in ascending id order.
fn topological_order(graph: &ResourceGraph) -> PlanResult<Vec<NodeId>> {
    let inner = graph.inner();
    let mut in_degree: HashMap<NodeId, usize> = HashMap::with_capacity(inner.node_count());

    for node in graph.nodes() {
        let count = graph
            .index_of(&node.id)
            .map(|idx| inner.neighbors_directed(idx, Direction::Incoming).count())
            .unwrap_or(0);
        in_degree.insert(node.id.clone(), count);
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| Reverse(id.clone()))
        .collect();

    let mut order = Vec::with_capacity(inner.node_count());
    while let Some(Reverse(id)) = ready.pop() {
        if let Some(index) = graph.index_of(&id) {
            for dependent in inner.neighbors_directed(index, Direction::Outgoing) {
                let Some(dep_id) = inner.node_weight(dependent) else {
                    continue;
                };
                if let Some(degree) = in_degree.get_mut(dep_id) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.push(Reverse(dep_id.clone()));
                    }
                }
            }
        }
        order.push(id);
    }

    if order.len() < inner.node_count() {
        // Everything not sorted sits on or behind a cycle.
        let cycle_members = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id)
            .sorted()
            .collect_vec();
        return Err(PlanError::cycle_detected(cycle_members));
    }

    Ok(order)
}

/// Reject references that point from an earlier stage into a later one.
fn check_stage_references(graph: &ResourceGraph) -> PlanResult<()> {
    for node in graph.nodes() {
        for target_id in node.referenced_nodes() {
            let Some(target) = graph.node(target_id) else {
                // from_nodes already rejected unknown targets
                continue;
            };
            if target.stage > node.stage {
                return Err(PlanError::UnresolvableReference {
                    node: node.id.clone(),
                    node_stage: node.stage,
                    target: target.id.clone(),
                    target_stage: target.stage,
                });
            }
        }
    }
    Ok(())
}
