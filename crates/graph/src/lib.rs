//! Resource graph model and two-stage dependency planner.
//!
//! This crate is the pure half of strata: typed resource nodes, a validated
//! dependency graph, and a deterministic planner that orders nodes, splits
//! them into Infrastructure and Application stage buckets, and diffs against
//! prior state to decide per-node operations.
//!
//! - **Nodes**: [`node::ResourceNode`] with kind, stage, dependencies,
//!   inputs (literals or output references), and deletion policy
//! - **Graph**: [`graph::ResourceGraph`] wrapping petgraph with validation
//! - **Planner**: [`planner::plan`] / [`planner::plan_destroy`] producing an
//!   [`planner::ApplyPlan`]
//!
//! Nothing here touches a backend; planning errors abort before any
//! mutation.

pub mod error;
pub mod graph;
pub mod node;
pub mod planner;

pub use error::{PlanError, PlanResult};
pub use graph::{DependencyKind, ResourceGraph};
pub use node::{
    BackendClass, DeletionPolicy, InputValue, NodeId, NodeKind, NodeStatus, ResourceNode, Stage,
};
pub use planner::{ApplyPlan, Operation, PlannedNode, PriorRecord, PriorState, plan, plan_destroy};
