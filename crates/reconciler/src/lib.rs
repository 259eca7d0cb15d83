//! Convergent reconciliation engine for two-stage resource graphs.
//!
//! This crate turns a validated resource graph plus tracked state into
//! backend calls, Kubernetes-style:
//!
//! - **Desired State**: the [`strata_graph::ResourceGraph`] of declared nodes
//! - **Actual State**: the [`StateStore`] of statuses, applied inputs and
//!   captured outputs
//! - **Plan**: the per-node operations computed by `strata_graph::plan`
//! - **Execute**: bounded-parallel waves of create/update/destroy calls
//!
//! # Two-phase apply
//!
//! Application-stage backends are configured from values the same run
//! creates (cluster endpoint, database host). The [`Coordinator`] breaks
//! the circle: it converges the Infrastructure bucket, resolves every
//! [`ProviderBinding`] from the captured outputs, then converges the
//! Application bucket. A node whose backend's binding stayed unresolved
//! fails with the original resolution error.
//!
//! # Collaborators
//!
//! All side effects flow through the [`backend`] traits (cloud resources,
//! cluster workloads, relational grants, manifest fetches). Tests inject
//! counting fakes; front-ends plug in real clients.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use strata_reconciler::{Backends, Coordinator, CoordinatorConfig, StateStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backends = Backends {
//!         cloud: Arc::new(MyCloudClient::new()),
//!         cluster: Arc::new(MyClusterClient::new()),
//!         grants: Arc::new(MyGrantClient::new()),
//!         manifests: Arc::new(MyFetcher::new()),
//!     };
//!     let state = Arc::new(StateStore::new());
//!     let coordinator = Coordinator::new(backends, state, CoordinatorConfig::default());
//!     // let report = coordinator.apply(&graph).await?;
//! }
//! ```

pub mod backend;
pub mod binding;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod grants;
pub mod state;
pub mod wait;

pub use backend::{
    BackendError, BackendResult, Backends, CloudApi, ClusterApi, GrantApi, ManifestDoc,
    ManifestFetcher, Outputs, ResourcePhase, ResourceState, Spec,
};
pub use binding::{
    BindingSource, BindingState, ClusterConnection, DatabaseConnection, ProviderBinding,
};
pub use coordinator::{AbortHandle, ApplyReport, Coordinator, CoordinatorConfig};
pub use error::{Error, Result};
pub use executor::{Executor, ExecutorConfig, RecoveryPolicy, ResolvedProviders};
pub use grants::GrantSet;
pub use state::{NodeRecord, StateSnapshot, StateStore};
pub use wait::{WaitPolicy, wait_until_ready};
