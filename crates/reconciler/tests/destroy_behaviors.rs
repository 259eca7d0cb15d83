//! Destroy behavior tests
//!
//! Teardown scenarios: reverse ordering, deletion policies, grant
//! revocation and the bounded stuck-deletion recovery ladder.
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use common::FakeBackends;
use strata_graph::{DeletionPolicy, NodeKind, ResourceGraph, ResourceNode};
use strata_reconciler::{Coordinator, CoordinatorConfig, Error, GrantSet, StateStore};

fn coordinator(fakes: &FakeBackends, state: &Arc<StateStore>) -> Coordinator {
    Coordinator::new(
        fakes.backends(),
        Arc::clone(state),
        CoordinatorConfig::default(),
    )
}

fn cluster_with_namespace() -> Vec<ResourceNode> {
    vec![
        ResourceNode::new("cluster", NodeKind::Cluster),
        ResourceNode::new("ns", NodeKind::Namespace).with_dependency("cluster"),
    ]
}

#[tokio::test(start_paused = true)]
async fn given_converged_stack_when_destroyed_then_order_reverses_and_state_empties() {
    let fakes = FakeBackends::new();
    fakes.configure_platform_outputs("cluster", "db");
    let state = Arc::new(StateStore::new());
    let nodes = vec![
        ResourceNode::new("net", NodeKind::Network),
        ResourceNode::new("subnet", NodeKind::Subnet).with_dependency("net"),
        ResourceNode::new("cluster", NodeKind::Cluster).with_dependency("subnet"),
        ResourceNode::new("ns", NodeKind::Namespace).with_dependency("cluster"),
    ];
    let graph = ResourceGraph::from_nodes(nodes).unwrap();
    let coordinator = coordinator(&fakes, &state);

    coordinator.apply(&graph).await.unwrap();
    let report = coordinator.destroy(&graph).await.unwrap();

    assert!(report.converged(), "failures: {:?}", report.failed);
    assert!(state.snapshot().records.is_empty());

    // Workloads go before the infrastructure they run on, dependents before
    // dependencies.
    assert_eq!(fakes.cluster.deletes.lock().unwrap().clone(), vec!["ns"]);
    let cloud_deletes = fakes.cloud.deletes.lock().unwrap().clone();
    assert_eq!(cloud_deletes, vec!["cluster", "subnet", "net"]);
}

#[tokio::test(start_paused = true)]
async fn given_protect_policy_when_destroyed_then_backend_delete_is_never_called() {
    let fakes = FakeBackends::new();
    let state = Arc::new(StateStore::new());
    let nodes = vec![
        ResourceNode::new("net", NodeKind::Network),
        ResourceNode::new("db", NodeKind::DatabaseInstance)
            .with_deletion_policy(DeletionPolicy::Protect),
    ];
    let graph = ResourceGraph::from_nodes(nodes).unwrap();
    let coordinator = coordinator(&fakes, &state);

    coordinator.apply(&graph).await.unwrap();
    let report = coordinator.destroy(&graph).await.unwrap();

    assert_eq!(report.failed.len(), 1);
    assert!(matches!(&report.failed[0].1, Error::ProtectedResource { node_id } if node_id.as_str() == "db"));
    assert_eq!(fakes.cloud.delete_count("db"), 0);
    assert!(state.is_tracked(&"db".into()));
    // The unprotected branch is still torn down.
    assert!(report.succeeded.contains(&"net".into()));
    assert!(!state.is_tracked(&"net".into()));
}

#[tokio::test(start_paused = true)]
async fn given_abandon_policy_when_destroyed_then_untracked_without_backend_call() {
    let fakes = FakeBackends::new();
    let state = Arc::new(StateStore::new());
    let nodes = vec![
        ResourceNode::new("net", NodeKind::Network),
        ResourceNode::new("peering", NodeKind::PeeringConnection)
            .with_dependency("net")
            .with_deletion_policy(DeletionPolicy::Abandon),
    ];
    let graph = ResourceGraph::from_nodes(nodes).unwrap();
    let coordinator = coordinator(&fakes, &state);

    coordinator.apply(&graph).await.unwrap();
    let deletes_after_apply = fakes.cloud.deletes.lock().unwrap().len();
    let report = coordinator.destroy(&graph).await.unwrap();

    assert!(report.converged());
    assert!(!state.is_tracked(&"peering".into()));
    let deletes = fakes.cloud.deletes.lock().unwrap().clone();
    assert_eq!(deletes.len(), deletes_after_apply + 1, "only net is deleted");
    assert_eq!(fakes.cloud.delete_count("peering"), 0);
}

#[tokio::test(start_paused = true)]
async fn given_granted_principal_when_destroyed_then_grant_is_revoked_first() {
    let fakes = FakeBackends::new();
    fakes.configure_platform_outputs("cluster", "db");
    let state = Arc::new(StateStore::new());
    let mut nodes = vec![
        ResourceNode::new("db", NodeKind::DatabaseInstance),
        ResourceNode::new("appdb", NodeKind::Database).with_dependency("db"),
        ResourceNode::new("user-api", NodeKind::DatabaseUser).with_dependency("db"),
    ];
    nodes.extend(
        GrantSet::new("grant-appdb", "appdb", "ALL")
            .with_principal("user-api")
            .expand(),
    );
    let graph = ResourceGraph::from_nodes(nodes).unwrap();
    let coordinator = coordinator(&fakes, &state);

    coordinator.apply(&graph).await.unwrap();
    let report = coordinator.destroy(&graph).await.unwrap();

    assert!(report.converged(), "failures: {:?}", report.failed);
    let revokes = fakes.grants.revokes.lock().unwrap().clone();
    assert_eq!(
        revokes,
        vec![("user-api".to_string(), "appdb".to_string(), "ALL".to_string())]
    );
    assert!(state.snapshot().records.is_empty());
}

#[tokio::test(start_paused = true)]
async fn given_stuck_namespace_when_destroyed_then_exactly_one_finalizer_clear_recovers_it() {
    let fakes = FakeBackends::new();
    fakes.configure_platform_outputs("cluster", "db");
    let state = Arc::new(StateStore::new());
    let graph = ResourceGraph::from_nodes(cluster_with_namespace()).unwrap();
    let coordinator = coordinator(&fakes, &state);

    coordinator.apply(&graph).await.unwrap();
    fakes.cluster.mark_stuck("ns");
    let report = coordinator.destroy(&graph).await.unwrap();

    assert!(report.converged(), "failures: {:?}", report.failed);
    assert_eq!(fakes.cluster.clear_count("ns"), 1);
    assert!(!state.is_tracked(&"ns".into()));
    assert!(!state.is_tracked(&"cluster".into()));
}

#[tokio::test(start_paused = true)]
async fn given_hopelessly_stuck_namespace_when_destroyed_then_stuck_deletion_after_one_clear() {
    let fakes = FakeBackends::new();
    fakes.configure_platform_outputs("cluster", "db");
    let state = Arc::new(StateStore::new());
    let graph = ResourceGraph::from_nodes(cluster_with_namespace()).unwrap();
    let coordinator = coordinator(&fakes, &state);

    coordinator.apply(&graph).await.unwrap();
    fakes.cluster.mark_hopeless("ns");
    let report = coordinator.destroy(&graph).await.unwrap();

    assert!(!report.converged());
    assert!(matches!(&report.failed[0].1, Error::StuckDeletion { node_id, .. } if node_id.as_str() == "ns"));
    assert_eq!(fakes.cluster.clear_count("ns"), 1, "the clear is never repeated");
    // The cluster still hosts the stuck namespace; tearing it down is skipped.
    assert!(
        report
            .skipped
            .iter()
            .any(|(node, root)| node.as_str() == "cluster" && root.as_str() == "ns")
    );
    assert_eq!(fakes.cloud.delete_count("cluster"), 0);
}
