//! CLI behavior tests
//!
//! Manifest-to-state round trips through the simulated backends: apply,
//! idempotent re-apply, destroy, and state-file persistence.
#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use strata::{commands, state_file};
use strata_graph::NodeStatus;
use strata_reconciler::{StateStore, Outputs};

const MANIFEST: &str = r#"
[settings]
max_in_flight = 4

[[node]]
id = "net"
kind = "network"
[node.inputs]
cidr = "10.0.0.0/16"

[[node]]
id = "subnet"
kind = "subnet"
depends_on = ["net"]
[node.inputs]
network = { ref = "net", output = "self_link" }

[[node]]
id = "db"
kind = "database-instance"
depends_on = ["subnet"]

[[node]]
id = "cluster"
kind = "cluster"
depends_on = ["subnet"]

[[node]]
id = "appdb"
kind = "database"
depends_on = ["db"]

[[node]]
id = "user-api"
kind = "database-user"
depends_on = ["db"]

[[node]]
id = "ns"
kind = "namespace"
depends_on = ["cluster"]

[[grants]]
prefix = "grant-appdb"
target = "appdb"
privilege = "ALL"
principals = ["user-api"]
"#;

fn write_manifest(dir: &tempfile::TempDir) -> (PathBuf, PathBuf) {
    let manifest = dir.path().join("strata.toml");
    fs::write(&manifest, MANIFEST).unwrap();
    (manifest, dir.path().join("strata.state.json"))
}

#[tokio::test]
async fn given_manifest_when_applied_then_state_file_tracks_every_node_ready() {
    let dir = tempfile::tempdir().unwrap();
    let (manifest, state) = write_manifest(&dir);

    let report = commands::apply(&manifest, &state, None).await.unwrap();

    assert!(report.converged(), "failures: {:?}", report.failed);
    assert_eq!(report.succeeded.len(), 8);

    let snapshot = state_file::load(&state).unwrap();
    assert_eq!(snapshot.records.len(), 8);
    assert!(
        snapshot
            .records
            .values()
            .all(|r| r.status == NodeStatus::Ready)
    );
    // Binding sources came out of the simulated cluster create.
    assert!(snapshot.output(&"cluster".into(), "endpoint").is_some());
}

#[tokio::test]
async fn given_converged_state_file_when_reapplied_then_everything_is_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let (manifest, state) = write_manifest(&dir);

    commands::apply(&manifest, &state, None).await.unwrap();
    let report = commands::apply(&manifest, &state, None).await.unwrap();

    assert!(report.converged());
    assert!(report.succeeded.is_empty());
    assert_eq!(report.unchanged.len(), 8);
}

#[tokio::test]
async fn given_converged_state_file_when_destroyed_then_state_file_empties() {
    let dir = tempfile::tempdir().unwrap();
    let (manifest, state) = write_manifest(&dir);

    commands::apply(&manifest, &state, None).await.unwrap();
    let report = commands::destroy(&manifest, &state).await.unwrap();

    assert!(report.converged(), "failures: {:?}", report.failed);
    let snapshot = state_file::load(&state).unwrap();
    assert!(snapshot.records.is_empty());
}

#[test]
fn given_saved_snapshot_when_loaded_then_records_survive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let store = StateStore::new();
    let outputs: Outputs = [("self_link".to_string(), "local/network/net".into())]
        .into_iter()
        .collect();
    store.record_applied(&"net".into(), BTreeMap::new(), outputs);
    state_file::save(&path, &store.snapshot()).unwrap();

    let loaded = state_file::load(&path).unwrap();
    assert_eq!(loaded.status(&"net".into()), Some(NodeStatus::Ready));
    assert_eq!(
        loaded.output(&"net".into(), "self_link"),
        Some(&serde_json::Value::from("local/network/net"))
    );
}

#[test]
fn given_missing_state_file_when_loaded_then_state_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = state_file::load(&dir.path().join("absent.json")).unwrap();
    assert!(snapshot.records.is_empty());
}
