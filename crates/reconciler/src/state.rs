//! Tracked state: the only shared mutable resource of an apply run.
//!
//! The store maps node id to a record of status, inputs-as-applied and
//! observed outputs. Writes go through per-node locks (never a global one);
//! the outer map lock is held only for insert/remove. Readers take a
//! [`StateSnapshot`], a consistent copy, instead of watching live
//! mutations mid-pass.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use strata_graph::{InputValue, NodeId, NodeStatus, PriorRecord, PriorState};

/// Observed output attributes of a resource.
pub type Outputs = BTreeMap<String, serde_json::Value>;

/// What the store knows about one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub status: NodeStatus,
    /// Inputs exactly as they were applied, for update detection.
    #[serde(default)]
    pub inputs: BTreeMap<String, InputValue>,
    /// Outputs captured from the backend; immutable once observed by
    /// dependents within the same pass.
    #[serde(default)]
    pub outputs: Outputs,
}

/// Immutable, consistent copy of the store at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub records: BTreeMap<NodeId, NodeRecord>,
}

impl StateSnapshot {
    /// Look up one output attribute of a node.
    #[must_use]
    pub fn output(&self, node: &NodeId, name: &str) -> Option<&serde_json::Value> {
        self.records.get(node).and_then(|r| r.outputs.get(name))
    }

    /// Status of a node, if tracked.
    #[must_use]
    pub fn status(&self, node: &NodeId) -> Option<NodeStatus> {
        self.records.get(node).map(|r| r.status)
    }

    /// Whether a node is tracked as Ready.
    #[must_use]
    pub fn is_ready(&self, node: &NodeId) -> bool {
        self.status(node) == Some(NodeStatus::Ready)
    }

    /// View for the planner's diffing.
    #[must_use]
    pub fn prior_state(&self) -> PriorState {
        self.records
            .iter()
            .map(|(id, record)| {
                (
                    id.clone(),
                    PriorRecord {
                        status: record.status,
                        inputs: record.inputs.clone(),
                    },
                )
            })
            .collect()
    }
}

/// Shared state store for one apply run. Single writer per run; bounded
/// worker tasks touch disjoint node records.
#[derive(Debug, Default)]
pub struct StateStore {
    records: RwLock<HashMap<NodeId, Arc<Mutex<NodeRecord>>>>,
}

impl StateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate a store from a persisted snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        let records = snapshot
            .records
            .into_iter()
            .map(|(id, record)| (id, Arc::new(Mutex::new(record))))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Take a consistent copy of every record.
    pub fn snapshot(&self) -> StateSnapshot {
        let map = match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let records = map
            .iter()
            .map(|(id, record)| {
                let record = match record.lock() {
                    Ok(guard) => guard.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                };
                (id.clone(), record)
            })
            .collect();
        StateSnapshot { records }
    }

    /// Current status of a node, if tracked.
    pub fn status(&self, id: &NodeId) -> Option<NodeStatus> {
        self.with_record(id, |record| record.status)
    }

    /// Whether the store tracks this node at all.
    pub fn is_tracked(&self, id: &NodeId) -> bool {
        let map = match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.contains_key(id)
    }

    /// Set a node's status, creating the record if needed.
    pub fn set_status(&self, id: &NodeId, status: NodeStatus) {
        let record = self.entry(id);
        let mut guard = match record.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.status = status;
    }

    /// Record a successful create/update: inputs as applied, outputs as
    /// observed, status Ready.
    pub fn record_applied(
        &self,
        id: &NodeId,
        inputs: BTreeMap<String, InputValue>,
        outputs: Outputs,
    ) {
        let record = self.entry(id);
        let mut guard = match record.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.status = NodeStatus::Ready;
        guard.inputs = inputs;
        guard.outputs = outputs;
    }

    /// Drop a node from tracked state (after Destroyed, or for Abandon).
    pub fn remove(&self, id: &NodeId) {
        let mut map = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.remove(id);
    }

    fn entry(&self, id: &NodeId) -> Arc<Mutex<NodeRecord>> {
        {
            let map = match self.records.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(record) = map.get(id) {
                return Arc::clone(record);
            }
        }
        let mut map = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(map.entry(id.clone()).or_default())
    }

    fn with_record<T>(&self, id: &NodeId, f: impl FnOnce(&NodeRecord) -> T) -> Option<T> {
        let map = match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let record = map.get(id)?;
        let guard = match record.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Some(f(&guard))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use strata_graph::InputValue;

    #[test]
    fn test_record_applied_sets_ready_and_outputs() {
        let store = StateStore::new();
        let id = NodeId::from("net");
        let outputs: Outputs = [("self_link".to_string(), "projects/x/net".into())]
            .into_iter()
            .collect();

        store.record_applied(&id, BTreeMap::new(), outputs);

        assert_eq!(store.status(&id), Some(NodeStatus::Ready));
        let snapshot = store.snapshot();
        assert_eq!(
            snapshot.output(&id, "self_link"),
            Some(&serde_json::Value::from("projects/x/net"))
        );
    }

    #[test]
    fn test_remove_untracks_node() {
        let store = StateStore::new();
        let id = NodeId::from("ns");
        store.set_status(&id, NodeStatus::Destroyed);
        store.remove(&id);
        assert!(!store.is_tracked(&id));
        assert_eq!(store.status(&id), None);
    }

    #[test]
    fn test_snapshot_is_a_copy_not_a_view() {
        let store = StateStore::new();
        let id = NodeId::from("net");
        store.set_status(&id, NodeStatus::Creating);

        let snapshot = store.snapshot();
        store.set_status(&id, NodeStatus::Ready);

        assert_eq!(snapshot.status(&id), Some(NodeStatus::Creating));
        assert_eq!(store.status(&id), Some(NodeStatus::Ready));
    }

    #[test]
    fn test_snapshot_round_trips_through_serde() {
        let store = StateStore::new();
        let id = NodeId::from("db");
        let inputs: BTreeMap<String, InputValue> =
            [("tier".to_string(), InputValue::literal("db-custom-2"))]
                .into_iter()
                .collect();
        store.record_applied(&id, inputs, Outputs::new());

        let json = serde_json::to_string(&store.snapshot()).unwrap();
        let restored: StateSnapshot = serde_json::from_str(&json).unwrap();
        let rehydrated = StateStore::from_snapshot(restored);

        assert_eq!(rehydrated.status(&id), Some(NodeStatus::Ready));
    }

    #[test]
    fn test_prior_state_view_carries_status_and_inputs() {
        let store = StateStore::new();
        let id = NodeId::from("net");
        let inputs: BTreeMap<String, InputValue> =
            [("cidr".to_string(), InputValue::literal("10.0.0.0/16"))]
                .into_iter()
                .collect();
        store.record_applied(&id, inputs.clone(), Outputs::new());

        let prior = store.snapshot().prior_state();
        let record = prior.get(&id).unwrap();
        assert_eq!(record.status, NodeStatus::Ready);
        assert_eq!(record.inputs, inputs);
    }
}
