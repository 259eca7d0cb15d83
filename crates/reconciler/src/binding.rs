//! Provider bindings: connection configuration derived from node outputs.
//!
//! The circular dependency this system exists to break - workload backends
//! configured from values that the same run creates - is modeled as an
//! explicit `Unresolved -> Resolved` transition instead of ambient global
//! configuration. The coordinator resolves bindings from the
//! Infrastructure-stage output snapshot and refuses to start any
//! Application-stage node whose backend's binding is still unresolved.

use std::collections::BTreeMap;

use tracing::debug;

use strata_graph::NodeId;

use crate::error::{Error, Result};
use crate::state::StateSnapshot;

/// One source output feeding a binding value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSource {
    pub node: NodeId,
    pub output: String,
}

/// Resolution state of a binding.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingState {
    /// At least one source output does not exist yet.
    Unresolved,
    /// Every source output was captured.
    Resolved(BTreeMap<String, serde_json::Value>),
}

/// A named connection configuration for a class of backend calls.
#[derive(Debug, Clone)]
pub struct ProviderBinding {
    name: String,
    sources: BTreeMap<String, BindingSource>,
    state: BindingState,
}

impl ProviderBinding {
    /// Create an empty, unresolved binding.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: BTreeMap::new(),
            state: BindingState::Unresolved,
        }
    }

    /// Declare that binding value `key` comes from `output` on `node`.
    #[must_use]
    pub fn with_source(
        mut self,
        key: impl Into<String>,
        node: impl Into<NodeId>,
        output: impl Into<String>,
    ) -> Self {
        self.sources.insert(
            key.into(),
            BindingSource {
                node: node.into(),
                output: output.into(),
            },
        );
        self
    }

    /// The cluster-connection binding: endpoint, CA certificate and a
    /// short-lived token, all from the managed cluster's describe outputs.
    pub fn cluster_connection(cluster: &NodeId) -> Self {
        Self::new("cluster-connection")
            .with_source("endpoint", cluster.clone(), "endpoint")
            .with_source("ca_certificate", cluster.clone(), "ca_certificate")
            .with_source("access_token", cluster.clone(), "access_token")
    }

    /// The database-connection binding from the managed instance outputs.
    pub fn database_connection(instance: &NodeId) -> Self {
        Self::new("database-connection")
            .with_source("host", instance.clone(), "connection_name")
            .with_source("admin_user", instance.clone(), "admin_user")
    }

    /// Binding name, for logs and errors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether every source output has been captured.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, BindingState::Resolved(_))
    }

    /// Resolve every source against a state snapshot.
    ///
    /// # Errors
    ///
    /// [`Error::BindingUnresolved`] naming the first missing source; the
    /// binding stays `Unresolved`.
    pub fn resolve(&mut self, snapshot: &StateSnapshot) -> Result<()> {
        let mut values = BTreeMap::new();
        for (key, source) in &self.sources {
            let Some(value) = snapshot.output(&source.node, &source.output) else {
                return Err(Error::binding_unresolved(
                    &self.name,
                    format!("{}.{}", source.node, source.output),
                ));
            };
            values.insert(key.clone(), value.clone());
        }
        debug!(binding = %self.name, values = values.len(), "Provider binding resolved");
        self.state = BindingState::Resolved(values);
        Ok(())
    }

    /// A resolved value by key.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&serde_json::Value> {
        match &self.state {
            BindingState::Resolved(values) => values.get(key),
            BindingState::Unresolved => None,
        }
    }

    fn string_value(&self, key: &str) -> Result<String> {
        self.value(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::binding_unresolved(&self.name, key))
    }

    /// Typed view for cluster workload calls.
    ///
    /// # Errors
    ///
    /// [`Error::BindingUnresolved`] if the binding is unresolved or a value
    /// is not a string.
    pub fn as_cluster_connection(&self) -> Result<ClusterConnection> {
        Ok(ClusterConnection {
            endpoint: self.string_value("endpoint")?,
            ca_certificate: self.string_value("ca_certificate")?,
            access_token: self.string_value("access_token")?,
        })
    }

    /// Typed view for relational grant calls.
    ///
    /// # Errors
    ///
    /// [`Error::BindingUnresolved`] if the binding is unresolved or a value
    /// is not a string.
    pub fn as_database_connection(&self) -> Result<DatabaseConnection> {
        Ok(DatabaseConnection {
            host: self.string_value("host")?,
            admin_user: self.string_value("admin_user")?,
        })
    }
}

/// Resolved credentials for the cluster workload API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConnection {
    pub endpoint: String,
    pub ca_certificate: String,
    pub access_token: String,
}

/// Resolved coordinates for the relational grant interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConnection {
    pub host: String,
    pub admin_user: String,
}
