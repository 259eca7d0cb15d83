//! TOML manifest loading.
//!
//! The manifest declares the desired topology: `[[node]]` tables, `[[grants]]`
//! bulk principal sets and a `[settings]` block for runtime policies. Disabled
//! entries are filtered out here, before graph construction, so a node that
//! still references one fails loudly as an unknown dependency.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use strata_core::{Error, Result};
use strata_graph::{DeletionPolicy, InputValue, NodeKind, ResourceNode, Stage};
use strata_reconciler::{CoordinatorConfig, ExecutorConfig, GrantSet, RecoveryPolicy, WaitPolicy};

/// Runtime policies from the `[settings]` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Cap on concurrently executing nodes.
    pub max_in_flight: usize,
    /// Budget for create-side readiness waits, in seconds.
    pub readiness_timeout_secs: u64,
    /// Cadence of readiness polls, in seconds.
    pub readiness_interval_secs: u64,
    /// Cadence of deletion polls, in seconds.
    pub deletion_poll_secs: u64,
    /// How long a deletion may linger before the forced finalizer clear.
    pub stuck_after_secs: u64,
    /// Re-poll window after the finalizer clear.
    pub verify_window_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_in_flight: 10,
            readiness_timeout_secs: 300,
            readiness_interval_secs: 5,
            deletion_poll_secs: 2,
            stuck_after_secs: 60,
            verify_window_secs: 30,
        }
    }
}

impl Settings {
    /// Lower these settings into the coordinator's config types.
    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            executor: ExecutorConfig {
                readiness: WaitPolicy::new(
                    Duration::from_secs(self.readiness_timeout_secs),
                    Duration::from_secs(self.readiness_interval_secs),
                ),
                recovery: RecoveryPolicy {
                    poll_interval: Duration::from_secs(self.deletion_poll_secs),
                    stuck_after: Duration::from_secs(self.stuck_after_secs),
                    verify_window: Duration::from_secs(self.verify_window_secs),
                },
            },
            max_in_flight: self.max_in_flight,
        }
    }
}

/// One `[[node]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDecl {
    pub id: String,
    pub kind: NodeKind,
    /// Stage override; defaults from the kind.
    #[serde(default)]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Literal values, or `{ ref = "node", output = "attr" }` tables.
    #[serde(default)]
    pub inputs: BTreeMap<String, InputValue>,
    #[serde(default)]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

/// One `[[grants]]` table: identical grants over one target for many
/// principals.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantDecl {
    pub prefix: String,
    pub target: String,
    pub privilege: String,
    pub principals: Vec<String>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

/// A parsed manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeDecl>,
    #[serde(default, rename = "grants")]
    pub grants: Vec<GrantDecl>,
}

impl Manifest {
    /// Load and parse a manifest file.
    ///
    /// # Errors
    ///
    /// [`Error::FileReadFailed`] or [`Error::TomlParseFailed`].
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        let manifest: Self =
            toml::from_str(&raw).map_err(|e| Error::toml_parse_failed(path, e.to_string()))?;
        debug!(
            path = %path.display(),
            nodes = manifest.nodes.len(),
            grant_sets = manifest.grants.len(),
            "Manifest loaded"
        );
        Ok(manifest)
    }

    /// Build the declared resource nodes: enabled `[[node]]` entries plus
    /// the expansion of every enabled `[[grants]]` set.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidManifest`] for blank ids or empty grant sets.
    pub fn resource_nodes(&self) -> Result<Vec<ResourceNode>> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for decl in self.nodes.iter().filter(|d| d.enabled) {
            if decl.id.trim().is_empty() {
                return Err(Error::invalid_manifest("node with blank id"));
            }
            let mut node = ResourceNode::new(decl.id.as_str(), decl.kind);
            if let Some(stage) = decl.stage {
                node = node.with_stage(stage);
            }
            if let Some(policy) = decl.deletion_policy {
                node = node.with_deletion_policy(policy);
            }
            for dep in &decl.depends_on {
                node = node.with_dependency(dep.as_str());
            }
            node.inputs = decl.inputs.clone();
            nodes.push(node);
        }

        for decl in self.grants.iter().filter(|d| d.enabled) {
            if decl.principals.is_empty() {
                return Err(Error::invalid_manifest(format!(
                    "grant set '{}' has no principals",
                    decl.prefix
                )));
            }
            let mut set = GrantSet::new(
                decl.prefix.as_str(),
                decl.target.as_str(),
                decl.privilege.as_str(),
            );
            for principal in &decl.principals {
                set = set.with_principal(principal.as_str());
            }
            nodes.extend(set.expand());
        }

        Ok(nodes)
    }
}
