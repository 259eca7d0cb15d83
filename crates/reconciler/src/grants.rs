//! Bulk grant expansion.
//!
//! A grant set names one target object, one privilege and many principals;
//! expansion turns it into one independent `DatabaseGrant` node per
//! principal. Independence is the point: a revoked or failed grant for one
//! principal never blocks convergence of the others.

use tracing::debug;

use strata_graph::{NodeId, NodeKind, ResourceNode};

/// A declared set of identical grants over one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantSet {
    /// Node-id prefix for the expanded grants.
    pub prefix: String,
    /// Node id of the database object being granted on.
    pub target: NodeId,
    /// Privilege string passed through to the grant interface verbatim.
    pub privilege: String,
    /// Node ids of the principal identities.
    pub principals: Vec<NodeId>,
}

impl GrantSet {
    /// Declare a grant set.
    pub fn new(
        prefix: impl Into<String>,
        target: impl Into<NodeId>,
        privilege: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            target: target.into(),
            privilege: privilege.into(),
            principals: Vec::new(),
        }
    }

    /// Add a principal.
    #[must_use]
    pub fn with_principal(mut self, principal: impl Into<NodeId>) -> Self {
        self.principals.push(principal.into());
        self
    }

    /// Expand into one `DatabaseGrant` node per principal.
    ///
    /// Each node depends on its principal and the target (so both exist
    /// before the grant runs) and resolves `principal`/`target` names from
    /// their outputs; nothing links the expanded nodes to each other.
    #[must_use]
    pub fn expand(&self) -> Vec<ResourceNode> {
        let nodes: Vec<ResourceNode> = self
            .principals
            .iter()
            .map(|principal| {
                let id = format!("{}-{}", self.prefix, principal);
                ResourceNode::new(id, NodeKind::DatabaseGrant)
                    .with_dependency(principal.clone())
                    .with_dependency(self.target.clone())
                    .with_input_ref("principal", principal.clone(), "name")
                    .with_input_ref("target", self.target.clone(), "name")
                    .with_input("privilege", self.privilege.as_str())
            })
            .collect();
        debug!(
            prefix = %self.prefix,
            target = %self.target,
            grants = nodes.len(),
            "Grant set expanded"
        );
        nodes
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use strata_graph::InputValue;

    fn sample_set() -> GrantSet {
        GrantSet::new("grant-appdb", "appdb", "ALL")
            .with_principal("user-api")
            .with_principal("user-worker")
    }

    #[test]
    fn test_one_node_per_principal() {
        let nodes = sample_set().expand();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id.as_str(), "grant-appdb-user-api");
        assert_eq!(nodes[1].id.as_str(), "grant-appdb-user-worker");
        assert!(nodes.iter().all(|n| n.kind == NodeKind::DatabaseGrant));
    }

    #[test]
    fn test_expanded_grants_are_independent_of_each_other() {
        let nodes = sample_set().expand();
        for node in &nodes {
            assert!(node.depends_on.contains(&NodeId::from("appdb")));
            assert!(!node.depends_on.iter().any(|d| d.as_str().starts_with("grant-")));
        }
    }

    #[test]
    fn test_grant_inputs_reference_principal_and_target_names() {
        let nodes = sample_set().expand();
        let api = &nodes[0];
        assert_eq!(
            api.inputs.get("principal"),
            Some(&InputValue::reference("user-api", "name"))
        );
        assert_eq!(
            api.inputs.get("target"),
            Some(&InputValue::reference("appdb", "name"))
        );
        assert_eq!(
            api.inputs.get("privilege"),
            Some(&InputValue::literal("ALL"))
        );
        assert!(api.depends_on.contains(&NodeId::from("user-api")));
    }
}
