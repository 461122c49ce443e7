//! Structural page tree shared between the engine adapter and the
//! snapshot resolver.

use serde::{Deserialize, Serialize};

/// Engine-side handle for a live element (CDP backend node id).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// One node of the structural (accessibility-shaped) page tree.
///
/// The tree is produced by the engine's snapshot primitive and consumed by
/// the resolver, which attaches refs to interactable nodes. It carries no
/// refs itself; refs are a resolver concern.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AxNode {
    pub node: NodeId,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Whether the node accepts pointer/keyboard interaction.
    #[serde(default)]
    pub interactable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AxNode>,
}

impl AxNode {
    pub fn new(node: NodeId, role: impl Into<String>) -> Self {
        Self {
            node,
            role: role.into(),
            name: None,
            value: None,
            interactable: false,
            children: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn interactable(mut self) -> Self {
        self.interactable = true;
        self
    }

    pub fn with_children(mut self, children: Vec<AxNode>) -> Self {
        self.children = children;
        self
    }

    /// Depth-first walk over the tree, root included.
    pub fn walk(&self, visit: &mut impl FnMut(&AxNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_visits_every_node() {
        let tree = AxNode::new(NodeId(1), "document").with_children(vec![
            AxNode::new(NodeId(2), "button").with_name("Go").interactable(),
            AxNode::new(NodeId(3), "group")
                .with_children(vec![AxNode::new(NodeId(4), "textbox").interactable()]),
        ]);

        let mut roles = Vec::new();
        tree.walk(&mut |node| roles.push(node.role.clone()));
        assert_eq!(roles, vec!["document", "button", "group", "textbox"]);
        assert_eq!(tree.node_count(), 4);
    }
}
