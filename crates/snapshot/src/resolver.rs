use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use toolgate_core_types::{AxNode, GatewayError, GatewayResult, NodeId};

use crate::model::{PageSnapshot, SnapshotNode};

/// Ref tokens look like `s3e7`: generation 3, element 7. The generation is
/// part of the name so the resolver can tell "superseded" apart from
/// "never issued" without keeping dead generations around.
fn format_token(generation: u64, index: u64) -> String {
    format!("s{generation}e{index}")
}

fn parse_token(token: &str) -> Option<(u64, u64)> {
    let rest = token.strip_prefix('s')?;
    let (generation, index) = rest.split_once('e')?;
    Some((generation.parse().ok()?, index.parse().ok()?))
}

#[derive(Default)]
struct RefTable {
    generation: u64,
    entries: HashMap<u64, NodeId>,
}

/// Per-session ref table. Capturing a new snapshot increments the
/// generation and replaces the table; every ref from a prior generation is
/// invalid from that instant.
#[derive(Default)]
pub struct RefStore {
    state: RwLock<RefTable>,
}

impl RefStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Ingest a structural tree: bump the generation, issue refs for every
    /// interactable node (depth-first order) and return the serializable
    /// snapshot.
    pub fn capture(&self, tree: &AxNode) -> PageSnapshot {
        let mut state = self.state.write();
        state.generation += 1;
        state.entries.clear();

        let generation = state.generation;
        let mut next_index = 0u64;
        let snapshot_tree = build_node(tree, generation, &mut next_index, &mut state.entries);
        debug!(generation, refs = next_index, "snapshot captured");

        PageSnapshot {
            generation,
            tree: snapshot_tree,
            ref_count: next_index as usize,
        }
    }

    /// Resolve a ref token into the live node handle it was bound to.
    pub fn resolve(&self, token: &str) -> GatewayResult<NodeId> {
        let (generation, index) =
            parse_token(token).ok_or_else(|| GatewayError::unknown_ref(token))?;
        let state = self.state.read();

        if generation == state.generation {
            state
                .entries
                .get(&index)
                .copied()
                .ok_or_else(|| GatewayError::unknown_ref(token))
        } else if generation < state.generation {
            Err(GatewayError::StaleRef {
                token: token.to_string(),
                generation,
                current: state.generation,
            })
        } else {
            // A generation we never issued.
            Err(GatewayError::unknown_ref(token))
        }
    }

    /// Drop every outstanding ref, e.g. when the owning session closes.
    pub fn invalidate_all(&self) {
        let mut state = self.state.write();
        state.generation += 1;
        state.entries.clear();
    }
}

fn build_node(
    node: &AxNode,
    generation: u64,
    next_index: &mut u64,
    entries: &mut HashMap<u64, NodeId>,
) -> SnapshotNode {
    let ref_token = if node.interactable {
        *next_index += 1;
        entries.insert(*next_index, node.node);
        Some(format_token(generation, *next_index))
    } else {
        None
    };

    SnapshotNode {
        role: node.role.clone(),
        name: node.name.clone(),
        value: node.value.clone(),
        ref_token,
        children: node
            .children
            .iter()
            .map(|child| build_node(child, generation, next_index, entries))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> AxNode {
        AxNode::new(NodeId(10), "RootWebArea").with_children(vec![
            AxNode::new(NodeId(20), "button").with_name("Go").interactable(),
            AxNode::new(NodeId(30), "group").with_children(vec![
                AxNode::new(NodeId(40), "textbox").with_name("Query").interactable(),
            ]),
        ])
    }

    #[test]
    fn capture_issues_refs_for_interactable_nodes_only() {
        let store = RefStore::new();
        let snapshot = store.capture(&sample_tree());

        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.ref_count, 2);
        assert!(snapshot.tree.ref_token.is_none());
        assert_eq!(snapshot.tree.children[0].ref_token.as_deref(), Some("s1e1"));
        assert_eq!(
            snapshot.tree.children[1].children[0].ref_token.as_deref(),
            Some("s1e2")
        );
    }

    #[test]
    fn refs_resolve_until_the_next_capture() {
        let store = RefStore::new();
        let first = store.capture(&sample_tree());
        let token = first.tree.children[0].ref_token.clone().unwrap();

        assert_eq!(store.resolve(&token).unwrap(), NodeId(20));

        let second = store.capture(&sample_tree());
        assert_eq!(second.generation, 2);

        match store.resolve(&token).unwrap_err() {
            GatewayError::StaleRef {
                generation,
                current,
                ..
            } => {
                assert_eq!(generation, 1);
                assert_eq!(current, 2);
            }
            other => panic!("expected stale ref, got {other:?}"),
        }

        // Refs from the new generation work.
        let fresh = second.tree.children[0].ref_token.clone().unwrap();
        assert_eq!(store.resolve(&fresh).unwrap(), NodeId(20));
    }

    #[test]
    fn unknown_refs_fail_distinctly() {
        let store = RefStore::new();
        store.capture(&sample_tree());

        // Never-issued index in the current generation.
        assert_eq!(store.resolve("s1e99").unwrap_err().kind(), "unknown_ref");
        // Generation from the future.
        assert_eq!(store.resolve("s9e1").unwrap_err().kind(), "unknown_ref");
        // Garbage tokens.
        assert_eq!(store.resolve("e1s1").unwrap_err().kind(), "unknown_ref");
        assert_eq!(store.resolve("").unwrap_err().kind(), "unknown_ref");
    }

    #[test]
    fn invalidate_all_supersedes_outstanding_refs() {
        let store = RefStore::new();
        let snapshot = store.capture(&sample_tree());
        let token = snapshot.tree.children[0].ref_token.clone().unwrap();

        store.invalidate_all();
        assert_eq!(store.resolve(&token).unwrap_err().kind(), "stale_ref");
    }

    #[test]
    fn generations_strictly_increase() {
        let store = RefStore::new();
        let tree = sample_tree();
        let g1 = store.capture(&tree).generation;
        store.invalidate_all();
        let g2 = store.capture(&tree).generation;
        assert_eq!(g2, g1 + 2);
    }
}
