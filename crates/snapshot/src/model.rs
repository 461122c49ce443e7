use serde::{Deserialize, Serialize};

/// One node of the caller-facing snapshot tree. Interactable nodes carry
/// the ref token that addresses them for the lifetime of this generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub ref_token: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SnapshotNode>,
}

/// Result of one snapshot capture.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub generation: u64,
    pub tree: SnapshotNode,
    /// Number of refs issued under this generation.
    pub ref_count: usize,
}
