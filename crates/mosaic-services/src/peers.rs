//! Peer directory. The nodes a fan-out targets.

use std::sync::Arc;

use dashmap::DashSet;
use mosaic_core::Node;

/// Known nodes, shared between handlers. A node is its address.
///
/// Populated from configuration; may include the local node, which
/// `peers` always filters out.
#[derive(Clone, Default)]
pub struct PeerDirectory {
    nodes: Arc<DashSet<Node>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let directory = Self::new();
        for node in nodes {
            directory.insert(node);
        }
        directory
    }

    /// Returns true if the node was not already known.
    pub fn insert(&self, node: Node) -> bool {
        self.nodes.insert(node)
    }

    pub fn remove(&self, node: &Node) -> bool {
        self.nodes.remove(node).is_some()
    }

    /// Every known node except `local`, ordered by (host, port).
    pub fn peers(&self, local: &Node) -> Vec<Node> {
        let mut peers: Vec<Node> = self
            .nodes
            .iter()
            .map(|node| node.key().clone())
            .filter(|node| node != local)
            .collect();
        peers.sort();
        peers
    }

    /// Known nodes, including the local one if configured.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
