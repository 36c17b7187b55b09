//! Registry of all configured nodes.

use futures_util::future::join_all;
use tokio::sync::Mutex;

use crate::connection::NodeConnection;
use crate::error::NodeError;

/// All registered nodes, in registration order.
///
/// Registration order matters: load balancing breaks player-count ties
/// in favor of the node registered first.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: Mutex<Vec<NodeConnection>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node. Re-adding a name disconnects the old connection and
    /// keeps the new one in the old registry position.
    pub async fn add(&self, node: NodeConnection) {
        let mut nodes = self.nodes.lock().await;
        match nodes.iter().position(|entry| entry.name() == node.name()) {
            Some(index) => {
                tracing::debug!(
                    node = node.name(),
                    "replacing existing node registration"
                );
                nodes[index].disconnect().await;
                nodes[index] = node;
            }
            None => nodes.push(node),
        }
    }

    /// Removes a node and permanently disconnects it.
    pub async fn remove(&self, name: &str) -> Result<(), NodeError> {
        let node = {
            let mut nodes = self.nodes.lock().await;
            match nodes.iter().position(|entry| entry.name() == name) {
                Some(index) => nodes.remove(index),
                None => return Err(NodeError::UnknownNode(name.into())),
            }
        };
        node.disconnect().await;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<NodeConnection> {
        self.nodes
            .lock()
            .await
            .iter()
            .find(|entry| entry.name() == name)
            .cloned()
    }

    /// Snapshot of every registered node.
    pub async fn all(&self) -> Vec<NodeConnection> {
        self.nodes.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.nodes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.lock().await.is_empty()
    }

    /// The connected node with the fewest players.
    ///
    /// Player counts are fetched concurrently across all online nodes;
    /// ties go to the earliest registered one.
    pub async fn least_used(&self) -> Result<NodeConnection, NodeError> {
        let mut online = Vec::new();
        for node in self.all().await {
            if node.is_online().await {
                online.push(node);
            }
        }
        if online.is_empty() {
            return Err(NodeError::NoNodesOnline);
        }

        let counts =
            join_all(online.iter().map(|node| node.player_count())).await;
        online
            .iter()
            .zip(&counts)
            .min_by_key(|(_, count)| **count)
            .map(|(node, _)| node.clone())
            .ok_or(NodeError::NoNodesOnline)
    }
}

// =========================================================================
// Tests
// =========================================================================
