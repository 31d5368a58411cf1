//! Session id to node mapping.
//!
//! Structural changes (insert on register, removal on sweep) take the write
//! lock; every other access is a read lock held only long enough to clone an
//! `Arc<Node>` out. Per-node state lives in the node's own atomics.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use watchdog_core::SessionId;

use super::node::Node;

#[derive(Debug, Default)]
pub struct Registry {
    nodes: RwLock<HashMap<SessionId, Arc<Node>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node unless the id is already taken. Returns true on insert.
    pub async fn insert(&self, session_id: SessionId, node: Arc<Node>) -> bool {
        let mut nodes = self.nodes.write().await;
        match nodes.entry(session_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(node);
                true
            }
        }
    }

    pub async fn get(&self, session_id: &SessionId) -> Option<Arc<Node>> {
        self.nodes.read().await.get(session_id).cloned()
    }

    /// Removes every node for which `keep` returns false and returns them.
    pub async fn retain<F>(&self, mut keep: F) -> Vec<(SessionId, Arc<Node>)>
    where
        F: FnMut(&SessionId, &Node) -> bool,
    {
        let mut nodes = self.nodes.write().await;
        let doomed: Vec<SessionId> = nodes
            .iter()
            .filter(|(id, node)| !keep(id, node))
            .map(|(id, _)| *id)
            .collect();

        doomed
            .into_iter()
            .filter_map(|id| nodes.remove(&id).map(|node| (id, node)))
            .collect()
    }

    /// Clones out the current entries.
    pub async fn snapshot(&self) -> Vec<(SessionId, Arc<Node>)> {
        self.nodes
            .read()
            .await
            .iter()
            .map(|(id, node)| (*id, Arc::clone(node)))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn node(name: &str) -> Arc<Node> {
        Arc::new(Node::new(name, Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let registry = Registry::new();
        let id = SessionId::new();

        assert!(registry.insert(id, node("a")).await);
        assert_eq!(registry.get(&id).await.map(|n| n.name().to_string()), Some("a".to_string()));
        assert!(registry.get(&SessionId::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_insert_refuses_duplicate_id() {
        let registry = Registry::new();
        let id = SessionId::new();

        assert!(registry.insert(id, node("a")).await);
        assert!(!registry.insert(id, node("b")).await);
        assert_eq!(registry.get(&id).await.map(|n| n.name().to_string()), Some("a".to_string()));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_retain_returns_removed() {
        let registry = Registry::new();
        let keep = SessionId::new();
        let drop_me = SessionId::new();
        registry.insert(keep, node("keep")).await;
        registry.insert(drop_me, node("drop")).await;

        let removed = registry.retain(|_, n| n.name() == "keep").await;

        assert_eq!(removed.len(), 1);
        assert_eq!(removed.first().map(|(id, _)| *id), Some(drop_me));
        assert!(registry.get(&keep).await.is_some());
        assert!(registry.get(&drop_me).await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_and_empty() {
        let registry = Registry::new();
        assert!(registry.is_empty().await);

        registry.insert(SessionId::new(), node("a")).await;
        registry.insert(SessionId::new(), node("b")).await;

        let mut names: Vec<String> = registry
            .snapshot()
            .await
            .into_iter()
            .map(|(_, n)| n.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }
}
