//! Id-keyed node collection with an "already scanned" flag

use std::sync::Arc;
use tracing::debug;

pub(crate) trait Identified {
    fn node_id(&self) -> u32;
    fn node_name(&self) -> &str;
}

/// Insertion-ordered nodes, unique by id
pub(crate) struct Collection<T> {
    items: Vec<Arc<T>>,
    initialized: bool,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            initialized: false,
        }
    }
}

impl<T: Identified> Collection<T> {
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Mark scanned. Returns false if it already was.
    pub fn begin_scan(&mut self) -> bool {
        !std::mem::replace(&mut self.initialized, true)
    }

    pub fn find(&self, id: u32) -> Option<Arc<T>> {
        self.items.iter().find(|n| n.node_id() == id).cloned()
    }

    /// Add `node` unless a node with the same id is already present, in
    /// which case the new one is dropped and the existing one returned.
    pub fn insert(&mut self, node: Arc<T>) -> Arc<T> {
        if let Some(existing) = self.find(node.node_id()) {
            debug!(name = %node.node_name(), "duplicate discovered, keeping existing node");
            return existing;
        }
        self.items.push(Arc::clone(&node));
        node
    }

    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Drop every node and forget that the collection was scanned
    pub fn reset(&mut self) {
        self.items.clear();
        self.initialized = false;
    }
}
