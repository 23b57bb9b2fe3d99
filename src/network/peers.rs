use serde::{Deserialize, Serialize};

use std::collections::HashSet;

/// Set of known peer addresses (`host:port`).
///
/// Iteration order is unspecified; broadcasts make no ordering promise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerRegistry {
    nodes: HashSet<String>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer, returning false when it was already known
    pub fn add(&mut self, address: impl Into<String>) -> bool {
        self.nodes.insert(address.into())
    }

    /// Removes a peer, returning false when it was not known
    pub fn remove(&mut self, address: &str) -> bool {
        self.nodes.remove(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn list(&self) -> Vec<String> {
        self.nodes.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
