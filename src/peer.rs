use crate::chunk::ContentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A node in the storage network, as seen by itself or by its peers.
///
/// A node owns its own `advertised_content`; copies held by other nodes are
/// cached views that may lag behind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerNode {
    pub id: String,
    /// Network-reachable endpoint, opaque to the core.
    pub address: String,
    /// Selection priority; higher is preferred.
    pub weight: f64,
    pub advertised_content: BTreeSet<ContentId>,
}

impl PeerNode {
    pub fn new(id: impl Into<String>, address: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            weight,
            advertised_content: BTreeSet::new(),
        }
    }

    /// Record that this node serves `id`. Returns `false` if it already did.
    ///
    /// Advertisement only grows; content is never withdrawn.
    pub fn add_advertised_content(&mut self, id: impl Into<ContentId>) -> bool {
        self.advertised_content.insert(id.into())
    }

    pub fn advertises(&self, id: &str) -> bool {
        self.advertised_content.contains(id)
    }
}
