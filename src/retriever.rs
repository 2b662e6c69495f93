use crate::chunk::{Chunk, ContentId};
use crate::discovery::{Discovery, PeerQuery};
use crate::error::{DdsError, Result};
use crate::manifest::Manifest;
use crate::network::NetworkService;
use crate::peer::PeerNode;
use crate::storage::StorageBackend;
use std::sync::Arc;
use tracing::debug;

pub trait Retriever: Send + Sync {
    fn fetch_manifest(&self, id: &str) -> Result<Manifest>;

    fn fetch_chunk(&self, id: &str) -> Result<Chunk>;
}

/// Reads straight from a storage backend.
pub struct LocalRetriever {
    storage: Arc<dyn StorageBackend>,
}

impl LocalRetriever {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}

impl Retriever for LocalRetriever {
    fn fetch_manifest(&self, id: &str) -> Result<Manifest> {
        self.storage.get_manifest(id)
    }

    fn fetch_chunk(&self, id: &str) -> Result<Chunk> {
        self.storage.get_chunk(id)
    }
}

/// Asks one designated peer, and checks what it sends back.
///
/// A manifest must carry the requested id and recompute to it; a chunk
/// must hash to the requested id. Anything else is reported as
/// [`DdsError::Corruption`].
pub struct PeerRetriever {
    network: Arc<NetworkService>,
    peer: PeerNode,
}

impl PeerRetriever {
    pub fn new(network: Arc<NetworkService>, peer: PeerNode) -> Self {
        Self { network, peer }
    }

    pub fn peer(&self) -> &PeerNode {
        &self.peer
    }
}

impl Retriever for PeerRetriever {
    fn fetch_manifest(&self, id: &str) -> Result<Manifest> {
        let manifest = self.network.request_manifest(&self.peer, id)?;
        if manifest.id != id || !manifest.verify() {
            return Err(DdsError::Corruption(format!(
                "peer {} sent a manifest that does not match {}",
                self.peer.id, id
            )));
        }
        Ok(manifest)
    }

    fn fetch_chunk(&self, id: &str) -> Result<Chunk> {
        let chunk = self.network.request_chunk(&self.peer, id)?;
        if chunk.id != id || !chunk.verify() {
            return Err(DdsError::Corruption(format!(
                "peer {} sent a chunk that does not hash to {}",
                self.peer.id, id
            )));
        }
        Ok(chunk)
    }
}

/// Tries every peer discovery returns for the target, in order, until one
/// answers.
///
/// Manifests are looked up by their own id. Chunks are usually not
/// advertised individually, so when the retriever is scoped to a manifest
/// the peers advertising that manifest are asked for its chunks.
pub struct NetworkRetriever {
    network: Arc<NetworkService>,
    scope: Option<ContentId>,
}

impl NetworkRetriever {
    pub fn new(network: Arc<NetworkService>) -> Self {
        Self {
            network,
            scope: None,
        }
    }

    pub fn scoped_to(network: Arc<NetworkService>, manifest_id: impl Into<ContentId>) -> Self {
        Self {
            network,
            scope: Some(manifest_id.into()),
        }
    }

    fn first_success<T>(
        &self,
        lookup: &str,
        id: &str,
        fetch: impl Fn(&PeerRetriever) -> Result<T>,
    ) -> Result<T> {
        let candidates = self.network.find_peers(&PeerQuery::advertising(lookup));
        if candidates.is_empty() {
            return Err(DdsError::ContentUnavailable(lookup.to_string()));
        }
        let mut failures = Vec::with_capacity(candidates.len());
        for peer in candidates {
            let source = PeerRetriever::new(self.network.clone(), peer);
            match fetch(&source) {
                Ok(found) => return Ok(found),
                Err(e) => {
                    debug!(peer = %source.peer().id, id = %id, error = %e, "peer request failed");
                    failures.push(format!("{}: {}", source.peer().id, e));
                }
            }
        }
        Err(DdsError::AllPeersFailed {
            id: id.to_string(),
            failures,
        })
    }
}

impl Retriever for NetworkRetriever {
    fn fetch_manifest(&self, id: &str) -> Result<Manifest> {
        self.first_success(id, id, |p| p.fetch_manifest(id))
    }

    fn fetch_chunk(&self, id: &str) -> Result<Chunk> {
        let lookup = self.scope.as_deref().unwrap_or(id);
        self.first_success(lookup, id, |p| p.fetch_chunk(id))
    }
}
