use crate::chunk::{Chunk, ContentId};
use crate::discovery::{AdvertisesContent, Discovery, PeerQuery, SelectionPolicy};
use crate::error::{DdsError, Result};
use crate::manifest::Manifest;
use crate::peer::PeerNode;
use crate::storage::StorageBackend;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Manifest,
    Chunk,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Manifest => write!(f, "manifest"),
            RequestKind::Chunk => write!(f, "chunk"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Manifest(Manifest),
    Chunk(Chunk),
}

/// Carries manifest and chunk requests to a peer.
///
/// Calls are synchronous. A real binding should bound each call with a
/// deadline and report expiry as [`DdsError::Transport`], which callers
/// treat like any other unreachable peer.
pub trait Transport: Send + Sync {
    fn request(&self, peer: &PeerNode, kind: RequestKind, id: &str) -> Result<Response>;
}

type Handler = dyn Fn(&str, RequestKind, &str) -> Result<Response> + Send + Sync;

/// Transport answered by a caller-supplied function of
/// `(peer id, request kind, content id)`.
pub struct HandlerTransport {
    handler: Box<Handler>,
}

impl HandlerTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, RequestKind, &str) -> Result<Response> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
        }
    }

    /// A transport that answers nothing.
    pub fn unhandled() -> Self {
        Self::new(|peer, kind, id| Err(unhandled(peer, kind, id)))
    }
}

impl Transport for HandlerTransport {
    fn request(&self, peer: &PeerNode, kind: RequestKind, id: &str) -> Result<Response> {
        (self.handler)(&peer.id, kind, id)
    }
}

/// Build the error for a `(peer, kind, id)` nobody answers.
pub fn unhandled(peer: &str, kind: RequestKind, id: &str) -> DdsError {
    DdsError::UnhandledRequest {
        peer: peer.to_string(),
        kind: kind.to_string(),
        id: id.to_string(),
    }
}

/// In-process transport that serves each registered peer from its own store.
#[derive(Default)]
pub struct PeerStoreTransport {
    stores: RwLock<HashMap<String, Arc<dyn StorageBackend>>>,
}

impl PeerStoreTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, peer_id: impl Into<String>, store: Arc<dyn StorageBackend>) {
        self.stores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer_id.into(), store);
    }

    /// Make a peer unreachable.
    pub fn disconnect(&self, peer_id: &str) {
        self.stores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(peer_id);
    }
}

impl Transport for PeerStoreTransport {
    fn request(&self, peer: &PeerNode, kind: RequestKind, id: &str) -> Result<Response> {
        let store = self
            .stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&peer.id)
            .cloned()
            .ok_or_else(|| DdsError::Transport {
                peer: peer.id.clone(),
                reason: "peer unreachable".into(),
            })?;
        match kind {
            RequestKind::Manifest => store.get_manifest(id).map(Response::Manifest),
            RequestKind::Chunk => store.get_chunk(id).map(Response::Chunk),
        }
    }
}

/// Network state owned by one node.
///
/// The local node's advertised content is only ever changed through
/// [`NetworkService::advertise`]; peers in the view are cached copies.
pub struct NetworkService {
    local: RwLock<PeerNode>,
    peers: RwLock<BTreeMap<String, PeerNode>>,
    transport: Arc<dyn Transport>,
    policy: Box<dyn SelectionPolicy>,
}

impl NetworkService {
    pub fn new(local: PeerNode, transport: Arc<dyn Transport>) -> Self {
        Self::with_policy(local, transport, Box::new(AdvertisesContent))
    }

    pub fn with_policy(
        local: PeerNode,
        transport: Arc<dyn Transport>,
        policy: Box<dyn SelectionPolicy>,
    ) -> Self {
        Self {
            local: RwLock::new(local),
            peers: RwLock::new(BTreeMap::new()),
            transport,
            policy,
        }
    }

    /// Snapshot of the local node, including what it advertises.
    pub fn local_node(&self) -> PeerNode {
        self.local
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register `id` as served by the local node.
    pub fn advertise(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(DdsError::MalformedInput(
                "cannot advertise an empty content id".into(),
            ));
        }
        let mut local = self.local.write().unwrap_or_else(PoisonError::into_inner);
        if local.add_advertised_content(id) {
            info!(node = %local.id, content_id = %id, "advertised content");
        }
        Ok(())
    }

    /// Seed or refresh the cached view of a peer.
    pub fn add_peer_to_network_view(&self, peer: PeerNode) -> Result<()> {
        if peer.id.is_empty() {
            return Err(DdsError::MalformedInput("peer id is empty".into()));
        }
        if peer.id == self.local_node().id {
            return Err(DdsError::MalformedInput(format!(
                "peer {} is the local node",
                peer.id
            )));
        }
        debug!(peer = %peer.id, advertised = peer.advertised_content.len(), "peer view updated");
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer.id.clone(), peer);
        Ok(())
    }

    pub fn known_peers(&self) -> Vec<PeerNode> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn request_manifest(&self, peer: &PeerNode, id: &str) -> Result<Manifest> {
        match self.transport.request(peer, RequestKind::Manifest, id)? {
            Response::Manifest(m) => Ok(m),
            Response::Chunk(_) => Err(DdsError::Transport {
                peer: peer.id.clone(),
                reason: format!("answered manifest request {} with a chunk", id),
            }),
        }
    }

    pub fn request_chunk(&self, peer: &PeerNode, id: &str) -> Result<Chunk> {
        match self.transport.request(peer, RequestKind::Chunk, id)? {
            Response::Chunk(c) => Ok(c),
            Response::Manifest(_) => Err(DdsError::Transport {
                peer: peer.id.clone(),
                reason: format!("answered chunk request {} with a manifest", id),
            }),
        }
    }

    /// Peers advertising `id`, in priority order.
    pub fn providers(&self, id: &ContentId) -> Vec<PeerNode> {
        self.find_peers(&PeerQuery::advertising(id.clone()))
    }
}

impl Discovery for NetworkService {
    fn find_peers(&self, query: &PeerQuery) -> Vec<PeerNode> {
        let peers = self.known_peers();
        self.policy.select(&peers, query)
    }
}
