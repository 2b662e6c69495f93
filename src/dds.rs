use crate::chunk::{Chunk, ContentId};
use crate::chunker::{reassemble, Chunker};
use crate::error::{DdsError, Result};
use crate::manifest::Manifest;
use crate::network::NetworkService;
use crate::originator::{NetworkOriginator, Originator};
use crate::retriever::{LocalRetriever, PeerRetriever, Retriever};
use crate::storage::StorageBackend;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The storage service one node exposes to its collaborators.
pub struct DdsService {
    chunker: Chunker,
    storage: Arc<dyn StorageBackend>,
    network: Arc<NetworkService>,
    originator: Box<dyn Originator>,
    cache_retrieved: bool,
}

impl DdsService {
    pub fn new(
        chunker: Chunker,
        storage: Arc<dyn StorageBackend>,
        network: Arc<NetworkService>,
    ) -> Self {
        let originator = Box::new(NetworkOriginator::new(network.clone()));
        Self {
            chunker,
            storage,
            network,
            originator,
            cache_retrieved: true,
        }
    }

    pub fn with_originator(mut self, originator: Box<dyn Originator>) -> Self {
        self.originator = originator;
        self
    }

    /// Whether content fetched from peers is written to local storage.
    pub fn with_cache_retrieved(mut self, enabled: bool) -> Self {
        self.cache_retrieved = enabled;
        self
    }

    pub fn network(&self) -> &Arc<NetworkService> {
        &self.network
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Store `data` locally, advertise it, and return its manifest id.
    pub fn publish(&self, data: &[u8]) -> Result<ContentId> {
        self.publish_with_content_type(data, None)
    }

    /// Like [`publish`](Self::publish), folding a content type into the id.
    ///
    /// Chunks are written first and the manifest last, so the manifest is
    /// never visible before everything it references. If advertising fails
    /// the content stays stored and usable locally; the error carries its id.
    pub fn publish_with_content_type(
        &self,
        data: &[u8],
        content_type: Option<String>,
    ) -> Result<ContentId> {
        let chunks = self.chunker.chunk_content(data);
        let manifest = self
            .chunker
            .generate_manifest(&chunks, data, content_type)?;

        for chunk in &chunks {
            self.storage.store_chunk(chunk)?;
        }
        self.storage.store_manifest(&manifest)?;
        debug!(
            content_id = %manifest.id,
            chunks = chunks.len(),
            size = data.len(),
            "stored content"
        );

        if let Err(e) = self.originator.advertise_content(&manifest.id) {
            warn!(content_id = %manifest.id, error = %e, "content stored but not advertised");
            return Err(DdsError::Advertise {
                content_id: manifest.id,
                reason: e.to_string(),
            });
        }
        info!(content_id = %manifest.id, size = data.len(), "published content");
        Ok(manifest.id)
    }

    /// Reconstruct the content named by `id`.
    ///
    /// A local manifest is served entirely from local storage. Otherwise
    /// each peer advertising `id` is tried in priority order; a peer must
    /// supply the manifest and every chunk itself, and any failure moves on
    /// to the next peer.
    pub fn retrieve(&self, id: &str) -> Result<Vec<u8>> {
        if id.is_empty() {
            return Err(DdsError::MalformedInput("content id is empty".into()));
        }

        let local = LocalRetriever::new(self.storage.clone());
        match local.fetch_manifest(id) {
            Ok(manifest) => {
                debug!(content_id = %id, "serving content from local storage");
                let chunks = fetch_all(&local, &manifest)?;
                return reassemble(&manifest, &chunks);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let candidates = self.network.providers(&id.to_string());
        if candidates.is_empty() {
            return Err(DdsError::ContentUnavailable(id.to_string()));
        }
        info!(content_id = %id, candidates = candidates.len(), "content not local, asking peers");

        let mut failures = Vec::with_capacity(candidates.len());
        for peer in candidates {
            let source = PeerRetriever::new(self.network.clone(), peer);
            match self.retrieve_from(&source, id) {
                Ok(data) => return Ok(data),
                Err(e) => {
                    warn!(
                        peer = %source.peer().id,
                        content_id = %id,
                        error = %e,
                        "peer could not supply content"
                    );
                    failures.push(format!("{}: {}", source.peer().id, e));
                }
            }
        }
        Err(DdsError::AllPeersFailed {
            id: id.to_string(),
            failures,
        })
    }

    fn retrieve_from(&self, source: &PeerRetriever, id: &str) -> Result<Vec<u8>> {
        let manifest = source.fetch_manifest(id)?;
        let chunks = fetch_all(source, &manifest)?;
        let data = reassemble(&manifest, &chunks)?;
        if self.cache_retrieved {
            if let Err(e) = self.cache(&manifest, &chunks) {
                warn!(content_id = %id, error = %e, "retrieved content not cached");
            }
        }
        info!(
            content_id = %id,
            peer = %source.peer().id,
            size = data.len(),
            "retrieved content from peer"
        );
        Ok(data)
    }

    fn cache(&self, manifest: &Manifest, chunks: &[Chunk]) -> Result<()> {
        for chunk in chunks {
            self.storage.store_chunk(chunk)?;
        }
        self.storage.store_manifest(manifest)
    }
}

/// Fetch every chunk of `manifest`, in manifest order.
fn fetch_all(source: &dyn Retriever, manifest: &Manifest) -> Result<Vec<Chunk>> {
    manifest
        .chunk_ids
        .iter()
        .map(|id| source.fetch_chunk(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{unhandled, HandlerTransport, PeerStoreTransport, Response};
    use crate::peer::PeerNode;
    use crate::storage::MemoryStorage;

    const POST: &[u8] = b"This is my first decentralized post...";

    struct Node {
        service: DdsService,
        storage: Arc<MemoryStorage>,
    }

    fn node(id: &str, weight: f64, transport: Arc<dyn crate::network::Transport>) -> Node {
        let storage = Arc::new(MemoryStorage::new());
        let network = Arc::new(NetworkService::new(
            PeerNode::new(id, format!("{}.local:7400", id), weight),
            transport,
        ));
        let service = DdsService::new(Chunker::new(10).unwrap(), storage.clone(), network);
        Node { service, storage }
    }

    /// Two nodes reachable through one in-process transport.
    fn pair() -> (Node, Node) {
        let transport = Arc::new(PeerStoreTransport::new());
        let a = node("a", 1.0, transport.clone());
        let b = node("b", 1.0, transport.clone());
        transport.register("a", a.storage.clone());
        transport.register("b", b.storage.clone());
        (a, b)
    }

    fn introduce(to: &Node, from: &Node) {
        to.service
            .network()
            .add_peer_to_network_view(from.service.network().local_node())
            .unwrap();
    }

    #[test]
    fn publish_then_retrieve_locally() {
        let transport = Arc::new(HandlerTransport::unhandled());
        let n = node("solo", 1.0, transport);
        let id = n.service.publish(POST).unwrap();
        assert_eq!(n.service.retrieve(&id).unwrap(), POST);
        assert_eq!(n.storage.chunk_count(), POST.len().div_ceil(10));
        assert!(n.service.network().local_node().advertises(&id));
    }

    #[test]
    fn empty_content_round_trips() {
        let n = node("solo", 1.0, Arc::new(HandlerTransport::unhandled()));
        let id = n.service.publish(b"").unwrap();
        assert!(n.service.retrieve(&id).unwrap().is_empty());
    }

    #[test]
    fn same_bytes_same_id_across_nodes() {
        let (a, b) = pair();
        assert_eq!(a.service.publish(POST).unwrap(), b.service.publish(POST).unwrap());
    }

    #[test]
    fn falls_back_to_peer_and_caches() {
        let (a, b) = pair();
        let id = a.service.publish(POST).unwrap();
        introduce(&b, &a);

        assert_eq!(b.storage.manifest_count(), 0);
        assert_eq!(b.service.retrieve(&id).unwrap(), POST);
        assert!(b.storage.has_manifest(&id));
        // Cached content is not re-advertised.
        assert!(!b.service.network().local_node().advertises(&id));
    }

    #[test]
    fn caching_can_be_disabled() {
        let transport = Arc::new(PeerStoreTransport::new());
        let a = node("a", 1.0, transport.clone());
        let b = node("b", 1.0, transport.clone());
        transport.register("a", a.storage.clone());
        let b = Node {
            service: b.service.with_cache_retrieved(false),
            storage: b.storage,
        };
        let id = a.service.publish(POST).unwrap();
        introduce(&b, &a);

        assert_eq!(b.service.retrieve(&id).unwrap(), POST);
        assert_eq!(b.storage.manifest_count(), 0);
    }

    #[test]
    fn unknown_content_is_unavailable() {
        let (_a, b) = pair();
        let err = b.service.retrieve(&crate::chunk::compute_hash(b"nobody")).unwrap_err();
        assert!(matches!(err, DdsError::ContentUnavailable(_)));
        assert!(err.is_not_found());
    }

    #[test]
    fn partial_peer_is_skipped_for_complete_one() {
        let transport = Arc::new(PeerStoreTransport::new());
        let full = node("full", 1.0, transport.clone());
        let partial = node("partial", 5.0, transport.clone());
        let reader = node("reader", 1.0, transport.clone());
        transport.register("full", full.storage.clone());
        transport.register("partial", partial.storage.clone());

        let id = full.service.publish(POST).unwrap();
        // The heavier peer claims the content but only holds the manifest.
        let manifest = full.storage.get_manifest(&id).unwrap();
        partial.storage.store_manifest(&manifest).unwrap();
        partial.service.network().advertise(&id).unwrap();

        introduce(&reader, &full);
        introduce(&reader, &partial);
        assert_eq!(reader.service.network().providers(&id)[0].id, "partial");
        assert_eq!(reader.service.retrieve(&id).unwrap(), POST);
    }

    #[test]
    fn every_peer_failing_is_aggregated() {
        let chunker = Chunker::new(10).unwrap();
        let chunks = chunker.chunk_content(POST);
        let manifest = chunker.generate_manifest(&chunks, POST, None).unwrap();
        let served = manifest.clone();
        // Serves the manifest but never its chunks.
        let transport = HandlerTransport::new(move |peer, kind, id| match kind {
            crate::network::RequestKind::Manifest if id == served.id => {
                Ok(Response::Manifest(served.clone()))
            }
            _ => Err(unhandled(peer, kind, id)),
        });
        let reader = node("reader", 1.0, Arc::new(transport));
        let mut stingy = PeerNode::new("stingy", "s", 1.0);
        stingy.add_advertised_content(manifest.id.clone());
        reader.service.network().add_peer_to_network_view(stingy).unwrap();

        match reader.service.retrieve(&manifest.id) {
            Err(DdsError::AllPeersFailed { failures, .. }) => assert_eq!(failures.len(), 1),
            other => panic!("expected aggregate failure, got {:?}", other),
        }
        assert_eq!(reader.storage.chunk_count(), 0);
    }

    struct FailingOriginator;

    impl Originator for FailingOriginator {
        fn advertise_content(&self, _manifest_id: &str) -> Result<()> {
            Err(DdsError::Transport {
                peer: "gossip".into(),
                reason: "offline".into(),
            })
        }
    }

    #[test]
    fn advertise_failure_keeps_stored_content() {
        let n = node("solo", 1.0, Arc::new(HandlerTransport::unhandled()));
        let service = n.service.with_originator(Box::new(FailingOriginator));
        let id = match service.publish(POST) {
            Err(DdsError::Advertise { content_id, .. }) => content_id,
            other => panic!("expected advertise failure, got {:?}", other),
        };
        assert_eq!(service.retrieve(&id).unwrap(), POST);
    }

    #[test]
    fn oversized_manifest_from_peer_is_rejected() {
        let forged = Manifest::new(vec![], u64::MAX, crate::chunk::compute_hash(b""), None);
        assert!(forged.verify());
        let served = forged.clone();
        let transport = HandlerTransport::new(move |peer, kind, id| match kind {
            crate::network::RequestKind::Manifest if id == served.id => {
                Ok(Response::Manifest(served.clone()))
            }
            _ => Err(unhandled(peer, kind, id)),
        });
        let reader = node("reader", 1.0, Arc::new(transport));
        let mut liar = PeerNode::new("liar", "l", 1.0);
        liar.add_advertised_content(forged.id.clone());
        reader.service.network().add_peer_to_network_view(liar).unwrap();

        match reader.service.retrieve(&forged.id) {
            Err(DdsError::AllPeersFailed { failures, .. }) => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].contains("declares"));
            }
            other => panic!("expected aggregate failure, got {:?}", other),
        }
        assert_eq!(reader.storage.manifest_count(), 0);
    }

    /// Reads from an empty store, refuses every write.
    struct ReadOnlyStorage(MemoryStorage);

    impl StorageBackend for ReadOnlyStorage {
        fn store_chunk(&self, _chunk: &Chunk) -> Result<()> {
            Err(std::io::Error::other("disk full").into())
        }

        fn get_chunk(&self, id: &str) -> Result<Chunk> {
            self.0.get_chunk(id)
        }

        fn store_manifest(&self, _manifest: &Manifest) -> Result<()> {
            Err(std::io::Error::other("disk full").into())
        }

        fn get_manifest(&self, id: &str) -> Result<Manifest> {
            self.0.get_manifest(id)
        }
    }

    #[test]
    fn cache_failure_still_returns_content() {
        let transport = Arc::new(PeerStoreTransport::new());
        let origin = node("origin", 1.0, transport.clone());
        transport.register("origin", origin.storage.clone());
        let id = origin.service.publish(POST).unwrap();

        let network = Arc::new(NetworkService::new(
            PeerNode::new("reader", "reader.local:7400", 1.0),
            transport,
        ));
        network
            .add_peer_to_network_view(origin.service.network().local_node())
            .unwrap();
        let reader = DdsService::new(
            Chunker::new(10).unwrap(),
            Arc::new(ReadOnlyStorage(MemoryStorage::new())),
            network,
        );

        assert_eq!(reader.retrieve(&id).unwrap(), POST);
        assert!(!reader.storage().has_manifest(&id));
    }
}
