use crate::error::Result;
use crate::network::NetworkService;
use std::sync::Arc;

/// Announces locally stored manifests so peers can discover them.
///
/// Advertising is best-effort: a failure here never undoes the storage
/// writes that preceded it.
pub trait Originator: Send + Sync {
    fn advertise_content(&self, manifest_id: &str) -> Result<()>;
}

/// Originator that records availability in the node's [`NetworkService`].
pub struct NetworkOriginator {
    network: Arc<NetworkService>,
}

impl NetworkOriginator {
    pub fn new(network: Arc<NetworkService>) -> Self {
        Self { network }
    }
}

impl Originator for NetworkOriginator {
    fn advertise_content(&self, manifest_id: &str) -> Result<()> {
        self.network.advertise(manifest_id)
    }
}
