use crate::blockchain::Blockchain;
use crate::chunker::Chunker;
use crate::config::NodeConfig;
use crate::dds::DdsService;
use crate::error::Result;
use crate::identity::Wallet;
use crate::network::{NetworkService, PeerStoreTransport};
use crate::peer::PeerNode;
use crate::storage::FsStorage;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CONFIG_FILE: &str = "config.json";
const WALLET_FILE: &str = "wallet.json";
const CHAIN_FILE: &str = "chain.json";
const STORE_DIR: &str = "store";

/// A node's directory: config, wallet, content store and ledger.
pub struct NodeHome {
    root: PathBuf,
}

impl NodeHome {
    /// Open an existing home, creating the directory if needed.
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path.join(STORE_DIR))?;
        Ok(Self {
            root: path.to_path_buf(),
        })
    }

    /// Initialize a home: default config, a fresh wallet and a genesis
    /// chain. Existing files are left alone.
    pub fn init(path: &Path) -> Result<Self> {
        let home = Self::open(path)?;
        if !home.config_path().exists() {
            NodeConfig::default().save(&home.config_path())?;
        }
        if !home.wallet_path().exists() {
            Wallet::new().save(&home.wallet_path())?;
        }
        if !home.chain_path().exists() {
            Blockchain::new().save(&home.chain_path())?;
        }
        Ok(home)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The stored config. A home without one gets a default config written
    /// on first use, so the node id it carries stays fixed from then on.
    pub fn config(&self) -> Result<NodeConfig> {
        if self.config_path().exists() {
            return NodeConfig::load(&self.config_path());
        }
        let config = NodeConfig::default();
        config.save(&self.config_path())?;
        Ok(config)
    }

    pub fn wallet(&self) -> Result<Wallet> {
        Wallet::load(&self.wallet_path())
    }

    /// The stored chain, or a fresh one when none was written.
    pub fn chain(&self) -> Result<Blockchain> {
        if self.chain_path().exists() {
            Blockchain::load(&self.chain_path())
        } else {
            Ok(Blockchain::new())
        }
    }

    pub fn save_chain(&self, chain: &Blockchain) -> Result<()> {
        chain.save(&self.chain_path())
    }

    pub fn storage(&self) -> Result<FsStorage> {
        FsStorage::open(&self.root.join(STORE_DIR))
    }

    /// A storage service over this home's store.
    ///
    /// Content stored here is advertised under `config.node_id`; with no
    /// peers registered on the transport, retrieval is local only.
    pub fn service(&self, config: &NodeConfig) -> Result<DdsService> {
        let chunker = Chunker::new(config.chunk_size)?;
        let local = PeerNode::new(config.node_id.clone(), config.listen_address.clone(), 1.0);
        let network = Arc::new(NetworkService::new(
            local,
            Arc::new(PeerStoreTransport::new()),
        ));
        let service = DdsService::new(chunker, Arc::new(self.storage()?), network)
            .with_cache_retrieved(config.cache_retrieved);
        Ok(service)
    }

    fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    fn wallet_path(&self) -> PathBuf {
        self.root.join(WALLET_FILE)
    }

    fn chain_path(&self) -> PathBuf {
        self.root.join(CHAIN_FILE)
    }
}
