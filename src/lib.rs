pub mod block;
pub mod blockchain;
pub mod chunk;
pub mod chunker;
pub mod config;
pub mod dds;
pub mod discovery;
pub mod error;
pub mod home;
pub mod identity;
pub mod manifest;
pub mod network;
pub mod originator;
pub mod peer;
pub mod retriever;
pub mod storage;
pub mod transaction;

pub use block::{Block, BlockHeader};
pub use blockchain::Blockchain;
pub use chunk::{Chunk, ContentId};
pub use chunker::Chunker;
pub use config::NodeConfig;
pub use dds::DdsService;
pub use discovery::{Discovery, PeerQuery, SelectionPolicy};
pub use error::{DdsError, Result};
pub use identity::Wallet;
pub use manifest::Manifest;
pub use network::{HandlerTransport, NetworkService, PeerStoreTransport, Transport};
pub use peer::PeerNode;
pub use storage::{FsStorage, MemoryStorage, StorageBackend};
pub use transaction::{Transaction, TransactionType};
