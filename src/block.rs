use crate::chunk::{compute_hash, ContentId};
use crate::error::{DdsError, Result};
use crate::transaction::Transaction;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Header fields; the block hash covers exactly these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    pub index: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Hash of the preceding block; empty for genesis.
    pub previous_hash: String,
    pub merkle_root: ContentId,
}

/// A hash-linked batch of signed transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub hash: ContentId,
}

impl Block {
    /// Build a block stamped with the current time.
    pub fn new(index: u64, previous_hash: String, transactions: Vec<Transaction>) -> Self {
        Self::with_timestamp(
            index,
            previous_hash,
            transactions,
            Utc::now().timestamp_millis(),
        )
    }

    /// Build a block with an explicit timestamp (for determinism).
    pub fn with_timestamp(
        index: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        timestamp: i64,
    ) -> Self {
        let header = BlockHeader {
            index,
            timestamp,
            previous_hash,
            merkle_root: merkle_root(&transactions),
        };
        let hash = header.compute_hash();
        Self {
            header,
            transactions,
            hash,
        }
    }

    /// The fixed first block: index 0, no predecessor, no transactions.
    pub fn genesis() -> Self {
        Self::with_timestamp(0, String::new(), Vec::new(), 0)
    }

    pub fn index(&self) -> u64 {
        self.header.index
    }

    pub fn is_genesis(&self) -> bool {
        self.header.index == 0
    }

    /// Check this block against its predecessor (`None` for genesis).
    ///
    /// Linkage faults are [`DdsError::ChainLinkage`], recomputation
    /// mismatches are [`DdsError::Corruption`] and a bad transaction is
    /// [`DdsError::InvalidSignature`].
    pub fn is_block_valid(&self, previous: Option<&Block>) -> Result<()> {
        match previous {
            None => {
                if self.header.index != 0 {
                    return Err(DdsError::ChainLinkage(format!(
                        "block without predecessor has index {}, expected 0",
                        self.header.index
                    )));
                }
                if !self.header.previous_hash.is_empty() {
                    return Err(DdsError::ChainLinkage(
                        "genesis block must have an empty previous hash".into(),
                    ));
                }
            }
            Some(prev) => {
                if self.header.index != prev.header.index + 1 {
                    return Err(DdsError::ChainLinkage(format!(
                        "block index {} does not follow {}",
                        self.header.index, prev.header.index
                    )));
                }
                if self.header.previous_hash != prev.hash {
                    return Err(DdsError::ChainLinkage(format!(
                        "block {} previous hash {} does not match {}",
                        self.header.index, self.header.previous_hash, prev.hash
                    )));
                }
            }
        }

        if merkle_root(&self.transactions) != self.header.merkle_root {
            return Err(DdsError::Corruption(format!(
                "block {} merkle root does not match its transactions",
                self.header.index
            )));
        }
        if self.header.compute_hash() != self.hash {
            return Err(DdsError::Corruption(format!(
                "block {} hash does not match its header",
                self.header.index
            )));
        }
        for tx in &self.transactions {
            tx.validate()?;
        }
        Ok(())
    }
}

impl BlockHeader {
    pub fn compute_hash(&self) -> ContentId {
        let payload = format!(
            "index:{}\ntime:{}\nprev:{}\nmerkle:{}",
            self.index, self.timestamp, self.previous_hash, self.merkle_root,
        );
        compute_hash(payload.as_bytes())
    }
}

/// Order-sensitive digest over transaction ids.
///
/// This is a hash of the concatenated ids, not a binary Merkle tree;
/// changing it would change every block hash.
pub fn merkle_root(transactions: &[Transaction]) -> ContentId {
    let joined: String = transactions.iter().map(|tx| tx.id.as_str()).collect();
    compute_hash(joined.as_bytes())
}
