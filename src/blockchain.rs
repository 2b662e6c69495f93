use crate::block::Block;
use crate::error::{DdsError, Result};
use crate::transaction::Transaction;
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

/// The ledger. Starts at [`Block::genesis`] and only ever grows.
///
/// Reads share the lock; appends hold it exclusively, so block order is
/// exactly append order.
pub struct Blockchain {
    blocks: RwLock<Vec<Block>>,
}

impl Blockchain {
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(vec![Block::genesis()]),
        }
    }

    /// Sign-check `transactions`, build a block on the current head, and
    /// append it. On any error the chain is left unchanged.
    pub fn add_block(&self, transactions: Vec<Transaction>) -> Result<Block> {
        for tx in &transactions {
            tx.validate()?;
        }
        let mut blocks = self.write();
        let head = head_of(&blocks);
        let block = Block::new(head.index() + 1, head.hash.clone(), transactions);
        block.is_block_valid(Some(head))?;
        blocks.push(block.clone());
        info!(
            index = block.index(),
            hash = %block.hash,
            transactions = block.transactions.len(),
            "appended block"
        );
        Ok(block)
    }

    /// Append a block built elsewhere, if it extends the current head.
    pub fn append_block(&self, block: Block) -> Result<()> {
        let mut blocks = self.write();
        if let Err(e) = block.is_block_valid(Some(head_of(&blocks))) {
            warn!(index = block.index(), error = %e, "rejected block");
            return Err(e);
        }
        info!(index = block.index(), hash = %block.hash, "appended external block");
        blocks.push(block);
        Ok(())
    }

    /// Walk from genesis and stop at the first bad block.
    pub fn validate_chain(&self) -> Result<()> {
        validate_blocks(&self.read())
    }

    pub fn is_chain_valid(&self) -> bool {
        match self.validate_chain() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "chain validation failed");
                false
            }
        }
    }

    pub fn get_latest_block(&self) -> Block {
        head_of(&self.read()).clone()
    }

    pub fn get_block_by_index(&self, index: u64) -> Result<Block> {
        let blocks = self.read();
        usize::try_from(index)
            .ok()
            .and_then(|i| blocks.get(i))
            .cloned()
            .ok_or(DdsError::BlockNotFound(index))
    }

    pub fn get_transaction_by_id(&self, id: &str) -> Result<Transaction> {
        self.read()
            .iter()
            .flat_map(|b| b.transactions.iter())
            .find(|tx| tx.id == id)
            .cloned()
            .ok_or_else(|| DdsError::TransactionNotFound(id.into()))
    }

    /// Every transaction sent from `address`, oldest first.
    pub fn transactions_by_sender(&self, address: &str) -> Vec<Transaction> {
        self.read()
            .iter()
            .flat_map(|b| b.transactions.iter())
            .filter(|tx| tx.sender_address == address)
            .cloned()
            .collect()
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.read().clone()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(&*self.read())?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Load a chain saved with [`save`](Self::save), refusing one that
    /// does not start at genesis or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let blocks: Vec<Block> = serde_json::from_slice(&fs::read(path)?)?;
        match blocks.first() {
            Some(first) if *first == Block::genesis() => {}
            _ => {
                return Err(DdsError::ChainLinkage(format!(
                    "{} does not start with the genesis block",
                    path.display()
                )))
            }
        }
        validate_blocks(&blocks)?;
        Ok(Self {
            blocks: RwLock::new(blocks),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Block>> {
        self.blocks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Block>> {
        self.blocks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

/// The chain always holds genesis, so there is always a head.
fn head_of(blocks: &[Block]) -> &Block {
    &blocks[blocks.len() - 1]
}

fn validate_blocks(blocks: &[Block]) -> Result<()> {
    let mut previous: Option<&Block> = None;
    for block in blocks {
        block.is_block_valid(previous)?;
        previous = Some(block);
    }
    Ok(())
}
