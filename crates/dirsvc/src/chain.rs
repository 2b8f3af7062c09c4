//! In-memory chain tips for the DS and Tx chains.
//!
//! Each chain tracks its blocks from genesis and the 32-byte randomness word
//! bound into PoW inputs: the word starts from the genesis constant and rolls
//! to the Keccak-256 of each appended block.

use parking_lot::RwLock;
use shardnet_types::{keccak256, DsBlock, Hash, TxBlock, RAND1_GENESIS, RAND2_GENESIS};

/// The DS chain tip.
pub struct DsBlockChain {
    blocks: RwLock<Vec<DsBlock>>,
    rand: RwLock<Hash>,
}

impl DsBlockChain {
    /// Create a chain holding only `genesis`.
    pub fn new(genesis: DsBlock) -> Self {
        Self {
            blocks: RwLock::new(vec![genesis]),
            rand: RwLock::new(RAND1_GENESIS),
        }
    }

    /// The most recent DS block.
    pub fn last_block(&self) -> DsBlock {
        self.blocks
            .read()
            .last()
            .expect("chain always holds genesis")
            .clone()
    }

    /// Number of blocks, genesis included.
    pub fn block_count(&self) -> u64 {
        self.blocks.read().len() as u64
    }

    /// The block at `block_num`, if the tip has it.
    pub fn block(&self, block_num: u64) -> Option<DsBlock> {
        self.blocks
            .read()
            .iter()
            .find(|b| b.header.block_num == block_num)
            .cloned()
    }

    /// Append a block and roll the randomness word.
    pub fn append(&self, block: DsBlock) {
        let mut rand = self.rand.write();
        *rand = keccak256(&block.to_bytes());
        self.blocks.write().push(block);
    }

    /// The randomness word bound to the current tip.
    pub fn randomness(&self) -> Hash {
        *self.rand.read()
    }
}

/// The Tx chain tip.
pub struct TxBlockChain {
    blocks: RwLock<Vec<TxBlock>>,
    rand: RwLock<Hash>,
}

impl TxBlockChain {
    /// Create a chain holding only `genesis`.
    pub fn new(genesis: TxBlock) -> Self {
        Self {
            blocks: RwLock::new(vec![genesis]),
            rand: RwLock::new(RAND2_GENESIS),
        }
    }

    /// The most recent Tx block.
    pub fn last_block(&self) -> TxBlock {
        self.blocks
            .read()
            .last()
            .expect("chain always holds genesis")
            .clone()
    }

    /// Number of blocks, genesis included.
    pub fn block_count(&self) -> u64 {
        self.blocks.read().len() as u64
    }

    /// Append a block and roll the randomness word.
    pub fn append(&self, block: TxBlock) {
        let mut rand = self.rand.write();
        *rand = keccak256(&block.to_bytes());
        self.blocks.write().push(block);
    }

    /// The randomness word bound to the current tip.
    pub fn randomness(&self) -> Hash {
        *self.rand.read()
    }
}
