//! DS block, Tx block, and transaction-body types.
//!
//! A **DS block** opens a new directory-service epoch: its header carries the
//! difficulty levels the next PoW round must meet, the winner admitted into
//! the DS committee, and the leader that drove the consensus. A **Tx block**
//! is one of the many transaction batches finalised within a DS epoch.
//! A [`TxBody`] is a transaction together with its receipt outcome, persisted
//! by lookup nodes.
//!
//! All three encode with the fixed-width codec in [`crate::wire`]; block
//! hashes are Keccak-256 over the encoded header.

use crate::wire::{Reader, Writer};
use crate::{keccak256, Hash, Result, BLOCK_HASH_SIZE, PUB_KEY_SIZE};

/// Header of a DS block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsBlockHeader {
    /// DS block number (genesis is 0).
    pub block_num: u64,
    /// Shard-tier PoW difficulty for the next round.
    pub difficulty: u8,
    /// DS-tier PoW difficulty for the next round.
    pub ds_difficulty: u8,
    /// Hash of the previous DS block header.
    pub prev_hash: Hash,
    /// Public key of the PoW winner admitted into the committee.
    pub winner_pubkey: [u8; PUB_KEY_SIZE],
    /// Public key of the committee leader that proposed this block.
    pub leader_pubkey: [u8; PUB_KEY_SIZE],
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

impl DsBlockHeader {
    /// Encoded size of a DS block header.
    pub const WIRE_SIZE: usize = 8 + 1 + 1 + BLOCK_HASH_SIZE + 2 * PUB_KEY_SIZE + 8;

    /// Append the wire encoding of this header to `w`.
    pub fn encode(&self, w: &mut Writer) {
        w.write_u64(self.block_num);
        w.write_u8(self.difficulty);
        w.write_u8(self.ds_difficulty);
        w.write_bytes(&self.prev_hash);
        w.write_bytes(&self.winner_pubkey);
        w.write_bytes(&self.leader_pubkey);
        w.write_u64(self.timestamp);
    }

    /// Decode a header from the reader.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            block_num: r.read_u64()?,
            difficulty: r.read_u8()?,
            ds_difficulty: r.read_u8()?,
            prev_hash: r.read_array()?,
            winner_pubkey: r.read_array()?,
            leader_pubkey: r.read_array()?,
            timestamp: r.read_u64()?,
        })
    }
}

/// A directory-service block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsBlock {
    /// The block header.
    pub header: DsBlockHeader,
}

impl DsBlock {
    /// Create a block from its header.
    pub fn new(header: DsBlockHeader) -> Self {
        Self { header }
    }

    /// The genesis DS block: number 0, the given starting difficulties, and
    /// all-zero keys and parent hash.
    pub fn genesis(difficulty: u8, ds_difficulty: u8) -> Self {
        Self {
            header: DsBlockHeader {
                block_num: 0,
                difficulty,
                ds_difficulty,
                prev_hash: [0u8; 32],
                winner_pubkey: [0u8; PUB_KEY_SIZE],
                leader_pubkey: [0u8; PUB_KEY_SIZE],
                timestamp: 0,
            },
        }
    }

    /// Keccak-256 of the encoded header.
    pub fn hash(&self) -> Hash {
        keccak256(&self.to_bytes())
    }

    /// Encode as a standalone byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(DsBlockHeader::WIRE_SIZE);
        self.header.encode(&mut w);
        w.into_bytes()
    }

    /// Decode from a standalone byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        Ok(Self {
            header: DsBlockHeader::decode(&mut r)?,
        })
    }
}

/// Header of a Tx block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxBlockHeader {
    /// Tx block number (monotone across DS epochs).
    pub block_num: u64,
    /// Number of the DS block whose epoch this Tx block belongs to.
    pub ds_block_num: u64,
    /// Hash of the previous Tx block header.
    pub prev_hash: Hash,
    /// Root hash over the transactions in this block.
    pub tx_root_hash: Hash,
    /// Number of transactions in this block.
    pub num_txs: u32,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

impl TxBlockHeader {
    /// Encoded size of a Tx block header.
    pub const WIRE_SIZE: usize = 8 + 8 + 2 * BLOCK_HASH_SIZE + 4 + 8;

    /// Append the wire encoding of this header to `w`.
    pub fn encode(&self, w: &mut Writer) {
        w.write_u64(self.block_num);
        w.write_u64(self.ds_block_num);
        w.write_bytes(&self.prev_hash);
        w.write_bytes(&self.tx_root_hash);
        w.write_u32(self.num_txs);
        w.write_u64(self.timestamp);
    }

    /// Decode a header from the reader.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            block_num: r.read_u64()?,
            ds_block_num: r.read_u64()?,
            prev_hash: r.read_array()?,
            tx_root_hash: r.read_array()?,
            num_txs: r.read_u32()?,
            timestamp: r.read_u64()?,
        })
    }
}

/// A transaction block, carrying the hashes of its transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxBlock {
    /// The block header.
    pub header: TxBlockHeader,
    /// Hashes of the transactions finalised in this block.
    pub tx_hashes: Vec<Hash>,
}

impl TxBlock {
    /// Create a block from a header and transaction hashes.
    ///
    /// `header.num_txs` is forced to match `tx_hashes.len()`.
    pub fn new(mut header: TxBlockHeader, tx_hashes: Vec<Hash>) -> Self {
        header.num_txs = tx_hashes.len() as u32;
        Self { header, tx_hashes }
    }

    /// The genesis Tx block.
    pub fn genesis() -> Self {
        Self {
            header: TxBlockHeader {
                block_num: 0,
                ds_block_num: 0,
                prev_hash: [0u8; 32],
                tx_root_hash: [0u8; 32],
                num_txs: 0,
                timestamp: 0,
            },
            tx_hashes: Vec::new(),
        }
    }

    /// Keccak-256 of the encoded block.
    pub fn hash(&self) -> Hash {
        keccak256(&self.to_bytes())
    }

    /// Encode as a standalone byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w =
            Writer::with_capacity(TxBlockHeader::WIRE_SIZE + self.tx_hashes.len() * BLOCK_HASH_SIZE);
        self.header.encode(&mut w);
        for h in &self.tx_hashes {
            w.write_bytes(h);
        }
        w.into_bytes()
    }

    /// Decode from a standalone byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let header = TxBlockHeader::decode(&mut r)?;
        let mut tx_hashes = Vec::with_capacity(header.num_txs as usize);
        for _ in 0..header.num_txs {
            tx_hashes.push(r.read_array()?);
        }
        Ok(Self { header, tx_hashes })
    }
}

/// A transaction together with its receipt outcome.
///
/// Lookup nodes persist one of these per transaction, keyed by the
/// transaction hash, in the per-epoch body store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxBody {
    /// Hash of the transaction.
    pub tx_hash: Hash,
    /// Whether execution succeeded.
    pub success: bool,
    /// Serialized transaction payload.
    pub payload: Vec<u8>,
}

impl TxBody {
    /// Encode as a standalone byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(BLOCK_HASH_SIZE + 1 + 4 + self.payload.len());
        w.write_bytes(&self.tx_hash);
        w.write_u8(u8::from(self.success));
        w.write_u32(self.payload.len() as u32);
        w.write_bytes(&self.payload);
        w.into_bytes()
    }

    /// Decode from a standalone byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let tx_hash = r.read_array()?;
        let success = r.read_u8()? != 0;
        let len = r.read_u32()? as usize;
        let payload = r.read_bytes(len)?;
        Ok(Self {
            tx_hash,
            success,
            payload,
        })
    }
}
