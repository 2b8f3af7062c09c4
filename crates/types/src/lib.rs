//! Shardnet core types
//!
//! This crate provides the wire-level types shared by every Shardnet node:
//!
//! - **Peer**: a network endpoint (IP address + listen port) with the
//!   fixed-width encoding used on the wire
//! - **Blocks**: DS blocks (one per directory-service epoch) and Tx blocks
//!   (many per DS epoch), with their headers and hashes
//! - **Tx bodies**: transaction-with-receipt payloads persisted per DS epoch
//! - **Wire codec**: fixed-width big-endian reader/writer shared by all
//!   message layouts
//!
//! All encodings are fixed-width big-endian; hashes are Keccak-256 over the
//! encoded bytes.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod block;
pub mod peer;
pub mod wire;

pub use block::{DsBlock, DsBlockHeader, TxBlock, TxBlockHeader, TxBody};
pub use peer::Peer;
pub use wire::{Reader, Writer};

use sha3::{Digest, Keccak256};
use thiserror::Error;

/// A 32-byte hash used for blocks, transactions, and PoW results.
pub type Hash = [u8; 32];

/// Size in bytes of a block or transaction hash.
pub const BLOCK_HASH_SIZE: usize = 32;

/// Size in bytes of a compressed public key.
pub const PUB_KEY_SIZE: usize = 33;

/// Size in bytes of the Schnorr challenge half of a signature.
pub const SIGNATURE_CHALLENGE_SIZE: usize = 32;

/// Size in bytes of the Schnorr response half of a signature.
pub const SIGNATURE_RESPONSE_SIZE: usize = 32;

/// Size in bytes of a full signature on the wire.
pub const SIGNATURE_SIZE: usize = SIGNATURE_CHALLENGE_SIZE + SIGNATURE_RESPONSE_SIZE;

/// Size in bytes of an IP address on the wire (IPv4 is v4-mapped into v6).
pub const IP_SIZE: usize = 16;

/// Size in bytes of a listen port on the wire.
pub const PORT_SIZE: usize = 4;

/// Zero hash constant.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Genesis randomness word bound to the DS chain before any DS block exists.
pub const RAND1_GENESIS: Hash = [
    0x2b, 0x74, 0x0d, 0x75, 0x89, 0x17, 0x49, 0xf9, 0x4b, 0x6a, 0x8e, 0xc0, 0x9f, 0x08, 0x68, 0x89,
    0x06, 0x66, 0x08, 0xe4, 0x41, 0x8e, 0xda, 0x65, 0x6c, 0x93, 0x44, 0x3e, 0x83, 0x10, 0x75, 0x0a,
];

/// Genesis randomness word bound to the Tx chain before any Tx block exists.
pub const RAND2_GENESIS: Hash = [
    0xe8, 0xcc, 0x91, 0x06, 0xf8, 0xa2, 0x86, 0x71, 0xd9, 0x1e, 0x2d, 0xe0, 0x7b, 0x57, 0xb8, 0x28,
    0x93, 0x44, 0x81, 0xfa, 0xdf, 0x69, 0x56, 0x56, 0x3b, 0x96, 0x3b, 0xb8, 0xe5, 0xc2, 0x66, 0xbf,
];

/// Errors produced while decoding wire types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    /// The input ended before the expected field.
    #[error("truncated input: needed {needed} bytes at offset {offset}, had {remaining}")]
    Truncated {
        /// Bytes the decoder needed next.
        needed: usize,
        /// Offset at which the read was attempted.
        offset: usize,
        /// Bytes remaining in the input.
        remaining: usize,
    },

    /// A peer endpoint failed to decode.
    #[error("invalid peer encoding: {0}")]
    InvalidPeer(String),

    /// A block failed to decode.
    #[error("invalid block encoding: {0}")]
    InvalidBlock(String),
}

/// Result type for wire decoding.
pub type Result<T> = std::result::Result<T, TypesError>;

/// Compute the Keccak-256 hash of `data`.
#[inline]
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak256_is_deterministic() {
        let a = keccak256(b"shardnet");
        let b = keccak256(b"shardnet");
        assert_eq!(a, b);
        assert_ne!(a, ZERO_HASH);
    }

    #[test]
    fn genesis_randomness_words_differ() {
        assert_ne!(RAND1_GENESIS, RAND2_GENESIS);
    }
}
