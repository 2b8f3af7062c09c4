//! Shardnet cryptography
//!
//! Schnorr signatures over secp256k1 with 33-byte compressed public keys and
//! 64-byte `(challenge ‖ response)` signatures, plus the Keccak-256 helper
//! used throughout the node.
//!
//! The signature scheme is challenge/response Schnorr:
//!
//! ```text
//! sign:    k random,  Q = k·G,  e = H(Q ‖ P ‖ m),  s = k − e·x  (mod n)
//! verify:  Q' = s·G + e·P,      accept iff H(Q' ‖ P ‖ m) = e
//! ```
//!
//! Non-consensus code only ever *verifies*; signing exists for node identity,
//! tooling, and tests.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod schnorr;

pub use schnorr::{PubKey, SecretKey, Signature};

use sha3::{Digest, Keccak256};
use thiserror::Error;

/// A 32-byte hash.
pub type Hash = [u8; 32];

/// Errors from key or signature handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A public key failed to parse as a compressed curve point.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// A secret key scalar was out of range or zero.
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    /// A signature failed to parse.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Compute the Keccak-256 hash of `data`.
#[inline]
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}
