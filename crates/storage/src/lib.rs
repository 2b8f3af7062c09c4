//! Shardnet storage layer
//!
//! Durable storage for the directory-service node:
//!
//! - **KvDb**: a thin RocksDB wrapper, one database per logical namespace
//! - **BlockStorage**: the block store proper: `metadata`, `dsBlocks`,
//!   `txBlocks`, plus a rolling FIFO of per-DS-epoch transaction-body
//!   databases (`txBodies`, `txBodies_<n>`, staging `txBodiesTmp`)
//!
//! Keys are big-endian block numbers (so iteration order is block order) or
//! 32-byte transaction hashes; values are the fixed-width encodings from
//! `shardnet-types`.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod block_storage;
pub mod kvdb;

pub use block_storage::{BlockStorage, DbKind, MetaType};
pub use kvdb::KvDb;

use thiserror::Error;

/// Storage error types.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Database(String),

    /// A stored value failed to decode.
    #[error("codec error: {0}")]
    Codec(#[from] shardnet_types::TypesError),

    /// Filesystem error while opening or destroying a database.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
