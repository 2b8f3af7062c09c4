//! Shardnet configuration
//!
//! All node settings live in one `shardnet.toml` file, loaded once at
//! startup and never mutated afterwards. Sections: `[node]` (identity and
//! role flags), `[pow]` (submission window and difficulty tunables),
//! `[sync]` (resynchronization cadence), `[storage]`, and `[logging]`.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;

pub use config::{
    Config, LoggingConfig, NodeConfig, PowConfig, StorageConfig, SyncConfig,
};
pub use error::{ConfigError, ConfigResult};
