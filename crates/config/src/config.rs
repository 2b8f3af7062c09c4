//! The `shardnet.toml` configuration model.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};

/// Complete node configuration, loaded from a single TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Node identity and role flags.
    #[serde(default)]
    pub node: NodeConfig,

    /// PoW window and difficulty tunables.
    #[serde(default)]
    pub pow: PowConfig,

    /// Synchronization cadence.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Storage paths.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging directives.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        debug!("configuration validated");
        Ok(config)
    }

    /// Check that all values are in range and internally consistent.
    pub fn validate(&self) -> ConfigResult<()> {
        self.node.validate()?;
        self.pow.validate()?;
        self.sync.validate()?;
        Ok(())
    }
}

/// Node identity and role flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// TCP port this node listens on.
    pub listen_port: u16,

    /// Whether this node runs as a lookup (full) node. Lookup nodes keep
    /// transaction bodies and never participate in DS duties.
    pub lookup_node_mode: bool,

    /// Whether the network runs in test-net mode (enables the DS whitelist
    /// check on PoW submissions).
    pub test_net_mode: bool,

    /// In test-net mode, reject PoW submissions whose sender is missing
    /// from the DS whitelist. When unset the mismatch is logged only.
    pub require_ds_whitelist: bool,

    /// Reject PoW submissions from private or broadcast addresses.
    pub exclude_private_ip: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_port: 4201,
            lookup_node_mode: false,
            test_net_mode: false,
            require_ds_whitelist: false,
            exclude_private_ip: true,
        }
    }
}

impl NodeConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.listen_port == 0 {
            return Err(ConfigError::Invalid("node.listen_port must be non-zero".into()));
        }
        Ok(())
    }
}

/// PoW window and difficulty tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowConfig {
    /// Seconds the leader accepts PoW submissions before starting DS-block
    /// consensus.
    pub window_in_seconds: u64,

    /// Seconds a late PoW submission may wait for the state machine to
    /// return to the submission window.
    pub submission_timeout_secs: u64,

    /// Maximum accepted submissions per key per DS epoch.
    pub submission_limit: u32,

    /// Starting shard-tier difficulty (also the retarget floor).
    pub difficulty: u8,

    /// Starting DS-tier difficulty.
    pub ds_difficulty: u8,

    /// Percentage swing in submissions that triggers a proportional
    /// difficulty adjustment.
    pub change_percent_to_adjust: u64,

    /// Expected number of PoW participants across the whole network.
    pub expected_network_nodes: u64,

    /// Tx blocks finalised per PoW round (per DS epoch).
    pub final_blocks_per_pow: u64,

    /// Milliseconds spent distributing transactions per Tx block.
    pub tx_distribute_time_ms: u64,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            window_in_seconds: 300,
            submission_timeout_secs: 60,
            submission_limit: 3,
            difficulty: 3,
            ds_difficulty: 5,
            change_percent_to_adjust: 5,
            expected_network_nodes: 600,
            final_blocks_per_pow: 50,
            tx_distribute_time_ms: 10_000,
        }
    }
}

impl PowConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.submission_limit == 0 {
            return Err(ConfigError::Invalid("pow.submission_limit must be positive".into()));
        }
        if self.ds_difficulty < self.difficulty {
            return Err(ConfigError::Invalid(
                "pow.ds_difficulty must be at least pow.difficulty".into(),
            ));
        }
        if self.change_percent_to_adjust == 0 || self.change_percent_to_adjust > 100 {
            return Err(ConfigError::Invalid(
                "pow.change_percent_to_adjust must be in 1..=100".into(),
            ));
        }
        if self.final_blocks_per_pow == 0 {
            return Err(ConfigError::Invalid(
                "pow.final_blocks_per_pow must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Synchronization cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between block-fetch rounds while a node is resynchronizing.
    pub new_node_sync_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            new_node_sync_interval_secs: 10,
        }
    }
}

impl SyncConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.new_node_sync_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sync.new_node_sync_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Storage paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding every database of the block store.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "./data/shardnet".to_string(),
        }
    }
}

/// Logging directives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `shardnet_dirsvc=debug`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
