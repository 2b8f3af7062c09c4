//! Synchronization bootstrap and rejoin-as-DS recovery.
//!
//! A node that fell behind clears its DS state and runs the sync poller: it
//! fetches the offline-lookup set (bounded wait; timeout aborts the task),
//! pulls the DS committee, then loops fetching any DS and Tx blocks past the
//! local tips until the sync type returns to [`SyncType::NoSync`]. Rejoining
//! the committee re-enters this path and finishes by recomputing the node's
//! committee index and restarting DS-block consensus.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::service::DirectoryService;
use crate::state::Mode;

/// What kind of synchronization, if any, the node is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncType {
    /// In normal operation.
    NoSync,
    /// A brand-new node catching up from genesis.
    NewSync,
    /// A shard node catching up.
    NormalSync,
    /// A DS node catching up before rejoining the committee.
    DsSync,
    /// A lookup node catching up.
    LookupSync,
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncType::NoSync => "NO_SYNC",
            SyncType::NewSync => "NEW_SYNC",
            SyncType::NormalSync => "NORMAL_SYNC",
            SyncType::DsSync => "DS_SYNC",
            SyncType::LookupSync => "LOOKUP_SYNC",
        };
        write!(f, "{}", name)
    }
}

/// Handle to the sibling shard-node state machine, reset when this node
/// rejoins the DS committee.
pub trait ShardNode: Send + Sync {
    /// Clear shard-node state and re-install it for the given sync mode.
    fn prepare_rejoin(&self, sync_type: SyncType);
}

/// Shard-node handle for nodes that run no shard duties.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopShardNode;

impl ShardNode for NoopShardNode {
    fn prepare_rejoin(&self, sync_type: SyncType) {
        debug!(%sync_type, "no shard node to reset");
    }
}

impl DirectoryService {
    /// Clear DS state and start the background sync poller.
    pub fn start_synchronization(self: &Arc<Self>) {
        if self.config.node.lookup_node_mode {
            warn!("start_synchronization on a lookup node");
            return;
        }
        info!(epoch = self.current_epoch(), "starting synchronization");
        self.clean_variables();

        let service = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("ds-sync".to_string())
            .spawn(move || service.sync_loop());
        match spawned {
            Ok(handle) => self.register_task(handle),
            Err(e) => warn!(error = %e, "failed to spawn sync poller"),
        }
    }

    fn sync_loop(self: Arc<Self>) {
        self.lookup.fetch_offline_lookups();
        let window = Duration::from_secs(self.config.pow.window_in_seconds);
        if !self.lookup.wait_offline_lookups(window) {
            warn!("fetch of offline lookups timed out; aborting synchronization");
            return;
        }

        self.lookup.fetch_ds_info();

        let interval = Duration::from_secs(self.config.sync.new_node_sync_interval_secs);
        while self.sync_type() != SyncType::NoSync {
            self.lookup
                .fetch_latest_ds_blocks(self.ds_chain.last_block().header.block_num + 1);
            self.lookup
                .fetch_latest_tx_blocks(self.tx_chain.last_block().header.block_num + 1);
            thread::sleep(interval);
        }
        debug!("synchronization loop finished");
    }

    /// Re-enter the DS committee after falling behind. Only permitted for a
    /// backup that is not already synchronizing.
    pub fn rejoin_as_ds(self: &Arc<Self>) {
        if self.config.node.lookup_node_mode {
            warn!("rejoin_as_ds on a lookup node");
            return;
        }
        if self.sync_type() != SyncType::NoSync || self.mode() != Mode::BackupDs {
            debug!(
                sync_type = %self.sync_type(),
                mode = %self.mode(),
                "not eligible to rejoin as DS"
            );
            return;
        }

        info!(epoch = self.current_epoch(), "rejoining as DS backup");
        let service = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("ds-rejoin".to_string())
            .spawn(move || {
                service.set_sync_type(SyncType::DsSync);
                service.shard_node.prepare_rejoin(SyncType::DsSync);
                service.start_synchronization();
            });
        match spawned {
            Ok(handle) => self.register_task(handle),
            Err(e) => warn!(error = %e, "failed to spawn rejoin task"),
        }
    }

    /// Complete a rejoin once synchronization caught up: recompute this
    /// node's committee index and restart DS-block consensus.
    pub fn finish_rejoin_as_ds(&self) -> bool {
        if self.config.node.lookup_node_mode {
            warn!("finish_rejoin_as_ds on a lookup node");
            return true;
        }
        self.set_mode(Mode::BackupDs);

        let my_id = {
            let committee = self.ds_committee.lock();
            info!(size = committee.len(), "recomputing committee index");
            committee
                .iter()
                .position(|(key, _)| key == &self.self_key)
                .unwrap_or(committee.len()) as u32
        };
        self.ids.lock().my_id = my_id;

        info!(epoch = self.current_epoch(), my_id, "DS BACKUP NOW");
        self.run_consensus_on_ds_block(true)
    }
}
