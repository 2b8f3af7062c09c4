//! The directory-service node object.
//!
//! [`DirectoryService`] owns every piece of shared state the message
//! handlers touch: the state machine, the DS committee, the PoW bookkeeping
//! tables, the consensus handle, and the background-task registry. Each
//! table sits behind its own lock; where two must be held together they are
//! acquired in the fixed order documented on the struct.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use shardnet_config::Config;
use shardnet_crypto::PubKey;
use shardnet_storage::BlockStorage;
use shardnet_types::{DsBlock, Hash, Peer};
use tracing::{debug, info, warn};

use crate::chain::{DsBlockChain, TxBlockChain};
use crate::consensus::{ConsensusFactory, ConsensusRound};
use crate::lookup::Lookup;
use crate::peer_store::PeerStore;
use crate::pow_engine::PowEngine;
use crate::state::{is_action_allowed, Action, DirState, Mode};
use crate::sync::{ShardNode, SyncType};
use crate::whitelist::Whitelist;

/// Consensus bookkeeping guarded by one lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusIds {
    /// This node's index in the sorted committee.
    pub my_id: u32,
    /// The current leader's index in the sorted committee.
    pub leader_id: u32,
    /// Monotone consensus instance id.
    pub consensus_id: u32,
    /// View changes performed in the current epoch.
    pub view_change_counter: u32,
}

/// External services the directory service consumes, constructed once at
/// startup and passed in explicitly.
pub struct Services {
    /// Durable block store.
    pub storage: Arc<BlockStorage>,
    /// DS chain tip.
    pub ds_chain: Arc<DsBlockChain>,
    /// Tx chain tip.
    pub tx_chain: Arc<TxBlockChain>,
    /// Committee peer registry.
    pub peer_store: Arc<PeerStore>,
    /// DS whitelist and source-address policy.
    pub whitelist: Arc<Whitelist>,
    /// Lookup-node gateway.
    pub lookup: Arc<dyn Lookup>,
    /// PoW verifier.
    pub pow_engine: Arc<dyn PowEngine>,
    /// Consensus round factory.
    pub consensus_factory: Arc<dyn ConsensusFactory>,
    /// Sibling shard-node handle, reset on rejoin.
    pub shard_node: Arc<dyn ShardNode>,
}

/// Shared state of one directory-service node.
///
/// Lock order, outermost first, for any path that must nest:
/// `ds_committee` → `consensus` → `pending_ds_block` → `all_pows` →
/// `all_pow_conns` → `all_pow_counter` → `all_ds_pows` → `microblocks` →
/// `shards`.
/// Most paths take a single lock at a time; the PoW commit takes the
/// (`all_pows`, `all_pow_conns`) pair in that order.
pub struct DirectoryService {
    // Handle back to the owning Arc, so &self paths can hand themselves to
    // background workers (the PoW-window timer).
    pub(crate) weak_self: Weak<DirectoryService>,

    pub(crate) config: Arc<Config>,
    pub(crate) self_key: PubKey,
    pub(crate) self_peer: Peer,

    pub(crate) mode: Mutex<Mode>,
    pub(crate) state: Mutex<DirState>,
    pub(crate) state_cv: Condvar,

    pub(crate) ids: Mutex<ConsensusIds>,
    pub(crate) ds_committee: Mutex<Vec<(PubKey, Peer)>>,
    pub(crate) consensus: Mutex<Option<Box<dyn ConsensusRound>>>,
    pub(crate) pending_ds_block: Mutex<Option<DsBlock>>,

    pub(crate) all_pows: Mutex<HashMap<PubKey, Hash>>,
    pub(crate) all_pow_conns: Mutex<HashMap<PubKey, Peer>>,
    pub(crate) all_pow_counter: Mutex<HashMap<PubKey, u32>>,
    pub(crate) all_ds_pows: Mutex<HashMap<PubKey, Hash>>,
    pub(crate) microblocks: Mutex<Vec<Vec<u8>>>,
    pub(crate) shards: Mutex<Vec<Vec<(PubKey, Peer)>>>,

    pub(crate) sync_type: Mutex<SyncType>,
    pub(crate) current_epoch: AtomicU64,

    pub(crate) storage: Arc<BlockStorage>,
    pub(crate) ds_chain: Arc<DsBlockChain>,
    pub(crate) tx_chain: Arc<TxBlockChain>,
    pub(crate) peer_store: Arc<PeerStore>,
    pub(crate) whitelist: Arc<Whitelist>,
    pub(crate) lookup: Arc<dyn Lookup>,
    pub(crate) pow_engine: Arc<dyn PowEngine>,
    pub(crate) consensus_factory: Arc<dyn ConsensusFactory>,
    pub(crate) shard_node: Arc<dyn ShardNode>,

    pub(crate) tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DirectoryService {
    /// Build a directory service around its collaborators.
    pub fn new(config: Arc<Config>, self_key: PubKey, self_peer: Peer, services: Services) -> Arc<Self> {
        let service = Arc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            self_key,
            self_peer,
            mode: Mutex::new(Mode::Idle),
            state: Mutex::new(DirState::PowSubmission),
            state_cv: Condvar::new(),
            ids: Mutex::new(ConsensusIds {
                my_id: 0,
                leader_id: 0,
                consensus_id: 1,
                view_change_counter: 0,
            }),
            ds_committee: Mutex::new(Vec::new()),
            consensus: Mutex::new(None),
            pending_ds_block: Mutex::new(None),
            all_pows: Mutex::new(HashMap::new()),
            all_pow_conns: Mutex::new(HashMap::new()),
            all_pow_counter: Mutex::new(HashMap::new()),
            all_ds_pows: Mutex::new(HashMap::new()),
            microblocks: Mutex::new(Vec::new()),
            shards: Mutex::new(Vec::new()),
            sync_type: Mutex::new(SyncType::NoSync),
            current_epoch: AtomicU64::new(1),
            storage: services.storage,
            ds_chain: services.ds_chain,
            tx_chain: services.tx_chain,
            peer_store: services.peer_store,
            whitelist: services.whitelist,
            lookup: services.lookup,
            pow_engine: services.pow_engine,
            consensus_factory: services.consensus_factory,
            shard_node: services.shard_node,
            tasks: Mutex::new(Vec::new()),
            config,
        });
        if !service.config.node.lookup_node_mode {
            service.set_state(DirState::PowSubmission);
        }
        service
    }

    // ----- State machine -----------------------------------------------

    /// The single entry point for state transitions: logs the transition and
    /// wakes every waiter on the state condition variable.
    pub fn set_state(&self, new_state: DirState) {
        if self.config.node.lookup_node_mode {
            warn!("set_state called on a lookup node");
            return;
        }
        let mut state = self.state.lock();
        info!(epoch = self.current_epoch(), from = %*state, to = %new_state, "DS state transition");
        *state = new_state;
        self.state_cv.notify_all();
    }

    /// Current state.
    pub fn state(&self) -> DirState {
        *self.state.lock()
    }

    /// Current role.
    pub fn mode(&self) -> Mode {
        *self.mode.lock()
    }

    /// Force the role; used by bootstrap, rejoin, and node wiring.
    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock() = mode;
    }

    /// Whether `action` is admissible right now.
    ///
    /// Lookup nodes answer `true` (they carry no DS state machine); idle
    /// nodes reject everything; otherwise the closed `(state, action)` table
    /// decides.
    pub fn check_state(&self, action: Action) -> bool {
        if self.config.node.lookup_node_mode {
            warn!("check_state called on a lookup node");
            return true;
        }
        if self.mode() == Mode::Idle {
            warn!(epoch = self.current_epoch(), %action, "not a DS node; rejecting DS action");
            return false;
        }
        let state = self.state();
        if !is_action_allowed(state, action) {
            warn!(epoch = self.current_epoch(), %state, %action, "action not allowed in state");
            return false;
        }
        true
    }

    // ----- Consensus bookkeeping ---------------------------------------

    /// Snapshot of the consensus ids.
    pub fn consensus_ids(&self) -> ConsensusIds {
        *self.ids.lock()
    }

    /// Snapshot of the DS committee, sorted by public-key byte order.
    pub fn ds_committee(&self) -> Vec<(PubKey, Peer)> {
        self.ds_committee.lock().clone()
    }

    /// Current Tx epoch number.
    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::SeqCst)
    }

    /// Overwrite the Tx epoch number (bootstrap and sync).
    pub fn set_current_epoch(&self, epoch: u64) {
        self.current_epoch.store(epoch, Ordering::SeqCst);
    }

    /// Current sync type.
    pub fn sync_type(&self) -> SyncType {
        *self.sync_type.lock()
    }

    /// Flip the sync type; background sync loops observe this at their next
    /// iteration boundary.
    pub fn set_sync_type(&self, sync_type: SyncType) {
        *self.sync_type.lock() = sync_type;
    }

    // ----- PoW tables ---------------------------------------------------

    /// Copy of the shard-tier solution table.
    pub fn all_pows(&self) -> HashMap<PubKey, Hash> {
        self.all_pows.lock().clone()
    }

    /// Copy of the submitter connection table.
    pub fn all_pow_conns(&self) -> HashMap<PubKey, Peer> {
        self.all_pow_conns.lock().clone()
    }

    /// Copy of the DS-tier solution table.
    pub fn all_ds_pows(&self) -> HashMap<PubKey, Hash> {
        self.all_ds_pows.lock().clone()
    }

    /// The DS-tier solution recorded for `key`, if any.
    pub fn ds_pow_solution(&self, key: &PubKey) -> Option<Hash> {
        self.all_ds_pows.lock().get(key).copied()
    }

    /// Whether `key` submitted a DS-tier solution this epoch.
    pub fn has_ds_pow_solution(&self, key: &PubKey) -> bool {
        self.all_ds_pows.lock().contains_key(key)
    }

    /// Number of DS-tier solutions this epoch.
    pub fn ds_pow_count(&self) -> usize {
        self.all_ds_pows.lock().len()
    }

    /// Drop every DS-tier solution.
    pub fn clear_ds_pows(&self) {
        self.all_ds_pows.lock().clear();
    }

    /// The submission count recorded for `key` this epoch.
    pub fn pow_submission_count(&self, key: &PubKey) -> u32 {
        self.all_pow_counter.lock().get(key).copied().unwrap_or(0)
    }

    /// Whether `key` has reached the per-epoch submission limit.
    pub fn pow_submission_exceeds_limit(&self, key: &PubKey) -> bool {
        self.pow_submission_count(key) >= self.config.pow.submission_limit
    }

    /// Count one accepted submission for `key`.
    pub fn bump_pow_submission_counter(&self, key: &PubKey) {
        let mut counter = self.all_pow_counter.lock();
        *counter.entry(key.clone()).or_insert(0) += 1;
    }

    /// Drop every submission counter.
    pub fn reset_pow_submission_counter(&self) {
        self.all_pow_counter.lock().clear();
    }

    // ----- Shards -------------------------------------------------------

    /// Install the shard composition decided by the last DS block.
    pub fn set_shards(&self, shards: Vec<Vec<(PubKey, Peer)>>) {
        *self.shards.lock() = shards;
    }

    /// Copy of the shard composition.
    pub fn shards(&self) -> Vec<Vec<(PubKey, Peer)>> {
        self.shards.lock().clone()
    }

    // ----- Epoch reset --------------------------------------------------

    /// Reset every piece of per-epoch DS state. Called when a node leaves
    /// the committee or begins resynchronization.
    pub fn clean_variables(&self) {
        debug!("cleaning DS variables");
        self.shards.lock().clear();
        self.all_pow_conns.lock().clear();
        *self.consensus.lock() = None;
        *self.pending_ds_block.lock() = None;
        self.all_pows.lock().clear();
        self.clear_ds_pows();
        self.reset_pow_submission_counter();
        self.microblocks.lock().clear();
        {
            let mut ids = self.ids.lock();
            ids.view_change_counter = 0;
            ids.leader_id = 0;
            ids.consensus_id = 0;
        }
        *self.mode.lock() = Mode::Idle;
    }

    /// Clear the per-epoch PoW tables exactly once per DS epoch, at the
    /// `FinalBlockConsensus → PowSubmission` transition.
    pub(crate) fn clear_epoch_tables(&self) {
        self.all_pows.lock().clear();
        self.all_pow_conns.lock().clear();
        self.clear_ds_pows();
        self.reset_pow_submission_counter();
        self.microblocks.lock().clear();
    }

    // ----- Background tasks ---------------------------------------------

    /// Register a background worker so shutdown can join it.
    pub(crate) fn register_task(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    /// Stop background work: cancel sync and join every registered worker.
    pub fn shutdown(&self) {
        self.set_sync_type(SyncType::NoSync);
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.join() {
                warn!("background task panicked: {:?}", e);
            }
        }
    }

    /// Extra peers to forward `instruction` to beyond the committee.
    ///
    /// DS traffic is a plain multicast; there is no fan-out beyond the
    /// committee, so the list is always empty.
    pub fn broadcast_list(
        &self,
        _instruction: crate::dispatch::InstructionTag,
        _originator: &Peer,
    ) -> Vec<Peer> {
        Vec::new()
    }

    /// This node's public key.
    pub fn self_key(&self) -> &PubKey {
        &self.self_key
    }

    /// This node's own endpoint.
    pub fn self_peer(&self) -> Peer {
        self.self_peer
    }

    /// The node configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
