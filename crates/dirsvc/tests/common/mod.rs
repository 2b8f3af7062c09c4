//! Shared fixtures for the directory-service integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tempfile::TempDir;

use shardnet_config::Config;
use shardnet_crypto::SecretKey;
use shardnet_dirsvc::{
    ConsensusFactory, ConsensusOutcome, ConsensusRound, DevPowEngine, DirectoryService,
    DsBlockChain, InstructionTag, LoopbackConsensus, NoopShardNode, PeerStore, PowEngine,
    PowSubmission, QueueLookup, RoundContext, Services, TxBlockChain, Whitelist,
};
use shardnet_storage::BlockStorage;
use shardnet_types::{DsBlock, DsBlockHeader, Hash, Peer, TxBlock, PUB_KEY_SIZE};

/// A test node with handles to its observable collaborators.
pub struct TestBed {
    pub service: Arc<DirectoryService>,
    pub lookup: Arc<QueueLookup>,
    pub identity: SecretKey,
    pub ds_chain: Arc<DsBlockChain>,
    pub tx_chain: Arc<TxBlockChain>,
    _dir: TempDir,
}

/// Configuration with timers collapsed for test speed.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.pow.window_in_seconds = 0;
    config.pow.submission_timeout_secs = 0;
    config.sync.new_node_sync_interval_secs = 1;
    config
}

/// Deterministic identity for `seed`.
pub fn key_for(seed: u8) -> SecretKey {
    SecretKey::from_seed(&[seed; 32])
}

/// Routable test endpoint for `seed`.
pub fn peer_for(seed: u8) -> Peer {
    let ip: IpAddr = format!("203.0.113.{seed}").parse().unwrap();
    Peer::new(ip, 4201)
}

/// Build a node for identity `self_seed`. The peer store is pre-populated
/// with the *other* committee members, as the bootstrap sequence assumes.
pub fn build_node(config: Config, self_seed: u8, committee_seeds: &[u8]) -> TestBed {
    build_node_with(config, self_seed, committee_seeds, |services| services)
}

/// Like [`build_node`], with a hook to swap collaborators.
pub fn build_node_with(
    config: Config,
    self_seed: u8,
    committee_seeds: &[u8],
    customize: impl FnOnce(Services) -> Services,
) -> TestBed {
    let dir = TempDir::new().unwrap();
    let config = Arc::new(config);
    let storage = Arc::new(BlockStorage::open(dir.path(), config.node.lookup_node_mode).unwrap());
    let ds_chain = Arc::new(DsBlockChain::new(DsBlock::genesis(
        config.pow.difficulty,
        config.pow.ds_difficulty,
    )));
    let tx_chain = Arc::new(TxBlockChain::new(TxBlock::genesis()));

    let peer_store = Arc::new(PeerStore::new());
    for &seed in committee_seeds {
        if seed != self_seed {
            peer_store.add_peer_pair(key_for(seed).public_key().clone(), peer_for(seed));
        }
    }

    let lookup = Arc::new(QueueLookup::new());
    let identity = key_for(self_seed);
    let services = customize(Services {
        storage,
        ds_chain: ds_chain.clone(),
        tx_chain: tx_chain.clone(),
        peer_store,
        whitelist: Arc::new(Whitelist::new(config.node.exclude_private_ip)),
        lookup: lookup.clone(),
        pow_engine: Arc::new(DevPowEngine::new()),
        consensus_factory: Arc::new(LoopbackConsensus),
        shard_node: Arc::new(NoopShardNode),
    });
    let service = DirectoryService::new(
        config,
        identity.public_key().clone(),
        peer_for(self_seed),
        services,
    );

    TestBed {
        service,
        lookup,
        identity,
        ds_chain,
        tx_chain,
        _dir: dir,
    }
}

/// Deliver `SetPrimary` naming `leader_seed`'s endpoint.
pub fn bootstrap(bed: &TestBed, leader_seed: u8) {
    let mut message = vec![InstructionTag::SetPrimary as u8];
    message.extend_from_slice(&peer_for(leader_seed).to_bytes());
    assert!(bed.service.execute(&message, &peer_for(leader_seed)));
}

/// Append a DS block so the chain tip sits at `block_num` with the given
/// difficulties.
pub fn advance_ds_chain_to(bed: &TestBed, block_num: u64, difficulty: u8, ds_difficulty: u8) {
    let last = bed.ds_chain.last_block();
    bed.ds_chain.append(DsBlock::new(DsBlockHeader {
        block_num,
        difficulty,
        ds_difficulty,
        prev_hash: last.hash(),
        winner_pubkey: [0u8; PUB_KEY_SIZE],
        leader_pubkey: [0u8; PUB_KEY_SIZE],
        timestamp: 1_700_000_000,
    }));
}

/// Mine and sign a complete PoW submission payload (without instruction tag).
pub fn pow_payload(
    bed: &TestBed,
    miner: &SecretKey,
    block_num: u64,
    difficulty: u8,
    listen_port: u16,
    source_ip: IpAddr,
) -> Vec<u8> {
    let rand1 = bed.ds_chain.randomness();
    let rand2 = bed.tx_chain.randomness();
    let (nonce, result_hash, mixhash) = DevPowEngine::mine(
        block_num,
        difficulty,
        &rand1,
        &rand2,
        source_ip,
        miner.public_key(),
    );
    let mut submission = PowSubmission {
        ds_block_num: block_num,
        difficulty,
        listen_port,
        pubkey: miner.public_key().to_bytes(),
        nonce,
        result_hash,
        mixhash,
        signature: [0u8; 64],
    };
    submission.signature = miner.sign(&submission.encode_unsigned()).to_bytes();
    submission.to_bytes()
}

/// Prefix `payload` with an instruction tag.
pub fn tagged(tag: InstructionTag, payload: &[u8]) -> Vec<u8> {
    let mut message = vec![tag as u8];
    message.extend_from_slice(payload);
    message
}

/// PoW engine whose `verify` blocks until the test releases it; lets tests
/// change the DS state while a submission is mid-verification.
#[derive(Default)]
pub struct GatedPowEngine {
    gate: Mutex<Gate>,
    cv: Condvar,
}

#[derive(Default)]
struct Gate {
    entered: bool,
    released: bool,
}

impl GatedPowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until a submission reached `verify`.
    pub fn wait_until_entered(&self) {
        let mut gate = self.gate.lock();
        while !gate.entered {
            self.cv.wait(&mut gate);
        }
    }

    /// Let the blocked `verify` return `true`.
    pub fn release(&self) {
        self.gate.lock().released = true;
        self.cv.notify_all();
    }
}

impl PowEngine for GatedPowEngine {
    fn verify(
        &self,
        _block_num: u64,
        _difficulty: u8,
        _rand1: &Hash,
        _rand2: &Hash,
        _ip: IpAddr,
        _pubkey: &shardnet_crypto::PubKey,
        _full_dataset: bool,
        _nonce: u64,
        _result_hash: &Hash,
        _mixhash: &Hash,
    ) -> bool {
        let mut gate = self.gate.lock();
        gate.entered = true;
        self.cv.notify_all();
        while !gate.released {
            self.cv.wait(&mut gate);
        }
        true
    }
}

/// Consensus factory whose rounds report a scripted outcome on the first
/// message; later rounds pop the next outcome from the queue.
pub struct ScriptedConsensus {
    outcomes: Mutex<VecDeque<ConsensusOutcome>>,
}

impl ScriptedConsensus {
    pub fn new(outcomes: impl IntoIterator<Item = ConsensusOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
        }
    }
}

impl ConsensusFactory for ScriptedConsensus {
    fn create_round(&self, _ctx: RoundContext) -> Box<dyn ConsensusRound> {
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or(ConsensusOutcome::Done);
        Box::new(ScriptedRound {
            outcome,
            payload: None,
        })
    }
}

struct ScriptedRound {
    outcome: ConsensusOutcome,
    payload: Option<Vec<u8>>,
}

impl ConsensusRound for ScriptedRound {
    fn start(&mut self, proposal: Vec<u8>) -> bool {
        self.payload = Some(proposal);
        true
    }

    fn handle_message(&mut self, message: &[u8], _from: &Peer) -> ConsensusOutcome {
        if self.payload.is_none() {
            self.payload = Some(message.to_vec());
        }
        self.outcome
    }

    fn agreed_payload(&self) -> Option<Vec<u8>> {
        self.payload.clone()
    }
}
