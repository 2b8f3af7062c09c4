//! # Shardnet directory service
//!
//! The directory-service (DS) node core of the Shardnet sharded
//! proof-of-work blockchain. A small rotating DS committee gates entry into
//! the network by verifying PoW solutions, assembles them into DS blocks via
//! leader-driven consensus, coordinates microblock collection and the final
//! Tx block within each DS epoch, and recovers from leader failures through
//! view change.
//!
//! ## Epoch flow
//!
//! ```text
//!           PoW window (pow.window_in_seconds)
//! PowSubmission ───────────────▶ DsBlockConsensusPrep ─▶ DsBlockConsensus
//!       ▲                                                     │ agreed
//!       │ tables cleared                                      ▼
//! FinalBlockConsensus ◀─ FinalBlockConsensusPrep ◀─ MicroblockSubmission
//!       │ failed round                     ▲
//!       ▼                                  │ new leader
//! ViewchangeConsensusPrep ─▶ ViewchangeConsensus ──────────────┘
//! ```
//!
//! The BFT consensus primitive, the PoW hash engine, the lookup gossip, and
//! the shard-node sibling are collaborators consumed through the narrow
//! traits in [`consensus`], [`pow_engine`], [`lookup`], and [`sync`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod bootstrap;
pub mod chain;
pub mod consensus;
pub mod difficulty;
pub mod dispatch;
pub mod epoch;
pub mod lookup;
pub mod peer_store;
pub mod pow;
pub mod pow_engine;
pub mod service;
pub mod state;
pub mod sync;
pub mod whitelist;

pub use bootstrap::{build_set_ds_info_message, decode_set_ds_info_message};
pub use chain::{DsBlockChain, TxBlockChain};
pub use consensus::{
    ConsensusFactory, ConsensusOutcome, ConsensusRound, LoopbackConsensus, RoundContext,
};
pub use dispatch::InstructionTag;
pub use lookup::{Lookup, LookupRequest, QueueLookup};
pub use peer_store::PeerStore;
pub use pow::PowSubmission;
pub use pow_engine::{leading_zero_bits, DevPowEngine, PowEngine};
pub use service::{ConsensusIds, DirectoryService, Services};
pub use state::{is_action_allowed, Action, DirState, Mode};
pub use sync::{NoopShardNode, ShardNode, SyncType};
pub use whitelist::Whitelist;
