//! BFT consensus collaborator interface.
//!
//! The consensus primitive itself (commit/challenge/response aggregation)
//! lives outside this crate. The directory service creates one
//! [`ConsensusRound`] per block via the [`ConsensusFactory`], feeds it
//! inbound messages, and reacts to the returned [`ConsensusOutcome`].
//! [`LoopbackConsensus`] is the single-node development stand-in.

use shardnet_crypto::PubKey;
use shardnet_types::Peer;

/// Progress of a consensus round after handling a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusOutcome {
    /// The round needs more messages.
    Pending,
    /// The round reached agreement.
    Done,
    /// The round failed; the caller should start a view change.
    Failed,
}

/// Everything a round needs to know about its committee.
#[derive(Debug, Clone)]
pub struct RoundContext {
    /// Monotone consensus instance id.
    pub consensus_id: u32,
    /// This node's index in the sorted committee.
    pub my_id: u32,
    /// The leader's index in the sorted committee.
    pub leader_id: u32,
    /// The committee, sorted by public-key byte order.
    pub committee: Vec<(PubKey, Peer)>,
}

impl RoundContext {
    /// Whether this node leads the round.
    pub fn is_leader(&self) -> bool {
        self.my_id == self.leader_id
    }
}

/// One consensus instance over one proposal.
pub trait ConsensusRound: Send {
    /// Leader entry point: announce `proposal` to the committee.
    fn start(&mut self, proposal: Vec<u8>) -> bool;

    /// Feed an inbound consensus message into the round.
    fn handle_message(&mut self, message: &[u8], from: &Peer) -> ConsensusOutcome;

    /// The agreed payload, once the round is [`ConsensusOutcome::Done`].
    fn agreed_payload(&self) -> Option<Vec<u8>>;
}

/// Creates consensus rounds for the directory service.
pub trait ConsensusFactory: Send + Sync {
    /// Create a round for the given committee context.
    fn create_round(&self, ctx: RoundContext) -> Box<dyn ConsensusRound>;
}

/// Development consensus: the leader's proposal is agreed as soon as any
/// message (or the leader's own start) touches the round. Single-node and
/// test wiring only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackConsensus;

impl ConsensusFactory for LoopbackConsensus {
    fn create_round(&self, ctx: RoundContext) -> Box<dyn ConsensusRound> {
        Box::new(LoopbackRound {
            is_leader: ctx.is_leader(),
            payload: None,
        })
    }
}

struct LoopbackRound {
    is_leader: bool,
    payload: Option<Vec<u8>>,
}

impl ConsensusRound for LoopbackRound {
    fn start(&mut self, proposal: Vec<u8>) -> bool {
        if !self.is_leader {
            return false;
        }
        self.payload = Some(proposal);
        true
    }

    fn handle_message(&mut self, message: &[u8], _from: &Peer) -> ConsensusOutcome {
        if self.payload.is_none() {
            self.payload = Some(message.to_vec());
        }
        ConsensusOutcome::Done
    }

    fn agreed_payload(&self) -> Option<Vec<u8>> {
        self.payload.clone()
    }
}
