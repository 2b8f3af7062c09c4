//! DS-epoch sequencing.
//!
//! Drives the consensus phases of one epoch: composing and agreeing the DS
//! block, collecting microblocks, agreeing the final Tx block, and rotating
//! the leader through view change when a round fails. The consensus
//! primitive itself stays behind [`crate::consensus::ConsensusRound`]; this
//! module owns what happens *between* rounds.

use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use shardnet_types::{keccak256, DsBlock, DsBlockHeader, Peer, TxBlock, TxBlockHeader, PUB_KEY_SIZE};
use tracing::{debug, info, warn};

use crate::consensus::{ConsensusOutcome, RoundContext};
use crate::service::DirectoryService;
use crate::state::{Action, DirState, Mode};

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl DirectoryService {
    /// Arm the end of the PoW submission window: after
    /// `pow.window_in_seconds` the node stops collecting solutions and
    /// starts DS-block consensus. Every final-block commit re-arms this as
    /// it reopens the window; a timer that lapses outside the window is a
    /// no-op.
    pub fn start_pow_window_timer(&self) {
        let Some(service) = self.weak_self.upgrade() else {
            warn!("cannot arm PoW window timer without a live service handle");
            return;
        };
        let spawned = thread::Builder::new()
            .name("pow-window".to_string())
            .spawn(move || {
                thread::sleep(Duration::from_secs(service.config.pow.window_in_seconds));
                if service.mode() == Mode::Idle || service.state() != DirState::PowSubmission {
                    debug!(
                        state = %service.state(),
                        "PoW window timer lapsed outside the submission window"
                    );
                    return;
                }
                info!(epoch = service.current_epoch(), "PoW window closed");
                service.run_consensus_on_ds_block(false);
            });
        match spawned {
            Ok(handle) => self.register_task(handle),
            Err(e) => warn!(error = %e, "failed to spawn PoW window timer"),
        }
    }

    /// Compose the next DS block and start consensus on it.
    ///
    /// `is_rejoin` marks a round entered through [`Self::finish_rejoin_as_ds`].
    pub fn run_consensus_on_ds_block(&self, is_rejoin: bool) -> bool {
        if self.mode() == Mode::Idle {
            warn!("cannot run DS-block consensus while idle");
            return false;
        }
        self.set_state(DirState::DsBlockConsensusPrep);

        let last = self.ds_chain.last_block();
        let block_num = last.header.block_num + 1;
        let new_difficulty = self.calculate_new_difficulty(last.header.difficulty);

        // The admitted winner is the DS-tier solution with the smallest
        // result hash.
        let winner_pubkey = {
            let ds_pows = self.all_ds_pows.lock();
            ds_pows
                .iter()
                .min_by(|a, b| a.1.cmp(b.1))
                .map(|(key, _)| key.to_bytes())
                .unwrap_or([0u8; PUB_KEY_SIZE])
        };

        let committee = self.ds_committee();
        let ids = self.consensus_ids();
        let leader_pubkey = committee
            .get(ids.leader_id as usize)
            .map(|(key, _)| key.to_bytes())
            .unwrap_or([0u8; PUB_KEY_SIZE]);

        let pending = DsBlock::new(DsBlockHeader {
            block_num,
            difficulty: new_difficulty,
            ds_difficulty: last.header.ds_difficulty,
            prev_hash: last.hash(),
            winner_pubkey,
            leader_pubkey,
            timestamp: unix_now(),
        });

        let ctx = RoundContext {
            consensus_id: ids.consensus_id,
            my_id: ids.my_id,
            leader_id: ids.leader_id,
            committee,
        };
        let is_leader = ctx.is_leader();

        {
            // consensus precedes pending_ds_block in the lock order.
            let mut consensus = self.consensus.lock();
            let mut round = self.consensus_factory.create_round(ctx);
            if is_leader && !round.start(pending.to_bytes()) {
                warn!(block_num, "failed to announce DS-block proposal");
            }
            *consensus = Some(round);
            *self.pending_ds_block.lock() = Some(pending);
        }

        info!(
            epoch = self.current_epoch(),
            block_num,
            difficulty = new_difficulty,
            is_rejoin,
            "DS-block consensus starting"
        );
        self.set_state(DirState::DsBlockConsensus);
        true
    }

    /// Handle DS-block consensus traffic.
    pub(crate) fn process_ds_block_consensus(&self, payload: &[u8], from: &Peer) -> bool {
        if !self.check_state(Action::ProcessDsBlockConsensus) {
            return false;
        }
        let outcome = {
            let mut consensus = self.consensus.lock();
            match consensus.as_mut() {
                Some(round) => round.handle_message(payload, from),
                None => {
                    warn!("DS-block consensus message without an active round");
                    return false;
                }
            }
        };
        match outcome {
            ConsensusOutcome::Pending => true,
            ConsensusOutcome::Done => self.commit_pending_ds_block(),
            ConsensusOutcome::Failed => {
                warn!(epoch = self.current_epoch(), "DS-block consensus failed");
                self.run_view_change();
                false
            }
        }
    }

    fn commit_pending_ds_block(&self) -> bool {
        let block = match self.pending_ds_block.lock().take() {
            Some(b) => b,
            None => {
                warn!("DS-block consensus finished without a pending block");
                return false;
            }
        };
        let block_num = block.header.block_num;
        if let Err(e) = self.storage.put_ds_block(block_num, &block) {
            warn!(block_num, error = %e, "failed to persist DS block");
            return false;
        }
        self.ds_chain.append(block);
        self.ids.lock().consensus_id += 1;
        info!(epoch = self.current_epoch(), block_num, "DS block committed");
        self.set_state(DirState::MicroblockSubmission);
        true
    }

    /// Handle a microblock from a shard. Once every shard reported, the
    /// final-block phase starts.
    pub(crate) fn process_microblock_submission(&self, payload: &[u8], _from: &Peer) -> bool {
        if !self.check_state(Action::ProcessMicroblockSubmission) {
            return false;
        }
        let received = {
            let mut microblocks = self.microblocks.lock();
            microblocks.push(payload.to_vec());
            microblocks.len()
        };
        let expected = self.shards.lock().len().max(1);
        debug!(received, expected, "microblock recorded");
        if received >= expected {
            self.run_consensus_on_final_block();
        }
        true
    }

    fn run_consensus_on_final_block(&self) {
        self.set_state(DirState::FinalBlockConsensusPrep);

        let last_tx = self.tx_chain.last_block();
        let (tx_hashes, root_input) = {
            let microblocks = self.microblocks.lock();
            let hashes: Vec<_> = microblocks.iter().map(|m| keccak256(m)).collect();
            let mut concat = Vec::new();
            for m in microblocks.iter() {
                concat.extend_from_slice(m);
            }
            (hashes, concat)
        };

        let proposal = TxBlock::new(
            TxBlockHeader {
                block_num: last_tx.header.block_num + 1,
                ds_block_num: self.ds_chain.last_block().header.block_num,
                prev_hash: last_tx.hash(),
                tx_root_hash: keccak256(&root_input),
                num_txs: 0,
                timestamp: unix_now(),
            },
            tx_hashes,
        );

        let ids = self.consensus_ids();
        let ctx = RoundContext {
            consensus_id: ids.consensus_id,
            my_id: ids.my_id,
            leader_id: ids.leader_id,
            committee: self.ds_committee(),
        };
        let is_leader = ctx.is_leader();

        {
            let mut consensus = self.consensus.lock();
            let mut round = self.consensus_factory.create_round(ctx);
            if is_leader && !round.start(proposal.to_bytes()) {
                warn!(
                    block_num = proposal.header.block_num,
                    "failed to announce final-block proposal"
                );
            }
            *consensus = Some(round);
        }

        info!(
            epoch = self.current_epoch(),
            block_num = proposal.header.block_num,
            "final-block consensus starting"
        );
        self.set_state(DirState::FinalBlockConsensus);
    }

    /// Handle final-block consensus traffic. On agreement the Tx block is
    /// persisted, the epoch advances, and the PoW tables are cleared for
    /// the next submission window.
    pub(crate) fn process_final_block_consensus(&self, payload: &[u8], from: &Peer) -> bool {
        if !self.check_state(Action::ProcessFinalBlockConsensus) {
            return false;
        }
        let outcome = {
            let mut consensus = self.consensus.lock();
            match consensus.as_mut() {
                Some(round) => round.handle_message(payload, from),
                None => {
                    warn!("final-block consensus message without an active round");
                    return false;
                }
            }
        };
        match outcome {
            ConsensusOutcome::Pending => true,
            ConsensusOutcome::Done => self.commit_final_block(),
            ConsensusOutcome::Failed => {
                warn!(epoch = self.current_epoch(), "final-block consensus failed");
                self.run_view_change();
                false
            }
        }
    }

    fn commit_final_block(&self) -> bool {
        let payload = {
            let consensus = self.consensus.lock();
            consensus.as_ref().and_then(|round| round.agreed_payload())
        };
        let block = match payload.map(|bytes| TxBlock::from_bytes(&bytes)) {
            Some(Ok(block)) => block,
            Some(Err(e)) => {
                warn!(error = %e, "agreed final-block payload failed to decode");
                return false;
            }
            None => {
                warn!("final-block consensus finished without a payload");
                return false;
            }
        };

        let block_num = block.header.block_num;
        if let Err(e) = self.storage.put_tx_block(block_num, &block) {
            warn!(block_num, error = %e, "failed to persist Tx block");
            return false;
        }
        self.tx_chain.append(block);
        self.ids.lock().consensus_id += 1;
        let epoch = self.current_epoch() + 1;
        self.set_current_epoch(epoch);

        info!(epoch, block_num, "final block committed; opening PoW window");

        // The per-epoch tables are cleared exactly once, here, on the
        // FinalBlockConsensus -> PowSubmission transition. Reopening the
        // window re-arms the timer that will close it.
        self.clear_epoch_tables();
        self.set_state(DirState::PowSubmission);
        self.start_pow_window_timer();
        true
    }

    /// Enter view-change consensus after a failed round.
    pub(crate) fn run_view_change(&self) {
        self.set_state(DirState::ViewchangeConsensusPrep);

        let ids = self.consensus_ids();
        let committee = self.ds_committee();
        let committee_size = committee.len().max(1) as u32;
        // The next backup in committee order drives the change.
        let candidate_id = (ids.leader_id + 1) % committee_size;

        let ctx = RoundContext {
            consensus_id: ids.consensus_id,
            my_id: ids.my_id,
            leader_id: candidate_id,
            committee,
        };
        let is_candidate = ctx.is_leader();

        {
            let mut consensus = self.consensus.lock();
            let mut round = self.consensus_factory.create_round(ctx);
            if is_candidate
                && !round.start(ids.view_change_counter.to_be_bytes().to_vec())
            {
                warn!("failed to announce view change");
            }
            *consensus = Some(round);
        }

        info!(
            epoch = self.current_epoch(),
            candidate_id, "view-change consensus starting"
        );
        self.set_state(DirState::ViewchangeConsensus);
    }

    /// Handle view-change consensus traffic. On agreement the leadership
    /// rotates to the next committee member and DS-block consensus restarts.
    pub(crate) fn process_view_change_consensus(&self, payload: &[u8], from: &Peer) -> bool {
        if !self.check_state(Action::ProcessViewChangeConsensus) {
            return false;
        }
        let outcome = {
            let mut consensus = self.consensus.lock();
            match consensus.as_mut() {
                Some(round) => round.handle_message(payload, from),
                None => {
                    warn!("view-change message without an active round");
                    return false;
                }
            }
        };
        match outcome {
            ConsensusOutcome::Pending => true,
            ConsensusOutcome::Done => {
                let committee_size = self.ds_committee.lock().len().max(1) as u32;
                let new_leader = {
                    let mut ids = self.ids.lock();
                    ids.view_change_counter += 1;
                    ids.leader_id = (ids.leader_id + 1) % committee_size;
                    ids.leader_id
                };
                let is_me = {
                    let ids = self.ids.lock();
                    ids.leader_id == ids.my_id
                };
                self.set_mode(if is_me { Mode::PrimaryDs } else { Mode::BackupDs });
                info!(
                    epoch = self.current_epoch(),
                    new_leader, "view change complete; restarting DS-block consensus"
                );
                self.run_consensus_on_ds_block(false)
            }
            ConsensusOutcome::Failed => {
                warn!(epoch = self.current_epoch(), "view-change consensus failed");
                self.set_state(DirState::Error);
                false
            }
        }
    }
}
