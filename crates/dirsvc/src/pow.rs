//! PoW submission intake.
//!
//! The highest-volume handler on a DS node. Each submission runs the full
//! admission pipeline (freshness, whitelist, state guard, source-address
//! policy, rate limit, signature, difficulty gate, hash verification) and
//! only then commits into the in-memory tables consumed by DS-block
//! consensus. Any failure short-circuits without touching shared state.

use std::time::{Duration, Instant};

use shardnet_crypto::{PubKey, Signature};
use shardnet_types::{
    wire::{Reader, Writer},
    DsBlock, Hash, Peer, Result as TypesResult, BLOCK_HASH_SIZE, PUB_KEY_SIZE, SIGNATURE_SIZE,
};
use tracing::{debug, info, warn};

use crate::service::DirectoryService;
use crate::state::Action;

/// A parsed PoW submission payload.
///
/// Wire layout, offset 0 of the payload after the instruction tag:
///
/// ```text
/// u64     ds_block_num
/// u8      difficulty_level
/// u32     listen_port
/// u8[33]  submitter_pubkey
/// u64     nonce
/// u8[32]  result_hash
/// u8[32]  mixhash
/// u8[64]  signature          (32-byte challenge ‖ 32-byte response)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowSubmission {
    /// DS block the solution targets (must be the next block).
    pub ds_block_num: u64,
    /// Claimed difficulty tier.
    pub difficulty: u8,
    /// Port the submitter listens on; its IP comes from the transport.
    pub listen_port: u16,
    /// Submitter public key, compressed.
    pub pubkey: [u8; PUB_KEY_SIZE],
    /// Winning nonce.
    pub nonce: u64,
    /// Winning hash.
    pub result_hash: Hash,
    /// Mix hash accompanying the result.
    pub mixhash: Hash,
    /// Schnorr signature over the payload prefix before this field.
    pub signature: [u8; SIGNATURE_SIZE],
}

impl PowSubmission {
    /// Offset of the signature field; the signed prefix is `[0, here)`.
    pub const SIGNATURE_OFFSET: usize = 8 + 1 + 4 + PUB_KEY_SIZE + 8 + 2 * BLOCK_HASH_SIZE;

    /// Total payload size.
    pub const WIRE_SIZE: usize = Self::SIGNATURE_OFFSET + SIGNATURE_SIZE;

    /// Encode every field before the signature.
    pub fn encode_unsigned(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(Self::SIGNATURE_OFFSET);
        w.write_u64(self.ds_block_num);
        w.write_u8(self.difficulty);
        w.write_u32(u32::from(self.listen_port));
        w.write_bytes(&self.pubkey);
        w.write_u64(self.nonce);
        w.write_bytes(&self.result_hash);
        w.write_bytes(&self.mixhash);
        w.into_bytes()
    }

    /// Encode the full payload, signature included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.encode_unsigned();
        bytes.extend_from_slice(&self.signature);
        bytes
    }

    /// Decode a payload. Trailing bytes beyond the fixed layout are ignored.
    pub fn from_bytes(bytes: &[u8]) -> TypesResult<Self> {
        let mut r = Reader::new(bytes);
        Ok(Self {
            ds_block_num: r.read_u64()?,
            difficulty: r.read_u8()?,
            listen_port: r.read_u32()? as u16,
            pubkey: r.read_array()?,
            nonce: r.read_u64()?,
            result_hash: r.read_array()?,
            mixhash: r.read_array()?,
            signature: r.read_array()?,
        })
    }
}

impl DirectoryService {
    /// Handle an inbound PoW submission.
    ///
    /// A submission that fails only the `VerifyPow` state guard returns
    /// `true`: the miner worked honestly and the window simply closed, so
    /// the drop is benign and must not look like a fault to the sender.
    pub(crate) fn process_pow_submission(&self, payload: &[u8], from: &Peer) -> bool {
        if self.config.node.lookup_node_mode {
            warn!("PoW submission on a lookup node");
            return true;
        }

        // Late-arrival grace: if final-block consensus is still running,
        // wait for the transition back into the submission window.
        {
            let timeout = Duration::from_secs(self.config.pow.submission_timeout_secs);
            let deadline = Instant::now() + timeout;
            let mut state = self.state.lock();
            if *state == crate::state::DirState::FinalBlockConsensus {
                while *state == crate::state::DirState::FinalBlockConsensus {
                    if self.state_cv.wait_until(&mut state, deadline).timed_out() {
                        warn!(
                            epoch = self.current_epoch(),
                            "timed out waiting for state transition"
                        );
                        break;
                    }
                }
                debug!(epoch = self.current_epoch(), state = %*state, "state transition wait finished");
            }
        }

        if !self.check_state(Action::ProcessPowSubmission) {
            info!(
                epoch = self.current_epoch(),
                state = %self.state(),
                "not in the PoW submission window"
            );
            return false;
        }

        if payload.len() < PowSubmission::WIRE_SIZE {
            warn!(
                size = payload.len(),
                expected = PowSubmission::WIRE_SIZE,
                "PoW message size inappropriate"
            );
            return false;
        }

        let submission = match PowSubmission::from_bytes(payload) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to parse PoW submission");
                return false;
            }
        };

        // Freshness: only solutions for the very next DS block count.
        let last = self.ds_chain.last_block();
        let expected_block = last.header.block_num + 1;
        if submission.ds_block_num < expected_block {
            warn!(
                epoch = self.current_epoch(),
                got = submission.ds_block_num,
                expected = expected_block,
                "PoW for a duplicated DS block"
            );
            return false;
        }
        if submission.ds_block_num > expected_block {
            info!(
                epoch = self.current_epoch(),
                got = submission.ds_block_num,
                expected = expected_block,
                "PoW ahead of our chain; we are missing DS blocks"
            );
            return false;
        }

        // The IP comes from the transport; only the port is trusted from
        // the payload.
        let peer = Peer::new(from.ip, submission.listen_port);

        let key = match PubKey::from_bytes(&submission.pubkey) {
            Ok(k) => k,
            Err(e) => {
                warn!(error = %e, "failed to deserialize submitter public key");
                return false;
            }
        };

        if self.config.node.test_net_mode
            && !self.whitelist.is_node_in_ds_whitelist(&peer, &key)
        {
            warn!(
                epoch = self.current_epoch(),
                %peer,
                submitter = %key,
                "PoW submitted by a node missing from the DS whitelist"
            );
            if self.config.node.require_ds_whitelist {
                return false;
            }
        }

        if !self.check_state(Action::VerifyPow) {
            info!(
                epoch = self.current_epoch(),
                state = %self.state(),
                "too late to verify PoW; treating as benign"
            );
            return true;
        }

        if !self.whitelist.is_valid_ip(peer.ip) {
            warn!(%peer, "PoW source is a private or broadcast address");
            return false;
        }

        if self.pow_submission_exceeds_limit(&key) {
            warn!(%peer, submitter = %key, "PoW submission limit exceeded");
            return false;
        }

        let sig = Signature::from_bytes(&submission.signature);
        if !key.verify(&payload[..PowSubmission::SIGNATURE_OFFSET], &sig) {
            warn!(submitter = %key, "PoW submission signature wrong");
            return false;
        }

        let (expected_diff, expected_ds_diff) =
            self.expected_difficulties(&last, submission.ds_block_num);
        if submission.difficulty != expected_diff && submission.difficulty != expected_ds_diff {
            warn!(
                got = submission.difficulty,
                shard_tier = expected_diff,
                ds_tier = expected_ds_diff,
                "invalid difficulty level"
            );
            return false;
        }

        let rand1 = self.ds_chain.randomness();
        let rand2 = self.tx_chain.randomness();
        let verified = self.pow_engine.verify(
            submission.ds_block_num,
            submission.difficulty,
            &rand1,
            &rand2,
            from.ip,
            &key,
            false,
            submission.nonce,
            &submission.result_hash,
            &submission.mixhash,
        );
        if !verified {
            info!(
                epoch = self.current_epoch(),
                block_num = submission.ds_block_num,
                difficulty = submission.difficulty,
                nonce = submission.nonce,
                %peer,
                rand1 = %hex::encode(rand1),
                rand2 = %hex::encode(rand2),
                "invalid PoW submission"
            );
            return false;
        }

        // The window may have closed while we were verifying; a solution
        // that misses the cut is still a valid solution.
        if !self.check_state(Action::VerifyPow) {
            info!(
                epoch = self.current_epoch(),
                state = %self.state(),
                "too late to record PoW"
            );
            return true;
        }

        info!(
            epoch = self.current_epoch(),
            submitter = %key,
            %peer,
            result = %hex::encode(&submission.result_hash[..8]),
            "PoW verification passed"
        );

        {
            // Joint commit: all_pows before all_pow_conns, always.
            let mut pows = self.all_pows.lock();
            let mut conns = self.all_pow_conns.lock();
            conns.insert(key.clone(), peer);
            pows.insert(key.clone(), submission.result_hash);
        }
        if submission.difficulty == expected_ds_diff {
            self.all_ds_pows
                .lock()
                .insert(key.clone(), submission.result_hash);
        }
        self.bump_pow_submission_counter(&key);

        true
    }

    /// The shard-tier and DS-tier difficulties a submission must meet.
    /// Past the genesis slot they come from the previous DS block header.
    pub(crate) fn expected_difficulties(&self, last: &DsBlock, block_num: u64) -> (u8, u8) {
        if block_num > 1 {
            (last.header.difficulty, last.header.ds_difficulty)
        } else {
            (self.config.pow.difficulty, self.config.pow.ds_difficulty)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_size_matches_layout() {
        assert_eq!(PowSubmission::SIGNATURE_OFFSET, 118);
        assert_eq!(PowSubmission::WIRE_SIZE, 182);
    }

    #[test]
    fn encode_decode_round_trip() {
        let submission = PowSubmission {
            ds_block_num: 11,
            difficulty: 5,
            listen_port: 33133,
            pubkey: [2u8; PUB_KEY_SIZE],
            nonce: 99,
            result_hash: [3u8; 32],
            mixhash: [4u8; 32],
            signature: [5u8; SIGNATURE_SIZE],
        };
        let bytes = submission.to_bytes();
        assert_eq!(bytes.len(), PowSubmission::WIRE_SIZE);
        assert_eq!(PowSubmission::from_bytes(&bytes).unwrap(), submission);
    }

    #[test]
    fn short_payload_fails_to_parse() {
        let bytes = vec![0u8; PowSubmission::WIRE_SIZE - 1];
        assert!(PowSubmission::from_bytes(&bytes).is_err());
    }
}
