//! Bootstrap: the `SetPrimary` instruction.
//!
//! Invoked once, at network genesis. The payload names the round-0 leader;
//! every DS node derives its role from it, snapshots the committee from the
//! peer store (already sorted by public-key bytes), and the leader gossips
//! the full committee to the lookup nodes. After the PoW window elapses the
//! node moves straight into DS-block consensus.

use std::thread;
use std::time::Duration;

use shardnet_crypto::PubKey;
use shardnet_types::{
    wire::{Reader, Writer},
    Peer,
};
use tracing::{info, warn};

use crate::dispatch::{LOOKUP_SET_DS_INFO_FROM_SEED, MSG_TYPE_LOOKUP};
use crate::service::DirectoryService;
use crate::state::Mode;

/// Build the `[LOOKUP, SETDSINFOFROMSEED, u32 count, (PubKey ‖ Peer)×count]`
/// gossip announcing the DS committee to the lookup nodes.
pub fn build_set_ds_info_message(committee: &[(PubKey, Peer)]) -> Vec<u8> {
    let mut w = Writer::with_capacity(2 + 4 + committee.len() * (33 + Peer::WIRE_SIZE));
    w.write_u8(MSG_TYPE_LOOKUP);
    w.write_u8(LOOKUP_SET_DS_INFO_FROM_SEED);
    w.write_u32(committee.len() as u32);
    for (key, peer) in committee {
        w.write_bytes(key.as_bytes());
        peer.encode(&mut w);
    }
    w.into_bytes()
}

/// Decode a committee gossip built by [`build_set_ds_info_message`].
/// Used by lookup nodes ingesting the bootstrap announcement.
pub fn decode_set_ds_info_message(message: &[u8]) -> Option<Vec<(PubKey, Peer)>> {
    let mut r = Reader::new(message);
    if r.read_u8().ok()? != MSG_TYPE_LOOKUP || r.read_u8().ok()? != LOOKUP_SET_DS_INFO_FROM_SEED {
        return None;
    }
    let count = r.read_u32().ok()?;
    let mut committee = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key_bytes: [u8; 33] = r.read_array().ok()?;
        let key = PubKey::from_bytes(&key_bytes).ok()?;
        let peer = Peer::decode(&mut r).ok()?;
        committee.push((key, peer));
    }
    Some(committee)
}

impl DirectoryService {
    /// Handle `SetPrimary`: assign the role, snapshot the committee, and
    /// kick off the first DS-block consensus after the PoW window.
    pub(crate) fn process_set_primary(&self, payload: &[u8], _from: &Peer) -> bool {
        if self.config.node.lookup_node_mode {
            warn!("SetPrimary on a lookup node");
            return true;
        }

        let primary = match Peer::from_bytes(payload) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to deserialize the primary peer");
                return false;
            }
        };

        let epoch = self.current_epoch();
        if primary == self.self_peer {
            info!(epoch, "I am the DS committee leader");
            self.set_mode(Mode::PrimaryDs);
        } else {
            info!(epoch, me = %self.self_peer, leader = %primary, "I am a DS committee backup");
            self.set_mode(Mode::BackupDs);
        }

        // The peer store already holds every fellow committee member sorted
        // by public key; the smallest key is the round-0 leader. The leader
        // announces the full committee (its own real endpoint included) to
        // the lookup nodes.
        if primary == self.self_peer {
            self.peer_store
                .add_peer_pair(self.self_key.clone(), self.self_peer);
            let committee = self.peer_store.get_all_peer_pairs();
            let message = build_set_ds_info_message(&committee);
            self.lookup.send_message_to_lookup_nodes(&message);
        }

        // Record ourselves under a sentinel endpoint, snapshot, then drop
        // our own entry from the store again.
        self.peer_store
            .add_peer_pair(self.self_key.clone(), Peer::unspecified());
        let committee = self.peer_store.get_all_peer_pairs();
        self.peer_store.remove_peer(&self.self_key);

        let my_id = committee
            .iter()
            .position(|(key, _)| key == &self.self_key)
            .unwrap_or(committee.len()) as u32;
        {
            let mut ids = self.ids.lock();
            ids.my_id = my_id;
            ids.leader_id = 0;
        }
        *self.ds_committee.lock() = committee;

        info!(
            epoch,
            my_id,
            next_ds_block = self.ds_chain.last_block().header.block_num + 1,
            "start of epoch"
        );
        if primary == self.self_peer {
            info!(ident = %self.self_peer.ip, id = 0, "DS LEADER NOW");
        } else {
            info!(ident = %self.self_peer.ip, id = my_id, "DS BACKUP NOW");
        }

        let window = self.config.pow.window_in_seconds;
        info!(epoch, window, "accepting PoW submissions");
        thread::sleep(Duration::from_secs(window));

        info!(epoch, "starting consensus on DS block");
        self.run_consensus_on_ds_block(false);

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardnet_crypto::SecretKey;
    use std::net::IpAddr;

    #[test]
    fn ds_info_message_round_trip() {
        let committee: Vec<(PubKey, Peer)> = (1u8..=3)
            .map(|i| {
                let key = SecretKey::from_seed(&[i; 32]).public_key().clone();
                let ip: IpAddr = format!("203.0.113.{i}").parse().unwrap();
                (key, Peer::new(ip, 4200 + u16::from(i)))
            })
            .collect();

        let message = build_set_ds_info_message(&committee);
        assert_eq!(message[0], MSG_TYPE_LOOKUP);
        assert_eq!(message[1], LOOKUP_SET_DS_INFO_FROM_SEED);
        assert_eq!(decode_set_ds_info_message(&message).unwrap(), committee);
    }

    #[test]
    fn wrong_message_type_not_decoded() {
        let message = build_set_ds_info_message(&[]);
        let mut tampered = message.clone();
        tampered[0] = 0x01;
        assert!(decode_set_ds_info_message(&tampered).is_none());
    }
}
