//! Registry of known DS-committee peers.
//!
//! The store keeps one `(public key, peer)` pair per node identity and hands
//! out snapshots sorted by public-key byte order, the canonical committee
//! order that `consensus_my_id` indexes into.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use shardnet_crypto::PubKey;
use shardnet_types::Peer;

/// Process-wide registry of committee peers, constructed once at startup.
#[derive(Default)]
pub struct PeerStore {
    peers: Mutex<BTreeMap<PubKey, Peer>>,
}

impl PeerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the peer recorded for `key`.
    pub fn add_peer_pair(&self, key: PubKey, peer: Peer) {
        self.peers.lock().insert(key, peer);
    }

    /// Remove the entry for `key`, if present.
    pub fn remove_peer(&self, key: &PubKey) {
        self.peers.lock().remove(key);
    }

    /// Whether `key` has an entry.
    pub fn contains(&self, key: &PubKey) -> bool {
        self.peers.lock().contains_key(key)
    }

    /// Number of recorded pairs.
    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Snapshot of every pair, sorted by public-key byte order.
    pub fn get_all_peer_pairs(&self) -> Vec<(PubKey, Peer)> {
        self.peers
            .lock()
            .iter()
            .map(|(k, p)| (k.clone(), *p))
            .collect()
    }
}
