//! DS whitelist and source-address policy.
//!
//! Two checks guard the PoW intake: in test-net mode a submitter must appear
//! on the DS whitelist under the exact `(peer, key)` pair it registered with,
//! and (independently of mode) submissions must come from routable public
//! addresses.

use std::collections::HashMap;
use std::net::IpAddr;

use parking_lot::RwLock;
use shardnet_crypto::PubKey;
use shardnet_types::Peer;

/// Whitelist of nodes allowed to submit DS-tier PoW in test-net mode, plus
/// the public-IP policy applied to every submission.
pub struct Whitelist {
    exclude_private: bool,
    ds_nodes: RwLock<HashMap<PubKey, Peer>>,
}

impl Whitelist {
    /// Create a whitelist. With `exclude_private_ip` unset, private-range
    /// addresses pass [`Whitelist::is_valid_ip`] (local test networks).
    pub fn new(exclude_private_ip: bool) -> Self {
        Self {
            exclude_private: exclude_private_ip,
            ds_nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Register a node as eligible for DS-tier submission in test-net mode.
    pub fn register_ds_node(&self, key: PubKey, peer: Peer) {
        self.ds_nodes.write().insert(key, peer);
    }

    /// Whether `(peer, key)` matches a registered DS whitelist entry.
    pub fn is_node_in_ds_whitelist(&self, peer: &Peer, key: &PubKey) -> bool {
        self.ds_nodes.read().get(key) == Some(peer)
    }

    /// Whether `ip` is an acceptable source address for a PoW submission.
    ///
    /// Unspecified, loopback, multicast, and broadcast addresses are always
    /// rejected; private and link-local ranges are rejected unless the
    /// whitelist was built with `exclude_private_ip = false`.
    pub fn is_valid_ip(&self, ip: IpAddr) -> bool {
        if ip.is_unspecified() || ip.is_loopback() || ip.is_multicast() {
            return false;
        }
        match ip {
            IpAddr::V4(v4) => {
                if v4.is_broadcast() {
                    return false;
                }
                if self.exclude_private && (v4.is_private() || v4.is_link_local()) {
                    return false;
                }
            }
            IpAddr::V6(v6) => {
                let seg0 = v6.segments()[0];
                let unique_local = (seg0 & 0xfe00) == 0xfc00;
                let link_local = (seg0 & 0xffc0) == 0xfe80;
                if self.exclude_private && (unique_local || link_local) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardnet_crypto::SecretKey;
    use std::net::Ipv4Addr;

    #[test]
    fn public_addresses_pass() {
        let wl = Whitelist::new(true);
        assert!(wl.is_valid_ip("203.0.113.7".parse().unwrap()));
        assert!(wl.is_valid_ip("2001:db8::7".parse().unwrap()));
    }

    #[test]
    fn private_and_broadcast_rejected() {
        let wl = Whitelist::new(true);
        assert!(!wl.is_valid_ip("10.1.2.3".parse().unwrap()));
        assert!(!wl.is_valid_ip("172.16.0.1".parse().unwrap()));
        assert!(!wl.is_valid_ip("192.168.1.1".parse().unwrap()));
        assert!(!wl.is_valid_ip("255.255.255.255".parse().unwrap()));
        assert!(!wl.is_valid_ip("127.0.0.1".parse().unwrap()));
        assert!(!wl.is_valid_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED)));
        assert!(!wl.is_valid_ip("fc00::1".parse().unwrap()));
        assert!(!wl.is_valid_ip("fe80::1".parse().unwrap()));
    }

    #[test]
    fn private_allowed_when_not_excluded() {
        let wl = Whitelist::new(false);
        assert!(wl.is_valid_ip("192.168.1.1".parse().unwrap()));
        // Loopback and broadcast stay rejected regardless.
        assert!(!wl.is_valid_ip("127.0.0.1".parse().unwrap()));
        assert!(!wl.is_valid_ip("255.255.255.255".parse().unwrap()));
    }

    #[test]
    fn ds_whitelist_requires_exact_pair() {
        let wl = Whitelist::new(true);
        let key = SecretKey::from_seed(&[1; 32]).public_key().clone();
        let peer = Peer::new("203.0.113.7".parse().unwrap(), 4201);
        wl.register_ds_node(key.clone(), peer);

        assert!(wl.is_node_in_ds_whitelist(&peer, &key));
        let other_peer = Peer::new("203.0.113.8".parse().unwrap(), 4201);
        assert!(!wl.is_node_in_ds_whitelist(&other_peer, &key));
        let other_key = SecretKey::from_seed(&[2; 32]).public_key().clone();
        assert!(!wl.is_node_in_ds_whitelist(&peer, &other_key));
    }
}
