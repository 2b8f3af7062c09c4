//! PoW hash-engine collaborator interface.
//!
//! The real miner/verifier (an ethash-family engine) lives outside this
//! crate; the directory service only ever calls [`PowEngine::verify`].
//! [`DevPowEngine`] is the development stand-in: a Keccak-256 bound check
//! that mines in microseconds at test difficulties.

use std::net::IpAddr;

use shardnet_crypto::PubKey;
use shardnet_types::{keccak256, Hash};

/// Verifier for PoW solutions.
pub trait PowEngine: Send + Sync {
    /// Check a claimed solution. `rand1`/`rand2` are the randomness words
    /// bound to the DS and Tx chain tips; `ip` and `pubkey` bind the
    /// solution to the submitter; `full_dataset` selects full-dataset
    /// mining (unused during verification).
    #[allow(clippy::too_many_arguments)]
    fn verify(
        &self,
        block_num: u64,
        difficulty: u8,
        rand1: &Hash,
        rand2: &Hash,
        ip: IpAddr,
        pubkey: &PubKey,
        full_dataset: bool,
        nonce: u64,
        result_hash: &Hash,
        mixhash: &Hash,
    ) -> bool;
}

/// Development PoW engine: `mixhash = H(seed)`, `result = H(seed ‖ mixhash)`,
/// and `result` must clear `difficulty` leading zero bits.
#[derive(Debug, Default, Clone, Copy)]
pub struct DevPowEngine;

impl DevPowEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }

    fn seed(
        block_num: u64,
        rand1: &Hash,
        rand2: &Hash,
        ip: IpAddr,
        pubkey: &PubKey,
        nonce: u64,
    ) -> Hash {
        let mut input = Vec::with_capacity(8 + 32 + 32 + 16 + 33 + 8);
        input.extend_from_slice(&block_num.to_be_bytes());
        input.extend_from_slice(rand1);
        input.extend_from_slice(rand2);
        let octets = match ip {
            IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            IpAddr::V6(v6) => v6.octets(),
        };
        input.extend_from_slice(&octets);
        input.extend_from_slice(pubkey.as_bytes());
        input.extend_from_slice(&nonce.to_be_bytes());
        keccak256(&input)
    }

    /// Search nonces from 0 until a solution clears `difficulty` bits.
    /// Intended for tests and local tooling only.
    pub fn mine(
        block_num: u64,
        difficulty: u8,
        rand1: &Hash,
        rand2: &Hash,
        ip: IpAddr,
        pubkey: &PubKey,
    ) -> (u64, Hash, Hash) {
        let mut nonce = 0u64;
        loop {
            let seed = Self::seed(block_num, rand1, rand2, ip, pubkey, nonce);
            let mixhash = keccak256(&seed);
            let result = {
                let mut input = Vec::with_capacity(64);
                input.extend_from_slice(&seed);
                input.extend_from_slice(&mixhash);
                keccak256(&input)
            };
            if leading_zero_bits(&result) >= u32::from(difficulty) {
                return (nonce, result, mixhash);
            }
            nonce += 1;
        }
    }
}

impl PowEngine for DevPowEngine {
    fn verify(
        &self,
        block_num: u64,
        difficulty: u8,
        rand1: &Hash,
        rand2: &Hash,
        ip: IpAddr,
        pubkey: &PubKey,
        _full_dataset: bool,
        nonce: u64,
        result_hash: &Hash,
        mixhash: &Hash,
    ) -> bool {
        let seed = Self::seed(block_num, rand1, rand2, ip, pubkey, nonce);
        let expected_mix = keccak256(&seed);
        if &expected_mix != mixhash {
            return false;
        }
        let expected_result = {
            let mut input = Vec::with_capacity(64);
            input.extend_from_slice(&seed);
            input.extend_from_slice(mixhash);
            keccak256(&input)
        };
        if &expected_result != result_hash {
            return false;
        }
        leading_zero_bits(result_hash) >= u32::from(difficulty)
    }
}

/// Number of leading zero bits in `hash`.
pub fn leading_zero_bits(hash: &Hash) -> u32 {
    let mut bits = 0;
    for byte in hash {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardnet_crypto::SecretKey;
    use shardnet_types::{RAND1_GENESIS, RAND2_GENESIS};

    #[test]
    fn mined_solution_verifies() {
        let key = SecretKey::from_seed(&[5; 32]);
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        let (nonce, result, mixhash) = DevPowEngine::mine(
            11,
            5,
            &RAND1_GENESIS,
            &RAND2_GENESIS,
            ip,
            key.public_key(),
        );
        assert!(DevPowEngine::new().verify(
            11,
            5,
            &RAND1_GENESIS,
            &RAND2_GENESIS,
            ip,
            key.public_key(),
            false,
            nonce,
            &result,
            &mixhash,
        ));
    }

    #[test]
    fn tampered_solution_rejected() {
        let key = SecretKey::from_seed(&[5; 32]);
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        let (nonce, mut result, mixhash) = DevPowEngine::mine(
            11,
            5,
            &RAND1_GENESIS,
            &RAND2_GENESIS,
            ip,
            key.public_key(),
        );
        result[31] ^= 1;
        assert!(!DevPowEngine::new().verify(
            11,
            5,
            &RAND1_GENESIS,
            &RAND2_GENESIS,
            ip,
            key.public_key(),
            false,
            nonce,
            &result,
            &mixhash,
        ));
    }

    #[test]
    fn wrong_randomness_rejected() {
        let key = SecretKey::from_seed(&[5; 32]);
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        let (nonce, result, mixhash) = DevPowEngine::mine(
            11,
            5,
            &RAND1_GENESIS,
            &RAND2_GENESIS,
            ip,
            key.public_key(),
        );
        assert!(!DevPowEngine::new().verify(
            11,
            5,
            &RAND2_GENESIS, // swapped
            &RAND1_GENESIS,
            ip,
            key.public_key(),
            false,
            nonce,
            &result,
            &mixhash,
        ));
    }

    #[test]
    fn leading_zero_bits_counts() {
        assert_eq!(leading_zero_bits(&[0u8; 32]), 256);
        let mut hash = [0u8; 32];
        hash[0] = 0x10;
        assert_eq!(leading_zero_bits(&hash), 3);
        hash[0] = 0x80;
        assert_eq!(leading_zero_bits(&hash), 0);
    }
}
