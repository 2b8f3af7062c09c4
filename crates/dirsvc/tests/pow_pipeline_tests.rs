//! PoW admission pipeline integration tests.

mod common;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{
    advance_ds_chain_to, bootstrap, build_node, build_node_with, fast_config, key_for, peer_for,
    pow_payload, tagged, GatedPowEngine, TestBed,
};
use shardnet_dirsvc::{DirState, InstructionTag, PowSubmission};
use shardnet_types::Peer;

const COMMITTEE: [u8; 4] = [1, 2, 3, 4];
const MINER_SEED: u8 = 9;
const MINER_PORT: u16 = 33133;

fn miner_ip() -> IpAddr {
    format!("203.0.113.{MINER_SEED}").parse().unwrap()
}

/// A node sitting in the PoW window with the DS tip at block 10
/// (difficulties 3 shard-tier / 5 DS-tier).
fn node_in_pow_window() -> TestBed {
    let bed = build_node(fast_config(), 2, &COMMITTEE);
    bootstrap(&bed, 1);
    advance_ds_chain_to(&bed, 10, 3, 5);
    bed.service.set_state(DirState::PowSubmission);
    bed
}

fn submit(bed: &TestBed, payload: &[u8]) -> bool {
    let from = Peer::new(miner_ip(), 55555);
    bed.service
        .execute(&tagged(InstructionTag::PowSubmission, payload), &from)
}

#[test]
fn valid_ds_tier_pow_is_recorded() {
    let bed = node_in_pow_window();
    let miner = key_for(MINER_SEED);
    let payload = pow_payload(&bed, &miner, 11, 5, MINER_PORT, miner_ip());

    assert!(submit(&bed, &payload));

    let key = miner.public_key().clone();
    let submission = PowSubmission::from_bytes(&payload).unwrap();
    assert_eq!(bed.service.all_pows().get(&key), Some(&submission.result_hash));
    assert_eq!(
        bed.service.all_ds_pows().get(&key),
        Some(&submission.result_hash)
    );
    assert_eq!(bed.service.pow_submission_count(&key), 1);
    // The connection records the transport IP with the advertised port.
    assert_eq!(
        bed.service.all_pow_conns().get(&key),
        Some(&Peer::new(miner_ip(), MINER_PORT))
    );
}

#[test]
fn shard_tier_pow_stays_out_of_the_ds_table() {
    let bed = node_in_pow_window();
    let miner = key_for(MINER_SEED);
    let payload = pow_payload(&bed, &miner, 11, 3, MINER_PORT, miner_ip());

    assert!(submit(&bed, &payload));

    let key = miner.public_key().clone();
    assert!(bed.service.all_pows().contains_key(&key));
    assert!(!bed.service.has_ds_pow_solution(&key));

    // DS-tier entries always mirror the shard table.
    for (key, hash) in bed.service.all_ds_pows() {
        assert_eq!(bed.service.all_pows().get(&key), Some(&hash));
    }
}

#[test]
fn stale_block_number_is_rejected() {
    let bed = node_in_pow_window();
    let miner = key_for(MINER_SEED);
    // Tip is 10, so 10 is a duplicate.
    let payload = pow_payload(&bed, &miner, 10, 5, MINER_PORT, miner_ip());

    assert!(!submit(&bed, &payload));
    assert!(bed.service.all_pows().is_empty());
    assert_eq!(bed.service.pow_submission_count(miner.public_key()), 0);
}

#[test]
fn future_block_number_is_rejected() {
    let bed = node_in_pow_window();
    let miner = key_for(MINER_SEED);
    let payload = pow_payload(&bed, &miner, 12, 5, MINER_PORT, miner_ip());

    assert!(!submit(&bed, &payload));
    assert!(bed.service.all_pows().is_empty());
}

#[test]
fn submission_limit_caps_accepted_pows() {
    let bed = node_in_pow_window();
    let limit = bed.service.config().pow.submission_limit;
    let miner = key_for(MINER_SEED);
    let payload = pow_payload(&bed, &miner, 11, 5, MINER_PORT, miner_ip());

    for _ in 0..limit {
        assert!(submit(&bed, &payload));
    }
    assert!(!submit(&bed, &payload));
    assert_eq!(bed.service.pow_submission_count(miner.public_key()), limit);
}

#[test]
fn resubmission_overwrites_and_counts() {
    let bed = node_in_pow_window();
    let miner = key_for(MINER_SEED);
    let first = pow_payload(&bed, &miner, 11, 5, MINER_PORT, miner_ip());
    let second = pow_payload(&bed, &miner, 11, 3, MINER_PORT, miner_ip());

    assert!(submit(&bed, &first));
    assert!(submit(&bed, &second));

    let key = miner.public_key().clone();
    let latest = PowSubmission::from_bytes(&second).unwrap();
    assert_eq!(bed.service.all_pows().get(&key), Some(&latest.result_hash));
    assert_eq!(bed.service.pow_submission_count(&key), 2);
}

#[test]
fn corrupted_signature_is_rejected() {
    let bed = node_in_pow_window();
    let miner = key_for(MINER_SEED);
    let mut payload = pow_payload(&bed, &miner, 11, 5, MINER_PORT, miner_ip());
    payload[PowSubmission::SIGNATURE_OFFSET] ^= 0x01;

    assert!(!submit(&bed, &payload));
    assert!(bed.service.all_pows().is_empty());
    assert!(bed.service.all_pow_conns().is_empty());
}

#[test]
fn truncated_payload_is_rejected() {
    let bed = node_in_pow_window();
    let miner = key_for(MINER_SEED);
    let payload = pow_payload(&bed, &miner, 11, 5, MINER_PORT, miner_ip());

    assert!(!submit(&bed, &payload[..payload.len() - 1]));
}

#[test]
fn private_source_address_is_rejected() {
    let bed = node_in_pow_window();
    let miner = key_for(MINER_SEED);
    let private_ip: IpAddr = "192.168.1.5".parse().unwrap();
    let payload = pow_payload(&bed, &miner, 11, 5, MINER_PORT, private_ip);

    let from = Peer::new(private_ip, 55555);
    let result = bed
        .service
        .execute(&tagged(InstructionTag::PowSubmission, &payload), &from);
    assert!(!result);
    assert!(bed.service.all_pows().is_empty());
}

#[test]
fn off_tier_difficulty_is_rejected() {
    let bed = node_in_pow_window();
    let miner = key_for(MINER_SEED);
    // Neither the shard tier (3) nor the DS tier (5).
    let payload = pow_payload(&bed, &miner, 11, 4, MINER_PORT, miner_ip());

    assert!(!submit(&bed, &payload));
    assert!(bed.service.all_pows().is_empty());
}

#[test]
fn idle_node_rejects_pow() {
    let bed = build_node(fast_config(), 2, &COMMITTEE);
    // No bootstrap: the node is still Idle.
    advance_ds_chain_to(&bed, 10, 3, 5);
    let miner = key_for(MINER_SEED);
    let payload = pow_payload(&bed, &miner, 11, 5, MINER_PORT, miner_ip());

    assert!(!submit(&bed, &payload));
}

#[test]
fn testnet_whitelist_mismatch_logs_but_accepts_by_default() {
    let mut config = fast_config();
    config.node.test_net_mode = true;
    let bed = build_node(config, 2, &COMMITTEE);
    bootstrap(&bed, 1);
    advance_ds_chain_to(&bed, 10, 3, 5);
    bed.service.set_state(DirState::PowSubmission);

    let miner = key_for(MINER_SEED);
    let payload = pow_payload(&bed, &miner, 11, 5, MINER_PORT, miner_ip());
    assert!(submit(&bed, &payload));
    assert_eq!(bed.service.pow_submission_count(miner.public_key()), 1);
}

#[test]
fn testnet_whitelist_mismatch_rejects_when_required() {
    let mut config = fast_config();
    config.node.test_net_mode = true;
    config.node.require_ds_whitelist = true;
    let bed = build_node(config, 2, &COMMITTEE);
    bootstrap(&bed, 1);
    advance_ds_chain_to(&bed, 10, 3, 5);
    bed.service.set_state(DirState::PowSubmission);

    let miner = key_for(MINER_SEED);
    let payload = pow_payload(&bed, &miner, 11, 5, MINER_PORT, miner_ip());
    assert!(!submit(&bed, &payload));
    assert!(bed.service.all_pows().is_empty());
}

#[test]
fn window_closing_mid_verification_is_benign() {
    let gate = Arc::new(GatedPowEngine::new());
    let bed = {
        let gate = gate.clone();
        build_node_with(fast_config(), 2, &COMMITTEE, move |mut services| {
            services.pow_engine = gate;
            services
        })
    };
    bootstrap(&bed, 1);
    advance_ds_chain_to(&bed, 10, 3, 5);
    bed.service.set_state(DirState::PowSubmission);

    let miner = key_for(MINER_SEED);
    let mut submission = PowSubmission {
        ds_block_num: 11,
        difficulty: 5,
        listen_port: MINER_PORT,
        pubkey: miner.public_key().to_bytes(),
        nonce: 7,
        result_hash: [1u8; 32],
        mixhash: [2u8; 32],
        signature: [0u8; 64],
    };
    submission.signature = miner.sign(&submission.encode_unsigned()).to_bytes();
    let message = tagged(InstructionTag::PowSubmission, &submission.to_bytes());

    let service = bed.service.clone();
    let handle = std::thread::spawn(move || {
        let from = Peer::new("203.0.113.9".parse().unwrap(), 55555);
        service.execute(&message, &from)
    });

    // Close the window while the submission is inside the hash engine.
    gate.wait_until_entered();
    bed.service.set_state(DirState::DsBlockConsensusPrep);
    gate.release();

    // A solution that misses the cut is dropped benignly.
    assert!(handle.join().unwrap());
    assert!(bed.service.all_pows().is_empty());
    assert!(bed.service.all_pow_conns().is_empty());
}

#[test]
fn late_arrival_times_out_during_final_block_consensus() {
    let bed = node_in_pow_window();
    bed.service.set_state(DirState::FinalBlockConsensus);

    let miner = key_for(MINER_SEED);
    let payload = pow_payload(&bed, &miner, 11, 5, MINER_PORT, miner_ip());
    // submission_timeout_secs is 0: the grace wait expires immediately and
    // the state guard rejects.
    assert!(!submit(&bed, &payload));
}

#[test]
fn late_arrival_is_admitted_once_the_window_reopens() {
    let mut config = fast_config();
    config.pow.submission_timeout_secs = 5;
    let bed = build_node(config, 2, &COMMITTEE);
    bootstrap(&bed, 1);
    advance_ds_chain_to(&bed, 10, 3, 5);
    bed.service.set_state(DirState::FinalBlockConsensus);

    let miner = key_for(MINER_SEED);
    let payload = pow_payload(&bed, &miner, 11, 5, MINER_PORT, miner_ip());

    let opener = {
        let service = bed.service.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            service.set_state(DirState::PowSubmission);
        })
    };

    assert!(submit(&bed, &payload));
    opener.join().unwrap();
    assert_eq!(bed.service.pow_submission_count(miner.public_key()), 1);
}
