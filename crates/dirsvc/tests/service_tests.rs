//! Shared-state and dispatcher tests.

mod common;

use std::net::IpAddr;

use common::{
    advance_ds_chain_to, bootstrap, build_node, fast_config, key_for, peer_for, pow_payload,
    tagged,
};
use shardnet_dirsvc::{Action, DirState, InstructionTag, Mode, SyncType};
use shardnet_types::Peer;

const COMMITTEE: [u8; 4] = [1, 2, 3, 4];

#[test]
fn fresh_node_starts_idle_in_the_pow_window() {
    let bed = build_node(fast_config(), 2, &COMMITTEE);
    assert_eq!(bed.service.mode(), Mode::Idle);
    assert_eq!(bed.service.state(), DirState::PowSubmission);
    assert_eq!(bed.service.sync_type(), SyncType::NoSync);

    let ids = bed.service.consensus_ids();
    assert_eq!(ids.consensus_id, 1);
    assert_eq!(ids.leader_id, 0);
    assert_eq!(ids.view_change_counter, 0);
}

#[test]
fn clean_variables_resets_every_table_and_counter() {
    let bed = build_node(fast_config(), 2, &COMMITTEE);
    bootstrap(&bed, 1);
    advance_ds_chain_to(&bed, 10, 3, 5);
    bed.service.set_state(DirState::PowSubmission);

    // Populate the per-epoch tables.
    let miner = key_for(9);
    let miner_ip: IpAddr = "203.0.113.9".parse().unwrap();
    let payload = pow_payload(&bed, &miner, 11, 5, 33133, miner_ip);
    assert!(bed.service.execute(
        &tagged(InstructionTag::PowSubmission, &payload),
        &Peer::new(miner_ip, 55555)
    ));
    assert!(!bed.service.all_pows().is_empty());

    bed.service.clean_variables();

    assert!(bed.service.all_pows().is_empty());
    assert!(bed.service.all_pow_conns().is_empty());
    assert_eq!(bed.service.ds_pow_count(), 0);
    assert_eq!(bed.service.pow_submission_count(miner.public_key()), 0);
    assert!(bed.service.shards().is_empty());
    assert_eq!(bed.service.mode(), Mode::Idle);

    let ids = bed.service.consensus_ids();
    assert_eq!(ids.consensus_id, 0);
    assert_eq!(ids.leader_id, 0);
    assert_eq!(ids.view_change_counter, 0);
}

#[test]
fn dispatcher_drops_empty_and_unknown_messages() {
    let bed = build_node(fast_config(), 2, &COMMITTEE);
    bootstrap(&bed, 1);

    assert!(!bed.service.execute(&[], &peer_for(2)));
    assert!(!bed.service.execute(&[0x2a, 1, 2, 3], &peer_for(2)));
    assert!(!bed.service.execute(&[0xff], &peer_for(2)));
}

#[test]
fn every_ds_message_is_dropped_while_synchronizing() {
    let bed = build_node(fast_config(), 2, &COMMITTEE);
    bootstrap(&bed, 1);
    advance_ds_chain_to(&bed, 10, 3, 5);
    bed.service.set_state(DirState::PowSubmission);
    bed.service.set_sync_type(SyncType::DsSync);

    let miner = key_for(9);
    let miner_ip: IpAddr = "203.0.113.9".parse().unwrap();
    let payload = pow_payload(&bed, &miner, 11, 5, 33133, miner_ip);
    assert!(!bed.service.execute(
        &tagged(InstructionTag::PowSubmission, &payload),
        &Peer::new(miner_ip, 55555)
    ));
    assert!(bed.service.all_pows().is_empty());

    // Even bootstrap traffic is ignored mid-sync.
    let mut set_primary = vec![InstructionTag::SetPrimary as u8];
    set_primary.extend_from_slice(&peer_for(1).to_bytes());
    assert!(!bed.service.execute(&set_primary, &peer_for(1)));
}

#[test]
fn lookup_nodes_skip_the_ds_state_machine() {
    let mut config = fast_config();
    config.node.lookup_node_mode = true;
    let bed = build_node(config, 2, &COMMITTEE);

    // Lookup nodes carry no DS state machine; admissibility is vacuous.
    assert!(bed.service.check_state(Action::VerifyPow));
    assert!(bed.service.check_state(Action::ProcessViewChangeConsensus));

    // set_state is refused.
    bed.service.set_state(DirState::Error);
    assert_eq!(bed.service.state(), DirState::PowSubmission);

    // View-change traffic is not routed on lookup nodes.
    assert!(!bed
        .service
        .execute(&tagged(InstructionTag::ViewChangeConsensus, b"x"), &peer_for(2)));
}

#[test]
fn idle_node_rejects_ds_actions() {
    let bed = build_node(fast_config(), 2, &COMMITTEE);
    assert!(!bed.service.check_state(Action::ProcessPowSubmission));
    assert!(!bed.service.check_state(Action::VerifyPow));
}
