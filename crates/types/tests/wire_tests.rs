//! Cross-type wire-format tests.

use shardnet_types::{
    DsBlock, DsBlockHeader, Peer, TxBody, Writer, PUB_KEY_SIZE, RAND1_GENESIS,
};

#[test]
fn composite_messages_decode_field_by_field() {
    // A peer followed by a DS block in one buffer, the way handlers see them.
    let peer = Peer::new("203.0.113.1".parse().unwrap(), 4201);
    let block = DsBlock::new(DsBlockHeader {
        block_num: 3,
        difficulty: 3,
        ds_difficulty: 5,
        prev_hash: RAND1_GENESIS,
        winner_pubkey: [2u8; PUB_KEY_SIZE],
        leader_pubkey: [3u8; PUB_KEY_SIZE],
        timestamp: 1_700_000_000,
    });

    let mut w = Writer::new();
    peer.encode(&mut w);
    w.write_bytes(&block.to_bytes());
    let buffer = w.into_bytes();

    let mut r = shardnet_types::Reader::new(&buffer);
    let decoded_peer = Peer::decode(&mut r).unwrap();
    let decoded_block = DsBlockHeader::decode(&mut r).unwrap();

    assert_eq!(decoded_peer, peer);
    assert_eq!(decoded_block, block.header);
    assert_eq!(r.remaining(), 0);
}

#[test]
fn block_hash_changes_with_any_field() {
    let base = DsBlock::genesis(3, 5);
    let mut bumped = base.clone();
    bumped.header.timestamp += 1;
    assert_ne!(base.hash(), bumped.hash());
}

#[test]
fn tx_body_payload_length_is_authoritative() {
    let body = TxBody {
        tx_hash: [9u8; 32],
        success: true,
        payload: vec![1, 2, 3, 4],
    };
    let mut bytes = body.to_bytes();
    // Chop the payload short of its declared length.
    bytes.truncate(bytes.len() - 1);
    assert!(TxBody::from_bytes(&bytes).is_err());
}
