//! Inbound message dispatch.
//!
//! The first byte of every DS message is an instruction tag indexing a
//! closed handler table. Messages arriving while the node is synchronizing
//! are dropped before any handler runs.

use shardnet_types::Peer;
use tracing::{info, warn};

use crate::service::DirectoryService;
use crate::sync::SyncType;

/// Message-type byte for lookup-bound messages.
pub const MSG_TYPE_LOOKUP: u8 = 0x04;

/// Lookup instruction: seed the DS committee from a bootstrap node.
pub const LOOKUP_SET_DS_INFO_FROM_SEED: u8 = 0x01;

/// Instruction tags understood by the directory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InstructionTag {
    /// Bootstrap: designate the round-0 leader.
    SetPrimary = 0x00,
    /// A PoW solution from a prospective member.
    PowSubmission = 0x01,
    /// DS-block consensus traffic.
    DsBlockConsensus = 0x02,
    /// A microblock from a shard.
    MicroblockSubmission = 0x03,
    /// Final-block consensus traffic.
    FinalBlockConsensus = 0x04,
    /// View-change consensus traffic.
    ViewChangeConsensus = 0x05,
}

impl InstructionTag {
    /// Decode an instruction byte; `None` for anything outside the table.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::SetPrimary),
            0x01 => Some(Self::PowSubmission),
            0x02 => Some(Self::DsBlockConsensus),
            0x03 => Some(Self::MicroblockSubmission),
            0x04 => Some(Self::FinalBlockConsensus),
            0x05 => Some(Self::ViewChangeConsensus),
            _ => None,
        }
    }
}

impl DirectoryService {
    /// Route one inbound message to its handler.
    ///
    /// Returns the handler's verdict; malformed, unknown, and
    /// while-synchronizing messages are dropped with `false`.
    pub fn execute(&self, message: &[u8], from: &Peer) -> bool {
        let Some(&ins_byte) = message.first() else {
            warn!(%from, "dropping empty message");
            return false;
        };

        if self.sync_type() != SyncType::NoSync {
            warn!(
                epoch = self.current_epoch(),
                "ignoring DS message while synchronizing"
            );
            return false;
        }

        let payload = &message[1..];
        let Some(tag) = InstructionTag::from_u8(ins_byte) else {
            info!(
                epoch = self.current_epoch(),
                ins_byte = format!("{:#04x}", ins_byte),
                "unknown instruction byte"
            );
            return false;
        };

        // Lookup nodes do not run view-change consensus.
        if tag == InstructionTag::ViewChangeConsensus && self.config.node.lookup_node_mode {
            info!(
                epoch = self.current_epoch(),
                "view-change message on a lookup node; dropping"
            );
            return false;
        }

        match tag {
            InstructionTag::SetPrimary => self.process_set_primary(payload, from),
            InstructionTag::PowSubmission => self.process_pow_submission(payload, from),
            InstructionTag::DsBlockConsensus => self.process_ds_block_consensus(payload, from),
            InstructionTag::MicroblockSubmission => {
                self.process_microblock_submission(payload, from)
            }
            InstructionTag::FinalBlockConsensus => {
                self.process_final_block_consensus(payload, from)
            }
            InstructionTag::ViewChangeConsensus => {
                self.process_view_change_consensus(payload, from)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for byte in 0u8..=5 {
            let tag = InstructionTag::from_u8(byte).unwrap();
            assert_eq!(tag as u8, byte);
        }
        assert_eq!(InstructionTag::from_u8(6), None);
        assert_eq!(InstructionTag::from_u8(0xff), None);
    }
}
