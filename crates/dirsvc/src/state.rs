//! Directory-service state machine.
//!
//! A DS node is always in exactly one [`DirState`]. Transitions are driven
//! by timers (the PoW window), consensus outcomes, and explicit rejoin; every
//! inbound message is admitted or dropped by consulting the closed
//! `(state, action)` table in [`is_action_allowed`].
//!
//! ```text
//! PowSubmission ──window expiry──▶ DsBlockConsensusPrep ──▶ DsBlockConsensus
//!       ▲                                                        │ done
//!       │ epoch tables cleared                                   ▼
//! FinalBlockConsensus ◀── FinalBlockConsensusPrep ◀── MicroblockSubmission
//!       │ failure                                  ▲
//!       ▼                                          │ done
//! ViewchangeConsensusPrep ──▶ ViewchangeConsensus ─┘ (new leader)
//! ```

use std::fmt;

/// Role of this node within the current DS epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Not a member of the DS committee.
    Idle,
    /// Committee member currently leading the consensus round.
    PrimaryDs,
    /// Committee member backing the current leader.
    BackupDs,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Idle => write!(f, "IDLE"),
            Mode::PrimaryDs => write!(f, "PRIMARY_DS"),
            Mode::BackupDs => write!(f, "BACKUP_DS"),
        }
    }
}

/// The states a DS node sequences through within one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirState {
    /// Accepting PoW submissions from prospective members.
    PowSubmission,
    /// Composing the DS-block proposal.
    DsBlockConsensusPrep,
    /// Running consensus on the DS block.
    DsBlockConsensus,
    /// Collecting microblocks from the shards.
    MicroblockSubmission,
    /// Composing the final-block proposal.
    FinalBlockConsensusPrep,
    /// Running consensus on the final Tx block.
    FinalBlockConsensus,
    /// Preparing a view change after a suspected-faulty leader.
    ViewchangeConsensusPrep,
    /// Running view-change consensus.
    ViewchangeConsensus,
    /// Unrecoverable sequencing error.
    Error,
}

impl fmt::Display for DirState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DirState::PowSubmission => "POW_SUBMISSION",
            DirState::DsBlockConsensusPrep => "DSBLOCK_CONSENSUS_PREP",
            DirState::DsBlockConsensus => "DSBLOCK_CONSENSUS",
            DirState::MicroblockSubmission => "MICROBLOCK_SUBMISSION",
            DirState::FinalBlockConsensusPrep => "FINALBLOCK_CONSENSUS_PREP",
            DirState::FinalBlockConsensus => "FINALBLOCK_CONSENSUS",
            DirState::ViewchangeConsensusPrep => "VIEWCHANGE_CONSENSUS_PREP",
            DirState::ViewchangeConsensus => "VIEWCHANGE_CONSENSUS",
            DirState::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Actions a message handler may attempt against the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Handle an inbound PoW submission message.
    ProcessPowSubmission,
    /// Verify and commit a parsed PoW solution.
    VerifyPow,
    /// Handle a DS-block consensus message.
    ProcessDsBlockConsensus,
    /// Handle a microblock submission.
    ProcessMicroblockSubmission,
    /// Handle a final-block consensus message.
    ProcessFinalBlockConsensus,
    /// Handle a view-change consensus message.
    ProcessViewChangeConsensus,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::ProcessPowSubmission => "PROCESS_POWSUBMISSION",
            Action::VerifyPow => "VERIFYPOW",
            Action::ProcessDsBlockConsensus => "PROCESS_DSBLOCKCONSENSUS",
            Action::ProcessMicroblockSubmission => "PROCESS_MICROBLOCKSUBMISSION",
            Action::ProcessFinalBlockConsensus => "PROCESS_FINALBLOCKCONSENSUS",
            Action::ProcessViewChangeConsensus => "PROCESS_VIEWCHANGECONSENSUS",
        };
        write!(f, "{}", name)
    }
}

/// The closed admissibility table: every `(state, action)` pair a handler may
/// legally attempt. Anything absent is rejected.
pub fn is_action_allowed(state: DirState, action: Action) -> bool {
    matches!(
        (state, action),
        (DirState::PowSubmission, Action::ProcessPowSubmission)
            | (DirState::PowSubmission, Action::VerifyPow)
            | (DirState::DsBlockConsensus, Action::ProcessDsBlockConsensus)
            | (
                DirState::MicroblockSubmission,
                Action::ProcessMicroblockSubmission
            )
            | (
                DirState::FinalBlockConsensus,
                Action::ProcessFinalBlockConsensus
            )
            | (
                DirState::ViewchangeConsensus,
                Action::ProcessViewChangeConsensus
            )
    )
}
