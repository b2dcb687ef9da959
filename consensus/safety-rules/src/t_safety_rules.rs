// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{consensus_state::ConsensusState, error::Error};
use consensus_types::{
    epoch_state::EpochState,
    quorum_cert::QuorumCert,
    vote_data::{BlockInfoLite, VoteData},
};

/// The safety engine's public surface, split out as a trait (as the
/// teacher does with `TSafetyRules`) so the consensus crate can depend
/// on it without depending on a particular storage backend, and so
/// tests can swap in a mock.
pub trait TSafetyRules {
    fn consensus_state(&self) -> Result<ConsensusState, Error>;

    /// Adopts a new epoch's validator set. spec.md §4.3 "Epoch
    /// transition": resets nothing about last-voted/locked level — those
    /// remain monotonic across the whole replica's lifetime, only the
    /// verifier used to check QCs changes.
    fn start_new_epoch(&mut self, epoch_state: EpochState) -> Result<(), Error>;

    /// spec.md §4.3 "Lock update": "upon observing any QC q, set
    /// lockedQC ← q if q.level > lockedQC.level." Called for every QC
    /// this replica learns about, not only ones it votes on.
    fn update_lock(&mut self, qc: &QuorumCert) -> Result<(), Error>;

    /// spec.md §4.3 "Safety (voting)": "vote on block b at level l is
    /// permitted iff l > lastVotedLevel AND b.justifyQC.level ≥
    /// lockedQC.level." On success, persists `last_voted_level = l`
    /// before returning (spec.md §9 "write then act").
    fn vote_rule(&mut self, level: u64, justify_qc: &QuorumCert) -> Result<(), Error>;

    /// Three-chain commit check (spec.md §4.3): given the QC that
    /// justifies the newly proposed block (`proposed`) and was itself
    /// certified by `parent_qc`, returns the block that would commit —
    /// `parent_qc.parent_block()` — iff the three levels are
    /// consecutive. Named `construct_ledger_info` after the teacher's
    /// `SafetyRules::construct_ledger_info`, which performs the same
    /// check.
    fn construct_ledger_info(
        &self,
        proposed: &BlockInfoLite,
        parent_qc: &QuorumCert,
    ) -> Option<BlockInfoLite>;
}

/// Convenience used by the driver when building a vote: packages the
/// proposed block and the block its justify QC certifies into the
/// `VoteData` every endorsement carries.
pub fn vote_data_for(proposed: BlockInfoLite, parent: BlockInfoLite) -> VoteData {
    VoteData::new(proposed, parent)
}

/// The three-chain commit check as a pure function of its inputs, with
/// no dependency on any persisted safety state -- `BlockStore` calls
/// this directly rather than needing a `SafetyRules` instance, while
/// `SafetyRules::construct_ledger_info` delegates to it so the rule
/// lives in exactly one place.
pub fn three_chain_commit(proposed: &BlockInfoLite, parent_qc: &QuorumCert) -> Option<BlockInfoLite> {
    let block2 = proposed.level;
    let block1 = parent_qc.level();
    let block0 = parent_qc.parent_block()?;
    if block0.level + 1 == block1 && block1 + 1 == block2 {
        Some(*block0)
    } else {
        None
    }
}
