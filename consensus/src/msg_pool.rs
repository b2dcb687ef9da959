// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.2 `MsgPool`: "buffers proposals and votes by (height,
//! level) until a quorum forms or the round is sealed by a commit."
//! Equivocation (same proposer, two different blocks at the same level)
//! and double-voting (same author, two different blocks) are rejected
//! here rather than silently overwritten; a timeout vote always
//! supersedes an earlier regular vote from the same author, never the
//! reverse (spec.md §4.4 "once a replica has given up on a level it
//! never un-gives-up").

use consensus_types::{
    common::{EpochId, Height, Level},
    error::VerifyError,
    hash::HashValue,
    proposal_msg::ProposalMsg,
    quorum_cert::{EndorsementInfo, QuorumCert},
    validator_verifier::ValidatorVerifier,
    vote::Vote,
};
use std::collections::HashMap;

/// The result of a quorum check at a given (height, level): either
/// enough matching regular votes to certify a block, or enough timeout
/// votes to certify that the level itself expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuorumOutcome {
    Qc(QuorumCert),
    Tc(QuorumCert),
}

#[derive(Default)]
struct RoundState {
    proposals: HashMap<consensus_types::common::AuthorIndex, HashValue>,
    votes: HashMap<consensus_types::common::AuthorIndex, Vote>,
}

#[derive(Default)]
pub struct MsgPool {
    rounds: HashMap<(Height, Level), RoundState>,
}

impl MsgPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// spec.md §4.2 `InsertProposal`: rejects a second, conflicting
    /// block from a proposer already on record for this (height, level).
    pub fn insert_proposal(&mut self, proposal: &ProposalMsg) -> Result<(), VerifyError> {
        let key = (proposal.block.height(), proposal.block.level());
        let round = self.rounds.entry(key).or_default();
        let block_id = proposal.block.id();
        if let Some(&existing) = round.proposals.get(&proposal.proposer) {
            if existing != block_id {
                return Err(VerifyError::ConflictingAuthor {
                    author: proposal.proposer,
                });
            }
            return Ok(());
        }
        round.proposals.insert(proposal.proposer, block_id);
        Ok(())
    }

    /// spec.md §4.2 `InsertVote`: idempotent per author; a timeout vote
    /// supersedes a regular one already on file, a regular vote never
    /// overwrites a timeout already on file, and two different regular
    /// votes from the same author are double-voting.
    pub fn insert_vote(&mut self, vote: Vote) -> Result<(), VerifyError> {
        vote.verify_well_formed()?;
        let key = (vote.height, vote.level);
        let round = self.rounds.entry(key).or_default();

        if let Some(existing) = round.votes.get(&vote.author) {
            if existing.new_view {
                return Ok(());
            }
            if !vote.new_view && existing.block_id() != vote.block_id() {
                return Err(VerifyError::ConflictingAuthor { author: vote.author });
            }
        }
        round.votes.insert(vote.author, vote);
        Ok(())
    }

    /// spec.md §4.2 `CheckVotesDone`: aggregates the votes on file for
    /// (height, level) against `verifier`'s quorum threshold, returning
    /// a QC if enough votes agree on the same block, a TC if enough are
    /// timeouts, or `None` if neither has reached quorum yet. A round
    /// where votes for different blocks and timeouts are each below
    /// threshold individually never forms a quorum even if their sum
    /// would (spec.md §4.2 "a quorum must agree on exactly one
    /// outcome").
    pub fn check_votes_done(
        &self,
        height: Height,
        level: Level,
        epoch: EpochId,
        verifier: &ValidatorVerifier,
    ) -> Result<Option<QuorumOutcome>, VerifyError> {
        let Some(round) = self.rounds.get(&(height, level)) else {
            return Ok(None);
        };
        let threshold = verifier.quorum_threshold();

        let mut by_block: HashMap<HashValue, Vec<&Vote>> = HashMap::new();
        let mut timeouts: Vec<&Vote> = Vec::new();
        for vote in round.votes.values() {
            match vote.block_id() {
                Some(id) => by_block.entry(id).or_default().push(vote),
                None => timeouts.push(vote),
            }
        }

        if timeouts.len() >= threshold {
            let endorsements = timeouts
                .iter()
                .map(|v| EndorsementInfo {
                    author: v.author,
                    signature: v.signature.clone(),
                })
                .collect();
            return Ok(Some(QuorumOutcome::Tc(QuorumCert::new_tc(height, level, epoch, endorsements))));
        }

        for (block_id, votes) in by_block {
            if votes.len() < threshold {
                continue;
            }
            let first_parent = votes[0]
                .vote_data
                .as_ref()
                .expect("regular vote always carries vote_data")
                .parent;
            for v in &votes {
                let parent = v.vote_data.as_ref().expect("checked above").parent;
                if parent != first_parent {
                    return Err(VerifyError::InconsistentEndorsements);
                }
            }
            let endorsements = votes
                .iter()
                .map(|v| EndorsementInfo {
                    author: v.author,
                    signature: v.signature.clone(),
                })
                .collect();
            return Ok(Some(QuorumOutcome::Qc(QuorumCert::new_qc(
                block_id,
                height,
                level,
                epoch,
                first_parent,
                endorsements,
            ))));
        }

        Ok(None)
    }

    /// spec.md §4.2 `OnBlockSealed(h)`: drops every round at a height at
    /// or below `h` now that it can never need a quorum again.
    pub fn on_block_sealed(&mut self, sealed_height: Height) {
        self.rounds.retain(|(height, _), _| *height > sealed_height);
    }
}
