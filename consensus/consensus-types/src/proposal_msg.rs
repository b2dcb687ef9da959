// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{block::Block, common::AuthorIndex, error::VerifyError, sync_info::SyncInfo};
use serde::{Deserialize, Serialize};

/// spec.md §3 Proposal: "(proposerIdx, block, level, epochId,
/// justifyQC, syncInfo)". `level` and `epochId` and `justifyQC` are
/// carried redundantly with the embedded `block.data()` fields so a
/// receiver can validate structural fields before deserializing and
/// hashing the whole block (spec.md §4.4 step 1, "Structural").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalMsg {
    pub proposer: AuthorIndex,
    pub block: Block,
    pub sync_info: SyncInfo,
}

impl ProposalMsg {
    pub fn new(proposer: AuthorIndex, block: Block, sync_info: SyncInfo) -> Self {
        Self {
            proposer,
            block,
            sync_info,
        }
    }

    pub fn level(&self) -> u64 {
        self.block.level()
    }

    pub fn epoch(&self) -> u64 {
        self.block.epoch()
    }

    /// spec.md §3 Proposal invariant, plus "proposer is the scheduled
    /// leader of proposal.level" is checked by the driver once it has
    /// resolved the epoch's validator set (this crate has no access to
    /// it).
    pub fn verify_well_formed(&self) -> Result<(), VerifyError> {
        if self.block.proposer() != self.proposer {
            return Err(VerifyError::ConflictingAuthor {
                author: self.proposer,
            });
        }
        self.block.verify_well_formed()
    }
}

impl std::fmt::Display for ProposalMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProposalMsg(proposer={}, {})", self.proposer, self.block)
    }
}
