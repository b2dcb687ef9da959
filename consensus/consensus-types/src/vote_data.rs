// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    common::{EpochId, Height, Level},
    hash::HashValue,
};
use serde::{Deserialize, Serialize};

/// A minimal, self-contained reference to a block: enough to identify it
/// and its place in the chain without re-fetching the full `BlockData`.
/// Used by [`VoteData`] and by the three-chain commit check, mirroring
/// the role `BlockInfo` plays in the teacher's `VoteData`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfoLite {
    pub id: HashValue,
    pub height: Height,
    pub level: Level,
    pub epoch: EpochId,
}

/// The block-chain context a vote commits to: the block being voted for,
/// and the block its justify QC certified (its parent in the 3-chain).
/// Carrying both in the vote lets a receiver assemble the three-chain
/// commit check without walking the tree itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteData {
    pub proposed: BlockInfoLite,
    pub parent: BlockInfoLite,
}

impl VoteData {
    pub fn new(proposed: BlockInfoLite, parent: BlockInfoLite) -> Self {
        Self { proposed, parent }
    }
}
