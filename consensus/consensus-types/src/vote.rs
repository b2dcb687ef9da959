// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    common::{AuthorIndex, EpochId, Height, Level},
    error::VerifyError,
    hash::HashValue,
    vote_data::VoteData,
};
use serde::{Deserialize, Serialize};

/// spec.md §3 Vote: "(author, authorIdx, height, level, blockId or
/// none, epochId, newView, signature)". A regular vote carries
/// `vote_data` (the block it endorses and that block's parent, so a
/// receiver can fold it straight into the three-chain check); a timeout
/// vote carries `vote_data = None` and `new_view = true`.
///
/// spec.md §9 open question: a vote with both a block id and
/// `new_view = true` is invalid — enforced in [`Vote::verify_well_formed`],
/// resolving the ambiguity the source left unresolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub author: AuthorIndex,
    pub height: Height,
    pub level: Level,
    pub epoch: EpochId,
    pub new_view: bool,
    pub vote_data: Option<VoteData>,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl Vote {
    pub fn new_regular(
        author: AuthorIndex,
        height: Height,
        level: Level,
        epoch: EpochId,
        vote_data: VoteData,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            author,
            height,
            level,
            epoch,
            new_view: false,
            vote_data: Some(vote_data),
            signature,
        }
    }

    pub fn new_timeout(
        author: AuthorIndex,
        height: Height,
        level: Level,
        epoch: EpochId,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            author,
            height,
            level,
            epoch,
            new_view: true,
            vote_data: None,
            signature,
        }
    }

    /// Converts an already-cast regular vote into its timeout form, used
    /// by the driver when a level times out after the replica already
    /// voted regularly at that level (spec.md §4.4 "re-emit it converted
    /// to newView=true").
    pub fn into_timeout(mut self, signature: Vec<u8>) -> Self {
        self.new_view = true;
        self.vote_data = None;
        self.signature = signature;
        self
    }

    pub fn block_id(&self) -> Option<HashValue> {
        self.vote_data.as_ref().map(|vd| vd.proposed.id)
    }

    pub fn signable_bytes(&self) -> anyhow::Result<Vec<u8>> {
        #[derive(Serialize)]
        struct Signable<'a> {
            height: Height,
            level: Level,
            epoch: EpochId,
            new_view: bool,
            vote_data: &'a Option<VoteData>,
        }
        Ok(bcs::to_bytes(&Signable {
            height: self.height,
            level: self.level,
            epoch: self.epoch,
            new_view: self.new_view,
            vote_data: &self.vote_data,
        })?)
    }

    pub fn verify_well_formed(&self) -> Result<(), VerifyError> {
        if self.new_view && self.vote_data.is_some() {
            return Err(VerifyError::AmbiguousVote);
        }
        if !self.new_view && self.vote_data.is_none() {
            return Err(VerifyError::AmbiguousVote);
        }
        Ok(())
    }
}
