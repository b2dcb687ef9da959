// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    block_data::BlockData,
    common::{AuthorIndex, EpochId, Height, Level},
    error::VerifyError,
    hash::HashValue,
};
use serde::{Deserialize, Serialize};

/// A proposed block: [`BlockData`] plus the identity that follows from
/// hashing it, and the proposer's signature over that id.
///
/// spec.md §3 Block invariant: "a block's parent hash equals its
/// parent's hash; height = parent.height + 1" — enforced by
/// [`crate::proposal_msg::ProposalMsg::verify_well_formed`] against the
/// parent already resident in the block tree, since a `Block` alone
/// cannot check it has the right parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    id: HashValue,
    data: BlockData,
    #[serde(with = "serde_bytes")]
    signature: Vec<u8>,
}

impl Block {
    /// Builds a block from its data and a pre-computed signature. Callers
    /// obtain the signature via the crypto provider (spec.md §6); this
    /// type never signs anything itself.
    pub fn new(data: BlockData, signature: Vec<u8>) -> anyhow::Result<Self> {
        let id = HashValue::from_serializable(&data)?;
        Ok(Self { id, data, signature })
    }

    pub fn genesis(epoch: EpochId) -> Self {
        let data = BlockData::genesis(epoch);
        let id = HashValue::from_serializable(&data).expect("genesis data always serializes");
        Self {
            id,
            data,
            signature: Vec::new(),
        }
    }

    pub fn id(&self) -> HashValue {
        self.id
    }

    pub fn parent_id(&self) -> HashValue {
        self.data.parent_id
    }

    pub fn height(&self) -> Height {
        self.data.height
    }

    pub fn level(&self) -> Level {
        self.data.level
    }

    pub fn epoch(&self) -> EpochId {
        self.data.epoch
    }

    pub fn proposer(&self) -> AuthorIndex {
        self.data.proposer
    }

    pub fn data(&self) -> &BlockData {
        &self.data
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn signable_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(bcs::to_bytes(&self.data)?)
    }

    pub fn is_genesis(&self) -> bool {
        self.data.is_genesis()
    }

    /// Checks the block's own internal consistency (level after justify
    /// QC, parent matches justify QC's block), independent of whether
    /// the parent is actually present in any particular tree.
    pub fn verify_well_formed(&self) -> Result<(), VerifyError> {
        self.data.verify_well_formed()
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Block(id={}, height={}, level={}, parent={})",
            self.id, self.data.height, self.data.level, self.data.parent_id
        )
    }
}
