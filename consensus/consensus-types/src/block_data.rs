// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    common::{AuthorIndex, EpochId, Height, Level, Payload},
    error::VerifyError,
    hash::HashValue,
    quorum_cert::QuorumCert,
};
use serde::{Deserialize, Serialize};

/// Consensus-only metadata carried by a block, distinct from its payload
/// (spec.md §3 Block: "consensus-args (encodes the level and optional
/// epoch-transition data)"). Kept separate from [`BlockData`] itself so a
/// block without any epoch change can serialize this as `None` cheaply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochChangeArgs {
    /// Height at which the carried validator set takes effect.
    pub switch_height: Height,
    /// Next epoch's ordered validator set, serialized opaquely (the
    /// staking/election collaborator produced these; consensus only
    /// relays them, see spec.md §6 Staking/Election).
    #[serde(with = "serde_bytes")]
    pub next_validators: Vec<u8>,
}

/// The hashed, signable content of a block: everything except the id and
/// signature that wrap it in [`crate::block::Block`]. Mirrors the
/// `BlockData`/`Block` split used throughout the retrieval pack's
/// chained-BFT forks (e.g. `consensus-types/src/block_data.rs`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockData {
    pub height: Height,
    pub level: Level,
    pub epoch: EpochId,
    pub parent_id: HashValue,
    pub proposer: AuthorIndex,
    pub payload: Payload,
    pub epoch_change: Option<EpochChangeArgs>,
    /// The QC the proposer justified this block with. `None` only for
    /// the genesis block.
    pub justify_qc: Option<QuorumCert>,
}

impl BlockData {
    pub fn genesis(epoch: EpochId) -> Self {
        Self {
            height: 0,
            level: 0,
            epoch,
            parent_id: HashValue::zero(),
            proposer: 0,
            payload: Payload::empty(),
            epoch_change: None,
            justify_qc: None,
        }
    }

    pub fn new_proposal(
        height: Height,
        level: Level,
        epoch: EpochId,
        proposer: AuthorIndex,
        payload: Payload,
        epoch_change: Option<EpochChangeArgs>,
        justify_qc: QuorumCert,
    ) -> Self {
        Self {
            height,
            level,
            epoch,
            parent_id: justify_qc.certified_block_id().unwrap_or_else(HashValue::zero),
            proposer,
            payload,
            epoch_change,
            justify_qc: Some(justify_qc),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.justify_qc.is_none()
    }

    /// spec.md §3 Proposal invariant: `proposal.level > justifyQC.level`.
    pub fn verify_well_formed(&self) -> Result<(), VerifyError> {
        if self.is_genesis() {
            return Ok(());
        }
        let qc = self
            .justify_qc
            .as_ref()
            .expect("non-genesis block must carry a justify QC");
        if self.level <= qc.level() {
            return Err(VerifyError::LevelNotAfterQc {
                proposal: self.level,
                qc: qc.level(),
            });
        }
        if let Some(qc_block) = qc.certified_block_id() {
            if qc_block != self.parent_id {
                return Err(VerifyError::ParentMismatch {
                    parent: self.parent_id,
                    qc: qc_block,
                });
            }
        }
        Ok(())
    }
}
