// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §6 "Block verifier (in)": `VerifyBlock(block, mode =
//! CONSENSUS_VERIFY) -> ok/err (must verify tx integrity and state-root
//! feasibility)". The execution engine and VM live entirely outside
//! this crate (spec.md §1 non-goals); this trait is the seam.

use consensus_types::block::Block;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    ConsensusVerify,
}

#[derive(Debug, Error)]
#[error("block verification failed: {0}")]
pub struct BlockVerifyError(pub String);

pub trait BlockVerifier: Send + Sync {
    fn verify_block(&self, block: &Block, mode: VerifyMode) -> Result<(), BlockVerifyError>;
}

/// Accepts every well-formed block. Used by the test harness and by
/// deployments that verify transactions upstream of consensus (e.g. a
/// mempool admission filter) rather than again inside the BFT core.
pub struct AcceptAllVerifier;

impl BlockVerifier for AcceptAllVerifier {
    fn verify_block(&self, _block: &Block, _mode: VerifyMode) -> Result<(), BlockVerifyError> {
        Ok(())
    }
}
