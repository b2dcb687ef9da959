// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::common::{EpochId, Level};
use thiserror::Error;

/// Structural/consistency errors raised while constructing or verifying
/// a wire type, independent of any particular driver or storage. These
/// map onto the `InvalidMessage` / `EpochMismatch` taxonomy of spec.md
/// §7; the driver decides how to log and propagate them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("block parent hash {parent} does not match justify QC block id {qc}")]
    ParentMismatch {
        parent: crate::hash::HashValue,
        qc: crate::hash::HashValue,
    },

    #[error("proposal level {proposal} is not greater than justify QC level {qc}")]
    LevelNotAfterQc { proposal: Level, qc: Level },

    #[error("quorum certificate has {actual} endorsements, need at least {required}")]
    NotEnoughEndorsements { actual: usize, required: usize },

    #[error("quorum certificate endorsements disagree on (height, level, block, epoch)")]
    InconsistentEndorsements,

    #[error("a vote cannot carry both a block id and newView=true")]
    AmbiguousVote,

    #[error("epoch mismatch: message epoch {message}, expected {expected}")]
    EpochMismatch { message: EpochId, expected: EpochId },

    #[error("duplicate author {author} endorses conflicting content at the same (height, level)")]
    ConflictingAuthor { author: u16 },

    #[error("endorsement signature from author {author} does not verify")]
    InvalidEndorsementSignature { author: u16 },

    #[error("malformed certificate: {0}")]
    Malformed(String),
}
