// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use consensus_types::{common::EpochId, error::VerifyError};
use thiserror::Error;

/// spec.md §7 error taxonomy. Every inbound-message failure is one of
/// these; the driver's validation pipeline (spec.md §4.4) returns the
/// first one it hits and stops.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid signature from author {author}")]
    InvalidSignature { author: u16 },

    #[error("invalid author: {0}")]
    InvalidAuthor(String),

    #[error("safety violation: {0}")]
    SafetyViolation(#[from] safety_rules::Error),

    #[error("missing data, sync required: {0}")]
    MissingData(String),

    #[error("epoch mismatch: message epoch {message}, expected {expected}")]
    EpochMismatch { message: EpochId, expected: EpochId },

    #[error("malformed wire type: {0}")]
    Verify(#[from] VerifyError),

    #[error("orphan block: parent {0} not present in the tree")]
    OrphanBlock(String),

    #[error("unknown root: {0} is not a known block id")]
    UnknownRoot(String),

    #[error("data sync incomplete: {0}")]
    SyncIncomplete(String),
}

impl Error {
    pub fn invalid_message(msg: impl Into<String>) -> Self {
        Self::InvalidMessage(msg.into())
    }
}

/// spec.md §7: "PersistenceFailure ... fatal; abort the consensus loop;
/// rely on restart+WAL replay." This is the *only* error type the event
/// loop escalates to its caller instead of logging and continuing;
/// everything else is handled inside `RoundManager::handle_message`.
#[derive(Debug, Error)]
#[error("persistence failure, consensus loop must restart: {0}")]
pub struct FatalError(#[from] pub anyhow::Error);
