// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// spec.md §7 taxonomy, restricted to what the safety engine itself can
/// raise: a `SafetyViolation` is never surfaced past the driver as an
/// error to the caller (spec.md §7 propagation policy) — it is returned
/// here so the driver can log it and drop the vote, not unwind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("not initialized: no epoch state loaded yet")]
    NotInitialized,

    #[error("incorrect epoch: message epoch {0}, expected {1}")]
    IncorrectEpoch(u64, u64),

    #[error("safety violation: level {level} is not greater than last voted level {last_voted}")]
    OldLevel { level: u64, last_voted: u64 },

    #[error("safety violation: justify QC level {qc_level} is below locked QC level {locked_level}")]
    LockedLevelViolation { qc_level: u64, locked_level: u64 },

    #[error("invalid quorum certificate: {0}")]
    InvalidQuorumCertificate(String),

    #[error("persistent storage failure: {0}")]
    StorageFailure(String),
}
