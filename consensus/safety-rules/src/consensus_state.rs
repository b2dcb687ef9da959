// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use consensus_types::common::{EpochId, Level};
use serde::{Deserialize, Serialize};

/// The subset of `SMRState` (spec.md §3) that safety depends on and that
/// must survive a crash: current epoch, the last level this replica
/// voted at, and the level of its locked QC. Everything else
/// (currentLevel, lifecyclePhase, highestQC/highestTC) is liveness-only
/// and is allowed to be recomputed from the WAL and message pool after a
/// restart (spec.md §4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusState {
    epoch: EpochId,
    last_voted_level: Level,
    locked_level: Level,
}

impl ConsensusState {
    pub fn new(epoch: EpochId, last_voted_level: Level, locked_level: Level) -> Self {
        Self {
            epoch,
            last_voted_level,
            locked_level,
        }
    }

    pub fn genesis() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn epoch(&self) -> EpochId {
        self.epoch
    }

    pub fn last_voted_level(&self) -> Level {
        self.last_voted_level
    }

    pub fn locked_level(&self) -> Level {
        self.locked_level
    }
}
