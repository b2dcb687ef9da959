// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    common::{EpochId, Height},
    validator_verifier::ValidatorVerifier,
};
use serde::{Deserialize, Serialize};

/// spec.md §3 Epoch: "(epochId, ordered validator list, switch height,
/// quorum threshold)". `switch_height` is the height at (or above) which
/// a block commits the epoch transition into this epoch; `None` for the
/// genesis epoch, which is active from height 0.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochState {
    pub epoch: EpochId,
    pub verifier: ValidatorVerifier,
    pub switch_height: Option<Height>,
}

impl EpochState {
    pub fn genesis(verifier: ValidatorVerifier) -> Self {
        Self {
            epoch: 0,
            verifier,
            switch_height: None,
        }
    }

    pub fn next(&self, verifier: ValidatorVerifier, switch_height: Height) -> Self {
        Self {
            epoch: self.epoch + 1,
            verifier,
            switch_height: Some(switch_height),
        }
    }
}
