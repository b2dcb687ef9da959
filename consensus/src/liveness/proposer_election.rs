// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.3 "Leader schedule": "proposer(level) = epoch.validators
//! [level mod |validators|]", round-robin over the current epoch's
//! validator set. Kept as its own thin type rather than folded into
//! `ValidatorVerifier` so a future epoch could plug in a different
//! election strategy without touching verification.

use consensus_types::{common::{AuthorIndex, Level}, validator_verifier::ValidatorVerifier};

pub struct ProposerElection<'a> {
    verifier: &'a ValidatorVerifier,
}

impl<'a> ProposerElection<'a> {
    pub fn new(verifier: &'a ValidatorVerifier) -> Self {
        Self { verifier }
    }

    pub fn get_leader(&self, level: Level) -> AuthorIndex {
        self.verifier.leader_for_level(level)
    }

    pub fn is_valid_proposer(&self, author: AuthorIndex, level: Level) -> bool {
        self.get_leader(level) == author
    }
}
