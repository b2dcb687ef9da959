// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::common::AuthorIndex;
use serde::{Deserialize, Serialize};

/// One member of the validator set: an index stable for the lifetime of
/// the epoch, a network/verification identity, and a stake weight used
/// only by the election tie-break (spec.md §6 `ValidatorsElection`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub author: AuthorIndex,
    #[serde(with = "serde_bytes")]
    pub public_key: Vec<u8>,
    pub weight: u64,
}

/// The read-only, epoch-scoped view of the validator set. Built once per
/// epoch and never mutated in place (spec.md §9: "Epoch as an immutable
/// value ... no in-place mutation of validator lists").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorVerifier {
    validators: Vec<ValidatorInfo>,
}

impl ValidatorVerifier {
    pub fn new(validators: Vec<ValidatorInfo>) -> Self {
        assert!(!validators.is_empty(), "validator set cannot be empty");
        Self { validators }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn validators(&self) -> &[ValidatorInfo] {
        &self.validators
    }

    pub fn author_at(&self, index: AuthorIndex) -> Option<&ValidatorInfo> {
        self.validators.iter().find(|v| v.author == index)
    }

    pub fn contains(&self, index: AuthorIndex) -> bool {
        self.author_at(index).is_some()
    }

    /// spec.md §9 open question resolution: the quorum threshold is
    /// `ceil((2N + 1) / 3)` for `N` validators (the smallest integer
    /// strictly greater than `2N/3`, i.e. more than two thirds).
    pub fn quorum_threshold(&self) -> usize {
        quorum_threshold(self.validators.len())
    }

    /// `proposer(level) = epoch.validators[level mod |validators|]`
    /// (spec.md §4.3 Leader schedule), round-robin within the epoch.
    pub fn leader_for_level(&self, level: u64) -> AuthorIndex {
        let idx = (level as usize) % self.validators.len();
        self.validators[idx].author
    }
}

pub fn quorum_threshold(n: usize) -> usize {
    (2 * n + 1 + 2) / 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_threshold_matches_three_f_plus_one() {
        // N = 3f + 1 validators tolerate f Byzantine; quorum is 2f + 1.
        for f in 0u64..10 {
            let n = (3 * f + 1) as usize;
            let expected = (2 * f + 1) as usize;
            assert_eq!(quorum_threshold(n), expected, "f={f} n={n}");
        }
    }

    #[test]
    fn leader_round_robins() {
        let validators = (0..4)
            .map(|i| ValidatorInfo {
                author: i,
                public_key: vec![],
                weight: 1,
            })
            .collect();
        let verifier = ValidatorVerifier::new(validators);
        assert_eq!(verifier.leader_for_level(0), 0);
        assert_eq!(verifier.leader_for_level(4), 0);
        assert_eq!(verifier.leader_for_level(5), 1);
    }
}
