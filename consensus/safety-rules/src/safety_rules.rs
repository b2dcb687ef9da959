// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    consensus_state::ConsensusState, error::Error,
    persistent_safety_storage::PersistentSafetyStorage,
    t_safety_rules::{three_chain_commit, TSafetyRules},
};
use consensus_types::{
    epoch_state::EpochState, quorum_cert::QuorumCert, vote_data::BlockInfoLite,
};
use std::sync::Arc;
use tracing::debug;

/// The safety engine: owns nothing but the persisted safety-critical
/// state and the current epoch's validator set, and exposes the pure
/// decision rules of spec.md §4.3. It never touches the network, the
/// block tree, or the WAL — those are the consensus crate's job.
pub struct SafetyRules {
    storage: Arc<dyn PersistentSafetyStorage>,
    epoch_state: Option<EpochState>,
}

impl SafetyRules {
    pub fn new(storage: Arc<dyn PersistentSafetyStorage>) -> Self {
        Self {
            storage,
            epoch_state: None,
        }
    }

    fn epoch_state(&self) -> Result<&EpochState, Error> {
        self.epoch_state.as_ref().ok_or(Error::NotInitialized)
    }
}

impl TSafetyRules for SafetyRules {
    fn consensus_state(&self) -> Result<ConsensusState, Error> {
        Ok(ConsensusState::new(
            self.storage.epoch()?,
            self.storage.last_voted_level()?,
            self.storage.locked_level()?,
        ))
    }

    fn start_new_epoch(&mut self, epoch_state: EpochState) -> Result<(), Error> {
        let current_epoch = self.storage.epoch()?;
        if current_epoch < epoch_state.epoch {
            self.storage.set_epoch(epoch_state.epoch)?;
            debug!(epoch = epoch_state.epoch, "safety rules adopted new epoch");
        }
        self.epoch_state = Some(epoch_state);
        Ok(())
    }

    fn update_lock(&mut self, qc: &QuorumCert) -> Result<(), Error> {
        let locked_level = self.storage.locked_level()?;
        if qc.level() > locked_level {
            self.storage.set_locked_level(qc.level())?;
            debug!(new_locked_level = qc.level(), "locked QC advanced");
        }
        Ok(())
    }

    fn vote_rule(&mut self, level: u64, justify_qc: &QuorumCert) -> Result<(), Error> {
        let expected_epoch = self.epoch_state()?.epoch;
        if justify_qc.epoch() != expected_epoch {
            return Err(Error::IncorrectEpoch(justify_qc.epoch(), expected_epoch));
        }

        let last_voted = self.storage.last_voted_level()?;
        if level <= last_voted {
            return Err(Error::OldLevel {
                level,
                last_voted,
            });
        }

        let locked_level = self.storage.locked_level()?;
        if justify_qc.level() < locked_level {
            return Err(Error::LockedLevelViolation {
                qc_level: justify_qc.level(),
                locked_level,
            });
        }

        self.storage.set_last_voted_level(level)?;
        Ok(())
    }

    fn construct_ledger_info(
        &self,
        proposed: &BlockInfoLite,
        parent_qc: &QuorumCert,
    ) -> Option<BlockInfoLite> {
        three_chain_commit(proposed, parent_qc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistent_safety_storage::InMemoryStorage;
    use consensus_types::{
        hash::HashValue,
        quorum_cert::EndorsementInfo,
        validator_verifier::{ValidatorInfo, ValidatorVerifier},
    };

    fn info(id: u8, height: u64, level: u64) -> BlockInfoLite {
        let mut bytes = [0u8; 32];
        bytes[0] = id;
        BlockInfoLite {
            id: HashValue::new(bytes),
            height,
            level,
            epoch: 0,
        }
    }

    fn rules_with_epoch() -> SafetyRules {
        let mut rules = SafetyRules::new(Arc::new(InMemoryStorage::new()));
        let verifier = ValidatorVerifier::new(vec![ValidatorInfo {
            author: 0,
            public_key: vec![],
            weight: 1,
        }]);
        rules.start_new_epoch(EpochState::genesis(verifier)).unwrap();
        rules
    }

    #[test]
    fn vote_rule_rejects_non_increasing_level() {
        let mut rules = rules_with_epoch();
        let genesis_qc = QuorumCert::certificate_for_genesis(0);
        rules.vote_rule(1, &genesis_qc).unwrap();
        let err = rules.vote_rule(1, &genesis_qc).unwrap_err();
        assert_eq!(
            err,
            Error::OldLevel {
                level: 1,
                last_voted: 1
            }
        );
    }

    #[test]
    fn vote_rule_rejects_stale_justify_qc() {
        let mut rules = rules_with_epoch();
        let qc_level_5 = QuorumCert::new_qc(
            HashValue::zero(),
            5,
            5,
            0,
            info(0, 4, 4),
            vec![EndorsementInfo {
                author: 0,
                signature: vec![],
            }],
        );
        rules.update_lock(&qc_level_5).unwrap();

        let stale_qc = QuorumCert::certificate_for_genesis(0);
        let err = rules.vote_rule(6, &stale_qc).unwrap_err();
        assert_eq!(
            err,
            Error::LockedLevelViolation {
                qc_level: 0,
                locked_level: 5
            }
        );
    }

    #[test]
    fn three_chain_commit_rule() {
        let rules = rules_with_epoch();
        let parent_qc = QuorumCert::new_qc(
            HashValue::zero(),
            2,
            2,
            0,
            info(0, 1, 1),
            vec![],
        );
        let proposed = info(9, 3, 3);
        let committed = rules.construct_ledger_info(&proposed, &parent_qc);
        assert_eq!(committed, Some(info(0, 1, 1)));

        // Gap at level 2 -> no commit.
        let proposed_gap = info(9, 4, 4);
        assert_eq!(rules.construct_ledger_info(&proposed_gap, &parent_qc), None);
    }
}
