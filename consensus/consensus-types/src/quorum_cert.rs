// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    common::{AuthorIndex, EpochId, Height, Level},
    error::VerifyError,
    hash::HashValue,
    validator_verifier::ValidatorVerifier,
    vote_data::{BlockInfoLite, VoteData},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One validator's endorsement of a (height, level, blockId, epoch)
/// tuple, folded into a [`QuorumCert`] once quorum is reached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementInfo {
    pub author: AuthorIndex,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

/// A quorum certificate, or — when `new_view` is set — a timeout
/// certificate (TC). spec.md §3: "A QC with newView=true carries no
/// blockId and represents a timeout certificate."
///
/// `block_id` is therefore `None` iff `new_view` is `true`; this crate
/// never represents a TC as a distinct type, matching how the source
/// protocol folds both into one `QuorumCert` wire message
/// (`original_source/module/consensus/chainedbft/protocol.go`,
/// `aggregateQCAndInsert`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumCert {
    block_id: Option<HashValue>,
    height: Height,
    level: Level,
    epoch: EpochId,
    new_view: bool,
    endorsements: Vec<EndorsementInfo>,
    /// The certified block's parent, as carried by every endorsing
    /// vote's `VoteData`. `None` for a TC (no certified block) and for
    /// the genesis QC (no parent). Lets the three-chain commit rule
    /// (spec.md §4.3) walk two hops from a single QC, the same way the
    /// teacher's `QuorumCert::parent_block()`/`certified_block()` pair
    /// does via its embedded `VoteData`.
    parent_block: Option<BlockInfoLite>,
}

impl QuorumCert {
    pub fn new_qc(
        block_id: HashValue,
        height: Height,
        level: Level,
        epoch: EpochId,
        parent_block: BlockInfoLite,
        endorsements: Vec<EndorsementInfo>,
    ) -> Self {
        Self {
            block_id: Some(block_id),
            height,
            level,
            epoch,
            new_view: false,
            endorsements,
            parent_block: Some(parent_block),
        }
    }

    pub fn new_tc(
        height: Height,
        level: Level,
        epoch: EpochId,
        endorsements: Vec<EndorsementInfo>,
    ) -> Self {
        Self {
            block_id: None,
            height,
            level,
            epoch,
            new_view: true,
            endorsements,
            parent_block: None,
        }
    }

    /// The certificate for the (implicit) genesis block: height 0,
    /// level 0, vacuously certified (no endorsements required since
    /// there is no predecessor to have voted on it).
    pub fn certificate_for_genesis(epoch: EpochId) -> Self {
        Self {
            block_id: Some(HashValue::zero()),
            height: 0,
            level: 0,
            epoch,
            new_view: false,
            endorsements: Vec::new(),
            parent_block: None,
        }
    }

    pub fn certified_block_id(&self) -> Option<HashValue> {
        self.block_id
    }

    /// The parent of the certified block, i.e. the block two hops back
    /// from whatever block is built on top of this QC. `None` for TCs
    /// and for the genesis QC.
    pub fn parent_block(&self) -> Option<&BlockInfoLite> {
        self.parent_block.as_ref()
    }

    pub fn height(&self) -> Height {
        self.height
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn epoch(&self) -> EpochId {
        self.epoch
    }

    pub fn is_new_view(&self) -> bool {
        self.new_view
    }

    pub fn endorsements(&self) -> &[EndorsementInfo] {
        &self.endorsements
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.level == 0 && !self.new_view
    }

    /// spec.md §3 QC invariant: "for a non-newView QC, |endorsements| ≥
    /// quorum ... each endorsement is over the same (height, level,
    /// blockId, epochId)." Genesis is exempt (it precedes any vote).
    pub fn verify(&self, verifier: &ValidatorVerifier) -> Result<(), VerifyError> {
        if self.is_genesis() {
            return Ok(());
        }
        let required = verifier.quorum_threshold();
        let mut by_author = BTreeMap::new();
        for e in &self.endorsements {
            if by_author.insert(e.author, ()).is_some() {
                return Err(VerifyError::ConflictingAuthor { author: e.author });
            }
        }
        if by_author.len() < required {
            return Err(VerifyError::NotEnoughEndorsements {
                actual: by_author.len(),
                required,
            });
        }
        Ok(())
    }

    /// The bytes every endorsing [`crate::vote::Vote`] signed, reconstructed
    /// from the certificate itself. An `EndorsementInfo` is exactly a
    /// vote's `(author, signature)` folded into the QC once quorum formed
    /// (`msg_pool::check_votes_done`), so this must byte-for-byte match
    /// what `Vote::signable_bytes` produces for a vote over this same
    /// (height, level, epoch, newView, voteData).
    fn endorsement_signable_bytes(&self) -> anyhow::Result<Vec<u8>> {
        #[derive(Serialize)]
        struct Signable {
            height: Height,
            level: Level,
            epoch: EpochId,
            new_view: bool,
            vote_data: Option<VoteData>,
        }
        let vote_data = self.block_id.map(|id| {
            VoteData::new(
                BlockInfoLite { id, height: self.height, level: self.level, epoch: self.epoch },
                self.parent_block.expect("a certified block's QC always carries its parent"),
            )
        });
        Ok(bcs::to_bytes(&Signable {
            height: self.height,
            level: self.level,
            epoch: self.epoch,
            new_view: self.new_view,
            vote_data,
        })?)
    }

    /// spec.md §3 QC invariant, cryptographic half: on top of
    /// [`QuorumCert::verify`]'s quorum-count check, confirms every
    /// endorsement is a genuine signature over this certificate's
    /// content. Needed for any QC arriving from outside this replica's
    /// own vote aggregation (an embedded `justify_qc`, a synced block's
    /// QC) -- a locally-aggregated QC's endorsements were already
    /// checked one by one as votes came in, but nothing re-checks them
    /// once folded together, and `verify` alone only counts authors.
    pub fn verify_endorsements<F>(&self, verifier: &ValidatorVerifier, mut check_signature: F) -> Result<(), VerifyError>
    where
        F: FnMut(AuthorIndex, &[u8], &[u8]) -> bool,
    {
        self.verify(verifier)?;
        if self.is_genesis() {
            return Ok(());
        }
        let message = self
            .endorsement_signable_bytes()
            .map_err(|e| VerifyError::Malformed(e.to_string()))?;
        for e in &self.endorsements {
            if !check_signature(e.author, &message, &e.signature) {
                return Err(VerifyError::InvalidEndorsementSignature { author: e.author });
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for QuorumCert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.new_view {
            write!(f, "TC(height={}, level={})", self.height, self.level)
        } else {
            write!(
                f,
                "QC(block={:?}, height={}, level={})",
                self.block_id, self.height, self.level
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator_verifier::ValidatorInfo;

    fn validators(n: u16) -> ValidatorVerifier {
        ValidatorVerifier::new((0..n).map(|i| ValidatorInfo { author: i, public_key: vec![], weight: 1 }).collect())
    }

    fn qc_with_signatures(signatures: Vec<(AuthorIndex, Vec<u8>)>) -> QuorumCert {
        let endorsements = signatures
            .into_iter()
            .map(|(author, signature)| EndorsementInfo { author, signature })
            .collect();
        QuorumCert::new_qc(
            HashValue::new([7u8; 32]),
            1,
            1,
            0,
            BlockInfoLite { id: HashValue::zero(), height: 0, level: 0, epoch: 0 },
            endorsements,
        )
    }

    /// The fix this test guards: `verify` alone (quorum-count only)
    /// would have accepted this certificate even though none of its
    /// signatures are genuine.
    #[test]
    fn verify_endorsements_rejects_a_quorum_of_forged_signatures() {
        let qc = qc_with_signatures(vec![(0, vec![0xAA]), (1, vec![0xAA]), (2, vec![0xAA])]);
        let verifier = validators(4);
        assert!(qc.verify(&verifier).is_ok());
        let result = qc.verify_endorsements(&verifier, |_, _, _| false);
        assert!(matches!(result, Err(VerifyError::InvalidEndorsementSignature { .. })));
    }

    #[test]
    fn verify_endorsements_accepts_a_quorum_of_genuine_signatures() {
        let qc = qc_with_signatures(vec![(0, vec![1]), (1, vec![1]), (2, vec![1])]);
        let verifier = validators(4);
        assert!(qc.verify_endorsements(&verifier, |_, _, signature| signature == [1]).is_ok());
    }

    #[test]
    fn verify_endorsements_still_enforces_quorum_count_first() {
        let qc = qc_with_signatures(vec![(0, vec![1])]);
        let verifier = validators(4);
        let result = qc.verify_endorsements(&verifier, |_, _, _| true);
        assert!(matches!(result, Err(VerifyError::NotEnoughEndorsements { .. })));
    }
}
