// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.1 `BlockPool`: "Couples BlockTree with a map
//! BlockId→QC; exposes highest QC / highest certified block." Split out
//! from `BlockTree` the way `original_source/module/consensus/chainedbft/block_pool/block_pool.go`
//! keeps QC bookkeeping separate from the tree walker.

use consensus_types::{common::Height, hash::HashValue, quorum_cert::QuorumCert};
use std::collections::HashMap;

pub struct BlockPool {
    qcs: HashMap<HashValue, QuorumCert>,
    highest_qc: QuorumCert,
    highest_certified_height: Height,
    highest_certified_block: Option<HashValue>,
}

impl BlockPool {
    pub fn new(genesis_qc: QuorumCert) -> Self {
        Self {
            qcs: HashMap::new(),
            highest_qc: genesis_qc,
            highest_certified_height: 0,
            highest_certified_block: None,
        }
    }

    /// spec.md §4.1: "InsertQC(qc) stores per blockId, updates
    /// highestQC if qc.level > highestQC.level; if the QC's block is in
    /// the tree, updates highestCertifiedBlock by max height."
    ///
    /// `block_in_tree` tells us whether `qc`'s certified block is
    /// currently resident, since this module has no visibility into
    /// `BlockTree` itself (spec.md §9: single owning component per
    /// concern, composed by `BlockStore`).
    pub fn insert_qc(&mut self, qc: QuorumCert, block_in_tree: bool) {
        if let Some(block_id) = qc.certified_block_id() {
            if qc.level() > self.highest_qc.level() {
                self.highest_qc = qc.clone();
            }
            if block_in_tree && qc.height() > self.highest_certified_height {
                self.highest_certified_height = qc.height();
                self.highest_certified_block = Some(block_id);
            }
            self.qcs.insert(block_id, qc);
        } else if qc.level() > self.highest_qc.level() {
            // A TC carries no block id but still represents liveness
            // progress; it updates highest_qc's level bookkeeping via
            // the pacemaker instead (see `liveness::pacemaker`), not
            // here -- this pool only indexes QCs that certify a block.
        }
    }

    pub fn get_qc(&self, block_id: HashValue) -> Option<&QuorumCert> {
        self.qcs.get(&block_id)
    }

    pub fn highest_qc(&self) -> &QuorumCert {
        &self.highest_qc
    }

    pub fn highest_certified_block(&self) -> Option<HashValue> {
        self.highest_certified_block
    }

    /// spec.md §4.1 `Prune`: "discards all nodes not on the newRoot
    /// subtree, drops their QCs." Called with the set of block ids the
    /// tree just discarded.
    pub fn drop_qcs_for(&mut self, discarded: &[HashValue]) {
        for id in discarded {
            self.qcs.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consensus_types::{quorum_cert::EndorsementInfo, vote_data::BlockInfoLite};

    fn info(level: u64) -> BlockInfoLite {
        BlockInfoLite {
            id: HashValue::zero(),
            height: level,
            level,
            epoch: 0,
        }
    }

    #[test]
    fn insert_qc_updates_highest() {
        let mut pool = BlockPool::new(QuorumCert::certificate_for_genesis(0));
        let qc1 = QuorumCert::new_qc(HashValue::zero(), 1, 1, 0, info(0), vec![EndorsementInfo {
            author: 0,
            signature: vec![],
        }]);
        pool.insert_qc(qc1.clone(), true);
        assert_eq!(pool.highest_qc().level(), 1);
        assert_eq!(pool.highest_certified_block(), qc1.certified_block_id());
    }

    #[test]
    fn insert_qc_is_idempotent_on_same_level() {
        let mut pool = BlockPool::new(QuorumCert::certificate_for_genesis(0));
        let qc1 = QuorumCert::new_qc(HashValue::zero(), 1, 1, 0, info(0), vec![]);
        pool.insert_qc(qc1.clone(), true);
        pool.insert_qc(qc1, true);
        assert_eq!(pool.highest_qc().level(), 1);
    }
}
