// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.1/§4.8: `BlockStore` composes `BlockTree` (pending blocks),
//! `BlockPool` (QC bookkeeping) and a `LedgerBridge` (durable commit)
//! into the single object the driver inserts proposals and certificates
//! into. The three-chain commit check itself lives in `safety_rules`, as
//! a pure function of a block and its own justify QC -- this type's only
//! job is wiring that check's result into a tree prune and a ledger
//! write.

use crate::{
    block_storage::{block_pool::BlockPool, block_tree::BlockTree},
    error::{Error, FatalError},
    state_replication::LedgerBridge,
};
use consensus_types::{
    block::Block, common::Height, hash::HashValue, quorum_cert::QuorumCert, vote_data::BlockInfoLite,
};
use std::sync::Arc;

pub struct BlockStore {
    tree: BlockTree,
    pool: BlockPool,
    ledger: Arc<dyn LedgerBridge>,
    last_committed_block: HashValue,
}

impl BlockStore {
    pub fn new(root: Block, genesis_qc: QuorumCert, ledger: Arc<dyn LedgerBridge>, max_pruned: usize) -> Self {
        let last_committed_block = root.id();
        Self {
            tree: BlockTree::new(root, max_pruned),
            pool: BlockPool::new(genesis_qc),
            ledger,
            last_committed_block,
        }
    }

    pub fn contains_block(&self, id: HashValue) -> bool {
        self.tree.contains(id)
    }

    pub fn get_block(&self, id: HashValue) -> Option<&Block> {
        self.tree.get_block(id)
    }

    pub fn get_blocks_at_height(&self, height: Height) -> Vec<&Block> {
        self.tree.get_blocks_at_height(height)
    }

    pub fn branch_from_root(&self, id: HashValue) -> Option<Vec<&Block>> {
        self.tree.branch_from_root(id)
    }

    pub fn root_id(&self) -> HashValue {
        self.tree.root_id()
    }

    pub fn last_committed_block(&self) -> HashValue {
        self.last_committed_block
    }

    pub fn highest_qc(&self) -> &QuorumCert {
        self.pool.highest_qc()
    }

    pub fn highest_certified_block(&self) -> Option<HashValue> {
        self.pool.highest_certified_block()
    }

    pub fn get_qc(&self, block_id: HashValue) -> Option<&QuorumCert> {
        self.pool.get_qc(block_id)
    }

    pub fn get_commit_level(&self) -> u64 {
        self.ledger.get_commit_level()
    }

    pub fn get_root_height(&self) -> Height {
        self.ledger.get_root_height()
    }

    /// spec.md §4.1/§4.4: inserts the block's own justify QC first (the
    /// QC that certifies its parent) so the parent is already known to
    /// `BlockPool` by the time the block itself lands in the tree, then
    /// inserts the block.
    pub fn insert_block(&mut self, block: Block) -> Result<(), Error> {
        if let Some(justify) = block.data().justify_qc.clone() {
            let block_in_tree = self.tree.contains(
                justify
                    .certified_block_id()
                    .unwrap_or_else(HashValue::zero),
            );
            self.pool.insert_qc(justify, block_in_tree);
        }
        self.tree.insert_block(block)
    }

    /// spec.md §4.1 `InsertQC`: records the certificate, and if it
    /// certifies a block already resident in the tree, runs the
    /// three-chain commit check and prunes/commits as far as it allows.
    /// Returns the block that got committed, if any.
    ///
    /// A ledger write failure here is escalated as [`FatalError`]
    /// (spec.md §7 "PersistenceFailure ... fatal") rather than returned
    /// as an ordinary [`Error`]: the event loop aborts and relies on WAL
    /// replay on restart instead of trying to continue with a store that
    /// may now disagree with the rest of the replica's state.
    pub async fn insert_qc(&mut self, qc: QuorumCert) -> Result<Option<BlockInfoLite>, FatalError> {
        let block_in_tree = qc
            .certified_block_id()
            .map(|id| self.tree.contains(id))
            .unwrap_or(false);
        self.pool.insert_qc(qc.clone(), block_in_tree);
        if !block_in_tree {
            return Ok(None);
        }

        let Some(commit_target) = self.check_three_chain(&qc) else {
            return Ok(None);
        };
        self.commit_to(commit_target.id).await?;
        Ok(Some(commit_target))
    }

    fn check_three_chain(&self, qc: &QuorumCert) -> Option<BlockInfoLite> {
        let block_id = qc.certified_block_id()?;
        let block = self.tree.get_block(block_id)?;
        let parent_qc = block.data().justify_qc.as_ref()?;
        let proposed_info = BlockInfoLite {
            id: block.id(),
            height: block.height(),
            level: block.level(),
            epoch: block.epoch(),
        };
        safety_rules::three_chain_commit(&proposed_info, parent_qc)
    }

    /// Commits every block on root→target (root exclusive, since it is
    /// already committed), in order, then prunes the tree so `target_id`
    /// becomes the new root. spec.md §4.1 `Prune`/§4.8 `CommitBlock`.
    async fn commit_to(&mut self, target_id: HashValue) -> Result<(), FatalError> {
        if target_id == self.tree.root_id() {
            return Ok(());
        }
        let path: Vec<Block> = self
            .tree
            .branch_from_root(target_id)
            .ok_or_else(|| FatalError(anyhow::anyhow!("commit target {target_id:?} not reachable from root")))?
            .into_iter()
            .skip(1)
            .cloned()
            .collect();

        for block in &path {
            let serialized = block
                .signable_bytes()
                .map_err(|e| FatalError(anyhow::anyhow!(e)))?;
            self.ledger
                .commit_block(block.id(), block.height(), serialized)
                .await
                .map_err(FatalError)?;
        }

        let discarded = self
            .tree
            .prune(target_id)
            .map_err(|e| FatalError(anyhow::anyhow!(e)))?;
        self.pool.drop_qcs_for(&discarded);
        self.last_committed_block = target_id;
        Ok(())
    }
}
