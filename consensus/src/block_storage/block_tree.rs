// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.1 `BlockTree`: "Parent-linked tree of proposed blocks,
//! pruned at committed root." spec.md §9 re-architecture guidance:
//! "adjacency list with child-vectors owned by parents; lookups via a
//! hash -> node-index map; no back-pointers other than parent hash.
//! Pruning walks the map, no cycle handling required (tree by
//! construction)."

use crate::error::Error;
use consensus_types::{block::Block, common::Height, hash::HashValue};
use std::collections::{HashMap, VecDeque};

struct Node {
    block: Block,
    children: Vec<HashValue>,
}

/// Parent-linked tree of uncommitted blocks. The root is always the
/// last block committed by *this* replica (spec.md §3 BlockTree:
/// "root is the last committed block"); everything below the root has
/// already been pruned away.
pub struct BlockTree {
    nodes: HashMap<HashValue, Node>,
    root: HashValue,
    /// Bounds memory kept for already-pruned ids so a late duplicate
    /// insert/prune can still be recognized as "already gone" rather
    /// than "unknown" (spec.md §3 "a max-pruned-size cap bounds
    /// memory").
    pruned_ids: VecDeque<HashValue>,
    max_pruned: usize,
}

impl BlockTree {
    pub fn new(root: Block, max_pruned: usize) -> Self {
        let root_id = root.id();
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id,
            Node {
                block: root,
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            root: root_id,
            pruned_ids: VecDeque::new(),
            max_pruned,
        }
    }

    pub fn root_id(&self) -> HashValue {
        self.root
    }

    pub fn root(&self) -> &Block {
        &self.nodes[&self.root].block
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: HashValue) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get_block(&self, id: HashValue) -> Option<&Block> {
        self.nodes.get(&id).map(|n| &n.block)
    }

    /// spec.md §4.1: "InsertBlock(b) requires b.parentHash to exist
    /// (else fail with OrphanBlock); idempotent on duplicate hash."
    pub fn insert_block(&mut self, block: Block) -> Result<(), Error> {
        let id = block.id();
        if self.nodes.contains_key(&id) || self.pruned_ids.contains(&id) {
            return Ok(());
        }
        let parent_id = block.parent_id();
        if !self.nodes.contains_key(&parent_id) {
            return Err(Error::OrphanBlock(format!("{parent_id:?}")));
        }
        self.nodes
            .get_mut(&parent_id)
            .expect("parent checked present above")
            .children
            .push(id);
        self.nodes.insert(id, Node {
            block,
            children: Vec::new(),
        });
        Ok(())
    }

    /// spec.md §4.1 `GetBlocks(h)`: "returns all blocks at height h
    /// (forks allowed within the uncommitted window)."
    pub fn get_blocks_at_height(&self, height: Height) -> Vec<&Block> {
        self.nodes
            .values()
            .map(|n| &n.block)
            .filter(|b| b.height() == height)
            .collect()
    }

    /// spec.md §4.1 `BranchFromRoot(b)`: "returns the path root→b, used
    /// by commit."
    pub fn branch_from_root(&self, id: HashValue) -> Option<Vec<&Block>> {
        let mut path = Vec::new();
        let mut current = id;
        loop {
            let node = self.nodes.get(&current)?;
            path.push(&node.block);
            if current == self.root {
                break;
            }
            current = node.block.parent_id();
        }
        path.reverse();
        Some(path)
    }

    /// spec.md §4.1 `Prune(newRootId)`: "discards all nodes not on the
    /// newRoot subtree, drops their QCs, and sets newRoot as the tree
    /// root; fails with UnknownRoot if newRootId absent." QC dropping is
    /// the caller's job (`BlockPool::prune_for`) since this type owns no
    /// QCs; spec.md §4.1 "testable property #7": "after Prune(r), every
    /// block remaining in the tree lies on the subtree rooted at r."
    pub fn prune(&mut self, new_root_id: HashValue) -> Result<Vec<HashValue>, Error> {
        if !self.nodes.contains_key(&new_root_id) {
            return Err(Error::UnknownRoot(format!("{new_root_id:?}")));
        }

        let mut keep = std::collections::HashSet::new();
        let mut frontier = vec![new_root_id];
        while let Some(id) = frontier.pop() {
            if keep.insert(id) {
                if let Some(node) = self.nodes.get(&id) {
                    frontier.extend(node.children.iter().copied());
                }
            }
        }

        let discarded: Vec<HashValue> = self
            .nodes
            .keys()
            .copied()
            .filter(|id| !keep.contains(id))
            .collect();
        for id in &discarded {
            self.nodes.remove(id);
            self.pruned_ids.push_back(*id);
        }
        while self.pruned_ids.len() > self.max_pruned {
            self.pruned_ids.pop_front();
        }

        self.root = new_root_id;
        Ok(discarded)
    }
}


/// spec.md §8 testable property #7: "after `Prune(r)`, every block
/// remaining in the tree lies on the subtree rooted at r, and every
/// block off that subtree is gone."
#[cfg(test)]
mod pruning_soundness_proptests {
    use super::*;
    use consensus_types::test_utils as ctu;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn is_descendant(mut id: HashValue, target: HashValue, parent_of: &HashMap<HashValue, HashValue>) -> bool {
        loop {
            if id == target {
                return true;
            }
            let Some(&parent) = parent_of.get(&id) else {
                return false;
            };
            if parent == id {
                return false;
            }
            id = parent;
        }
    }

    proptest! {
        #[test]
        fn prune_keeps_exactly_the_subtree_rooted_at_the_new_root(
            parent_choices in prop::collection::vec(0usize..8, 1..16),
            prune_choice in 0usize..8,
        ) {
            let genesis_block = Block::genesis(0);
            let genesis_id = genesis_block.id();
            let mut tree = BlockTree::new(genesis_block.clone(), 256);
            let mut parent_of: HashMap<HashValue, HashValue> = HashMap::new();
            parent_of.insert(genesis_id, genesis_id);
            let mut blocks = vec![genesis_block];

            for (i, raw_parent) in parent_choices.iter().enumerate() {
                let parent = blocks[raw_parent % blocks.len()].clone();
                let qc = ctu::quorum_cert_for_block(&parent, &parent, &[0]);
                let level = parent.level() + 1 + i as u64;
                let child = ctu::test_block(&parent, level, 0, qc);
                tree.insert_block(child.clone()).unwrap();
                parent_of.insert(child.id(), parent.id());
                blocks.push(child);
            }

            let target = blocks[prune_choice % blocks.len()].clone();
            let before: Vec<HashValue> = blocks.iter().map(|b| b.id()).collect();
            let discarded = tree.prune(target.id()).unwrap();

            prop_assert_eq!(tree.root_id(), target.id());
            for id in &before {
                let should_remain = is_descendant(*id, target.id(), &parent_of);
                prop_assert_eq!(tree.contains(*id), should_remain, "block {:?} kept-state disagrees with ancestry", id);
            }
            for id in &discarded {
                prop_assert!(!tree.contains(*id));
                prop_assert!(!is_descendant(*id, target.id(), &parent_of));
            }
        }
    }
}
