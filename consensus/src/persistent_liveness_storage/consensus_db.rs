// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.7 "On crash, on startup the driver replays WAL from last
//! snapshot". This module turns a replayed WAL tail into the structures
//! the driver needs to resume: the pending block/QC tree, the last vote
//! cast, and (via `detect_lag`) which of the four commit stores fell
//! behind if the process died mid fan-out.

use crate::{
    persistent_liveness_storage::wal::{Wal, WalEntry},
    state_replication::StoreSet,
};
use consensus_types::{block::Block, common::Height, hash::HashValue, quorum_cert::QuorumCert, vote::Vote};
use std::collections::HashMap;

/// Everything recovered from the WAL tail plus the durable ledger's
/// last committed height: the pending blocks and QCs a `BlockStore`
/// needs rebuilt, and the last vote this replica cast (so `SafetyRules`
/// doesn't need to re-derive it).
pub struct RecoveryData {
    pub root_height: Height,
    pub last_vote: Option<Vote>,
    pub pending_blocks: Vec<Block>,
    pub pending_qcs: Vec<QuorumCert>,
}

/// spec.md §4.7: replay is keyed by height; everything at or below the
/// ledger's already-durable root height was already committed before
/// the crash and is dropped rather than reapplied.
pub fn recover_from_wal(wal: &Wal, root_height: Height) -> Result<RecoveryData, super::wal::WalError> {
    let entries = wal.replay()?;
    let mut blocks_by_id: HashMap<HashValue, Block> = HashMap::new();
    let mut qcs = Vec::new();
    let mut last_vote = None;

    for entry in entries {
        if entry.height() <= root_height {
            continue;
        }
        match entry {
            WalEntry::NewBlockRecord { block, .. } => {
                blocks_by_id.insert(block.id(), block);
            }
            WalEntry::InboundMessage { envelope, .. } => match envelope.payload {
                consensus_types::consensus_msg::ConsensusMsg::Vote(vote) => {
                    last_vote = Some(vote);
                }
                consensus_types::consensus_msg::ConsensusMsg::Proposal(proposal) => {
                    if let Some(qc) = proposal.block.data().justify_qc.clone() {
                        qcs.push(qc);
                    }
                    blocks_by_id.insert(proposal.block.id(), proposal.block);
                }
                _ => {}
            },
            WalEntry::CommitMarker { .. } => {}
        }
    }

    Ok(RecoveryData {
        root_height,
        last_vote,
        pending_blocks: blocks_by_id.into_values().collect(),
        pending_qcs: qcs,
    })
}

/// spec.md §6 "GetLastSavepoint ... used by recovery to detect lag":
/// the root height safe to resume execution from is the minimum
/// savepoint across every enabled store, since a crash could have left
/// one store durably ahead of another after only part of a fan-out
/// commit landed.
pub fn detect_lag(stores: &StoreSet) -> Height {
    let mut min_height = stores.block.get_last_savepoint();
    min_height = min_height.min(stores.state.get_last_savepoint());
    if let Some(history) = &stores.history {
        min_height = min_height.min(history.get_last_savepoint());
    }
    if let Some(result) = &stores.result {
        min_height = min_height.min(result.get_last_savepoint());
    }
    min_height
}
