// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.5 "Syncer": "walks backward from a lagging block toward a
//! known level in bounded chunks, requesting at most `MaxSyncBlockNum`
//! blocks per round trip, giving up after `MaxSyncAttempts`." Request/
//! response correlation is the network layer's job (spec.md §6
//! Transport); this module only decides what to ask for and what to do
//! with what comes back.

use crate::{config::ConsensusConfig, error::Error};
use async_trait::async_trait;
use consensus_types::{
    common::{AuthorIndex, Height},
    consensus_msg::{BlockFetchRequest, BlockFetchResponse, BlockFetchStatus},
    hash::HashValue,
    validator_verifier::ValidatorVerifier,
};

use super::block_store::BlockStore;

/// The request/response half of `NetworkSender` this module needs:
/// send one `BlockFetchRequest` to `peer` and await its matching
/// `BlockFetchResponse`. Kept separate from `NetworkSender` (which is
/// fire-and-forget) since the transport has to correlate a reply to a
/// specific outstanding request, a concern this crate leaves to the
/// network layer.
#[async_trait]
pub trait BlockFetcher: Send + Sync {
    async fn fetch(&self, peer: AuthorIndex, request: BlockFetchRequest) -> Result<BlockFetchResponse, Error>;
}

pub struct SyncManager {
    max_sync_block_num: u64,
    max_sync_attempts: u32,
}

impl SyncManager {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            max_sync_block_num: config.max_sync_block_num,
            max_sync_attempts: config.max_sync_attempts,
        }
    }

    /// Walks backward from `(block_id, height)` toward `start_level`,
    /// inserting every `(block, qc)` pair it receives into `store` as it
    /// goes, oldest first so parents are always resident before their
    /// children. Returns once `block_id` itself is present in `store`;
    /// fails with `Error::SyncIncomplete` if the peer doesn't recognize
    /// the chain or `MaxSyncAttempts` round trips aren't enough to close
    /// the gap (spec.md §4.4 "messages depending on unfetched
    /// predecessors are rejected as sync-incomplete, not buffered").
    ///
    /// Every fetched QC is checked against `verifier`/`check_signature`
    /// before it's trusted enough to insert: a sync peer is just another
    /// untrusted message source, and without this a single bad or
    /// malicious peer could feed the replica a fabricated chain during
    /// catch-up. The synced chain is assumed to stay within the epoch
    /// `verifier` belongs to; an epoch switch inside the gap being
    /// synced is out of scope here the same way it already was before
    /// this check existed.
    pub async fn sync_to_block(
        &self,
        store: &mut BlockStore,
        fetcher: &dyn BlockFetcher,
        verifier: &ValidatorVerifier,
        check_signature: &dyn Fn(AuthorIndex, &[u8], &[u8]) -> bool,
        peer: AuthorIndex,
        block_id: HashValue,
        height: Height,
        start_level: u64,
    ) -> Result<(), Error> {
        if store.contains_block(block_id) {
            return Ok(());
        }

        let mut frontier_id = block_id;
        let mut frontier_height = height;

        for attempt in 0..self.max_sync_attempts {
            let request = BlockFetchRequest {
                block_id: frontier_id,
                height: frontier_height,
                start_level,
                target_level: 0,
                num_blocks: self.max_sync_block_num,
            };
            let response = fetcher.fetch(peer, request).await?;

            match response.status {
                BlockFetchStatus::IdNotFound => {
                    return Err(Error::SyncIncomplete(format!(
                        "peer {peer} does not recognize block {frontier_id:?}"
                    )));
                }
                BlockFetchStatus::Succeeded | BlockFetchStatus::NotEnoughBlocks => {}
            }

            if response.blocks.is_empty() {
                return Err(Error::SyncIncomplete(format!(
                    "empty fetch response from peer {peer} on attempt {attempt}"
                )));
            }

            // The responder walks newest -> oldest (spec.md §4.5); we
            // insert in the reverse order so every parent lands before
            // its child.
            for (block, qc) in response
                .blocks
                .iter()
                .zip(response.quorum_certs.iter())
                .rev()
            {
                qc.verify_endorsements(verifier, |author, message, signature| check_signature(author, message, signature))?;
                store.insert_block(block.clone())?;
                store
                    .insert_qc(qc.clone())
                    .await
                    .map_err(|e| Error::MissingData(e.to_string()))?;
            }

            if store.contains_block(block_id) {
                return Ok(());
            }

            let oldest = response.blocks.last().expect("checked non-empty above");
            if oldest.level() <= start_level || oldest.is_genesis() {
                return Err(Error::SyncIncomplete(format!(
                    "reached level {} without recovering block {block_id:?}",
                    oldest.level()
                )));
            }
            frontier_id = oldest.parent_id();
            frontier_height = oldest.height().saturating_sub(1);
        }

        Err(Error::SyncIncomplete(format!(
            "exhausted {} sync attempts before recovering block {block_id:?}",
            self.max_sync_attempts
        )))
    }
}
