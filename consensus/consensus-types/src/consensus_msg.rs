// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    block::Block, common::Height, hash::HashValue, proposal_msg::ProposalMsg,
    quorum_cert::QuorumCert, sync_info::SyncInfo, vote::Vote,
};
use serde::{Deserialize, Serialize};

/// A request to walk backward from `block_id`/`height` toward
/// `target_level`, used by the syncer (spec.md §4.5). Bounded to at most
/// `MaxSyncBlockNum` blocks per response by the responder, not by this
/// type; see `consensus::config::ConsensusConfig::max_sync_block_num`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFetchRequest {
    pub block_id: HashValue,
    pub height: Height,
    pub start_level: u64,
    pub target_level: u64,
    pub num_blocks: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockFetchStatus {
    Succeeded,
    NotEnoughBlocks,
    IdNotFound,
}

/// A `(block, qc)` pair as returned by a fetch response, walked from
/// newest to oldest (the responder follows `PreBlockHash` backward per
/// spec.md §4.5).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFetchResponse {
    pub status: BlockFetchStatus,
    pub blocks: Vec<Block>,
    pub quorum_certs: Vec<QuorumCert>,
}

/// The single typed sum of every inbound/outbound consensus message, per
/// spec.md §9's "callback-driven message dispatch" redesign guidance:
/// one sum type, one `handle(msg)` routine with tagged matches, no
/// virtual dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMsg {
    Proposal(ProposalMsg),
    Vote(Vote),
    BlockFetchRequest(BlockFetchRequest),
    BlockFetchResponse(BlockFetchResponse),
    SyncInfo(SyncInfo),
}

/// spec.md §6 wire format: "all consensus messages are length-prefixed
/// protobufs, containing a signed envelope `{payload_bytes, signer,
/// signature}`". Framing and field-number stability are a transport
/// concern (`consensus::network`); this crate only defines the logical
/// envelope and serializes it with `bcs`, the deterministic encoding the
/// signature is computed over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub payload: ConsensusMsg,
    pub signer: u16,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl SignedEnvelope {
    pub fn signable_bytes(payload: &ConsensusMsg) -> anyhow::Result<Vec<u8>> {
        Ok(bcs::to_bytes(payload)?)
    }
}
