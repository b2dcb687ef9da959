// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared constructors for the `consensus` crate's tests, mirroring the
//! `block_test_utils` module the teacher threads through its own test
//! suite (`consensus/src/test_utils`).

use crate::{
    block::Block,
    block_data::BlockData,
    common::{AuthorIndex, EpochId, Height, Level, Payload},
    quorum_cert::{EndorsementInfo, QuorumCert},
    vote_data::{BlockInfoLite, VoteData},
};

pub fn certificate_for_genesis(epoch: EpochId) -> QuorumCert {
    QuorumCert::certificate_for_genesis(epoch)
}

/// Builds an unsigned test block extending `parent` at `level`, with a
/// QC that (possibly vacuously) certifies the parent.
pub fn test_block(
    parent: &Block,
    level: Level,
    proposer: AuthorIndex,
    parent_qc: QuorumCert,
) -> Block {
    let data = BlockData::new_proposal(
        parent.height() + 1,
        level,
        parent.epoch(),
        proposer,
        Payload::empty(),
        None,
        parent_qc,
    );
    Block::new(data, vec![1, 2, 3]).expect("test block serializes")
}

pub fn block_info_lite(block: &Block) -> BlockInfoLite {
    BlockInfoLite {
        id: block.id(),
        height: block.height(),
        level: block.level(),
        epoch: block.epoch(),
    }
}

/// A QC over `block`, "signed" by `authors`. Each endorsement carries
/// the author's index as its signature bytes rather than a real
/// cryptographic signature over the QC's content, matching the harness
/// convention `consensus::test_utils::HarnessCrypto` verifies against
/// (and accepted unconditionally by any test using `NoopCrypto`), so
/// this is usable both where a test only needs a syntactically valid
/// quorum and where production code now checks each endorsement's
/// signature before trusting the QC.
pub fn quorum_cert_for_block(block: &Block, parent: &Block, authors: &[AuthorIndex]) -> QuorumCert {
    let endorsements = authors
        .iter()
        .map(|&author| EndorsementInfo {
            author,
            signature: author.to_le_bytes().to_vec(),
        })
        .collect();
    QuorumCert::new_qc(
        block.id(),
        block.height(),
        block.level(),
        block.epoch(),
        block_info_lite(parent),
        endorsements,
    )
}

pub fn vote_data_for(block: &Block, parent: &Block) -> VoteData {
    VoteData::new(block_info_lite(block), block_info_lite(parent))
}

pub fn height_matches(qc: &QuorumCert, expected: Height) -> bool {
    qc.height() == expected
}
