// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §6 "Transport (out)": `BroadcastToValidators(msg)`,
//! `SendToPeer(idx, msg)`, subscribe to inbound consensus messages. The
//! actual peer-to-peer substrate is out of scope (spec.md §1); this
//! module defines the seam and an in-process implementation over tokio
//! channels for the deterministic test harness.

use async_trait::async_trait;
use consensus_types::{common::AuthorIndex, consensus_msg::ConsensusMsg};

#[async_trait]
pub trait NetworkSender: Send + Sync {
    async fn send_to(&self, target: AuthorIndex, msg: ConsensusMsg);
    async fn broadcast(&self, validators: &[AuthorIndex], msg: ConsensusMsg);
}

/// One inbound message plus the index of whoever sent it; the driver
/// checks that index against the message's claimed author (spec.md
/// §4.4 "Authorship": "peer identity matches signer").
#[derive(Debug, Clone)]
pub struct InboundMsg {
    pub sender: AuthorIndex,
    pub msg: ConsensusMsg,
}

/// An in-process fan-out network for the deterministic harness: each
/// replica owns a `tokio::sync::mpsc::Sender<InboundMsg>`, and the
/// sender broadcasts by cloning the message into every peer's channel.
/// This is the crate's own analogue of the teacher's
/// `NetworkPlayground`.
pub struct InProcessNetwork {
    self_author: AuthorIndex,
    peers: Vec<(AuthorIndex, tokio::sync::mpsc::Sender<InboundMsg>)>,
}

impl InProcessNetwork {
    pub fn new(self_author: AuthorIndex, peers: Vec<(AuthorIndex, tokio::sync::mpsc::Sender<InboundMsg>)>) -> Self {
        Self { self_author, peers }
    }
}

#[async_trait]
impl NetworkSender for InProcessNetwork {
    async fn send_to(&self, target: AuthorIndex, msg: ConsensusMsg) {
        if target == self.self_author {
            return self.broadcast_to_self(msg).await;
        }
        if let Some((_, tx)) = self.peers.iter().find(|(a, _)| *a == target) {
            let _ = tx
                .send(InboundMsg {
                    sender: self.self_author,
                    msg,
                })
                .await;
        }
    }

    async fn broadcast(&self, validators: &[AuthorIndex], msg: ConsensusMsg) {
        for author in validators {
            self.send_to(*author, msg.clone()).await;
        }
    }
}

impl InProcessNetwork {
    async fn broadcast_to_self(&self, msg: ConsensusMsg) {
        if let Some((_, tx)) = self.peers.iter().find(|(a, _)| *a == self.self_author) {
            let _ = tx
                .send(InboundMsg {
                    sender: self.self_author,
                    msg,
                })
                .await;
        }
    }
}
