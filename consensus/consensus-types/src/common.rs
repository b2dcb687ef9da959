// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a validator within the current epoch's ordered validator
/// list. Leader schedule and endorsement bookkeeping are keyed by this,
/// never by a raw network identity, so that they stay stable across
/// transport implementations.
pub type AuthorIndex = u16;

/// A monotonically increasing ledger height. Height = parent.height + 1;
/// see spec.md §3 Block invariant.
pub type Height = u64;

/// A logical round. Multiple levels can map to the same height under
/// timeout (spec.md GLOSSARY).
pub type Level = u64;

/// Epoch identifier; a contiguous range of heights sharing one validator
/// set (spec.md §3 Epoch).
pub type EpochId = u64;

/// Opaque transaction payload. The consensus core treats a block's
/// payload as an uninterpreted byte blob: ordering, execution and state
/// root computation live in the VM/execution collaborator (spec.md §1
/// non-goals), so `Payload` only needs to be cheaply hashable and
/// serializable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl Payload {
    pub fn empty() -> Self {
        Self(Vec::new())
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({} bytes)", self.0.len())
    }
}
