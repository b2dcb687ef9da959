// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;

/// A 32-byte content hash, used for block ids and payload digests.
///
/// The crate never hashes with a raw `Sha3_256` call site by site; all
/// hashing funnels through [`HashValue::from_sha3`] so the digest
/// algorithm can be swapped per `ChainConfig::crypto.hash` in one place.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HashValue(#[serde(with = "serde_bytes")] [u8; HashValue::LENGTH]);

impl HashValue {
    pub const LENGTH: usize = 32;

    pub const fn zero() -> Self {
        Self([0u8; Self::LENGTH])
    }

    pub fn new(bytes: [u8; Self::LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }

    pub fn from_sha3(data: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; Self::LENGTH];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Hash of an arbitrary bcs-serializable value, used to derive block
    /// and payload ids.
    pub fn from_serializable<T: serde::Serialize>(value: &T) -> anyhow::Result<Self> {
        let bytes = bcs::to_bytes(value)?;
        Ok(Self::from_sha3(&bytes))
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Debug for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashValue({})", hex::encode(self.0))
    }
}

impl Default for HashValue {
    fn default() -> Self {
        Self::zero()
    }
}
