// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §6 "Crypto provider (in)": `VerifyConsensusMsgSignature`,
//! `Sign`. Out of scope for the consensus core proper (spec.md §1), but
//! a default implementation is provided for tests and single-process
//! demos, per `SPEC_FULL.md` §6.

use consensus_types::common::AuthorIndex;
use ed25519_dalek::{Keypair, PublicKey, Signature, Signer, Verifier};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unknown signer {0}")]
    UnknownSigner(AuthorIndex),
    #[error("malformed signature")]
    MalformedSignature,
    #[error("signature verification failed for author {0}")]
    VerificationFailed(AuthorIndex),
}

/// The crypto provider's public surface (spec.md §6). A production
/// deployment plugs in whatever signature scheme its `ChainConfig`
/// selects; the consensus core only ever calls through this trait.
pub trait CryptoProvider: Send + Sync {
    fn verify(&self, author: AuthorIndex, message: &[u8], signature: &[u8]) -> Result<(), CryptoError>;
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn self_author(&self) -> AuthorIndex;
}

/// Default ed25519 implementation: one keypair per replica, a shared
/// table of peer public keys. Sufficient for the deterministic harness
/// in `test_utils`; real deployments are expected to bring their own
/// (spec.md §1 "out of scope ... signature primitives").
pub struct Ed25519CryptoProvider {
    self_author: AuthorIndex,
    keypair: Keypair,
    peers: HashMap<AuthorIndex, PublicKey>,
}

impl Ed25519CryptoProvider {
    pub fn new(self_author: AuthorIndex, keypair: Keypair, peers: HashMap<AuthorIndex, PublicKey>) -> Self {
        Self {
            self_author,
            keypair,
            peers,
        }
    }
}

impl CryptoProvider for Ed25519CryptoProvider {
    fn verify(&self, author: AuthorIndex, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let key = self
            .peers
            .get(&author)
            .ok_or(CryptoError::UnknownSigner(author))?;
        let sig = Signature::from_bytes(signature).map_err(|_| CryptoError::MalformedSignature)?;
        key.verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed(author))
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.keypair.sign(message).to_bytes().to_vec())
    }

    fn self_author(&self) -> AuthorIndex {
        self.self_author
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    // ed25519-dalek 1.0.1's `Keypair::generate` is bound to rand_core
    // 0.5's `RngCore`/`CryptoRng`; `rand` 0.8's own `OsRng` implements
    // the newer rand_core 0.6 traits and won't satisfy that bound, so
    // this test seeds from rand_core 0.5's `OsRng` directly.
    use rand_core::OsRng;

    #[test]
    fn sign_then_verify_round_trips() {
        let mut csprng = OsRng;
        let keypair = Keypair::generate(&mut csprng);
        let public = keypair.public;
        let mut peers = HashMap::new();
        peers.insert(0, public);
        let provider = Ed25519CryptoProvider::new(0, keypair, peers);

        let message = b"hello consensus";
        let sig = provider.sign(message).unwrap();
        provider.verify(0, message, &sig).unwrap();

        let mut tampered = sig.clone();
        tampered[0] ^= 0xFF;
        assert!(provider.verify(0, message, &tampered).is_err());
    }
}
