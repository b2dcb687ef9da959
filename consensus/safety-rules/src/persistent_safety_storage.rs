// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::error::Error;
use consensus_types::common::{EpochId, Level};
use std::sync::Mutex;

/// Durable storage for the safety-critical fields of `SMRState`. A
/// production deployment backs this with the same WAL the consensus
/// crate uses for message replay (spec.md §4.7); tests use
/// [`InMemoryStorage`]. Mirrors the teacher's
/// `PersistentSafetyStorage`/secure-storage split, minus the pluggable
/// backend registry (out of scope: spec.md treats the ledger/storage
/// fan-out as an external collaborator, §1).
pub trait PersistentSafetyStorage: Send + Sync {
    fn epoch(&self) -> Result<EpochId, Error>;
    fn set_epoch(&self, epoch: EpochId) -> Result<(), Error>;

    fn last_voted_level(&self) -> Result<Level, Error>;
    fn set_last_voted_level(&self, level: Level) -> Result<(), Error>;

    fn locked_level(&self) -> Result<Level, Error>;
    fn set_locked_level(&self, level: Level) -> Result<(), Error>;
}

#[derive(Debug, Default)]
struct State {
    epoch: EpochId,
    last_voted_level: Level,
    locked_level: Level,
}

/// In-memory storage for tests and single-process demos.
#[derive(Debug, Default)]
pub struct InMemoryStorage(Mutex<State>);

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentSafetyStorage for InMemoryStorage {
    fn epoch(&self) -> Result<EpochId, Error> {
        Ok(self.0.lock().unwrap().epoch)
    }

    fn set_epoch(&self, epoch: EpochId) -> Result<(), Error> {
        self.0.lock().unwrap().epoch = epoch;
        Ok(())
    }

    fn last_voted_level(&self) -> Result<Level, Error> {
        Ok(self.0.lock().unwrap().last_voted_level)
    }

    fn set_last_voted_level(&self, level: Level) -> Result<(), Error> {
        self.0.lock().unwrap().last_voted_level = level;
        Ok(())
    }

    fn locked_level(&self) -> Result<Level, Error> {
        Ok(self.0.lock().unwrap().locked_level)
    }

    fn set_locked_level(&self, level: Level) -> Result<(), Error> {
        self.0.lock().unwrap().locked_level = level;
        Ok(())
    }
}
