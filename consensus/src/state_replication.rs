// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §6 "Ledger / ChainStore (in/out)" and §4.8 "ChainStore &
//! Ledger Bridge": the durable commit path. spec.md §9 re-architecture
//! guidance: "Interface-of-interfaces polymorphism for storage backends
//! -> a trait/interface `KVStore` implemented by each backend ...; the
//! store composition (block/state/history/result) is a fixed record of
//! four such handles, not a dynamic registry."

use async_trait::async_trait;
use consensus_types::{common::Height, hash::HashValue};
use std::{collections::HashMap, sync::Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store write failed: {0}")]
    Write(String),
}

/// One backend (block/state/history/result). Deliberately minimal: the
/// actual schema each store keeps (transactions, state tree nodes,
/// history index, execution results) is the execution engine's concern
/// (spec.md §1 non-goals); consensus only needs to know whether a write
/// succeeded and how far a store has replayed.
#[async_trait]
pub trait KVStore: Send + Sync {
    async fn put(&self, key: HashValue, value: Vec<u8>) -> Result<(), StoreError>;
    async fn get(&self, key: &HashValue) -> Option<Vec<u8>>;
    /// spec.md §6 "GetLastSavepoint returning the highest committed
    /// height known to it, used by recovery to detect lag."
    fn get_last_savepoint(&self) -> Height;
}

/// The fixed four-store record (spec.md §4.8): block, state, history,
/// result. Every commit fans out to all four concurrently; any failure
/// aborts the whole commit (spec.md §4.8 "any sub-store failure aborts
/// the commit and triggers recovery on next start via WAL tail").
pub struct StoreSet {
    pub block: Box<dyn KVStore>,
    pub state: Box<dyn KVStore>,
    pub history: Option<Box<dyn KVStore>>,
    pub result: Option<Box<dyn KVStore>>,
}

impl StoreSet {
    /// `disable_history_db`/`disable_result_db` (spec.md §6
    /// `StorageConfig`) drop those two stores from the fan-out entirely
    /// rather than making them no-ops, so a disabled store can never
    /// silently "succeed".
    pub async fn commit(&self, key: HashValue, value: Vec<u8>) -> Result<(), StoreError> {
        let mut futures: Vec<std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), StoreError>> + Send + '_>>> =
            vec![
                Box::pin(self.block.put(key, value.clone())),
                Box::pin(self.state.put(key, value.clone())),
            ];
        if let Some(history) = &self.history {
            futures.push(Box::pin(history.put(key, value.clone())));
        }
        if let Some(result) = &self.result {
            futures.push(Box::pin(result.put(key, value)));
        }
        futures::future::try_join_all(futures).await?;
        Ok(())
    }

    pub fn root_savepoint(&self) -> Height {
        self.block.get_last_savepoint()
    }
}

/// In-memory `KVStore`, used by tests and by `LedgerBridge`'s in-memory
/// default.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: Mutex<HashMap<HashValue, Vec<u8>>>,
    savepoint: Mutex<Height>,
}

#[async_trait]
impl KVStore for InMemoryKVStore {
    async fn put(&self, key: HashValue, value: Vec<u8>) -> Result<(), StoreError> {
        self.data.lock().unwrap().insert(key, value);
        Ok(())
    }

    async fn get(&self, key: &HashValue) -> Option<Vec<u8>> {
        self.data.lock().unwrap().get(key).cloned()
    }

    fn get_last_savepoint(&self) -> Height {
        *self.savepoint.lock().unwrap()
    }
}

impl InMemoryKVStore {
    pub fn advance_savepoint(&self, height: Height) {
        let mut sp = self.savepoint.lock().unwrap();
        if height > *sp {
            *sp = height;
        }
    }
}

/// spec.md §4.8: "Accepts InsertBlock (pending) and CommitBlock
/// (final)." The pending path lives in `block_storage::BlockStore`
/// (in-memory); this trait is only the durable commit.
#[async_trait]
pub trait LedgerBridge: Send + Sync {
    async fn commit_block(&self, block_id: HashValue, height: Height, serialized: Vec<u8>) -> anyhow::Result<()>;
    fn get_commit_level(&self) -> u64;
    fn get_root_height(&self) -> Height;
}

pub struct FourStoreLedgerBridge {
    stores: StoreSet,
    commit_level: Mutex<u64>,
    root_height: Mutex<Height>,
}

impl FourStoreLedgerBridge {
    pub fn new(stores: StoreSet) -> Self {
        Self {
            stores,
            commit_level: Mutex::new(0),
            root_height: Mutex::new(0),
        }
    }
}

#[async_trait]
impl LedgerBridge for FourStoreLedgerBridge {
    async fn commit_block(&self, block_id: HashValue, height: Height, serialized: Vec<u8>) -> anyhow::Result<()> {
        self.stores
            .commit(block_id, serialized)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        *self.root_height.lock().unwrap() = height;
        *self.commit_level.lock().unwrap() += 1;
        Ok(())
    }

    fn get_commit_level(&self) -> u64 {
        *self.commit_level.lock().unwrap()
    }

    fn get_root_height(&self) -> Height {
        *self.root_height.lock().unwrap()
    }
}
