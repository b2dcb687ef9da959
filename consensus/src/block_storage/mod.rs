// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.1 "BlockTree / BlockPool": the in-memory block/QC tree,
//! its coupling to the durable ledger (`ChainStore`), and the syncer
//! that fills gaps in it.

pub mod block_pool;
pub mod block_store;
pub mod block_tree;
pub mod sync_manager;

pub use block_store::BlockStore;
