// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! The chained-BFT consensus core: a leader-rotating, pipelined,
//! three-chain BFT state machine replica. See `SPEC_FULL.md` at the
//! workspace root for the full module map; this crate mirrors the
//! teacher's `consensus` crate layout (`block_storage`, `liveness`,
//! `persistent_liveness_storage`, `epoch_manager`, `round_manager`).

pub mod block_storage;
pub mod block_verifier;
pub mod config;
pub mod crypto;
pub mod epoch_manager;
pub mod error;
pub mod liveness;
pub mod msg_pool;
pub mod network;
pub mod persistent_liveness_storage;
pub mod round_manager;
pub mod state_replication;
pub mod time_service;

#[cfg(any(test, feature = "fuzzing"))]
pub mod test_utils;
