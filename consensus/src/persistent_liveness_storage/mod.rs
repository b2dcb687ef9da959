// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.7 "WAL & Recovery": the durable write-ahead log and the
//! recovery-data reconstruction it feeds on restart.

pub mod consensus_db;
pub mod wal;

pub use consensus_db::{detect_lag, recover_from_wal, RecoveryData};
pub use wal::{Wal, WalEntry, WalError};
