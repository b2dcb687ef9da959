// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.3 "Liveness": the pacemaker that drives level advancement
//! and exponential timeout backoff, the timer service that schedules
//! and supersedes its timeouts, and proposer election (round-robin over
//! the epoch's validator set).

pub mod pacemaker;
pub mod proposer_election;
pub mod timer_service;

pub use pacemaker::Pacemaker;
pub use proposer_election::ProposerElection;
pub use timer_service::{TimeoutKind, TimerService};
