// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! Voting-safety and three-chain commit rules, isolated from the rest of
//! the consensus core so the "ownership of the consensus private key"
//! and the pure decision rules of spec.md §4.3 stay auditable in one
//! small crate, as the teacher does with its own `safety-rules` crate.

pub mod consensus_state;
pub mod error;
pub mod persistent_safety_storage;
pub mod safety_rules;
pub mod t_safety_rules;

pub use consensus_state::ConsensusState;
pub use error::Error;
pub use safety_rules::SafetyRules;
pub use t_safety_rules::{three_chain_commit, vote_data_for, TSafetyRules};
