// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.3 "Pacemaker": "currentLevel only ever advances, to
//! max(currentLevel, highestQC.level+1, highestTC.level+1); a local
//! timeout at level l schedules the next level's timeout at
//! base*2^min(consecutiveTimeouts, MaxRound), resetting the backoff the
//! next time a QC or TC actually advances the level."

use crate::config::ConsensusConfig;
use consensus_types::common::Level;
use std::time::Duration;

pub struct Pacemaker {
    current_level: Level,
    base_timeout: Duration,
    max_backoff_exponent: u32,
    consecutive_timeouts: u32,
}

impl Pacemaker {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            current_level: 0,
            base_timeout: config.base_level_timeout,
            max_backoff_exponent: config.max_round_timeout_backoff,
            consecutive_timeouts: 0,
        }
    }

    pub fn current_level(&self) -> Level {
        self.current_level
    }

    /// The duration a level-timeout armed *right now* for
    /// `current_level` should carry, without recording a new timeout
    /// (unlike [`Pacemaker::record_local_timeout`], which both advances
    /// the level and bumps the backoff). Lets the driver (re-)arm the
    /// timer for the level it just advanced into.
    pub fn timeout_duration(&self) -> Duration {
        let exponent = self.consecutive_timeouts.min(self.max_backoff_exponent);
        self.base_timeout * 2u32.saturating_pow(exponent)
    }

    /// spec.md §4.3: observing a QC or TC at `level` advances
    /// `currentLevel` to at least `level + 1` and, since it represents
    /// forward progress, resets the exponential backoff. Returns
    /// whether the level actually advanced.
    pub fn advance_to_certificate(&mut self, level: Level) -> bool {
        let target = level + 1;
        if target > self.current_level {
            self.current_level = target;
            self.consecutive_timeouts = 0;
            true
        } else {
            false
        }
    }

    /// spec.md §4.3: a local timeout at the current level bumps
    /// `currentLevel` by one (liveness must still make progress even
    /// without a certificate) and returns the next timeout's duration,
    /// doubling with every consecutive timeout up to `MaxRound`.
    pub fn record_local_timeout(&mut self) -> Duration {
        self.current_level += 1;
        self.consecutive_timeouts = self.consecutive_timeouts.saturating_add(1);
        let exponent = self.consecutive_timeouts.min(self.max_backoff_exponent);
        self.base_timeout * 2u32.saturating_pow(exponent)
    }
}
