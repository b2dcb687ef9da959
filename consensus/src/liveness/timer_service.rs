// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.3/§4.6 "TimerService": "AddEvent(level, kind, duration)
//! schedules a timeout; a later call for the same (level, kind)
//! supersedes any earlier one still pending, which resolves to `None`
//! instead of firing." Three kinds matter to the driver:
//! `ProposalBlockTimeout` (leader hasn't proposed), `VoteTimeout` (not
//! enough votes arrived) and `LevelTimeout` (the level as a whole is
//! given up on, triggering the pacemaker).

use crate::time_service::TimeService;
use consensus_types::common::Level;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TimeoutKind {
    ProposalBlockTimeout,
    VoteTimeout,
    LevelTimeout,
}

/// Tracks one monotonically increasing generation counter per (level,
/// kind) so a superseded timer can tell it no longer matters once its
/// sleep resolves.
#[derive(Default)]
pub struct TimerService {
    time: Option<Arc<dyn TimeService>>,
    generations: Arc<Mutex<HashMap<(Level, TimeoutKind), u64>>>,
}

impl TimerService {
    pub fn new(time: Arc<dyn TimeService>) -> Self {
        Self {
            time: Some(time),
            generations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedules `kind` to fire at `level` after `duration`. The
    /// returned future resolves to `Some((level, kind))` if no later
    /// call for the same key arrived before the sleep elapsed, else
    /// `None` -- callers `select!` over several of these and ignore the
    /// `None` arm.
    pub fn add_event(
        &self,
        level: Level,
        kind: TimeoutKind,
        duration: Duration,
    ) -> impl std::future::Future<Output = Option<(Level, TimeoutKind)>> + Send + 'static {
        let my_generation = {
            let mut generations = self.generations.lock().unwrap();
            let slot = generations.entry((level, kind)).or_insert(0);
            *slot += 1;
            *slot
        };
        let generations = self.generations.clone();
        let time = self.time.clone().expect("TimerService::new always sets time");
        async move {
            time.sleep(duration).await;
            let generations = generations.lock().unwrap();
            if generations.get(&(level, kind)).copied() == Some(my_generation) {
                Some((level, kind))
            } else {
                None
            }
        }
    }

    /// spec.md §4.2 `OnBlockSealed`-style cleanup: drops generation
    /// bookkeeping for levels that can never time out again, since the
    /// chain has moved past them.
    pub fn cancel_below(&self, level: Level) {
        self.generations.lock().unwrap().retain(|(l, _), _| *l >= level);
    }
}
