// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.4 "ConsensusDriver": the event loop binding SMR, BlockPool,
//! MsgPool and ChainStore. Owns nothing about the network transport or
//! timer wheel beyond the seams those modules define; this is where
//! their outputs get stitched into the validation pipeline ("Structural
//! → Authorship → Signature → justifyQC/block verification, in that
//! order") and the propose/vote/commit/timeout side effects that follow
//! a message being accepted.

use crate::{
    block_storage::{
        sync_manager::{BlockFetcher, SyncManager},
        BlockStore,
    },
    block_verifier::{BlockVerifier, VerifyMode},
    config::ConsensusConfig,
    crypto::{CryptoError, CryptoProvider},
    epoch_manager::{DeterministicElection, EpochManager},
    error::{Error, FatalError},
    liveness::{pacemaker::Pacemaker, proposer_election::ProposerElection, timer_service::TimeoutKind, TimerService},
    msg_pool::{MsgPool, QuorumOutcome},
    network::{InboundMsg, NetworkSender},
    persistent_liveness_storage::wal::{Wal, WalEntry},
    time_service::TimeService,
};
use consensus_types::{
    block::Block,
    block_data::BlockData,
    common::{AuthorIndex, Height, Level, Payload},
    consensus_msg::ConsensusMsg,
    proposal_msg::ProposalMsg,
    quorum_cert::QuorumCert,
    sync_info::SyncInfo,
    vote::Vote,
    vote_data::BlockInfoLite,
};
use futures::stream::{FuturesUnordered, StreamExt};
use safety_rules::TSafetyRules;
use std::{future::Future, pin::Pin, sync::Arc};
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{error, info, warn};

/// spec.md §5 "Cancellation & timeouts ... all waits are cancellable via
/// a shared shutdown signal": a single-reader wrapper over a
/// `tokio::sync::watch<bool>` so [`RoundManager::run`] can select! on it
/// alongside the inbound queue and pending timers.
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    pub fn new(receiver: watch::Receiver<bool>) -> Self {
        Self(receiver)
    }

    async fn wait(&mut self) {
        while self.0.changed().await.is_ok() {
            if *self.0.borrow() {
                return;
            }
        }
    }
}

/// spec.md §5 "Parallel workers exist only for (a) signature
/// verification (stateless, offloaded to a bounded pool)": runs each
/// verification on the blocking-task pool, gated by a semaphore so at
/// most `max_concurrent` run at once, leaving the serial consensus task
/// free to keep draining its queue.
struct SignatureVerifier {
    crypto: Arc<dyn CryptoProvider>,
    permits: Arc<Semaphore>,
}

impl SignatureVerifier {
    fn new(crypto: Arc<dyn CryptoProvider>, max_concurrent: usize) -> Self {
        Self {
            crypto,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    async fn verify(&self, author: AuthorIndex, message: Vec<u8>, signature: Vec<u8>) -> Result<(), CryptoError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("signature verification semaphore is never closed");
        let crypto = self.crypto.clone();
        tokio::task::spawn_blocking(move || crypto.verify(author, &message, &signature))
            .await
            .expect("signature verification worker task panicked")
    }
}

type TimerFuture = Pin<Box<dyn Future<Output = Option<(Level, TimeoutKind)>> + Send>>;

/// Everything the driver needs to run one replica. Survives epoch
/// switches; only `epoch_manager`'s current view and the epoch
/// `safety_rules` has adopted underneath it change (spec.md §4.3 "on
/// switch ... recompute selfIndex" — the replica's own `AuthorIndex` is
/// always resolved fresh from the active verifier, not cached, since a
/// validator set can in principle reorder across an epoch boundary).
pub struct RoundManager {
    self_author: AuthorIndex,
    safety_rules: Box<dyn TSafetyRules + Send>,
    block_store: BlockStore,
    msg_pool: MsgPool,
    pacemaker: Pacemaker,
    epoch_manager: EpochManager,
    network: Arc<dyn NetworkSender>,
    crypto: Arc<dyn CryptoProvider>,
    block_verifier: Arc<dyn BlockVerifier>,
    wal: Arc<Wal>,
    sync_manager: SyncManager,
    fetcher: Arc<dyn BlockFetcher>,
    last_cast_vote: Option<Vote>,
    /// spec.md §4.7: outbound voting/proposing is suppressed until WAL
    /// replay concludes at startup.
    replay_done: bool,
    sig_verifier: SignatureVerifier,
    timer_service: TimerService,
    /// Every `LevelTimeout` armed by [`RoundManager::arm_level_timeout`]
    /// that hasn't fired or been superseded yet. Driven to completion by
    /// [`RoundManager::run`]; harness-driven tests that call
    /// `process_proposal`/`process_vote` directly are free to leave this
    /// un-drained, since dropping `RoundManager` just drops the pending
    /// sleeps with it.
    pending_timers: FuturesUnordered<TimerFuture>,
}

impl RoundManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_author: AuthorIndex,
        safety_rules: Box<dyn TSafetyRules + Send>,
        block_store: BlockStore,
        epoch_manager: EpochManager,
        network: Arc<dyn NetworkSender>,
        crypto: Arc<dyn CryptoProvider>,
        block_verifier: Arc<dyn BlockVerifier>,
        wal: Arc<Wal>,
        pacemaker: Pacemaker,
        sync_manager: SyncManager,
        fetcher: Arc<dyn BlockFetcher>,
        time_service: Arc<dyn TimeService>,
        config: &ConsensusConfig,
    ) -> Self {
        let sig_verifier = SignatureVerifier::new(crypto.clone(), config.signature_verification_concurrency);
        Self {
            self_author,
            safety_rules,
            block_store,
            msg_pool: MsgPool::new(),
            pacemaker,
            epoch_manager,
            network,
            crypto,
            block_verifier,
            wal,
            sync_manager,
            fetcher,
            last_cast_vote: None,
            replay_done: false,
            sig_verifier,
            timer_service: TimerService::new(time_service),
            pending_timers: FuturesUnordered::new(),
        }
    }

    /// spec.md §4.3 "On advance, arm a level-timeout of duration
    /// base·2^k": (re-)arms the pacemaker's `LevelTimeout` for whatever
    /// level it currently sits at, at the backoff-adjusted duration.
    /// Called after every level advance, whether driven by a
    /// certificate or by a prior local timeout, so there is always
    /// exactly one live `LevelTimeout` per replica.
    fn arm_level_timeout(&mut self) {
        let level = self.pacemaker.current_level();
        let duration = self.pacemaker.timeout_duration();
        let fut = self.timer_service.add_event(level, TimeoutKind::LevelTimeout, duration);
        self.pending_timers.push(Box::pin(fut));
    }

    /// spec.md §4.7: marks replay finished, re-enabling outbound votes
    /// and proposals. Callers drive every recovered WAL entry back
    /// through the normal `process_*` paths first; sends are naturally
    /// suppressed by this flag until they call it.
    pub fn mark_replay_done(&mut self) {
        self.replay_done = true;
    }

    /// Read-only views onto replica state, for monitoring and for the
    /// scenario harness's own assertions (spec.md §8 properties #1/#2
    /// are stated in terms of `committedLevel`/`lastCommittedBlock`).
    pub fn block_store(&self) -> &BlockStore {
        &self.block_store
    }

    pub fn current_level(&self) -> Level {
        self.pacemaker.current_level()
    }

    pub fn current_epoch(&self) -> consensus_types::common::EpochId {
        self.epoch_manager.current().epoch
    }

    fn election(&self) -> ProposerElection<'_> {
        ProposerElection::new(&self.epoch_manager.current().verifier)
    }

    fn sync_info(&self) -> SyncInfo {
        SyncInfo::new(self.block_store.highest_qc().clone(), None)
    }

    fn verify_epoch(&self, msg_epoch: u64) -> Result<(), Error> {
        let current = self.epoch_manager.current().epoch;
        if msg_epoch != current {
            return Err(Error::EpochMismatch { message: msg_epoch, expected: current });
        }
        Ok(())
    }

    /// spec.md §4.4 step 1 "epochId matches or is last-epoch during
    /// grace", §4.9 "Epoch mismatch during grace period (epochId+1) ->
    /// accept only if carrying a valid justifyQC to the new epoch's
    /// genesis level", §7 "EpochMismatch: drop unless within the
    /// single-epoch grace window". `justify`'s certified block is the
    /// proposal's parent (spec.md §3 Proposal invariant), so a proposal
    /// one epoch ahead is accepted -- and this replica's own epoch
    /// adopted early -- only if that parent is both stamped with the
    /// *current* epoch and itself the switch-triggering block, i.e.
    /// exactly the commit that would cause the switch once this replica
    /// reaches it through the normal commit path. Returns whether the
    /// epoch was just adopted this call, so the caller can skip the
    /// redundant old-epoch justify check that would otherwise follow.
    fn verify_epoch_with_grace(&mut self, msg_epoch: u64, justify: Option<&QuorumCert>) -> Result<bool, Error> {
        let current = self.epoch_manager.current().epoch;
        if msg_epoch == current {
            return Ok(false);
        }
        if msg_epoch == current + 1 {
            if let Some(grace_parent) = self.grace_switch_block(justify) {
                justify
                    .expect("grace_switch_block only returns Some given a justify")
                    .verify_endorsements(&self.epoch_manager.current().verifier, |author, message, signature| {
                        self.crypto.verify(author, message, signature).is_ok()
                    })?;
                match self.epoch_manager.apply_commit(&grace_parent, &DeterministicElection, true) {
                    Ok(true) => {
                        if let Err(e) = self.safety_rules.start_new_epoch(self.epoch_manager.current().clone()) {
                            warn!(error = %e, "safety rules failed to adopt new epoch early");
                        }
                        info!(epoch = self.epoch_manager.current().epoch, "epoch adopted early via grace window");
                        return Ok(true);
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "grace-window epoch-change payload rejected"),
                }
            }
        }
        Err(Error::EpochMismatch { message: msg_epoch, expected: current })
    }

    /// The switch-triggering block backing a grace-window acceptance:
    /// present as the block store's current root (i.e. already committed
    /// -- through this replica's own three-chain rule or through a sync
    /// that replayed the chain up to it, spec.md §4.3 "on switch, reopen
    /// chainStore view"), carrying epoch-change data whose switch height
    /// it has reached. `justify` only has to attest that the message
    /// still belongs to the epoch this replica is about to leave; the
    /// three-chain depth between it and the actual switch block is
    /// whatever it happened to be when the commit landed, so this reads
    /// the switch proof from the chain store rather than requiring
    /// `justify` to certify that block directly.
    fn grace_switch_block(&self, justify: Option<&QuorumCert>) -> Option<Block> {
        let justify = justify?;
        if justify.epoch() != self.epoch_manager.current().epoch {
            return None;
        }
        let root = self.block_store.get_block(self.block_store.root_id())?;
        let change = root.data().epoch_change.as_ref()?;
        if root.height() < change.switch_height {
            return None;
        }
        Some(root.clone())
    }

    fn all_validators(&self) -> Vec<AuthorIndex> {
        self.epoch_manager.current().verifier.validators().iter().map(|v| v.author).collect()
    }

    /// spec.md §4.4 steps 1-4 applied to an inbound proposal: structural
    /// checks, authorship (the sender must be the scheduled leader),
    /// signature, then the embedded justify QC. Assumes the caller has
    /// already made `proposal.block.parent_id()` resident (syncing if
    /// needed), since the grace-window epoch check has to inspect that
    /// parent block.
    async fn validate_proposal(&mut self, proposal: &ProposalMsg) -> Result<(), Error> {
        proposal.verify_well_formed()?;
        let grace_adopted =
            self.verify_epoch_with_grace(proposal.epoch(), proposal.block.data().justify_qc.as_ref())?;
        if proposal.level() < self.pacemaker.current_level() {
            return Err(Error::invalid_message(format!(
                "proposal level {} is behind current level {}",
                proposal.level(),
                self.pacemaker.current_level()
            )));
        }

        if !self.epoch_manager.current().verifier.contains(proposal.proposer) {
            return Err(Error::InvalidAuthor(format!("unknown proposer {}", proposal.proposer)));
        }
        if !self.election().is_valid_proposer(proposal.proposer, proposal.level()) {
            return Err(Error::InvalidAuthor(format!(
                "{} is not the scheduled leader for level {}",
                proposal.proposer,
                proposal.level()
            )));
        }

        let block_bytes = proposal
            .block
            .signable_bytes()
            .map_err(|e| Error::invalid_message(e.to_string()))?;
        self.sig_verifier
            .verify(proposal.proposer, block_bytes, proposal.block.signature().to_vec())
            .await
            .map_err(|e| {
                warn!(error = %e, author = proposal.proposer, "proposal signature verification failed");
                Error::InvalidSignature { author: proposal.proposer }
            })?;

        if let Some(justify) = &proposal.block.data().justify_qc {
            if !grace_adopted {
                justify.verify_endorsements(&self.epoch_manager.current().verifier, |author, message, signature| {
                    self.crypto.verify(author, message, signature).is_ok()
                })?;
                if justify.epoch() != self.epoch_manager.current().epoch {
                    return Err(Error::EpochMismatch {
                        message: justify.epoch(),
                        expected: self.epoch_manager.current().epoch,
                    });
                }
            }
        }

        self.block_verifier
            .verify_block(&proposal.block, VerifyMode::ConsensusVerify)
            .map_err(|e| Error::invalid_message(e.to_string()))?;
        Ok(())
    }

    /// spec.md §4.4 "process accepted proposal": insert, apply its
    /// justify QC (lock update + commit check), and vote iff safety
    /// allows. A proposal whose parent isn't resident yet is dropped
    /// with a warning (spec.md §4.9 "OrphanBlock ... request sync") —
    /// the caller is expected to drive `SyncManager` off the gap and
    /// redeliver.
    pub async fn process_proposal(&mut self, proposal: ProposalMsg) -> Result<(), FatalError> {
        if !self.block_store.contains_block(proposal.block.parent_id()) {
            let start_level = self
                .block_store
                .get_block(self.block_store.root_id())
                .map(|b| b.level())
                .unwrap_or(0);
            let crypto = self.crypto.clone();
            if let Err(e) = self
                .sync_manager
                .sync_to_block(
                    &mut self.block_store,
                    self.fetcher.as_ref(),
                    &self.epoch_manager.current().verifier,
                    &|author, message, signature| crypto.verify(author, message, signature).is_ok(),
                    proposal.proposer,
                    proposal.block.parent_id(),
                    proposal.block.height().saturating_sub(1),
                    start_level,
                )
                .await
            {
                warn!(error = %e, parent = ?proposal.block.parent_id(), "bounded sync failed, dropping proposal");
                return Ok(());
            }
        }

        if let Err(e) = self.validate_proposal(&proposal).await {
            warn!(error = %e, "rejected proposal");
            return Ok(());
        }

        self.wal
            .append(&WalEntry::NewBlockRecord {
                height: proposal.block.height(),
                block: proposal.block.clone(),
                rw_set: Vec::new(),
            })
            .map_err(|e| FatalError(anyhow::anyhow!(e)))?;

        if let Err(e) = self.msg_pool.insert_proposal(&proposal) {
            warn!(error = ?e, "equivocating proposal rejected by msg pool");
            return Ok(());
        }
        if let Err(e) = self.block_store.insert_block(proposal.block.clone()) {
            warn!(error = %e, "orphan block rejected");
            return Ok(());
        }

        if let Some(justify) = proposal.block.data().justify_qc.clone() {
            if let Err(e) = self.safety_rules.update_lock(&justify) {
                warn!(error = %e, "failed to update locked level, continuing with stale lock");
            }
            if self.pacemaker.advance_to_certificate(justify.level()) {
                self.arm_level_timeout();
            }
            if let Some(committed) = self.block_store.insert_qc(justify).await? {
                self.on_commit(committed).await?;
            }
        }

        self.try_vote(&proposal.block).await?;
        Ok(())
    }

    async fn try_vote(&mut self, block: &Block) -> Result<(), FatalError> {
        let Some(justify) = block.data().justify_qc.clone() else {
            return Ok(());
        };
        if let Err(e) = self.safety_rules.vote_rule(block.level(), &justify) {
            info!(level = block.level(), error = %e, "safety rules withheld vote");
            return Ok(());
        }

        let Some(parent) = self.block_store.get_block(block.parent_id()).cloned() else {
            return Ok(());
        };
        let proposed_info = BlockInfoLite { id: block.id(), height: block.height(), level: block.level(), epoch: block.epoch() };
        let parent_info = BlockInfoLite { id: parent.id(), height: parent.height(), level: parent.level(), epoch: parent.epoch() };
        let vote_data = safety_rules::vote_data_for(proposed_info, parent_info);

        let unsigned = Vote::new_regular(self.self_author, block.height(), block.level(), block.epoch(), vote_data, Vec::new());
        let signature = self
            .crypto
            .sign(&unsigned.signable_bytes().map_err(|e| FatalError(anyhow::anyhow!(e)))?)
            .map_err(|e| FatalError(anyhow::anyhow!(e)))?;
        let vote = Vote { signature, ..unsigned };

        self.last_cast_vote = Some(vote.clone());
        if !self.replay_done {
            return Ok(());
        }
        let next_leader = self.election().get_leader(block.level() + 1);
        self.network.send_to(next_leader, ConsensusMsg::Vote(vote)).await;
        Ok(())
    }

    /// spec.md §4.4 "process accepted vote": verify, aggregate, and on
    /// reaching quorum construct the QC/TC and, if this replica leads
    /// the next level, propose.
    pub async fn process_vote(&mut self, vote: Vote) -> Result<(), FatalError> {
        if vote.verify_well_formed().is_err() {
            return Ok(());
        }
        if self.verify_epoch(vote.epoch).is_err() {
            return Ok(());
        }
        if !self.epoch_manager.current().verifier.contains(vote.author) {
            warn!(author = vote.author, "vote from unknown author dropped");
            return Ok(());
        }
        let signable = match vote.signable_bytes() {
            Ok(bytes) => bytes,
            Err(_) => return Ok(()),
        };
        if self.sig_verifier.verify(vote.author, signable, vote.signature.clone()).await.is_err() {
            warn!(author = vote.author, "vote signature verification failed");
            return Ok(());
        }

        if let Err(e) = self.msg_pool.insert_vote(vote.clone()) {
            warn!(error = ?e, "rejected conflicting vote");
            return Ok(());
        }

        let outcome = match self.msg_pool.check_votes_done(
            vote.height,
            vote.level,
            vote.epoch,
            &self.epoch_manager.current().verifier,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "quorum aggregation rejected inconsistent endorsements");
                return Ok(());
            }
        };

        match outcome {
            Some(QuorumOutcome::Qc(qc)) => self.on_quorum_certificate(qc).await,
            Some(QuorumOutcome::Tc(tc)) => self.on_timeout_certificate(tc).await,
            None => Ok(()),
        }
    }

    async fn on_quorum_certificate(&mut self, qc: QuorumCert) -> Result<(), FatalError> {
        if let Err(e) = self.safety_rules.update_lock(&qc) {
            warn!(error = %e, "failed to update locked level, continuing with stale lock");
        }
        if self.pacemaker.advance_to_certificate(qc.level()) {
            self.arm_level_timeout();
        }
        if let Some(committed) = self.block_store.insert_qc(qc.clone()).await? {
            self.on_commit(committed).await?;
        }
        self.maybe_propose(qc).await
    }

    async fn on_timeout_certificate(&mut self, tc: QuorumCert) -> Result<(), FatalError> {
        if self.pacemaker.advance_to_certificate(tc.level()) {
            self.arm_level_timeout();
        }
        let justify = self.block_store.highest_qc().clone();
        self.maybe_propose(justify).await
    }

    /// spec.md §4.3 Leader schedule: if this replica leads the level the
    /// pacemaker just advanced into, build and broadcast a proposal
    /// justified by `justify_qc`.
    async fn maybe_propose(&mut self, justify_qc: QuorumCert) -> Result<(), FatalError> {
        if !self.replay_done {
            return Ok(());
        }
        let level = self.pacemaker.current_level();
        if self.election().get_leader(level) != self.self_author {
            return Ok(());
        }
        let Some(parent_id) = justify_qc.certified_block_id() else {
            return Ok(());
        };
        let Some(parent) = self.block_store.get_block(parent_id).cloned() else {
            return Ok(());
        };

        let data = BlockData::new_proposal(
            parent.height() + 1,
            level,
            self.epoch_manager.current().epoch,
            self.self_author,
            Payload::empty(),
            None,
            justify_qc,
        );
        let signature = self
            .crypto
            .sign(&bcs::to_bytes(&data).map_err(|e| FatalError(anyhow::anyhow!(e)))?)
            .map_err(|e| FatalError(anyhow::anyhow!(e)))?;
        let block = Block::new(data, signature).map_err(FatalError)?;
        info!(level, height = block.height(), "proposing block");

        let proposal = ProposalMsg::new(self.self_author, block, self.sync_info());
        let validators = self.all_validators();
        self.network.broadcast(&validators, ConsensusMsg::Proposal(proposal)).await;
        Ok(())
    }

    /// spec.md §4.4 "On commit": seal the message pool, truncate the WAL
    /// prefix, and trigger the epoch-transition check. Persistence to the
    /// ledger itself already happened inside `BlockStore::insert_qc`.
    async fn on_commit(&mut self, committed: BlockInfoLite) -> Result<(), FatalError> {
        self.wal
            .append(&WalEntry::CommitMarker { height: committed.height })
            .map_err(|e| FatalError(anyhow::anyhow!(e)))?;
        self.msg_pool.on_block_sealed(committed.height);

        let Some(block) = self.block_store.get_block(committed.id).cloned() else {
            return Ok(());
        };
        match self.epoch_manager.apply_commit(&block, &DeterministicElection, true) {
            Ok(true) => {
                if let Err(e) = self.safety_rules.start_new_epoch(self.epoch_manager.current().clone()) {
                    warn!(error = %e, "safety rules failed to adopt new epoch");
                }
                info!(epoch = self.epoch_manager.current().epoch, "epoch switched");
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "epoch-change payload rejected, staying on current epoch"),
        }
        Ok(())
    }

    /// spec.md §4.4 "On local timeout for (h, l)": re-emit the last
    /// regular vote converted to newView, or synthesize one if none was
    /// ever cast at this level, and broadcast to every validator.
    pub async fn on_local_timeout(&mut self, level: Level) -> Result<(), FatalError> {
        if level != self.pacemaker.current_level() {
            // spec.md §4.6 "superseded events ... are silently
            // discarded when fired": a certificate already advanced the
            // pacemaker past this level since the timer was armed.
            return Ok(());
        }
        let next_duration = self.pacemaker.record_local_timeout();
        tracing::debug!(level, next_timeout_ms = next_duration.as_millis() as u64, "level timed out");
        self.arm_level_timeout();

        let height: Height = self.block_store.highest_qc().height() + 1;
        let epoch = self.epoch_manager.current().epoch;

        let unsigned = match self.last_cast_vote.take() {
            Some(v) if v.level == level => v.into_timeout(Vec::new()),
            _ => Vote::new_timeout(self.self_author, height, level, epoch, Vec::new()),
        };
        let signature = self
            .crypto
            .sign(&unsigned.signable_bytes().map_err(|e| FatalError(anyhow::anyhow!(e)))?)
            .map_err(|e| FatalError(anyhow::anyhow!(e)))?;
        let vote = Vote { signature, ..unsigned };

        if self.replay_done {
            let validators = self.all_validators();
            self.network.broadcast(&validators, ConsensusMsg::Vote(vote)).await;
        }
        Ok(())
    }

    /// spec.md §2/§5 "ConsensusDriver": the single serial task binding
    /// everything above together. Drains `inbound` via `tokio::select!`
    /// alongside whatever level-timeouts are currently armed, exits on
    /// the first fatal error or once `shutdown` fires. Signature
    /// verification for inbound messages runs off-task on
    /// [`SignatureVerifier`]'s bounded pool; everything else (MsgPool,
    /// BlockStore, safety rules) stays on this one task, matching spec.md
    /// §5's "Shared resources ... are serially accessed from the
    /// consensus thread".
    pub async fn run(mut self, mut inbound: mpsc::Receiver<InboundMsg>, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("round manager shutting down");
                    return;
                }
                msg = inbound.recv() => {
                    match msg {
                        Some(msg) => {
                            if let Err(e) = self.dispatch(msg).await {
                                error!(error = %e, "fatal error processing inbound message, consensus loop stopping");
                                return;
                            }
                        }
                        None => {
                            info!("inbound channel closed, round manager stopping");
                            return;
                        }
                    }
                }
                fired = self.pending_timers.next(), if !self.pending_timers.is_empty() => {
                    if let Some(Some((level, kind))) = fired {
                        if kind == TimeoutKind::LevelTimeout {
                            if let Err(e) = self.on_local_timeout(level).await {
                                error!(error = %e, "fatal error handling local timeout, consensus loop stopping");
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Routes one inbound message to the handler for its kind. Fetch
    /// request/response and bare `SyncInfo` messages are serviced by
    /// `SyncManager` directly off the blocks it's already waiting on, not
    /// through this queue; see `block_storage::sync_manager`.
    async fn dispatch(&mut self, msg: InboundMsg) -> Result<(), FatalError> {
        match msg.msg {
            ConsensusMsg::Proposal(proposal) => self.process_proposal(proposal).await,
            ConsensusMsg::Vote(vote) => self.process_vote(vote).await,
            ConsensusMsg::BlockFetchRequest(_) | ConsensusMsg::BlockFetchResponse(_) | ConsensusMsg::SyncInfo(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        block_verifier::AcceptAllVerifier,
        config::ConsensusConfig,
        crypto::CryptoError,
        network::InProcessNetwork,
        state_replication::{FourStoreLedgerBridge, InMemoryKVStore, LedgerBridge, StoreSet},
    };
    use consensus_types::{
        test_utils as ctu,
        validator_verifier::{ValidatorInfo, ValidatorVerifier},
    };
    use safety_rules::{ConsensusState, Error as SafetyError};

    /// Accepts every signature: this module exercises the driver's
    /// control flow, not ed25519 itself (covered by
    /// `crypto::Ed25519CryptoProvider`'s own test).
    struct NoopCrypto(AuthorIndex);
    impl CryptoProvider for NoopCrypto {
        fn verify(&self, _author: AuthorIndex, _message: &[u8], _signature: &[u8]) -> Result<(), CryptoError> {
            Ok(())
        }
        fn sign(&self, _message: &[u8]) -> Result<Vec<u8>, CryptoError> {
            Ok(vec![0xAB])
        }
        fn self_author(&self) -> AuthorIndex {
            self.0
        }
    }

    /// An in-memory `TSafetyRules` mirroring `safety_rules::SafetyRules`'s
    /// rules without its storage indirection, for driver tests that only
    /// need the rule outcomes.
    struct TestSafetyRules {
        epoch: consensus_types::common::EpochId,
        last_voted_level: u64,
        locked_level: u64,
    }

    impl TSafetyRules for TestSafetyRules {
        fn consensus_state(&self) -> Result<ConsensusState, SafetyError> {
            Ok(ConsensusState::new(self.epoch, self.last_voted_level, self.locked_level))
        }
        fn start_new_epoch(&mut self, epoch_state: consensus_types::epoch_state::EpochState) -> Result<(), SafetyError> {
            self.epoch = epoch_state.epoch;
            Ok(())
        }
        fn update_lock(&mut self, qc: &QuorumCert) -> Result<(), SafetyError> {
            if qc.level() > self.locked_level {
                self.locked_level = qc.level();
            }
            Ok(())
        }
        fn vote_rule(&mut self, level: u64, justify_qc: &QuorumCert) -> Result<(), SafetyError> {
            if level <= self.last_voted_level {
                return Err(SafetyError::OldLevel { level, last_voted: self.last_voted_level });
            }
            if justify_qc.level() < self.locked_level {
                return Err(SafetyError::LockedLevelViolation { qc_level: justify_qc.level(), locked_level: self.locked_level });
            }
            self.last_voted_level = level;
            Ok(())
        }
        fn construct_ledger_info(&self, proposed: &BlockInfoLite, parent_qc: &QuorumCert) -> Option<BlockInfoLite> {
            safety_rules::three_chain_commit(proposed, parent_qc)
        }
    }

    fn validators(n: u16) -> ValidatorVerifier {
        ValidatorVerifier::new((0..n).map(|i| ValidatorInfo { author: i, public_key: vec![], weight: 1 }).collect())
    }

    fn ledger() -> Arc<dyn LedgerBridge> {
        Arc::new(FourStoreLedgerBridge::new(StoreSet {
            block: Box::new(InMemoryKVStore::default()),
            state: Box::new(InMemoryKVStore::default()),
            history: None,
            result: None,
        }))
    }

    /// The single-replica test always already has every parent resident
    /// (there's only ever one chain, grown one block at a time), so this
    /// fetcher is wired in to satisfy the constructor but never called.
    struct NeverFetcher;
    #[async_trait::async_trait]
    impl BlockFetcher for NeverFetcher {
        async fn fetch(
            &self,
            _peer: AuthorIndex,
            _request: consensus_types::consensus_msg::BlockFetchRequest,
        ) -> Result<consensus_types::consensus_msg::BlockFetchResponse, Error> {
            Err(Error::SyncIncomplete("NeverFetcher has no blocks".to_string()))
        }
    }

    fn single_replica_manager() -> (
        RoundManager,
        tokio::sync::mpsc::Receiver<crate::network::InboundMsg>,
        Arc<crate::time_service::SimulatedTimeService>,
    ) {
        let genesis = Block::genesis(0);
        let verifier = validators(1);
        let block_store = BlockStore::new(genesis, QuorumCert::certificate_for_genesis(0), ledger(), 50);
        let epoch_manager = EpochManager::new(verifier);
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let network: Arc<dyn NetworkSender> = Arc::new(InProcessNetwork::new(0, vec![(0, tx)]));
        let safety_rules: Box<dyn TSafetyRules + Send> =
            Box::new(TestSafetyRules { epoch: epoch_manager.current().epoch, last_voted_level: 0, locked_level: 0 });

        let config = ConsensusConfig::default();
        let clock = Arc::new(crate::time_service::SimulatedTimeService::new());
        let manager = RoundManager::new(
            0,
            safety_rules,
            block_store,
            epoch_manager,
            network,
            Arc::new(NoopCrypto(0)),
            Arc::new(AcceptAllVerifier),
            Arc::new(Wal::open(tempfile::NamedTempFile::new().unwrap().into_temp_path(), 100).unwrap()),
            Pacemaker::new(&config),
            SyncManager::new(&config),
            Arc::new(NeverFetcher),
            clock.clone(),
            &config,
        );
        (manager, rx, clock)
    }

    /// A lone validator forms a quorum of one on every vote, so this
    /// drives the full propose -> vote -> quorum -> re-propose loop
    /// deterministically without a multi-replica harness.
    #[tokio::test]
    async fn single_replica_proposes_votes_and_advances() {
        let (mut manager, mut inbound_rx, _clock) = single_replica_manager();
        manager.mark_replay_done();

        let genesis = Block::genesis(0);
        let qc0 = ctu::quorum_cert_for_block(&genesis, &genesis, &[0]);
        let b1 = ctu::test_block(&genesis, 1, 0, qc0.clone());
        let proposal = ProposalMsg::new(0, b1.clone(), SyncInfo::new(qc0.clone(), None));

        manager.process_proposal(proposal).await.unwrap();

        let vote_msg = inbound_rx.try_recv().expect("vote for b1 should have been self-sent");
        let ConsensusMsg::Vote(vote) = vote_msg.msg else { panic!("expected a vote message") };
        assert_eq!(vote.block_id(), Some(b1.id()));

        manager.process_vote(vote).await.unwrap();

        let proposal_msg = inbound_rx.try_recv().expect("reaching quorum of one should trigger the next proposal");
        let ConsensusMsg::Proposal(next) = proposal_msg.msg else { panic!("expected a proposal message") };
        assert_eq!(next.block.height(), b1.height() + 1);
        assert_eq!(next.block.parent_id(), b1.id());
    }

    /// `run()`'s `pending_timers` arm really does drive `on_local_timeout`
    /// once the clock reaches it, with no test code calling it directly:
    /// arm the level-0 timeout by hand (the same private call
    /// `process_proposal`/`on_quorum_certificate` make), hand the manager
    /// to `run()`, advance the simulated clock past `base_level_timeout`,
    /// and observe the self-broadcast timeout vote land back in the
    /// constructor's own inbound channel.
    #[tokio::test]
    async fn run_drives_local_timeout_from_the_armed_timer() {
        let (mut manager, mut self_rx, clock) = single_replica_manager();
        manager.mark_replay_done();
        manager.arm_level_timeout();

        let (_run_tx, run_rx) = tokio::sync::mpsc::channel::<crate::network::InboundMsg>(4);
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(manager.run(run_rx, ShutdownSignal::new(shutdown_rx)));

        clock.advance(std::time::Duration::from_millis(1000));

        let timeout_msg = tokio::time::timeout(std::time::Duration::from_millis(500), self_rx.recv())
            .await
            .expect("run() should have produced a self-broadcast timeout vote in time")
            .expect("channel stays open for the duration of the test");
        let ConsensusMsg::Vote(vote) = timeout_msg.msg else { panic!("expected a vote message") };
        assert!(vote.new_view, "a fired LevelTimeout must re-broadcast as a newView vote");
        assert_eq!(vote.level, 0);

        shutdown_tx.send(true).expect("shutdown receiver still alive");
        handle.await.expect("run() task must not panic");
    }
}
