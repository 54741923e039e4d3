//! # Extension Registry
//!
//! Owns the set of extension records, persists it on every mutation and
//! keeps the background watchers running:
//!
//! | Watcher | Lifetime | Event |
//! |---------|----------|-------|
//! | new extensions | process | `NewContractExtensionContractCreated` |
//! | cancellations | process | `ExtensionFinished` |
//! | vote completion | one per record, single shot | `AllNodesHaveVoted` |
//!
//! ## Locking
//!
//! One mutex guards the record map, the dead-letter queue and every
//! snapshot write. Removal of a record and cancellation of its watcher
//! happen in the same critical section, so a token is cancelled at most
//! once. The share step runs after the lock is released, on a copy of the
//! record taken when it was marked voted.

use crate::adapters::{RegistrySnapshot, SnapshotFile};
use crate::config::{ExtensionConfig, UndecodablePolicy};
use crate::domain::{AbiError, ExtensionError, ExtensionRecord};
use crate::events::{
    AllNodesHaveVoted, NewExtensionCreated, ALL_NODES_HAVE_VOTED_TOPIC, EXTENSION_FINISHED_TOPIC,
    NEW_EXTENSION_TOPIC,
};
use crate::ports::ExtensionPorts;
use crate::share_step::{ShareOutcome, ShareStepExecutor};
use crate::transactor::TransactorFactory;
use parking_lot::Mutex;
use shared_bus::{LogFilter, LogSubscription};
use shared_types::{Address, ChainLog};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause between attempts to open a vote subscription.
const VOTE_SUBSCRIBE_RETRY: Duration = Duration::from_millis(500);

/// Result of processing one watcher event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchStep {
    /// Event handled.
    Continue,
    /// Event dropped; the watcher keeps going.
    Skip(String),
    /// The watcher must exit.
    Stop,
}

struct ActiveExtension {
    record: ExtensionRecord,
    cancel: CancellationToken,
}

#[derive(Default)]
struct RegistryState {
    records: HashMap<Address, ActiveExtension>,
    dead_letters: VecDeque<ChainLog>,
}

struct RegistryInner {
    config: ExtensionConfig,
    ports: ExtensionPorts,
    snapshot: SnapshotFile,
    share_step: ShareStepExecutor,
    state: Mutex<RegistryState>,
    shutdown: CancellationToken,
    vote_watchers: AtomicUsize,
}

/// Decrements the live vote-watcher count when a watcher ends.
struct WatcherCount<'a>(&'a AtomicUsize);

impl Drop for WatcherCount<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Registry of in-flight extensions. Cheap to clone.
#[derive(Clone)]
pub struct ExtensionRegistry {
    inner: Arc<RegistryInner>,
}

impl ExtensionRegistry {
    /// Loads the snapshot, connects to the chain and starts every watcher.
    ///
    /// # Errors
    ///
    /// Fatal startup conditions: a corrupt or unreadable snapshot, an
    /// unreachable chain client, or a failed global subscription.
    pub async fn initialize(
        config: ExtensionConfig,
        ports: ExtensionPorts,
    ) -> Result<Self, ExtensionError> {
        let snapshot = SnapshotFile::new(config.snapshot_path());
        let loaded = snapshot.load().inspect_err(|e| {
            error!(path = %snapshot.path().display(), error = %e, "[qc-18] Cannot load extension snapshot");
        })?;

        let head = ports.chain.block_number().await.inspect_err(|e| {
            error!(error = %e, "[qc-18] Chain client unreachable");
        })?;

        let new_extensions = ports
            .chain
            .subscribe_logs(LogFilter::event(NEW_EXTENSION_TOPIC))?;
        let finished = ports
            .chain
            .subscribe_logs(LogFilter::event(EXTENSION_FINISHED_TOPIC))?;

        let transactor = TransactorFactory::new(ports.accounts.clone(), &config);
        let share_step = ShareStepExecutor::new(ports.clone(), transactor);

        let registry = Self {
            inner: Arc::new(RegistryInner {
                config,
                ports,
                snapshot,
                share_step,
                state: Mutex::new(RegistryState::default()),
                shutdown: CancellationToken::new(),
                vote_watchers: AtomicUsize::new(0),
            }),
        };

        let restored: Vec<(ExtensionRecord, CancellationToken)> = {
            let mut state = registry.inner.state.lock();
            loaded
                .into_values()
                .map(|record| {
                    let cancel = registry.inner.shutdown.child_token();
                    state.records.insert(
                        record.management_contract,
                        ActiveExtension {
                            record: record.clone(),
                            cancel: cancel.clone(),
                        },
                    );
                    (record, cancel)
                })
                .collect()
        };

        let restored_count = restored.len();
        for (record, cancel) in restored {
            registry.start_vote_watcher(&record, cancel);
        }

        tokio::spawn(registry.clone().watch_new_extensions(new_extensions));
        tokio::spawn(registry.clone().watch_cancellations(finished));

        info!(
            restored = restored_count,
            head, "[qc-18] Contract extension registry initialized"
        );
        Ok(registry)
    }

    /// Copy of every tracked record, oldest first.
    #[must_use]
    pub fn active_extensions(&self) -> Vec<ExtensionRecord> {
        let state = self.inner.state.lock();
        let mut records: Vec<ExtensionRecord> =
            state.records.values().map(|a| a.record.clone()).collect();
        records.sort_by_key(|r| (r.created_block, r.management_contract));
        records
    }

    /// Undecodable new-extension logs kept for inspection.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<ChainLog> {
        self.inner.state.lock().dead_letters.iter().cloned().collect()
    }

    /// Number of vote watchers still running.
    #[must_use]
    pub fn active_vote_watchers(&self) -> usize {
        self.inner.vote_watchers.load(Ordering::SeqCst)
    }

    /// Location of the snapshot file.
    #[must_use]
    pub fn snapshot_path(&self) -> &Path {
        self.inner.snapshot.path()
    }

    /// Writes the final snapshot, then stops every watcher.
    pub fn shutdown(&self) -> Result<(), ExtensionError> {
        let state = self.inner.state.lock();
        let result = self.persist(&state);
        self.inner.shutdown.cancel();
        drop(state);

        match &result {
            Ok(()) => info!("[qc-18] Contract extension registry stopped"),
            Err(e) => error!(error = %e, "[qc-18] Final snapshot write failed"),
        }
        result
    }

    // =========================================================================
    // PERSISTENCE (caller holds the lock)
    // =========================================================================

    fn persist(&self, state: &RegistryState) -> Result<(), ExtensionError> {
        let snapshot: RegistrySnapshot = state
            .records
            .iter()
            .map(|(address, active)| (*address, active.record.clone()))
            .collect();
        self.inner.snapshot.save(&snapshot)
    }

    fn persist_logged(&self, state: &RegistryState) {
        if let Err(e) = self.persist(state) {
            error!(error = %e, "[qc-18] Failed to persist extension snapshot");
        }
    }

    // =========================================================================
    // NEW EXTENSIONS
    // =========================================================================

    async fn watch_new_extensions(self, mut subscription: LogSubscription) {
        loop {
            let log = tokio::select! {
                biased;
                () = self.inner.shutdown.cancelled() => break,
                received = subscription.recv() => match received {
                    Ok(log) => log,
                    Err(e) => {
                        error!(error = %e, "[qc-18] Contract extension watcher subscription error");
                        break;
                    }
                },
            };

            match self.on_new_extension(log).await {
                WatchStep::Continue => {}
                WatchStep::Skip(reason) => {
                    warn!(reason = %reason, "[qc-18] Skipped extension creation event");
                }
                WatchStep::Stop => break,
            }
        }
        debug!("[qc-18] New extension watcher stopped");
    }

    async fn on_new_extension(&self, log: ChainLog) -> WatchStep {
        let created = match NewExtensionCreated::decode(&log.data) {
            Ok(created) => created,
            Err(e) => return self.undecodable(log, &e),
        };

        let tx = match self.inner.ports.chain.transaction_by_hash(log.tx_hash).await {
            Ok(Some(tx)) => tx,
            Ok(None) => return WatchStep::Skip(format!("transaction {} not found", log.tx_hash)),
            Err(e) => return WatchStep::Skip(format!("transaction lookup failed: {e}")),
        };

        let management_contract = log.address;
        let record = ExtensionRecord::new(
            created.to_extend,
            tx.from,
            management_contract,
            tx.data,
            log.block_number,
        );

        let cancel = {
            let mut state = self.inner.state.lock();
            if self.inner.shutdown.is_cancelled() {
                return WatchStep::Stop;
            }
            if state.records.contains_key(&management_contract) {
                return WatchStep::Skip(format!("extension {management_contract} already tracked"));
            }

            let cancel = self.inner.shutdown.child_token();
            state.records.insert(
                management_contract,
                ActiveExtension {
                    record: record.clone(),
                    cancel: cancel.clone(),
                },
            );
            self.persist_logged(&state);
            cancel
        };

        info!(
            management_contract = %management_contract,
            contract = %record.contract_extended,
            initiator = %record.initiator,
            "[qc-18] Tracking new extension request"
        );
        self.start_vote_watcher(&record, cancel);
        WatchStep::Continue
    }

    fn undecodable(&self, log: ChainLog, error: &AbiError) -> WatchStep {
        warn!(
            management_contract = %log.address,
            tx = %log.tx_hash,
            block = log.block_number,
            data = %hex::encode(&log.data),
            "[qc-18] Error unpacking extension creation log"
        );

        if self.inner.config.undecodable_policy == UndecodablePolicy::DeadLetter {
            let capacity = self.inner.config.dead_letter_capacity;
            let mut state = self.inner.state.lock();
            if capacity > 0 {
                while state.dead_letters.len() >= capacity {
                    state.dead_letters.pop_front();
                }
                state.dead_letters.push_back(log);
            }
        }

        WatchStep::Skip(format!("undecodable creation log: {error}"))
    }

    // =========================================================================
    // CANCELLATIONS
    // =========================================================================

    async fn watch_cancellations(self, mut subscription: LogSubscription) {
        loop {
            let log = tokio::select! {
                biased;
                () = self.inner.shutdown.cancelled() => break,
                received = subscription.recv() => match received {
                    Ok(log) => log,
                    Err(e) => {
                        error!(error = %e, "[qc-18] Contract cancellation watcher subscription error");
                        break;
                    }
                },
            };

            match self.on_finished(&log) {
                WatchStep::Continue => {}
                WatchStep::Skip(reason) => debug!(reason = %reason, "[qc-18] Ignored finished event"),
                WatchStep::Stop => break,
            }
        }
        debug!("[qc-18] Cancellation watcher stopped");
    }

    fn on_finished(&self, log: &ChainLog) -> WatchStep {
        let mut state = self.inner.state.lock();
        if self.inner.shutdown.is_cancelled() {
            return WatchStep::Stop;
        }

        let Some(active) = state.records.remove(&log.address) else {
            return WatchStep::Skip(format!("no active extension at {}", log.address));
        };
        active.cancel.cancel();
        self.persist_logged(&state);

        info!(
            management_contract = %log.address,
            voted = active.record.all_have_voted,
            "[qc-18] Extension finished"
        );
        WatchStep::Continue
    }

    // =========================================================================
    // VOTE COMPLETION (per record)
    // =========================================================================

    /// Spawns the record's vote watcher. The watcher owns `cancel` and
    /// counts as running while it waits for its subscription.
    fn start_vote_watcher(&self, record: &ExtensionRecord, cancel: CancellationToken) {
        self.inner.vote_watchers.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(self.clone().watch_vote_completion(
            record.management_contract,
            record.created_block,
            cancel,
        ));
    }

    /// Retries until the chain accepts the subscription; `None` once cancelled.
    async fn subscribe_votes(
        &self,
        management_contract: Address,
        created_block: u64,
        cancel: &CancellationToken,
    ) -> Option<LogSubscription> {
        let filter = LogFilter::event(ALL_NODES_HAVE_VOTED_TOPIC)
            .at_address(management_contract)
            .from_block(created_block);

        loop {
            match self.inner.ports.chain.subscribe_logs(filter.clone()) {
                Ok(subscription) => return Some(subscription),
                Err(e) => warn!(
                    management_contract = %management_contract,
                    error = %e,
                    "[qc-18] Cannot watch extension votes, retrying"
                ),
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(VOTE_SUBSCRIBE_RETRY) => {}
            }
        }
    }

    async fn watch_vote_completion(
        self,
        management_contract: Address,
        created_block: u64,
        cancel: CancellationToken,
    ) {
        let _count = WatcherCount(&self.inner.vote_watchers);

        let Some(mut subscription) = self
            .subscribe_votes(management_contract, created_block, &cancel)
            .await
        else {
            info!(management_contract = %management_contract, "[qc-18] No longer watching extension request");
            return;
        };

        let log = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(management_contract = %management_contract, "[qc-18] No longer watching extension request");
                return;
            }
            received = subscription.recv() => match received {
                Ok(log) => log,
                Err(e) => {
                    error!(management_contract = %management_contract, error = %e, "[qc-18] Vote watcher subscription error");
                    return;
                }
            },
        };

        match self.on_vote_completed(management_contract, &log, &cancel).await {
            WatchStep::Continue | WatchStep::Stop => {}
            WatchStep::Skip(reason) => {
                info!(management_contract = %management_contract, reason = %reason, "[qc-18] Vote completion ignored");
            }
        }
    }

    async fn on_vote_completed(
        &self,
        management_contract: Address,
        log: &ChainLog,
        cancel: &CancellationToken,
    ) -> WatchStep {
        let vote = match AllNodesHaveVoted::decode(&log.data) {
            Ok(vote) => vote,
            Err(e) => return WatchStep::Skip(format!("undecodable vote log: {e}")),
        };
        if !vote.outcome {
            return WatchStep::Skip("extension voted down".into());
        }

        let record = {
            let mut state = self.inner.state.lock();
            if cancel.is_cancelled() {
                return WatchStep::Stop;
            }
            let Some(active) = state.records.get_mut(&management_contract) else {
                return WatchStep::Skip("record no longer active".into());
            };
            active.record.mark_voted();
            let record = active.record.clone();
            self.persist_logged(&state);
            record
        };

        info!(management_contract = %management_contract, "[qc-18] All voters approved extension");

        match self.inner.share_step.execute(&record, log.block_hash).await {
            Ok(ShareOutcome::NotInitiator) => {}
            Ok(ShareOutcome::Shared { .. }) => {}
            Err(e) => error!(
                management_contract = %management_contract,
                error = %e,
                "[qc-18] Share step failed; cancel and re-propose to retry"
            ),
        }
        WatchStep::Continue
    }
}
