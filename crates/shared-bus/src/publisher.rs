//! # Log Publisher
//!
//! Defines the publishing side of the log bus.

use crate::events::{BusMessage, LogFilter};
use crate::subscriber::LogSubscription;
use crate::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_HISTORY_LIMIT};
use async_trait::async_trait;
use shared_types::entities::ChainLog;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Trait for publishing logs to the bus.
#[async_trait]
pub trait LogPublisher: Send + Sync {
    /// Publish a log to the bus.
    ///
    /// # Returns
    ///
    /// The number of active subscribers that received the log.
    async fn publish(&self, log: ChainLog) -> usize;

    /// Get the total number of logs published.
    fn logs_published(&self) -> u64;
}

/// In-memory implementation of the log bus.
///
/// Uses `tokio::sync::broadcast` for fan-out and keeps a bounded log
/// history so that subscribers can replay from a starting block. Publishing
/// and subscribing are serialized on the history lock, so a replaying
/// subscriber sees every log exactly once.
///
/// This is a development transport. Once more than the history limit has
/// been published the oldest logs are dropped, and a subscriber replaying
/// from an earlier block silently misses them. Call
/// [`prune_before`](Self::prune_before) to release history no watcher can
/// still ask for.
pub struct InMemoryLogBus {
    /// Broadcast sender for messages.
    sender: broadcast::Sender<BusMessage>,

    /// Retained logs, in emission order.
    history: RwLock<VecDeque<ChainLog>>,

    /// Most logs kept in `history`.
    history_limit: usize,

    /// Total logs published.
    logs_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryLogBus {
    /// Create a new in-memory log bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory log bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            history: RwLock::new(VecDeque::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
            logs_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Keep at most `limit` logs for replay.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Drop retained logs from blocks before `block`.
    ///
    /// # Returns
    ///
    /// The number of logs dropped.
    pub fn prune_before(&self, block: u64) -> usize {
        let mut history = match self.history.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = history.len();
        history.retain(|log| log.block_number >= block);
        let pruned = before - history.len();

        debug!(block = block, pruned = pruned, "Log history pruned");
        pruned
    }

    /// Number of logs currently retained for replay.
    #[must_use]
    pub fn history_len(&self) -> usize {
        match self.history.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Subscribe to logs matching a filter.
    ///
    /// With `from_block` set, matching history at or after that block is
    /// queued ahead of live delivery.
    #[must_use]
    pub fn subscribe(&self, filter: LogFilter) -> LogSubscription {
        let history = match self.history.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let backlog: VecDeque<ChainLog> = match filter.from_block {
            Some(from) => history
                .iter()
                .filter(|log| log.block_number >= from && filter.matches(log))
                .cloned()
                .collect(),
            None => VecDeque::new(),
        };
        let receiver = self.sender.subscribe();
        drop(history);

        debug!(
            addresses = filter.addresses.len(),
            replayed = backlog.len(),
            "New log subscription created"
        );

        LogSubscription::new(backlog, receiver, filter)
    }

    /// Report a transport failure to every current subscriber.
    pub fn fault(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "Log bus fault injected");
        let _ = self.sender.send(BusMessage::Fault(reason));
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryLogBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogPublisher for InMemoryLogBus {
    async fn publish(&self, log: ChainLog) -> usize {
        self.logs_published.fetch_add(1, Ordering::Relaxed);

        let mut history = match self.history.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        history.push_back(log.clone());
        while history.len() > self.history_limit {
            history.pop_front();
        }

        let address = log.address;
        let block = log.block_number;
        match self.sender.send(BusMessage::Log(log)) {
            Ok(receiver_count) => {
                debug!(
                    address = %address,
                    block = block,
                    receivers = receiver_count,
                    "Log published"
                );
                receiver_count
            }
            Err(_) => {
                // No live receivers; the log stays in history for replay
                debug!(address = %address, block = block, "Log recorded (no receivers)");
                0
            }
        }
    }

    fn logs_published(&self) -> u64 {
        self.logs_published.load(Ordering::Relaxed)
    }
}
