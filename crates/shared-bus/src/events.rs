//! # Bus Messages and Log Filters
//!
//! Contract event logs are the only payload that flows through the bus. A
//! subscription may also observe a transport fault, which ends it.

use serde::{Deserialize, Serialize};
use shared_types::entities::{Address, ChainLog, Hash};

/// A message delivered to every subscriber of the bus.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// A contract emitted a log.
    Log(ChainLog),

    /// The transport failed; subscribers must treat their subscription as dead.
    Fault(String),
}

/// Filter for subscribing to a subset of logs.
///
/// Semantics follow `eth_getLogs`: an empty address list matches every
/// contract, and `topics[i]` restricts position `i` of the log's topics
/// to one of the listed hashes (an empty slot matches anything).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Emitting contracts to include. Empty means all contracts.
    pub addresses: Vec<Address>,
    /// Per-position topic alternatives.
    pub topics: Vec<Vec<Hash>>,
    /// Replay already-published logs from this block onwards before live delivery.
    pub from_block: Option<u64>,
}

impl LogFilter {
    /// Create a filter that accepts all logs.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for logs whose first topic is `event`.
    #[must_use]
    pub fn event(event: Hash) -> Self {
        Self {
            addresses: Vec::new(),
            topics: vec![vec![event]],
            from_block: None,
        }
    }

    /// Restrict the filter to logs emitted by `address`.
    #[must_use]
    pub fn at_address(mut self, address: Address) -> Self {
        self.addresses.push(address);
        self
    }

    /// Replay history starting at `block`.
    #[must_use]
    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = Some(block);
        self
    }

    /// Check if a log matches this filter.
    ///
    /// `from_block` only selects the replayed backlog; live logs are never
    /// filtered by block number.
    #[must_use]
    pub fn matches(&self, log: &ChainLog) -> bool {
        let address_match = self.addresses.is_empty() || self.addresses.contains(&log.address);

        let topic_match = self.topics.iter().enumerate().all(|(i, wanted)| {
            wanted.is_empty() || log.topics.get(i).is_some_and(|t| wanted.contains(t))
        });

        address_match && topic_match
    }
}
