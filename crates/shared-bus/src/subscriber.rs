//! # Log Subscriber
//!
//! Defines the subscription side of the log bus.

use crate::events::{BusMessage, LogFilter};
use shared_types::entities::ChainLog;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The log bus was closed.
    #[error("Log bus closed")]
    Closed,

    /// The transport reported a failure.
    #[error("Subscription faulted: {0}")]
    Faulted(String),
}

/// A subscription handle for receiving logs.
///
/// Replayed logs (when the filter has `from_block`) are delivered before
/// any live log.
pub struct LogSubscription {
    /// Matching history captured at subscribe time.
    backlog: VecDeque<ChainLog>,

    /// The broadcast receiver.
    receiver: broadcast::Receiver<BusMessage>,

    /// Filter for this subscription.
    filter: LogFilter,
}

impl LogSubscription {
    /// Create a new subscription.
    pub(crate) fn new(
        backlog: VecDeque<ChainLog>,
        receiver: broadcast::Receiver<BusMessage>,
        filter: LogFilter,
    ) -> Self {
        Self {
            backlog,
            receiver,
            filter,
        }
    }

    /// Receive the next log that matches the filter.
    ///
    /// # Errors
    ///
    /// - `SubscriptionError::Closed` - the bus was dropped
    /// - `SubscriptionError::Faulted` - the transport reported a failure
    pub async fn recv(&mut self) -> Result<ChainLog, SubscriptionError> {
        if let Some(log) = self.backlog.pop_front() {
            return Ok(log);
        }

        loop {
            let message = match self.receiver.recv().await {
                Ok(m) => m,
                Err(broadcast::error::RecvError::Closed) => return Err(SubscriptionError::Closed),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some logs dropped");
                    continue;
                }
            };

            match message {
                BusMessage::Fault(reason) => return Err(SubscriptionError::Faulted(reason)),
                BusMessage::Log(log) if self.filter.matches(&log) => return Ok(log),
                // Log doesn't match filter, continue waiting
                BusMessage::Log(_) => {}
            }
        }
    }

    /// Try to receive the next log without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(log))` - A log was available and matched
    /// - `Ok(None)` - No log available (would block)
    /// - `Err(_)` - The channel was closed or faulted
    pub fn try_recv(&mut self) -> Result<Option<ChainLog>, SubscriptionError> {
        if let Some(log) = self.backlog.pop_front() {
            return Ok(Some(log));
        }

        loop {
            let message = match self.receiver.try_recv() {
                Ok(m) => m,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            match message {
                BusMessage::Fault(reason) => return Err(SubscriptionError::Faulted(reason)),
                BusMessage::Log(log) if self.filter.matches(&log) => return Ok(Some(log)),
                BusMessage::Log(_) => {}
            }
        }
    }

    /// Get the filter for this subscription.
    #[must_use]
    pub fn filter(&self) -> &LogFilter {
        &self.filter
    }
}
