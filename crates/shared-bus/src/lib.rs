//! # Shared Bus - Contract Log Transport
//!
//! The log-subscription transport a chain client offers to node subsystems.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Chain       │                    │  Subsystem   │
//! │  (tx exec)   │    publish()       │  (watcher)   │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │   Log Bus    │          │
//!                  │  + history   │ ─────────┘
//!                  └──────────────┘  subscribe(filter)
//! ```
//!
//! ## Delivery
//!
//! - Logs are delivered in emission order.
//! - A filter with `from_block` replays matching history before live logs.
//!   History is bounded; logs older than the retained window are not
//!   replayed.
//! - A transport fault is delivered to every subscriber as an error and
//!   ends the subscription from the consumer's point of view.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{BusMessage, LogFilter};
pub use publisher::{InMemoryLogBus, LogPublisher};
pub use subscriber::{LogSubscription, SubscriptionError};

/// Maximum messages to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Logs kept for replay before the oldest is dropped.
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;
