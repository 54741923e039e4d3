//! # QC-18 Private Contract Extension
//!
//! Extends an existing private contract to a party that was not among its
//! original participants, once every nominated voter agrees.
//!
//! **Subsystem ID:** 18  
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Protocol
//!
//! ```text
//! extend_contract ──► management contract deployed ──► registry tracks record
//!                                                           │
//! vote_on_contract (every voter) ──► AllNodesHaveVoted ─────┤
//!                                                           ▼
//!            initiator node: share step ──► StateShared(hash, uuid)
//!                                                           │
//!            recipient node: applier checks uuid ◄──────────┘
//!                            and merges the dump atomically
//! ```
//!
//! ## Components
//!
//! | Component | Responsibility |
//! |-----------|----------------|
//! | [`ExtensionRegistry`] | Records, snapshot file, event watchers |
//! | [`ShareStepExecutor`] | Re-encrypts the contract state for the recipient |
//! | [`ExtensionApplier`] | Authorizes and applies shared state |
//! | [`PrivateExtensionApi`] | Operator calls that submit transactions |
//!
//! ## Module Structure
//!
//! ```text
//! qc-18-contract-extension/
//! ├── domain/      # records, dumps, ABI codec, errors
//! ├── ports/       # ExtensionApi, EncryptedStore, ChainClient, ...
//! ├── adapters/    # snapshot file, HTTP store, in-memory chain/store/state
//! ├── registry.rs  # lifecycle and watchers
//! ├── share_step.rs
//! ├── applier.rs
//! └── api.rs
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod api;
pub mod applier;
pub mod config;
pub mod domain;
pub mod events;
pub mod ports;
pub mod registry;
pub mod share_step;
pub mod transactor;

#[cfg(test)]
mod test_support;

// Re-exports
pub use api::PrivateExtensionApi;
pub use applier::{apply_shared_state, ApplyOutcome, ExtensionApplier};
pub use config::{ExtensionConfig, UndecodablePolicy};
pub use domain::{
    AccountDump, AccountWithMetadata, ConfigError, EncryptedPayloadHash, ExtensionError,
    ExtensionRecord, ExtensionStatus, SendTxArgs, SharedState, TransactOpts,
};
pub use ports::{
    AccountManager, ChainClient, EncryptedStore, ExtensionApi, ExtensionPorts, ManagementContract,
    PrivateStateDb,
};
pub use registry::{ExtensionRegistry, WatchStep};
pub use share_step::{ShareOutcome, ShareStepExecutor};
pub use transactor::TransactorFactory;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Subsystem identifier used in log prefixes.
pub const SUBSYSTEM_ID: u8 = 18;
