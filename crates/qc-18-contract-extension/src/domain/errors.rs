//! # Domain Errors
//!
//! Error types for the contract extension subsystem.

use crate::domain::abi::AbiError;
use shared_types::Address;
use thiserror::Error;

/// Contract extension error types.
#[derive(Debug, Error)]
pub enum ExtensionError {
    // =========================================================================
    // STARTUP / INFRASTRUCTURE
    // =========================================================================
    /// Reading or writing the registry snapshot failed.
    #[error("Snapshot persistence failed: {0}")]
    Persistence(String),

    /// The registry snapshot exists but cannot be parsed.
    #[error("Corrupt registry snapshot at {path}: {reason}")]
    CorruptSnapshot {
        /// Snapshot file location
        path: String,
        /// Parser message
        reason: String,
    },

    /// The chain client cannot be reached.
    #[error("Chain client unavailable: {0}")]
    ChainUnavailable(String),

    /// The encrypted store cannot be reached.
    #[error("Encrypted store unavailable: {0}")]
    StoreUnavailable(String),

    // =========================================================================
    // COLLABORATOR CALLS
    // =========================================================================
    /// The encrypted store rejected or failed a call.
    #[error("Encrypted store call failed: {0}")]
    Store(String),

    /// A management contract call or transaction failed.
    #[error("Contract call failed: {0}")]
    Contract(String),

    /// The private state could not be read.
    #[error("Private state unavailable: {0}")]
    State(String),

    /// No local wallet holds the requested sender account.
    #[error("No wallet found for account {0}")]
    NoWallet(Address),

    // =========================================================================
    // DECODING
    // =========================================================================
    /// An event log payload did not match its ABI.
    #[error("Event decode failed: {0}")]
    Decode(#[from] AbiError),

    /// An encrypted payload reference had the wrong form.
    #[error("Invalid encrypted payload hash: {0}")]
    InvalidPayloadHash(String),

    /// Shared state payload is not a valid account map.
    #[error("Malformed shared state payload: {0}")]
    MalformedPayload(String),

    /// A field of a shared account could not be applied.
    #[error("Invalid shared account {account}: {reason}")]
    InvalidAccount {
        /// Account key as received
        account: String,
        /// Which field failed and why
        reason: String,
    },

    // =========================================================================
    // RECEIVING SIDE AUTHORIZATION
    // =========================================================================
    /// The state-share carries no acceptance token.
    #[error("Acceptance token missing; accept was never called")]
    AcceptanceMissing,

    /// The acceptance token was not created by this node.
    #[error("Acceptance token not created by this node")]
    NotSender,

    /// The shared state payload is not visible to this node.
    #[error("Shared state not available to this node")]
    NotShared,

    // =========================================================================
    // CONTROL API PRECONDITIONS
    // =========================================================================
    /// The recipient identifier is empty.
    #[error("New recipient identifier must not be empty")]
    EmptyRecipient,

    /// The target contract already has an extension in progress.
    #[error("Contract {0} is already under extension")]
    AlreadyUnderExtension(Address),

    /// The extension was already finished or cancelled.
    #[error("Extension {0} has already finished")]
    ExtensionFinished(Address),

    /// The sender is not allowed to vote on the extension.
    #[error("Account {voter} is not a voter of extension {management_contract}")]
    NotVoter {
        /// Rejected sender
        voter: Address,
        /// Management contract
        management_contract: Address,
    },

    /// The sender did not create the extension.
    #[error("Account {caller} did not create extension {management_contract}")]
    NotCreator {
        /// Rejected sender
        caller: Address,
        /// Management contract
        management_contract: Address,
    },
}

/// Configuration errors, raised at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The encrypted store address was not provided.
    #[error("Encrypted store address not set ({0})")]
    MissingStoreUrl(&'static str),

    /// A variable was set to an unusable value.
    #[error("Invalid value for {key}: {value}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Offending value
        value: String,
    },
}
