//! # Value Objects
//!
//! Encrypted payload references, transaction options and extension status.

use crate::domain::errors::ExtensionError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use shared_types::{Address, U256};
use std::fmt;

// =============================================================================
// ENCRYPTED PAYLOAD HASH (64 bytes)
// =============================================================================

/// Length of an encrypted store reference.
pub const ENCRYPTED_PAYLOAD_HASH_LEN: usize = 64;

/// Content address of a blob held by the encrypted store.
///
/// Two text forms are in use: base64 for references recorded on the
/// management contract and `0x` hex for acceptance tokens.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncryptedPayloadHash([u8; ENCRYPTED_PAYLOAD_HASH_LEN]);

impl EncryptedPayloadHash {
    /// Wraps raw hash bytes.
    #[must_use]
    pub const fn new(bytes: [u8; ENCRYPTED_PAYLOAD_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds a hash from a slice of exactly 64 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, ExtensionError> {
        <[u8; ENCRYPTED_PAYLOAD_HASH_LEN]>::try_from(slice)
            .map(Self)
            .map_err(|_| {
                ExtensionError::InvalidPayloadHash(format!(
                    "expected {ENCRYPTED_PAYLOAD_HASH_LEN} bytes, got {}",
                    slice.len()
                ))
            })
    }

    /// Parses the base64 form.
    pub fn from_base64(text: &str) -> Result<Self, ExtensionError> {
        let raw = STANDARD
            .decode(text)
            .map_err(|e| ExtensionError::InvalidPayloadHash(e.to_string()))?;
        Self::from_slice(&raw)
    }

    /// Parses the hex form, with or without `0x`.
    pub fn from_hex(text: &str) -> Result<Self, ExtensionError> {
        let digits = text.strip_prefix("0x").unwrap_or(text);
        let raw =
            hex::decode(digits).map_err(|e| ExtensionError::InvalidPayloadHash(e.to_string()))?;
        Self::from_slice(&raw)
    }

    /// Base64 form.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// `0x` hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ENCRYPTED_PAYLOAD_HASH_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptedPayloadHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedPayloadHash({})", self.to_base64())
    }
}

impl fmt::Display for EncryptedPayloadHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

// =============================================================================
// TRANSACTION OPTIONS
// =============================================================================

/// Caller-supplied transaction arguments for Control API calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTxArgs {
    /// Signing account.
    pub from: Address,
    /// Encrypted store key of the sender; empty selects the store default.
    #[serde(default)]
    pub private_from: String,
    /// Encrypted store keys the transaction is private to.
    #[serde(default)]
    pub private_for: Vec<String>,
    /// Gas limit; defaults from configuration.
    #[serde(default)]
    pub gas: Option<u64>,
    /// Gas price; defaults from configuration.
    #[serde(default)]
    pub gas_price: Option<U256>,
}

/// Resolved options used to sign and submit a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactOpts {
    /// Signing account, known to hold a local wallet.
    pub from: Address,
    /// Encrypted store key of the sender.
    pub private_from: String,
    /// Encrypted store keys the transaction is private to.
    pub private_for: Vec<String>,
    /// Gas limit.
    pub gas_limit: u64,
    /// Gas price.
    pub gas_price: U256,
}

impl TransactOpts {
    /// Whether the transaction is private.
    #[must_use]
    pub fn is_private(&self) -> bool {
        !self.private_for.is_empty()
    }
}

// =============================================================================
// EXTENSION STATUS
// =============================================================================

/// Lifecycle state of a management contract as reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExtensionStatus {
    /// Voting or state sharing still pending.
    Active,
    /// Finished or cancelled.
    Done,
}

impl fmt::Display for ExtensionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("ACTIVE"),
            Self::Done => f.write_str("DONE"),
        }
    }
}
