//! # Core Chain Entities
//!
//! Primitive chain types shared by the log transport, the contract extension
//! subsystem and the node runtime.
//!
//! ## Text form
//!
//! `Address` and `Hash` render as `0x`-prefixed lowercase hex, both through
//! `Display` and through serde, so they can be used directly as JSON object
//! keys in persisted files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::errors::TypeParseError;

// Re-export U256 from primitive-types for balances and gas prices
pub use primitive_types::U256;

/// Decodes a hex string with an optional `0x` prefix into exactly `N` bytes.
fn decode_fixed<const N: usize>(kind: &'static str, s: &str) -> Result<[u8; N], TypeParseError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let raw = hex::decode(digits).map_err(|e| TypeParseError::InvalidHex {
        kind,
        reason: e.to_string(),
    })?;
    <[u8; N]>::try_from(raw.as_slice()).map_err(|_| TypeParseError::InvalidLength {
        kind,
        expected: N,
        actual: raw.len(),
    })
}

// =============================================================================
// ADDRESS (20 bytes)
// =============================================================================

/// A 20-byte account or contract address.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, SerializeDisplay, DeserializeFromStr,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Creates an address from a 20-byte array.
    #[must_use]
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Address with every byte set to `byte`. Handy for fixtures.
    #[must_use]
    pub const fn repeat_byte(byte: u8) -> Self {
        Self([byte; 20])
    }

    /// Creates an address from a slice. Returns None if wrong length.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        <[u8; 20]>::try_from(slice).ok().map(Self)
    }

    /// Returns the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns true if this is the zero address.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Address {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed("address", s).map(Self)
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

// =============================================================================
// HASH (32 bytes)
// =============================================================================

/// A 32-byte hash: block hashes, transaction hashes, log topics, storage slots.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, SerializeDisplay, DeserializeFromStr,
)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The zero hash.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Creates a hash from a 32-byte array.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Left-pads `slice` with zeros into a hash. Returns None if longer than 32 bytes.
    #[must_use]
    pub fn from_be_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() > 32 {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes[32 - slice.len()..].copy_from_slice(slice);
        Some(Self(bytes))
    }

    /// Returns the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns true if this is the zero hash.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Hash {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed("hash", s).map(Self)
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

// =============================================================================
// LOGS & TRANSACTIONS
// =============================================================================

/// An event log emitted by a contract during transaction execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLog {
    /// Contract that emitted the log.
    pub address: Address,
    /// Indexed topics; the first is the event signature hash.
    pub topics: Vec<Hash>,
    /// ABI-encoded non-indexed event data.
    pub data: Vec<u8>,
    /// Block the emitting transaction was included in.
    pub block_number: u64,
    /// Hash of that block.
    pub block_hash: Hash,
    /// Hash of the emitting transaction.
    pub tx_hash: Hash,
    /// Position of the log within its block.
    pub log_index: u32,
}

impl ChainLog {
    /// First topic (the event signature), if any.
    #[must_use]
    pub fn event_topic(&self) -> Option<&Hash> {
        self.topics.first()
    }
}

/// A mined transaction as returned by the chain client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash.
    pub hash: Hash,
    /// Sender recovered from the transaction signature.
    pub from: Address,
    /// Recipient; `None` for contract creation.
    pub to: Option<Address>,
    /// Calldata. For private transactions this is the encrypted payload reference.
    pub data: Vec<u8>,
    /// Block the transaction was included in.
    pub block_number: u64,
}
