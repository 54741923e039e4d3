//! # Extension Events
//!
//! Topics and payloads of the events emitted by the management contract.
//!
//! | Event | Data | Consumed by |
//! |-------|------|-------------|
//! | `NewContractExtensionContractCreated` | `address toExtend` | new-extension watcher |
//! | `AllNodesHaveVoted` | `bool outcome` | per-record vote watcher |
//! | `StateShared` | `string hash, string uuid` | extension applier |
//! | `ExtensionFinished` | none | cancellation watcher |

use crate::domain::abi::{self, AbiError};
use shared_types::{Address, ChainLog, Hash};

const fn hex_nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit in topic"),
    }
}

const fn topic(text: &str) -> Hash {
    let raw = text.as_bytes();
    assert!(raw.len() == 66, "topic must be 0x + 64 hex digits");
    let mut out = [0u8; 32];
    let mut i = 0;
    while i < 32 {
        out[i] = (hex_nibble(raw[2 + 2 * i]) << 4) | hex_nibble(raw[3 + 2 * i]);
        i += 1;
    }
    Hash::new(out)
}

/// `NewContractExtensionContractCreated(address)`
pub const NEW_EXTENSION_TOPIC: Hash =
    topic("0x1bb7909ad96bc757f60de4d9ce11daf7b006e8f398ce028dceb10ce7fdca0f68");

/// `ExtensionFinished()`
pub const EXTENSION_FINISHED_TOPIC: Hash =
    topic("0x79c47b570b18a8a814b785800e5fcbf104e067663589cef1bba07756e3c6ede9");

/// `AllNodesHaveVoted(bool)`
pub const ALL_NODES_HAVE_VOTED_TOPIC: Hash =
    topic("0xc05e76a85299aba9028bd0e0c3ab6fd798db442ed25ce08eb9d2098acc5a2904");

/// `StateShared(string,string)`
pub const STATE_SHARED_TOPIC: Hash =
    topic("0x40b79448ff8678eac1487385427aa682ee6ee831ce0702c09f95255645428531");

/// A management contract was deployed for `to_extend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewExtensionCreated {
    /// Private contract to extend.
    pub to_extend: Address,
}

impl NewExtensionCreated {
    /// Decodes the log data.
    pub fn decode(data: &[u8]) -> Result<Self, AbiError> {
        Ok(Self {
            to_extend: abi::decode_address(data, 0)?,
        })
    }

    /// Encodes the log data.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        abi::encode_address(&self.to_extend).to_vec()
    }
}

/// Voting on a management contract concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllNodesHaveVoted {
    /// True when every voter approved.
    pub outcome: bool,
}

impl AllNodesHaveVoted {
    /// Decodes the log data.
    pub fn decode(data: &[u8]) -> Result<Self, AbiError> {
        Ok(Self {
            outcome: abi::decode_bool(data, 0)?,
        })
    }

    /// Encodes the log data.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        abi::encode_bool(self.outcome).to_vec()
    }
}

/// The initiator recorded the encrypted state reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateShared {
    /// Base64 reference of the encrypted account dump.
    pub hash: String,
    /// Hex acceptance token recorded by the recipient; empty if never accepted.
    pub uuid: String,
}

impl StateShared {
    /// Decodes the log data.
    pub fn decode(data: &[u8]) -> Result<Self, AbiError> {
        Ok(Self {
            hash: abi::decode_string(data, 0)?,
            uuid: abi::decode_string(data, 1)?,
        })
    }

    /// Encodes the log data.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        abi::encode_strings(&[&self.hash, &self.uuid])
    }
}

/// Whether `log` is a state-share log: exactly one topic, the state-shared one.
#[must_use]
pub fn is_state_shared_log(log: &ChainLog) -> bool {
    log.topics.len() == 1 && log.topics[0] == STATE_SHARED_TOPIC
}
