//! # Domain Entities
//!
//! The extension record and the account-state dump shared with a new
//! participant.
//!
//! ## Persisted form
//!
//! Records serialize with the field names of the on-disk snapshot
//! (`address`, `allhavevoted`, `initiator`, `managementcontractaddress`,
//! `creationData`, `createdBlock`). `creationData` is base64.

use serde::{Deserialize, Serialize};
use shared_types::Address;
use std::collections::BTreeMap;

/// One outstanding or historical extension attempt.
///
/// Keyed by `management_contract`. The watcher cancellation handle lives in
/// the registry, never in the record, so it is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    /// Private contract being extended.
    #[serde(rename = "address")]
    pub contract_extended: Address,

    /// Set once the management contract reports unanimous approval.
    #[serde(rename = "allhavevoted")]
    pub all_have_voted: bool,

    /// Account that proposed the extension.
    pub initiator: Address,

    /// Coordination contract created for this request.
    #[serde(rename = "managementcontractaddress")]
    pub management_contract: Address,

    /// Data of the deployment transaction: the encrypted store reference
    /// naming the intended recipient's participants.
    #[serde(rename = "creationData", with = "base64_bytes")]
    pub creation_data: Vec<u8>,

    /// Block the management contract was created in; vote replay starts here.
    #[serde(rename = "createdBlock")]
    pub created_block: u64,
}

impl ExtensionRecord {
    /// Creates a record that has not been voted on yet.
    #[must_use]
    pub fn new(
        contract_extended: Address,
        initiator: Address,
        management_contract: Address,
        creation_data: Vec<u8>,
        created_block: u64,
    ) -> Self {
        Self {
            contract_extended,
            all_have_voted: false,
            initiator,
            management_contract,
            creation_data,
            created_block,
        }
    }

    /// Marks the vote as passed. Never reset.
    pub fn mark_voted(&mut self) {
        self.all_have_voted = true;
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// ACCOUNT STATE DUMP
// =============================================================================

/// Full state of one account as exchanged through the encrypted store.
///
/// Text fields are validated only when applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDump {
    /// Decimal balance.
    pub balance: String,
    /// Account nonce.
    pub nonce: u64,
    /// Storage root, informational.
    #[serde(default)]
    pub root: String,
    /// Code hash, informational.
    #[serde(rename = "codeHash", default)]
    pub code_hash: String,
    /// Hex bytecode.
    #[serde(default)]
    pub code: String,
    /// Hex storage slot -> hex value.
    #[serde(default)]
    pub storage: BTreeMap<String, String>,
}

/// Wrapper matching the shared payload layout `{ "<address>": { "state": {..} } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountWithMetadata {
    /// The account dump.
    pub state: AccountDump,
}

/// Payload sent to a new participant: account address (hex) -> state.
pub type SharedState = BTreeMap<String, AccountWithMetadata>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExtensionRecord {
        ExtensionRecord::new(
            Address::repeat_byte(0xaa),
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x77),
            vec![1, 2, 3, 250],
            42,
        )
    }

    #[test]
    fn test_new_record_not_voted() {
        assert!(!sample().all_have_voted);
    }

    #[test]
    fn test_mark_voted_is_sticky() {
        let mut record = sample();
        record.mark_voted();
        record.mark_voted();
        assert!(record.all_have_voted);
    }

    #[test]
    fn test_persisted_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        let object = json.as_object().unwrap();

        for key in [
            "address",
            "allhavevoted",
            "initiator",
            "managementcontractaddress",
            "creationData",
            "createdBlock",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert_eq!(object.len(), 6);
        assert_eq!(json["creationData"], "AQID+g==");
        assert_eq!(json["createdBlock"], 42);
    }

    #[test]
    fn test_record_json_roundtrip() {
        let record = sample();
        let text = serde_json::to_string(&record).unwrap();
        let back: ExtensionRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_shared_state_layout() {
        let text = r#"{"0x00000000000000000000000000000000000000aa":{"state":{"balance":"10","nonce":1,"codeHash":"ab","code":"6001","storage":{"01":"02"}}}}"#;
        let shared: SharedState = serde_json::from_str(text).unwrap();
        let dump = &shared["0x00000000000000000000000000000000000000aa"].state;
        assert_eq!(dump.balance, "10");
        assert_eq!(dump.code_hash, "ab");
        assert_eq!(dump.storage["01"], "02");
        assert!(dump.root.is_empty());
    }
}
