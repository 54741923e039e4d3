//! # Extension Applier
//!
//! Receiving side of the handshake. Runs for every executed transaction and
//! merges shared state only when the transaction is a state share addressed
//! to this node.
//!
//! ## State machine
//!
//! ```text
//! logs ─► shape check ─► decode ─► authorize (uuid is ours) ─► receive ─► parse ─► apply
//!            │              │            │                       │          │        │
//!          ignore         reject       reject                  reject     reject   revert + reject
//! ```
//!
//! Only the apply step mutates state, inside a snapshot that is reverted on
//! the first invalid field.

use crate::domain::{
    AccountDump, EncryptedPayloadHash, ExtensionError, SharedState,
};
use crate::events::{is_state_shared_log, StateShared};
use crate::ports::{EncryptedStore, PrivateStateDb};
use shared_types::{Address, ChainLog, Hash, U256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of inspecting one transaction's logs.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// Not a state-share transaction.
    NotExtension,
    /// A state share this node did not apply.
    Rejected(ExtensionError),
    /// Shared state merged.
    Applied {
        /// Accounts written.
        accounts: usize,
    },
}

/// Applies shared state received through the encrypted store.
#[derive(Clone)]
pub struct ExtensionApplier {
    store: Arc<dyn EncryptedStore>,
}

impl ExtensionApplier {
    /// Applier reading from `store`.
    pub fn new(store: Arc<dyn EncryptedStore>) -> Self {
        Self { store }
    }

    /// Entry point from transaction processing.
    ///
    /// A state share is exactly two logs whose first carries only the
    /// state-shared topic. Failures never propagate to the caller.
    pub async fn check_extension_and_set_private_state<S>(
        &self,
        logs: &[ChainLog],
        state: &mut S,
    ) -> ApplyOutcome
    where
        S: PrivateStateDb + ?Sized,
    {
        if logs.len() != 2 || !is_state_shared_log(&logs[0]) {
            return ApplyOutcome::NotExtension;
        }

        let shared = match StateShared::decode(&logs[0].data) {
            Ok(shared) => shared,
            Err(e) => {
                warn!(tx = %logs[0].tx_hash, error = %e, "[qc-18] Undecodable state-share log");
                return ApplyOutcome::Rejected(e.into());
            }
        };

        match self
            .handle_extension_request(&shared.hash, &shared.uuid, state)
            .await
        {
            Ok(accounts) => {
                info!(
                    management_contract = %logs[0].address,
                    accounts,
                    "[qc-18] Applied shared contract state"
                );
                ApplyOutcome::Applied { accounts }
            }
            Err(e) => {
                info!(
                    management_contract = %logs[0].address,
                    reason = %e,
                    "[qc-18] State share not applied"
                );
                ApplyOutcome::Rejected(e)
            }
        }
    }

    /// Authorizes, fetches, parses and applies one state share.
    ///
    /// Leaves `state` untouched on every error.
    pub async fn handle_extension_request<S>(
        &self,
        hash: &str,
        uuid: &str,
        state: &mut S,
    ) -> Result<usize, ExtensionError>
    where
        S: PrivateStateDb + ?Sized,
    {
        self.ensure_uuid_is_own(uuid).await?;
        let payload = self.fetch_shared_payload(hash).await?;

        let accounts: SharedState = serde_json::from_slice(&payload)
            .map_err(|e| ExtensionError::MalformedPayload(e.to_string()))?;

        apply_shared_state(state, &accounts)
    }

    async fn ensure_uuid_is_own(&self, uuid: &str) -> Result<(), ExtensionError> {
        if uuid.is_empty() {
            return Err(ExtensionError::AcceptanceMissing);
        }
        let token = EncryptedPayloadHash::from_hex(uuid)?;
        match self.store.is_sender(&token).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ExtensionError::NotSender),
            Err(e) => {
                debug!(error = %e, "[qc-18] isSender lookup failed");
                Err(ExtensionError::NotSender)
            }
        }
    }

    async fn fetch_shared_payload(&self, hash: &str) -> Result<Vec<u8>, ExtensionError> {
        let reference = EncryptedPayloadHash::from_base64(hash)?;
        match self.store.receive(&reference).await {
            Ok(Some(payload)) => Ok(payload),
            Ok(None) => Err(ExtensionError::NotShared),
            Err(e) => {
                debug!(error = %e, "[qc-18] Shared payload lookup failed");
                Err(ExtensionError::NotShared)
            }
        }
    }
}

/// Writes every account of `accounts` into `state`, all or nothing.
pub fn apply_shared_state<S>(state: &mut S, accounts: &SharedState) -> Result<usize, ExtensionError>
where
    S: PrivateStateDb + ?Sized,
{
    let snapshot = state.snapshot();

    for (key, account) in accounts {
        if let Err(e) = apply_account(state, key, &account.state) {
            warn!(account = %key, error = %e, "[qc-18] Reverting shared state apply");
            state.revert_to_snapshot(snapshot);
            return Err(e);
        }
    }

    Ok(accounts.len())
}

fn apply_account<S>(state: &mut S, key: &str, dump: &AccountDump) -> Result<(), ExtensionError>
where
    S: PrivateStateDb + ?Sized,
{
    let invalid = |reason: String| ExtensionError::InvalidAccount {
        account: key.to_string(),
        reason,
    };

    let address: Address = key.parse().map_err(|e| invalid(format!("address: {e}")))?;

    let balance = U256::from_dec_str(&dump.balance)
        .map_err(|_| invalid(format!("balance {:?} is not a decimal u256", dump.balance)))?;
    state.set_balance(address, balance);
    state.set_nonce(address, dump.nonce);

    let code = decode_hex(&dump.code).map_err(|e| invalid(format!("code: {e}")))?;
    state.set_code(address, code);

    for (slot, value) in &dump.storage {
        let slot = decode_word(slot).map_err(|e| invalid(format!("storage key {slot}: {e}")))?;
        let value =
            decode_word(value).map_err(|e| invalid(format!("storage value {value}: {e}")))?;
        state.set_storage(address, slot, value);
    }

    Ok(())
}

fn decode_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(text.strip_prefix("0x").unwrap_or(text))
}

/// Hex of at most 32 bytes, left-padded into a word.
fn decode_word(text: &str) -> Result<Hash, String> {
    let raw = decode_hex(text).map_err(|e| e.to_string())?;
    Hash::from_be_slice(&raw).ok_or_else(|| format!("{} bytes exceeds a word", raw.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryEncryptedStore, InMemoryPrivateState, InMemoryStoreNetwork};
    use crate::domain::{AbiError, AccountWithMetadata};
    use crate::events::{EXTENSION_FINISHED_TOPIC, STATE_SHARED_TOPIC};
    use std::collections::BTreeMap;

    const RECIPIENT: &str = "org-2-key";

    fn dump(balance: &str) -> AccountWithMetadata {
        AccountWithMetadata {
            state: AccountDump {
                balance: balance.to_string(),
                nonce: 4,
                code: "6080".into(),
                storage: BTreeMap::from([("01".to_string(), "0x0a".to_string())]),
                ..AccountDump::default()
            },
        }
    }

    fn shared(entries: &[(Address, &str)]) -> SharedState {
        entries
            .iter()
            .map(|(addr, balance)| (addr.to_string(), dump(balance)))
            .collect()
    }

    fn seeded_state() -> InMemoryPrivateState {
        let mut state = InMemoryPrivateState::new();
        for seed in [0x01, 0x02, 0x03] {
            let addr = Address::repeat_byte(seed);
            state.set_balance(addr, U256::from(seed));
            state.set_code(addr, vec![seed]);
            state.set_storage(addr, Hash::ZERO, Hash::new([seed; 32]));
        }
        state
    }

    struct Fixture {
        sender: InMemoryEncryptedStore,
        recipient: InMemoryEncryptedStore,
        applier: ExtensionApplier,
    }

    /// Applier running on the recipient node.
    fn fixture() -> Fixture {
        let network = InMemoryStoreNetwork::new();
        let sender = InMemoryEncryptedStore::new(network.clone(), "org-1-key");
        let recipient = InMemoryEncryptedStore::new(network, RECIPIENT);
        let applier = ExtensionApplier::new(Arc::new(recipient.clone()));
        Fixture {
            sender,
            recipient,
            applier,
        }
    }

    fn logs_for(event: &StateShared) -> Vec<ChainLog> {
        let base = ChainLog {
            address: Address::repeat_byte(0x77),
            topics: vec![STATE_SHARED_TOPIC],
            data: event.encode(),
            block_number: 9,
            block_hash: Hash::ZERO,
            tx_hash: Hash::new([9u8; 32]),
            log_index: 0,
        };
        let finished = ChainLog {
            topics: vec![EXTENSION_FINISHED_TOPIC],
            data: Vec::new(),
            log_index: 1,
            ..base.clone()
        };
        vec![base, finished]
    }

    #[tokio::test]
    async fn test_applies_state_addressed_to_us() {
        let f = fixture();
        let target = Address::repeat_byte(0xaa);
        let payload = serde_json::to_vec(&shared(&[(target, "1000")])).unwrap();
        let hash = f
            .sender
            .send(&payload, "", &[RECIPIENT.to_string()])
            .await
            .unwrap();
        let uuid = f.recipient.send(b"extension-data", "", &[]).await.unwrap();

        let event = StateShared {
            hash: hash.to_base64(),
            uuid: uuid.to_hex(),
        };
        let mut state = InMemoryPrivateState::new();
        let outcome = f
            .applier
            .check_extension_and_set_private_state(&logs_for(&event), &mut state)
            .await;

        assert!(matches!(outcome, ApplyOutcome::Applied { accounts: 1 }));
        let account = state.account(&target).unwrap();
        assert_eq!(account.balance, U256::from(1000));
        assert_eq!(account.nonce, 4);
        assert_eq!(account.code, vec![0x60, 0x80]);
        assert_eq!(
            account.storage[&Hash::from_be_slice(&[1]).unwrap()],
            Hash::from_be_slice(&[0x0a]).unwrap()
        );
    }

    #[tokio::test]
    async fn test_authorization_gate_rejects_foreign_uuid() {
        let f = fixture();
        let payload = serde_json::to_vec(&shared(&[(Address::repeat_byte(0xaa), "5")])).unwrap();
        let hash = f
            .sender
            .send(&payload, "", &[RECIPIENT.to_string()])
            .await
            .unwrap();
        // token created by another node
        let foreign = f.sender.send(b"extension-data", "", &[]).await.unwrap();

        let mut state = seeded_state();
        let root = state.state_root();

        let result = f
            .applier
            .handle_extension_request(&hash.to_base64(), &foreign.to_hex(), &mut state)
            .await;

        assert!(matches!(result, Err(ExtensionError::NotSender)));
        assert_eq!(state.state_root(), root);
    }

    #[tokio::test]
    async fn test_empty_uuid_means_never_accepted() {
        let f = fixture();
        let mut state = seeded_state();
        let root = state.state_root();

        let result = f
            .applier
            .handle_extension_request("irrelevant", "", &mut state)
            .await;

        assert!(matches!(result, Err(ExtensionError::AcceptanceMissing)));
        assert_eq!(state.state_root(), root);
    }

    #[tokio::test]
    async fn test_payload_not_shared_with_us() {
        let f = fixture();
        let hash = f.sender.send(b"{}", "", &["org-3-key".into()]).await.unwrap();
        let uuid = f.recipient.send(b"extension-data", "", &[]).await.unwrap();
        let mut state = InMemoryPrivateState::new();

        let result = f
            .applier
            .handle_extension_request(&hash.to_base64(), &uuid.to_hex(), &mut state)
            .await;
        assert!(matches!(result, Err(ExtensionError::NotShared)));
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let f = fixture();
        let hash = f
            .sender
            .send(b"not json", "", &[RECIPIENT.to_string()])
            .await
            .unwrap();
        let uuid = f.recipient.send(b"extension-data", "", &[]).await.unwrap();
        let mut state = InMemoryPrivateState::new();

        let result = f
            .applier
            .handle_extension_request(&hash.to_base64(), &uuid.to_hex(), &mut state)
            .await;
        assert!(matches!(result, Err(ExtensionError::MalformedPayload(_))));
    }

    #[test]
    fn test_atomic_apply_reverts_whole_batch() {
        let mut state = seeded_state();
        let before: Vec<_> = [0x01, 0x02, 0x03]
            .iter()
            .map(|s| state.account(&Address::repeat_byte(*s)).cloned())
            .collect();
        let root = state.state_root();

        // 0x01 and 0x02 sort before the broken 0x03 entry and get written first
        let batch = shared(&[
            (Address::repeat_byte(0x01), "777"),
            (Address::repeat_byte(0x02), "888"),
            (Address::repeat_byte(0x03), "12abc"),
        ]);

        let err = apply_shared_state(&mut state, &batch).unwrap_err();
        assert!(matches!(err, ExtensionError::InvalidAccount { .. }));

        assert_eq!(state.state_root(), root);
        let after: Vec<_> = [0x01, 0x02, 0x03]
            .iter()
            .map(|s| state.account(&Address::repeat_byte(*s)).cloned())
            .collect();
        assert_eq!(after, before);
    }

    #[test]
    fn test_invalid_storage_and_code_revert() {
        for broken in [
            AccountDump {
                balance: "1".into(),
                code: "zz".into(),
                ..AccountDump::default()
            },
            AccountDump {
                balance: "1".into(),
                storage: BTreeMap::from([("00".repeat(33), "01".to_string())]),
                ..AccountDump::default()
            },
        ] {
            let mut state = seeded_state();
            let root = state.state_root();
            let batch = SharedState::from([(
                Address::repeat_byte(0x09).to_string(),
                AccountWithMetadata { state: broken },
            )]);

            assert!(apply_shared_state(&mut state, &batch).is_err());
            assert_eq!(state.state_root(), root);
        }
    }

    #[tokio::test]
    async fn test_ignores_other_log_shapes() {
        let f = fixture();
        let event = StateShared {
            hash: String::new(),
            uuid: String::new(),
        };
        let mut logs = logs_for(&event);
        let mut state = InMemoryPrivateState::new();

        // one log only
        let single = vec![logs[0].clone()];
        assert!(matches!(
            f.applier
                .check_extension_and_set_private_state(&single, &mut state)
                .await,
            ApplyOutcome::NotExtension
        ));

        // state-shared topic not first
        logs.swap(0, 1);
        assert!(matches!(
            f.applier
                .check_extension_and_set_private_state(&logs, &mut state)
                .await,
            ApplyOutcome::NotExtension
        ));
    }

    #[tokio::test]
    async fn test_garbage_state_shared_data_rejected() {
        let f = fixture();
        let mut logs = logs_for(&StateShared {
            hash: String::new(),
            uuid: String::new(),
        });
        logs[0].data = vec![0xff; 7];
        let mut state = InMemoryPrivateState::new();

        assert!(matches!(
            f.applier
                .check_extension_and_set_private_state(&logs, &mut state)
                .await,
            ApplyOutcome::Rejected(ExtensionError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_overflowing_string_offset_rejected() {
        let f = fixture();
        let mut logs = logs_for(&StateShared {
            hash: String::new(),
            uuid: String::new(),
        });
        let mut data = vec![0u8; 64];
        data[24..32].copy_from_slice(&(u64::MAX - 31).to_be_bytes());
        logs[0].data = data;
        let mut state = InMemoryPrivateState::new();
        let root = state.state_root();

        assert!(matches!(
            f.applier
                .check_extension_and_set_private_state(&logs, &mut state)
                .await,
            ApplyOutcome::Rejected(ExtensionError::Decode(AbiError::OutOfBounds { .. }))
        ));
        assert_eq!(state.state_root(), root);
    }
}
