//! # Outbound Ports
//!
//! Collaborators the extension protocol drives: the encrypted store, the
//! chain client, the management contract bindings, the local wallet and the
//! private state database.

use crate::domain::{AccountDump, EncryptedPayloadHash, ExtensionError, TransactOpts};
use async_trait::async_trait;
use shared_bus::{LogFilter, LogSubscription};
use shared_types::{Address, Hash, Transaction, U256};
use std::sync::Arc;

/// Content-addressed store of encrypted blobs (private transaction manager).
#[async_trait]
pub trait EncryptedStore: Send + Sync {
    /// Encrypts `payload` from `from` (empty = store default key) to `to`.
    async fn send(
        &self,
        payload: &[u8],
        from: &str,
        to: &[String],
    ) -> Result<EncryptedPayloadHash, ExtensionError>;

    /// Fetches a blob. `Ok(None)` when the blob is unknown or not visible to this node.
    async fn receive(
        &self,
        hash: &EncryptedPayloadHash,
    ) -> Result<Option<Vec<u8>>, ExtensionError>;

    /// Recipients of a blob this node can see.
    async fn participants(&self, hash: &EncryptedPayloadHash)
        -> Result<Vec<String>, ExtensionError>;

    /// Whether this node created the blob.
    async fn is_sender(&self, hash: &EncryptedPayloadHash) -> Result<bool, ExtensionError>;
}

/// Chain access needed by the registry and the share step.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head; doubles as a reachability probe.
    async fn block_number(&self) -> Result<u64, ExtensionError>;

    /// Opens a log subscription.
    fn subscribe_logs(&self, filter: LogFilter) -> Result<LogSubscription, ExtensionError>;

    /// Looks up a mined transaction.
    async fn transaction_by_hash(&self, hash: Hash) -> Result<Option<Transaction>, ExtensionError>;

    /// Dumps one account of the private state as of `block_hash`.
    async fn account_dump_at(
        &self,
        block_hash: Hash,
        account: Address,
    ) -> Result<Option<AccountDump>, ExtensionError>;
}

/// Bindings of the on-chain extension management contract.
///
/// Every transacting method returns the submitted transaction's hash.
#[async_trait]
pub trait ManagementContract: Send + Sync {
    /// Deploys a management contract for `to_extend`.
    async fn deploy(
        &self,
        opts: &TransactOpts,
        to_extend: Address,
        voters: &[Address],
        recipient_hash: &str,
    ) -> Result<Hash, ExtensionError>;

    /// Casts the sender's vote.
    async fn do_vote(
        &self,
        opts: &TransactOpts,
        contract: Address,
        vote: bool,
    ) -> Result<Hash, ExtensionError>;

    /// Records the recipient's acceptance token.
    async fn share_accept_status(
        &self,
        opts: &TransactOpts,
        contract: Address,
        uuid: &str,
    ) -> Result<Hash, ExtensionError>;

    /// Records the encrypted state reference; emits `StateShared` then `ExtensionFinished`.
    async fn set_shared_state_hash(
        &self,
        opts: &TransactOpts,
        contract: Address,
        hash: &str,
    ) -> Result<Hash, ExtensionError>;

    /// Cancels the extension; emits `ExtensionFinished`.
    async fn finish(&self, opts: &TransactOpts, contract: Address) -> Result<Hash, ExtensionError>;

    /// Base64 reference naming the new recipient's store key.
    async fn target_recipient_public_key_hash(
        &self,
        contract: Address,
    ) -> Result<String, ExtensionError>;

    /// Accounts allowed to vote.
    async fn voters(&self, contract: Address) -> Result<Vec<Address>, ExtensionError>;

    /// Account that deployed the contract.
    async fn creator(&self, contract: Address) -> Result<Address, ExtensionError>;

    /// Whether the extension finished or was cancelled.
    async fn is_finished(&self, contract: Address) -> Result<bool, ExtensionError>;
}

/// Local wallet lookup.
pub trait AccountManager: Send + Sync {
    /// Whether this node can sign for `account`.
    fn contains(&self, account: &Address) -> bool;
}

/// Mutable private state database with snapshot/revert.
pub trait PrivateStateDb: Send {
    /// Takes a snapshot and returns its id.
    fn snapshot(&mut self) -> usize;

    /// Restores the state captured by `id`, discarding later snapshots.
    fn revert_to_snapshot(&mut self, id: usize);

    /// Sets an account balance.
    fn set_balance(&mut self, account: Address, balance: U256);

    /// Sets an account nonce.
    fn set_nonce(&mut self, account: Address, nonce: u64);

    /// Replaces an account's code.
    fn set_code(&mut self, account: Address, code: Vec<u8>);

    /// Writes one storage slot.
    fn set_storage(&mut self, account: Address, key: Hash, value: Hash);

    /// Commitment over the whole state.
    fn state_root(&self) -> Hash;
}

/// The outbound collaborators, bundled for the registry, share step and API.
#[derive(Clone)]
pub struct ExtensionPorts {
    /// Chain client.
    pub chain: Arc<dyn ChainClient>,
    /// Management contract bindings.
    pub contracts: Arc<dyn ManagementContract>,
    /// Encrypted store.
    pub store: Arc<dyn EncryptedStore>,
    /// Local wallet.
    pub accounts: Arc<dyn AccountManager>,
}

impl ExtensionPorts {
    /// Bundles the collaborators.
    pub fn new(
        chain: Arc<dyn ChainClient>,
        contracts: Arc<dyn ManagementContract>,
        store: Arc<dyn EncryptedStore>,
        accounts: Arc<dyn AccountManager>,
    ) -> Self {
        Self {
            chain,
            contracts,
            store,
            accounts,
        }
    }
}
