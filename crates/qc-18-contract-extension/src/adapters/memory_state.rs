//! # In-Memory Private State
//!
//! Private state database used by the development chain and by tests.
//! Snapshots copy the account map; reverting restores the copy.

use crate::domain::AccountDump;
use crate::ports::PrivateStateDb;
use sha3::{Digest, Keccak256};
use shared_types::{Address, Hash, U256};
use std::collections::BTreeMap;

/// State of one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountState {
    /// Balance.
    pub balance: U256,
    /// Nonce.
    pub nonce: u64,
    /// Bytecode.
    pub code: Vec<u8>,
    /// Storage slots.
    pub storage: BTreeMap<Hash, Hash>,
}

fn keccak(data: &[u8]) -> Hash {
    Hash::new(Keccak256::digest(data).into())
}

/// In-memory private state with snapshot/revert.
#[derive(Debug, Default)]
pub struct InMemoryPrivateState {
    accounts: BTreeMap<Address, AccountState>,
    snapshots: Vec<BTreeMap<Address, AccountState>>,
}

impl InMemoryPrivateState {
    /// Create a new empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces an account wholesale.
    pub fn insert_account(&mut self, address: Address, state: AccountState) {
        self.accounts.insert(address, state);
    }

    /// Reads an account.
    #[must_use]
    pub fn account(&self, address: &Address) -> Option<&AccountState> {
        self.accounts.get(address)
    }

    /// Exports an account in the shared dump format.
    #[must_use]
    pub fn dump_account(&self, address: &Address) -> Option<AccountDump> {
        let account = self.accounts.get(address)?;
        Some(AccountDump {
            balance: account.balance.to_string(),
            nonce: account.nonce,
            root: storage_root(&account.storage).to_string(),
            code_hash: hex::encode(keccak(&account.code).as_bytes()),
            code: hex::encode(&account.code),
            storage: account
                .storage
                .iter()
                .map(|(k, v)| (hex::encode(k.as_bytes()), hex::encode(v.as_bytes())))
                .collect(),
        })
    }

    fn account_mut(&mut self, address: Address) -> &mut AccountState {
        self.accounts.entry(address).or_default()
    }
}

fn storage_root(storage: &BTreeMap<Hash, Hash>) -> Hash {
    let mut hasher = Keccak256::new();
    for (key, value) in storage {
        hasher.update(key.as_bytes());
        hasher.update(value.as_bytes());
    }
    Hash::new(hasher.finalize().into())
}

impl PrivateStateDb for InMemoryPrivateState {
    fn snapshot(&mut self) -> usize {
        self.snapshots.push(self.accounts.clone());
        self.snapshots.len() - 1
    }

    fn revert_to_snapshot(&mut self, id: usize) {
        if id >= self.snapshots.len() {
            return;
        }
        self.snapshots.truncate(id + 1);
        if let Some(saved) = self.snapshots.pop() {
            self.accounts = saved;
        }
    }

    fn set_balance(&mut self, account: Address, balance: U256) {
        self.account_mut(account).balance = balance;
    }

    fn set_nonce(&mut self, account: Address, nonce: u64) {
        self.account_mut(account).nonce = nonce;
    }

    fn set_code(&mut self, account: Address, code: Vec<u8>) {
        self.account_mut(account).code = code;
    }

    fn set_storage(&mut self, account: Address, key: Hash, value: Hash) {
        self.account_mut(account).storage.insert(key, value);
    }

    fn state_root(&self) -> Hash {
        let mut hasher = Keccak256::new();
        for (address, account) in &self.accounts {
            let mut balance = [0u8; 32];
            account.balance.to_big_endian(&mut balance);

            hasher.update(address.as_bytes());
            hasher.update(balance);
            hasher.update(account.nonce.to_be_bytes());
            hasher.update(keccak(&account.code).as_bytes());
            hasher.update(storage_root(&account.storage).as_bytes());
        }
        Hash::new(hasher.finalize().into())
    }
}
