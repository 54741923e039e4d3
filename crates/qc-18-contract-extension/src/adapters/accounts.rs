//! # Local Accounts
//!
//! Fixed set of accounts this node can sign for.

use crate::ports::AccountManager;
use shared_types::Address;
use std::collections::HashSet;

/// Accounts held by the local wallet.
#[derive(Debug, Clone, Default)]
pub struct LocalAccounts {
    accounts: HashSet<Address>,
}

impl LocalAccounts {
    /// Wallet holding `accounts`.
    pub fn new(accounts: impl IntoIterator<Item = Address>) -> Self {
        Self {
            accounts: accounts.into_iter().collect(),
        }
    }
}

impl AccountManager for LocalAccounts {
    fn contains(&self, account: &Address) -> bool {
        self.accounts.contains(account)
    }
}
