//! # Transaction Options
//!
//! Resolves caller arguments into signing options, filling gas defaults and
//! refusing accounts the local wallet does not hold.

use crate::config::ExtensionConfig;
use crate::domain::{ExtensionError, SendTxArgs, TransactOpts};
use crate::ports::AccountManager;
use shared_types::U256;
use std::sync::Arc;

/// Builds [`TransactOpts`] for this node's wallet.
#[derive(Clone)]
pub struct TransactorFactory {
    accounts: Arc<dyn AccountManager>,
    default_gas_limit: u64,
    default_gas_price: U256,
}

impl TransactorFactory {
    /// Factory using the gas defaults of `config`.
    pub fn new(accounts: Arc<dyn AccountManager>, config: &ExtensionConfig) -> Self {
        Self {
            accounts,
            default_gas_limit: config.default_gas_limit,
            default_gas_price: config.default_gas_price,
        }
    }

    /// Resolves `args`.
    ///
    /// # Errors
    ///
    /// `NoWallet` when `args.from` is not a local account.
    pub fn transact_opts(&self, args: SendTxArgs) -> Result<TransactOpts, ExtensionError> {
        if !self.accounts.contains(&args.from) {
            return Err(ExtensionError::NoWallet(args.from));
        }

        Ok(TransactOpts {
            from: args.from,
            private_from: args.private_from,
            private_for: args.private_for,
            gas_limit: args.gas.unwrap_or(self.default_gas_limit),
            gas_price: args.gas_price.unwrap_or(self.default_gas_price),
        })
    }
}
