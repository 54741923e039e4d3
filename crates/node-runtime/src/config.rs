//! # Node Configuration
//!
//! Read once at startup from the process environment.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `QC_DATA_DIR` | node instance directory | `./data` |
//! | `QC_ACCOUNTS` | comma-separated local wallet addresses | none |
//! | `CONTRACT_EXTENSION_SERVER` | encrypted store URL | required |
//! | `QC_EXTENSION_UNDECODABLE` | `skip` or `dead-letter` | `skip` |
//! | `QC_EXTENSION_DEAD_LETTERS` | dead-letter capacity | 256 |

use qc_18_contract_extension::{ConfigError, ExtensionConfig};
use shared_types::{Address, TypeParseError};
use std::path::PathBuf;
use thiserror::Error;

/// Node instance directory variable.
pub const DATA_DIR_ENV: &str = "QC_DATA_DIR";

/// Local wallet variable.
pub const ACCOUNTS_ENV: &str = "QC_ACCOUNTS";

const DEFAULT_DATA_DIR: &str = "./data";

/// Startup configuration errors.
#[derive(Debug, Error)]
pub enum NodeConfigError {
    /// Contract extension settings are invalid.
    #[error(transparent)]
    Extension(#[from] ConfigError),

    /// An entry of `QC_ACCOUNTS` is not an address.
    #[error("Invalid account {value:?} in {ACCOUNTS_ENV}: {source}")]
    InvalidAccount {
        /// Offending entry.
        value: String,
        /// Parse failure.
        source: TypeParseError,
    },
}

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Accounts the local wallet can sign for.
    pub accounts: Vec<Address>,
    /// Contract extension subsystem settings.
    pub extension: ExtensionConfig,
}

impl NodeConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, NodeConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NodeConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup(DATA_DIR_ENV)
            .filter(|dir| !dir.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from);

        let accounts = lookup(ACCOUNTS_ENV)
            .map(|list| parse_accounts(&list))
            .transpose()?
            .unwrap_or_default();

        let extension = ExtensionConfig::from_lookup(data_dir, &lookup)?;
        Ok(Self {
            accounts,
            extension,
        })
    }
}

fn parse_accounts(list: &str) -> Result<Vec<Address>, NodeConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<Address>()
                .map_err(|source| NodeConfigError::InvalidAccount {
                    value: entry.to_string(),
                    source,
                })
        })
        .collect()
}
