//! # Extension Configuration
//!
//! Runtime parameters for the contract extension subsystem.
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `CONTRACT_EXTENSION_SERVER` | `store_url` | required |
//! | `QC_EXTENSION_UNDECODABLE` | `undecodable_policy` | `skip` |
//! | `QC_EXTENSION_DEAD_LETTERS` | `dead_letter_capacity` | 256 |

use crate::domain::ConfigError;
use shared_types::U256;
use std::path::{Path, PathBuf};

/// Environment variable holding the encrypted store address.
pub const STORE_URL_ENV: &str = "CONTRACT_EXTENSION_SERVER";

/// Environment variable selecting the undecodable-log policy.
pub const UNDECODABLE_POLICY_ENV: &str = "QC_EXTENSION_UNDECODABLE";

/// Environment variable bounding the dead-letter queue.
pub const DEAD_LETTER_CAPACITY_ENV: &str = "QC_EXTENSION_DEAD_LETTERS";

/// File name of the registry snapshot inside the node data directory.
pub const SNAPSHOT_FILE_NAME: &str = "activeExtensions.json";

/// Gas limit used when the caller supplies none.
pub const DEFAULT_GAS_LIMIT: u64 = 4_712_384;

/// What to do with a new-extension log that fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndecodablePolicy {
    /// Log and drop the event.
    #[default]
    Skip,
    /// Log and keep the raw log in the dead-letter queue.
    DeadLetter,
}

impl UndecodablePolicy {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "dead-letter" | "deadletter" | "dlq" => Ok(Self::DeadLetter),
            _ => Err(ConfigError::Invalid {
                key: UNDECODABLE_POLICY_ENV,
                value: value.to_string(),
            }),
        }
    }
}

/// Contract extension configuration.
#[derive(Debug, Clone)]
pub struct ExtensionConfig {
    /// Node instance directory holding the registry snapshot.
    pub data_dir: PathBuf,
    /// Encrypted store base URL.
    pub store_url: Option<String>,
    /// Gas limit for transactions whose arguments omit it.
    pub default_gas_limit: u64,
    /// Gas price for transactions whose arguments omit it.
    pub default_gas_price: U256,
    /// Maximum retained dead letters; oldest dropped first.
    pub dead_letter_capacity: usize,
    /// Handling of undecodable new-extension logs.
    pub undecodable_policy: UndecodablePolicy,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            store_url: None,
            default_gas_limit: DEFAULT_GAS_LIMIT,
            default_gas_price: U256::zero(),
            dead_letter_capacity: 256,
            undecodable_policy: UndecodablePolicy::Skip,
        }
    }
}

impl ExtensionConfig {
    /// Configuration rooted at `data_dir` with every other field defaulted.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Reads configuration from the process environment.
    pub fn from_env(data_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`. The store address is required.
    pub fn from_lookup<F>(data_dir: impl Into<PathBuf>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::with_data_dir(data_dir);

        let store_url = lookup(STORE_URL_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingStoreUrl(STORE_URL_ENV))?;
        config.store_url = Some(store_url);

        if let Some(policy) = lookup(UNDECODABLE_POLICY_ENV) {
            config.undecodable_policy = UndecodablePolicy::parse(&policy)?;
        }

        if let Some(capacity) = lookup(DEAD_LETTER_CAPACITY_ENV) {
            config.dead_letter_capacity =
                capacity.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: DEAD_LETTER_CAPACITY_ENV,
                    value: capacity.clone(),
                })?;
        }

        Ok(config)
    }

    /// Location of the registry snapshot.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        snapshot_path_in(&self.data_dir)
    }
}

/// Snapshot location inside an arbitrary directory.
#[must_use]
pub fn snapshot_path_in(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE_NAME)
}
