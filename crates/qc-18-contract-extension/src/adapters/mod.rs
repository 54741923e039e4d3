//! # Adapters
//!
//! Implementations of the outbound ports.
//!
//! | Adapter | Port | Backing |
//! |---------|------|---------|
//! | `HttpEncryptedStore` | `EncryptedStore` | Tessera-style HTTP API |
//! | `InMemoryEncryptedStore` | `EncryptedStore` | shared in-process network |
//! | `InMemoryChainClient` | `ChainClient`, `ManagementContract` | development chain |
//! | `InMemoryPrivateState` | `PrivateStateDb` | account map |
//! | `LocalAccounts` | `AccountManager` | fixed account set |
//! | `SnapshotFile` | (registry persistence) | JSON file |

pub mod accounts;
pub mod http_store;
pub mod memory_chain;
pub mod memory_state;
pub mod memory_store;
pub mod snapshot_file;

pub use accounts::LocalAccounts;
pub use http_store::HttpEncryptedStore;
pub use memory_chain::{DevNode, InMemoryChain, InMemoryChainClient, ReceiptListener, SharedPrivateState};
pub use memory_state::{AccountState, InMemoryPrivateState};
pub use memory_store::{InMemoryEncryptedStore, InMemoryStoreNetwork};
pub use snapshot_file::{RegistrySnapshot, SnapshotFile};
