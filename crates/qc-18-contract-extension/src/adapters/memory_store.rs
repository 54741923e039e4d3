//! # In-Memory Encrypted Store
//!
//! A store network shared by several nodes in one process. Each node gets a
//! view bound to its own public key; a blob is visible to its sender and to
//! its recipients only.

use crate::domain::{EncryptedPayloadHash, ExtensionError, ENCRYPTED_PAYLOAD_HASH_LEN};
use crate::ports::EncryptedStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use sha3::{Digest, Sha3_512};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredBlob {
    payload: Vec<u8>,
    sender: String,
    recipients: Vec<String>,
}

impl StoredBlob {
    fn visible_to(&self, key: &str) -> bool {
        self.sender == key || self.recipients.iter().any(|r| r == key)
    }
}

/// Blobs shared by every node view.
#[derive(Debug, Default)]
pub struct InMemoryStoreNetwork {
    blobs: RwLock<HashMap<EncryptedPayloadHash, StoredBlob>>,
    sequence: AtomicU64,
}

impl InMemoryStoreNetwork {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

/// One node's view of the store network.
#[derive(Debug, Clone)]
pub struct InMemoryEncryptedStore {
    network: Arc<InMemoryStoreNetwork>,
    public_key: String,
}

impl InMemoryEncryptedStore {
    /// View for the node owning `public_key`.
    pub fn new(network: Arc<InMemoryStoreNetwork>, public_key: impl Into<String>) -> Self {
        Self {
            network,
            public_key: public_key.into(),
        }
    }

    /// This node's public key.
    #[must_use]
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    fn lookup(&self, hash: &EncryptedPayloadHash) -> Option<StoredBlob> {
        self.network
            .blobs
            .read()
            .get(hash)
            .filter(|blob| blob.visible_to(&self.public_key))
            .cloned()
    }
}

#[async_trait]
impl EncryptedStore for InMemoryEncryptedStore {
    async fn send(
        &self,
        payload: &[u8],
        from: &str,
        to: &[String],
    ) -> Result<EncryptedPayloadHash, ExtensionError> {
        let sender = if from.is_empty() {
            self.public_key.clone()
        } else {
            from.to_string()
        };

        // Every send yields a fresh reference, like real encryption nonces.
        let sequence = self.network.sequence.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha3_512::new();
        hasher.update(sequence.to_be_bytes());
        hasher.update(sender.as_bytes());
        hasher.update(payload);
        let mut bytes = [0u8; ENCRYPTED_PAYLOAD_HASH_LEN];
        bytes.copy_from_slice(&hasher.finalize());
        let hash = EncryptedPayloadHash::new(bytes);

        self.network.blobs.write().insert(
            hash,
            StoredBlob {
                payload: payload.to_vec(),
                sender,
                recipients: to.to_vec(),
            },
        );
        Ok(hash)
    }

    async fn receive(
        &self,
        hash: &EncryptedPayloadHash,
    ) -> Result<Option<Vec<u8>>, ExtensionError> {
        Ok(self.lookup(hash).map(|blob| blob.payload))
    }

    async fn participants(
        &self,
        hash: &EncryptedPayloadHash,
    ) -> Result<Vec<String>, ExtensionError> {
        self.lookup(hash)
            .map(|blob| blob.recipients)
            .ok_or_else(|| ExtensionError::Store(format!("unknown payload {hash}")))
    }

    async fn is_sender(&self, hash: &EncryptedPayloadHash) -> Result<bool, ExtensionError> {
        Ok(self
            .lookup(hash)
            .is_some_and(|blob| blob.sender == self.public_key))
    }
}
