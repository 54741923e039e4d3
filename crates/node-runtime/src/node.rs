//! # Node Assembly
//!
//! Wires one development node: the HTTP encrypted store, the local wallet, a
//! node attached to an in-memory chain, the extension registry and its
//! control API.

use crate::config::NodeConfig;
use anyhow::{Context, Result};
use qc_18_contract_extension::adapters::{DevNode, HttpEncryptedStore, InMemoryChain, LocalAccounts};
use qc_18_contract_extension::{ExtensionRegistry, PrivateExtensionApi};
use std::sync::Arc;
use tracing::info;

/// A running node.
pub struct NodeRuntime {
    chain: Arc<InMemoryChain>,
    node: DevNode,
    registry: ExtensionRegistry,
    api: PrivateExtensionApi,
}

impl NodeRuntime {
    /// Connects to the encrypted store and starts the extension subsystem.
    ///
    /// Fails when the store is unreachable, the snapshot is corrupt or the
    /// chain cannot be subscribed to.
    pub async fn start(config: NodeConfig) -> Result<Self> {
        let store_url = config
            .extension
            .store_url
            .as_deref()
            .context("encrypted store address not configured")?;
        let store = HttpEncryptedStore::new(store_url).context("invalid encrypted store address")?;
        store
            .upcheck()
            .await
            .with_context(|| format!("encrypted store at {store_url} is unreachable"))?;
        info!(url = %store_url, "[qc-18] Encrypted store reachable");

        let chain = InMemoryChain::new();
        let node = chain.attach_node(
            Arc::new(store),
            Arc::new(LocalAccounts::new(config.accounts.iter().copied())),
        );

        let registry = ExtensionRegistry::initialize(config.extension.clone(), node.ports.clone())
            .await
            .context("failed to start contract extension registry")?;
        let api = PrivateExtensionApi::new(registry.clone(), node.ports.clone(), &config.extension);

        info!(
            data_dir = %config.extension.data_dir.display(),
            accounts = config.accounts.len(),
            active = registry.active_extensions().len(),
            "Node started"
        );
        Ok(Self {
            chain,
            node,
            registry,
            api,
        })
    }

    /// The development chain this node is attached to.
    pub fn chain(&self) -> &Arc<InMemoryChain> {
        &self.chain
    }

    /// Handles to the attached node.
    pub fn node(&self) -> &DevNode {
        &self.node
    }

    /// Control API.
    pub fn api(&self) -> &PrivateExtensionApi {
        &self.api
    }

    /// Persists the registry and stops its watchers.
    pub fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown...");
        self.registry
            .shutdown()
            .context("final extension snapshot write failed")?;
        info!("Shutdown complete");
        Ok(())
    }
}
