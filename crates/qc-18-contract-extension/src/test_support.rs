//! Two-node development network shared by the unit tests.

use crate::adapters::{
    AccountState, DevNode, InMemoryChain, InMemoryChainClient, InMemoryEncryptedStore,
    InMemoryStoreNetwork, LocalAccounts,
};
use crate::config::ExtensionConfig;
use crate::domain::{AccountDump, ExtensionError, SendTxArgs, TransactOpts};
use crate::events::ALL_NODES_HAVE_VOTED_TOPIC;
use crate::ports::{ChainClient, ExtensionPorts, ManagementContract};
use async_trait::async_trait;
use shared_bus::{LogFilter, LogSubscription};
use shared_types::{Address, Hash, Transaction, U256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const INITIATOR: Address = Address::repeat_byte(0x0a);
pub const VOTER_B: Address = Address::repeat_byte(0x0b);
pub const VOTER_C: Address = Address::repeat_byte(0x0c);
pub const TARGET: Address = Address::repeat_byte(0xaa);

pub const KEY_A: &str = "org-1-key";
pub const KEY_B: &str = "org-2-key";

pub struct Net {
    pub chain: Arc<InMemoryChain>,
    /// Holds the initiator and voter C.
    pub a: DevNode,
    /// Holds voter B; the extension recipient.
    pub b: DevNode,
}

pub fn net() -> Net {
    let chain = InMemoryChain::new();
    let network = InMemoryStoreNetwork::new();
    let a = chain.attach_node(
        Arc::new(InMemoryEncryptedStore::new(network.clone(), KEY_A)),
        Arc::new(LocalAccounts::new([INITIATOR, VOTER_C])),
    );
    let b = chain.attach_node(
        Arc::new(InMemoryEncryptedStore::new(network, KEY_B)),
        Arc::new(LocalAccounts::new([VOTER_B])),
    );
    Net { chain, a, b }
}

/// Gives node A a private copy of the target contract.
pub async fn seed_target(node: &DevNode) {
    let mut storage = BTreeMap::new();
    storage.insert(Hash::from_be_slice(&[1]).unwrap(), Hash::new([0x11; 32]));
    node.private_state.lock().await.insert_account(
        TARGET,
        AccountState {
            balance: U256::from(1_000u64),
            nonce: 3,
            code: vec![0x60, 0x80, 0x60, 0x40],
            storage,
        },
    );
}

pub fn config_in(dir: &tempfile::TempDir) -> ExtensionConfig {
    ExtensionConfig::with_data_dir(dir.path())
}

pub fn opts(from: Address, private_for: &[&str]) -> TransactOpts {
    TransactOpts {
        from,
        private_for: private_for.iter().map(|k| (*k).to_string()).collect(),
        gas_limit: 4_712_384,
        ..TransactOpts::default()
    }
}

pub fn args(from: Address) -> SendTxArgs {
    SendTxArgs {
        from,
        ..SendTxArgs::default()
    }
}

/// Deploys an extension of `TARGET` to node B, voted on by B and C.
pub async fn deploy_tx(net: &Net) -> Hash {
    net.a
        .client
        .deploy(
            &opts(INITIATOR, &[KEY_A]),
            TARGET,
            &[VOTER_B, VOTER_C],
            &recipient_reference(net).await,
        )
        .await
        .unwrap()
}

/// Like [`deploy_tx`], returning the management contract address.
pub async fn deploy(net: &Net) -> Address {
    let tx = deploy_tx(net).await;
    net.chain.receipt(&tx).unwrap()[0].address
}

/// Stores node B's key and returns its base64 reference.
pub async fn recipient_reference(net: &Net) -> String {
    use crate::ports::EncryptedStore;
    net.a
        .ports
        .store
        .send(KEY_B.as_bytes(), "", &[])
        .await
        .unwrap()
        .to_base64()
}

/// Polls `cond` until it holds or five seconds pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Management contract bindings that count share attempts.
pub struct CountingContracts {
    pub inner: Arc<InMemoryChainClient>,
    pub shares: AtomicUsize,
}

impl CountingContracts {
    pub fn wrap(node: &DevNode) -> (Arc<Self>, ExtensionPorts) {
        let counting = Arc::new(Self {
            inner: node.client.clone(),
            shares: AtomicUsize::new(0),
        });
        let mut ports = node.ports.clone();
        ports.contracts = counting.clone();
        (counting, ports)
    }

    pub fn shares(&self) -> usize {
        self.shares.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManagementContract for CountingContracts {
    async fn deploy(
        &self,
        opts: &TransactOpts,
        to_extend: Address,
        voters: &[Address],
        recipient_hash: &str,
    ) -> Result<Hash, ExtensionError> {
        self.inner.deploy(opts, to_extend, voters, recipient_hash).await
    }

    async fn do_vote(
        &self,
        opts: &TransactOpts,
        contract: Address,
        vote: bool,
    ) -> Result<Hash, ExtensionError> {
        self.inner.do_vote(opts, contract, vote).await
    }

    async fn share_accept_status(
        &self,
        opts: &TransactOpts,
        contract: Address,
        uuid: &str,
    ) -> Result<Hash, ExtensionError> {
        self.inner.share_accept_status(opts, contract, uuid).await
    }

    async fn set_shared_state_hash(
        &self,
        opts: &TransactOpts,
        contract: Address,
        hash: &str,
    ) -> Result<Hash, ExtensionError> {
        self.shares.fetch_add(1, Ordering::SeqCst);
        self.inner.set_shared_state_hash(opts, contract, hash).await
    }

    async fn finish(&self, opts: &TransactOpts, contract: Address) -> Result<Hash, ExtensionError> {
        self.inner.finish(opts, contract).await
    }

    async fn target_recipient_public_key_hash(
        &self,
        contract: Address,
    ) -> Result<String, ExtensionError> {
        self.inner.target_recipient_public_key_hash(contract).await
    }

    async fn voters(&self, contract: Address) -> Result<Vec<Address>, ExtensionError> {
        self.inner.voters(contract).await
    }

    async fn creator(&self, contract: Address) -> Result<Address, ExtensionError> {
        self.inner.creator(contract).await
    }

    async fn is_finished(&self, contract: Address) -> Result<bool, ExtensionError> {
        self.inner.is_finished(contract).await
    }
}

/// Chain client that refuses vote-completion subscriptions on demand.
pub struct RefusingVoteLogs {
    pub inner: Arc<InMemoryChainClient>,
    refusing: AtomicBool,
    refused: AtomicUsize,
}

impl RefusingVoteLogs {
    pub fn wrap(node: &DevNode) -> (Arc<Self>, ExtensionPorts) {
        let refusing = Arc::new(Self {
            inner: node.client.clone(),
            refusing: AtomicBool::new(false),
            refused: AtomicUsize::new(0),
        });
        let mut ports = node.ports.clone();
        ports.chain = refusing.clone();
        (refusing, ports)
    }

    pub fn refuse(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    pub fn refused(&self) -> usize {
        self.refused.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for RefusingVoteLogs {
    async fn block_number(&self) -> Result<u64, ExtensionError> {
        self.inner.block_number().await
    }

    fn subscribe_logs(&self, filter: LogFilter) -> Result<LogSubscription, ExtensionError> {
        let votes = filter
            .topics
            .first()
            .is_some_and(|slot| slot.contains(&ALL_NODES_HAVE_VOTED_TOPIC));
        if votes && self.refusing.load(Ordering::SeqCst) {
            self.refused.fetch_add(1, Ordering::SeqCst);
            return Err(ExtensionError::ChainUnavailable(
                "vote subscriptions refused".into(),
            ));
        }
        self.inner.subscribe_logs(filter)
    }

    async fn transaction_by_hash(&self, hash: Hash) -> Result<Option<Transaction>, ExtensionError> {
        self.inner.transaction_by_hash(hash).await
    }

    async fn account_dump_at(
        &self,
        block_hash: Hash,
        account: Address,
    ) -> Result<Option<AccountDump>, ExtensionError> {
        self.inner.account_dump_at(block_hash, account).await
    }
}
