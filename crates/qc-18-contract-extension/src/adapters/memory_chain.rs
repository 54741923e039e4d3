//! # In-Memory Development Chain
//!
//! A single-process chain shared by several nodes. It records transactions,
//! mines one block per transaction and runs the extension management
//! contract as a native state machine:
//!
//! ```text
//! deploy ──► NewContractExtensionContractCreated
//! vote*  ──► AllNodesHaveVoted(outcome)     (once: first "no" or last "yes")
//! accept ──► (uuid stored)
//! setSharedStateHash ──► StateShared(hash, uuid) + ExtensionFinished
//! finish ──► ExtensionFinished
//! ```
//!
//! Each node attaches with its own encrypted store view and private state.
//! Transaction logs go to every node's receipt listener (where the
//! extension applier runs) before they are published on the log bus.

use crate::applier::ExtensionApplier;
use crate::domain::abi;
use crate::domain::{AccountDump, ExtensionError, TransactOpts};
use crate::events::{
    AllNodesHaveVoted, NewExtensionCreated, StateShared, ALL_NODES_HAVE_VOTED_TOPIC,
    EXTENSION_FINISHED_TOPIC, NEW_EXTENSION_TOPIC, STATE_SHARED_TOPIC,
};
use crate::ports::{
    AccountManager, ChainClient, EncryptedStore, ExtensionPorts, ManagementContract,
};
use crate::adapters::memory_state::InMemoryPrivateState;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sha3::{Digest, Keccak256};
use shared_bus::{InMemoryLogBus, LogFilter, LogPublisher, LogSubscription};
use shared_types::{Address, ChainLog, Hash, Transaction};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A node's private state, shared between its chain client and its applier.
pub type SharedPrivateState = Arc<tokio::sync::Mutex<InMemoryPrivateState>>;

/// Receives the logs of every executed transaction.
#[async_trait]
pub trait ReceiptListener: Send + Sync {
    /// Called once per transaction, in block order.
    async fn on_receipt(&self, logs: &[ChainLog]);
}

#[derive(Debug, Clone)]
struct ManagementState {
    creator: Address,
    voters: Vec<Address>,
    votes: HashMap<Address, bool>,
    recipient_hash: String,
    uuid: String,
    outcome: Option<bool>,
    finished: bool,
}

impl ManagementState {
    fn require_open(&self, contract: Address) -> Result<(), ExtensionError> {
        if self.finished {
            return Err(ExtensionError::Contract(format!(
                "extension {contract} already finished"
            )));
        }
        Ok(())
    }
}

/// A log before block placement.
struct PendingLog {
    address: Address,
    topic: Hash,
    data: Vec<u8>,
}

#[derive(Default)]
struct ChainState {
    head: u64,
    nonce: u64,
    transactions: HashMap<Hash, Transaction>,
    receipts: HashMap<Hash, Vec<ChainLog>>,
    contracts: HashMap<Address, ManagementState>,
}

impl ChainState {
    fn contract(&self, address: Address) -> Result<&ManagementState, ExtensionError> {
        self.contracts
            .get(&address)
            .ok_or_else(|| ExtensionError::Contract(format!("no management contract at {address}")))
    }

    fn contract_mut(&mut self, address: Address) -> Result<&mut ManagementState, ExtensionError> {
        self.contracts
            .get_mut(&address)
            .ok_or_else(|| ExtensionError::Contract(format!("no management contract at {address}")))
    }
}

fn keccak(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// The shared development chain.
pub struct InMemoryChain {
    bus: InMemoryLogBus,
    state: Mutex<ChainState>,
    listeners: RwLock<Vec<Arc<dyn ReceiptListener>>>,
    /// Serializes execution so logs are delivered in block order.
    producer: tokio::sync::Mutex<()>,
    reachable: AtomicBool,
}

impl InMemoryChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            bus: InMemoryLogBus::new(),
            state: Mutex::new(ChainState::default()),
            listeners: RwLock::new(Vec::new()),
            producer: tokio::sync::Mutex::new(()),
            reachable: AtomicBool::new(true),
        })
    }

    /// The log bus.
    #[must_use]
    pub fn bus(&self) -> &InMemoryLogBus {
        &self.bus
    }

    /// Simulates losing or regaining the chain connection.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Current block number.
    #[must_use]
    pub fn head(&self) -> u64 {
        self.state.lock().head
    }

    /// Logs emitted by a transaction.
    #[must_use]
    pub fn receipt(&self, tx_hash: &Hash) -> Option<Vec<ChainLog>> {
        self.state.lock().receipts.get(tx_hash).cloned()
    }

    /// Number of logs emitted so far with `topic`.
    #[must_use]
    pub fn count_logs(&self, topic: &Hash) -> usize {
        self.state
            .lock()
            .receipts
            .values()
            .flatten()
            .filter(|log| log.topics.first() == Some(topic))
            .count()
    }

    /// Acceptance token recorded on a management contract, if any.
    #[must_use]
    pub fn acceptance_token(&self, contract: &Address) -> Option<String> {
        self.state
            .lock()
            .contracts
            .get(contract)
            .map(|m| m.uuid.clone())
            .filter(|uuid| !uuid.is_empty())
    }

    /// Registers a receipt listener.
    pub fn add_listener(&self, listener: Arc<dyn ReceiptListener>) {
        self.listeners.write().push(listener);
    }

    /// Attaches a node with its own store view, wallet and private state.
    pub fn attach_node(
        self: &Arc<Self>,
        store: Arc<dyn EncryptedStore>,
        accounts: Arc<dyn AccountManager>,
    ) -> DevNode {
        let private_state: SharedPrivateState =
            Arc::new(tokio::sync::Mutex::new(InMemoryPrivateState::new()));

        self.add_listener(Arc::new(PrivateTransactionProcessor {
            applier: ExtensionApplier::new(store.clone()),
            state: private_state.clone(),
        }));

        let client = Arc::new(InMemoryChainClient {
            chain: self.clone(),
            store: store.clone(),
            private_state: private_state.clone(),
        });

        let ports = ExtensionPorts::new(client.clone(), client.clone(), store, accounts);
        DevNode {
            client,
            private_state,
            ports,
        }
    }

    fn ensure_reachable(&self) -> Result<(), ExtensionError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ExtensionError::ChainUnavailable(
                "development chain is offline".into(),
            ))
        }
    }

    /// Mines one transaction. `apply` mutates contract state and returns the
    /// logs to emit; an error leaves the chain untouched.
    async fn execute<F>(
        &self,
        from: Address,
        to: Option<Address>,
        data: Vec<u8>,
        apply: F,
    ) -> Result<Hash, ExtensionError>
    where
        F: FnOnce(&mut ChainState, Address) -> Result<Vec<PendingLog>, ExtensionError>,
    {
        self.ensure_reachable()?;
        let _producing = self.producer.lock().await;

        let (tx_hash, logs) = {
            let mut state = self.state.lock();
            let nonce = state.nonce.to_be_bytes();
            let created = Address::from_slice(&keccak(&[from.as_bytes().as_slice(), nonce.as_slice()])[12..])
                .unwrap_or_default();
            let pending = apply(&mut *state, created)?;

            state.nonce += 1;
            state.head += 1;
            let block_number = state.head;
            let block_hash = Hash::new(keccak(&[b"block".as_slice(), block_number.to_be_bytes().as_slice()]));
            let tx_hash = Hash::new(keccak(&[nonce.as_slice(), from.as_bytes().as_slice(), data.as_slice()]));

            let logs: Vec<ChainLog> = pending
                .into_iter()
                .enumerate()
                .map(|(i, log)| ChainLog {
                    address: log.address,
                    topics: vec![log.topic],
                    data: log.data,
                    block_number,
                    block_hash,
                    tx_hash,
                    log_index: i as u32,
                })
                .collect();

            state.transactions.insert(
                tx_hash,
                Transaction {
                    hash: tx_hash,
                    from,
                    to,
                    data,
                    block_number,
                },
            );
            state.receipts.insert(tx_hash, logs.clone());
            debug!(block = block_number, tx = %tx_hash, logs = logs.len(), "Dev chain mined transaction");
            (tx_hash, logs)
        };

        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener.on_receipt(&logs).await;
        }
        for log in logs {
            self.bus.publish(log).await;
        }

        Ok(tx_hash)
    }

    fn transaction(&self, hash: &Hash) -> Option<Transaction> {
        self.state.lock().transactions.get(hash).cloned()
    }

    fn read<T>(
        &self,
        contract: Address,
        f: impl FnOnce(&ManagementState) -> T,
    ) -> Result<T, ExtensionError> {
        self.ensure_reachable()?;
        let state = self.state.lock();
        state.contract(contract).map(f)
    }
}

// =============================================================================
// PER-NODE RECEIPT PROCESSING
// =============================================================================

struct PrivateTransactionProcessor {
    applier: ExtensionApplier,
    state: SharedPrivateState,
}

#[async_trait]
impl ReceiptListener for PrivateTransactionProcessor {
    async fn on_receipt(&self, logs: &[ChainLog]) {
        let mut state = self.state.lock().await;
        self.applier
            .check_extension_and_set_private_state(logs, &mut *state)
            .await;
    }
}

/// Handles to one attached node.
#[derive(Clone)]
pub struct DevNode {
    /// Chain client and management contract bindings.
    pub client: Arc<InMemoryChainClient>,
    /// The node's private state.
    pub private_state: SharedPrivateState,
    /// Ports bundle for the registry and API.
    pub ports: ExtensionPorts,
}

// =============================================================================
// PER-NODE CLIENT
// =============================================================================

/// One node's connection to the development chain.
pub struct InMemoryChainClient {
    chain: Arc<InMemoryChain>,
    store: Arc<dyn EncryptedStore>,
    private_state: SharedPrivateState,
}

impl InMemoryChainClient {
    /// The chain this client is attached to.
    #[must_use]
    pub fn chain(&self) -> &Arc<InMemoryChain> {
        &self.chain
    }
}

#[async_trait]
impl ChainClient for InMemoryChainClient {
    async fn block_number(&self) -> Result<u64, ExtensionError> {
        self.chain.ensure_reachable()?;
        Ok(self.chain.head())
    }

    fn subscribe_logs(&self, filter: LogFilter) -> Result<LogSubscription, ExtensionError> {
        self.chain.ensure_reachable()?;
        Ok(self.chain.bus.subscribe(filter))
    }

    async fn transaction_by_hash(&self, hash: Hash) -> Result<Option<Transaction>, ExtensionError> {
        self.chain.ensure_reachable()?;
        Ok(self.chain.transaction(&hash))
    }

    /// The development chain keeps only the latest private state, so
    /// `block_hash` is not consulted.
    async fn account_dump_at(
        &self,
        _block_hash: Hash,
        account: Address,
    ) -> Result<Option<AccountDump>, ExtensionError> {
        self.chain.ensure_reachable()?;
        Ok(self.private_state.lock().await.dump_account(&account))
    }
}

#[async_trait]
impl ManagementContract for InMemoryChainClient {
    async fn deploy(
        &self,
        opts: &TransactOpts,
        to_extend: Address,
        voters: &[Address],
        recipient_hash: &str,
    ) -> Result<Hash, ExtensionError> {
        let mut payload = abi::encode_address(&to_extend).to_vec();
        for voter in voters {
            payload.extend_from_slice(&abi::encode_address(voter));
        }
        payload.extend_from_slice(&abi::encode_strings(&[recipient_hash]));

        // Private deployments carry the encrypted store reference as data.
        let data = if opts.is_private() {
            self.store
                .send(&payload, &opts.private_from, &opts.private_for)
                .await?
                .as_bytes()
                .to_vec()
        } else {
            payload
        };

        let creator = opts.from;
        let voters = voters.to_vec();
        let recipient_hash = recipient_hash.to_string();
        self.chain
            .execute(creator, None, data, move |state, created| {
                state.contracts.insert(
                    created,
                    ManagementState {
                        creator,
                        voters,
                        votes: HashMap::new(),
                        recipient_hash,
                        uuid: String::new(),
                        outcome: None,
                        finished: false,
                    },
                );
                Ok(vec![PendingLog {
                    address: created,
                    topic: NEW_EXTENSION_TOPIC,
                    data: NewExtensionCreated { to_extend }.encode(),
                }])
            })
            .await
    }

    async fn do_vote(
        &self,
        opts: &TransactOpts,
        contract: Address,
        vote: bool,
    ) -> Result<Hash, ExtensionError> {
        let voter = opts.from;
        let data = abi::encode_bool(vote).to_vec();
        self.chain
            .execute(voter, Some(contract), data, move |state, _| {
                let management = state.contract_mut(contract)?;
                management.require_open(contract)?;
                if !management.voters.contains(&voter) {
                    return Err(ExtensionError::Contract(format!("{voter} may not vote")));
                }
                if management.outcome.is_some() {
                    return Err(ExtensionError::Contract("voting already complete".into()));
                }
                management.votes.insert(voter, vote);

                let all_yes = management
                    .voters
                    .iter()
                    .all(|v| management.votes.get(v) == Some(&true));
                let outcome = if !vote {
                    Some(false)
                } else if all_yes {
                    Some(true)
                } else {
                    None
                };

                Ok(match outcome {
                    Some(outcome) => {
                        management.outcome = Some(outcome);
                        vec![PendingLog {
                            address: contract,
                            topic: ALL_NODES_HAVE_VOTED_TOPIC,
                            data: AllNodesHaveVoted { outcome }.encode(),
                        }]
                    }
                    None => Vec::new(),
                })
            })
            .await
    }

    async fn share_accept_status(
        &self,
        opts: &TransactOpts,
        contract: Address,
        uuid: &str,
    ) -> Result<Hash, ExtensionError> {
        let uuid = uuid.to_string();
        let data = abi::encode_strings(&[&uuid]);
        self.chain
            .execute(opts.from, Some(contract), data, move |state, _| {
                let management = state.contract_mut(contract)?;
                management.require_open(contract)?;
                management.uuid = uuid;
                Ok(Vec::new())
            })
            .await
    }

    async fn set_shared_state_hash(
        &self,
        opts: &TransactOpts,
        contract: Address,
        hash: &str,
    ) -> Result<Hash, ExtensionError> {
        let sender = opts.from;
        let hash = hash.to_string();
        let data = abi::encode_strings(&[&hash]);
        self.chain
            .execute(sender, Some(contract), data, move |state, _| {
                let management = state.contract_mut(contract)?;
                management.require_open(contract)?;
                if management.creator != sender {
                    return Err(ExtensionError::Contract("only the creator may share state".into()));
                }
                if management.outcome != Some(true) {
                    return Err(ExtensionError::Contract("extension not approved".into()));
                }
                management.finished = true;

                let shared = StateShared {
                    hash,
                    uuid: management.uuid.clone(),
                };
                Ok(vec![
                    PendingLog {
                        address: contract,
                        topic: STATE_SHARED_TOPIC,
                        data: shared.encode(),
                    },
                    PendingLog {
                        address: contract,
                        topic: EXTENSION_FINISHED_TOPIC,
                        data: Vec::new(),
                    },
                ])
            })
            .await
    }

    async fn finish(&self, opts: &TransactOpts, contract: Address) -> Result<Hash, ExtensionError> {
        let sender = opts.from;
        self.chain
            .execute(sender, Some(contract), Vec::new(), move |state, _| {
                let management = state.contract_mut(contract)?;
                management.require_open(contract)?;
                if management.creator != sender {
                    return Err(ExtensionError::Contract("only the creator may finish".into()));
                }
                management.finished = true;
                Ok(vec![PendingLog {
                    address: contract,
                    topic: EXTENSION_FINISHED_TOPIC,
                    data: Vec::new(),
                }])
            })
            .await
    }

    async fn target_recipient_public_key_hash(
        &self,
        contract: Address,
    ) -> Result<String, ExtensionError> {
        self.chain.read(contract, |m| m.recipient_hash.clone())
    }

    async fn voters(&self, contract: Address) -> Result<Vec<Address>, ExtensionError> {
        self.chain.read(contract, |m| m.voters.clone())
    }

    async fn creator(&self, contract: Address) -> Result<Address, ExtensionError> {
        self.chain.read(contract, |m| m.creator)
    }

    async fn is_finished(&self, contract: Address) -> Result<bool, ExtensionError> {
        self.chain.read(contract, |m| m.finished)
    }
}
