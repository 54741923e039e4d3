//! # Share-Step Executor
//!
//! Runs on the initiator's node once a vote passes: re-encrypts the target
//! contract's private state for the new recipient and records the reference
//! on the management contract.

use crate::domain::{
    AccountWithMetadata, EncryptedPayloadHash, ExtensionError, ExtensionRecord, SendTxArgs,
    SharedState,
};
use crate::ports::ExtensionPorts;
use crate::transactor::TransactorFactory;
use shared_types::Hash;
use tracing::{debug, info};

/// Outcome of a share attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    /// The initiator is not a local account; another node shares.
    NotInitiator,
    /// State sent and its reference recorded.
    Shared {
        /// Encrypted state reference.
        state_hash: EncryptedPayloadHash,
        /// `setSharedStateHash` transaction.
        tx_hash: Hash,
    },
}

/// Performs the off-chain state hand-off.
#[derive(Clone)]
pub struct ShareStepExecutor {
    ports: ExtensionPorts,
    transactor: TransactorFactory,
}

impl ShareStepExecutor {
    /// Creates an executor.
    pub fn new(ports: ExtensionPorts, transactor: TransactorFactory) -> Self {
        Self { ports, transactor }
    }

    /// Shares the state of `record.contract_extended` as of `vote_block`.
    ///
    /// Any failure abandons the attempt; nothing is retried.
    pub async fn execute(
        &self,
        record: &ExtensionRecord,
        vote_block: Hash,
    ) -> Result<ShareOutcome, ExtensionError> {
        let management_contract = record.management_contract;

        // 1. only the initiator's node acts
        if !self.ports.accounts.contains(&record.initiator) {
            debug!(
                management_contract = %management_contract,
                "[qc-18] Initiator not local, skipping share step"
            );
            return Ok(ShareOutcome::NotInitiator);
        }

        // 2. participants of the original deployment
        let creation = EncryptedPayloadHash::from_slice(&record.creation_data)?;
        let participants = self.ports.store.participants(&creation).await?;
        let opts = self.transactor.transact_opts(SendTxArgs {
            from: record.initiator,
            private_for: participants,
            ..SendTxArgs::default()
        })?;

        // 3. resolve the new recipient
        let recipient_hash = self
            .ports
            .contracts
            .target_recipient_public_key_hash(management_contract)
            .await?;
        let recipient_ref = EncryptedPayloadHash::from_base64(&recipient_hash)?;
        let recipient = self
            .ports
            .store
            .receive(&recipient_ref)
            .await?
            .ok_or_else(|| ExtensionError::Store("recipient key not retrievable".into()))?;
        let recipient = String::from_utf8(recipient)
            .map_err(|_| ExtensionError::Store("recipient key is not UTF-8".into()))?;

        // 4. dump the contract state at the vote block
        let dump = self
            .ports
            .chain
            .account_dump_at(vote_block, record.contract_extended)
            .await?
            .ok_or_else(|| {
                ExtensionError::State(format!(
                    "no private state for {} at {vote_block}",
                    record.contract_extended
                ))
            })?;
        let shared = SharedState::from([(
            record.contract_extended.to_string(),
            AccountWithMetadata { state: dump },
        )]);
        let payload = serde_json::to_vec(&shared)
            .map_err(|e| ExtensionError::State(format!("dump serialization: {e}")))?;

        // 5. encrypt for the recipient only
        let state_hash = self.ports.store.send(&payload, "", &[recipient]).await?;

        // 6. record the reference on chain
        let tx_hash = self
            .ports
            .contracts
            .set_shared_state_hash(&opts, management_contract, &state_hash.to_base64())
            .await?;

        info!(
            management_contract = %management_contract,
            contract = %record.contract_extended,
            tx = %tx_hash,
            "[qc-18] Shared contract state with new participant"
        );
        Ok(ShareOutcome::Shared {
            state_hash,
            tx_hash,
        })
    }
}
