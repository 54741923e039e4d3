//! # Control API
//!
//! Operator-facing calls. Each one validates its preconditions, submits a
//! transaction and returns its hash; resulting state changes reach the
//! registry only through chain events.

use crate::config::ExtensionConfig;
use crate::domain::{ExtensionError, ExtensionRecord, ExtensionStatus, SendTxArgs};
use crate::ports::{ExtensionApi, ExtensionPorts};
use crate::registry::ExtensionRegistry;
use crate::transactor::TransactorFactory;
use async_trait::async_trait;
use shared_types::{Address, Hash};
use tracing::{info, instrument};

/// Payload stored to mint an acceptance token. Only the reference matters.
const ACCEPT_MARKER: &[u8] = b"extension-accept";

/// [`ExtensionApi`] backed by the registry and the node's ports.
#[derive(Clone)]
pub struct PrivateExtensionApi {
    registry: ExtensionRegistry,
    ports: ExtensionPorts,
    transactor: TransactorFactory,
}

impl PrivateExtensionApi {
    /// Creates the API.
    pub fn new(registry: ExtensionRegistry, ports: ExtensionPorts, config: &ExtensionConfig) -> Self {
        let transactor = TransactorFactory::new(ports.accounts.clone(), config);
        Self {
            registry,
            ports,
            transactor,
        }
    }

    /// The registry this API reads from.
    #[must_use]
    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    async fn ensure_open(&self, management_contract: Address) -> Result<(), ExtensionError> {
        if self.ports.contracts.is_finished(management_contract).await? {
            return Err(ExtensionError::ExtensionFinished(management_contract));
        }
        Ok(())
    }
}

#[async_trait]
impl ExtensionApi for PrivateExtensionApi {
    fn active_extension_contracts(&self) -> Vec<ExtensionRecord> {
        self.registry.active_extensions()
    }

    #[instrument(skip(self, new_recipient, voters, args), fields(to_extend = %to_extend))]
    async fn extend_contract(
        &self,
        to_extend: Address,
        new_recipient: &str,
        voters: Vec<Address>,
        args: SendTxArgs,
    ) -> Result<Hash, ExtensionError> {
        if new_recipient.trim().is_empty() {
            return Err(ExtensionError::EmptyRecipient);
        }
        if self
            .registry
            .active_extensions()
            .iter()
            .any(|record| record.contract_extended == to_extend)
        {
            return Err(ExtensionError::AlreadyUnderExtension(to_extend));
        }

        let opts = self.transactor.transact_opts(args)?;
        let recipient_hash = self
            .ports
            .store
            .send(new_recipient.as_bytes(), &opts.private_from, &[])
            .await?;

        let tx_hash = self
            .ports
            .contracts
            .deploy(&opts, to_extend, &voters, &recipient_hash.to_base64())
            .await?;

        info!(tx = %tx_hash, voters = voters.len(), "[qc-18] Extension proposed");
        Ok(tx_hash)
    }

    #[instrument(skip(self, args), fields(management_contract = %management_contract))]
    async fn vote_on_contract(
        &self,
        management_contract: Address,
        vote: bool,
        args: SendTxArgs,
    ) -> Result<Hash, ExtensionError> {
        self.ensure_open(management_contract).await?;
        let opts = self.transactor.transact_opts(args)?;

        let voters = self.ports.contracts.voters(management_contract).await?;
        if !voters.contains(&opts.from) {
            return Err(ExtensionError::NotVoter {
                voter: opts.from,
                management_contract,
            });
        }

        let tx_hash = self
            .ports
            .contracts
            .do_vote(&opts, management_contract, vote)
            .await?;
        info!(tx = %tx_hash, vote, "[qc-18] Vote submitted");
        Ok(tx_hash)
    }

    #[instrument(skip(self, args), fields(management_contract = %management_contract))]
    async fn accept(
        &self,
        management_contract: Address,
        args: SendTxArgs,
    ) -> Result<Hash, ExtensionError> {
        self.ensure_open(management_contract).await?;
        let opts = self.transactor.transact_opts(args)?;

        let token = self
            .ports
            .store
            .send(ACCEPT_MARKER, &opts.private_from, &[])
            .await?;

        let tx_hash = self
            .ports
            .contracts
            .share_accept_status(&opts, management_contract, &token.to_hex())
            .await?;
        info!(tx = %tx_hash, "[qc-18] Extension accepted");
        Ok(tx_hash)
    }

    #[instrument(skip(self, args), fields(management_contract = %management_contract))]
    async fn cancel(
        &self,
        management_contract: Address,
        args: SendTxArgs,
    ) -> Result<Hash, ExtensionError> {
        self.ensure_open(management_contract).await?;
        let opts = self.transactor.transact_opts(args)?;

        let creator = self.ports.contracts.creator(management_contract).await?;
        if creator != opts.from {
            return Err(ExtensionError::NotCreator {
                caller: opts.from,
                management_contract,
            });
        }

        let tx_hash = self.ports.contracts.finish(&opts, management_contract).await?;
        info!(tx = %tx_hash, "[qc-18] Extension cancelled");
        Ok(tx_hash)
    }

    async fn extension_status(
        &self,
        management_contract: Address,
    ) -> Result<ExtensionStatus, ExtensionError> {
        Ok(if self.ports.contracts.is_finished(management_contract).await? {
            ExtensionStatus::Done
        } else {
            ExtensionStatus::Active
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{EncryptedStore, ManagementContract};
    use crate::test_support::*;
    use tempfile::TempDir;

    struct Fixture {
        net: Net,
        api_a: PrivateExtensionApi,
        api_b: PrivateExtensionApi,
        _dirs: (TempDir, TempDir),
    }

    async fn fixture() -> Fixture {
        let net = net();
        let (dir_a, dir_b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let config_a = config_in(&dir_a);
        let config_b = config_in(&dir_b);

        let registry_a = ExtensionRegistry::initialize(config_a.clone(), net.a.ports.clone())
            .await
            .unwrap();
        let registry_b = ExtensionRegistry::initialize(config_b.clone(), net.b.ports.clone())
            .await
            .unwrap();

        Fixture {
            api_a: PrivateExtensionApi::new(registry_a, net.a.ports.clone(), &config_a),
            api_b: PrivateExtensionApi::new(registry_b, net.b.ports.clone(), &config_b),
            net,
            _dirs: (dir_a, dir_b),
        }
    }

    async fn propose(f: &Fixture) -> Address {
        let tx = f
            .api_a
            .extend_contract(TARGET, KEY_B, vec![VOTER_B, VOTER_C], args(INITIATOR))
            .await
            .unwrap();
        f.net.chain.receipt(&tx).unwrap()[0].address
    }

    #[tokio::test]
    async fn test_extend_records_encrypted_recipient() {
        let f = fixture().await;
        let mgmt = propose(&f).await;

        let reference = f.net.a.client.target_recipient_public_key_hash(mgmt).await.unwrap();
        let reference = crate::domain::EncryptedPayloadHash::from_base64(&reference).unwrap();
        let recipient = f.net.a.ports.store.receive(&reference).await.unwrap();
        assert_eq!(recipient.as_deref(), Some(KEY_B.as_bytes()));

        eventually(|| f.api_b.active_extension_contracts().len() == 1).await;
        assert_eq!(f.api_a.registry().active_extensions().len(), 1);
    }

    #[tokio::test]
    async fn test_extend_rejects_empty_recipient() {
        let f = fixture().await;
        let result = f
            .api_a
            .extend_contract(TARGET, "  ", vec![VOTER_B], args(INITIATOR))
            .await;
        assert!(matches!(result, Err(ExtensionError::EmptyRecipient)));
    }

    #[tokio::test]
    async fn test_extend_rejects_target_already_under_extension() {
        let f = fixture().await;
        propose(&f).await;
        eventually(|| f.api_a.active_extension_contracts().len() == 1).await;

        let result = f
            .api_a
            .extend_contract(TARGET, KEY_B, vec![VOTER_B], args(INITIATOR))
            .await;
        assert!(matches!(result, Err(ExtensionError::AlreadyUnderExtension(a)) if a == TARGET));
    }

    #[tokio::test]
    async fn test_extend_requires_local_wallet() {
        let f = fixture().await;
        let result = f
            .api_b
            .extend_contract(TARGET, KEY_B, vec![VOTER_B], args(INITIATOR))
            .await;
        assert!(matches!(result, Err(ExtensionError::NoWallet(a)) if a == INITIATOR));
    }

    #[tokio::test]
    async fn test_vote_rejects_non_voter() {
        let f = fixture().await;
        let mgmt = propose(&f).await;

        let result = f.api_a.vote_on_contract(mgmt, true, args(INITIATOR)).await;
        assert!(matches!(result, Err(ExtensionError::NotVoter { voter, .. }) if voter == INITIATOR));

        f.api_b.vote_on_contract(mgmt, true, args(VOTER_B)).await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_records_own_token() {
        let f = fixture().await;
        let mgmt = propose(&f).await;

        f.api_b.accept(mgmt, args(VOTER_B)).await.unwrap();

        let token = f.net.chain.acceptance_token(&mgmt).unwrap();
        let token = crate::domain::EncryptedPayloadHash::from_hex(&token).unwrap();
        assert!(f.net.b.ports.store.is_sender(&token).await.unwrap());
        assert!(!f.net.a.ports.store.is_sender(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_requires_creator_and_finishes() {
        let f = fixture().await;
        let mgmt = propose(&f).await;
        eventually(|| f.api_a.active_extension_contracts().len() == 1).await;

        let result = f.api_b.cancel(mgmt, args(VOTER_B)).await;
        assert!(matches!(result, Err(ExtensionError::NotCreator { caller, .. }) if caller == VOTER_B));
        assert_eq!(f.api_a.extension_status(mgmt).await.unwrap(), ExtensionStatus::Active);

        f.api_a.cancel(mgmt, args(INITIATOR)).await.unwrap();
        assert_eq!(f.api_a.extension_status(mgmt).await.unwrap(), ExtensionStatus::Done);
        eventually(|| f.api_a.active_extension_contracts().is_empty()).await;
        eventually(|| f.api_b.active_extension_contracts().is_empty()).await;

        let again = f.api_a.vote_on_contract(mgmt, true, args(VOTER_C)).await;
        assert!(matches!(again, Err(ExtensionError::ExtensionFinished(a)) if a == mgmt));
    }
}
