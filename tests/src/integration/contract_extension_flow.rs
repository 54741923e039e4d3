//! # Contract Extension Flow
//!
//! Two nodes share one development chain and one encrypted store network:
//!
//! - node A holds the initiator and voter C, and a private copy of the target
//! - node B holds voter B and is the new recipient (`org-2-key`)
//!
//! ```text
//! A: extend ──► both registries track the record
//! B: accept
//! B, C: vote yes ──► A shares state ──► B applies it ──► records removed
//! ```

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use qc_18_contract_extension::adapters::{
        AccountState, DevNode, InMemoryChain, InMemoryEncryptedStore, InMemoryStoreNetwork,
        LocalAccounts,
    };
    use qc_18_contract_extension::events::STATE_SHARED_TOPIC;
    use qc_18_contract_extension::{
        ExtensionApi, ExtensionConfig, ExtensionRegistry, ExtensionStatus, PrivateExtensionApi,
        SendTxArgs,
    };
    use shared_types::{Address, Hash, U256};
    use tempfile::TempDir;

    const TARGET: Address = Address::repeat_byte(0xaa);
    const INITIATOR: Address = Address::repeat_byte(0x0a);
    const VOTER_B: Address = Address::repeat_byte(0x0b);
    const VOTER_C: Address = Address::repeat_byte(0x0c);

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Node {
        dev: DevNode,
        api: PrivateExtensionApi,
        _dir: TempDir,
    }

    struct Network {
        chain: Arc<InMemoryChain>,
        a: Node,
        b: Node,
    }

    async fn start_node(
        chain: &Arc<InMemoryChain>,
        stores: &Arc<InMemoryStoreNetwork>,
        key: &str,
        accounts: &[Address],
    ) -> Node {
        let dir = TempDir::new().unwrap();
        let config = ExtensionConfig::with_data_dir(dir.path());
        let dev = chain.attach_node(
            Arc::new(InMemoryEncryptedStore::new(stores.clone(), key)),
            Arc::new(LocalAccounts::new(accounts.iter().copied())),
        );
        let registry = ExtensionRegistry::initialize(config.clone(), dev.ports.clone())
            .await
            .unwrap();
        let api = PrivateExtensionApi::new(registry, dev.ports.clone(), &config);
        Node {
            dev,
            api,
            _dir: dir,
        }
    }

    async fn network() -> Network {
        let chain = InMemoryChain::new();
        let stores = InMemoryStoreNetwork::new();
        let a = start_node(&chain, &stores, "org-1-key", &[INITIATOR, VOTER_C]).await;
        let b = start_node(&chain, &stores, "org-2-key", &[VOTER_B]).await;

        let mut storage = BTreeMap::new();
        storage.insert(Hash::from_be_slice(&[0]).unwrap(), Hash::from_be_slice(&[42]).unwrap());
        storage.insert(Hash::from_be_slice(&[1]).unwrap(), Hash::new([0xfe; 32]));
        a.dev.private_state.lock().await.insert_account(
            TARGET,
            AccountState {
                balance: U256::from(5_000_000u64),
                nonce: 1,
                code: vec![0x60, 0x80, 0x60, 0x40, 0x52],
                storage,
            },
        );

        Network { chain, a, b }
    }

    fn from(account: Address) -> SendTxArgs {
        SendTxArgs {
            from: account,
            ..SendTxArgs::default()
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached within 5s");
    }

    async fn propose(net: &Network) -> Address {
        let args = SendTxArgs {
            from: INITIATOR,
            private_for: vec!["org-1-key".into()],
            ..SendTxArgs::default()
        };
        let tx = net
            .a
            .api
            .extend_contract(TARGET, "org-2-key", vec![VOTER_B, VOTER_C], args)
            .await
            .unwrap();
        let mgmt = net.chain.receipt(&tx).unwrap()[0].address;

        wait_until(|| {
            net.a.api.active_extension_contracts().len() == 1
                && net.b.api.active_extension_contracts().len() == 1
        })
        .await;
        mgmt
    }

    // =============================================================================
    // FLOWS
    // =============================================================================

    #[tokio::test]
    async fn test_extension_shares_state_with_new_recipient() {
        let net = network().await;
        let mgmt = propose(&net).await;

        for api in [&net.a.api, &net.b.api] {
            let records = api.active_extension_contracts();
            assert_eq!(records[0].management_contract, mgmt);
            assert_eq!(records[0].contract_extended, TARGET);
            assert_eq!(records[0].initiator, INITIATOR);
            assert!(!records[0].all_have_voted);
        }
        assert_eq!(
            net.a.api.extension_status(mgmt).await.unwrap(),
            ExtensionStatus::Active
        );

        net.b.api.accept(mgmt, from(VOTER_B)).await.unwrap();
        net.b.api.vote_on_contract(mgmt, true, from(VOTER_B)).await.unwrap();
        net.a.api.vote_on_contract(mgmt, true, from(VOTER_C)).await.unwrap();

        wait_until(|| {
            net.a.api.active_extension_contracts().is_empty()
                && net.b.api.active_extension_contracts().is_empty()
        })
        .await;

        assert_eq!(net.chain.count_logs(&STATE_SHARED_TOPIC), 1);
        assert_eq!(
            net.a.api.extension_status(mgmt).await.unwrap(),
            ExtensionStatus::Done
        );

        let original = net.a.dev.private_state.lock().await.dump_account(&TARGET);
        let received = net.b.dev.private_state.lock().await.dump_account(&TARGET);
        assert!(received.is_some());
        assert_eq!(received, original);
    }

    #[tokio::test]
    async fn test_recipient_without_acceptance_ignores_shared_state() {
        let net = network().await;
        let mgmt = propose(&net).await;

        net.b.api.vote_on_contract(mgmt, true, from(VOTER_B)).await.unwrap();
        net.a.api.vote_on_contract(mgmt, true, from(VOTER_C)).await.unwrap();

        wait_until(|| net.b.api.active_extension_contracts().is_empty()).await;

        assert_eq!(net.chain.count_logs(&STATE_SHARED_TOPIC), 1);
        assert!(net.b.dev.private_state.lock().await.dump_account(&TARGET).is_none());
    }

    #[tokio::test]
    async fn test_voted_down_extension_waits_for_cancel() {
        let net = network().await;
        let mgmt = propose(&net).await;

        net.b.api.accept(mgmt, from(VOTER_B)).await.unwrap();
        net.b.api.vote_on_contract(mgmt, false, from(VOTER_B)).await.unwrap();

        // Voting is over but nothing is shared and the record stays.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(net.chain.count_logs(&STATE_SHARED_TOPIC), 0);
        let records = net.a.api.active_extension_contracts();
        assert_eq!(records.len(), 1);
        assert!(!records[0].all_have_voted);

        net.a.api.cancel(mgmt, from(INITIATOR)).await.unwrap();
        wait_until(|| {
            net.a.api.active_extension_contracts().is_empty()
                && net.b.api.active_extension_contracts().is_empty()
        })
        .await;
        assert!(net.b.dev.private_state.lock().await.dump_account(&TARGET).is_none());
    }
}
