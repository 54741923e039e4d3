//! # Inbound Ports
//!
//! Control API offered to operators. Calls only submit transactions; the
//! registry learns about their effects through chain events.

use crate::domain::{ExtensionError, ExtensionRecord, ExtensionStatus, SendTxArgs};
use async_trait::async_trait;
use shared_types::{Address, Hash};

/// Contract extension API - inbound port.
#[async_trait]
pub trait ExtensionApi: Send + Sync {
    /// Records of every extension currently tracked.
    fn active_extension_contracts(&self) -> Vec<ExtensionRecord>;

    /// Proposes extending `to_extend` to `new_recipient`; returns the deployment tx.
    async fn extend_contract(
        &self,
        to_extend: Address,
        new_recipient: &str,
        voters: Vec<Address>,
        args: SendTxArgs,
    ) -> Result<Hash, ExtensionError>;

    /// Votes on an extension.
    async fn vote_on_contract(
        &self,
        management_contract: Address,
        vote: bool,
        args: SendTxArgs,
    ) -> Result<Hash, ExtensionError>;

    /// Records a fresh acceptance token for the recipient node.
    async fn accept(
        &self,
        management_contract: Address,
        args: SendTxArgs,
    ) -> Result<Hash, ExtensionError>;

    /// Cancels an extension.
    async fn cancel(
        &self,
        management_contract: Address,
        args: SendTxArgs,
    ) -> Result<Hash, ExtensionError>;

    /// Whether an extension is still running.
    async fn extension_status(
        &self,
        management_contract: Address,
    ) -> Result<ExtensionStatus, ExtensionError>;
}
