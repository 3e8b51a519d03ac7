//! The seam between the orchestration core and the network.
//!
//! The core never talks to a node directly. Everything goes through
//! [`ChainClient`], which keeps signing, transport and confirmation waiting
//! outside of the pipeline logic.

use std::future::Future;

use alloy_core::primitives::{Address, Bytes, TxHash};
use serde::{Deserialize, Serialize};

use crate::errors::ClientError;

/// A contract-creation transaction with an explicitly assigned nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    /// Name of the artifact being created, for logging and test doubles.
    pub artifact: String,
    /// Bytecode followed by the ABI-encoded constructor arguments.
    pub init_code: Bytes,
    pub nonce: u64,
    pub gas_price: u128,
}

/// A state-mutating call with an explicitly assigned nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
    pub nonce: u64,
    pub gas_price: u128,
}

/// Inclusion receipt for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    /// Address of the created contract, for contract-creation transactions.
    pub contract_address: Option<Address>,
    /// Whether execution succeeded. A reverted transaction is still included.
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Network access used by a deployment run.
///
/// Implementations own the timeout policy for confirmations: the pipeline
/// waits as long as [`ChainClient::wait_for_receipt`] does and surfaces the
/// error if confirmation never arrives.
pub trait ChainClient: Send + Sync {
    /// The account's pending transaction count.
    fn transaction_count(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<u64, ClientError>> + Send;

    /// The current gas price in wei.
    fn gas_price(&self) -> impl Future<Output = Result<u128, ClientError>> + Send;

    /// Submit a contract creation. Returns as soon as the node accepts it.
    fn send_deployment(
        &self,
        request: DeploymentRequest,
    ) -> impl Future<Output = Result<TxHash, ClientError>> + Send;

    /// Submit a call. Returns as soon as the node accepts it.
    fn send_call(
        &self,
        request: CallRequest,
    ) -> impl Future<Output = Result<TxHash, ClientError>> + Send;

    /// Block until the transaction is included.
    fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<Receipt, ClientError>> + Send;
}
