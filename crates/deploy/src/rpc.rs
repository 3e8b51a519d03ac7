//! JSON-RPC implementation of [`ChainClient`].
//!
//! Transactions are sent with `eth_sendTransaction` from a sender account the
//! node manages (an unlocked dev account, a signing proxy, ...). Signing keys
//! never pass through this crate.

use std::time::Duration;

use alloy_core::primitives::{Address, TxHash, U64, U128};
use backon::{ConstantBuilder, ExponentialBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{
    client::{CallRequest, ChainClient, DeploymentRequest, Receipt},
    errors::ClientError,
};

/// Default timeout for a single RPC request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default bound on how long to wait for a receipt.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Attempts for idempotent reads before giving up.
const READ_MAX_ATTEMPTS: usize = 3;

/// Node error fragments that mean the nonce was already consumed.
const NONCE_CONFLICT_MARKERS: [&str; 4] = [
    "nonce too low",
    "already known",
    "replacement transaction underpriced",
    "nonce has already been used",
];

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| ClientError::Rpc(format!("failed to create HTTP client: {e}")))
}

/// Map a node error message onto the client error taxonomy.
pub fn classify_rpc_error(message: &str) -> ClientError {
    let lowered = message.to_lowercase();
    if NONCE_CONFLICT_MARKERS.iter().any(|m| lowered.contains(m)) {
        ClientError::NonceConflict(message.to_string())
    } else {
        ClientError::Rpc(message.to_string())
    }
}

/// Make a JSON-RPC call and deserialize the result.
///
/// A `null` result deserializes into `T` as-is, so callers that expect it
/// (receipts for pending transactions) should ask for an `Option`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, ClientError> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| ClientError::Rpc(format!("failed to send {method} request: {e}")))?;

    let result: Value = response
        .json()
        .await
        .map_err(|e| ClientError::Rpc(format!("failed to parse {method} response: {e}")))?;

    if let Some(error) = result.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        return Err(classify_rpc_error(message));
    }

    let result_value = result
        .get("result")
        .cloned()
        .ok_or_else(|| ClientError::Rpc(format!("no result in {method} response")))?;

    serde_json::from_value(result_value)
        .map_err(|e| ClientError::Rpc(format!("failed to deserialize {method} result: {e}")))
}

/// Receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: TxHash,
    contract_address: Option<Address>,
    status: Option<U64>,
    block_number: Option<U64>,
}

impl From<RpcReceipt> for Receipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            contract_address: receipt.contract_address,
            // Pre-Byzantium receipts carry no status; inclusion is all we know.
            success: receipt.status.is_none_or(|s| s == U64::from(1)),
            block_number: receipt.block_number.map(|n| n.to::<u64>()),
        }
    }
}

/// Connection settings for [`JsonRpcClient`].
#[derive(Debug, Clone)]
pub struct JsonRpcConfig {
    pub url: Url,
    /// Account the node sends transactions from.
    pub sender: Address,
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
}

impl JsonRpcConfig {
    pub fn new(url: Url, sender: Address) -> Self {
        Self {
            url,
            sender,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// [`ChainClient`] backed by an HTTP JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    config: JsonRpcConfig,
}

impl JsonRpcClient {
    pub fn new(config: JsonRpcConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: create_client()?,
            config,
        })
    }

    pub fn sender(&self) -> Address {
        self.config.sender
    }

    fn url(&self) -> &str {
        self.config.url.as_str()
    }

    /// Backoff for idempotent reads. Sends never go through this.
    fn read_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(READ_MAX_ATTEMPTS)
    }

    async fn read<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<T, ClientError> {
        (|| async { json_rpc_call(&self.http, self.url(), method, params.clone()).await })
            .retry(self.read_backoff())
            .when(|e| matches!(e, ClientError::Rpc(_)))
            .notify(|err, dur| {
                tracing::debug!(error = %err, delay = ?dur, method, "Retrying RPC read");
            })
            .await
    }

    async fn send_transaction(&self, tx: Value) -> Result<TxHash, ClientError> {
        json_rpc_call(&self.http, self.url(), "eth_sendTransaction", vec![tx]).await
    }
}

impl ChainClient for JsonRpcClient {
    async fn transaction_count(&self, account: Address) -> Result<u64, ClientError> {
        let count: U64 = self
            .read(
                "eth_getTransactionCount",
                vec![serde_json::json!(account), serde_json::json!("pending")],
            )
            .await?;
        Ok(count.to::<u64>())
    }

    async fn gas_price(&self) -> Result<u128, ClientError> {
        let price: U128 = self.read("eth_gasPrice", vec![]).await?;
        Ok(price.to::<u128>())
    }

    async fn send_deployment(&self, request: DeploymentRequest) -> Result<TxHash, ClientError> {
        tracing::debug!(
            artifact = %request.artifact,
            nonce = request.nonce,
            init_code_len = request.init_code.len(),
            "Sending contract creation"
        );

        self.send_transaction(serde_json::json!({
            "from": self.config.sender,
            "data": request.init_code,
            "nonce": format!("0x{:x}", request.nonce),
            "gasPrice": format!("0x{:x}", request.gas_price),
        }))
        .await
    }

    async fn send_call(&self, request: CallRequest) -> Result<TxHash, ClientError> {
        tracing::debug!(to = %request.to, nonce = request.nonce, "Sending call");

        self.send_transaction(serde_json::json!({
            "from": self.config.sender,
            "to": request.to,
            "data": request.data,
            "nonce": format!("0x{:x}", request.nonce),
            "gasPrice": format!("0x{:x}", request.gas_price),
        }))
        .await
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<Receipt, ClientError> {
        let interval = self.config.poll_interval.max(Duration::from_millis(1));
        let max_polls = (self.config.receipt_timeout.as_millis() / interval.as_millis()).max(1);
        let backoff = ConstantBuilder::default()
            .with_delay(interval)
            .with_max_times(max_polls as usize);

        let receipt = (|| async {
            let receipt: Option<RpcReceipt> = json_rpc_call(
                &self.http,
                self.url(),
                "eth_getTransactionReceipt",
                vec![serde_json::json!(tx_hash)],
            )
            .await?;
            receipt.ok_or(ClientError::Timeout(tx_hash))
        })
        .retry(backoff)
        // Receipt reads are idempotent: poll through transport errors too.
        .when(|e| matches!(e, ClientError::Timeout(_) | ClientError::Rpc(_)))
        .notify(|err, dur| match err {
            ClientError::Timeout(_) => {
                tracing::trace!(tx_hash = %tx_hash, delay = ?dur, "Receipt not available yet")
            }
            err => {
                tracing::debug!(
                    tx_hash = %tx_hash,
                    error = %err,
                    delay = ?dur,
                    "Receipt poll failed, retrying"
                )
            }
        })
        .await?;

        Ok(receipt.into())
    }
}
