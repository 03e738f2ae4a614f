//! Ethereum JSON-RPC ledger client.
//!
//! [`RpcLedger`] signs legacy transactions locally and talks to a node over
//! HTTP. Read-only calls are retried on transport errors with exponential
//! backoff; `eth_sendRawTransaction` is sent exactly once.

use std::time::Duration;

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue},
    primitives::{Address, B256, Bytes, U64, U256},
};
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use url::Url;

use crate::{
    config::{GasPricePolicy, NetworkConfig, RetryConfig},
    ledger::{Ledger, LedgerError, Receipt, TxHandle, TxRequest, TxStatus},
    signer::Signer,
    tx::LegacyTransaction,
};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Selector of `Error(string)`.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// Selector of `Panic(uint256)`.
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, LedgerError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| LedgerError::Network(format!("failed to create HTTP client: {e}")))
}

/// Make a single JSON-RPC call and deserialize the result.
///
/// Transport failures map to [`LedgerError::Network`], revert errors to
/// [`LedgerError::Reverted`] with the decoded reason, any other error object
/// to [`LedgerError::Rpc`].
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, LedgerError> {
    let response = client
        .post(url.clone())
        .json(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| LedgerError::Network(format!("{method}: {e}")))?;

    let result: Value = response
        .json()
        .await
        .map_err(|e| LedgerError::Network(format!("{method}: failed to read response: {e}")))?;

    if let Some(error) = result.get("error") {
        return Err(rpc_error(error));
    }

    let result_value = result.get("result").cloned().unwrap_or(Value::Null);

    serde_json::from_value(result_value).map_err(|e| LedgerError::Rpc {
        code: -32700,
        message: format!("failed to deserialize {method} result: {e}"),
    })
}

/// Classify a JSON-RPC error object.
fn rpc_error(error: &Value) -> LedgerError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    // Geth uses code 3 for reverts with data, other nodes only say so in the message
    if code != 3 && !message.to_lowercase().contains("revert") {
        return LedgerError::Rpc { code, message };
    }

    let from_data = error
        .get("data")
        .and_then(|data| match data {
            Value::String(s) => Some(s.as_str()),
            Value::Object(o) => o.get("data").and_then(Value::as_str),
            _ => None,
        })
        .and_then(|s| hex::decode(s.trim_start_matches("0x")).ok())
        .and_then(|data| decode_revert_data(&data));

    let from_message = message
        .split_once("reverted: ")
        .map(|(_, reason)| reason.trim().to_string())
        .filter(|reason| !reason.is_empty());

    LedgerError::Reverted {
        tx_hash: None,
        reason: from_data.or(from_message),
    }
}

/// Human-readable form of revert data.
pub fn decode_revert_data(data: &[u8]) -> Option<String> {
    let (selector, payload) = data.split_first_chunk::<4>()?;

    match *selector {
        ERROR_STRING_SELECTOR => {
            match DynSolType::Tuple(vec![DynSolType::String]).abi_decode_params(payload) {
                Ok(DynSolValue::Tuple(values)) => match values.as_slice() {
                    [DynSolValue::String(reason)] => Some(reason.clone()),
                    _ => None,
                },
                _ => None,
            }
        }
        PANIC_SELECTOR => {
            let code = U256::try_from_be_slice(payload.get(..32)?)?;
            Some(format!("panic code {code:#x}"))
        }
        _ => Some(format!("custom error 0x{}", hex::encode(selector))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    block_number: U64,
    /// Absent before Byzantium.
    #[serde(default)]
    status: Option<U64>,
    #[serde(default)]
    contract_address: Option<Address>,
    gas_used: U64,
}

impl From<RpcReceipt> for Receipt {
    fn from(receipt: RpcReceipt) -> Self {
        Receipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.to(),
            success: receipt.status.is_none_or(|status| status == U64::from(1)),
            contract_address: receipt.contract_address,
            gas_used: receipt.gas_used.to(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcTransaction {
    from: Address,
    #[serde(default)]
    to: Option<Address>,
    input: Bytes,
    gas: U64,
    value: U256,
}

/// A [`Ledger`] backed by a JSON-RPC node.
#[derive(Debug, Clone)]
pub struct RpcLedger {
    client: reqwest::Client,
    url: Url,
    chain_id: u64,
    gas_price: GasPricePolicy,
    gas_multiplier_percent: u64,
    retry: RetryConfig,
}

impl RpcLedger {
    /// Connect to the network's node and check that it serves the expected chain.
    pub async fn connect(
        network: &NetworkConfig,
        retry: &RetryConfig,
    ) -> Result<Self, LedgerError> {
        let mut ledger = Self {
            client: create_client()?,
            url: network.rpc_url.clone(),
            chain_id: 0,
            gas_price: network.gas_price,
            gas_multiplier_percent: network.gas_multiplier_percent,
            retry: *retry,
        };

        let actual = ledger.read::<U64>("eth_chainId", vec![]).await?.to::<u64>();
        if let Some(expected) = network.chain_id {
            if expected != actual {
                return Err(LedgerError::ChainMismatch { expected, actual });
            }
        }
        ledger.chain_id = actual;

        tracing::info!(url = %ledger.url, chain_id = actual, "Connected to node");

        Ok(ledger)
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.retry.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .with_max_times(self.retry.max_retries)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, LedgerError> {
        json_rpc_call(&self.client, &self.url, method, params).await
    }

    /// Read-only call, retried on transport errors.
    async fn read<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, LedgerError> {
        let params = &params;
        (move || async move { self.request(method, params.clone()).await })
            .retry(self.backoff())
            .when(LedgerError::is_transient)
            .notify(|err: &LedgerError, delay: Duration| {
                tracing::warn!(method, error = %err, ?delay, "RPC call failed, retrying...");
            })
            .await
    }

    async fn gas_price(&self) -> Result<u128, LedgerError> {
        match self.gas_price {
            GasPricePolicy::Fixed { wei } => Ok(u128::from(wei)),
            GasPricePolicy::Node => Ok(self
                .read::<U256>("eth_gasPrice", vec![])
                .await?
                .saturating_to()),
        }
    }

    async fn replay_revert_reason(&self, receipt: &Receipt) -> Result<Option<String>, LedgerError> {
        let tx: Option<RpcTransaction> = self
            .read("eth_getTransactionByHash", vec![json!(receipt.tx_hash)])
            .await?;
        let Some(tx) = tx else {
            return Ok(None);
        };

        let call = json!({
            "from": tx.from,
            "to": tx.to,
            "data": tx.input,
            "gas": tx.gas,
            "value": tx.value,
        });
        let block = json!(format!("{:#x}", receipt.block_number));

        match self.request::<Bytes>("eth_call", vec![call, block]).await {
            Ok(_) => Ok(None),
            Err(LedgerError::Reverted { reason, .. }) => Ok(reason),
            Err(e) => Err(e),
        }
    }
}

impl Ledger for RpcLedger {
    async fn submit(&self, request: TxRequest, signer: &Signer) -> Result<TxHandle, LedgerError> {
        let from = signer.address();

        let nonce = self
            .read::<U64>("eth_getTransactionCount", vec![json!(from), json!("pending")])
            .await?
            .to::<u64>();
        let gas_price = self.gas_price().await?;

        let mut estimate_request = json!({ "from": from, "data": request.input() });
        if let Some(to) = request.to() {
            estimate_request["to"] = json!(to);
        }
        let estimate = self
            .read::<U64>("eth_estimateGas", vec![estimate_request])
            .await?
            .to::<u64>();
        let gas_limit = estimate.saturating_mul(self.gas_multiplier_percent) / 100;

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit,
            to: request.to(),
            value: U256::ZERO,
            input: request.input().clone(),
            chain_id: self.chain_id,
        };
        let signature = signer.sign_hash(&tx.signing_hash())?;
        let raw = tx.encode_signed(&signature);

        let hash: B256 = self
            .request("eth_sendRawTransaction", vec![json!(raw)])
            .await?;

        tracing::debug!(
            %from,
            nonce,
            gas_limit,
            gas_price,
            tx_hash = %hash,
            "Transaction sent"
        );

        Ok(TxHandle { hash })
    }

    async fn status(&self, handle: &TxHandle) -> Result<TxStatus, LedgerError> {
        let receipt: Option<RpcReceipt> = self
            .read("eth_getTransactionReceipt", vec![json!(handle.hash)])
            .await?;
        if let Some(receipt) = receipt {
            return Ok(TxStatus::Included(receipt.into()));
        }

        let tx: Option<Value> = self
            .read("eth_getTransactionByHash", vec![json!(handle.hash)])
            .await?;
        Ok(match tx {
            Some(_) => TxStatus::Pending,
            None => TxStatus::Unknown,
        })
    }

    async fn revert_reason(&self, receipt: &Receipt) -> Option<String> {
        match self.replay_revert_reason(receipt).await {
            Ok(reason) => reason,
            Err(e) => {
                tracing::warn!(
                    tx_hash = %receipt.tx_hash,
                    error = %e,
                    "Could not recover revert reason"
                );
                None
            }
        }
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, LedgerError> {
        self.read(
            "eth_call",
            vec![json!({ "to": to, "data": data }), json!("latest")],
        )
        .await
    }
}
