/// EVM contract client.
///
/// Talks raw JSON-RPC to the node for maximum compatibility and uses alloy
/// for ABI encoding, EIP-1559 transaction building and signing.
///
/// Writes block until the transaction has a receipt. The chain id is
/// re-queried for every write so a restarted dev chain with a new id does
/// not invalidate the client.
use std::time::Duration;

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{Ledger, LedgerReceipt, LedgerValue};
use crate::crypto::sensitive::SecretHex;
use crate::error::{AnchorError, Result};
use crate::state::models::LedgerConfigSnapshot;

sol! {
    interface AnchorRegistry {
        function get(string calldata key) external view returns (string[] memory values, uint256 height);
        function save(string calldata key, string[] calldata values, uint256 typeTag) external;
    }
}

/// Configuration for the contract client.
#[derive(Debug, Clone)]
pub struct EvmConfig {
    /// JSON-RPC endpoint of the node.
    pub rpc_url: String,
    /// Deployed contract address (0x-prefixed hex).
    pub contract_address: String,
    /// Account private key used to sign writes.
    pub private_key: SecretHex,
    /// `maxFeePerGas` in wei. `0` uses the node's current gas price.
    pub gas_fee_cap: u64,
    /// Gas limit per write. `0` uses the node's estimate.
    pub gas_limit: u64,
    /// Delay between receipt polls while waiting for inclusion.
    pub receipt_poll_interval: Duration,
    /// Bound on the connect handshake and on opening each TCP connection.
    pub call_timeout: Duration,
}

/// Contract client bound to one endpoint, contract and signing account.
pub struct EvmLedger {
    config: EvmConfig,
    client: Client,
    signer: PrivateKeySigner,
    contract: Address,
    chain_id: u64,
}

/// Simplified JSON-RPC response.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxReceipt {
    block_number: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    timestamp: String,
}

/// Parse a 0x-prefixed hex quantity.
fn parse_quantity(value: &str) -> std::result::Result<u128, String> {
    let digits = value.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity {value:?}: {e}"))
}

fn to_u64(value: u128, what: &str) -> std::result::Result<u64, String> {
    u64::try_from(value).map_err(|_| format!("{what} out of range: {value}"))
}

impl EvmLedger {
    /// Dial the endpoint and bind to the deployed contract.
    ///
    /// Fails when the key or address do not parse, the node is unreachable
    /// or silent past `call_timeout`, or no code is deployed at the contract
    /// address.
    pub async fn connect(config: EvmConfig) -> Result<Self> {
        let signer: PrivateKeySigner = config
            .private_key
            .expose()
            .parse()
            .map_err(|e| AnchorError::Config(format!("Invalid account private key: {e}")))?;

        let contract: Address = config
            .contract_address
            .parse()
            .map_err(|e| AnchorError::Config(format!("Invalid contract address: {e}")))?;

        let client = Client::builder()
            .connect_timeout(config.call_timeout)
            .build()
            .map_err(|e| AnchorError::Connection(format!("cannot build HTTP client: {e}")))?;

        let limit = config.call_timeout;
        let mut ledger = Self {
            config,
            client,
            signer,
            contract,
            chain_id: 0,
        };

        tokio::time::timeout(limit, ledger.handshake())
            .await
            .map_err(|_| AnchorError::Timeout {
                operation: "connect",
                after: limit,
            })??;

        info!(
            endpoint = %ledger.config.rpc_url,
            contract = %ledger.contract,
            account = %ledger.signer.address(),
            chain_id = ledger.chain_id,
            "Connected to ledger"
        );

        Ok(ledger)
    }

    /// Read the chain id and check that code is deployed at the contract.
    async fn handshake(&mut self) -> Result<()> {
        self.chain_id = self.fetch_chain_id().await.map_err(AnchorError::Connection)?;

        let code: String = self
            .rpc_call(
                "eth_getCode",
                serde_json::json!([self.contract.to_string(), "latest"]),
            )
            .await
            .map_err(AnchorError::Connection)?;
        if code.trim_start_matches("0x").is_empty() {
            return Err(AnchorError::Connection(format!(
                "no contract deployed at {}",
                self.contract
            )));
        }
        Ok(())
    }

    /// Redacted settings for persistence; never includes the key.
    pub fn snapshot(&self) -> LedgerConfigSnapshot {
        LedgerConfigSnapshot {
            endpoint: self.config.rpc_url.clone(),
            contract_address: self.contract.to_string(),
            gas_fee_cap: self.config.gas_fee_cap,
            gas_limit: self.config.gas_limit,
            chain_id: self.chain_id,
            recorded_at: Utc::now(),
        }
    }

    /// Send a JSON-RPC request; a `null` result comes back as `None`.
    async fn rpc_call_optional<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<Option<T>, String> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp: JsonRpcResponse<T> = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("{method}: transport error: {e}"))?
            .json()
            .await
            .map_err(|e| format!("{method}: response parse error: {e}"))?;

        if let Some(err) = resp.error {
            return Err(format!("{method}: {}", err.message));
        }

        Ok(resp.result)
    }

    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<T, String> {
        self.rpc_call_optional(method, params)
            .await?
            .ok_or_else(|| format!("{method}: empty RPC response"))
    }

    async fn quantity(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<u128, String> {
        let raw: String = self.rpc_call(method, params).await?;
        parse_quantity(&raw)
    }

    async fn fetch_chain_id(&self) -> std::result::Result<u64, String> {
        let id = self.quantity("eth_chainId", serde_json::json!([])).await?;
        to_u64(id, "chain id")
    }

    /// `(maxFeePerGas, maxPriorityFeePerGas)` for the next write.
    async fn fees(&self) -> std::result::Result<(u128, u128), String> {
        let max_fee = if self.config.gas_fee_cap > 0 {
            u128::from(self.config.gas_fee_cap)
        } else {
            self.quantity("eth_gasPrice", serde_json::json!([])).await?
        };

        // Older dev chains lack this method; a zero tip is still valid.
        let tip = match self
            .quantity("eth_maxPriorityFeePerGas", serde_json::json!([]))
            .await
        {
            Ok(tip) => tip,
            Err(e) => {
                debug!(error = %e, "No priority fee suggestion, using 0");
                0
            }
        };

        Ok((max_fee, tip.min(max_fee)))
    }

    async fn gas_limit(&self, input: &Bytes) -> std::result::Result<u64, String> {
        if self.config.gas_limit > 0 {
            return Ok(self.config.gas_limit);
        }

        let estimate = self
            .quantity(
                "eth_estimateGas",
                serde_json::json!([{
                    "from": self.signer.address().to_string(),
                    "to": self.contract.to_string(),
                    "data": format!("0x{}", hex::encode(input)),
                }]),
            )
            .await?;
        to_u64(estimate, "gas estimate")
    }

    /// Poll until the transaction has a receipt. Unbounded on its own; the
    /// caller's deadline limits it.
    async fn wait_for_receipt(&self, tx_hash: &str) -> std::result::Result<(u64, DateTime<Utc>), String> {
        loop {
            let receipt: Option<TxReceipt> = self
                .rpc_call_optional("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
                .await?;

            if let Some(TxReceipt {
                block_number: Some(block_number),
                status,
            }) = receipt
            {
                if status.as_deref() == Some("0x0") {
                    return Err(format!("transaction {tx_hash} reverted"));
                }

                let header: BlockHeader = self
                    .rpc_call(
                        "eth_getBlockByNumber",
                        serde_json::json!([block_number, false]),
                    )
                    .await?;
                let seconds = to_u64(parse_quantity(&header.timestamp)?, "block timestamp")?;
                let timestamp = i64::try_from(seconds)
                    .ok()
                    .and_then(|s| DateTime::from_timestamp(s, 0))
                    .ok_or_else(|| format!("block timestamp out of range: {seconds}"))?;

                let number = to_u64(parse_quantity(&block_number)?, "block number")?;
                return Ok((number, timestamp));
            }

            tokio::time::sleep(self.config.receipt_poll_interval).await;
        }
    }

    /// Build, sign, and send the `save` call, then wait for inclusion.
    async fn send_save_tx(&self, key: &str, values: &[String], type_tag: u64) -> Result<LedgerReceipt> {
        let call = AnchorRegistry::saveCall {
            key: key.to_string(),
            values: values.to_vec(),
            typeTag: U256::from(type_tag),
        };
        let input = Bytes::from(call.abi_encode());
        let from = self.signer.address();

        let chain_id = self.fetch_chain_id().await.map_err(AnchorError::LedgerWrite)?;

        let nonce = self
            .quantity(
                "eth_getTransactionCount",
                serde_json::json!([from.to_string(), "pending"]),
            )
            .await
            .and_then(|n| to_u64(n, "nonce"))
            .map_err(AnchorError::LedgerWrite)?;

        let (max_fee_per_gas, max_priority_fee_per_gas) =
            self.fees().await.map_err(AnchorError::LedgerWrite)?;
        let gas_limit = self.gas_limit(&input).await.map_err(AnchorError::LedgerWrite)?;

        let tx = TxEip1559 {
            chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            to: TxKind::Call(self.contract),
            value: U256::ZERO,
            access_list: Default::default(),
            input,
        };

        let sig_hash = tx.signature_hash();
        let sig = self
            .signer
            .sign_hash(&sig_hash)
            .await
            .map_err(|e| AnchorError::Signing(e.to_string()))?;

        let signed = TxEnvelope::Eip1559(tx.into_signed(sig));
        let mut raw_tx = Vec::new();
        signed.encode_2718(&mut raw_tx);
        let raw_hex = format!("0x{}", hex::encode(&raw_tx));

        let tx_hash: String = self
            .rpc_call("eth_sendRawTransaction", serde_json::json!([raw_hex]))
            .await
            .map_err(AnchorError::LedgerWrite)?;

        debug!(tx_hash = %tx_hash, nonce, gas_limit, "Transaction submitted, awaiting receipt");

        let (block_number, block_timestamp) = self
            .wait_for_receipt(&tx_hash)
            .await
            .map_err(AnchorError::LedgerWrite)?;

        Ok(LedgerReceipt {
            tx_ref: tx_hash,
            block_number,
            block_timestamp,
        })
    }
}

#[async_trait]
impl Ledger for EvmLedger {
    fn name(&self) -> &str {
        &self.config.rpc_url
    }

    async fn get(&self, key: &str) -> Result<LedgerValue> {
        let call = AnchorRegistry::getCall {
            key: key.to_string(),
        };
        let data = format!("0x{}", hex::encode(call.abi_encode()));

        let output: String = self
            .rpc_call(
                "eth_call",
                serde_json::json!([{ "to": self.contract.to_string(), "data": data }, "latest"]),
            )
            .await
            .map_err(AnchorError::LedgerRead)?;

        let bytes = hex::decode(output.trim_start_matches("0x"))
            .map_err(|e| AnchorError::LedgerRead(format!("eth_call returned bad hex: {e}")))?;

        let decoded = AnchorRegistry::getCall::abi_decode_returns(&bytes)
            .map_err(|e| AnchorError::LedgerRead(format!("cannot decode get() result: {e}")))?;

        Ok(LedgerValue {
            values: decoded.values,
            block_number: decoded.height,
        })
    }

    async fn save(&self, key: &str, values: &[String], type_tag: u64) -> Result<LedgerReceipt> {
        self.send_save_tx(key, values, type_tag).await
    }
}
