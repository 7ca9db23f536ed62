//! Ethereum JSON-RPC client for historical block and swap log retrieval.

use crate::error::{DecodeError, FetchError};
use alloy::primitives::{b256, Address, B256};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sandwich_scan_telemetry::Metrics;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// `Swap(address,uint256,uint256,uint256,uint256,address)` emitted by Uniswap V2 pairs.
pub const SWAP_TOPIC: B256 =
    b256!("d78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822");

/// A transaction as far as the normalizer needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub hash: B256,
    pub index: u64,
    pub from: Address,
}

/// An event log from the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub tx_hash: B256,
    pub tx_index: u64,
    pub log_index: u64,
    pub removed: bool,
}

/// Block data handed to the normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub number: u64,
    /// Unix seconds.
    pub timestamp: u64,
    pub transactions: Vec<RawTransaction>,
    pub logs: Vec<RawLog>,
}

/// Source of historical blocks.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Fetch block `block_number` with its transactions and swap logs.
    async fn fetch_block(&self, block_number: u64) -> Result<RawBlock, FetchError>;
}

/// Result of [`RpcClient::check_connectivity`].
#[derive(Debug, Clone)]
pub struct ConnectivityReport {
    pub latest_block: u64,
    pub block_number: u64,
    pub timestamp: u64,
    pub transaction_count: usize,
    pub swap_log_count: usize,
}

/// Ethereum RPC client wrapper.
pub struct RpcClient {
    client: Client,
    rpc_url: String,
    metrics: Metrics,
}

impl RpcClient {
    /// Create a new RPC client.
    ///
    /// # Arguments
    /// * `rpc_url` - HTTP/HTTPS JSON-RPC endpoint URL with archive access
    /// * `timeout` - Per-request timeout
    /// * `metrics` - Metrics collector
    pub fn new(rpc_url: &str, timeout: Duration, metrics: Metrics) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        info!("Initialized RPC client for {}", redact(rpc_url));

        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
            metrics,
        })
    }

    async fn call_rpc(&self, method: &str, params: Value) -> Result<Value, FetchError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let start = Instant::now();
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(FetchError::Transient(format!("{} returned HTTP {}", method, status)));
        }
        if !status.is_success() {
            return Err(FetchError::Fatal(format!("{} returned HTTP {}", method, status)));
        }

        let mut body: Value = response.json().await.map_err(transport_error)?;
        self.metrics
            .observe_rpc_latency(method, start.elapsed().as_secs_f64());

        if let Some(error) = body.get("error") {
            return Err(classify_rpc_error(method, error));
        }

        Ok(body.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }

    /// Get the latest block number.
    pub async fn get_latest_block_number(&self) -> Result<u64, FetchError> {
        let result = self.call_rpc("eth_blockNumber", json!([])).await?;
        let block_number = parse_quantity(&result).ok_or_else(|| {
            let reason = format!("invalid eth_blockNumber result {}", result);
            FetchError::Decode(DecodeError::new(0, reason))
        })?;
        debug!("Latest block number: {}", block_number);
        Ok(block_number)
    }

    async fn get_block_json(&self, block_number: u64) -> Result<Value, FetchError> {
        let hex_block = format!("0x{:x}", block_number);
        let result = self
            .call_rpc("eth_getBlockByNumber", json!([hex_block, true]))
            .await?;

        if result.is_null() {
            return Err(FetchError::Fatal(format!("block {} not found", block_number)));
        }
        Ok(result)
    }

    async fn get_swap_logs_json(&self, block_number: u64) -> Result<Value, FetchError> {
        let hex_block = format!("0x{:x}", block_number);
        self.call_rpc(
            "eth_getLogs",
            json!([{
                "fromBlock": hex_block,
                "toBlock": hex_block,
                "topics": [SWAP_TOPIC]
            }]),
        )
        .await
    }

    /// Verify that the endpoint answers and serves historical blocks and logs.
    pub async fn check_connectivity(
        &self,
        block_number: u64,
    ) -> Result<ConnectivityReport, FetchError> {
        let latest_block = self.get_latest_block_number().await?;
        let block = self.fetch_block(block_number).await?;

        Ok(ConnectivityReport {
            latest_block,
            block_number,
            timestamp: block.timestamp,
            transaction_count: block.transactions.len(),
            swap_log_count: block.logs.len(),
        })
    }
}

#[async_trait]
impl BlockSource for RpcClient {
    async fn fetch_block(&self, block_number: u64) -> Result<RawBlock, FetchError> {
        let block_json = self.get_block_json(block_number).await?;
        let logs_json = self.get_swap_logs_json(block_number).await?;
        let block = RawBlock::from_json(block_number, &block_json, &logs_json)?;

        debug!(
            block_number,
            transactions = block.transactions.len(),
            swap_logs = block.logs.len(),
            "Fetched block"
        );
        Ok(block)
    }
}

impl RawBlock {
    /// Build from `eth_getBlockByNumber` (full transactions) and `eth_getLogs` results.
    pub fn from_json(
        block_number: u64,
        block_json: &Value,
        logs_json: &Value,
    ) -> Result<Self, DecodeError> {
        let err = |reason: String| DecodeError::new(block_number, reason);

        let number = quantity_field(block_json, "number").map_err(err)?;
        if number != block_number {
            return Err(err(format!("provider returned block {}", number)));
        }
        let timestamp = quantity_field(block_json, "timestamp").map_err(err)?;

        let transactions = block_json["transactions"]
            .as_array()
            .ok_or_else(|| err("block missing transactions array".to_string()))?
            .iter()
            .map(|tx| -> Result<RawTransaction, String> {
                Ok(RawTransaction {
                    hash: parsed_field(tx, "hash")?,
                    index: quantity_field(tx, "transactionIndex")?,
                    from: parsed_field(tx, "from")?,
                })
            })
            .collect::<Result<Vec<_>, String>>()
            .map_err(err)?;

        let logs = logs_json
            .as_array()
            .ok_or_else(|| err("eth_getLogs result is not an array".to_string()))?
            .iter()
            .map(RawLog::from_json)
            .collect::<Result<Vec<_>, String>>()
            .map_err(err)?;

        Ok(Self {
            number,
            timestamp,
            transactions,
            logs,
        })
    }
}

impl RawLog {
    fn from_json(log: &Value) -> Result<Self, String> {
        let topics = log["topics"]
            .as_array()
            .ok_or_else(|| "log missing topics".to_string())?
            .iter()
            .map(|topic| {
                topic
                    .as_str()
                    .and_then(|s| B256::from_str(s).ok())
                    .ok_or_else(|| format!("invalid topic {}", topic))
            })
            .collect::<Result<Vec<_>, String>>()?;

        let data = str_field(log, "data")?;
        let data = hex::decode(data.strip_prefix("0x").unwrap_or(data))
            .map_err(|e| format!("invalid log data: {}", e))?;

        Ok(Self {
            address: parsed_field(log, "address")?,
            topics,
            data,
            block_number: quantity_field(log, "blockNumber")?,
            tx_hash: parsed_field(log, "transactionHash")?,
            tx_index: quantity_field(log, "transactionIndex")?,
            log_index: quantity_field(log, "logIndex")?,
            removed: log["removed"].as_bool().unwrap_or(false),
        })
    }
}

fn str_field<'a>(value: &'a Value, name: &str) -> Result<&'a str, String> {
    value[name]
        .as_str()
        .ok_or_else(|| format!("missing field {}", name))
}

fn quantity_field(value: &Value, name: &str) -> Result<u64, String> {
    parse_quantity(&value[name])
        .ok_or_else(|| format!("invalid quantity {} = {}", name, value[name]))
}

fn parsed_field<T: FromStr>(value: &Value, name: &str) -> Result<T, String> {
    let raw = str_field(value, name)?;
    raw.parse().map_err(|_| format!("invalid {} {}", name, raw))
}

fn parse_quantity(value: &Value) -> Option<u64> {
    let hex_str = value.as_str()?;
    u64::from_str_radix(hex_str.strip_prefix("0x").unwrap_or(hex_str), 16).ok()
}

fn transport_error(e: reqwest::Error) -> FetchError {
    if e.is_builder() {
        FetchError::Fatal(e.to_string())
    } else {
        FetchError::Transient(e.to_string())
    }
}

/// JSON-RPC error codes providers use for throttling or overload.
const TRANSIENT_RPC_CODES: [i64; 3] = [-32005, 429, -32603];

const TRANSIENT_RPC_MESSAGES: [&str; 6] = [
    "rate limit",
    "too many requests",
    "timeout",
    "timed out",
    "capacity",
    "try again",
];

fn classify_rpc_error(method: &str, error: &Value) -> FetchError {
    let code = error["code"].as_i64();
    let message = error["message"].as_str().unwrap_or_default().to_lowercase();
    let detail = format!("{} failed: {}", method, error);

    let transient = code.map_or(false, |c| TRANSIENT_RPC_CODES.contains(&c))
        || TRANSIENT_RPC_MESSAGES.iter().any(|m| message.contains(m));

    if transient {
        FetchError::Transient(detail)
    } else {
        FetchError::Fatal(detail)
    }
}

/// Hide the API key path segment of provider URLs in logs.
fn redact(rpc_url: &str) -> String {
    match rpc_url.rsplit_once('/') {
        Some((base, key)) if key.len() >= 16 => format!("{}/<redacted>", base),
        _ => rpc_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_json() -> Value {
        json!({
            "number": "0xd45886",
            "timestamp": "0x61cf9980",
            "transactions": [
                {
                    "hash": "0x0101010101010101010101010101010101010101010101010101010101010101",
                    "transactionIndex": "0x0",
                    "from": "0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a"
                }
            ]
        })
    }

    fn logs_json() -> Value {
        json!([{
            "address": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "topics": [
                "0xd78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822",
                "0x0000000000000000000000007a250d5630b4cf539739df2c5dacb4c659f2488d",
                "0x0000000000000000000000000a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a"
            ],
            "data": format!("0x{}", "00".repeat(128)),
            "blockNumber": "0xd45886",
            "transactionHash": "0x0101010101010101010101010101010101010101010101010101010101010101",
            "transactionIndex": "0x0",
            "logIndex": "0x3",
            "removed": false
        }])
    }

    #[test]
    fn test_raw_block_from_json() {
        let block = RawBlock::from_json(13_916_294, &block_json(), &logs_json()).unwrap();

        assert_eq!(block.number, 13_916_294);
        assert_eq!(block.timestamp, 1_640_995_200);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].from, Address::repeat_byte(0x0a));
        assert_eq!(block.logs.len(), 1);
        assert_eq!(block.logs[0].topics[0], SWAP_TOPIC);
        assert_eq!(block.logs[0].log_index, 3);
        assert_eq!(block.logs[0].data.len(), 128);
    }

    #[test]
    fn test_wrong_block_number_is_a_decode_error() {
        let err = RawBlock::from_json(1, &block_json(), &logs_json()).unwrap_err();
        assert_eq!(err.block_number, 1);
    }

    #[test]
    fn test_missing_sender_is_a_decode_error() {
        let mut block = block_json();
        block["transactions"][0]
            .as_object_mut()
            .unwrap()
            .remove("from");
        assert!(RawBlock::from_json(13_916_294, &block, &logs_json()).is_err());
    }

    #[test]
    fn test_rpc_error_classification() {
        let throttled = json!({
            "code": 429,
            "message": "Your app has exceeded its compute units per second capacity"
        });
        assert!(classify_rpc_error("eth_getLogs", &throttled).is_transient());

        let limited = json!({"code": -32000, "message": "rate limit exceeded"});
        assert!(classify_rpc_error("eth_getLogs", &limited).is_transient());

        let invalid = json!({
            "code": -32602,
            "message": "invalid argument 0: hex string without 0x prefix"
        });
        assert!(!classify_rpc_error("eth_getLogs", &invalid).is_transient());
    }

    #[test]
    fn test_redact_hides_api_key() {
        assert_eq!(
            redact("https://eth-mainnet.g.alchemy.com/v2/abcdefghijklmnopqrstuvwxyz"),
            "https://eth-mainnet.g.alchemy.com/v2/<redacted>"
        );
        assert_eq!(redact("http://localhost:8545"), "http://localhost:8545");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        let client = RpcClient::new(
            "http://127.0.0.1:9",
            Duration::from_millis(500),
            Metrics::new().unwrap(),
        )
        .unwrap();

        let err = client.fetch_block(1).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error {:?}", err);
    }
}
