//! EVM JSON-RPC client
//!
//! `eth_*` methods behind the chain-neutral `ChainClient` port. Pool
//! creation is observed through `eth_getLogs`; the cursor is the last
//! block number scanned.

use alloy_primitives::{hex, Address, Bytes, B256, U256, U64};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;

use super::abi::{self, IERC20};
use super::parse_address;
use crate::adapters::rpc::RpcPool;
use crate::domain::chain::ChainFamily;
use crate::ports::chain::{
    AccountSnapshot, ChainClient, ChainTransaction, EventBatch, EventQuery, EventRef, EvmLog,
    EvmTransaction, RpcError, SignedTx, TxPayload, TxStatus, UnsignedTx,
};

/// Gas for a plain value transfer
pub const TRANSFER_GAS: u64 = 21_000;

/// Blocks scanned on the very first poll
pub const DEFAULT_LOG_LOOKBACK: u64 = 20;

/// Upper bound on blocks per `eth_getLogs` request
pub const MAX_LOG_RANGE: u64 = 500;

/// A log as returned by `eth_getLogs` and inside receipts
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub removed: bool,
}

impl From<RpcLog> for EvmLog {
    fn from(log: RpcLog) -> Self {
        Self {
            address: log.address,
            topics: log.topics,
            data: log.data,
        }
    }
}

/// `eth_getTransactionReceipt` result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    /// 1 success, 0 revert
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub from: Option<Address>,
    pub logs: Vec<RpcLog>,
}

impl RpcReceipt {
    pub fn succeeded(&self) -> Option<bool> {
        self.status.map(|s| s.to::<u64>() == 1)
    }

    /// Chain-neutral view of the receipt
    pub fn into_transaction(self, id: &str) -> ChainTransaction {
        ChainTransaction {
            id: id.to_string(),
            block_time: None,
            failed: self.succeeded() == Some(false),
            signer: self.from.map(|a| a.to_checksum(None)),
            evm_logs: self.logs.into_iter().map(EvmLog::from).collect(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogFilter {
    from_block: U64,
    to_block: U64,
    address: Address,
    /// topic0 alternatives
    #[serde(skip_serializing_if = "Vec::is_empty")]
    topics: Vec<Vec<B256>>,
}

#[derive(Debug, Serialize)]
struct CallRequest {
    to: Address,
    data: Bytes,
}

pub struct EvmRpcClient {
    chain_id: String,
    evm_chain_id: u64,
    pool: RpcPool,
}

impl EvmRpcClient {
    pub fn new(chain_id: impl Into<String>, evm_chain_id: u64, pool: RpcPool) -> Self {
        Self {
            chain_id: chain_id.into(),
            evm_chain_id,
            pool,
        }
    }

    fn address(address: &str) -> Result<Address, RpcError> {
        parse_address(address).ok_or_else(|| RpcError::InvalidAddress(address.to_string()))
    }

    async fn fetch<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let result = self.pool.request(method, params).await?;
        serde_json::from_value(result).map_err(|e| RpcError::Parse(format!("{}: {}", method, e)))
    }

    /// A quantity that must fit base units
    async fn amount(&self, method: &str, params: Value) -> Result<u128, RpcError> {
        let value: U256 = self.fetch(method, params).await?;
        abi::amount(value).ok_or_else(|| RpcError::Parse(format!("{}: {} exceeds u128", method, value)))
    }

    async fn receipt(&self, tx_hash: &str) -> Result<Option<RpcReceipt>, RpcError> {
        self.fetch("eth_getTransactionReceipt", json!([tx_hash])).await
    }
}

#[async_trait]
impl ChainClient for EvmRpcClient {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    async fn get_balance(&self, address: &str) -> Result<u128, RpcError> {
        let address = Self::address(address)?;
        self.amount("eth_getBalance", json!([address, "latest"])).await
    }

    async fn get_account(&self, address: &str) -> Result<Option<AccountSnapshot>, RpcError> {
        let balance = self.get_balance(address).await?;
        let code: Bytes = self
            .fetch("eth_getCode", json!([Self::address(address)?, "latest"]))
            .await?;

        // every EVM address "exists"; treat empty and unfunded as absent
        if code.is_empty() && balance == 0 {
            return Ok(None);
        }

        Ok(Some(AccountSnapshot {
            address: address.to_string(),
            balance,
            owner: None,
            executable: !code.is_empty(),
            data: code.to_vec(),
        }))
    }

    async fn get_token_account_balance(&self, _token_account: &str) -> Result<u128, RpcError> {
        Err(RpcError::Unsupported {
            method: "getTokenAccountBalance".to_string(),
            family: ChainFamily::Evm,
        })
    }

    async fn get_token_holdings(&self, owner: &str, token: &str) -> Result<u128, RpcError> {
        let call = IERC20::balanceOfCall {
            owner: Self::address(owner)?,
        };
        let out = self.call(token, &call.abi_encode()).await?;
        if out.is_empty() {
            return Ok(0);
        }
        let balance = IERC20::balanceOfCall::abi_decode_returns(&out, true)
            .map_err(|e| RpcError::Parse(format!("balanceOf: {}", e)))?
            .balance;
        abi::amount(balance).ok_or_else(|| RpcError::Parse("balanceOf: exceeds u128".into()))
    }

    async fn poll_events(&self, query: &EventQuery) -> Result<EventBatch, RpcError> {
        let head: U64 = self.fetch("eth_blockNumber", json!([])).await?;
        let head = head.to::<u64>();

        let from = match query.cursor.as_deref().and_then(|c| c.parse::<u64>().ok()) {
            Some(last) if last >= head => {
                return Ok(EventBatch {
                    cursor: query.cursor.clone(),
                    ..Default::default()
                })
            }
            Some(last) => last + 1,
            None => head.saturating_sub(DEFAULT_LOG_LOOKBACK),
        };
        let to = head.min(from + MAX_LOG_RANGE - 1);

        let topics = query
            .topics
            .iter()
            .map(|t| B256::from_str(t).map_err(|_| RpcError::Parse(format!("bad topic {}", t))))
            .collect::<Result<Vec<_>, _>>()?;
        let filter = LogFilter {
            from_block: U64::from(from),
            to_block: U64::from(to),
            address: Self::address(&query.address)?,
            topics: if topics.is_empty() { Vec::new() } else { vec![topics] },
        };
        let logs: Vec<RpcLog> = self.fetch("eth_getLogs", json!([filter])).await?;

        // newest first, one entry per transaction
        let mut events: Vec<EventRef> = Vec::new();
        for log in logs.iter().rev() {
            if log.removed {
                continue;
            }
            let Some(hash) = log.transaction_hash else {
                continue;
            };
            let id = hex::encode_prefixed(hash);
            if events.iter().any(|e| e.id == id) {
                continue;
            }
            let slot = log.block_number.map(|b| b.to::<u64>()).unwrap_or(0);
            events.push(EventRef { id, slot });
        }

        if let Some(before) = &query.before {
            let start = events
                .iter()
                .position(|e| e.id.eq_ignore_ascii_case(before))
                .map_or(events.len(), |i| i + 1);
            events.drain(..start);
        }
        let next_page = if events.len() > query.limit {
            events.truncate(query.limit);
            events.last().map(|e| e.id.clone())
        } else {
            None
        };

        Ok(EventBatch {
            events,
            cursor: Some(to.to_string()),
            next_page,
        })
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<ChainTransaction>, RpcError> {
        Ok(self.receipt(id).await?.map(|r| r.into_transaction(id)))
    }

    async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, RpcError> {
        let request = CallRequest {
            to: Self::address(to)?,
            data: Bytes::copy_from_slice(data),
        };
        let out: Bytes = self.fetch("eth_call", json!([request, "latest"])).await?;
        Ok(out.to_vec())
    }

    async fn prepare(&self, from: &str, payload: TxPayload) -> Result<UnsignedTx, RpcError> {
        let sender = Self::address(from)?;
        let (to, value, data, gas_limit) = match payload {
            TxPayload::Transfer { to, amount } => (to, amount, Vec::new(), TRANSFER_GAS),
            TxPayload::EvmCall {
                to,
                data,
                value,
                gas_limit,
            } => (to, value, data, gas_limit),
            TxPayload::Solana { .. } => {
                return Err(RpcError::Unsupported {
                    method: "instruction payload".to_string(),
                    family: ChainFamily::Evm,
                })
            }
        };

        let nonce: U64 = self
            .fetch("eth_getTransactionCount", json!([sender, "pending"]))
            .await?;
        let gas_price = self.amount("eth_gasPrice", json!([])).await?;

        Ok(UnsignedTx::Evm(EvmTransaction {
            nonce: nonce.to::<u64>(),
            gas_price,
            gas_limit,
            to: Self::address(&to)?,
            value,
            data,
            chain_id: self.evm_chain_id,
        }))
    }

    async fn send(&self, tx: &SignedTx) -> Result<String, RpcError> {
        let raw = Bytes::copy_from_slice(&tx.raw);
        match self.fetch::<B256>("eth_sendRawTransaction", json!([raw])).await {
            Ok(hash) => Ok(hex::encode_prefixed(hash)),
            // a failover re-send of something the network already has
            Err(RpcError::Rpc { message, .. }) if message.to_lowercase().contains("already known") => {
                Ok(tx.tx_hash.clone())
            }
            Err(e) => Err(e),
        }
    }

    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, RpcError> {
        let Some(receipt) = self.receipt(tx_hash).await? else {
            return Ok(TxStatus::Pending);
        };
        match receipt.succeeded() {
            Some(true) => Ok(TxStatus::Confirmed),
            Some(false) => Ok(TxStatus::Failed("execution reverted".to_string())),
            None => Err(RpcError::Parse("receipt without status".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::rpc::tests::fixed_endpoint;
    use crate::adapters::rpc::RetryPolicy;
    use std::time::Duration;

    async fn client(chain_id: &str, evm_chain_id: u64, result: Value) -> EvmRpcClient {
        let endpoint = fixed_endpoint(result).await;
        let pool = RpcPool::new(chain_id, vec![endpoint], Duration::from_secs(2), RetryPolicy::default()).unwrap();
        EvmRpcClient::new(chain_id, evm_chain_id, pool)
    }

    #[test]
    fn test_receipt_into_transaction() {
        let receipt: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": "0x00000000000000000000000000000000000000000000000000000000000000ab",
            "status": "0x1",
            "from": "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f",
            "logs": [{
                "address": "0x5c69bee701ef814a2b6a3edd4b1652cb9cc5aa6f",
                "topics": ["0x0d3648bd0f6ba80134a33ba9275ac585d9d315f0ad8355cddefde31afa28d0e9"],
                "data": "0x0102",
                "blockNumber": "0x10",
                "removed": false
            }]
        }))
        .unwrap();

        let tx = receipt.into_transaction("0xabc");
        assert!(!tx.failed);
        assert_eq!(tx.signer.as_deref(), Some("0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F"));
        assert_eq!(tx.evm_logs.len(), 1);
        assert_eq!(tx.evm_logs[0].data.to_vec(), vec![1, 2]);
        assert_eq!(
            tx.evm_logs[0].address,
            parse_address("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f").unwrap()
        );
    }

    #[test]
    fn test_reverted_receipt_is_failed() {
        let receipt: RpcReceipt = serde_json::from_value(json!({"status": "0x0", "logs": []})).unwrap();
        assert!(receipt.into_transaction("0xdead").failed);
    }

    #[test]
    fn test_log_filter_shape() {
        let filter = LogFilter {
            from_block: U64::from(16u64),
            to_block: U64::from(255u64),
            address: parse_address("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f").unwrap(),
            topics: Vec::new(),
        };
        let value = serde_json::to_value(&filter).unwrap();
        assert_eq!(value["fromBlock"], "0x10");
        assert_eq!(value["toBlock"], "0xff");
        assert!(value.get("topics").is_none());
    }

    #[tokio::test]
    async fn test_token_account_balance_is_unsupported() {
        let client = client("bsc", 56, Value::Null).await;

        assert!(matches!(
            client.get_token_account_balance("0x00").await,
            Err(RpcError::Unsupported { family: ChainFamily::Evm, .. })
        ));
        assert_eq!(client.transaction_status("0xabc").await.unwrap(), TxStatus::Pending);
        assert_eq!(client.get_transaction("0xabc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_balance_parses_hex() {
        let client = client("ethereum", 1, json!("0x1bc16d674ec80000")).await;

        let balance = client
            .get_balance("0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F")
            .await
            .unwrap();
        assert_eq!(balance, 2_000_000_000_000_000_000);
        assert!(matches!(client.get_balance("0x1234").await, Err(RpcError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_garbage_result_is_parse_error() {
        let client = client("ethereum", 1, json!({"unexpected": true})).await;
        assert!(matches!(
            client.get_balance("0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F").await,
            Err(RpcError::Parse(_))
        ));
    }
}
