//! Chain access port
//!
//! Everything the engine needs from a chain, normalized across Solana and
//! EVM JSON-RPC so that callers never see response-shape differences.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use solana_sdk::{hash::Hash, instruction::Instruction, pubkey::Pubkey};
use std::time::Duration;
use thiserror::Error;

use crate::domain::chain::ChainFamily;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpcError {
    #[error("RPC request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP transport failed: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Rate limited, try again later")]
    RateLimited,

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("{method} is not available on {family} chains")]
    Unsupported { method: String, family: ChainFamily },

    #[error("All {attempts} attempts across endpoints failed, last error: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl RpcError {
    /// Errors worth failing over to another endpoint for
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RpcError::Timeout(_)
                | RpcError::Transport(_)
                | RpcError::HttpStatus(_)
                | RpcError::RateLimited
                | RpcError::Exhausted { .. }
        )
    }
}

/// What the watcher asks for on each poll
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    /// Program / factory address to watch
    pub address: String,
    /// EVM log topic filter (topic0); ignored on Solana
    pub topics: Vec<String>,
    /// Opaque position returned by the previous poll
    pub cursor: Option<String>,
    /// Page further back: only events older than this id
    pub before: Option<String>,
    pub limit: usize,
}

/// A transaction reference returned by a poll, newest first
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventRef {
    pub id: String,
    pub slot: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventBatch {
    pub events: Vec<EventRef>,
    /// Cursor to pass to the next poll
    pub cursor: Option<String>,
    /// Set when the page hit the limit; pass as `before` to read older events
    pub next_page: Option<String>,
}

/// Account / contract state at call time
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccountSnapshot {
    pub address: String,
    pub balance: u128,
    /// Owning program (Solana only)
    pub owner: Option<String>,
    /// Executable program or deployed bytecode
    pub executable: bool,
    pub data: Vec<u8>,
}

impl AccountSnapshot {
    pub fn data_len(&self) -> usize {
        self.data.len()
    }
}

/// One top-level instruction of a Solana transaction with resolved keys
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawInstruction {
    pub program_id: String,
    pub accounts: Vec<String>,
    pub data: Vec<u8>,
}

/// Pre/post token balance of one token account in a transaction
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TokenDelta {
    pub account: String,
    pub mint: String,
    pub owner: Option<String>,
    pub decimals: u8,
    pub pre: u128,
    pub post: u128,
}

impl TokenDelta {
    pub fn change(&self) -> i128 {
        self.post as i128 - self.pre as i128
    }
}

/// An EVM log entry
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvmLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// A fetched transaction in a chain-neutral shape
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChainTransaction {
    pub id: String,
    pub block_time: Option<i64>,
    pub failed: bool,
    pub signer: Option<String>,
    pub instructions: Vec<RawInstruction>,
    pub log_messages: Vec<String>,
    pub token_deltas: Vec<TokenDelta>,
    pub evm_logs: Vec<EvmLog>,
}

/// What a transaction should do, before chain-specific preparation
#[derive(Debug, Clone, PartialEq)]
pub enum TxPayload {
    /// Plain native value transfer
    Transfer { to: String, amount: u128 },
    /// Solana instructions, paid and signed by the sender
    Solana { instructions: Vec<Instruction> },
    /// EVM contract call
    EvmCall {
        to: String,
        data: Vec<u8>,
        value: u128,
        gas_limit: u64,
    },
}

/// Legacy EIP-155 transaction fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

/// A transaction with fresh blockhash / nonce, ready for signing
#[derive(Debug, Clone, PartialEq)]
pub enum UnsignedTx {
    Solana {
        payer: Pubkey,
        instructions: Vec<Instruction>,
        recent_blockhash: Hash,
    },
    Evm(EvmTransaction),
}

/// Wire-ready signed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub raw: Vec<u8>,
    /// Signature (Solana) or transaction hash (EVM)
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed(String),
}

/// Normalized RPC access to one chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> &str;

    fn family(&self) -> ChainFamily;

    /// Native balance in base units
    async fn get_balance(&self, address: &str) -> Result<u128, RpcError>;

    /// Account / contract state, `None` if it does not exist
    async fn get_account(&self, address: &str) -> Result<Option<AccountSnapshot>, RpcError>;

    /// Balance of a specific token account (Solana vaults), base units
    async fn get_token_account_balance(&self, token_account: &str) -> Result<u128, RpcError>;

    /// Amount of `token` held by `owner`, zero when it holds none
    async fn get_token_holdings(&self, owner: &str, token: &str) -> Result<u128, RpcError>;

    /// Recent transactions touching a program / emitting a log
    async fn poll_events(&self, query: &EventQuery) -> Result<EventBatch, RpcError>;

    /// Full transaction detail. `None` when the node has not indexed it yet.
    async fn get_transaction(&self, id: &str) -> Result<Option<ChainTransaction>, RpcError>;

    /// Read-only contract call (EVM `eth_call`)
    async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, RpcError>;

    /// Attach blockhash or nonce/gas price to a payload
    async fn prepare(&self, from: &str, payload: TxPayload) -> Result<UnsignedTx, RpcError>;

    /// Submit a signed transaction, returning its hash/signature
    async fn send(&self, tx: &SignedTx) -> Result<String, RpcError>;

    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, RpcError>;
}
