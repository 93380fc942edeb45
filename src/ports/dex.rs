//! DEX adapter port
//!
//! One implementation per `DexKind`. Adapters are stateless: all chain
//! access goes through the `ChainClient` handed in by the caller.

use async_trait::async_trait;
use thiserror::Error;

use super::chain::{ChainClient, ChainTransaction, RpcError, TxPayload};
use crate::domain::chain::{Chain, DexKind, RouterInfo};
use crate::domain::target::{PoolAccounts, PoolCreated};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DexError {
    #[error("Missing account for {dex}: {account}")]
    MissingAccount { dex: DexKind, account: String },

    #[error("Pool does not belong to {0}")]
    WrongVenue(DexKind),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid pool state: {0}")]
    InvalidPool(String),

    #[error("Pool has no liquidity for this swap")]
    InsufficientLiquidity,

    #[error("Instruction encoding failed: {0}")]
    Encoding(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Direction of a swap relative to the chain's native asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapSide {
    /// native -> token
    Buy,
    /// token -> native
    Sell,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    pub pool: PoolAccounts,
    pub token_address: String,
    pub side: SwapSide,
    /// Base units of the input asset
    pub amount_in: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub amount_in: u128,
    pub amount_out: u128,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapRequest {
    /// Wallet that pays, signs and receives
    pub owner: String,
    pub pool: PoolAccounts,
    pub token_address: String,
    pub side: SwapSide,
    pub amount_in: u128,
    pub min_amount_out: u128,
    /// Unix seconds after which the swap must not execute (EVM routers)
    pub deadline: i64,
}

/// Transactions to submit in order, each confirmed before the next
#[derive(Debug, Clone, PartialEq)]
pub struct SwapPlan {
    pub steps: Vec<TxPayload>,
}

impl SwapPlan {
    pub fn single(step: TxPayload) -> Self {
        Self { steps: vec![step] }
    }
}

#[async_trait]
pub trait DexAdapter: Send + Sync {
    fn kind(&self) -> DexKind;

    /// EVM log topics identifying pool creation; empty on Solana
    fn event_topics(&self) -> Vec<String> {
        Vec::new()
    }

    /// Match a transaction against this venue's pool-creation pattern
    fn detect_pool_creation(
        &self,
        chain: &Chain,
        router: &RouterInfo,
        tx: &ChainTransaction,
    ) -> Option<PoolCreated>;

    /// Fill in pool accounts that only on-chain state can provide
    async fn resolve_pool(
        &self,
        _client: &dyn ChainClient,
        pool: &PoolAccounts,
    ) -> Result<PoolAccounts, DexError> {
        Ok(pool.clone())
    }

    async fn get_quote(
        &self,
        client: &dyn ChainClient,
        chain: &Chain,
        router: &RouterInfo,
        request: &QuoteRequest,
    ) -> Result<Quote, DexError>;

    fn build_swap_instruction(
        &self,
        chain: &Chain,
        router: &RouterInfo,
        request: &SwapRequest,
    ) -> Result<SwapPlan, DexError>;
}
