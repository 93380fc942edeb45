//! Sniper Targets
//!
//! A freshly discovered pool, as emitted by the pool watcher and consumed by
//! the trade executor. Carries the on-chain accounts needed to trade against
//! the pool so later stages never re-parse the creation transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chain::DexKind;

/// Accounts identifying a pool on its venue
///
/// Fields that can only be learned from on-chain state after detection
/// (market side accounts, current tick) are optional and filled in by the
/// venue adapter's pool resolution step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolAccounts {
    /// Raydium AMM v4 pool paired with an OpenBook/Serum market
    Raydium {
        amm: String,
        amm_authority: String,
        open_orders: String,
        target_orders: String,
        coin_mint: String,
        pc_mint: String,
        coin_vault: String,
        pc_vault: String,
        market_program: String,
        market: String,
        #[serde(default)]
        market_accounts: Option<MarketAccounts>,
    },
    /// Orca Whirlpool (concentrated liquidity)
    Whirlpool {
        whirlpool: String,
        token_mint_a: String,
        token_mint_b: String,
        token_vault_a: String,
        token_vault_b: String,
        tick_spacing: u16,
        #[serde(default)]
        tick_current_index: Option<i32>,
        #[serde(default)]
        sqrt_price_x64: Option<u128>,
        #[serde(default)]
        fee_rate: Option<u16>,
    },
    /// Serum / OpenBook order book market
    SerumMarket {
        market: String,
        market_accounts: MarketAccounts,
        coin_lot_size: u64,
        pc_lot_size: u64,
        fee_rate_bps: u16,
    },
    /// Uniswap V2 style constant product pair
    UniswapV2Pair {
        pair: String,
        token0: String,
        token1: String,
    },
}

/// Order book side accounts of a Serum/OpenBook market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketAccounts {
    pub request_queue: String,
    pub event_queue: String,
    pub bids: String,
    pub asks: String,
    pub coin_vault: String,
    pub pc_vault: String,
    pub coin_mint: String,
    pub pc_mint: String,
    pub vault_signer: String,
}

impl PoolAccounts {
    /// Primary pool address (AMM id, whirlpool, market or pair)
    pub fn address(&self) -> &str {
        match self {
            PoolAccounts::Raydium { amm, .. } => amm,
            PoolAccounts::Whirlpool { whirlpool, .. } => whirlpool,
            PoolAccounts::SerumMarket { market, .. } => market,
            PoolAccounts::UniswapV2Pair { pair, .. } => pair,
        }
    }
}

/// Result of matching a pool-creation transaction
#[derive(Debug, Clone, PartialEq)]
pub struct PoolCreated {
    pub token_address: String,
    pub token_decimals: u8,
    /// Initial native-side liquidity, whole native units
    pub initial_liquidity: f64,
    /// Native units per whole token
    pub initial_price: f64,
    pub pool: PoolAccounts,
    /// Transaction that created the pool
    pub source_tx: String,
}

impl PoolCreated {
    /// Zero or unparsable liquidity/price is never tradable
    pub fn is_tradable(&self) -> bool {
        self.initial_liquidity.is_finite()
            && self.initial_price.is_finite()
            && self.initial_liquidity > 0.0
            && self.initial_price > 0.0
    }
}

/// A token discovered on a fresh pool, pending risk analysis and execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SniperTarget {
    pub token_address: String,
    pub token_decimals: u8,
    pub chain_id: String,
    pub dex: DexKind,
    pub liquidity: f64,
    pub price: f64,
    pub volume_24h: f64,
    /// None until the risk analyzer has scored the token
    pub risk_score: Option<f64>,
    pub discovered_at: DateTime<Utc>,
    pub pool: PoolAccounts,
    pub source_tx: String,
}

impl SniperTarget {
    /// Build an unscored target from a pool-creation match
    pub fn from_pool(chain_id: &str, dex: DexKind, created: PoolCreated) -> Self {
        Self {
            token_address: created.token_address,
            token_decimals: created.token_decimals,
            chain_id: chain_id.to_string(),
            dex,
            liquidity: created.initial_liquidity,
            price: created.initial_price,
            volume_24h: 0.0,
            risk_score: None,
            discovered_at: Utc::now(),
            pool: created.pool,
            source_tx: created.source_tx,
        }
    }

    /// Attach a risk score, clamped into [0, 1]
    pub fn with_risk_score(mut self, score: f64) -> Self {
        let score = if score.is_nan() { 1.0 } else { score.clamp(0.0, 1.0) };
        self.risk_score = Some(score);
        self
    }

    /// Whether this target may be traded under `threshold`
    ///
    /// Unscored targets never pass.
    pub fn passes_risk(&self, threshold: f64) -> bool {
        matches!(self.risk_score, Some(score) if score <= threshold)
    }

    /// Deduplication key
    pub fn key(&self) -> (String, String) {
        (self.token_address.clone(), self.chain_id.clone())
    }
}
