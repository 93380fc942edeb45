//! Application Layer - Pipeline services
//!
//! - `watcher`: pool-creation polling per (chain, dex)
//! - `risk_analyzer`: contract + liquidity scoring, fails closed
//! - `wallet_pool`: encrypted per-chain wallets, locks and signing
//! - `executor`: risk-gated entries and exits
//! - `position_monitor`: SL/TP/time-stop loop per open trade
//! - `sweeper`: treasury sweeps of idle balances
//! - `orchestrator`: wires the above together

pub mod executor;
pub mod orchestrator;
pub mod position_monitor;
pub mod positions;
pub mod risk_analyzer;
pub mod sweeper;
pub mod throttle;
pub mod wallet_pool;
pub mod watcher;

pub use executor::{ExecutionError, ExecutionOutcome, ExecutorConfig, ExitQuote, Rejection, TradeExecutor};
pub use orchestrator::{OrchestratorConfig, OrchestratorError, OrchestratorStatus, SniperOrchestrator};
pub use position_monitor::{MonitorConfig, MonitorTick, PositionMonitor};
pub use positions::PositionBook;
pub use risk_analyzer::{LiquidityTiers, RiskAnalyzer};
pub use sweeper::{SweepConfig, TreasurySweeper};
pub use throttle::{DedupCache, ExecutionRateLimiter};
pub use wallet_pool::{Wallet, WalletError, WalletPool, WalletPoolConfig};
pub use watcher::{PoolEventWatcher, WatcherConfig};
