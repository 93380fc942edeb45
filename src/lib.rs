//! chain-sniper - Multi-chain new-pool sniping engine
//!
//! Watches DEXes on Solana and EVM chains for newly created pools, scores
//! each token for rug risk, enters with bounded slippage from a rotating
//! pool of hot wallets, exits on stop loss / take profit / time stop and
//! sweeps idle balances to treasury.
//!
//! # Modules
//!
//! - `domain`: Chains, targets, trades, risk scoring and limits
//! - `ports`: `ChainClient` and `DexAdapter` abstractions
//! - `adapters`: Solana/EVM RPC, DEX venues, keystore, ledger, CLI
//! - `config`: Configuration loading and validation
//! - `application`: Watchers, executor, monitors, sweeper, orchestrator

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
