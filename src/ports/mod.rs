//! Ports Layer - Trait definitions for external dependencies
//!
//! - `chain`: normalized JSON-RPC access per chain (`ChainClient`)
//! - `dex`: per-venue pool detection, quoting and swap building (`DexAdapter`)
//! - `mocks`: scriptable `ChainClient` for tests and offline wiring

pub mod chain;
pub mod dex;
pub mod mocks;

pub use chain::{ChainClient, RpcError, SignedTx, TxPayload, TxStatus, UnsignedTx};
pub use dex::{DexAdapter, DexError, Quote, QuoteRequest, SwapPlan, SwapRequest, SwapSide};
