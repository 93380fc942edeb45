//! Domain Layer - Core types and pure logic
//!
//! No I/O here; chain access goes through the ports layer.

pub mod chain;
pub mod limits;
pub mod risk;
pub mod sweep;
pub mod target;
pub mod trade;

pub use chain::{Chain, ChainFamily, ChainRegistry, DexKind, RegistryError, RouterInfo};
pub use limits::DailyTradeLimiter;
pub use risk::{ContractFacts, RiskAssessment, RiskScorer};
pub use sweep::{RebalanceTransfer, TreasurySweep};
pub use target::{PoolAccounts, PoolCreated, SniperTarget};
pub use trade::{ExitReason, Trade, TradeError, TradeStatus};
