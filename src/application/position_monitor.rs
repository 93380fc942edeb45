//! Position Monitor
//!
//! One loop per open trade. Each tick quotes the wallet's holdings back to
//! native and checks take profit, stop loss and the time stop. A failed
//! quote or exit is logged and retried on the next tick.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::executor::TradeExecutor;
use super::positions::PositionBook;
use crate::adapters::rpc::DEFAULT_RPC_TIMEOUT;
use crate::domain::trade::Trade;

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// 24 hours
pub const DEFAULT_MAX_HOLD: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    /// Bound on each exit quote
    pub quote_timeout: Duration,
    /// `None` disables the time stop
    pub max_hold: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MONITOR_INTERVAL,
            quote_timeout: DEFAULT_RPC_TIMEOUT,
            max_hold: Some(DEFAULT_MAX_HOLD),
        }
    }
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorTick {
    Holding { price: f64 },
    Closed(Trade),
    /// Trade left the book elsewhere
    Gone,
    QuoteFailed(String),
    ExitFailed(String),
}

pub struct PositionMonitor {
    trade_id: Uuid,
    executor: Arc<TradeExecutor>,
    positions: Arc<PositionBook>,
    config: MonitorConfig,
}

impl PositionMonitor {
    pub fn new(
        trade_id: Uuid,
        executor: Arc<TradeExecutor>,
        positions: Arc<PositionBook>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            trade_id,
            executor,
            positions,
            config,
        }
    }

    pub fn trade_id(&self) -> Uuid {
        self.trade_id
    }

    fn max_hold(&self) -> Option<chrono::Duration> {
        self.config
            .max_hold
            .and_then(|d| chrono::Duration::from_std(d).ok())
    }

    /// Quote, evaluate and exit if a trigger fired
    pub async fn check_once(&self) -> MonitorTick {
        let Some(trade) = self.positions.get(&self.trade_id) else {
            return MonitorTick::Gone;
        };

        let quote = match tokio::time::timeout(self.config.quote_timeout, self.executor.quote_exit(&trade)).await {
            Ok(Ok(quote)) => quote,
            Ok(Err(e)) => {
                tracing::warn!(
                    "Exit quote failed for {} on {}/{} wallet {}: {}",
                    trade.target.token_address,
                    trade.target.chain_id,
                    trade.target.dex,
                    trade.wallet_address,
                    e
                );
                // the time stop does not need a price
                return match trade.exit_trigger(f64::NAN, Utc::now(), self.max_hold()) {
                    Some(_) => MonitorTick::QuoteFailed(format!("{} (time stop pending)", e)),
                    None => MonitorTick::QuoteFailed(e.to_string()),
                };
            }
            Err(_) => {
                tracing::warn!(
                    "Exit quote for {} on {} timed out after {:?}",
                    trade.target.token_address,
                    trade.target.chain_id,
                    self.config.quote_timeout
                );
                return MonitorTick::QuoteFailed("quote timed out".to_string());
            }
        };

        let Some(reason) = trade.exit_trigger(quote.price, Utc::now(), self.max_hold()) else {
            tracing::debug!(
                "{} {}: price {:.10} (SL {:.10} / TP {:.10})",
                trade.target.chain_id,
                trade.target.token_address,
                quote.price,
                trade.stop_loss_price,
                trade.take_profit_price
            );
            return MonitorTick::Holding { price: quote.price };
        };

        let change = (quote.price - trade.entry_price) / trade.entry_price * 100.0;
        tracing::info!(
            "{} triggered for {} on {}: {:.2}%",
            reason,
            trade.target.token_address,
            trade.target.chain_id,
            change
        );

        match self.executor.exit(&trade, reason, quote).await {
            Ok(closed) => MonitorTick::Closed(closed),
            Err(e) => {
                tracing::error!(
                    "Exit failed for {} on {}/{} wallet {}, retrying next tick: {}",
                    trade.target.token_address,
                    trade.target.chain_id,
                    trade.target.dex,
                    trade.wallet_address,
                    e
                );
                MonitorTick::ExitFailed(e.to_string())
            }
        }
    }

    /// Poll until the trade closes or `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!("Monitoring trade {}", self.trade_id);

        while !cancel.is_cancelled() {
            match self.check_once().await {
                MonitorTick::Closed(_) | MonitorTick::Gone => break,
                _ => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        tracing::debug!("Monitor for trade {} stopped", self.trade_id);
    }
}
