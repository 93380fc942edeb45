//! Trade Lifecycle
//!
//! A trade moves `Pending -> Open -> Closed` or `Pending -> Failed`.
//! `Closed` and `Failed` are terminal: any further transition is rejected.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::target::SniperTarget;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TradeError {
    #[error("Invalid transition for trade {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: TradeStatus,
        to: TradeStatus,
    },

    #[error("Invalid entry price: {0}")]
    InvalidEntryPrice(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Pending,
    Open,
    Closed,
    Failed,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeStatus::Closed | TradeStatus::Failed)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Pending => write!(f, "PENDING"),
            TradeStatus::Open => write!(f, "OPEN"),
            TradeStatus::Closed => write!(f, "CLOSED"),
            TradeStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Why a position was exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TimeStop,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "take profit"),
            ExitReason::StopLoss => write!(f, "stop loss"),
            ExitReason::TimeStop => write!(f, "time stop"),
        }
    }
}

/// A single sniped position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub target: SniperTarget,
    pub wallet_address: String,
    /// Native amount spent, base units
    pub position_size: u128,
    /// Token amount expected from the entry quote, base units
    pub token_amount: u128,
    /// Native units per whole token
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub tx_hash: Option<String>,
    pub status: TradeStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub exit_tx_hash: Option<String>,
    #[serde(default)]
    pub exit_reason: Option<ExitReason>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl Trade {
    /// Create a pending trade about to be submitted
    pub fn pending(
        target: SniperTarget,
        wallet_address: impl Into<String>,
        position_size: u128,
        token_amount: u128,
        entry_price: f64,
    ) -> Result<Self, TradeError> {
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(TradeError::InvalidEntryPrice(entry_price));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            target,
            wallet_address: wallet_address.into(),
            position_size,
            token_amount,
            entry_price,
            stop_loss_price: 0.0,
            take_profit_price: 0.0,
            tx_hash: None,
            status: TradeStatus::Pending,
            opened_at: Utc::now(),
            closed_at: None,
            exit_price: None,
            exit_tx_hash: None,
            exit_reason: None,
            failure_reason: None,
        })
    }

    fn transition(&mut self, to: TradeStatus) -> Result<(), TradeError> {
        let allowed = matches!(
            (self.status, to),
            (TradeStatus::Pending, TradeStatus::Open)
                | (TradeStatus::Pending, TradeStatus::Failed)
                | (TradeStatus::Open, TradeStatus::Closed)
        );
        if !allowed {
            return Err(TradeError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Mark the entry as confirmed and fix the exit levels
    pub fn open(
        &mut self,
        tx_hash: impl Into<String>,
        stop_loss_pct: f64,
        take_profit_pct: f64,
    ) -> Result<(), TradeError> {
        self.transition(TradeStatus::Open)?;
        self.tx_hash = Some(tx_hash.into());
        self.stop_loss_price = self.entry_price * (1.0 - stop_loss_pct);
        self.take_profit_price = self.entry_price * (1.0 + take_profit_pct);
        self.opened_at = Utc::now();
        Ok(())
    }

    /// Mark the entry as failed. Funds are assumed to still be in the wallet.
    pub fn fail(&mut self, reason: impl Into<String>, tx_hash: Option<String>) -> Result<(), TradeError> {
        self.transition(TradeStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        if tx_hash.is_some() {
            self.tx_hash = tx_hash;
        }
        self.closed_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the position as exited
    pub fn close(
        &mut self,
        exit_price: f64,
        exit_tx_hash: impl Into<String>,
        reason: ExitReason,
    ) -> Result<(), TradeError> {
        self.transition(TradeStatus::Closed)?;
        self.exit_price = Some(exit_price);
        self.exit_tx_hash = Some(exit_tx_hash.into());
        self.exit_reason = Some(reason);
        self.closed_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Evaluate exit conditions against a fresh price
    ///
    /// Take profit wins over stop loss when both hold (degenerate levels);
    /// the time stop only fires when neither price level does.
    pub fn exit_trigger(
        &self,
        current_price: f64,
        now: DateTime<Utc>,
        max_hold: Option<Duration>,
    ) -> Option<ExitReason> {
        if !self.is_open() {
            return None;
        }
        if current_price.is_finite() {
            if current_price >= self.take_profit_price {
                return Some(ExitReason::TakeProfit);
            }
            if current_price <= self.stop_loss_price {
                return Some(ExitReason::StopLoss);
            }
        }
        match max_hold {
            Some(hold) if now - self.opened_at >= hold => Some(ExitReason::TimeStop),
            _ => None,
        }
    }

    /// Realized profit/loss in percent, once closed
    pub fn pnl_pct(&self) -> Option<f64> {
        self.exit_price
            .map(|exit| (exit - self.entry_price) / self.entry_price * 100.0)
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}/{} wallet={} entry={:.10} SL={:.10} TP={:.10}",
            self.status,
            self.target.token_address,
            self.target.chain_id,
            self.target.dex,
            self.wallet_address,
            self.entry_price,
            self.stop_loss_price,
            self.take_profit_price
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::chain::DexKind;
    use crate::domain::target::tests::created;
    use approx::assert_relative_eq;

    pub(crate) fn open_trade(entry_price: f64) -> Trade {
        let target = SniperTarget::from_pool("ethereum", DexKind::UniswapV2, created(50.0, entry_price))
            .with_risk_score(0.1);
        let mut trade = Trade::pending(target, "0xwallet", 100, 1_000, entry_price).unwrap();
        trade.open("0xentry", 0.10, 0.50).unwrap();
        trade
    }

    #[test]
    fn test_open_sets_exit_levels() {
        let trade = open_trade(1.0);
        assert_eq!(trade.status, TradeStatus::Open);
        assert_relative_eq!(trade.stop_loss_price, 0.9);
        assert_relative_eq!(trade.take_profit_price, 1.5);
        assert_eq!(trade.tx_hash.as_deref(), Some("0xentry"));
    }

    #[test]
    fn test_take_profit_and_stop_loss_triggers() {
        let trade = open_trade(1.0);
        let now = Utc::now();

        assert_eq!(trade.exit_trigger(1.5, now, None), Some(ExitReason::TakeProfit));
        assert_eq!(trade.exit_trigger(0.9, now, None), Some(ExitReason::StopLoss));
        assert_eq!(trade.exit_trigger(1.2, now, None), None);
        assert_eq!(trade.exit_trigger(f64::NAN, now, None), None);
    }

    #[test]
    fn test_time_stop() {
        let trade = open_trade(1.0);
        let later = trade.opened_at + Duration::hours(25);
        assert_eq!(
            trade.exit_trigger(1.1, later, Some(Duration::hours(24))),
            Some(ExitReason::TimeStop)
        );
        assert_eq!(trade.exit_trigger(1.1, later, None), None);
    }

    #[test]
    fn test_terminal_trades_are_immutable() {
        let mut trade = open_trade(1.0);
        trade.close(1.5, "0xexit", ExitReason::TakeProfit).unwrap();
        assert_eq!(trade.status, TradeStatus::Closed);
        assert!(trade.closed_at.is_some());
        assert_relative_eq!(trade.pnl_pct().unwrap(), 50.0);

        assert!(trade.close(2.0, "0xagain", ExitReason::TakeProfit).is_err());
        assert!(trade.fail("late", None).is_err());
        assert_eq!(trade.exit_tx_hash.as_deref(), Some("0xexit"));
    }

    #[test]
    fn test_pending_can_fail_but_not_close() {
        let target = SniperTarget::from_pool("ethereum", DexKind::UniswapV2, created(50.0, 1.0));
        let mut trade = Trade::pending(target, "0xwallet", 100, 1_000, 1.0).unwrap();

        assert!(trade.close(1.0, "0x", ExitReason::StopLoss).is_err());
        trade.fail("confirmation timeout", Some("0xsent".to_string())).unwrap();
        assert_eq!(trade.status, TradeStatus::Failed);
        assert_eq!(trade.tx_hash.as_deref(), Some("0xsent"));
        assert!(trade.open("0x", 0.1, 0.5).is_err());
    }

    #[test]
    fn test_rejects_non_positive_entry_price() {
        let target = SniperTarget::from_pool("ethereum", DexKind::UniswapV2, created(50.0, 1.0));
        assert!(Trade::pending(target, "0xwallet", 100, 1_000, 0.0).is_err());
    }

    #[test]
    fn test_trade_json_round_trip_keeps_large_amounts() {
        let mut trade = open_trade(1.0);
        trade.position_size = 50_000_000_000_000_000_000;
        let line = serde_json::to_string(&trade).unwrap();
        let back: Trade = serde_json::from_str(&line).unwrap();
        assert_eq!(back, trade);
    }
}
