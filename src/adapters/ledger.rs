//! Trade Ledger
//!
//! Append-only JSON lines, one record per trade state change or sweep:
//!
//! ```text
//! {"type":"trade","trade":{...},"recorded_at":"..."}
//! {"type":"sweep","sweep":{...},"recorded_at":"..."}
//! ```
//!
//! Replaying the file yields the latest state of every trade id, which is
//! how open positions and today's trade counts survive a restart.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::limits::DailyTradeLimiter;
use crate::domain::sweep::TreasurySweep;
use crate::domain::trade::Trade;

/// Default ledger file name
pub const DEFAULT_LEDGER_FILE: &str = "ledger.jsonl";

#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("Failed to serialize ledger record: {0}")]
    SerializationError(String),

    #[error("Failed to write ledger {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Failed to read ledger {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Trade,
    Sweep,
}

/// One line of the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade: Option<Trade>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep: Option<TreasurySweep>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerRecord {
    pub fn trade(trade: &Trade) -> Self {
        Self {
            kind: RecordKind::Trade,
            trade: Some(trade.clone()),
            sweep: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn sweep(sweep: &TreasurySweep) -> Self {
        Self {
            kind: RecordKind::Sweep,
            trade: None,
            sweep: Some(sweep.clone()),
            recorded_at: Utc::now(),
        }
    }
}

/// Append handle shared by the executor, monitors and sweepers
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Ledger {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LedgerError::WriteError {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
        let mut line =
            serde_json::to_string(record).map_err(|e| LedgerError::SerializationError(e.to_string()))?;
        line.push('\n');

        let write_error = |e: std::io::Error| LedgerError::WriteError {
            path: self.path.clone(),
            reason: e.to_string(),
        };

        // a poisoned lock only means another writer panicked mid-append
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_error)?;
        file.write_all(line.as_bytes()).map_err(write_error)?;
        file.flush().map_err(write_error)
    }

    pub fn record_trade(&self, trade: &Trade) -> Result<(), LedgerError> {
        self.append(&LedgerRecord::trade(trade))?;
        tracing::debug!("Ledger: trade {} -> {}", trade.id, trade.status);
        Ok(())
    }

    pub fn record_sweep(&self, sweep: &TreasurySweep) -> Result<(), LedgerError> {
        self.append(&LedgerRecord::sweep(sweep))?;
        tracing::debug!("Ledger: sweep {} from {}", sweep.tx_hash, sweep.wallet_address);
        Ok(())
    }

    pub fn replay(&self) -> Result<LedgerState, LedgerError> {
        LedgerState::load(&self.path)
    }
}

/// Folded ledger contents
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    trades: HashMap<Uuid, Trade>,
    /// Trade ids in first-seen order
    order: Vec<Uuid>,
    pub sweeps: Vec<TreasurySweep>,
    /// Lines that failed to parse (e.g. a torn final write)
    pub skipped_lines: usize,
}

impl LedgerState {
    /// Fold a ledger file; a missing file is an empty ledger
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let mut state = Self::default();
        if !path.exists() {
            return Ok(state);
        }

        let read_error = |e: std::io::Error| LedgerError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let file = fs::File::open(path).map_err(read_error)?;

        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(read_error)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LedgerRecord>(&line) {
                Ok(record) => state.apply(record),
                Err(e) => {
                    tracing::warn!("Skipping ledger line {}: {}", idx + 1, e);
                    state.skipped_lines += 1;
                }
            }
        }

        tracing::info!(
            "Ledger replayed: {} trades ({} open), {} sweeps",
            state.trades.len(),
            state.open_trades().len(),
            state.sweeps.len()
        );
        Ok(state)
    }

    pub fn apply(&mut self, record: LedgerRecord) {
        if let Some(trade) = record.trade {
            if !self.trades.contains_key(&trade.id) {
                self.order.push(trade.id);
            }
            self.trades.insert(trade.id, trade);
        }
        if let Some(sweep) = record.sweep {
            self.sweeps.push(sweep);
        }
    }

    /// Latest state of every trade, in first-seen order
    pub fn trades(&self) -> Vec<&Trade> {
        self.order.iter().filter_map(|id| self.trades.get(id)).collect()
    }

    pub fn get(&self, id: &Uuid) -> Option<&Trade> {
        self.trades.get(id)
    }

    pub fn open_trades(&self) -> Vec<Trade> {
        self.trades().into_iter().filter(|t| t.is_open()).cloned().collect()
    }

    /// Rebuild the daily counter from attempts made on `day`
    pub fn restore_daily_counts(&self, limiter: &mut DailyTradeLimiter, day: NaiveDate) {
        for trade in self.trades() {
            if trade.opened_at.date_naive() == day {
                limiter.record(&trade.target.chain_id, &trade.wallet_address, trade.opened_at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::tests::open_trade;
    use crate::domain::trade::ExitReason;
    use tempfile::tempdir;

    fn sweep() -> TreasurySweep {
        TreasurySweep {
            chain_id: "solana".into(),
            wallet_address: "Wallet1".into(),
            amount: 2_500_000_000,
            destination: "Treasury".into(),
            tx_hash: "sig".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_record_format() {
        let line = serde_json::to_string(&LedgerRecord::sweep(&sweep())).unwrap();
        assert!(line.starts_with(r#"{"type":"sweep""#));
        assert!(!line.contains("\"trade\""));
    }

    #[test]
    fn test_missing_ledger_is_empty() {
        let dir = tempdir().unwrap();
        let state = LedgerState::load(&dir.path().join("none.jsonl")).unwrap();
        assert!(state.trades().is_empty());
        assert!(state.sweeps.is_empty());
    }

    #[test]
    fn test_replay_keeps_latest_trade_state() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("data").join(DEFAULT_LEDGER_FILE)).unwrap();

        let mut closed = open_trade(1.0);
        ledger.record_trade(&closed).unwrap();
        closed.close(1.6, "exit-sig", ExitReason::TakeProfit).unwrap();
        ledger.record_trade(&closed).unwrap();

        let still_open = open_trade(2.0);
        ledger.record_trade(&still_open).unwrap();
        ledger.record_sweep(&sweep()).unwrap();

        let state = ledger.replay().unwrap();
        assert_eq!(state.trades().len(), 2);
        assert_eq!(state.get(&closed.id).unwrap().exit_price, Some(1.6));

        let open = state.open_trades();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, still_open.id);
        assert_eq!(open[0].position_size, still_open.position_size);

        assert_eq!(state.sweeps.len(), 1);
        assert_eq!(state.sweeps[0].amount, 2_500_000_000);
    }

    #[test]
    fn test_torn_line_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_LEDGER_FILE);
        let ledger = Ledger::open(&path).unwrap();
        ledger.record_trade(&open_trade(1.0)).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"type\":\"trade\",\"tra").unwrap();

        let state = LedgerState::load(&path).unwrap();
        assert_eq!(state.trades().len(), 1);
        assert_eq!(state.skipped_lines, 1);
    }

    #[test]
    fn test_restore_daily_counts() {
        let mut state = LedgerState::default();
        let today = Utc::now();
        for _ in 0..2 {
            state.apply(LedgerRecord::trade(&open_trade(1.0)));
        }

        let mut limiter = DailyTradeLimiter::new(2);
        state.restore_daily_counts(&mut limiter, today.date_naive());

        let trade = open_trade(1.0);
        assert_eq!(limiter.count(&trade.target.chain_id, &trade.wallet_address, today), 2);
        assert!(!limiter.can_trade(&trade.target.chain_id, &trade.wallet_address, today));
    }
}
