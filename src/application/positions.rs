//! Open position book
//!
//! The set of trades currently holding tokens, shared by the executor,
//! the position monitors and the sweepers.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::domain::trade::Trade;

#[derive(Debug, Default)]
pub struct PositionBook {
    trades: RwLock<HashMap<Uuid, Trade>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Trade>> {
        self.trades.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Trade>> {
        self.trades.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Track an open trade; anything else is ignored
    pub fn insert(&self, trade: Trade) -> bool {
        if !trade.is_open() {
            return false;
        }
        self.write().insert(trade.id, trade);
        true
    }

    /// Apply a new state; a trade that is no longer open leaves the book
    pub fn update(&self, trade: &Trade) {
        let mut trades = self.write();
        if trade.is_open() {
            trades.insert(trade.id, trade.clone());
        } else {
            trades.remove(&trade.id);
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Trade> {
        self.read().get(id).cloned()
    }

    pub fn open_trades(&self) -> Vec<Trade> {
        let mut trades: Vec<Trade> = self.read().values().cloned().collect();
        trades.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        trades
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Whether the wallet holds any open position on the chain
    pub fn has_open_trade(&self, chain_id: &str, wallet: &str) -> bool {
        self.read()
            .values()
            .any(|t| t.target.chain_id == chain_id && t.wallet_address == wallet)
    }

    /// Wallets already holding `token` on the chain
    pub fn wallets_holding(&self, chain_id: &str, token: &str) -> HashSet<String> {
        self.read()
            .values()
            .filter(|t| t.target.chain_id == chain_id && t.target.token_address == token)
            .map(|t| t.wallet_address.clone())
            .collect()
    }
}
