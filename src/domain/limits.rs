//! Trade Limits
//!
//! Position sizing, slippage floors and the per-wallet daily trade counter.
//! Days roll over at UTC midnight.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

/// Default cap on trades per wallet per day
pub const DEFAULT_MAX_DAILY_TRADES: u32 = 5;

/// Default fraction of a wallet's balance committed to one trade
pub const DEFAULT_SIZING_FRACTION: f64 = 0.1;

/// `min(balance * sizing_fraction, max_position)`, in base units
pub fn position_size(balance: u128, sizing_fraction: f64, max_position: u128) -> u128 {
    let fraction = if sizing_fraction.is_finite() {
        sizing_fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let scaled = (balance as f64 * fraction).floor() as u128;
    scaled.min(max_position).min(balance)
}

/// Quoted output reduced by the slippage tolerance, in base units
pub fn min_amount_out(quoted_out: u128, slippage_tolerance: f64) -> u128 {
    let tolerance = if slippage_tolerance.is_finite() {
        slippage_tolerance.clamp(0.0, 1.0)
    } else {
        1.0
    };
    // basis-point integer math keeps large u128 amounts exact
    let keep_bps = ((1.0 - tolerance) * 10_000.0).round() as u128;
    quoted_out / 10_000 * keep_bps + quoted_out % 10_000 * keep_bps / 10_000
}

/// Counts trades per (chain, wallet) for the current UTC day
#[derive(Debug, Clone)]
pub struct DailyTradeLimiter {
    max_daily_trades: u32,
    counts: HashMap<(String, String), (NaiveDate, u32)>,
}

impl DailyTradeLimiter {
    pub fn new(max_daily_trades: u32) -> Self {
        Self {
            max_daily_trades,
            counts: HashMap::new(),
        }
    }

    pub fn max_daily_trades(&self) -> u32 {
        self.max_daily_trades
    }

    /// Trades counted today for a wallet
    pub fn count(&self, chain_id: &str, wallet: &str, now: DateTime<Utc>) -> u32 {
        let today = now.date_naive();
        match self.counts.get(&(chain_id.to_string(), wallet.to_string())) {
            Some((day, count)) if *day == today => *count,
            _ => 0,
        }
    }

    pub fn can_trade(&self, chain_id: &str, wallet: &str, now: DateTime<Utc>) -> bool {
        self.count(chain_id, wallet, now) < self.max_daily_trades
    }

    /// Record a trade attempt. Returns false (and records nothing) when the
    /// wallet is already at its limit.
    pub fn record(&mut self, chain_id: &str, wallet: &str, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        let entry = self
            .counts
            .entry((chain_id.to_string(), wallet.to_string()))
            .or_insert((today, 0));

        if entry.0 != today {
            *entry = (today, 0);
        }
        if entry.1 >= self.max_daily_trades {
            return false;
        }
        entry.1 += 1;
        true
    }

    /// Hand back a slot taken by `record` for a trade that never reached
    /// the chain
    pub fn release(&mut self, chain_id: &str, wallet: &str, now: DateTime<Utc>) {
        let today = now.date_naive();
        if let Some((day, count)) = self.counts.get_mut(&(chain_id.to_string(), wallet.to_string())) {
            if *day == today {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// Wallets of a chain that are at the limit today
    pub fn exhausted_wallets(&self, chain_id: &str, now: DateTime<Utc>) -> Vec<String> {
        let today = now.date_naive();
        self.counts
            .iter()
            .filter(|((chain, _), (day, count))| {
                chain == chain_id && *day == today && *count >= self.max_daily_trades
            })
            .map(|((_, wallet), _)| wallet.clone())
            .collect()
    }
}

impl Default for DailyTradeLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DAILY_TRADES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_position_size_is_capped() {
        // 10 SOL balance, 10% sizing, 0.1 SOL cap
        assert_eq!(position_size(10_000_000_000, 0.1, 100_000_000), 100_000_000);
        // 0.5 SOL balance -> 0.05 SOL, under the cap
        assert_eq!(position_size(500_000_000, 0.1, 100_000_000), 50_000_000);
        assert_eq!(position_size(0, 0.1, 100_000_000), 0);
        assert_eq!(position_size(1_000, f64::NAN, 1_000), 0);
    }

    #[test]
    fn test_position_size_never_exceeds_cap() {
        for balance in [1u128, 999, 10u128.pow(12), 10u128.pow(24)] {
            for fraction in [0.0, 0.1, 0.5, 1.0, 7.0] {
                assert!(position_size(balance, fraction, 5_000) <= 5_000);
            }
        }
    }

    #[test]
    fn test_min_amount_out() {
        assert_eq!(min_amount_out(1_000_000, 0.05), 950_000);
        assert_eq!(min_amount_out(1_000_000, 0.0), 1_000_000);
        assert_eq!(min_amount_out(1_000_000, 1.0), 0);
        assert_eq!(min_amount_out(10u128.pow(30), 0.01), 99 * 10u128.pow(28));
    }

    #[test]
    fn test_daily_limit() {
        let mut limiter = DailyTradeLimiter::new(2);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        assert!(limiter.record("solana", "w1", now));
        assert!(limiter.record("solana", "w1", now));
        assert!(!limiter.can_trade("solana", "w1", now));
        assert!(!limiter.record("solana", "w1", now));
        assert_eq!(limiter.count("solana", "w1", now), 2);

        // other wallets and chains are independent
        assert!(limiter.can_trade("solana", "w2", now));
        assert!(limiter.can_trade("bsc", "w1", now));
        assert_eq!(limiter.exhausted_wallets("solana", now), vec!["w1".to_string()]);
    }

    #[test]
    fn test_daily_limit_rolls_over() {
        let mut limiter = DailyTradeLimiter::new(1);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 0).unwrap();
        assert!(limiter.record("solana", "w1", now));
        assert!(!limiter.can_trade("solana", "w1", now));

        let tomorrow = now + Duration::minutes(2);
        assert!(limiter.can_trade("solana", "w1", tomorrow));
        assert!(limiter.record("solana", "w1", tomorrow));
        assert!(limiter.exhausted_wallets("solana", now).is_empty());
    }

    #[test]
    fn test_released_slot_can_be_reused() {
        let mut limiter = DailyTradeLimiter::new(1);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(limiter.record("solana", "w1", now));
        assert!(!limiter.record("solana", "w1", now));

        limiter.release("solana", "w1", now);
        assert_eq!(limiter.count("solana", "w1", now), 0);
        assert!(limiter.record("solana", "w1", now));

        // yesterday's release never touches today's count
        limiter.release("solana", "w1", now - Duration::days(1));
        assert_eq!(limiter.count("solana", "w1", now), 1);
        limiter.release("solana", "w2", now);
        assert_eq!(limiter.count("solana", "w2", now), 0);
    }
}
