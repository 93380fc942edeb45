//! Treasury sweeps and wallet rebalancing math
//!
//! Amounts are native base units. The gas reserve of a wallet is never
//! moved, neither to treasury nor to another wallet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A completed transfer of surplus funds to a chain's treasury
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreasurySweep {
    pub chain_id: String,
    pub wallet_address: String,
    pub amount: u128,
    pub destination: String,
    pub tx_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// Amount that may leave a wallet: `balance - gas_reserve - commitments`, floored at zero
pub fn sweep_amount(balance: u128, gas_reserve: u128, pending_commitments: u128) -> u128 {
    balance
        .saturating_sub(gas_reserve)
        .saturating_sub(pending_commitments)
}

/// A sweep fires only when the surplus above the reserve exceeds the threshold
pub fn should_sweep(balance: u128, gas_reserve: u128, sweep_threshold: u128) -> bool {
    balance.saturating_sub(gas_reserve) > sweep_threshold
}

/// Under-funded wallets sit below this fraction of the pool average (percent)
pub const UNDERFUNDED_PCT: u128 = 50;

/// Over-funded wallets sit above this fraction of the pool average (percent)
pub const OVERFUNDED_PCT: u128 = 150;

/// One planned wallet-to-wallet transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceTransfer {
    pub from: String,
    pub to: String,
    pub amount: u128,
}

/// Plan transfers from over-funded to under-funded wallets
///
/// Each donor gives at most half of its excess over the average and never
/// dips into its gas reserve. Receivers are filled up to the average,
/// poorest first, from the richest donor first.
pub fn plan_rebalance(balances: &[(String, u128)], gas_reserve: u128) -> Vec<RebalanceTransfer> {
    if balances.len() < 2 {
        return Vec::new();
    }

    let total: u128 = balances.iter().map(|(_, b)| *b).sum();
    let avg = total / balances.len() as u128;
    if avg == 0 {
        return Vec::new();
    }

    let mut donors: Vec<(String, u128)> = balances
        .iter()
        .filter(|(_, b)| b * 100 > avg * OVERFUNDED_PCT)
        .map(|(addr, b)| {
            let give = ((b - avg) / 2).min(b.saturating_sub(gas_reserve));
            (addr.clone(), give)
        })
        .filter(|(_, give)| *give > 0)
        .collect();
    donors.sort_by(|a, b| b.1.cmp(&a.1));

    let mut receivers: Vec<(String, u128)> = balances
        .iter()
        .filter(|(_, b)| b * 100 < avg * UNDERFUNDED_PCT)
        .map(|(addr, b)| (addr.clone(), avg - b))
        .collect();
    receivers.sort_by(|a, b| b.1.cmp(&a.1));

    let mut transfers = Vec::new();
    let mut donor_idx = 0;

    for (to, mut need) in receivers {
        while need > 0 && donor_idx < donors.len() {
            let (from, available) = &mut donors[donor_idx];
            let amount = need.min(*available);
            if amount > 0 {
                transfers.push(RebalanceTransfer {
                    from: from.clone(),
                    to: to.clone(),
                    amount,
                });
                need -= amount;
                *available -= amount;
            }
            if *available == 0 {
                donor_idx += 1;
            }
        }
    }

    transfers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallets(balances: &[u128]) -> Vec<(String, u128)> {
        balances
            .iter()
            .enumerate()
            .map(|(i, b)| (format!("w{}", i), *b))
            .collect()
    }

    #[test]
    fn test_sweep_amount_keeps_reserve() {
        assert_eq!(sweep_amount(10_000, 1_000, 0), 9_000);
        assert_eq!(sweep_amount(500, 1_000, 0), 0);
        assert_eq!(sweep_amount(10_000, 1_000, 2_000), 7_000);
        assert_eq!(sweep_amount(10_000, 1_000, 20_000), 0);
    }

    #[test]
    fn test_should_sweep_threshold_is_strict() {
        assert!(should_sweep(6_001, 1_000, 5_000));
        assert!(!should_sweep(6_000, 1_000, 5_000));
        assert!(!should_sweep(100, 1_000, 0));
    }

    #[test]
    fn test_rebalance_moves_from_rich_to_poor() {
        // avg = 1000; w0 over 150%, w1 under 50%
        let plan = plan_rebalance(&wallets(&[2_000, 100, 900]), 10);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].from, "w0");
        assert_eq!(plan[0].to, "w1");
        // donor gives half of its excess (500), receiver needs 900
        assert_eq!(plan[0].amount, 500);
    }

    #[test]
    fn test_rebalance_noop_when_balanced() {
        assert!(plan_rebalance(&wallets(&[1_000, 1_100, 900]), 10).is_empty());
        assert!(plan_rebalance(&wallets(&[1_000]), 10).is_empty());
        assert!(plan_rebalance(&wallets(&[0, 0]), 10).is_empty());
    }

    #[test]
    fn test_rebalance_respects_donor_reserve() {
        // avg = 1000; w0 excess 2000 -> give 1000, but reserve caps at 3000 - 2500
        let plan = plan_rebalance(&wallets(&[3_000, 0, 0]), 2_500);
        let given: u128 = plan.iter().filter(|t| t.from == "w0").map(|t| t.amount).sum();
        assert_eq!(given, 500);
    }

    #[test]
    fn test_rebalance_splits_donor_across_receivers() {
        // avg = 1000; donor gives (4000-1000)/2 = 1500 across two receivers
        let plan = plan_rebalance(&wallets(&[4_000, 0, 0, 0]), 0);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].amount, 1_000);
        assert_eq!(plan[1].amount, 500);
    }
}
