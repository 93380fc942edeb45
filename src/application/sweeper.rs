//! Treasury Sweeper
//!
//! Moves idle wallet balances above `gas_reserve + sweep_threshold` to the
//! chain's treasury. Wallets holding an open position are skipped, both
//! before and after taking the wallet lock.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::positions::PositionBook;
use super::wallet_pool::{WalletError, WalletPool};
use crate::adapters::ledger::Ledger;
use crate::domain::chain::{Chain, ChainRegistry};
use crate::domain::sweep::{should_sweep, sweep_amount, TreasurySweep};
use crate::ports::chain::TxPayload;

/// 1 hour
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: Duration,
    pub dry_run: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            dry_run: false,
        }
    }
}

pub struct TreasurySweeper {
    registry: Arc<ChainRegistry>,
    wallets: Arc<WalletPool>,
    positions: Arc<PositionBook>,
    ledger: Arc<Ledger>,
    config: SweepConfig,
}

impl TreasurySweeper {
    pub fn new(
        registry: Arc<ChainRegistry>,
        wallets: Arc<WalletPool>,
        positions: Arc<PositionBook>,
        ledger: Arc<Ledger>,
        config: SweepConfig,
    ) -> Self {
        Self {
            registry,
            wallets,
            positions,
            ledger,
            config,
        }
    }

    /// One sweep pass over a chain's wallets. Returns the confirmed sweeps.
    pub async fn sweep_chain(&self, chain_id: &str) -> Result<Vec<TreasurySweep>, WalletError> {
        let chain = self
            .registry
            .get_chain(chain_id)
            .map_err(|_| WalletError::UnknownChain(chain_id.to_string()))?;

        let mut swept = Vec::new();
        for wallet in self.wallets.wallets(chain_id)? {
            if self.positions.has_open_trade(chain_id, &wallet.address) {
                tracing::debug!("Sweep {}: {} holds an open trade, skipping", chain_id, wallet.address);
                continue;
            }

            match self.sweep_wallet(chain, &wallet.address).await {
                Ok(Some(sweep)) => swept.push(sweep),
                Ok(None) => {}
                Err(e) => tracing::warn!("Sweep of {} on {} failed: {}", wallet.address, chain_id, e),
            }
        }

        Ok(swept)
    }

    async fn sweep_wallet(&self, chain: &Chain, address: &str) -> Result<Option<TreasurySweep>, WalletError> {
        let balance = self.wallets.refresh_balance(&chain.id, address).await?;
        if !should_sweep(balance, chain.gas_reserve, chain.sweep_threshold) {
            return Ok(None);
        }

        let guard = self.wallets.lock_for_entry(&chain.id, address).await?;
        // an entry may have landed while we waited for the lock
        if self.positions.has_open_trade(&chain.id, address) {
            return Ok(None);
        }

        // the amount comes from a read taken under the lock
        let balance = self.wallets.fetch_balance(&chain.id, address).await?;
        if !should_sweep(balance, chain.gas_reserve, chain.sweep_threshold) {
            tracing::debug!("Sweep {}: {} fell to {} while waiting, skipping", chain.id, address, balance);
            return Ok(None);
        }

        let committed = self.wallets.committed(&chain.id, address)?;
        let amount = sweep_amount(balance, chain.gas_reserve, committed);
        if amount == 0 {
            return Ok(None);
        }

        if self.config.dry_run {
            tracing::info!(
                "[DRY RUN] Sweep {}: {} -> treasury {} amount {}",
                chain.id,
                address,
                chain.treasury,
                amount
            );
            return Ok(None);
        }

        let tx_hash = self
            .wallets
            .submit(
                &guard,
                TxPayload::Transfer {
                    to: chain.treasury.clone(),
                    amount,
                },
            )
            .await?;
        self.wallets.wait_for_confirmation(&chain.id, &tx_hash).await?;
        drop(guard);

        let sweep = TreasurySweep {
            chain_id: chain.id.clone(),
            wallet_address: address.to_string(),
            amount,
            destination: chain.treasury.clone(),
            tx_hash,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.ledger.record_sweep(&sweep) {
            tracing::error!("Failed to record sweep {} in ledger: {}", sweep.tx_hash, e);
        }

        tracing::info!(
            "Swept {} {} from {} to treasury {} (tx: {})",
            chain.to_native(amount),
            chain.native_symbol,
            address,
            chain.treasury,
            sweep.tx_hash
        );
        if let Err(e) = self.wallets.refresh_balance(&chain.id, address).await {
            tracing::warn!("Balance refresh after sweep of {} on {} failed: {}", address, chain.id, e);
        }
        Ok(Some(sweep))
    }

    /// Sweep `chain_id` every interval until cancelled
    pub async fn run(self: Arc<Self>, chain_id: String, cancel: CancellationToken) {
        tracing::info!("Treasury sweeper started for {} (every {:?})", chain_id, self.config.interval);

        while !cancel.is_cancelled() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            match self.sweep_chain(&chain_id).await {
                Ok(swept) if !swept.is_empty() => {
                    tracing::info!("Sweep {}: {} wallets swept", chain_id, swept.len())
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Sweep pass on {} failed: {}", chain_id, e),
            }
        }

        tracing::debug!("Treasury sweeper for {} stopped", chain_id);
    }
}
