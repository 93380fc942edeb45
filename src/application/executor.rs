//! Trade Executor
//!
//! Turns a scored `SniperTarget` into a confirmed position, and a position
//! back into native on exit. Expected refusals (risk, daily limit, funds)
//! come back as `ExecutionOutcome::Rejected`, not as errors.
//!
//! Entry sequence:
//! 1. risk gate, then a funded wallet with its daily slot reserved in the
//!    same step (the slot is handed back if the entry aborts before
//!    submission)
//! 2. size, resolve pool accounts, quote, slippage floor
//! 3. under the wallet lock: prepare -> sign -> submit -> confirm, per step
//! 4. `Trade` opened or failed, written to the ledger either way

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::positions::PositionBook;
use super::wallet_pool::{WalletError, WalletPool};
use crate::adapters::dex::adapter_for;
use crate::adapters::ledger::{Ledger, LedgerState};
use crate::domain::chain::{from_base_units, ChainRegistry, RegistryError};
use crate::domain::limits::{min_amount_out, position_size, DailyTradeLimiter, DEFAULT_MAX_DAILY_TRADES, DEFAULT_SIZING_FRACTION};
use crate::domain::target::SniperTarget;
use crate::domain::trade::{ExitReason, Trade, TradeError};
use crate::ports::chain::RpcError;
use crate::ports::dex::{DexError, QuoteRequest, SwapPlan, SwapRequest, SwapSide};

/// Router swaps expire this many seconds after submission
pub const SWAP_DEADLINE_SECS: i64 = 300;

/// Prefix of the transaction hash recorded for dry-run trades
pub const DRY_RUN_PREFIX: &str = "dry-run:";

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Dex(#[from] DexError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Trade(#[from] TradeError),

    #[error("Quote for {token} returned nothing")]
    EmptyQuote { token: String },

    #[error("Wallet {wallet} holds no {token} to sell")]
    NothingToSell { wallet: String, token: String },
}

/// Why a target was not traded
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    RiskRejected { score: Option<f64>, threshold: f64 },
    DailyLimitReached { chain_id: String },
    InsufficientFunds {
        chain_id: String,
        required: u128,
        available: u128,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::RiskRejected { score: Some(score), threshold } => {
                write!(f, "risk {:.2} above threshold {:.2}", score, threshold)
            }
            Rejection::RiskRejected { score: None, .. } => write!(f, "not risk scored"),
            Rejection::DailyLimitReached { chain_id } => {
                write!(f, "every wallet on {} hit its daily trade limit", chain_id)
            }
            Rejection::InsufficientFunds {
                chain_id,
                required,
                available,
            } => write!(
                f,
                "no wallet on {} holds {} (best {})",
                chain_id, required, available
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Opened(Trade),
    Rejected(Rejection),
    Failed(Trade),
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Highest acceptable risk score
    pub risk_threshold: f64,
    /// Whole native units
    pub max_position_per_trade: f64,
    pub sizing_fraction: f64,
    pub slippage_tolerance: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_daily_trades: u32,
    /// Sign but never submit
    pub dry_run: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            risk_threshold: 0.5,
            max_position_per_trade: 0.1,
            sizing_fraction: DEFAULT_SIZING_FRACTION,
            slippage_tolerance: 0.05,
            stop_loss_pct: 0.2,
            take_profit_pct: 0.5,
            max_daily_trades: DEFAULT_MAX_DAILY_TRADES,
            dry_run: false,
        }
    }
}

/// Price of an open position if sold now
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitQuote {
    pub token_amount: u128,
    pub native_out: u128,
    /// Native per whole token
    pub price: f64,
}

#[derive(Clone, Copy)]
enum LockKind {
    Entry,
    Exit,
}

/// A failed plan step, with the hash if it got as far as submission
struct StepFailure {
    tx_hash: Option<String>,
    error: ExecutionError,
}

/// A daily trade slot taken at wallet selection. Handed back on drop
/// unless the trade reached submission.
struct DailySlot<'a> {
    limiter: &'a Mutex<DailyTradeLimiter>,
    chain_id: String,
    wallet: String,
    now: DateTime<Utc>,
    kept: bool,
}

impl DailySlot<'_> {
    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for DailySlot<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.limiter
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .release(&self.chain_id, &self.wallet, self.now);
        }
    }
}

pub struct TradeExecutor {
    registry: Arc<ChainRegistry>,
    wallets: Arc<WalletPool>,
    ledger: Arc<Ledger>,
    positions: Arc<PositionBook>,
    limiter: Mutex<DailyTradeLimiter>,
    config: ExecutorConfig,
}

impl TradeExecutor {
    pub fn new(
        registry: Arc<ChainRegistry>,
        wallets: Arc<WalletPool>,
        ledger: Arc<Ledger>,
        positions: Arc<PositionBook>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            limiter: Mutex::new(DailyTradeLimiter::new(config.max_daily_trades)),
            registry,
            wallets,
            ledger,
            positions,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    fn limiter(&self) -> MutexGuard<'_, DailyTradeLimiter> {
        self.limiter.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// True when the chain has wallets and every one of them is at its
    /// daily limit
    fn all_exhausted(&self, chain_id: &str, now: DateTime<Utc>) -> Result<bool, WalletError> {
        let wallets = self.wallets.wallets(chain_id)?;
        let limiter = self.limiter();
        Ok(!wallets.is_empty() && wallets.iter().all(|w| !limiter.can_trade(chain_id, &w.address, now)))
    }

    fn reserve_slot(&self, chain_id: &str, wallet: &str, now: DateTime<Utc>) -> Option<DailySlot<'_>> {
        if !self.limiter().record(chain_id, wallet, now) {
            return None;
        }
        Some(DailySlot {
            limiter: &self.limiter,
            chain_id: chain_id.to_string(),
            wallet: wallet.to_string(),
            now,
            kept: false,
        })
    }

    /// Re-count today's attempts from a replayed ledger
    pub fn restore_daily_counts(&self, state: &LedgerState) {
        state.restore_daily_counts(&mut self.limiter(), Utc::now().date_naive());
    }

    pub fn trades_today(&self, chain_id: &str, wallet: &str) -> u32 {
        self.limiter().count(chain_id, wallet, Utc::now())
    }

    /// Try to open a position on `target`
    pub async fn execute(&self, target: SniperTarget) -> Result<ExecutionOutcome, ExecutionError> {
        let chain_id = target.chain_id.clone();
        let token = target.token_address.clone();

        if !target.passes_risk(self.config.risk_threshold) {
            return Ok(ExecutionOutcome::Rejected(Rejection::RiskRejected {
                score: target.risk_score,
                threshold: self.config.risk_threshold,
            }));
        }

        let chain = self.registry.get_chain(&chain_id)?;
        let router = self.registry.get_router(&chain_id, target.dex)?;
        let now = Utc::now();

        let mut excluded: HashSet<String> = self.positions.wallets_holding(&chain_id, &token).into_iter().collect();
        let max_position = chain.to_base_units(self.config.max_position_per_trade);

        // the daily slot is taken in the same step that picks the wallet
        let (wallet, slot) = loop {
            if self.all_exhausted(&chain_id, now)? {
                return Ok(ExecutionOutcome::Rejected(Rejection::DailyLimitReached { chain_id }));
            }
            excluded.extend(self.limiter().exhausted_wallets(&chain_id, now));

            let wallet = match self
                .wallets
                .get_wallet_for_trade_excluding(&chain_id, max_position, &excluded)
                .await
            {
                Ok(wallet) => wallet,
                Err(WalletError::InsufficientFunds {
                    chain_id,
                    required,
                    available,
                }) => {
                    if self.all_exhausted(&chain_id, now)? {
                        return Ok(ExecutionOutcome::Rejected(Rejection::DailyLimitReached { chain_id }));
                    }
                    return Ok(ExecutionOutcome::Rejected(Rejection::InsufficientFunds {
                        chain_id,
                        required,
                        available,
                    }));
                }
                Err(e) => return Err(e.into()),
            };

            match self.reserve_slot(&chain_id, &wallet.address, now) {
                Some(slot) => break (wallet, slot),
                None => {
                    tracing::debug!("Wallet {} on {} lost its last daily slot, reselecting", wallet.address, chain_id);
                    excluded.insert(wallet.address);
                }
            }
        };

        let committed = self.wallets.committed(&chain_id, &wallet.address)?;
        let size = position_size(
            wallet.balance_cache.saturating_sub(committed),
            self.config.sizing_fraction,
            max_position,
        );
        if size == 0 {
            return Ok(ExecutionOutcome::Rejected(Rejection::InsufficientFunds {
                chain_id,
                required: max_position,
                available: wallet.balance_cache,
            }));
        }
        let _commitment = self.wallets.commit(&chain_id, &wallet.address, size)?;

        let client = self.wallets.client(&chain_id)?;
        let adapter = adapter_for(target.dex);
        let pool = adapter.resolve_pool(client.as_ref(), &target.pool).await?;
        let quote = adapter
            .get_quote(
                client.as_ref(),
                chain,
                router,
                &QuoteRequest {
                    pool: pool.clone(),
                    token_address: token.clone(),
                    side: SwapSide::Buy,
                    amount_in: size,
                },
            )
            .await?;
        if quote.amount_out == 0 {
            return Err(ExecutionError::EmptyQuote { token });
        }

        let entry_price = from_base_units(size, chain.native_decimals)
            / from_base_units(quote.amount_out, target.token_decimals);
        let min_out = min_amount_out(quote.amount_out, self.config.slippage_tolerance);

        let dex = target.dex;
        let mut target = target;
        target.pool = pool.clone();
        let mut trade = Trade::pending(target, wallet.address.clone(), size, quote.amount_out, entry_price)?;

        let plan = adapter.build_swap_instruction(
            chain,
            router,
            &SwapRequest {
                owner: wallet.address.clone(),
                pool,
                token_address: token.clone(),
                side: SwapSide::Buy,
                amount_in: size,
                min_amount_out: min_out,
                deadline: now.timestamp() + SWAP_DEADLINE_SECS,
            },
        )?;

        // submission counts against the day whatever the outcome
        slot.keep();
        tracing::info!(
            "{}ENTRY {}/{} token {} wallet {}: {} in, quoted {} out (min {}), entry {:.10}",
            if self.config.dry_run { "[DRY RUN] " } else { "" },
            chain_id,
            dex,
            token,
            wallet.address,
            size,
            quote.amount_out,
            min_out,
            entry_price
        );

        match self.run_plan(&chain_id, &wallet.address, plan, LockKind::Entry).await {
            Ok(tx_hash) => {
                trade.open(tx_hash, self.config.stop_loss_pct, self.config.take_profit_pct)?;
                self.persist(&trade);
                self.positions.insert(trade.clone());
                tracing::info!("Trade opened: {}", trade);
                Ok(ExecutionOutcome::Opened(trade))
            }
            Err(failure) => {
                trade.fail(failure.error.to_string(), failure.tx_hash)?;
                self.persist(&trade);
                tracing::warn!(
                    "Trade failed {}/{} token {} wallet {}: {}",
                    chain_id,
                    dex,
                    token,
                    wallet.address,
                    failure.error
                );
                Ok(ExecutionOutcome::Failed(trade))
            }
        }
    }

    /// Quote the wallet's actual holdings back to native
    pub async fn quote_exit(&self, trade: &Trade) -> Result<ExitQuote, ExecutionError> {
        let target = &trade.target;
        let chain = self.registry.get_chain(&target.chain_id)?;
        let router = self.registry.get_router(&target.chain_id, target.dex)?;
        let client = self.wallets.client(&target.chain_id)?;

        let held = client
            .get_token_holdings(&trade.wallet_address, &target.token_address)
            .await?;
        // nothing was bought in dry-run mode
        let token_amount = if self.config.dry_run && held == 0 {
            trade.token_amount
        } else {
            held
        };
        if token_amount == 0 {
            return Err(ExecutionError::NothingToSell {
                wallet: trade.wallet_address.clone(),
                token: target.token_address.clone(),
            });
        }

        let adapter = adapter_for(target.dex);
        let quote = adapter
            .get_quote(
                client.as_ref(),
                chain,
                router,
                &QuoteRequest {
                    pool: target.pool.clone(),
                    token_address: target.token_address.clone(),
                    side: SwapSide::Sell,
                    amount_in: token_amount,
                },
            )
            .await?;

        let tokens = from_base_units(token_amount, target.token_decimals);
        let price = if tokens > 0.0 {
            from_base_units(quote.amount_out, chain.native_decimals) / tokens
        } else {
            0.0
        };

        Ok(ExitQuote {
            token_amount,
            native_out: quote.amount_out,
            price,
        })
    }

    /// Sell a position under exit-priority locking and close the trade
    pub async fn exit(&self, trade: &Trade, reason: ExitReason, quote: ExitQuote) -> Result<Trade, ExecutionError> {
        let target = &trade.target;
        let chain = self.registry.get_chain(&target.chain_id)?;
        let router = self.registry.get_router(&target.chain_id, target.dex)?;
        let client = self.wallets.client(&target.chain_id)?;
        let adapter = adapter_for(target.dex);

        let pool = adapter.resolve_pool(client.as_ref(), &target.pool).await?;
        let plan = adapter.build_swap_instruction(
            chain,
            router,
            &SwapRequest {
                owner: trade.wallet_address.clone(),
                pool,
                token_address: target.token_address.clone(),
                side: SwapSide::Sell,
                amount_in: quote.token_amount,
                min_amount_out: min_amount_out(quote.native_out, self.config.slippage_tolerance),
                deadline: Utc::now().timestamp() + SWAP_DEADLINE_SECS,
            },
        )?;

        tracing::info!(
            "{}EXIT ({}) {}/{} token {} wallet {}: {} tokens at {:.10}",
            if self.config.dry_run { "[DRY RUN] " } else { "" },
            reason,
            target.chain_id,
            target.dex,
            target.token_address,
            trade.wallet_address,
            quote.token_amount,
            quote.price
        );

        let tx_hash = self
            .run_plan(&target.chain_id, &trade.wallet_address, plan, LockKind::Exit)
            .await
            .map_err(|f| f.error)?;

        let mut closed = trade.clone();
        closed.close(quote.price, tx_hash, reason)?;
        self.persist(&closed);
        self.positions.update(&closed);

        tracing::info!(
            "Trade closed: {} PnL {:.2}%",
            closed,
            closed.pnl_pct().unwrap_or(0.0)
        );
        Ok(closed)
    }

    /// Submit each step in order, confirming before the next. Returns the
    /// last step's hash.
    async fn run_plan(
        &self,
        chain_id: &str,
        wallet: &str,
        plan: SwapPlan,
        lock: LockKind,
    ) -> Result<String, StepFailure> {
        let no_hash = |e: WalletError| StepFailure {
            tx_hash: None,
            error: e.into(),
        };

        let guard = match lock {
            LockKind::Entry => self.wallets.lock_for_entry(chain_id, wallet).await,
            LockKind::Exit => self.wallets.lock_for_exit(chain_id, wallet).await,
        }
        .map_err(no_hash)?;

        let mut last_hash = None;
        for (idx, step) in plan.steps.into_iter().enumerate() {
            if self.config.dry_run {
                let signed = self.wallets.prepare_and_sign(&guard, step).await.map_err(no_hash)?;
                last_hash = Some(format!("{}{}", DRY_RUN_PREFIX, signed.tx_hash));
                continue;
            }

            let tx_hash = self.wallets.submit(&guard, step).await.map_err(no_hash)?;
            tracing::debug!("Step {} submitted from {}: {}", idx + 1, wallet, tx_hash);

            if let Err(e) = self.wallets.wait_for_confirmation(chain_id, &tx_hash).await {
                return Err(StepFailure {
                    tx_hash: Some(tx_hash),
                    error: e.into(),
                });
            }
            last_hash = Some(tx_hash);
        }

        last_hash.ok_or_else(|| StepFailure {
            tx_hash: None,
            error: DexError::Encoding("empty swap plan".into()).into(),
        })
    }

    fn persist(&self, trade: &Trade) {
        if let Err(e) = self.ledger.record_trade(trade) {
            tracing::error!("Failed to record trade {} in ledger: {}", trade.id, e);
        }
    }
}
