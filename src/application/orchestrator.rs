//! Sniper Orchestrator
//!
//! Wires the pipeline together:
//! watchers -> intake (dedup, rate limit, risk) -> executor -> position monitors,
//! plus per-chain treasury sweeps and rebalances.
//!
//! `run()` recovers open trades from the ledger, spawns every task and
//! returns once `stop()` has been called and all of them have wound down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::executor::{ExecutionOutcome, ExecutorConfig, TradeExecutor};
use super::position_monitor::{MonitorConfig, PositionMonitor};
use super::positions::PositionBook;
use super::risk_analyzer::{LiquidityTiers, RiskAnalyzer};
use super::sweeper::{SweepConfig, TreasurySweeper};
use super::throttle::{DedupCache, ExecutionRateLimiter, DEFAULT_DEDUP_WINDOW, DEFAULT_MAX_EXECUTIONS_PER_MINUTE};
use super::wallet_pool::WalletPool;
use super::watcher::{PoolEventWatcher, WatcherConfig};
use crate::adapters::ledger::{Ledger, LedgerError};
use crate::domain::chain::{ChainRegistry, RegistryError};
use crate::domain::target::SniperTarget;
use crate::ports::chain::ChainClient;

/// Default concurrent executions across all chains
pub const DEFAULT_MAX_CONCURRENT_TRADES: usize = 5;

/// 1 hour
pub const DEFAULT_REBALANCE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Buffered targets between watchers and intake
pub const DEFAULT_TARGET_QUEUE: usize = 256;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("No client configured for chain {0}")]
    MissingClient(String),
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub dedup_window: Duration,
    pub max_concurrent_trades: usize,
    pub max_executions_per_minute: u32,
    pub rebalance_interval: Duration,
    pub target_queue: usize,
    pub watcher: WatcherConfig,
    pub monitor: MonitorConfig,
    pub sweep: SweepConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dedup_window: DEFAULT_DEDUP_WINDOW,
            max_concurrent_trades: DEFAULT_MAX_CONCURRENT_TRADES,
            max_executions_per_minute: DEFAULT_MAX_EXECUTIONS_PER_MINUTE,
            rebalance_interval: DEFAULT_REBALANCE_INTERVAL,
            target_queue: DEFAULT_TARGET_QUEUE,
            watcher: WatcherConfig::default(),
            monitor: MonitorConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

/// Snapshot for logging and the CLI
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorStatus {
    pub is_running: bool,
    pub chains: usize,
    pub open_positions: usize,
    pub dedup_entries: usize,
}

pub struct SniperOrchestrator {
    registry: Arc<ChainRegistry>,
    wallets: Arc<WalletPool>,
    clients: HashMap<String, Arc<dyn ChainClient>>,
    ledger: Arc<Ledger>,
    positions: Arc<PositionBook>,
    risk: RiskAnalyzer,
    executor: Arc<TradeExecutor>,
    sweeper: Arc<TreasurySweeper>,
    dedup: Mutex<DedupCache>,
    rate_limiter: tokio::sync::Mutex<ExecutionRateLimiter>,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
    cancel: CancellationToken,
    config: OrchestratorConfig,
}

impl SniperOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ChainRegistry>,
        wallets: Arc<WalletPool>,
        clients: HashMap<String, Arc<dyn ChainClient>>,
        ledger: Arc<Ledger>,
        positions: Arc<PositionBook>,
        executor_config: ExecutorConfig,
        tiers: LiquidityTiers,
        config: OrchestratorConfig,
    ) -> Self {
        let executor = Arc::new(TradeExecutor::new(
            registry.clone(),
            wallets.clone(),
            ledger.clone(),
            positions.clone(),
            executor_config,
        ));
        let sweeper = Arc::new(TreasurySweeper::new(
            registry.clone(),
            wallets.clone(),
            positions.clone(),
            ledger.clone(),
            config.sweep.clone(),
        ));

        Self {
            risk: RiskAnalyzer::new(registry.clone(), clients.clone(), tiers),
            dedup: Mutex::new(DedupCache::new(config.dedup_window)),
            rate_limiter: tokio::sync::Mutex::new(ExecutionRateLimiter::new(config.max_executions_per_minute)),
            permits: Arc::new(Semaphore::new(config.max_concurrent_trades.max(1))),
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
            registry,
            wallets,
            clients,
            ledger,
            positions,
            executor,
            sweeper,
            config,
        }
    }

    pub fn executor(&self) -> &Arc<TradeExecutor> {
        &self.executor
    }

    pub fn positions(&self) -> &Arc<PositionBook> {
        &self.positions
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal every loop to finish; `run()` returns once they have
    pub fn stop(&self) {
        tracing::info!("Stop signal sent to orchestrator");
        self.cancel.cancel();
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            is_running: !self.cancel.is_cancelled(),
            chains: self.registry.len(),
            open_positions: self.positions.len(),
            dedup_entries: self.dedup.lock().unwrap_or_else(|p| p.into_inner()).len(),
        }
    }

    /// Load open trades and today's trade counts from the ledger
    pub fn recover(&self) -> Result<Vec<Uuid>, OrchestratorError> {
        let state = self.ledger.replay()?;
        if state.skipped_lines > 0 {
            tracing::warn!("Ledger replay skipped {} unreadable lines", state.skipped_lines);
        }
        self.executor.restore_daily_counts(&state);

        let mut recovered = Vec::new();
        for trade in state.open_trades() {
            if self.registry.get_chain(&trade.target.chain_id).is_err() {
                tracing::warn!(
                    "Open trade {} is on unconfigured chain {}, not monitoring",
                    trade.id,
                    trade.target.chain_id
                );
                continue;
            }
            recovered.push(trade.id);
            self.positions.insert(trade);
        }

        if !recovered.is_empty() {
            tracing::info!("Recovered {} open trades from ledger", recovered.len());
        }
        Ok(recovered)
    }

    fn spawn_monitor(self: &Arc<Self>, trade_id: Uuid) {
        let monitor = PositionMonitor::new(
            trade_id,
            self.executor.clone(),
            self.positions.clone(),
            self.config.monitor.clone(),
        );
        self.tasks.spawn(monitor.run(self.cancel.clone()));
    }

    fn spawn_watchers(&self, output: &mpsc::Sender<SniperTarget>) -> Result<usize, OrchestratorError> {
        let mut spawned = 0;
        for chain in self.registry.chains() {
            let client = self
                .clients
                .get(&chain.id)
                .cloned()
                .ok_or_else(|| OrchestratorError::MissingClient(chain.id.clone()))?;

            for dex in chain.dexes() {
                let watcher = PoolEventWatcher::new(chain.clone(), dex, client.clone(), self.config.watcher.clone())?;
                self.tasks.spawn(watcher.run(output.clone(), self.cancel.clone()));
                spawned += 1;
            }
        }
        Ok(spawned)
    }

    fn spawn_chain_upkeep(&self) {
        for chain_id in self.wallets.chain_ids() {
            self.tasks
                .spawn(self.sweeper.clone().run(chain_id.clone(), self.cancel.clone()));

            let wallets = self.wallets.clone();
            let cancel = self.cancel.clone();
            let interval = self.config.rebalance_interval;
            self.tasks.spawn(async move {
                while !cancel.is_cancelled() {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                    if let Err(e) = wallets.rebalance(&chain_id).await {
                        tracing::warn!("Rebalance on {} failed: {}", chain_id, e);
                    }
                }
            });
        }
    }

    /// Run until `stop()`; joins every spawned task before returning
    pub async fn run(self: Arc<Self>) -> Result<(), OrchestratorError> {
        tracing::info!(
            "Starting sniper orchestrator - chains: {}, dry run: {}, max concurrent: {}",
            self.registry.len(),
            self.executor.config().dry_run,
            self.config.max_concurrent_trades
        );

        for trade_id in self.recover()? {
            self.spawn_monitor(trade_id);
        }

        let (tx, mut rx) = mpsc::channel(self.config.target_queue.max(1));
        let watchers = match self.spawn_watchers(&tx) {
            Ok(count) => count,
            Err(e) => {
                self.cancel.cancel();
                self.tasks.close();
                self.tasks.wait().await;
                return Err(e);
            }
        };
        drop(tx);
        self.spawn_chain_upkeep();
        tracing::info!("{} watchers running", watchers);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                target = rx.recv() => match target {
                    Some(target) => self.intake(target),
                    None => break,
                },
            }
        }

        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        tracing::info!("Sniper orchestrator stopped");
        Ok(())
    }

    /// Dedup, then hand the target to its own task
    pub fn intake(self: &Arc<Self>, target: SniperTarget) {
        let fresh = self
            .dedup
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .check_and_insert(&target.token_address, &target.chain_id);
        if !fresh {
            tracing::debug!(
                "Duplicate target {} on {} inside dedup window, dropped",
                target.token_address,
                target.chain_id
            );
            return;
        }

        let this = self.clone();
        self.tasks.spawn(async move { this.process(target).await });
    }

    /// Risk, limits and execution for one target. Spawns a monitor on entry.
    pub async fn process(self: &Arc<Self>, target: SniperTarget) -> Option<ExecutionOutcome> {
        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            permit = self.permits.clone().acquire_owned() => permit.ok()?,
        };

        loop {
            let wait = self.rate_limiter.lock().await.try_acquire();
            match wait {
                Ok(()) => break,
                Err(wait) => {
                    tracing::debug!("Execution rate limit hit, waiting {:?}", wait);
                    tokio::select! {
                        _ = self.cancel.cancelled() => return None,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }

        let score = self
            .risk
            .analyze(&target.token_address, &target.chain_id, target.liquidity)
            .await;
        let target = target.with_risk_score(score);
        let (chain_id, dex, token) = (target.chain_id.clone(), target.dex, target.token_address.clone());

        match self.executor.execute(target).await {
            Ok(ExecutionOutcome::Opened(trade)) => {
                self.spawn_monitor(trade.id);
                Some(ExecutionOutcome::Opened(trade))
            }
            Ok(ExecutionOutcome::Rejected(reason)) => {
                tracing::info!("Rejected {} on {}/{}: {}", token, chain_id, dex, reason);
                Some(ExecutionOutcome::Rejected(reason))
            }
            Ok(outcome @ ExecutionOutcome::Failed(_)) => Some(outcome),
            Err(e) => {
                tracing::error!("Execution error for {} on {}/{}: {}", token, chain_id, dex, e);
                None
            }
        }
    }
}
