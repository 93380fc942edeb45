//! Pool Event Watcher
//!
//! One loop per (chain, dex). Each tick fetches recent transactions on the
//! venue's pool-creation program (Solana signatures / EVM `PairCreated`
//! logs), pulls their detail and lets the DEX adapter recognise new pools.
//! Tradable pools leave as unscored `SniperTarget`s on a bounded channel.
//!
//! The first successful poll only primes the cursor: pools created before
//! startup are not sniped.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::adapters::dex::adapter_for;
use crate::adapters::rpc::jittered;
use crate::domain::chain::{Chain, DexKind, RegistryError, RouterInfo};
use crate::domain::target::SniperTarget;
use crate::ports::chain::{ChainClient, EventQuery, RpcError};
use crate::ports::dex::DexAdapter;

/// Default tick interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default ceiling for failure backoff
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Signatures / logs requested per poll
pub const DEFAULT_EVENT_LIMIT: usize = 10;

/// Pages read back in one tick before giving up on a burst
pub const DEFAULT_MAX_PAGES: usize = 5;

/// Signatures remembered to skip duplicates
pub const DEFAULT_SEEN_CAPACITY: usize = 10_000;

/// Ticks a not-yet-indexed transaction is retried for
pub const DEFAULT_MAX_FETCH_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    pub max_backoff: Duration,
    /// Spread applied to backoff delays, 0.0 - 1.0
    pub jitter: f64,
    pub event_limit: usize,
    pub max_pages: usize,
    pub seen_capacity: usize,
    pub max_fetch_attempts: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_backoff: DEFAULT_MAX_BACKOFF,
            jitter: 0.2,
            event_limit: DEFAULT_EVENT_LIMIT,
            max_pages: DEFAULT_MAX_PAGES,
            seen_capacity: DEFAULT_SEEN_CAPACITY,
            max_fetch_attempts: DEFAULT_MAX_FETCH_ATTEMPTS,
        }
    }
}

impl WatcherConfig {
    /// Delay before the next tick after `failures` consecutive failures
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.poll_interval;
        }
        let exp = self
            .poll_interval
            .saturating_mul(2u32.saturating_pow(failures.min(16)));
        jittered(exp.min(self.max_backoff), self.jitter)
    }
}

/// Insertion-ordered set that forgets its oldest entries past `capacity`
#[derive(Debug)]
pub struct SeenSet {
    entries: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns false if already present
    pub fn insert(&mut self, id: &str) -> bool {
        if self.entries.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub struct PoolEventWatcher {
    chain: Chain,
    dex: DexKind,
    router: RouterInfo,
    client: Arc<dyn ChainClient>,
    adapter: &'static dyn DexAdapter,
    config: WatcherConfig,
    cursor: Option<String>,
    primed: bool,
    seen: SeenSet,
    /// Transactions not indexed yet, with attempts so far
    retry: VecDeque<(String, u32)>,
}

impl PoolEventWatcher {
    pub fn new(
        chain: Chain,
        dex: DexKind,
        client: Arc<dyn ChainClient>,
        config: WatcherConfig,
    ) -> Result<Self, RegistryError> {
        let router = chain
            .dex_programs
            .get(&dex)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownDex {
                chain: chain.id.clone(),
                dex,
            })?;

        Ok(Self {
            seen: SeenSet::new(config.seen_capacity),
            chain,
            dex,
            router,
            client,
            adapter: adapter_for(dex),
            config,
            cursor: None,
            primed: false,
            retry: VecDeque::new(),
        })
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.chain.id, self.dex)
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn pending_retries(&self) -> usize {
        self.retry.len()
    }

    /// One tick: poll, fetch and detect. Errors only when nothing got through.
    pub async fn poll_once(&mut self) -> Result<Vec<SniperTarget>, RpcError> {
        let query = EventQuery {
            address: self.router.pool_program_address.clone(),
            topics: self.adapter.event_topics(),
            cursor: self.cursor.clone(),
            before: None,
            limit: self.config.event_limit,
        };
        let mut batch = self.client.poll_events(&query).await?;

        // a full page may hide older events since the cursor; the backlog
        // before priming is skipped anyway
        let mut pages = 1;
        while self.primed && pages < self.config.max_pages.max(1) {
            let Some(before) = batch.next_page.take() else {
                break;
            };
            let page = self
                .client
                .poll_events(&EventQuery {
                    before: Some(before),
                    ..query.clone()
                })
                .await?;
            batch.events.extend(page.events);
            batch.next_page = page.next_page;
            pages += 1;
        }
        if self.primed && batch.next_page.is_some() {
            tracing::warn!(
                "Watcher {}: still {} events per page after {} pages, older events may be missed",
                self.label(),
                self.config.event_limit,
                pages
            );
        }
        self.cursor = batch.cursor.clone().or_else(|| self.cursor.take());

        if !self.primed {
            self.primed = true;
            for event in &batch.events {
                self.seen.insert(&event.id);
            }
            tracing::info!(
                "Watcher {} primed at {:?}, skipped {} earlier events",
                self.label(),
                self.cursor,
                batch.events.len()
            );
            return Ok(Vec::new());
        }

        let mut work: Vec<(String, u32)> = self.retry.drain(..).collect();
        // events arrive newest first; detect oldest first
        for event in batch.events.iter().rev() {
            if self.seen.insert(&event.id) {
                work.push((event.id.clone(), 0));
            }
        }

        let mut targets = Vec::new();
        let mut last_error = None;

        for (id, attempts) in work {
            match self.client.get_transaction(&id).await {
                Ok(Some(tx)) => {
                    if tx.failed {
                        continue;
                    }
                    let Some(created) = self.adapter.detect_pool_creation(&self.chain, &self.router, &tx) else {
                        continue;
                    };
                    if !created.is_tradable() {
                        tracing::debug!(
                            "Watcher {}: discarding {} (liquidity {}, price {})",
                            self.label(),
                            created.token_address,
                            created.initial_liquidity,
                            created.initial_price
                        );
                        continue;
                    }
                    tracing::info!(
                        "New pool on {}: token {} liquidity {:.4} {} price {:.10} (tx: {})",
                        self.label(),
                        created.token_address,
                        created.initial_liquidity,
                        self.chain.native_symbol,
                        created.initial_price,
                        id
                    );
                    targets.push(SniperTarget::from_pool(&self.chain.id, self.dex, created));
                }
                Ok(None) => self.requeue(id, attempts),
                Err(e) => {
                    tracing::debug!("Watcher {}: fetching {} failed: {}", self.label(), id, e);
                    self.requeue(id, attempts);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if targets.is_empty() => Err(e),
            _ => Ok(targets),
        }
    }

    fn requeue(&mut self, id: String, attempts: u32) {
        let attempts = attempts + 1;
        if attempts < self.config.max_fetch_attempts {
            self.retry.push_back((id, attempts));
        } else {
            tracing::warn!(
                "Watcher {}: giving up on {} after {} attempts",
                self.label(),
                id,
                attempts
            );
        }
    }

    /// Poll until cancelled or the receiver is gone
    pub async fn run(mut self, output: mpsc::Sender<SniperTarget>, cancel: CancellationToken) {
        let label = self.label();
        tracing::info!("Watcher {} started (program {})", label, self.router.pool_program_address);
        let mut failures: u32 = 0;

        while !cancel.is_cancelled() {
            match self.poll_once().await {
                Ok(targets) => {
                    failures = 0;
                    for target in targets {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            sent = output.send(target) => {
                                if sent.is_err() {
                                    tracing::info!("Watcher {}: intake closed, stopping", label);
                                    return;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    tracing::warn!("Watcher {} poll failed ({} in a row): {}", label, failures, e);
                }
            }

            let delay = self.config.delay_after(failures);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Watcher {} stopped", label);
    }
}
