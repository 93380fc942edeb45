//! Hot Wallet Pool
//!
//! Owns every wallet of every configured chain. Secrets stay sealed in the
//! keystore and are decrypted only inside `sign`, into a buffer that is
//! wiped when the call returns.
//!
//! Each wallet has a transaction lock held across
//! prepare -> sign -> submit -> confirm, so nonces and blockhashes are never
//! interleaved. Exits jump the queue: while an exit waits for a wallet,
//! entry requests for that wallet stand aside.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, OwnedMutexGuard};

use crate::adapters::keystore::{Keystore, KeystoreError, StoredWallet};
use crate::adapters::{evm, solana};
use crate::domain::chain::{Chain, ChainFamily, ChainRegistry};
use crate::domain::sweep::{plan_rebalance, RebalanceTransfer};
use crate::ports::chain::{ChainClient, RpcError, SignedTx, TxPayload, TxStatus, UnsignedTx};

/// Default cap on wallets per chain
pub const DEFAULT_MAX_WALLETS_PER_CHAIN: usize = 10;

/// Default number of wallets created at startup per chain
pub const DEFAULT_MIN_WALLETS_PER_CHAIN: usize = 1;

/// Default wait for a submitted transaction to confirm
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default status polling interval while confirming
pub const DEFAULT_CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    #[error("Unknown wallet {address} on {chain_id}")]
    UnknownWallet { chain_id: String, address: String },

    #[error("Insufficient funds on {chain_id}: need {required}, best wallet has {available}")]
    InsufficientFunds {
        chain_id: String,
        required: u128,
        available: u128,
    },

    #[error("Wallet limit of {max} reached on {chain_id}")]
    PoolFull { chain_id: String, max: usize },

    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    SigningError(String),

    #[error("Transaction {tx_hash} failed on chain: {reason}")]
    TransactionFailed { tx_hash: String, reason: String },

    #[error("Transaction {tx_hash} not confirmed within {timeout:?}")]
    ConfirmationTimeout { tx_hash: String, timeout: Duration },

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Public view of a pooled wallet
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    pub address: String,
    pub chain_id: String,
    pub encrypted_secret: String,
    /// Last known native balance, base units
    pub balance_cache: u128,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<StoredWallet> for Wallet {
    fn from(stored: StoredWallet) -> Self {
        Self {
            address: stored.address,
            chain_id: stored.chain_id,
            encrypted_secret: stored.encrypted_secret,
            balance_cache: 0,
            last_used: None,
            created_at: stored.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalletPoolConfig {
    pub max_wallets_per_chain: usize,
    pub min_wallets_per_chain: usize,
    pub confirmation_timeout: Duration,
    pub confirm_poll_interval: Duration,
    /// Log rebalance plans instead of submitting them
    pub dry_run: bool,
}

impl Default for WalletPoolConfig {
    fn default() -> Self {
        Self {
            max_wallets_per_chain: DEFAULT_MAX_WALLETS_PER_CHAIN,
            min_wallets_per_chain: DEFAULT_MIN_WALLETS_PER_CHAIN,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            confirm_poll_interval: DEFAULT_CONFIRM_POLL_INTERVAL,
            dry_run: false,
        }
    }
}

#[derive(Debug)]
struct SlotState {
    wallet: Wallet,
    /// Native amount promised to in-flight entries
    committed: u128,
}

#[derive(Debug)]
struct WalletSlot {
    state: Mutex<SlotState>,
    tx_lock: Arc<tokio::sync::Mutex<()>>,
    pending_exits: AtomicUsize,
    exit_done: Notify,
}

impl WalletSlot {
    fn new(wallet: Wallet) -> Self {
        Self {
            state: Mutex::new(SlotState { wallet, committed: 0 }),
            tx_lock: Arc::new(tokio::sync::Mutex::new(())),
            pending_exits: AtomicUsize::new(0),
            exit_done: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn address(&self) -> String {
        self.state().wallet.address.clone()
    }
}

struct ChainWallets {
    chain: Chain,
    client: Arc<dyn ChainClient>,
    slots: RwLock<Vec<Arc<WalletSlot>>>,
}

impl ChainWallets {
    fn slots(&self) -> Vec<Arc<WalletSlot>> {
        self.slots.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn find(&self, address: &str) -> Option<Arc<WalletSlot>> {
        self.slots().into_iter().find(|s| s.state().wallet.address == address)
    }
}

/// Exclusive right to transact from one wallet
pub struct WalletGuard {
    pub chain_id: String,
    pub address: String,
    _guard: OwnedMutexGuard<()>,
}

impl std::fmt::Debug for WalletGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WalletGuard({}/{})", self.chain_id, self.address)
    }
}

/// Native amount reserved on a wallet until dropped
#[derive(Debug)]
pub struct Commitment {
    slot: Arc<WalletSlot>,
    amount: u128,
}

impl Commitment {
    pub fn amount(&self) -> u128 {
        self.amount
    }
}

impl Drop for Commitment {
    fn drop(&mut self) {
        let mut state = self.slot.state();
        state.committed = state.committed.saturating_sub(self.amount);
    }
}

pub struct WalletPool {
    chains: HashMap<String, ChainWallets>,
    keystore: Keystore,
    config: WalletPoolConfig,
}

impl WalletPool {
    /// Pool over every registry chain that has a client
    pub fn new(
        registry: &ChainRegistry,
        clients: &HashMap<String, Arc<dyn ChainClient>>,
        keystore: Keystore,
        config: WalletPoolConfig,
    ) -> Self {
        let chains = registry
            .chains()
            .into_iter()
            .filter_map(|chain| {
                let client = clients.get(&chain.id)?.clone();
                Some((
                    chain.id.clone(),
                    ChainWallets {
                        chain: chain.clone(),
                        client,
                        slots: RwLock::new(Vec::new()),
                    },
                ))
            })
            .collect();

        Self {
            chains,
            keystore,
            config,
        }
    }

    pub fn config(&self) -> &WalletPoolConfig {
        &self.config
    }

    fn chain_wallets(&self, chain_id: &str) -> Result<&ChainWallets, WalletError> {
        self.chains
            .get(chain_id)
            .ok_or_else(|| WalletError::UnknownChain(chain_id.to_string()))
    }

    fn slot(&self, chain_id: &str, address: &str) -> Result<Arc<WalletSlot>, WalletError> {
        self.chain_wallets(chain_id)?
            .find(address)
            .ok_or_else(|| WalletError::UnknownWallet {
                chain_id: chain_id.to_string(),
                address: address.to_string(),
            })
    }

    pub fn chain_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.chains.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn client(&self, chain_id: &str) -> Result<Arc<dyn ChainClient>, WalletError> {
        Ok(self.chain_wallets(chain_id)?.client.clone())
    }

    /// Register the keystore's wallets under their stored addresses. Secrets
    /// stay sealed; a bad key or record surfaces on the wallet's first `sign`.
    pub fn load_existing(&self) -> Result<usize, WalletError> {
        let mut loaded = 0;
        for (chain_id, wallets) in &self.chains {
            let stored = self.keystore.load_chain(chain_id)?;
            let mut slots = wallets.slots.write().unwrap_or_else(|p| p.into_inner());

            for record in stored {
                if slots.iter().any(|s| s.address() == record.address) {
                    continue;
                }
                slots.push(Arc::new(WalletSlot::new(record.into())));
                loaded += 1;
            }
        }

        tracing::info!("Loaded {} wallets from {}", loaded, self.keystore.dir().display());
        Ok(loaded)
    }

    /// Create wallets until every chain holds `min_wallets_per_chain`
    pub fn ensure_min_wallets(&self) -> Result<usize, WalletError> {
        let mut created = 0;
        for chain_id in self.chain_ids() {
            let existing = self.chain_wallets(&chain_id)?.slots().len();
            let target = self.config.min_wallets_per_chain.min(self.config.max_wallets_per_chain);
            for _ in existing..target {
                self.create_wallet(&chain_id)?;
                created += 1;
            }
        }
        Ok(created)
    }

    /// Generate, seal, persist and register a new wallet
    pub fn create_wallet(&self, chain_id: &str) -> Result<Wallet, WalletError> {
        let wallets = self.chain_wallets(chain_id)?;
        let mut slots = wallets.slots.write().unwrap_or_else(|p| p.into_inner());
        if slots.len() >= self.config.max_wallets_per_chain {
            return Err(WalletError::PoolFull {
                chain_id: chain_id.to_string(),
                max: self.config.max_wallets_per_chain,
            });
        }

        let (address, secret) = match wallets.chain.family {
            ChainFamily::Solana => solana::wallet::generate(),
            ChainFamily::Evm => evm::tx::generate(),
        };
        let stored = self.keystore.store(chain_id, &address, &secret)?;
        let wallet = Wallet::from(stored);
        slots.push(Arc::new(WalletSlot::new(wallet.clone())));

        tracing::info!("Created wallet {} on {} ({} total)", address, chain_id, slots.len());
        Ok(wallet)
    }

    /// Snapshot of a chain's wallets with cached balances
    pub fn wallets(&self, chain_id: &str) -> Result<Vec<Wallet>, WalletError> {
        Ok(self
            .chain_wallets(chain_id)?
            .slots()
            .iter()
            .map(|s| s.state().wallet.clone())
            .collect())
    }

    pub fn wallet(&self, chain_id: &str, address: &str) -> Result<Wallet, WalletError> {
        Ok(self.slot(chain_id, address)?.state().wallet.clone())
    }

    /// Re-read balances; a failed lookup keeps the cached value
    pub async fn refresh_balances(&self, chain_id: &str) -> Result<Vec<Wallet>, WalletError> {
        let wallets = self.chain_wallets(chain_id)?;
        for slot in wallets.slots() {
            self.refresh_slot(wallets, &slot).await;
        }
        self.wallets(chain_id)
    }

    /// Re-read one wallet's balance
    pub async fn refresh_balance(&self, chain_id: &str, address: &str) -> Result<u128, WalletError> {
        let wallets = self.chain_wallets(chain_id)?;
        let slot = self.slot(chain_id, address)?;
        Ok(self.refresh_slot(wallets, &slot).await)
    }

    /// Read one wallet's balance from the chain, failing instead of falling
    /// back to the cache
    pub async fn fetch_balance(&self, chain_id: &str, address: &str) -> Result<u128, WalletError> {
        let wallets = self.chain_wallets(chain_id)?;
        let slot = self.slot(chain_id, address)?;
        let balance = wallets.client.get_balance(address).await?;
        slot.state().wallet.balance_cache = balance;
        Ok(balance)
    }

    async fn refresh_slot(&self, wallets: &ChainWallets, slot: &WalletSlot) -> u128 {
        let address = slot.address();
        match wallets.client.get_balance(&address).await {
            Ok(balance) => {
                slot.state().wallet.balance_cache = balance;
                balance
            }
            Err(e) => {
                tracing::warn!(
                    "Balance refresh failed for {} on {}: {} (keeping cached)",
                    address,
                    wallets.chain.id,
                    e
                );
                slot.state().wallet.balance_cache
            }
        }
    }

    pub async fn get_wallet_for_trade(&self, chain_id: &str, min_balance: u128) -> Result<Wallet, WalletError> {
        self.get_wallet_for_trade_excluding(chain_id, min_balance, &HashSet::new())
            .await
    }

    /// Least recently used wallet whose free balance covers `min_balance`
    ///
    /// Free balance is the cached balance minus in-flight commitments.
    /// When nothing qualifies a fresh wallet is added (up to the cap) for
    /// funding, and `InsufficientFunds` is still returned.
    pub async fn get_wallet_for_trade_excluding(
        &self,
        chain_id: &str,
        min_balance: u128,
        excluded: &HashSet<String>,
    ) -> Result<Wallet, WalletError> {
        self.refresh_balances(chain_id).await?;
        let wallets = self.chain_wallets(chain_id)?;

        let mut best: Option<(Arc<WalletSlot>, Option<DateTime<Utc>>, String)> = None;
        let mut best_available = 0u128;

        for slot in wallets.slots() {
            let state = slot.state();
            if excluded.contains(&state.wallet.address) {
                continue;
            }
            let available = state.wallet.balance_cache.saturating_sub(state.committed);
            best_available = best_available.max(available);
            if available < min_balance {
                continue;
            }

            // never-used first, then oldest use, address as tiebreak
            let key = (state.wallet.last_used, state.wallet.address.clone());
            let better = match &best {
                None => true,
                Some((_, used, addr)) => key < (*used, addr.clone()),
            };
            if better {
                best = Some((slot.clone(), key.0, key.1));
            }
        }

        if let Some((slot, _, _)) = best {
            let mut state = slot.state();
            state.wallet.last_used = Some(Utc::now());
            return Ok(state.wallet.clone());
        }

        if wallets.slots().len() < self.config.max_wallets_per_chain {
            match self.create_wallet(chain_id) {
                Ok(wallet) => tracing::warn!(
                    "No funded wallet on {} for {}; created {} for funding",
                    chain_id,
                    min_balance,
                    wallet.address
                ),
                Err(e) => tracing::warn!("Could not add wallet on {}: {}", chain_id, e),
            }
        }

        Err(WalletError::InsufficientFunds {
            chain_id: chain_id.to_string(),
            required: min_balance,
            available: best_available,
        })
    }

    /// Reserve `amount` of a wallet's balance until the returned guard drops
    pub fn commit(&self, chain_id: &str, address: &str, amount: u128) -> Result<Commitment, WalletError> {
        let slot = self.slot(chain_id, address)?;
        slot.state().committed += amount;
        Ok(Commitment { slot, amount })
    }

    pub fn committed(&self, chain_id: &str, address: &str) -> Result<u128, WalletError> {
        Ok(self.slot(chain_id, address)?.state().committed)
    }

    /// Transaction lock for an entry; yields to queued exits
    pub async fn lock_for_entry(&self, chain_id: &str, address: &str) -> Result<WalletGuard, WalletError> {
        let slot = self.slot(chain_id, address)?;
        loop {
            let exit_done = slot.exit_done.notified();
            if slot.pending_exits.load(Ordering::SeqCst) > 0 {
                exit_done.await;
                continue;
            }

            let guard = slot.tx_lock.clone().lock_owned().await;
            if slot.pending_exits.load(Ordering::SeqCst) == 0 {
                return Ok(WalletGuard {
                    chain_id: chain_id.to_string(),
                    address: address.to_string(),
                    _guard: guard,
                });
            }
            // an exit queued while we waited; hand it the lock
            drop(guard);
        }
    }

    /// Transaction lock for an exit
    pub async fn lock_for_exit(&self, chain_id: &str, address: &str) -> Result<WalletGuard, WalletError> {
        let slot = self.slot(chain_id, address)?;
        slot.pending_exits.fetch_add(1, Ordering::SeqCst);
        let guard = slot.tx_lock.clone().lock_owned().await;
        slot.pending_exits.fetch_sub(1, Ordering::SeqCst);
        slot.exit_done.notify_waiters();

        Ok(WalletGuard {
            chain_id: chain_id.to_string(),
            address: address.to_string(),
            _guard: guard,
        })
    }

    /// Decrypt the wallet's secret and sign. The only place a secret is
    /// opened; the secret must derive the wallet's address.
    pub fn sign(&self, chain_id: &str, address: &str, tx: UnsignedTx) -> Result<SignedTx, WalletError> {
        let wallets = self.chain_wallets(chain_id)?;
        let slot = self.slot(chain_id, address)?;
        let encrypted_secret = slot.state().wallet.encrypted_secret.clone();

        let secret = self.keystore.open_secret(&encrypted_secret)?;
        let derived = match wallets.chain.family {
            ChainFamily::Solana => solana::wallet::address_of(&secret)?,
            ChainFamily::Evm => evm::tx::address_of(&secret)?,
        };
        if derived != address {
            return Err(WalletError::Keystore(KeystoreError::Corrupted {
                path: self.keystore.wallet_path(chain_id, address),
                reason: format!("secret belongs to {}", derived),
            }));
        }

        match wallets.chain.family {
            ChainFamily::Solana => solana::wallet::sign(&secret, tx),
            ChainFamily::Evm => evm::tx::sign(&secret, tx),
        }
    }

    /// Attach a fresh blockhash / nonce and sign, without submitting
    pub async fn prepare_and_sign(&self, guard: &WalletGuard, payload: TxPayload) -> Result<SignedTx, WalletError> {
        let client = self.client(&guard.chain_id)?;
        let unsigned = client.prepare(&guard.address, payload).await?;
        self.sign(&guard.chain_id, &guard.address, unsigned)
    }

    /// Prepare, sign and submit a payload from a wallet; returns the tx hash.
    /// The caller holds the wallet's transaction lock.
    pub async fn submit(&self, guard: &WalletGuard, payload: TxPayload) -> Result<String, WalletError> {
        let signed = self.prepare_and_sign(guard, payload).await?;
        Ok(self.client(&guard.chain_id)?.send(&signed).await?)
    }

    /// Poll a transaction until it confirms, fails, or the timeout passes
    pub async fn wait_for_confirmation(&self, chain_id: &str, tx_hash: &str) -> Result<(), WalletError> {
        let client = self.client(chain_id)?;
        let timeout = self.config.confirmation_timeout;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match client.transaction_status(tx_hash).await {
                Ok(TxStatus::Confirmed) => return Ok(()),
                Ok(TxStatus::Failed(reason)) => {
                    return Err(WalletError::TransactionFailed {
                        tx_hash: tx_hash.to_string(),
                        reason,
                    })
                }
                Ok(TxStatus::Pending) => {}
                Err(e) => tracing::debug!("Status check for {} failed: {}", tx_hash, e),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(WalletError::ConfirmationTimeout {
                    tx_hash: tx_hash.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(self.config.confirm_poll_interval).await;
        }
    }

    /// Even out balances within a chain. Best-effort: failed transfers are
    /// logged and the rest continue. Returns the transfers that confirmed.
    pub async fn rebalance(&self, chain_id: &str) -> Result<Vec<RebalanceTransfer>, WalletError> {
        let wallets = self.refresh_balances(chain_id).await?;
        let gas_reserve = self.chain_wallets(chain_id)?.chain.gas_reserve;

        let mut balances = Vec::with_capacity(wallets.len());
        for wallet in &wallets {
            let committed = self.committed(chain_id, &wallet.address)?;
            balances.push((wallet.address.clone(), wallet.balance_cache.saturating_sub(committed)));
        }

        let plan = plan_rebalance(&balances, gas_reserve);
        if plan.is_empty() {
            tracing::debug!("Rebalance {}: nothing to move", chain_id);
            return Ok(Vec::new());
        }

        let mut done = Vec::new();
        for transfer in plan {
            if self.config.dry_run {
                tracing::info!(
                    "[DRY RUN] Rebalance {}: {} -> {} amount {}",
                    chain_id,
                    transfer.from,
                    transfer.to,
                    transfer.amount
                );
                continue;
            }

            match self.execute_transfer(chain_id, &transfer).await {
                Ok(tx_hash) => {
                    tracing::info!(
                        "Rebalance {}: {} -> {} amount {} (tx: {})",
                        chain_id,
                        transfer.from,
                        transfer.to,
                        transfer.amount,
                        tx_hash
                    );
                    done.push(transfer);
                }
                Err(e) => tracing::warn!(
                    "Rebalance transfer {} -> {} on {} failed: {}",
                    transfer.from,
                    transfer.to,
                    chain_id,
                    e
                ),
            }
        }

        Ok(done)
    }

    async fn execute_transfer(&self, chain_id: &str, transfer: &RebalanceTransfer) -> Result<String, WalletError> {
        let guard = self.lock_for_entry(chain_id, &transfer.from).await?;
        let tx_hash = self
            .submit(
                &guard,
                TxPayload::Transfer {
                    to: transfer.to.clone(),
                    amount: transfer.amount,
                },
            )
            .await?;
        self.wait_for_confirmation(chain_id, &tx_hash).await?;
        Ok(tx_hash)
    }
}
