//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the chain sniper.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::keystore::{KeyCipher, Keystore};
use crate::adapters::ledger::{Ledger, LedgerState};
use crate::application::orchestrator::SniperOrchestrator;
use crate::application::positions::PositionBook;
use crate::application::wallet_pool::WalletPool;
use crate::config::{load_config, Config, LoggingSection};
use crate::domain::chain::ChainRegistry;
use crate::domain::trade::Trade;
use crate::ports::chain::ChainClient;

/// Default configuration path
pub const DEFAULT_CONFIG_PATH: &str = "config/sniper.toml";

/// chain-sniper - multi-chain new-pool sniper
#[derive(Parser, Debug)]
#[command(
    name = "chain-sniper",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Multi-chain new-pool sniper for Solana and EVM DEXes",
    long_about = "chain-sniper watches DEXes for new liquidity pools, gates candidates on a \
                  contract and liquidity risk score, enters with bounded slippage from a rotating \
                  pool of hot wallets, exits on stop loss / take profit / time stop, and sweeps \
                  idle balances to treasury."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the sniper until Ctrl+C
    Run(RunCmd),

    /// Show wallet balances per chain
    Balances(BalancesCmd),

    /// List trades from the ledger
    Positions(PositionsCmd),

    /// List treasury sweeps from the ledger
    Sweeps(SweepsCmd),

    /// Create a new hot wallet on a chain
    CreateWallet(CreateWalletCmd),
}

/// Start the sniper
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Sign but never submit transactions
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
pub struct BalancesCmd {
    /// Only this chain
    #[arg(long, value_name = "CHAIN")]
    pub chain: Option<String>,
}

#[derive(Parser, Debug)]
pub struct PositionsCmd {
    /// Include closed and failed trades
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Parser, Debug)]
pub struct SweepsCmd {
    /// Only this chain
    #[arg(long, value_name = "CHAIN")]
    pub chain: Option<String>,
}

#[derive(Parser, Debug)]
pub struct CreateWalletCmd {
    /// Chain id from the configuration
    #[arg(long, value_name = "CHAIN")]
    pub chain: String,
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let config = match load_config(&app.config) {
        Ok(config) => config,
        Err(e) => {
            init_logging(app.verbose, app.debug, &LoggingSection::default())?;
            return Err(e).with_context(|| format!("Failed to load configuration {}", app.config.display()));
        }
    };
    init_logging(app.verbose, app.debug, &config.logging)?;

    match app.command {
        Command::Run(cmd) => run_command(cmd, config).await,
        Command::Balances(cmd) => balances_command(cmd, config).await,
        Command::Positions(cmd) => positions_command(cmd, config),
        Command::Sweeps(cmd) => sweeps_command(cmd, config),
        Command::CreateWallet(cmd) => create_wallet_command(cmd, config),
    }
}

/// Initialize logging system
///
/// `RUST_LOG` wins, then `--debug` / `--verbose`, then `[logging] level`.
fn init_logging(verbose: bool, debug: bool, logging: &LoggingSection) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if logging.is_json() {
        fmt().json().with_env_filter(filter).with_target(false).try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
    // a subscriber may already be installed (tests)
    if let Err(e) = result {
        tracing::debug!("Logging already initialised: {}", e);
    }

    Ok(())
}

/// Shared services built from configuration
struct Services {
    registry: Arc<ChainRegistry>,
    clients: HashMap<String, Arc<dyn ChainClient>>,
    wallets: Arc<WalletPool>,
}

fn build_services(config: &Config) -> Result<Services> {
    let registry = Arc::new(ChainRegistry::from_config(config).context("Invalid chain table")?);

    let mut clients = HashMap::new();
    for chain in registry.chains() {
        let client = crate::adapters::connect(chain, config.rpc_timeout(), config.retry_policy())
            .with_context(|| format!("Failed to create RPC client for {}", chain.id))?;
        clients.insert(chain.id.clone(), client);
    }

    let cipher = KeyCipher::load_or_create(&config.wallets.key_file()).context("Failed to load wallet key")?;
    let keystore = Keystore::new(config.wallets.store_dir(), cipher);
    let wallets = Arc::new(WalletPool::new(&registry, &clients, keystore, config.wallet_pool_config()));
    wallets.load_existing().context("Failed to load wallets")?;

    Ok(Services {
        registry,
        clients,
        wallets,
    })
}

fn open_ledger(config: &Config) -> Result<Arc<Ledger>> {
    let path = config.ledger.path();
    Ok(Arc::new(
        Ledger::open(&path).with_context(|| format!("Failed to open ledger {}", path.display()))?,
    ))
}

fn replay_ledger(config: &Config) -> Result<LedgerState> {
    let path = config.ledger.path();
    if !path.exists() {
        return Ok(LedgerState::default());
    }
    LedgerState::load(&path).with_context(|| format!("Failed to read ledger {}", path.display()))
}

/// Handle run command
async fn run_command(cmd: RunCmd, mut config: Config) -> Result<()> {
    if cmd.dry_run {
        config.engine.dry_run = true;
    }

    tracing::info!("Starting chain-sniper...");
    if config.engine.dry_run {
        tracing::warn!("DRY RUN mode - transactions are signed but never submitted");
    }

    let services = build_services(&config)?;
    let created = services.wallets.ensure_min_wallets().context("Failed to create wallets")?;
    if created > 0 {
        tracing::warn!("Created {} new wallets - fund them before trading", created);
    }

    let orchestrator = Arc::new(SniperOrchestrator::new(
        services.registry,
        services.wallets,
        services.clients,
        open_ledger(&config)?,
        Arc::new(PositionBook::new()),
        config.executor_config(),
        config.liquidity_tiers(),
        config.orchestrator_config(),
    ));

    // Setup Ctrl+C handler
    let orch = orchestrator.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        orch.stop();
    });

    orchestrator.run().await?;
    tracing::info!("chain-sniper stopped");
    Ok(())
}

/// Handle balances command
async fn balances_command(cmd: BalancesCmd, config: Config) -> Result<()> {
    let services = build_services(&config)?;

    for chain in services.registry.chains() {
        if cmd.chain.as_deref().is_some_and(|c| c != chain.id) {
            continue;
        }
        let wallets = services
            .wallets
            .refresh_balances(&chain.id)
            .await
            .with_context(|| format!("Failed to read balances on {}", chain.id))?;

        println!("{} ({} wallets)", chain.name, wallets.len());
        let mut total = 0u128;
        for wallet in &wallets {
            total += wallet.balance_cache;
            println!(
                "  {}  {:.6} {}",
                wallet.address,
                chain.to_native(wallet.balance_cache),
                chain.native_symbol
            );
        }
        println!("  total {:.6} {}", chain.to_native(total), chain.native_symbol);
    }

    Ok(())
}

fn print_trade(trade: &Trade) {
    println!("{}  {}", trade.id, trade);
    if let Some(pnl) = trade.pnl_pct() {
        println!(
            "    exit {:.10} ({}) PnL {:.2}%",
            trade.exit_price.unwrap_or_default(),
            trade
                .exit_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
            pnl
        );
    }
    if let Some(reason) = &trade.failure_reason {
        println!("    failed: {}", reason);
    }
}

/// Handle positions command
fn positions_command(cmd: PositionsCmd, config: Config) -> Result<()> {
    let state = replay_ledger(&config)?;

    let trades: Vec<Trade> = if cmd.all {
        let mut all: Vec<Trade> = state.trades().into_iter().cloned().collect();
        all.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        all
    } else {
        state.open_trades()
    };

    if trades.is_empty() {
        println!("No {}trades", if cmd.all { "" } else { "open " });
    }
    for trade in &trades {
        print_trade(trade);
    }
    Ok(())
}

/// Handle sweeps command
fn sweeps_command(cmd: SweepsCmd, config: Config) -> Result<()> {
    let state = replay_ledger(&config)?;

    let sweeps: Vec<_> = state
        .sweeps
        .iter()
        .filter(|s| cmd.chain.as_deref().map_or(true, |c| c == s.chain_id))
        .collect();

    if sweeps.is_empty() {
        println!("No sweeps recorded");
    }
    for sweep in sweeps {
        println!(
            "{}  {}  {} -> {}  {}  (tx: {})",
            sweep.timestamp.format("%Y-%m-%d %H:%M:%S"),
            sweep.chain_id,
            sweep.wallet_address,
            sweep.destination,
            sweep.amount,
            sweep.tx_hash
        );
    }
    Ok(())
}

/// Handle create-wallet command
fn create_wallet_command(cmd: CreateWalletCmd, config: Config) -> Result<()> {
    let services = build_services(&config)?;
    let wallet = services
        .wallets
        .create_wallet(&cmd.chain)
        .with_context(|| format!("Failed to create wallet on {}", cmd.chain))?;

    println!("Created wallet on {}: {}", cmd.chain, wallet.address);
    Ok(())
}
