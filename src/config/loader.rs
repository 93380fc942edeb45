//! Configuration Loader
//!
//! Loads and validates the sniper's TOML configuration. Every section has
//! defaults; a `[[chains]]` entry for a well-known chain only needs a
//! treasury. Environment overrides:
//! - `SNIPER_<CHAIN>_RPC_URLS`: comma-separated endpoint list
//! - `SNIPER_<CHAIN>_TREASURY`: treasury address
//! - `SNIPER_WALLET_KEY`: base64 wallet encryption key (read by the keystore)

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use super::builtin::{builtin_chain, BuiltinChain};
use crate::adapters::rpc::{RetryPolicy, DEFAULT_RPC_TIMEOUT};
use crate::application::executor::ExecutorConfig;
use crate::application::orchestrator::OrchestratorConfig;
use crate::application::position_monitor::MonitorConfig;
use crate::application::risk_analyzer::LiquidityTiers;
use crate::application::sweeper::SweepConfig;
use crate::application::wallet_pool::WalletPoolConfig;
use crate::application::watcher::WatcherConfig;
use crate::domain::chain::{to_base_units, Chain, ChainFamily, ChainRegistry, DexKind, RegistryError, RouterInfo};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineSection,
    pub risk: RiskSection,
    pub wallets: WalletsSection,
    pub ledger: LedgerSection,
    pub logging: LoggingSection,
    pub chains: Vec<ChainSection>,
}

/// Pipeline timing, sizing and exit parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Largest entry per trade, whole native units
    pub max_position_per_trade: f64,
    /// Fraction of a wallet's free balance used per entry
    pub sizing_fraction: f64,
    /// 0.05 = accept 5% less than quoted
    pub slippage_tolerance: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_daily_trades: u32,
    /// Time stop; 0 disables
    pub max_hold_secs: u64,
    pub poll_interval_ms: u64,
    pub max_backoff_secs: u64,
    pub monitor_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub rebalance_interval_secs: u64,
    pub dedup_window_secs: u64,
    pub max_concurrent_trades: usize,
    pub max_executions_per_minute: u32,
    pub rpc_timeout_secs: u64,
    /// Full passes over a chain's endpoints per request
    pub rpc_retry_rounds: u32,
    pub confirmation_timeout_secs: u64,
    pub dry_run: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_position_per_trade: 0.1,
            sizing_fraction: 0.1,
            slippage_tolerance: 0.05,
            stop_loss_pct: 0.2,
            take_profit_pct: 0.5,
            max_daily_trades: 5,
            max_hold_secs: 24 * 60 * 60,
            poll_interval_ms: 1_000,
            max_backoff_secs: 30,
            monitor_interval_secs: 10,
            sweep_interval_secs: 60 * 60,
            rebalance_interval_secs: 60 * 60,
            dedup_window_secs: 300,
            max_concurrent_trades: 5,
            max_executions_per_minute: 10,
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT.as_secs(),
            rpc_retry_rounds: 2,
            confirmation_timeout_secs: 60,
            dry_run: false,
        }
    }
}

/// Risk gate
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    /// Highest acceptable score, 0.0 - 1.0
    pub threshold: f64,
    /// Liquidity tiers, whole native units
    pub low_liquidity: f64,
    pub high_liquidity: f64,
}

impl Default for RiskSection {
    fn default() -> Self {
        let tiers = LiquidityTiers::default();
        Self {
            threshold: 0.5,
            low_liquidity: tiers.low,
            high_liquidity: tiers.high,
        }
    }
}

/// Wallet store
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalletsSection {
    pub store_dir: String,
    /// AES-256 key file, created on first run
    pub key_file: String,
    pub max_wallets_per_chain: usize,
    pub min_wallets_per_chain: usize,
}

impl Default for WalletsSection {
    fn default() -> Self {
        Self {
            store_dir: "~/.chain-sniper/wallets".to_string(),
            key_file: "~/.chain-sniper/wallet.key".to_string(),
            max_wallets_per_chain: 10,
            min_wallets_per_chain: 1,
        }
    }
}

impl WalletsSection {
    pub fn store_dir(&self) -> PathBuf {
        expand_path(&self.store_dir)
    }

    pub fn key_file(&self) -> PathBuf {
        expand_path(&self.key_file)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub path: String,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            path: "~/.chain-sniper/ledger.jsonl".to_string(),
        }
    }
}

impl LedgerSection {
    pub fn path(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingSection {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// One `[[chains]]` entry. Unset fields come from the built-in table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChainSection {
    pub id: String,
    pub name: Option<String>,
    pub family: Option<ChainFamily>,
    pub evm_chain_id: Option<u64>,
    pub native_symbol: Option<String>,
    pub native_decimals: Option<u8>,
    pub wrapped_native: Option<String>,
    pub rpc_urls: Vec<String>,
    pub treasury: Option<String>,
    /// Whole native units
    pub gas_reserve: Option<f64>,
    pub sweep_threshold: Option<f64>,
    pub min_account_balance: Option<f64>,
    pub dexes: Vec<DexSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DexSection {
    /// raydium, orca, serum, uniswap_v2 (or a fork name)
    pub kind: String,
    pub program_address: Option<String>,
    pub pool_program_address: Option<String>,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Invalid chain table: {0}")]
    Registry(#[from] RegistryError),
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}

/// `SNIPER_<CHAIN>_<FIELD>` with the chain id upper-cased
pub fn env_key(chain_id: &str, field: &str) -> String {
    let chain: String = chain_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("SNIPER_{}_{}", chain, field)
}

/// Load configuration from a TOML file, apply environment overrides and validate
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
        path: path.display().to_string(),
        source,
    })?;
    let mut config: Config = toml::from_str(&content)?;
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Apply `SNIPER_<CHAIN>_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for chain in &mut self.chains {
            if let Some(urls) = lookup(&env_key(&chain.id, "RPC_URLS")) {
                let urls: Vec<String> = urls
                    .split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(String::from)
                    .collect();
                if !urls.is_empty() {
                    tracing::debug!("{}: {} RPC endpoints from environment", chain.id, urls.len());
                    chain.rpc_urls = urls;
                }
            }
            if let Some(treasury) = lookup(&env_key(&chain.id, "TREASURY")) {
                let treasury = treasury.trim();
                if !treasury.is_empty() {
                    chain.treasury = Some(treasury.to_string());
                }
            }
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.engine;

        if e.max_position_per_trade <= 0.0 || !e.max_position_per_trade.is_finite() {
            return Err(ConfigError::ValidationError(format!(
                "max_position_per_trade must be > 0, got {}",
                e.max_position_per_trade
            )));
        }

        if e.sizing_fraction <= 0.0 || e.sizing_fraction > 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "sizing_fraction must be in (0, 1], got {}",
                e.sizing_fraction
            )));
        }

        if !(0.0..1.0).contains(&e.slippage_tolerance) {
            return Err(ConfigError::ValidationError(format!(
                "slippage_tolerance must be in [0, 1), got {}",
                e.slippage_tolerance
            )));
        }

        if e.stop_loss_pct <= 0.0 || e.stop_loss_pct >= 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "stop_loss_pct must be in (0, 1), got {}",
                e.stop_loss_pct
            )));
        }

        if e.take_profit_pct <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "take_profit_pct must be > 0, got {}",
                e.take_profit_pct
            )));
        }

        if e.max_daily_trades == 0 {
            return Err(ConfigError::ValidationError(
                "max_daily_trades must be > 0".to_string(),
            ));
        }

        if e.poll_interval_ms == 0 || e.monitor_interval_secs == 0 || e.rpc_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms, monitor_interval_secs and rpc_timeout_secs must be > 0".to_string(),
            ));
        }

        if e.max_concurrent_trades == 0 || e.max_executions_per_minute == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_trades and max_executions_per_minute must be > 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.risk.threshold) {
            return Err(ConfigError::ValidationError(format!(
                "risk threshold must be 0-1, got {}",
                self.risk.threshold
            )));
        }

        if self.risk.low_liquidity <= 0.0 || self.risk.high_liquidity <= self.risk.low_liquidity {
            return Err(ConfigError::ValidationError(format!(
                "liquidity tiers must satisfy 0 < low < high, got {} / {}",
                self.risk.low_liquidity, self.risk.high_liquidity
            )));
        }

        let w = &self.wallets;
        if w.max_wallets_per_chain == 0 || w.min_wallets_per_chain > w.max_wallets_per_chain {
            return Err(ConfigError::ValidationError(format!(
                "wallet counts must satisfy min <= max, max > 0, got {} / {}",
                w.min_wallets_per_chain, w.max_wallets_per_chain
            )));
        }

        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "logging level must be trace/debug/info/warn/error, got {}",
                self.logging.level
            )));
        }

        if self.chains.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one [[chains]] entry is required".to_string(),
            ));
        }

        // resolves every chain and runs the registry's own checks
        ChainRegistry::from_config(self)?;
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.rpc_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_rounds: self.engine.rpc_retry_rounds.max(1),
            max_delay: Duration::from_secs(self.engine.max_backoff_secs.max(1)),
            ..Default::default()
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        let e = &self.engine;
        ExecutorConfig {
            risk_threshold: self.risk.threshold,
            max_position_per_trade: e.max_position_per_trade,
            sizing_fraction: e.sizing_fraction,
            slippage_tolerance: e.slippage_tolerance,
            stop_loss_pct: e.stop_loss_pct,
            take_profit_pct: e.take_profit_pct,
            max_daily_trades: e.max_daily_trades,
            dry_run: e.dry_run,
        }
    }

    pub fn wallet_pool_config(&self) -> WalletPoolConfig {
        WalletPoolConfig {
            max_wallets_per_chain: self.wallets.max_wallets_per_chain,
            min_wallets_per_chain: self.wallets.min_wallets_per_chain,
            confirmation_timeout: Duration::from_secs(self.engine.confirmation_timeout_secs),
            dry_run: self.engine.dry_run,
            ..Default::default()
        }
    }

    pub fn liquidity_tiers(&self) -> LiquidityTiers {
        LiquidityTiers {
            low: self.risk.low_liquidity,
            high: self.risk.high_liquidity,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let e = &self.engine;
        OrchestratorConfig {
            dedup_window: Duration::from_secs(e.dedup_window_secs),
            max_concurrent_trades: e.max_concurrent_trades,
            max_executions_per_minute: e.max_executions_per_minute,
            rebalance_interval: Duration::from_secs(e.rebalance_interval_secs.max(1)),
            watcher: WatcherConfig {
                poll_interval: Duration::from_millis(e.poll_interval_ms),
                max_backoff: Duration::from_secs(e.max_backoff_secs.max(1)),
                ..Default::default()
            },
            monitor: MonitorConfig {
                interval: Duration::from_secs(e.monitor_interval_secs),
                quote_timeout: self.rpc_timeout(),
                max_hold: (e.max_hold_secs > 0).then(|| Duration::from_secs(e.max_hold_secs)),
            },
            sweep: SweepConfig {
                interval: Duration::from_secs(e.sweep_interval_secs.max(1)),
                dry_run: e.dry_run,
            },
            ..Default::default()
        }
    }
}

impl ChainSection {
    /// Merge with the built-in table into a registry `Chain`
    pub fn resolve(&self) -> Result<Chain, ConfigError> {
        let builtin = builtin_chain(&self.id);
        let missing = |field: &str| {
            ConfigError::ValidationError(format!(
                "chain '{}' is not built in and needs `{}`",
                self.id, field
            ))
        };

        if self.id.trim().is_empty() {
            return Err(ConfigError::ValidationError("chain id must not be empty".to_string()));
        }

        let family = self
            .family
            .or(builtin.map(|b| b.family))
            .ok_or_else(|| missing("family"))?;
        let native_decimals = self
            .native_decimals
            .or(builtin.map(|b| b.native_decimals))
            .ok_or_else(|| missing("native_decimals"))?;
        let native_symbol = self
            .native_symbol
            .clone()
            .or(builtin.map(|b| b.native_symbol.to_string()))
            .ok_or_else(|| missing("native_symbol"))?;
        let wrapped_native = self
            .wrapped_native
            .clone()
            .or(builtin.map(|b| b.wrapped_native.to_string()))
            .ok_or_else(|| missing("wrapped_native"))?;

        let rpc_endpoints = if self.rpc_urls.is_empty() {
            builtin
                .map(|b| b.rpc_endpoints.iter().map(|u| u.to_string()).collect())
                .unwrap_or_default()
        } else {
            self.rpc_urls.clone()
        };

        let native = |value: Option<f64>, default: Option<f64>| -> u128 {
            to_base_units(value.or(default).unwrap_or(0.0), native_decimals)
        };

        Ok(Chain {
            id: self.id.clone(),
            name: self
                .name
                .clone()
                .or(builtin.map(|b| b.name.to_string()))
                .unwrap_or_else(|| self.id.clone()),
            family,
            rpc_endpoints,
            native_symbol,
            native_decimals,
            wrapped_native,
            evm_chain_id: self.evm_chain_id.or(builtin.and_then(|b| b.evm_chain_id)),
            treasury: self.treasury.clone().unwrap_or_default(),
            gas_reserve: native(self.gas_reserve, builtin.map(|b| b.gas_reserve)),
            sweep_threshold: native(self.sweep_threshold, builtin.map(|b| b.sweep_threshold)),
            min_account_balance: native(self.min_account_balance, builtin.map(|b| b.min_account_balance)),
            dex_programs: self.resolve_dexes(builtin)?,
        })
    }

    fn resolve_dexes(&self, builtin: Option<&BuiltinChain>) -> Result<HashMap<DexKind, RouterInfo>, ConfigError> {
        let mut programs = HashMap::new();

        if self.dexes.is_empty() {
            for dex in builtin.map(|b| b.dexes).unwrap_or_default() {
                programs.insert(
                    dex.kind,
                    RouterInfo {
                        program_address: dex.program_address.to_string(),
                        pool_program_address: dex.pool_program_address.to_string(),
                    },
                );
            }
            return Ok(programs);
        }

        for section in &self.dexes {
            let kind = DexKind::from_str(&section.kind)
                .map_err(|e| ConfigError::ValidationError(format!("chain '{}': {}", self.id, e)))?;
            let known = builtin.and_then(|b| b.dex(kind));
            let program_address = section
                .program_address
                .clone()
                .or(known.map(|d| d.program_address.to_string()))
                .unwrap_or_default();
            let pool_program_address = section
                .pool_program_address
                .clone()
                .or(known.map(|d| d.pool_program_address.to_string()))
                .unwrap_or_else(|| program_address.clone());

            if programs
                .insert(
                    kind,
                    RouterInfo {
                        program_address,
                        pool_program_address,
                    },
                )
                .is_some()
            {
                return Err(ConfigError::ValidationError(format!(
                    "chain '{}' lists {} twice",
                    self.id, kind
                )));
            }
        }
        Ok(programs)
    }
}

impl ChainRegistry {
    /// Build the registry from `[[chains]]`
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let chains = config
            .chains
            .iter()
            .map(ChainSection::resolve)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ChainRegistry::new(chains)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[[chains]]
id = "solana"
treasury = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T"

[[chains]]
id = "bsc"
treasury = "0x000000000000000000000000000000000000dEaD"
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_uses_builtins() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        let registry = ChainRegistry::from_config(&config).unwrap();

        let solana = registry.get_chain("solana").unwrap();
        assert_eq!(solana.family, ChainFamily::Solana);
        assert_eq!(solana.gas_reserve, 10_000_000);
        assert_eq!(solana.dexes(), vec![DexKind::Raydium, DexKind::Orca, DexKind::Serum]);

        let bsc = registry.get_chain("bsc").unwrap();
        assert_eq!(bsc.evm_chain_id, Some(56));
        assert_eq!(
            registry.get_router("bsc", DexKind::UniswapV2).unwrap().program_address,
            "0x10ED43C718714eb63d5aA57B78B54704E256024E"
        );
        assert_eq!(config.engine.max_daily_trades, 5);
        assert!(!config.logging.is_json());
    }

    #[test]
    fn test_full_custom_chain() {
        let file = write_config(
            r#"
[engine]
max_position_per_trade = 0.5
dry_run = true

[risk]
threshold = 0.3

[logging]
level = "debug"
format = "json"

[[chains]]
id = "base"
family = "evm"
evm_chain_id = 8453
native_symbol = "ETH"
native_decimals = 18
wrapped_native = "0x4200000000000000000000000000000000000006"
rpc_urls = ["https://mainnet.base.org", "https://base.llamarpc.com"]
treasury = "0x000000000000000000000000000000000000dEaD"
gas_reserve = 0.005

[[chains.dexes]]
kind = "uniswap_v2"
program_address = "0x4752ba5DBc23f44D87826276BF6Fd6b1C372aD24"
pool_program_address = "0x8909Dc15e40173Ff4699343b6eB8132c65e18eC6"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert!(config.engine.dry_run);
        assert!(config.logging.is_json());
        assert_eq!(config.executor_config().risk_threshold, 0.3);

        let chain = config.chains[0].resolve().unwrap();
        assert_eq!(chain.rpc_endpoints.len(), 2);
        assert_eq!(chain.gas_reserve, 5_000_000_000_000_000);
        assert_eq!(chain.sweep_threshold, 0);
    }

    #[test]
    fn test_missing_treasury_fails() {
        let file = write_config("[[chains]]\nid = \"solana\"\n");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Registry(RegistryError::InvalidChain { .. }))
        ));
    }

    #[test]
    fn test_unknown_chain_needs_family() {
        let file = write_config("[[chains]]\nid = \"mystery\"\ntreasury = \"x\"\n");
        assert!(matches!(load_config(file.path()), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_dex_on_wrong_family_fails() {
        let file = write_config(
            r#"
[[chains]]
id = "ethereum"
treasury = "0x000000000000000000000000000000000000dEaD"

[[chains.dexes]]
kind = "raydium"
program_address = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8"
"#,
        );
        assert!(matches!(load_config(file.path()), Err(ConfigError::Registry(_))));
    }

    #[test]
    fn test_invalid_engine_values() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.engine.sizing_fraction = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.risk.threshold = 2.0;
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.wallets.min_wallets_per_chain = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        let env: HashMap<String, String> = [
            ("SNIPER_SOLANA_RPC_URLS", "https://a.example, https://b.example"),
            ("SNIPER_BSC_TREASURY", "0x1111111111111111111111111111111111111111"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        config.apply_overrides(|key| env.get(key).cloned());

        assert_eq!(config.chains[0].rpc_urls, vec!["https://a.example", "https://b.example"]);
        assert_eq!(
            config.chains[1].treasury.as_deref(),
            Some("0x1111111111111111111111111111111111111111")
        );
    }

    #[test]
    fn test_env_key_format() {
        assert_eq!(env_key("solana", "RPC_URLS"), "SNIPER_SOLANA_RPC_URLS");
        assert_eq!(env_key("arbitrum-one", "TREASURY"), "SNIPER_ARBITRUM_ONE_TREASURY");
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config: Config = toml::from_str(include_str!("../../config/sniper.toml")).unwrap();
        config.validate().unwrap();
        assert!(config.engine.dry_run);

        let registry = ChainRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get_chain("solana").unwrap().dexes(), vec![DexKind::Raydium, DexKind::Orca]);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/sniper.toml"),
            Err(ConfigError::IoError { .. })
        ));
    }
}
