//! Chain Registry
//!
//! Read-only table of supported chains: RPC endpoints, native asset,
//! DEX router/program addresses and treasury destination.
//!
//! Built once at startup and shared as `Arc<ChainRegistry>` without locking.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Decimals of SOL (lamports)
pub const SOLANA_NATIVE_DECIMALS: u8 = 9;

/// Decimals of ETH-like native assets (wei)
pub const EVM_NATIVE_DECIMALS: u8 = 18;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    #[error("Unknown DEX {dex} on chain {chain}")]
    UnknownDex { chain: String, dex: DexKind },

    #[error("Invalid chain definition for {chain}: {reason}")]
    InvalidChain { chain: String, reason: String },
}

/// Execution environment a chain belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Solana,
    Evm,
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFamily::Solana => write!(f, "solana"),
            ChainFamily::Evm => write!(f, "evm"),
        }
    }
}

/// Supported DEX venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DexKind {
    Raydium,
    Orca,
    Serum,
    UniswapV2,
}

impl DexKind {
    /// Chain family whose programs this venue runs on
    pub fn family(&self) -> ChainFamily {
        match self {
            DexKind::Raydium | DexKind::Orca | DexKind::Serum => ChainFamily::Solana,
            DexKind::UniswapV2 => ChainFamily::Evm,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DexKind::Raydium => "raydium",
            DexKind::Orca => "orca",
            DexKind::Serum => "serum",
            DexKind::UniswapV2 => "uniswap_v2",
        }
    }
}

impl fmt::Display for DexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DexKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raydium" => Ok(DexKind::Raydium),
            "orca" | "whirlpool" => Ok(DexKind::Orca),
            "serum" | "openbook" => Ok(DexKind::Serum),
            "uniswap_v2" | "uniswapv2" | "uniswap" | "pancakeswap" | "quickswap" | "traderjoe" => {
                Ok(DexKind::UniswapV2)
            }
            other => Err(format!("unknown dex '{}'", other)),
        }
    }
}

/// Program addresses of one DEX on one chain
///
/// `program_address` is what swaps are sent to (AMM program / router).
/// `pool_program_address` is what pool creation is observed on
/// (AMM program / market program / factory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterInfo {
    pub program_address: String,
    pub pool_program_address: String,
}

/// A supported chain. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    pub id: String,
    pub name: String,
    pub family: ChainFamily,
    /// Ordered endpoint list, first is primary
    pub rpc_endpoints: Vec<String>,
    pub native_symbol: String,
    pub native_decimals: u8,
    /// Wrapped native token (WSOL mint / WETH contract)
    pub wrapped_native: String,
    /// EIP-155 chain id, EVM only
    pub evm_chain_id: Option<u64>,
    pub treasury: String,
    /// Native amount (base units) never swept from a wallet
    pub gas_reserve: u128,
    /// Minimum sweepable surplus (base units) before a sweep fires
    pub sweep_threshold: u128,
    /// Contract balance floor (base units) used by risk checks
    pub min_account_balance: u128,
    pub dex_programs: HashMap<DexKind, RouterInfo>,
}

impl Chain {
    /// Convert whole native units into base units
    pub fn to_base_units(&self, amount: f64) -> u128 {
        to_base_units(amount, self.native_decimals)
    }

    /// Convert base units into whole native units
    pub fn to_native(&self, amount: u128) -> f64 {
        from_base_units(amount, self.native_decimals)
    }

    /// DEX kinds configured on this chain, in a stable order
    pub fn dexes(&self) -> Vec<DexKind> {
        let mut kinds: Vec<DexKind> = self.dex_programs.keys().copied().collect();
        kinds.sort();
        kinds
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidChain {
            chain: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.rpc_endpoints.is_empty() {
            return Err(invalid("at least one RPC endpoint is required"));
        }
        if self.treasury.is_empty() {
            return Err(invalid("treasury address is required"));
        }
        if self.family == ChainFamily::Evm && self.evm_chain_id.is_none() {
            return Err(invalid("EVM chains need evm_chain_id"));
        }
        if self.dex_programs.is_empty() {
            return Err(invalid("no DEX configured"));
        }
        for (kind, router) in &self.dex_programs {
            if kind.family() != self.family {
                return Err(invalid(&format!(
                    "{} does not run on {} chains",
                    kind, self.family
                )));
            }
            if router.program_address.is_empty() || router.pool_program_address.is_empty() {
                return Err(invalid(&format!("{} router addresses are empty", kind)));
            }
        }
        Ok(())
    }
}

/// Convert a decimal amount to integer base units, flooring
pub fn to_base_units(amount: f64, decimals: u8) -> u128 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0;
    }
    (amount * 10f64.powi(decimals as i32)).floor() as u128
}

/// Convert integer base units to a decimal amount
pub fn from_base_units(amount: u128, decimals: u8) -> f64 {
    amount as f64 / 10f64.powi(decimals as i32)
}

/// Read-only lookup of configured chains
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: HashMap<String, Chain>,
}

impl ChainRegistry {
    /// Build a registry, validating every chain
    pub fn new(chains: Vec<Chain>) -> Result<Self, RegistryError> {
        let mut map = HashMap::new();
        for chain in chains {
            chain.validate()?;
            if map.contains_key(&chain.id) {
                return Err(RegistryError::InvalidChain {
                    chain: chain.id.clone(),
                    reason: "duplicate chain id".to_string(),
                });
            }
            map.insert(chain.id.clone(), chain);
        }
        Ok(Self { chains: map })
    }

    pub fn get_chain(&self, id: &str) -> Result<&Chain, RegistryError> {
        self.chains
            .get(id)
            .ok_or_else(|| RegistryError::UnknownChain(id.to_string()))
    }

    pub fn get_router(&self, chain_id: &str, dex: DexKind) -> Result<&RouterInfo, RegistryError> {
        self.get_chain(chain_id)?
            .dex_programs
            .get(&dex)
            .ok_or_else(|| RegistryError::UnknownDex {
                chain: chain_id.to_string(),
                dex,
            })
    }

    /// All chains sorted by id
    pub fn chains(&self) -> Vec<&Chain> {
        let mut chains: Vec<&Chain> = self.chains.values().collect();
        chains.sort_by(|a, b| a.id.cmp(&b.id));
        chains
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn solana_chain() -> Chain {
        let mut dex_programs = HashMap::new();
        dex_programs.insert(
            DexKind::Raydium,
            RouterInfo {
                program_address: "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8".to_string(),
                pool_program_address: "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8".to_string(),
            },
        );
        Chain {
            id: "solana".to_string(),
            name: "Solana".to_string(),
            family: ChainFamily::Solana,
            rpc_endpoints: vec!["http://primary".to_string(), "http://fallback".to_string()],
            native_symbol: "SOL".to_string(),
            native_decimals: SOLANA_NATIVE_DECIMALS,
            wrapped_native: "So11111111111111111111111111111111111111112".to_string(),
            evm_chain_id: None,
            treasury: "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T".to_string(),
            gas_reserve: 10_000_000,
            sweep_threshold: 1_000_000_000,
            min_account_balance: 1_000_000,
            dex_programs,
        }
    }

    pub(crate) fn ethereum_chain() -> Chain {
        let mut dex_programs = HashMap::new();
        dex_programs.insert(
            DexKind::UniswapV2,
            RouterInfo {
                program_address: "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".to_string(),
                pool_program_address: "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f".to_string(),
            },
        );
        Chain {
            id: "ethereum".to_string(),
            name: "Ethereum".to_string(),
            family: ChainFamily::Evm,
            rpc_endpoints: vec!["http://localhost:8545".to_string()],
            native_symbol: "ETH".to_string(),
            native_decimals: EVM_NATIVE_DECIMALS,
            wrapped_native: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".to_string(),
            evm_chain_id: Some(1),
            treasury: "0x000000000000000000000000000000000000dEaD".to_string(),
            gas_reserve: 10_000_000_000_000_000,
            sweep_threshold: 500_000_000_000_000_000,
            min_account_balance: 0,
            dex_programs,
        }
    }

    #[test]
    fn test_get_chain_and_router() {
        let registry = ChainRegistry::new(vec![solana_chain()]).unwrap();

        let chain = registry.get_chain("solana").unwrap();
        assert_eq!(chain.native_symbol, "SOL");

        let router = registry.get_router("solana", DexKind::Raydium).unwrap();
        assert_eq!(router.program_address, "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
    }

    #[test]
    fn test_unknown_chain_and_dex() {
        let registry = ChainRegistry::new(vec![solana_chain()]).unwrap();

        assert_eq!(
            registry.get_chain("bsc").unwrap_err(),
            RegistryError::UnknownChain("bsc".to_string())
        );
        assert!(matches!(
            registry.get_router("solana", DexKind::Orca),
            Err(RegistryError::UnknownDex { dex: DexKind::Orca, .. })
        ));
    }

    #[test]
    fn test_rejects_chain_without_endpoints() {
        let mut chain = solana_chain();
        chain.rpc_endpoints.clear();
        assert!(matches!(
            ChainRegistry::new(vec![chain]),
            Err(RegistryError::InvalidChain { .. })
        ));
    }

    #[test]
    fn test_rejects_dex_on_wrong_family() {
        let mut chain = solana_chain();
        chain.dex_programs.insert(
            DexKind::UniswapV2,
            RouterInfo {
                program_address: "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".to_string(),
                pool_program_address: "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f".to_string(),
            },
        );
        assert!(ChainRegistry::new(vec![chain]).is_err());
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        assert!(ChainRegistry::new(vec![solana_chain(), solana_chain()]).is_err());
    }

    #[test]
    fn test_base_unit_conversion() {
        let chain = solana_chain();
        assert_eq!(chain.to_base_units(0.1), 100_000_000);
        assert_eq!(chain.to_base_units(-1.0), 0);
        assert!((chain.to_native(1_500_000_000) - 1.5).abs() < 1e-12);
        assert_eq!(to_base_units(2.0, 18), 2_000_000_000_000_000_000);
    }

    #[test]
    fn test_dex_kind_parsing() {
        assert_eq!("Raydium".parse::<DexKind>().unwrap(), DexKind::Raydium);
        assert_eq!("uniswap_v2".parse::<DexKind>().unwrap(), DexKind::UniswapV2);
        assert!("sushiswap".parse::<DexKind>().is_err());
        assert_eq!(DexKind::UniswapV2.family(), ChainFamily::Evm);
    }
}
