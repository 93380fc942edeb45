//! Built-in chain table
//!
//! Defaults for well-known chains, used for any field a `[[chains]]` entry
//! leaves out. Treasury addresses are never built in.

use crate::domain::chain::{ChainFamily, DexKind, EVM_NATIVE_DECIMALS, SOLANA_NATIVE_DECIMALS};

pub const RAYDIUM_AMM_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const ORCA_WHIRLPOOL: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";
pub const SERUM_DEX_V3: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

#[derive(Debug, Clone, Copy)]
pub struct BuiltinDex {
    pub kind: DexKind,
    /// Swap target (AMM program / router)
    pub program_address: &'static str,
    /// Creation source (AMM program / market program / factory)
    pub pool_program_address: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct BuiltinChain {
    pub id: &'static str,
    pub name: &'static str,
    pub family: ChainFamily,
    pub evm_chain_id: Option<u64>,
    pub native_symbol: &'static str,
    pub native_decimals: u8,
    pub wrapped_native: &'static str,
    pub rpc_endpoints: &'static [&'static str],
    /// Whole native units
    pub gas_reserve: f64,
    pub sweep_threshold: f64,
    pub min_account_balance: f64,
    pub dexes: &'static [BuiltinDex],
}

const SOLANA_DEXES: &[BuiltinDex] = &[
    BuiltinDex {
        kind: DexKind::Raydium,
        program_address: RAYDIUM_AMM_V4,
        pool_program_address: RAYDIUM_AMM_V4,
    },
    BuiltinDex {
        kind: DexKind::Orca,
        program_address: ORCA_WHIRLPOOL,
        pool_program_address: ORCA_WHIRLPOOL,
    },
    BuiltinDex {
        kind: DexKind::Serum,
        program_address: SERUM_DEX_V3,
        pool_program_address: SERUM_DEX_V3,
    },
];

pub const BUILTIN_CHAINS: &[BuiltinChain] = &[
    BuiltinChain {
        id: "solana",
        name: "Solana",
        family: ChainFamily::Solana,
        evm_chain_id: None,
        native_symbol: "SOL",
        native_decimals: SOLANA_NATIVE_DECIMALS,
        wrapped_native: WSOL_MINT,
        rpc_endpoints: &["https://api.mainnet-beta.solana.com"],
        gas_reserve: 0.01,
        sweep_threshold: 1.0,
        // rent-exempt minimum of a mint account
        min_account_balance: 0.0014616,
        dexes: SOLANA_DEXES,
    },
    BuiltinChain {
        id: "ethereum",
        name: "Ethereum",
        family: ChainFamily::Evm,
        evm_chain_id: Some(1),
        native_symbol: "ETH",
        native_decimals: EVM_NATIVE_DECIMALS,
        wrapped_native: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
        rpc_endpoints: &["https://eth.llamarpc.com"],
        gas_reserve: 0.01,
        sweep_threshold: 0.5,
        min_account_balance: 0.0,
        dexes: &[BuiltinDex {
            kind: DexKind::UniswapV2,
            program_address: "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D",
            pool_program_address: "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f",
        }],
    },
    BuiltinChain {
        id: "bsc",
        name: "BNB Smart Chain",
        family: ChainFamily::Evm,
        evm_chain_id: Some(56),
        native_symbol: "BNB",
        native_decimals: EVM_NATIVE_DECIMALS,
        wrapped_native: "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c",
        rpc_endpoints: &["https://bsc-dataseed.binance.org"],
        gas_reserve: 0.01,
        sweep_threshold: 1.0,
        min_account_balance: 0.0,
        // PancakeSwap v2
        dexes: &[BuiltinDex {
            kind: DexKind::UniswapV2,
            program_address: "0x10ED43C718714eb63d5aA57B78B54704E256024E",
            pool_program_address: "0xcA143Ce32Fe78f1f7019d7d551a6402fC5350c73",
        }],
    },
    BuiltinChain {
        id: "avalanche",
        name: "Avalanche C-Chain",
        family: ChainFamily::Evm,
        evm_chain_id: Some(43114),
        native_symbol: "AVAX",
        native_decimals: EVM_NATIVE_DECIMALS,
        wrapped_native: "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7",
        rpc_endpoints: &["https://api.avax.network/ext/bc/C/rpc"],
        gas_reserve: 0.1,
        sweep_threshold: 10.0,
        min_account_balance: 0.0,
        // TraderJoe v1
        dexes: &[BuiltinDex {
            kind: DexKind::UniswapV2,
            program_address: "0x60aE616a2155Ee3d9A68541Ba4544862310933d4",
            pool_program_address: "0x9Ad6C38BE94206cA50bb0d90783181662f0Cfa10",
        }],
    },
    BuiltinChain {
        id: "polygon",
        name: "Polygon",
        family: ChainFamily::Evm,
        evm_chain_id: Some(137),
        native_symbol: "MATIC",
        native_decimals: EVM_NATIVE_DECIMALS,
        wrapped_native: "0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270",
        rpc_endpoints: &["https://polygon-rpc.com"],
        gas_reserve: 1.0,
        sweep_threshold: 100.0,
        min_account_balance: 0.0,
        // QuickSwap
        dexes: &[BuiltinDex {
            kind: DexKind::UniswapV2,
            program_address: "0xa5E0829CaCEd8fFDD4De3c43696c57F7D7A678ff",
            pool_program_address: "0x5757371414417b8C6CAad45bAeF941aBc7d3Ab32",
        }],
    },
];

pub fn builtin_chain(id: &str) -> Option<&'static BuiltinChain> {
    BUILTIN_CHAINS.iter().find(|c| c.id.eq_ignore_ascii_case(id))
}

impl BuiltinChain {
    pub fn dex(&self, kind: DexKind) -> Option<&'static BuiltinDex> {
        self.dexes.iter().find(|d| d.kind == kind)
    }
}
