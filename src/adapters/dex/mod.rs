//! DEX venue adapters
//!
//! One stateless adapter per `DexKind`, selected with `adapter_for`.
//! Shared helpers here read seeded liquidity out of Solana token balance
//! deltas and do constant-product math.

pub mod orca;
pub mod raydium;
pub mod serum;
pub mod uniswap_v2;

pub use orca::OrcaAdapter;
pub use raydium::RaydiumAdapter;
pub use serum::SerumAdapter;
pub use uniswap_v2::UniswapV2Adapter;

use crate::domain::chain::{from_base_units, Chain, DexKind};
use crate::ports::chain::ChainTransaction;
use crate::ports::dex::{DexAdapter, DexError};

static RAYDIUM: RaydiumAdapter = RaydiumAdapter;
static ORCA: OrcaAdapter = OrcaAdapter;
static SERUM: SerumAdapter = SerumAdapter;
static UNISWAP_V2: UniswapV2Adapter = UniswapV2Adapter;

/// Adapter implementing `kind`
pub fn adapter_for(kind: DexKind) -> &'static dyn DexAdapter {
    match kind {
        DexKind::Raydium => &RAYDIUM,
        DexKind::Orca => &ORCA,
        DexKind::Serum => &SERUM,
        DexKind::UniswapV2 => &UNISWAP_V2,
    }
}

/// Which side of a two-mint pool is the traded token
///
/// Returns `(token, native_is_first)`; `None` when neither side is the
/// chain's wrapped native asset.
pub fn token_side<'a>(chain: &Chain, first: &'a str, second: &'a str) -> Option<(&'a str, bool)> {
    if first == chain.wrapped_native && second != chain.wrapped_native {
        Some((second, true))
    } else if second == chain.wrapped_native && first != chain.wrapped_native {
        Some((first, false))
    } else {
        None
    }
}

/// Liquidity deposited into a new pool, read from token balance deltas
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SeededLiquidity {
    pub native_amount: u128,
    pub token_amount: u128,
    pub token_decimals: Option<u8>,
}

impl SeededLiquidity {
    /// (liquidity in native units, native per whole token)
    pub fn liquidity_and_price(&self, chain: &Chain, token_decimals: u8) -> (f64, f64) {
        let liquidity = chain.to_native(self.native_amount);
        let tokens = from_base_units(self.token_amount, token_decimals);
        let price = if tokens > 0.0 { liquidity / tokens } else { 0.0 };
        (liquidity, price)
    }
}

/// Largest positive native and token deltas of a creation transaction
///
/// When `vaults` is non-empty only those accounts count, otherwise any
/// account receiving the mint does.
pub fn seeded_liquidity(
    chain: &Chain,
    tx: &ChainTransaction,
    token_mint: &str,
    vaults: &[&str],
) -> SeededLiquidity {
    let mut seeded = SeededLiquidity::default();

    for delta in &tx.token_deltas {
        if !vaults.is_empty() && !vaults.contains(&delta.account.as_str()) {
            continue;
        }
        let change = delta.change();
        if change <= 0 {
            continue;
        }
        let change = change as u128;

        if delta.mint == chain.wrapped_native {
            seeded.native_amount = seeded.native_amount.max(change);
        } else if delta.mint == token_mint && change > seeded.token_amount {
            seeded.token_amount = change;
            seeded.token_decimals = Some(delta.decimals);
        }
    }

    seeded
}

/// Constant product output with a fee in basis points
pub fn constant_product_out(
    amount_in: u128,
    reserve_in: u128,
    reserve_out: u128,
    fee_bps: u32,
) -> Result<u128, DexError> {
    if reserve_in == 0 || reserve_out == 0 {
        return Err(DexError::InsufficientLiquidity);
    }
    let fee_bps = fee_bps.min(10_000) as u128;
    let in_after_fee = amount_in
        .checked_mul(10_000 - fee_bps)
        .ok_or_else(|| DexError::Encoding("amount overflow".into()))?
        / 10_000;
    let numerator = in_after_fee
        .checked_mul(reserve_out)
        .ok_or_else(|| DexError::Encoding("reserve overflow".into()))?;
    Ok(numerator / (reserve_in + in_after_fee))
}

/// Little-endian integer readers over fixed-layout account data
pub(crate) mod layout {
    use crate::ports::dex::DexError;
    use solana_sdk::pubkey::Pubkey;

    fn slice<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], DexError> {
        data.get(offset..offset + N)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| DexError::InvalidPool(format!("account data too short at {}", offset)))
    }

    pub fn u16_at(data: &[u8], offset: usize) -> Result<u16, DexError> {
        Ok(u16::from_le_bytes(slice(data, offset)?))
    }

    pub fn u32_at(data: &[u8], offset: usize) -> Result<u32, DexError> {
        Ok(u32::from_le_bytes(slice(data, offset)?))
    }

    pub fn i32_at(data: &[u8], offset: usize) -> Result<i32, DexError> {
        Ok(i32::from_le_bytes(slice(data, offset)?))
    }

    pub fn u64_at(data: &[u8], offset: usize) -> Result<u64, DexError> {
        Ok(u64::from_le_bytes(slice(data, offset)?))
    }

    pub fn u128_at(data: &[u8], offset: usize) -> Result<u128, DexError> {
        Ok(u128::from_le_bytes(slice(data, offset)?))
    }

    pub fn pubkey_at(data: &[u8], offset: usize) -> Result<Pubkey, DexError> {
        Ok(Pubkey::new_from_array(slice(data, offset)?))
    }
}
