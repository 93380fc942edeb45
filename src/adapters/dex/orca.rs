//! Orca Whirlpools (concentrated liquidity)
//!
//! Pools are created by the Anchor instruction `initialize_pool`; liquidity
//! arrives in the same transaction only when the creator bundles a deposit.
//! Quotes use the pool's current sqrt price (a spot-price approximation
//! that ignores tick crossings) checked against the output vault.

use async_trait::async_trait;
use solana_sdk::{
    hash::hashv,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use super::layout::{i32_at, pubkey_at, u128_at, u16_at};
use super::{seeded_liquidity, token_side};
use crate::adapters::solana::instructions::{
    associated_token_address, native_swap_envelope, parse_pubkey, to_u64,
};
use crate::domain::chain::{Chain, DexKind, RouterInfo};
use crate::domain::target::{PoolAccounts, PoolCreated};
use crate::ports::chain::{ChainClient, ChainTransaction, TxPayload};
use crate::ports::dex::{
    DexAdapter, DexError, Quote, QuoteRequest, SwapPlan, SwapRequest, SwapSide,
};

/// Ticks per tick array
pub const TICK_ARRAY_SIZE: i32 = 88;

/// Lowest / highest sqrt price the program accepts as a swap limit
pub const MIN_SQRT_PRICE_X64: u128 = 4_295_048_016;
pub const MAX_SQRT_PRICE_X64: u128 = 79_226_673_515_401_279_992_447_579_055;

/// fee_rate is in hundredths of a basis point
const FEE_RATE_DENOMINATOR: f64 = 1_000_000.0;

const WHIRLPOOL_ACCOUNT_LEN: usize = 245;

/// Anchor instruction discriminator
pub fn discriminator(name: &str) -> [u8; 8] {
    let hash = hashv(&[format!("global:{}", name).as_bytes()]);
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash.to_bytes()[..8]);
    out
}

/// Decoded fields of a Whirlpool account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhirlpoolState {
    pub tick_spacing: u16,
    pub fee_rate: u16,
    pub liquidity: u128,
    pub sqrt_price_x64: u128,
    pub tick_current_index: i32,
    pub token_mint_a: Pubkey,
    pub token_vault_a: Pubkey,
    pub token_mint_b: Pubkey,
    pub token_vault_b: Pubkey,
}

impl WhirlpoolState {
    pub fn decode(data: &[u8]) -> Result<Self, DexError> {
        if data.len() < WHIRLPOOL_ACCOUNT_LEN {
            return Err(DexError::InvalidPool(format!(
                "whirlpool account is {} bytes",
                data.len()
            )));
        }
        Ok(Self {
            tick_spacing: u16_at(data, 41)?,
            fee_rate: u16_at(data, 45)?,
            liquidity: u128_at(data, 49)?,
            sqrt_price_x64: u128_at(data, 65)?,
            tick_current_index: i32_at(data, 81)?,
            token_mint_a: pubkey_at(data, 101)?,
            token_vault_a: pubkey_at(data, 133)?,
            token_mint_b: pubkey_at(data, 181)?,
            token_vault_b: pubkey_at(data, 213)?,
        })
    }
}

/// Raw price of token A in token B base units
pub fn price_b_per_a(sqrt_price_x64: u128) -> f64 {
    let sqrt = sqrt_price_x64 as f64 / 2f64.powi(64);
    sqrt * sqrt
}

/// Start index of the tick array containing `tick`
pub fn tick_array_start(tick: i32, tick_spacing: u16) -> i32 {
    let ticks_per_array = tick_spacing as i32 * TICK_ARRAY_SIZE;
    tick.div_euclid(ticks_per_array) * ticks_per_array
}

/// The three tick arrays a swap may traverse, in traversal order
pub fn swap_tick_arrays(
    whirlpool: &Pubkey,
    program: &Pubkey,
    tick: i32,
    tick_spacing: u16,
    a_to_b: bool,
) -> [Pubkey; 3] {
    let step = tick_spacing as i32 * TICK_ARRAY_SIZE;
    let start = tick_array_start(tick, tick_spacing);
    let dir = if a_to_b { -1 } else { 1 };
    [0, 1, 2].map(|i| tick_array_address(whirlpool, program, start + dir * i * step))
}

fn tick_array_address(whirlpool: &Pubkey, program: &Pubkey, start: i32) -> Pubkey {
    Pubkey::find_program_address(
        &[b"tick_array", whirlpool.as_ref(), start.to_string().as_bytes()],
        program,
    )
    .0
}

fn oracle_address(whirlpool: &Pubkey, program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"oracle", whirlpool.as_ref()], program).0
}

/// Orca Whirlpool adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct OrcaAdapter;

impl OrcaAdapter {
    async fn fetch_state(
        client: &dyn ChainClient,
        whirlpool: &str,
    ) -> Result<WhirlpoolState, DexError> {
        let account = client
            .get_account(whirlpool)
            .await?
            .ok_or_else(|| DexError::MissingAccount {
                dex: DexKind::Orca,
                account: format!("whirlpool {}", whirlpool),
            })?;
        WhirlpoolState::decode(&account.data)
    }
}

#[async_trait]
impl DexAdapter for OrcaAdapter {
    fn kind(&self) -> DexKind {
        DexKind::Orca
    }

    fn detect_pool_creation(
        &self,
        chain: &Chain,
        router: &RouterInfo,
        tx: &ChainTransaction,
    ) -> Option<PoolCreated> {
        let init = discriminator("initialize_pool");
        let ix = tx.instructions.iter().find(|ix| {
            ix.program_id == router.pool_program_address
                && ix.data.len() >= 8 + 1 + 2 + 16
                && ix.data[..8] == init
                && ix.accounts.len() >= 8
        })?;

        let tick_spacing = u16_at(&ix.data, 9).ok()?;
        let sqrt_price = u128_at(&ix.data, 11).ok()?;

        let a = &ix.accounts;
        let (mint_a, mint_b, vault_a, vault_b) = (&a[1], &a[2], &a[5], &a[6]);
        let (token, native_is_a) = token_side(chain, mint_a, mint_b)?;

        let seeded = seeded_liquidity(chain, tx, token, &[vault_a.as_str(), vault_b.as_str()]);
        let decimals = seeded.token_decimals.unwrap_or(chain.native_decimals);
        let liquidity = chain.to_native(seeded.native_amount);

        // native per whole token from the initial sqrt price
        let raw = price_b_per_a(sqrt_price);
        let scale = 10f64.powi(decimals as i32 - chain.native_decimals as i32);
        let price = if native_is_a {
            if raw > 0.0 { scale / raw } else { 0.0 }
        } else {
            raw * scale
        };

        Some(PoolCreated {
            token_address: token.to_string(),
            token_decimals: decimals,
            initial_liquidity: liquidity,
            initial_price: price,
            pool: PoolAccounts::Whirlpool {
                whirlpool: a[4].clone(),
                token_mint_a: mint_a.clone(),
                token_mint_b: mint_b.clone(),
                token_vault_a: vault_a.clone(),
                token_vault_b: vault_b.clone(),
                tick_spacing,
                tick_current_index: None,
                sqrt_price_x64: Some(sqrt_price),
                fee_rate: None,
            },
            source_tx: tx.id.clone(),
        })
    }

    async fn resolve_pool(
        &self,
        client: &dyn ChainClient,
        pool: &PoolAccounts,
    ) -> Result<PoolAccounts, DexError> {
        let PoolAccounts::Whirlpool { whirlpool, .. } = pool else {
            return Err(DexError::WrongVenue(DexKind::Orca));
        };
        let state = Self::fetch_state(client, whirlpool).await?;

        let mut pool = pool.clone();
        if let PoolAccounts::Whirlpool {
            tick_current_index,
            sqrt_price_x64,
            fee_rate,
            tick_spacing,
            ..
        } = &mut pool
        {
            *tick_current_index = Some(state.tick_current_index);
            *sqrt_price_x64 = Some(state.sqrt_price_x64);
            *fee_rate = Some(state.fee_rate);
            *tick_spacing = state.tick_spacing;
        }
        Ok(pool)
    }

    async fn get_quote(
        &self,
        client: &dyn ChainClient,
        chain: &Chain,
        _router: &RouterInfo,
        request: &QuoteRequest,
    ) -> Result<Quote, DexError> {
        let PoolAccounts::Whirlpool { whirlpool, .. } = &request.pool else {
            return Err(DexError::WrongVenue(DexKind::Orca));
        };
        let state = Self::fetch_state(client, whirlpool).await?;
        if state.liquidity == 0 || state.sqrt_price_x64 == 0 {
            return Err(DexError::InsufficientLiquidity);
        }

        let (_, native_is_a) = token_side(
            chain,
            &state.token_mint_a.to_string(),
            &state.token_mint_b.to_string(),
        )
        .ok_or_else(|| DexError::InvalidPool("pool has no native side".into()))?;

        let a_to_b = (request.side == SwapSide::Buy) == native_is_a;
        let fee = 1.0 - state.fee_rate as f64 / FEE_RATE_DENOMINATOR;
        let raw = price_b_per_a(state.sqrt_price_x64);
        let amount_in = request.amount_in as f64 * fee;
        let amount_out = if a_to_b { amount_in * raw } else { amount_in / raw };
        let amount_out = if amount_out.is_finite() { amount_out.floor() as u128 } else { 0 };

        let out_vault = if a_to_b { state.token_vault_b } else { state.token_vault_a };
        let available = client.get_token_account_balance(&out_vault.to_string()).await?;
        if amount_out == 0 || amount_out > available {
            return Err(DexError::InsufficientLiquidity);
        }

        Ok(Quote {
            amount_in: request.amount_in,
            amount_out,
        })
    }

    fn build_swap_instruction(
        &self,
        chain: &Chain,
        router: &RouterInfo,
        request: &SwapRequest,
    ) -> Result<SwapPlan, DexError> {
        let PoolAccounts::Whirlpool {
            whirlpool,
            token_mint_a,
            token_mint_b,
            token_vault_a,
            token_vault_b,
            tick_spacing,
            tick_current_index,
            ..
        } = &request.pool
        else {
            return Err(DexError::WrongVenue(DexKind::Orca));
        };
        let tick = tick_current_index.ok_or_else(|| DexError::MissingAccount {
            dex: DexKind::Orca,
            account: "tick arrays (pool not resolved)".to_string(),
        })?;

        let (_, native_is_a) = token_side(chain, token_mint_a, token_mint_b)
            .ok_or_else(|| DexError::InvalidPool("pool has no native side".into()))?;
        let a_to_b = (request.side == SwapSide::Buy) == native_is_a;

        let program = parse_pubkey(&router.program_address)?;
        let pool_key = parse_pubkey(whirlpool)?;
        let owner = parse_pubkey(&request.owner)?;
        let token_mint = parse_pubkey(&request.token_address)?;
        let amount_in = to_u64(request.amount_in)?;
        let min_out = to_u64(request.min_amount_out)?;

        let tick_arrays = swap_tick_arrays(&pool_key, &program, tick, *tick_spacing, a_to_b);

        let mut data = discriminator("swap").to_vec();
        data.extend_from_slice(&amount_in.to_le_bytes());
        data.extend_from_slice(&min_out.to_le_bytes());
        let limit = if a_to_b { MIN_SQRT_PRICE_X64 } else { MAX_SQRT_PRICE_X64 };
        data.extend_from_slice(&limit.to_le_bytes());
        data.push(1); // amount_specified_is_input
        data.push(a_to_b as u8);

        let swap = Instruction {
            program_id: program,
            accounts: vec![
                AccountMeta::new_readonly(spl_token::id(), false),
                AccountMeta::new_readonly(owner, true),
                AccountMeta::new(pool_key, false),
                AccountMeta::new(associated_token_address(&owner, &parse_pubkey(token_mint_a)?), false),
                AccountMeta::new(parse_pubkey(token_vault_a)?, false),
                AccountMeta::new(associated_token_address(&owner, &parse_pubkey(token_mint_b)?), false),
                AccountMeta::new(parse_pubkey(token_vault_b)?, false),
                AccountMeta::new(tick_arrays[0], false),
                AccountMeta::new(tick_arrays[1], false),
                AccountMeta::new(tick_arrays[2], false),
                AccountMeta::new_readonly(oracle_address(&pool_key, &program), false),
            ],
            data,
        };

        let instructions =
            native_swap_envelope(&owner, &token_mint, request.side, amount_in, vec![swap])?;
        Ok(SwapPlan::single(TxPayload::Solana { instructions }))
    }
}
