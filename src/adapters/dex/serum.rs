//! Serum DEX v3 / OpenBook order book markets
//!
//! Market creation is `InitializeMarket` (tag 0). A swap is a one-shot
//! immediate-or-cancel `NewOrderV3` (tag 10) followed by `SettleFunds`
//! (tag 5), routed through the wallet's open-orders account for the
//! market. Buys create and initialize that account; sells reuse it.
//!
//! New markets almost never carry liquidity, so detections are normally
//! discarded by the watcher.

use async_trait::async_trait;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    rent::Rent,
    system_instruction, sysvar,
};

use super::layout::{pubkey_at, u16_at, u32_at, u64_at};
use super::{constant_product_out, token_side};
use crate::adapters::solana::instructions::{
    native_swap_envelope, parse_pubkey, to_u64, user_token_accounts,
};
use crate::domain::chain::{Chain, DexKind, RouterInfo};
use crate::domain::target::{MarketAccounts, PoolAccounts, PoolCreated};
use crate::ports::chain::{ChainClient, ChainTransaction, TxPayload};
use crate::ports::dex::{
    DexAdapter, DexError, Quote, QuoteRequest, SwapPlan, SwapRequest, SwapSide,
};

const INITIALIZE_MARKET: u32 = 0;
const NEW_ORDER_V3: u32 = 10;
const SETTLE_FUNDS: u32 = 5;
const INIT_OPEN_ORDERS: u32 = 15;

/// Size of an open-orders account
pub const OPEN_ORDERS_LEN: usize = 3228;

/// Seed prefix for the per-market open-orders account
const OPEN_ORDERS_SEED: &str = "oo";

/// Decoded fields of a v3 market account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketState {
    pub vault_signer_nonce: u64,
    pub coin_mint: Pubkey,
    pub pc_mint: Pubkey,
    pub coin_vault: Pubkey,
    pub pc_vault: Pubkey,
    pub request_queue: Pubkey,
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub coin_lot_size: u64,
    pub pc_lot_size: u64,
    pub fee_rate_bps: u64,
}

impl MarketState {
    /// Decode a market account (5-byte "serum" head padding included)
    pub fn decode(data: &[u8]) -> Result<Self, DexError> {
        if data.len() < 388 {
            return Err(DexError::InvalidPool(format!(
                "market account is {} bytes",
                data.len()
            )));
        }
        Ok(Self {
            vault_signer_nonce: u64_at(data, 45)?,
            coin_mint: pubkey_at(data, 53)?,
            pc_mint: pubkey_at(data, 85)?,
            coin_vault: pubkey_at(data, 117)?,
            pc_vault: pubkey_at(data, 165)?,
            request_queue: pubkey_at(data, 221)?,
            event_queue: pubkey_at(data, 253)?,
            bids: pubkey_at(data, 285)?,
            asks: pubkey_at(data, 317)?,
            coin_lot_size: u64_at(data, 349)?,
            pc_lot_size: u64_at(data, 357)?,
            fee_rate_bps: u64_at(data, 365)?,
        })
    }

    pub fn market_accounts(
        &self,
        market: &Pubkey,
        program: &Pubkey,
    ) -> Result<MarketAccounts, DexError> {
        Ok(MarketAccounts {
            request_queue: self.request_queue.to_string(),
            event_queue: self.event_queue.to_string(),
            bids: self.bids.to_string(),
            asks: self.asks.to_string(),
            coin_vault: self.coin_vault.to_string(),
            pc_vault: self.pc_vault.to_string(),
            coin_mint: self.coin_mint.to_string(),
            pc_mint: self.pc_mint.to_string(),
            vault_signer: vault_signer(market, self.vault_signer_nonce, program)?.to_string(),
        })
    }
}

/// Market authority over its vaults
pub fn vault_signer(market: &Pubkey, nonce: u64, program: &Pubkey) -> Result<Pubkey, DexError> {
    Pubkey::create_program_address(&[market.as_ref(), &nonce.to_le_bytes()], program)
        .map_err(|e| DexError::InvalidPool(format!("vault signer for {}: {}", market, e)))
}

/// Open-orders account the sniper uses for `owner` on `market`
pub fn open_orders_address(owner: &Pubkey, market: &Pubkey, program: &Pubkey) -> Result<Pubkey, DexError> {
    Pubkey::create_with_seed(owner, &open_orders_seed(market), program)
        .map_err(|e| DexError::Encoding(e.to_string()))
}

fn open_orders_seed(market: &Pubkey) -> String {
    // seeds are capped at 32 bytes
    let market = market.to_string();
    format!("{}{}", OPEN_ORDERS_SEED, &market[..20.min(market.len())])
}

fn tagged(tag: u32) -> Vec<u8> {
    let mut data = vec![0u8];
    data.extend_from_slice(&tag.to_le_bytes());
    data
}

/// Serum / OpenBook adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct SerumAdapter;

#[async_trait]
impl DexAdapter for SerumAdapter {
    fn kind(&self) -> DexKind {
        DexKind::Serum
    }

    fn detect_pool_creation(
        &self,
        chain: &Chain,
        router: &RouterInfo,
        tx: &ChainTransaction,
    ) -> Option<PoolCreated> {
        let ix = tx.instructions.iter().find(|ix| {
            ix.program_id == router.pool_program_address
                && ix.data.len() >= 39
                && ix.data[0] == 0
                && u32_at(&ix.data, 1).ok() == Some(INITIALIZE_MARKET)
                && ix.accounts.len() >= 9
        })?;

        let coin_lot_size = u64_at(&ix.data, 5).ok()?;
        let pc_lot_size = u64_at(&ix.data, 13).ok()?;
        let fee_rate_bps = u16_at(&ix.data, 21).ok()?;
        let nonce = u64_at(&ix.data, 23).ok()?;

        let a = &ix.accounts;
        let (token, _) = token_side(chain, &a[7], &a[8])?;
        let market = parse_pubkey(&a[0]).ok()?;
        let program = parse_pubkey(&ix.program_id).ok()?;

        let seeded = super::seeded_liquidity(chain, tx, token, &[a[5].as_str(), a[6].as_str()]);
        let decimals = seeded.token_decimals.unwrap_or(chain.native_decimals);
        let (liquidity, price) = seeded.liquidity_and_price(chain, decimals);

        Some(PoolCreated {
            token_address: token.to_string(),
            token_decimals: decimals,
            initial_liquidity: liquidity,
            initial_price: price,
            pool: PoolAccounts::SerumMarket {
                market: a[0].clone(),
                market_accounts: MarketAccounts {
                    request_queue: a[1].clone(),
                    event_queue: a[2].clone(),
                    bids: a[3].clone(),
                    asks: a[4].clone(),
                    coin_vault: a[5].clone(),
                    pc_vault: a[6].clone(),
                    coin_mint: a[7].clone(),
                    pc_mint: a[8].clone(),
                    vault_signer: vault_signer(&market, nonce, &program).ok()?.to_string(),
                },
                coin_lot_size,
                pc_lot_size,
                fee_rate_bps,
            },
            source_tx: tx.id.clone(),
        })
    }

    /// Approximated as a constant-product pool over the market vaults
    async fn get_quote(
        &self,
        client: &dyn ChainClient,
        chain: &Chain,
        _router: &RouterInfo,
        request: &QuoteRequest,
    ) -> Result<Quote, DexError> {
        let PoolAccounts::SerumMarket {
            market_accounts: m,
            fee_rate_bps,
            ..
        } = &request.pool
        else {
            return Err(DexError::WrongVenue(DexKind::Serum));
        };

        let (_, native_is_coin) = token_side(chain, &m.coin_mint, &m.pc_mint)
            .ok_or_else(|| DexError::InvalidPool("market has no native side".into()))?;
        let coin = client.get_token_account_balance(&m.coin_vault).await?;
        let pc = client.get_token_account_balance(&m.pc_vault).await?;
        let (native, token) = if native_is_coin { (coin, pc) } else { (pc, coin) };

        let amount_out = match request.side {
            SwapSide::Buy => constant_product_out(request.amount_in, native, token, *fee_rate_bps as u32)?,
            SwapSide::Sell => constant_product_out(request.amount_in, token, native, *fee_rate_bps as u32)?,
        };
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
        let PoolAccounts::SerumMarket {
            market,
            market_accounts,
            coin_lot_size,
            pc_lot_size,
            ..
        } = &request.pool
        else {
            return Err(DexError::WrongVenue(DexKind::Serum));
        };

        let program = parse_pubkey(&router.program_address)?;
        let owner = parse_pubkey(&request.owner)?;
        let market = parse_pubkey(market)?;
        let token_mint = parse_pubkey(&request.token_address)?;
        let amount_in = to_u64(request.amount_in)?;
        let min_out = to_u64(request.min_amount_out)?;

        let (_, native_is_coin) =
            token_side(chain, &market_accounts.coin_mint, &market_accounts.pc_mint)
                .ok_or_else(|| DexError::InvalidPool("market has no native side".into()))?;
        let open_orders = open_orders_address(&owner, &market, &program)?;

        let mut swap = Vec::new();
        if request.side == SwapSide::Buy {
            swap.push(system_instruction::create_account_with_seed(
                &owner,
                &open_orders,
                &owner,
                &open_orders_seed(&market),
                Rent::default().minimum_balance(OPEN_ORDERS_LEN),
                OPEN_ORDERS_LEN as u64,
                &program,
            ));
            swap.push(Instruction {
                program_id: program,
                accounts: vec![
                    AccountMeta::new(open_orders, false),
                    AccountMeta::new_readonly(owner, true),
                    AccountMeta::new_readonly(market, false),
                    AccountMeta::new_readonly(sysvar::rent::id(), false),
                ],
                data: tagged(INIT_OPEN_ORDERS),
            });
        }

        // selling coin is an Ask, buying coin is a Bid
        let paying_coin = (request.side == SwapSide::Buy) == native_is_coin;
        let order = OrderParams::immediate_or_cancel(
            paying_coin,
            amount_in,
            min_out,
            *coin_lot_size,
            *pc_lot_size,
        )?;

        let (src, dst) = user_token_accounts(&owner, &token_mint, request.side);
        let (coin_wallet, pc_wallet) = if paying_coin { (src, dst) } else { (dst, src) };
        let coin_vault = parse_pubkey(&market_accounts.coin_vault)?;
        let pc_vault = parse_pubkey(&market_accounts.pc_vault)?;

        swap.push(Instruction {
            program_id: program,
            accounts: vec![
                AccountMeta::new(market, false),
                AccountMeta::new(open_orders, false),
                AccountMeta::new(parse_pubkey(&market_accounts.request_queue)?, false),
                AccountMeta::new(parse_pubkey(&market_accounts.event_queue)?, false),
                AccountMeta::new(parse_pubkey(&market_accounts.bids)?, false),
                AccountMeta::new(parse_pubkey(&market_accounts.asks)?, false),
                AccountMeta::new(src, false),
                AccountMeta::new_readonly(owner, true),
                AccountMeta::new(coin_vault, false),
                AccountMeta::new(pc_vault, false),
                AccountMeta::new_readonly(spl_token::id(), false),
                AccountMeta::new_readonly(sysvar::rent::id(), false),
            ],
            data: order.encode(),
        });
        swap.push(Instruction {
            program_id: program,
            accounts: vec![
                AccountMeta::new(market, false),
                AccountMeta::new(open_orders, false),
                AccountMeta::new_readonly(owner, true),
                AccountMeta::new(coin_vault, false),
                AccountMeta::new(pc_vault, false),
                AccountMeta::new(coin_wallet, false),
                AccountMeta::new(pc_wallet, false),
                AccountMeta::new_readonly(parse_pubkey(&market_accounts.vault_signer)?, false),
                AccountMeta::new_readonly(spl_token::id(), false),
            ],
            data: tagged(SETTLE_FUNDS),
        });

        let instructions =
            native_swap_envelope(&owner, &token_mint, request.side, amount_in, swap)?;
        Ok(SwapPlan::single(TxPayload::Solana { instructions }))
    }
}

/// `NewOrderV3` arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderParams {
    /// 0 = Bid, 1 = Ask
    pub side: u32,
    /// pc lots per coin lot
    pub limit_price: u64,
    pub max_coin_qty: u64,
    pub max_native_pc_qty: u64,
}

impl OrderParams {
    /// Worst acceptable price so that `min_out` is honoured
    pub fn immediate_or_cancel(
        paying_coin: bool,
        amount_in: u64,
        min_out: u64,
        coin_lot: u64,
        pc_lot: u64,
    ) -> Result<Self, DexError> {
        if coin_lot == 0 || pc_lot == 0 {
            return Err(DexError::InvalidPool("zero lot size".into()));
        }

        if paying_coin {
            let coin_lots = amount_in / coin_lot;
            if coin_lots == 0 {
                return Err(DexError::Encoding("amount below one coin lot".into()));
            }
            // lowest price that still yields min_out
            let limit_price = ((min_out / pc_lot) / coin_lots).max(1);
            Ok(Self {
                side: 1,
                limit_price,
                max_coin_qty: coin_lots,
                max_native_pc_qty: u64::MAX,
            })
        } else {
            let wanted_lots = (min_out / coin_lot).max(1);
            // highest price that still yields min_out
            let limit_price = ((amount_in / pc_lot) / wanted_lots).max(1);
            Ok(Self {
                side: 0,
                limit_price,
                max_coin_qty: u64::MAX,
                max_native_pc_qty: amount_in,
            })
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = tagged(NEW_ORDER_V3);
        data.extend_from_slice(&self.side.to_le_bytes());
        data.extend_from_slice(&self.limit_price.to_le_bytes());
        data.extend_from_slice(&self.max_coin_qty.to_le_bytes());
        data.extend_from_slice(&self.max_native_pc_qty.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes()); // self trade: decrement take
        data.extend_from_slice(&1u32.to_le_bytes()); // immediate or cancel
        data.extend_from_slice(&0u64.to_le_bytes()); // client order id
        data.extend_from_slice(&u16::MAX.to_le_bytes()); // match limit
        data
    }
}
