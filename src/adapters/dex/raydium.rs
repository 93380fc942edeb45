//! Raydium AMM v4
//!
//! Pools are created with `initialize2` (tag 1), which logs
//! `initialize2: InitializeInstruction2 { nonce, open_time, init_pc_amount, init_coin_amount }`.
//! Swaps are `swap_base_in` (tag 9) and need the paired OpenBook market's
//! accounts, filled in by `resolve_pool`.

use async_trait::async_trait;
use regex::Regex;
use solana_sdk::instruction::{AccountMeta, Instruction};
use std::sync::OnceLock;

use super::serum::MarketState;
use super::{constant_product_out, seeded_liquidity, token_side};
use crate::adapters::solana::instructions::{
    native_swap_envelope, parse_pubkey, to_u64, user_token_accounts,
};
use crate::domain::chain::{Chain, DexKind, RouterInfo};
use crate::domain::target::{PoolAccounts, PoolCreated};
use crate::ports::chain::{ChainClient, ChainTransaction, TxPayload};
use crate::ports::dex::{
    DexAdapter, DexError, Quote, QuoteRequest, SwapPlan, SwapRequest, SwapSide,
};

/// Trade fee charged by AMM v4 pools (0.25 %)
pub const RAYDIUM_FEE_BPS: u32 = 25;

const INITIALIZE2: u8 = 1;
const SWAP_BASE_IN: u8 = 9;

fn init_log_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"initialize2: InitializeInstruction2 \{[^}]*init_pc_amount: (\d+), init_coin_amount: (\d+)").ok()
        })
        .as_ref()
}

/// (init_pc_amount, init_coin_amount) from the program log
pub fn parse_init_amounts(logs: &[String]) -> Option<(u128, u128)> {
    let pattern = init_log_pattern()?;
    logs.iter().find_map(|line| {
        let caps = pattern.captures(line)?;
        Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
    })
}

/// Raydium AMM v4 adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct RaydiumAdapter;

#[async_trait]
impl DexAdapter for RaydiumAdapter {
    fn kind(&self) -> DexKind {
        DexKind::Raydium
    }

    fn detect_pool_creation(
        &self,
        chain: &Chain,
        router: &RouterInfo,
        tx: &ChainTransaction,
    ) -> Option<PoolCreated> {
        let ix = tx.instructions.iter().find(|ix| {
            ix.program_id == router.pool_program_address
                && ix.data.first() == Some(&INITIALIZE2)
                && ix.accounts.len() >= 17
        })?;
        let a = &ix.accounts;
        let (coin_mint, pc_mint) = (&a[8], &a[9]);
        let (coin_vault, pc_vault) = (&a[10], &a[11]);

        let (token, native_is_coin) = token_side(chain, coin_mint, pc_mint)?;
        let seeded = seeded_liquidity(chain, tx, token, &[coin_vault.as_str(), pc_vault.as_str()]);
        let decimals = seeded.token_decimals.unwrap_or(chain.native_decimals);

        let (liquidity, price) = match parse_init_amounts(&tx.log_messages) {
            Some((pc, coin)) => {
                let (native, token_amount) = if native_is_coin { (coin, pc) } else { (pc, coin) };
                let logged = super::SeededLiquidity {
                    native_amount: native,
                    token_amount,
                    token_decimals: Some(decimals),
                };
                logged.liquidity_and_price(chain, decimals)
            }
            None => seeded.liquidity_and_price(chain, decimals),
        };

        Some(PoolCreated {
            token_address: token.to_string(),
            token_decimals: decimals,
            initial_liquidity: liquidity,
            initial_price: price,
            pool: PoolAccounts::Raydium {
                amm: a[4].clone(),
                amm_authority: a[5].clone(),
                open_orders: a[6].clone(),
                target_orders: a[12].clone(),
                coin_mint: coin_mint.clone(),
                pc_mint: pc_mint.clone(),
                coin_vault: coin_vault.clone(),
                pc_vault: pc_vault.clone(),
                market_program: a[15].clone(),
                market: a[16].clone(),
                market_accounts: None,
            },
            source_tx: tx.id.clone(),
        })
    }

    /// Read the paired market to learn its queues, sides and vault signer
    async fn resolve_pool(
        &self,
        client: &dyn ChainClient,
        pool: &PoolAccounts,
    ) -> Result<PoolAccounts, DexError> {
        let PoolAccounts::Raydium {
            market,
            market_program,
            market_accounts,
            ..
        } = pool
        else {
            return Err(DexError::WrongVenue(DexKind::Raydium));
        };
        if market_accounts.is_some() {
            return Ok(pool.clone());
        }

        let account = client
            .get_account(market)
            .await?
            .ok_or_else(|| DexError::MissingAccount {
                dex: DexKind::Raydium,
                account: format!("market {}", market),
            })?;
        let state = MarketState::decode(&account.data)?;
        let resolved = state.market_accounts(&parse_pubkey(market)?, &parse_pubkey(market_program)?)?;

        let mut pool = pool.clone();
        if let PoolAccounts::Raydium { market_accounts, .. } = &mut pool {
            *market_accounts = Some(resolved);
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
        let PoolAccounts::Raydium {
            coin_mint,
            pc_mint,
            coin_vault,
            pc_vault,
            ..
        } = &request.pool
        else {
            return Err(DexError::WrongVenue(DexKind::Raydium));
        };

        let (_, native_is_coin) = token_side(chain, coin_mint, pc_mint)
            .ok_or_else(|| DexError::InvalidPool("pool has no native side".into()))?;
        let coin = client.get_token_account_balance(coin_vault).await?;
        let pc = client.get_token_account_balance(pc_vault).await?;
        let (native, token) = if native_is_coin { (coin, pc) } else { (pc, coin) };

        let amount_out = match request.side {
            SwapSide::Buy => constant_product_out(request.amount_in, native, token, RAYDIUM_FEE_BPS)?,
            SwapSide::Sell => constant_product_out(request.amount_in, token, native, RAYDIUM_FEE_BPS)?,
        };
        Ok(Quote {
            amount_in: request.amount_in,
            amount_out,
        })
    }

    fn build_swap_instruction(
        &self,
        _chain: &Chain,
        router: &RouterInfo,
        request: &SwapRequest,
    ) -> Result<SwapPlan, DexError> {
        let PoolAccounts::Raydium {
            amm,
            amm_authority,
            open_orders,
            target_orders,
            coin_vault,
            pc_vault,
            market_program,
            market,
            market_accounts,
            ..
        } = &request.pool
        else {
            return Err(DexError::WrongVenue(DexKind::Raydium));
        };
        let m = market_accounts.as_ref().ok_or_else(|| DexError::MissingAccount {
            dex: DexKind::Raydium,
            account: "market accounts (pool not resolved)".to_string(),
        })?;

        let owner = parse_pubkey(&request.owner)?;
        let token_mint = parse_pubkey(&request.token_address)?;
        let amount_in = to_u64(request.amount_in)?;
        let min_out = to_u64(request.min_amount_out)?;
        let (user_src, user_dst) = user_token_accounts(&owner, &token_mint, request.side);

        let mut data = Vec::with_capacity(17);
        data.push(SWAP_BASE_IN);
        data.extend_from_slice(&amount_in.to_le_bytes());
        data.extend_from_slice(&min_out.to_le_bytes());

        let swap = Instruction {
            program_id: parse_pubkey(&router.program_address)?,
            accounts: vec![
                AccountMeta::new_readonly(spl_token::id(), false),
                AccountMeta::new(parse_pubkey(amm)?, false),
                AccountMeta::new_readonly(parse_pubkey(amm_authority)?, false),
                AccountMeta::new(parse_pubkey(open_orders)?, false),
                AccountMeta::new(parse_pubkey(target_orders)?, false),
                AccountMeta::new(parse_pubkey(coin_vault)?, false),
                AccountMeta::new(parse_pubkey(pc_vault)?, false),
                AccountMeta::new_readonly(parse_pubkey(market_program)?, false),
                AccountMeta::new(parse_pubkey(market)?, false),
                AccountMeta::new(parse_pubkey(&m.bids)?, false),
                AccountMeta::new(parse_pubkey(&m.asks)?, false),
                AccountMeta::new(parse_pubkey(&m.event_queue)?, false),
                AccountMeta::new(parse_pubkey(&m.coin_vault)?, false),
                AccountMeta::new(parse_pubkey(&m.pc_vault)?, false),
                AccountMeta::new_readonly(parse_pubkey(&m.vault_signer)?, false),
                AccountMeta::new(user_src, false),
                AccountMeta::new(user_dst, false),
                AccountMeta::new_readonly(owner, true),
            ],
            data,
        };

        let instructions =
            native_swap_envelope(&owner, &token_mint, request.side, amount_in, vec![swap])?;
        Ok(SwapPlan::single(TxPayload::Solana { instructions }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::dex::serum::tests::{market_fixture, SERUM_PROGRAM};
    use crate::adapters::dex::tests::{delta, WSOL};
    use crate::domain::chain::tests::solana_chain;
    use crate::ports::chain::{AccountSnapshot, MockChainClient, RawInstruction, RpcError};
    use solana_sdk::pubkey::Pubkey;

    const AMM_PROGRAM: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";

    fn router() -> RouterInfo {
        RouterInfo {
            program_address: AMM_PROGRAM.to_string(),
            pool_program_address: AMM_PROGRAM.to_string(),
        }
    }

    fn initialize2_tx(token_mint: &str, market: &str, logs: Vec<String>) -> ChainTransaction {
        let mut accounts: Vec<String> = (0..21).map(|_| Pubkey::new_unique().to_string()).collect();
        accounts[8] = token_mint.to_string();
        accounts[9] = WSOL.to_string();
        accounts[10] = "CoinVault".to_string();
        accounts[11] = "PcVault".to_string();
        accounts[15] = SERUM_PROGRAM.to_string();
        accounts[16] = market.to_string();

        ChainTransaction {
            id: "init-sig".to_string(),
            instructions: vec![RawInstruction {
                program_id: AMM_PROGRAM.to_string(),
                accounts,
                data: vec![INITIALIZE2, 254, 0, 0, 0],
            }],
            log_messages: logs,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_init_log() {
        let logs = vec![
            "Program 675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8 invoke [1]".to_string(),
            "Program log: initialize2: InitializeInstruction2 { nonce: 254, open_time: 0, init_pc_amount: 5000000000, init_coin_amount: 1000000000000 }".to_string(),
        ];
        assert_eq!(parse_init_amounts(&logs), Some((5_000_000_000, 1_000_000_000_000)));
        assert_eq!(parse_init_amounts(&["Program log: swap".to_string()]), None);
    }

    #[test]
    fn test_detects_pool_from_log_amounts() {
        let logs = vec![
            "Program log: initialize2: InitializeInstruction2 { nonce: 254, open_time: 0, init_pc_amount: 5000000000, init_coin_amount: 1000000000000 }".to_string(),
        ];
        let mut tx = initialize2_tx("TokenMint", "Market", logs);
        tx.token_deltas = vec![delta("CoinVault", "TokenMint", 6, 0, 1_000_000_000_000)];

        let created = RaydiumAdapter
            .detect_pool_creation(&solana_chain(), &router(), &tx)
            .unwrap();
        assert_eq!(created.token_address, "TokenMint");
        assert_eq!(created.token_decimals, 6);
        approx::assert_relative_eq!(created.initial_liquidity, 5.0);
        // 5 SOL for 1,000,000 tokens
        approx::assert_relative_eq!(created.initial_price, 0.000005);
        assert!(matches!(created.pool, PoolAccounts::Raydium { market_accounts: None, .. }));
    }

    #[test]
    fn test_zero_liquidity_pool_is_not_tradable() {
        let tx = initialize2_tx("TokenMint", "Market", vec![]);
        let created = RaydiumAdapter
            .detect_pool_creation(&solana_chain(), &router(), &tx)
            .unwrap();
        assert!(!created.is_tradable());
    }

    #[test]
    fn test_ignores_other_programs() {
        let mut tx = initialize2_tx("TokenMint", "Market", vec![]);
        tx.instructions[0].program_id = "11111111111111111111111111111111".to_string();
        assert!(RaydiumAdapter
            .detect_pool_creation(&solana_chain(), &router(), &tx)
            .is_none());
    }

    fn resolved_request(side: SwapSide) -> (SwapRequest, Pubkey) {
        let (market, data, _) = market_fixture();
        let tx = initialize2_tx(&Pubkey::new_unique().to_string(), &market.to_string(), vec![]);
        let created = RaydiumAdapter
            .detect_pool_creation(&solana_chain(), &router(), &tx)
            .unwrap();

        let state = MarketState::decode(&data).unwrap();
        let mut pool = created.pool.clone();
        if let PoolAccounts::Raydium { market_accounts, coin_vault, pc_vault, .. } = &mut pool {
            *market_accounts = Some(
                state
                    .market_accounts(&market, &parse_pubkey(SERUM_PROGRAM).unwrap())
                    .unwrap(),
            );
            *coin_vault = Pubkey::new_unique().to_string();
            *pc_vault = Pubkey::new_unique().to_string();
        }

        let owner = Pubkey::new_unique();
        (
            SwapRequest {
                owner: owner.to_string(),
                pool,
                token_address: created.token_address,
                side,
                amount_in: 100_000_000,
                min_amount_out: 42,
                deadline: 0,
            },
            owner,
        )
    }

    #[test]
    fn test_swap_base_in_encoding() {
        let (request, owner) = resolved_request(SwapSide::Buy);
        let plan = RaydiumAdapter
            .build_swap_instruction(&solana_chain(), &router(), &request)
            .unwrap();

        let TxPayload::Solana { instructions } = &plan.steps[0] else {
            panic!("expected Solana payload");
        };
        let swap = &instructions[4];
        assert_eq!(swap.program_id.to_string(), AMM_PROGRAM);
        assert_eq!(swap.data[0], SWAP_BASE_IN);
        assert_eq!(u64::from_le_bytes(swap.data[1..9].try_into().unwrap()), 100_000_000);
        assert_eq!(u64::from_le_bytes(swap.data[9..17].try_into().unwrap()), 42);
        assert_eq!(swap.accounts.len(), 18);
        assert_eq!(swap.accounts[17].pubkey, owner);
        assert!(swap.accounts[17].is_signer);
    }

    #[test]
    fn test_unresolved_pool_is_missing_accounts() {
        let (mut request, _) = resolved_request(SwapSide::Sell);
        if let PoolAccounts::Raydium { market_accounts, .. } = &mut request.pool {
            *market_accounts = None;
        }
        assert!(matches!(
            RaydiumAdapter.build_swap_instruction(&solana_chain(), &router(), &request),
            Err(DexError::MissingAccount { dex: DexKind::Raydium, .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_pool_reads_market() {
        let (market, data, state) = market_fixture();
        let tx = initialize2_tx("TokenMint", &market.to_string(), vec![]);
        let created = RaydiumAdapter
            .detect_pool_creation(&solana_chain(), &router(), &tx)
            .unwrap();

        let mut client = MockChainClient::new();
        client.expect_get_account().returning(move |address| {
            Ok(Some(AccountSnapshot {
                address: address.to_string(),
                data: data.clone(),
                ..Default::default()
            }))
        });

        let resolved = RaydiumAdapter.resolve_pool(&client, &created.pool).await.unwrap();
        match resolved {
            PoolAccounts::Raydium { market_accounts: Some(m), .. } => {
                assert_eq!(m.bids, state.bids.to_string());
                assert_eq!(m.event_queue, state.event_queue.to_string());
            }
            other => panic!("unexpected pool {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_quote_uses_vault_reserves() {
        let tx = initialize2_tx("TokenMint", "Market", vec![]);
        let created = RaydiumAdapter
            .detect_pool_creation(&solana_chain(), &router(), &tx)
            .unwrap();

        let mut client = MockChainClient::new();
        client
            .expect_get_token_account_balance()
            .returning(|vault| match vault {
                "CoinVault" => Ok(1_000_000_000_000),
                "PcVault" => Ok(5_000_000_000),
                _ => Err(RpcError::InvalidAddress(vault.to_string())),
            });

        let quote = RaydiumAdapter
            .get_quote(
                &client,
                &solana_chain(),
                &router(),
                &QuoteRequest {
                    pool: created.pool,
                    token_address: "TokenMint".to_string(),
                    side: SwapSide::Buy,
                    amount_in: 50_000_000,
                },
            )
            .await
            .unwrap();
        assert_eq!(
            quote.amount_out,
            constant_product_out(50_000_000, 5_000_000_000, 1_000_000_000_000, RAYDIUM_FEE_BPS).unwrap()
        );
    }
}
