//! Uniswap V2 and its forks (PancakeSwap, QuickSwap, TraderJoe)
//!
//! Pair creation is the factory's `PairCreated` log; the first `Sync` from
//! the new pair in the same receipt carries the seeded reserves. Quotes go
//! through the router's `getAmountsOut`.

use alloy_primitives::{hex, Address, U256};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;

use super::token_side;
use crate::adapters::evm::abi::{self, IERC20, IJoeRouter02, IUniswapV2Factory, IUniswapV2Pair, IUniswapV2Router02};
use crate::adapters::evm::parse_address;
use crate::domain::chain::{from_base_units, Chain, DexKind, RouterInfo};
use crate::domain::target::{PoolAccounts, PoolCreated};
use crate::ports::chain::{ChainClient, ChainTransaction, TxPayload};
use crate::ports::dex::{
    DexAdapter, DexError, Quote, QuoteRequest, SwapPlan, SwapRequest, SwapSide,
};

/// Gas limit for router swaps
pub const SWAP_GAS_LIMIT: u64 = 250_000;

/// Gas limit for ERC-20 `approve`
pub const APPROVE_GAS_LIMIT: u64 = 100_000;

/// ERC-20 decimals assumed for new tokens
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Routers that name the native asset AVAX (`swapExactAVAXForTokens`, ...)
fn is_avax(chain: &Chain) -> bool {
    chain.native_symbol.eq_ignore_ascii_case("AVAX")
}

fn address(s: &str) -> Result<Address, DexError> {
    parse_address(s).ok_or_else(|| DexError::InvalidAddress(s.to_string()))
}

/// Uniswap V2 style router adapter
#[derive(Debug, Clone, Copy, Default)]
pub struct UniswapV2Adapter;

impl UniswapV2Adapter {
    fn path(chain: &Chain, token: &str, side: SwapSide) -> Result<Vec<Address>, DexError> {
        let weth = address(&chain.wrapped_native)?;
        let token = address(token)?;
        Ok(match side {
            SwapSide::Buy => vec![weth, token],
            SwapSide::Sell => vec![token, weth],
        })
    }
}

#[async_trait]
impl DexAdapter for UniswapV2Adapter {
    fn kind(&self) -> DexKind {
        DexKind::UniswapV2
    }

    fn event_topics(&self) -> Vec<String> {
        vec![hex::encode_prefixed(IUniswapV2Factory::PairCreated::SIGNATURE_HASH)]
    }

    fn detect_pool_creation(
        &self,
        chain: &Chain,
        router: &RouterInfo,
        tx: &ChainTransaction,
    ) -> Option<PoolCreated> {
        let factory = parse_address(&router.pool_program_address)?;
        let created = tx.evm_logs.iter().find_map(|log| {
            if log.address != factory
                || log.topics.first() != Some(&IUniswapV2Factory::PairCreated::SIGNATURE_HASH)
            {
                return None;
            }
            IUniswapV2Factory::PairCreated::decode_raw_log(log.topics.iter().copied(), &log.data, true).ok()
        })?;

        let token0 = created.token0.to_checksum(None);
        let token1 = created.token1.to_checksum(None);
        let mut normalized = chain.clone();
        normalized.wrapped_native = parse_address(&chain.wrapped_native)?.to_checksum(None);
        let (token, native_is_0) = token_side(&normalized, &token0, &token1)?;

        let reserves = tx.evm_logs.iter().find_map(|log| {
            if log.address != created.pair
                || log.topics.first() != Some(&IUniswapV2Pair::Sync::SIGNATURE_HASH)
            {
                return None;
            }
            let sync = IUniswapV2Pair::Sync::decode_raw_log(log.topics.iter().copied(), &log.data, true).ok()?;
            // uint112 always fits
            Some((sync.reserve0, sync.reserve1))
        });

        let (liquidity, price) = match reserves {
            Some((r0, r1)) => {
                let (native, token_reserve) = if native_is_0 { (r0, r1) } else { (r1, r0) };
                let liquidity = chain.to_native(native);
                let tokens = from_base_units(token_reserve, DEFAULT_TOKEN_DECIMALS);
                (liquidity, if tokens > 0.0 { liquidity / tokens } else { 0.0 })
            }
            None => (0.0, 0.0),
        };

        Some(PoolCreated {
            token_address: token.to_string(),
            token_decimals: DEFAULT_TOKEN_DECIMALS,
            initial_liquidity: liquidity,
            initial_price: price,
            pool: PoolAccounts::UniswapV2Pair {
                pair: created.pair.to_checksum(None),
                token0: token0.clone(),
                token1: token1.clone(),
            },
            source_tx: tx.id.clone(),
        })
    }

    async fn get_quote(
        &self,
        client: &dyn ChainClient,
        chain: &Chain,
        router: &RouterInfo,
        request: &QuoteRequest,
    ) -> Result<Quote, DexError> {
        if !matches!(request.pool, PoolAccounts::UniswapV2Pair { .. }) {
            return Err(DexError::WrongVenue(DexKind::UniswapV2));
        }

        let call = IUniswapV2Router02::getAmountsOutCall {
            amountIn: abi::uint(request.amount_in),
            path: Self::path(chain, &request.token_address, request.side)?,
        };
        let out = client.call(&router.program_address, &call.abi_encode()).await?;
        let amounts = IUniswapV2Router02::getAmountsOutCall::abi_decode_returns(&out, true)
            .map_err(|e| DexError::InvalidPool(format!("getAmountsOut: {}", e)))?
            .amounts;
        let amount_out = match amounts.last() {
            Some(last) => abi::amount(*last)
                .ok_or_else(|| DexError::InvalidPool("getAmountsOut: amount exceeds u128".into()))?,
            None => 0,
        };
        if amount_out == 0 {
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
        if !matches!(request.pool, PoolAccounts::UniswapV2Pair { .. }) {
            return Err(DexError::WrongVenue(DexKind::UniswapV2));
        }

        let owner = address(&request.owner)?;
        let router_address = address(&router.program_address)?;
        let path = Self::path(chain, &request.token_address, request.side)?;
        let deadline = U256::from(request.deadline.max(0) as u64);
        let amount_in = abi::uint(request.amount_in);
        let min_out = abi::uint(request.min_amount_out);

        match request.side {
            SwapSide::Buy => {
                let data = if is_avax(chain) {
                    IJoeRouter02::swapExactAVAXForTokensCall {
                        amountOutMin: min_out,
                        path,
                        to: owner,
                        deadline,
                    }
                    .abi_encode()
                } else {
                    IUniswapV2Router02::swapExactETHForTokensCall {
                        amountOutMin: min_out,
                        path,
                        to: owner,
                        deadline,
                    }
                    .abi_encode()
                };
                Ok(SwapPlan::single(TxPayload::EvmCall {
                    to: router.program_address.clone(),
                    data,
                    value: request.amount_in,
                    gas_limit: SWAP_GAS_LIMIT,
                }))
            }
            SwapSide::Sell => {
                let approve = IERC20::approveCall {
                    spender: router_address,
                    value: amount_in,
                }
                .abi_encode();
                let swap = if is_avax(chain) {
                    IJoeRouter02::swapExactTokensForAVAXCall {
                        amountIn: amount_in,
                        amountOutMin: min_out,
                        path,
                        to: owner,
                        deadline,
                    }
                    .abi_encode()
                } else {
                    IUniswapV2Router02::swapExactTokensForETHCall {
                        amountIn: amount_in,
                        amountOutMin: min_out,
                        path,
                        to: owner,
                        deadline,
                    }
                    .abi_encode()
                };
                Ok(SwapPlan {
                    steps: vec![
                        TxPayload::EvmCall {
                            to: request.token_address.clone(),
                            data: approve,
                            value: 0,
                            gas_limit: APPROVE_GAS_LIMIT,
                        },
                        TxPayload::EvmCall {
                            to: router.program_address.clone(),
                            data: swap,
                            value: 0,
                            gas_limit: SWAP_GAS_LIMIT,
                        },
                    ],
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::evm::same_address;
    use crate::domain::chain::{ChainFamily, EVM_NATIVE_DECIMALS};
    use crate::ports::chain::MockChainClient;
    use crate::ports::mocks::{amounts_out_response, evm_log};
    use std::collections::HashMap;

    const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
    const FACTORY: &str = "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f";
    const ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";
    const TOKEN: &str = "0x2222222222222222222222222222222222222222";
    const PAIR: &str = "0x1111111111111111111111111111111111111111";

    fn ethereum() -> Chain {
        let mut dex_programs = HashMap::new();
        dex_programs.insert(DexKind::UniswapV2, router());
        Chain {
            id: "ethereum".to_string(),
            name: "Ethereum".to_string(),
            family: ChainFamily::Evm,
            rpc_endpoints: vec!["http://localhost:8545".to_string()],
            native_symbol: "ETH".to_string(),
            native_decimals: EVM_NATIVE_DECIMALS,
            wrapped_native: WETH.to_string(),
            evm_chain_id: Some(1),
            treasury: "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F".to_string(),
            gas_reserve: 0,
            sweep_threshold: 0,
            min_account_balance: 0,
            dex_programs,
        }
    }

    fn router() -> RouterInfo {
        RouterInfo {
            program_address: ROUTER.to_string(),
            pool_program_address: FACTORY.to_string(),
        }
    }

    fn addr(s: &str) -> Address {
        parse_address(s).unwrap()
    }

    fn pair_created_tx(with_sync: bool) -> ChainTransaction {
        let mut logs = vec![evm_log(
            addr(FACTORY),
            &IUniswapV2Factory::PairCreated {
                token0: addr(TOKEN),
                token1: addr(WETH),
                pair: addr(PAIR),
                allPairsLength: U256::from(1u8),
            },
        )];
        if with_sync {
            // 1,000,000 tokens against 2 ETH
            logs.push(evm_log(
                addr(PAIR),
                &IUniswapV2Pair::Sync {
                    reserve0: 1_000_000 * 10u128.pow(18),
                    reserve1: 2 * 10u128.pow(18),
                },
            ));
        }

        ChainTransaction {
            id: "0xcreate".to_string(),
            evm_logs: logs,
            ..Default::default()
        }
    }

    #[test]
    fn test_detects_pair_with_reserves() {
        let created = UniswapV2Adapter
            .detect_pool_creation(&ethereum(), &router(), &pair_created_tx(true))
            .unwrap();

        assert!(same_address(&created.token_address, TOKEN));
        approx::assert_relative_eq!(created.initial_liquidity, 2.0);
        approx::assert_relative_eq!(created.initial_price, 0.000002);
        match created.pool {
            PoolAccounts::UniswapV2Pair { pair, .. } => assert!(same_address(&pair, PAIR)),
            other => panic!("unexpected pool {:?}", other),
        }
    }

    #[test]
    fn test_pair_without_sync_is_not_tradable() {
        let created = UniswapV2Adapter
            .detect_pool_creation(&ethereum(), &router(), &pair_created_tx(false))
            .unwrap();
        assert!(!created.is_tradable());
    }

    #[test]
    fn test_ignores_pairs_without_native_side() {
        let mut tx = pair_created_tx(true);
        tx.evm_logs[0].topics[2] = addr("0x3333333333333333333333333333333333333333").into_word();
        assert!(UniswapV2Adapter
            .detect_pool_creation(&ethereum(), &router(), &tx)
            .is_none());
    }

    #[test]
    fn test_ignores_foreign_factory() {
        let mut tx = pair_created_tx(true);
        tx.evm_logs[0].address = addr("0x4444444444444444444444444444444444444444");
        assert!(UniswapV2Adapter
            .detect_pool_creation(&ethereum(), &router(), &tx)
            .is_none());
    }

    fn request(side: SwapSide) -> SwapRequest {
        SwapRequest {
            owner: "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F".to_string(),
            pool: crate::domain::target::tests::pair_pool(),
            token_address: TOKEN.to_string(),
            side,
            amount_in: 10u128.pow(17),
            min_amount_out: 5_000,
            deadline: 1_700_000_300,
        }
    }

    #[test]
    fn test_buy_sends_value_to_router() {
        let plan = UniswapV2Adapter
            .build_swap_instruction(&ethereum(), &router(), &request(SwapSide::Buy))
            .unwrap();
        assert_eq!(plan.steps.len(), 1);
        match &plan.steps[0] {
            TxPayload::EvmCall { to, data, value, gas_limit } => {
                assert_eq!(to, ROUTER);
                assert_eq!(*value, 10u128.pow(17));
                assert_eq!(*gas_limit, SWAP_GAS_LIMIT);
                let call = IUniswapV2Router02::swapExactETHForTokensCall::abi_decode(data, true).unwrap();
                assert_eq!(call.amountOutMin, U256::from(5_000u64));
                assert_eq!(call.deadline, U256::from(1_700_000_300u64));
                assert_eq!(call.path, vec![addr(WETH), addr(TOKEN)]);
                assert_eq!(call.to, addr("0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F"));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_sell_approves_then_swaps() {
        let plan = UniswapV2Adapter
            .build_swap_instruction(&ethereum(), &router(), &request(SwapSide::Sell))
            .unwrap();
        assert_eq!(plan.steps.len(), 2);
        match (&plan.steps[0], &plan.steps[1]) {
            (
                TxPayload::EvmCall { to: token, data: approve, .. },
                TxPayload::EvmCall { to: router, data: swap, value, .. },
            ) => {
                assert_eq!(token, TOKEN);
                let approve = IERC20::approveCall::abi_decode(approve, true).unwrap();
                assert_eq!(approve.spender, addr(ROUTER));
                assert_eq!(approve.value, U256::from(10u128.pow(17)));
                assert_eq!(router, ROUTER);
                let swap = IUniswapV2Router02::swapExactTokensForETHCall::abi_decode(swap, true).unwrap();
                assert_eq!(swap.path, vec![addr(TOKEN), addr(WETH)]);
                assert_eq!(*value, 0);
            }
            other => panic!("unexpected payloads {:?}", other),
        }
    }

    #[test]
    fn test_avalanche_router_names() {
        let mut chain = ethereum();
        chain.native_symbol = "AVAX".to_string();
        let plan = UniswapV2Adapter
            .build_swap_instruction(&chain, &router(), &request(SwapSide::Buy))
            .unwrap();
        let TxPayload::EvmCall { data, .. } = &plan.steps[0] else {
            panic!("expected EVM call");
        };
        assert_eq!(data[..4], IJoeRouter02::swapExactAVAXForTokensCall::SELECTOR);
    }

    #[tokio::test]
    async fn test_quote_reads_last_amount() {
        let mut client = MockChainClient::new();
        client.expect_call().returning(|to, data| {
            assert!(same_address(to, ROUTER));
            let call = IUniswapV2Router02::getAmountsOutCall::abi_decode(data, true).unwrap();
            assert_eq!(call.amountIn, U256::from(10u128.pow(17)));
            Ok(amounts_out_response(&[10u128.pow(17), 49_000 * 10u128.pow(18)]))
        });

        let quote = UniswapV2Adapter
            .get_quote(
                &client,
                &ethereum(),
                &router(),
                &QuoteRequest {
                    pool: crate::domain::target::tests::pair_pool(),
                    token_address: TOKEN.to_string(),
                    side: SwapSide::Buy,
                    amount_in: 10u128.pow(17),
                },
            )
            .await
            .unwrap();
        assert_eq!(quote.amount_out, 49_000 * 10u128.pow(18));
    }
}
