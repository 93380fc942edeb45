//! Sniper Integration Tests
//!
//! End-to-end flows across watcher, risk gate, executor, monitor and sweeper:
//! 1. Pool detection discards zero-liquidity pools
//! 2. RPC failure during risk checks rejects the target
//! 3. Take profit closes an open trade
//! 4. Underfunded wallets never send
//! 5. RPC failover to a healthy endpoint
//! 6. Concurrent entries and sweeps against the same wallet
//!
//! Chains are scripted with `ScriptedChainClient`; the failover test runs
//! against local TCP endpoints.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use chain_sniper::adapters::evm::abi::{IUniswapV2Factory, IUniswapV2Pair};
use chain_sniper::adapters::evm::parse_address;
use chain_sniper::adapters::keystore::{KeyCipher, Keystore};
use chain_sniper::adapters::ledger::Ledger;
use chain_sniper::adapters::rpc::RetryPolicy;
use chain_sniper::application::{
    ExecutionOutcome, ExecutorConfig, LiquidityTiers, MonitorConfig, MonitorTick, OrchestratorConfig,
    PoolEventWatcher, PositionBook, PositionMonitor, Rejection, SniperOrchestrator, SweepConfig, TradeExecutor,
    TreasurySweeper, WalletPool, WalletPoolConfig, WatcherConfig,
};
use chain_sniper::domain::{
    Chain, ChainFamily, ChainRegistry, DexKind, ExitReason, PoolAccounts, PoolCreated, RouterInfo, SniperTarget,
    TradeStatus,
};
use chain_sniper::ports::chain::{AccountSnapshot, ChainClient, ChainTransaction, EventBatch, EventRef, RpcError};
use chain_sniper::ports::mocks::{amounts_out_response, evm_log, ScriptedChainClient};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ============================================================================
// Test Fixtures
// ============================================================================

const ETH: u128 = 1_000_000_000_000_000_000;
const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
const ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";
const FACTORY: &str = "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f";
const PAIR: &str = "0x3333333333333333333333333333333333333333";
const TOKEN: &str = "0x2222222222222222222222222222222222222222";
const OTHER_TOKEN: &str = "0x4444444444444444444444444444444444444444";
const TREASURY: &str = "0x000000000000000000000000000000000000dEaD";

fn ethereum(rpc_endpoints: Vec<String>) -> Chain {
    let mut dex_programs = HashMap::new();
    dex_programs.insert(
        DexKind::UniswapV2,
        RouterInfo {
            program_address: ROUTER.to_string(),
            pool_program_address: FACTORY.to_string(),
        },
    );
    Chain {
        id: "ethereum".to_string(),
        name: "Ethereum".to_string(),
        family: ChainFamily::Evm,
        rpc_endpoints,
        native_symbol: "ETH".to_string(),
        native_decimals: 18,
        wrapped_native: WETH.to_string(),
        evm_chain_id: Some(1),
        treasury: TREASURY.to_string(),
        gas_reserve: ETH / 100,
        sweep_threshold: ETH / 2,
        min_account_balance: 0,
        dex_programs,
    }
}

fn pool_created(token: &str, liquidity: f64, price: f64) -> PoolCreated {
    PoolCreated {
        token_address: token.to_string(),
        token_decimals: 18,
        initial_liquidity: liquidity,
        initial_price: price,
        pool: PoolAccounts::UniswapV2Pair {
            pair: PAIR.to_string(),
            token0: token.to_string(),
            token1: WETH.to_string(),
        },
        source_tx: "0xabc".to_string(),
    }
}

fn target(token: &str) -> SniperTarget {
    SniperTarget::from_pool("ethereum", DexKind::UniswapV2, pool_created(token, 50.0, 1e-6))
}

/// Deployed token contract with plenty of bytecode
fn token_contract(token: &str) -> AccountSnapshot {
    AccountSnapshot {
        address: token.to_string(),
        balance: ETH,
        owner: None,
        executable: true,
        data: vec![0x60; 4_000],
    }
}

/// 0.1 ETH buys 100,000 tokens: entry price 1e-6
fn buy_quote() -> Vec<u8> {
    amounts_out_response(&[ETH / 10, 100_000 * ETH])
}

struct Harness {
    registry: Arc<ChainRegistry>,
    clients: HashMap<String, Arc<dyn ChainClient>>,
    wallets: Arc<WalletPool>,
    ledger: Arc<Ledger>,
    positions: Arc<PositionBook>,
    client: ScriptedChainClient,
    _dir: TempDir,
}

fn harness(client: ScriptedChainClient, wallet_count: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ChainRegistry::new(vec![ethereum(vec!["http://localhost:8545".into()])]).unwrap());
    let mut clients: HashMap<String, Arc<dyn ChainClient>> = HashMap::new();
    clients.insert("ethereum".into(), Arc::new(client.clone()));

    let keystore = Keystore::new(dir.path().join("wallets"), KeyCipher::from_bytes(&[7u8; 32]).unwrap());
    let wallets = Arc::new(WalletPool::new(&registry, &clients, keystore, WalletPoolConfig::default()));
    for _ in 0..wallet_count {
        wallets.create_wallet("ethereum").unwrap();
    }

    Harness {
        registry,
        clients,
        wallets,
        ledger: Arc::new(Ledger::open(dir.path().join("ledger.jsonl")).unwrap()),
        positions: Arc::new(PositionBook::new()),
        client,
        _dir: dir,
    }
}

fn executor(h: &Harness, config: ExecutorConfig) -> Arc<TradeExecutor> {
    Arc::new(TradeExecutor::new(
        h.registry.clone(),
        h.wallets.clone(),
        h.ledger.clone(),
        h.positions.clone(),
        config,
    ))
}

fn orchestrator(h: &Harness) -> Arc<SniperOrchestrator> {
    Arc::new(SniperOrchestrator::new(
        h.registry.clone(),
        h.wallets.clone(),
        h.clients.clone(),
        h.ledger.clone(),
        h.positions.clone(),
        ExecutorConfig::default(),
        LiquidityTiers::default(),
        OrchestratorConfig {
            monitor: MonitorConfig {
                interval: Duration::from_secs(3600),
                ..Default::default()
            },
            ..Default::default()
        },
    ))
}

fn addr(s: &str) -> Address {
    parse_address(s).unwrap()
}

/// Factory PairCreated for `token`/WETH plus the pair's first Sync
fn pair_created_tx(id: &str, token: &str, token_reserve: u128, native_reserve: u128) -> ChainTransaction {
    ChainTransaction {
        id: id.to_string(),
        evm_logs: vec![
            evm_log(
                addr(FACTORY),
                &IUniswapV2Factory::PairCreated {
                    token0: addr(token),
                    token1: addr(WETH),
                    pair: addr(PAIR),
                    allPairsLength: U256::from(1u64),
                },
            ),
            evm_log(
                addr(PAIR),
                &IUniswapV2Pair::Sync {
                    reserve0: token_reserve,
                    reserve1: native_reserve,
                },
            ),
        ],
        ..Default::default()
    }
}

fn batch(ids: &[&str]) -> EventBatch {
    EventBatch {
        events: ids
            .iter()
            .map(|id| EventRef {
                id: id.to_string(),
                slot: 1,
            })
            .collect(),
        cursor: ids.first().map(|s| s.to_string()),
        next_page: None,
    }
}

/// Endpoint that accepts connections and never answers
async fn silent_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

/// Endpoint answering every JSON-RPC request with `result`
async fn healthy_endpoint(result: Value) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{}", addr)
}

// ============================================================================
// Detection
// ============================================================================

#[tokio::test]
async fn test_zero_liquidity_pool_produces_no_target() {
    let client = ScriptedChainClient::new("ethereum", ChainFamily::Evm)
        .with_events(Ok(batch(&[])))
        .with_events(Ok(batch(&["0xfull", "0xempty"])))
        .with_transaction(pair_created_tx("0xempty", OTHER_TOKEN, 1_000_000 * ETH, 0))
        .with_transaction(pair_created_tx("0xfull", TOKEN, 1_000_000 * ETH, 2 * ETH));

    let mut watcher = PoolEventWatcher::new(
        ethereum(vec!["http://localhost:8545".into()]),
        DexKind::UniswapV2,
        Arc::new(client),
        WatcherConfig::default(),
    )
    .unwrap();

    assert!(watcher.poll_once().await.unwrap().is_empty());
    let targets = watcher.poll_once().await.unwrap();

    assert_eq!(targets.len(), 1);
    assert!(targets[0].token_address.eq_ignore_ascii_case(TOKEN));
    approx::assert_relative_eq!(targets[0].liquidity, 2.0);
    assert_eq!(targets[0].risk_score, None);
}

// ============================================================================
// Risk gate and sizing
// ============================================================================

#[tokio::test]
async fn test_rpc_failure_during_risk_check_rejects() {
    let client = ScriptedChainClient::new("ethereum", ChainFamily::Evm)
        .with_default_balance(10 * ETH)
        .with_account_error(RpcError::Timeout(Duration::from_secs(5)));
    let h = harness(client, 1);
    let orchestrator = orchestrator(&h);

    match orchestrator.process(target(TOKEN)).await {
        Some(ExecutionOutcome::Rejected(Rejection::RiskRejected { score, .. })) => assert_eq!(score, Some(1.0)),
        other => panic!("expected RiskRejected, got {:?}", other),
    }
    assert_eq!(h.client.call_count("send"), 0);
    assert!(h.ledger.replay().unwrap().trades().is_empty());
}

#[tokio::test]
async fn test_underfunded_wallet_sends_nothing() {
    let client = ScriptedChainClient::new("ethereum", ChainFamily::Evm)
        .with_default_balance(ETH / 20)
        .with_account(token_contract(TOKEN))
        .with_call_response(Ok(buy_quote()));
    let h = harness(client, 1);
    let orchestrator = orchestrator(&h);

    match orchestrator.process(target(TOKEN)).await {
        Some(ExecutionOutcome::Rejected(Rejection::InsufficientFunds {
            required, available, ..
        })) => {
            assert_eq!(required, ETH / 10);
            assert_eq!(available, ETH / 20);
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }
    assert!(h.client.sent().is_empty());
}

#[tokio::test]
async fn test_daily_limit_blocks_second_entry() {
    let client = ScriptedChainClient::new("ethereum", ChainFamily::Evm)
        .with_default_balance(10 * ETH)
        .with_call_response(Ok(buy_quote()));
    let h = harness(client, 1);
    let executor = executor(
        &h,
        ExecutorConfig {
            max_daily_trades: 1,
            ..Default::default()
        },
    );

    let first = executor.execute(target(TOKEN).with_risk_score(0.1)).await.unwrap();
    assert!(matches!(first, ExecutionOutcome::Opened(_)));

    let second = executor.execute(target(OTHER_TOKEN).with_risk_score(0.1)).await.unwrap();
    assert!(matches!(
        second,
        ExecutionOutcome::Rejected(Rejection::DailyLimitReached { .. })
    ));
    assert_eq!(h.client.sent().len(), 1);
}

#[tokio::test]
async fn test_duplicate_detection_trades_once() {
    let client = ScriptedChainClient::new("ethereum", ChainFamily::Evm)
        .with_default_balance(10 * ETH)
        .with_account(token_contract(TOKEN))
        .with_call_response(Ok(buy_quote()));
    let h = harness(client, 2);
    let orchestrator = orchestrator(&h);

    orchestrator.intake(target(TOKEN));
    orchestrator.intake(target(TOKEN));
    tokio::time::sleep(Duration::from_millis(300)).await;
    orchestrator.stop();

    let state = h.ledger.replay().unwrap();
    assert_eq!(state.trades().len(), 1);
    assert_eq!(orchestrator.status().dedup_entries, 1);
}

// ============================================================================
// Exits
// ============================================================================

#[tokio::test]
async fn test_take_profit_closes_trade() {
    let client = ScriptedChainClient::new("ethereum", ChainFamily::Evm)
        .with_default_balance(10 * ETH)
        .with_call_response(Ok(buy_quote()));
    let h = harness(client, 1);
    let executor = executor(&h, ExecutorConfig::default());

    let trade = match executor.execute(target(TOKEN).with_risk_score(0.1)).await.unwrap() {
        ExecutionOutcome::Opened(trade) => trade,
        other => panic!("expected Opened, got {:?}", other),
    };
    approx::assert_relative_eq!(trade.entry_price, 1e-6, epsilon = 1e-15);
    h.client
        .set_holdings(&trade.wallet_address, TOKEN, trade.token_amount);

    // 100,000 tokens now fetch 0.16 ETH: 1.6e-6 against a 1.5e-6 take profit
    h.client
        .set_call_response(Ok(amounts_out_response(&[100_000 * ETH, 16 * ETH / 100])));

    let monitor = PositionMonitor::new(trade.id, executor.clone(), h.positions.clone(), MonitorConfig::default());
    match monitor.check_once().await {
        MonitorTick::Closed(closed) => {
            assert_eq!(closed.status, TradeStatus::Closed);
            assert_eq!(closed.exit_reason, Some(ExitReason::TakeProfit));
            assert!(closed.pnl_pct().unwrap() > 50.0);
        }
        other => panic!("expected Closed, got {:?}", other),
    }

    // buy, approve, sell
    assert_eq!(h.client.sent().len(), 3);
    let recorded = h.ledger.replay().unwrap();
    assert_eq!(recorded.get(&trade.id).unwrap().status, TradeStatus::Closed);
    assert!(recorded.open_trades().is_empty());
    assert!(h.positions.get(&trade.id).is_none());
}

// ============================================================================
// Treasury
// ============================================================================

#[tokio::test]
async fn test_sweep_skips_wallet_with_open_trade() {
    let client = ScriptedChainClient::new("ethereum", ChainFamily::Evm)
        .with_default_balance(10 * ETH)
        .with_call_response(Ok(buy_quote()));
    let h = harness(client, 2);
    let executor = executor(&h, ExecutorConfig::default());

    let trade = match executor.execute(target(TOKEN).with_risk_score(0.1)).await.unwrap() {
        ExecutionOutcome::Opened(trade) => trade,
        other => panic!("expected Opened, got {:?}", other),
    };

    let sweeper = TreasurySweeper::new(
        h.registry.clone(),
        h.wallets.clone(),
        h.positions.clone(),
        h.ledger.clone(),
        SweepConfig::default(),
    );
    let swept = sweeper.sweep_chain("ethereum").await.unwrap();

    assert_eq!(swept.len(), 1);
    assert_ne!(swept[0].wallet_address, trade.wallet_address);
    assert_eq!(swept[0].destination, TREASURY);
    assert_eq!(swept[0].amount, 10 * ETH - ETH / 100);
    assert_eq!(h.ledger.replay().unwrap().sweeps.len(), 1);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_entries_respect_daily_limit() {
    // a slow quote leaves both entries in flight at once
    let client = ScriptedChainClient::new("ethereum", ChainFamily::Evm)
        .with_default_balance(10 * ETH)
        .with_call_response(Ok(buy_quote()))
        .with_call_delay(Duration::from_millis(30));
    let h = harness(client, 1);
    let executor = executor(
        &h,
        ExecutorConfig {
            max_daily_trades: 1,
            ..Default::default()
        },
    );

    let first = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.execute(target(TOKEN).with_risk_score(0.1)).await })
    };
    let second = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.execute(target(OTHER_TOKEN).with_risk_score(0.1)).await })
    };
    let (first, second) = tokio::join!(first, second);
    let outcomes = [first.unwrap().unwrap(), second.unwrap().unwrap()];

    let opened = outcomes
        .iter()
        .filter(|o| matches!(o, ExecutionOutcome::Opened(_)))
        .count();
    assert_eq!(opened, 1, "outcomes: {:?}", outcomes);
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, ExecutionOutcome::Rejected(Rejection::DailyLimitReached { .. }))));
    assert_eq!(h.client.sent().len(), 1);
    assert_eq!(h.ledger.replay().unwrap().trades().len(), 1);
}

#[tokio::test]
async fn test_sweep_reads_balance_after_taking_wallet_lock() {
    let client = ScriptedChainClient::new("ethereum", ChainFamily::Evm);
    let h = harness(client, 1);
    let wallet = h.wallets.wallets("ethereum").unwrap().remove(0);
    h.client.set_balance(&wallet.address, 5 * ETH);

    let sweeper = Arc::new(TreasurySweeper::new(
        h.registry.clone(),
        h.wallets.clone(),
        h.positions.clone(),
        h.ledger.clone(),
        SweepConfig::default(),
    ));

    // an in-flight transaction holds the wallet while the sweep queues
    let guard = h.wallets.lock_for_entry("ethereum", &wallet.address).await.unwrap();
    let pass = {
        let sweeper = sweeper.clone();
        tokio::spawn(async move { sweeper.sweep_chain("ethereum").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    // the in-flight transaction spent gas
    h.client.set_balance(&wallet.address, 5 * ETH - ETH / 200);
    drop(guard);

    let swept = pass.await.unwrap().unwrap();
    assert_eq!(swept.len(), 1);
    // whatever remains after the sweep is exactly the gas reserve
    assert_eq!(swept[0].amount, 5 * ETH - ETH / 200 - ETH / 100);
}

// ============================================================================
// RPC failover
// ============================================================================

#[tokio::test]
async fn test_failover_to_healthy_endpoint() {
    let dead = silent_endpoint().await;
    let healthy = healthy_endpoint(json!("0xde0b6b3a7640000")).await;
    let chain = ethereum(vec![dead, healthy.clone()]);

    let client = chain_sniper::adapters::connect(
        &chain,
        Duration::from_millis(200),
        RetryPolicy::new(1, Duration::from_millis(10)),
    )
    .unwrap();

    let balance = client
        .get_balance("0x1111111111111111111111111111111111111111")
        .await
        .unwrap();
    assert_eq!(balance, ETH);

    // the failover sticks: the next request skips the dead endpoint
    let started = std::time::Instant::now();
    client
        .get_balance("0x1111111111111111111111111111111111111111")
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(200));
}

#[tokio::test]
async fn test_all_endpoints_down_is_exhausted() {
    let chain = ethereum(vec![silent_endpoint().await, silent_endpoint().await]);
    let client = chain_sniper::adapters::connect(
        &chain,
        Duration::from_millis(100),
        RetryPolicy::new(1, Duration::from_millis(10)),
    )
    .unwrap();

    let result = client
        .get_balance("0x1111111111111111111111111111111111111111")
        .await;
    assert!(matches!(result, Err(RpcError::Exhausted { attempts: 2, .. })));
}
