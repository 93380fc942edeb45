//! Scriptable chain client for tests and dry wiring
//!
//! Responses are configured with `with_*` builders (or `set_*` after the
//! client has been shared) and every call is recorded by method name.

use alloy_primitives::Address;
use alloy_sol_types::{SolEvent, SolValue};
use async_trait::async_trait;
use solana_sdk::{hash::Hash, pubkey::Pubkey, system_instruction};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::chain::{
    AccountSnapshot, ChainClient, ChainTransaction, EventBatch, EventQuery, EvmLog, EvmTransaction, RpcError, SignedTx,
    TxPayload, TxStatus, UnsignedTx,
};
use crate::adapters::evm::abi;
use crate::domain::chain::ChainFamily;

/// Gas price handed out by `prepare` on EVM chains
pub const SCRIPTED_GAS_PRICE: u128 = 1_000_000_000;

/// ABI-encoded `uint256[]`, the shape of a router `getAmountsOut` reply
pub fn amounts_out_response(amounts: &[u128]) -> Vec<u8> {
    amounts.iter().map(|a| abi::uint(*a)).collect::<Vec<_>>().abi_encode()
}

/// `event` as emitted by the contract at `address`
pub fn evm_log<E: SolEvent>(address: Address, event: &E) -> EvmLog {
    let log = event.encode_log_data();
    EvmLog {
        address,
        topics: log.topics().to_vec(),
        data: log.data,
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    balances: HashMap<String, u128>,
    default_balance: u128,
    balance_error: Option<RpcError>,
    accounts: HashMap<String, AccountSnapshot>,
    account_error: Option<RpcError>,
    token_account_balances: HashMap<String, u128>,
    holdings: HashMap<(String, String), u128>,
    event_batches: VecDeque<Result<EventBatch, RpcError>>,
    transactions: HashMap<String, ChainTransaction>,
    call_response: Option<Result<Vec<u8>, RpcError>>,
    call_delay: Option<Duration>,
    send_error: Option<RpcError>,
    status: Option<TxStatus>,
    nonces: HashMap<String, u64>,
    sent: Vec<SignedTx>,
    calls: Vec<String>,
    event_queries: Vec<EventQuery>,
}

/// Chain client answering from a script
#[derive(Debug, Clone)]
pub struct ScriptedChainClient {
    chain_id: String,
    family: ChainFamily,
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedChainClient {
    pub fn new(chain_id: &str, family: ChainFamily) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            family,
            state: Arc::new(Mutex::new(ScriptState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record(&self, method: &str) {
        self.state().calls.push(method.to_string());
    }

    /// Balance returned for addresses without an explicit one
    pub fn with_default_balance(self, amount: u128) -> Self {
        self.state().default_balance = amount;
        self
    }

    pub fn with_balance(self, address: &str, amount: u128) -> Self {
        self.set_balance(address, amount);
        self
    }

    pub fn with_account(self, snapshot: AccountSnapshot) -> Self {
        self.state().accounts.insert(snapshot.address.clone(), snapshot);
        self
    }

    /// Every `get_account` call fails with `error`
    pub fn with_account_error(self, error: RpcError) -> Self {
        self.state().account_error = Some(error);
        self
    }

    pub fn with_token_account_balance(self, account: &str, amount: u128) -> Self {
        self.state().token_account_balances.insert(account.to_string(), amount);
        self
    }

    pub fn with_holdings(self, owner: &str, token: &str, amount: u128) -> Self {
        self.set_holdings(owner, token, amount);
        self
    }

    /// Queue a poll result; once the queue drains polls return nothing new
    pub fn with_events(self, batch: Result<EventBatch, RpcError>) -> Self {
        self.state().event_batches.push_back(batch);
        self
    }

    pub fn with_transaction(self, tx: ChainTransaction) -> Self {
        self.state().transactions.insert(tx.id.clone(), tx);
        self
    }

    pub fn with_call_response(self, response: Result<Vec<u8>, RpcError>) -> Self {
        self.set_call_response(response);
        self
    }

    /// `call` answers only after `delay`, like a slow node
    pub fn with_call_delay(self, delay: Duration) -> Self {
        self.state().call_delay = Some(delay);
        self
    }

    pub fn with_send_error(self, error: RpcError) -> Self {
        self.state().send_error = Some(error);
        self
    }

    /// Status reported for every submitted transaction (default `Confirmed`)
    pub fn with_status(self, status: TxStatus) -> Self {
        self.state().status = Some(status);
        self
    }

    pub fn set_balance(&self, address: &str, amount: u128) {
        self.state().balances.insert(address.to_string(), amount);
    }

    pub fn set_balance_error(&self, error: Option<RpcError>) {
        self.state().balance_error = error;
    }

    pub fn set_holdings(&self, owner: &str, token: &str, amount: u128) {
        self.state()
            .holdings
            .insert((owner.to_string(), token.to_string()), amount);
    }

    pub fn set_call_response(&self, response: Result<Vec<u8>, RpcError>) {
        self.state().call_response = Some(response);
    }

    pub fn set_send_error(&self, error: Option<RpcError>) {
        self.state().send_error = error;
    }

    pub fn push_events(&self, batch: Result<EventBatch, RpcError>) {
        self.state().event_batches.push_back(batch);
    }

    pub fn insert_transaction(&self, tx: ChainTransaction) {
        self.state().transactions.insert(tx.id.clone(), tx);
    }

    /// Signed transactions accepted by `send`
    pub fn sent(&self) -> Vec<SignedTx> {
        self.state().sent.clone()
    }

    /// Method names in call order
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Every `poll_events` query, in order
    pub fn event_queries(&self) -> Vec<EventQuery> {
        self.state().event_queries.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state().calls.iter().filter(|c| c.as_str() == method).count()
    }
}

fn solana_key(address: &str) -> Result<Pubkey, RpcError> {
    Pubkey::from_str(address).map_err(|_| RpcError::InvalidAddress(address.to_string()))
}

fn evm_key(address: &str) -> Result<Address, RpcError> {
    crate::adapters::evm::parse_address(address).ok_or_else(|| RpcError::InvalidAddress(address.to_string()))
}

#[async_trait]
impl ChainClient for ScriptedChainClient {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    fn family(&self) -> ChainFamily {
        self.family
    }

    async fn get_balance(&self, address: &str) -> Result<u128, RpcError> {
        self.record("get_balance");
        let state = self.state();
        if let Some(e) = &state.balance_error {
            return Err(e.clone());
        }
        Ok(state.balances.get(address).copied().unwrap_or(state.default_balance))
    }

    async fn get_account(&self, address: &str) -> Result<Option<AccountSnapshot>, RpcError> {
        self.record("get_account");
        let state = self.state();
        if let Some(e) = &state.account_error {
            return Err(e.clone());
        }
        Ok(state.accounts.get(address).cloned())
    }

    async fn get_token_account_balance(&self, token_account: &str) -> Result<u128, RpcError> {
        self.record("get_token_account_balance");
        self.state()
            .token_account_balances
            .get(token_account)
            .copied()
            .ok_or_else(|| RpcError::Rpc {
                code: -32602,
                message: format!("could not find account {}", token_account),
            })
    }

    async fn get_token_holdings(&self, owner: &str, token: &str) -> Result<u128, RpcError> {
        self.record("get_token_holdings");
        Ok(self
            .state()
            .holdings
            .get(&(owner.to_string(), token.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn poll_events(&self, query: &EventQuery) -> Result<EventBatch, RpcError> {
        self.record("poll_events");
        let mut state = self.state();
        state.event_queries.push(query.clone());
        match state.event_batches.pop_front() {
            Some(batch) => batch,
            None => Ok(EventBatch {
                cursor: query.cursor.clone(),
                ..Default::default()
            }),
        }
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<ChainTransaction>, RpcError> {
        self.record("get_transaction");
        Ok(self.state().transactions.get(id).cloned())
    }

    async fn call(&self, _to: &str, _data: &[u8]) -> Result<Vec<u8>, RpcError> {
        self.record("call");
        let delay = self.state().call_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state().call_response.clone().unwrap_or_else(|| {
            Err(RpcError::Rpc {
                code: 3,
                message: "execution reverted".into(),
            })
        })
    }

    async fn prepare(&self, from: &str, payload: TxPayload) -> Result<UnsignedTx, RpcError> {
        self.record("prepare");
        match (self.family, payload) {
            (ChainFamily::Solana, TxPayload::Solana { instructions }) => Ok(UnsignedTx::Solana {
                payer: solana_key(from)?,
                instructions,
                recent_blockhash: Hash::new_unique(),
            }),
            (ChainFamily::Solana, TxPayload::Transfer { to, amount }) => {
                let payer = solana_key(from)?;
                let lamports = u64::try_from(amount).map_err(|_| RpcError::Parse("amount exceeds u64".into()))?;
                Ok(UnsignedTx::Solana {
                    payer,
                    instructions: vec![system_instruction::transfer(&payer, &solana_key(&to)?, lamports)],
                    recent_blockhash: Hash::new_unique(),
                })
            }
            (ChainFamily::Evm, payload) => {
                let (to, value, data, gas_limit) = match payload {
                    TxPayload::Transfer { to, amount } => (to, amount, Vec::new(), 21_000),
                    TxPayload::EvmCall {
                        to,
                        data,
                        value,
                        gas_limit,
                    } => (to, value, data, gas_limit),
                    TxPayload::Solana { .. } => {
                        return Err(RpcError::Unsupported {
                            method: "solana instructions".into(),
                            family: ChainFamily::Evm,
                        })
                    }
                };
                let mut state = self.state();
                let nonce = state.nonces.entry(from.to_lowercase()).or_insert(0);
                let tx = EvmTransaction {
                    nonce: *nonce,
                    gas_price: SCRIPTED_GAS_PRICE,
                    gas_limit,
                    to: evm_key(&to)?,
                    value,
                    data,
                    chain_id: 1,
                };
                *nonce += 1;
                Ok(UnsignedTx::Evm(tx))
            }
            (ChainFamily::Solana, TxPayload::EvmCall { .. }) => Err(RpcError::Unsupported {
                method: "evm call".into(),
                family: ChainFamily::Solana,
            }),
        }
    }

    async fn send(&self, tx: &SignedTx) -> Result<String, RpcError> {
        self.record("send");
        let mut state = self.state();
        if let Some(e) = &state.send_error {
            return Err(e.clone());
        }
        state.sent.push(tx.clone());
        Ok(tx.tx_hash.clone())
    }

    async fn transaction_status(&self, _tx_hash: &str) -> Result<TxStatus, RpcError> {
        self.record("transaction_status");
        Ok(self.state().status.clone().unwrap_or(TxStatus::Confirmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_balances_and_calls() {
        let client = ScriptedChainClient::new("solana", ChainFamily::Solana)
            .with_default_balance(5)
            .with_balance("Funded", 1_000);

        assert_eq!(client.get_balance("Funded").await.unwrap(), 1_000);
        assert_eq!(client.get_balance("Other").await.unwrap(), 5);

        client.set_balance_error(Some(RpcError::RateLimited));
        assert!(client.get_balance("Funded").await.is_err());
        assert_eq!(client.call_count("get_balance"), 3);
    }

    #[tokio::test]
    async fn test_event_queue_drains() {
        let client = ScriptedChainClient::new("solana", ChainFamily::Solana).with_events(Ok(EventBatch {
            events: vec![super::super::chain::EventRef {
                id: "sig1".into(),
                slot: 1,
            }],
            cursor: Some("sig1".into()),
            next_page: None,
        }));
        let query = EventQuery {
            address: "program".into(),
            topics: vec![],
            cursor: Some("sig0".into()),
            before: None,
            limit: 10,
        };

        assert_eq!(client.poll_events(&query).await.unwrap().events.len(), 1);
        let empty = client.poll_events(&query).await.unwrap();
        assert!(empty.events.is_empty());
        assert_eq!(empty.cursor.as_deref(), Some("sig0"));
        assert_eq!(client.event_queries().len(), 2);
    }

    #[tokio::test]
    async fn test_evm_prepare_increments_nonce() {
        let client = ScriptedChainClient::new("ethereum", ChainFamily::Evm);
        let payload = TxPayload::Transfer {
            to: "0x1111111111111111111111111111111111111111".into(),
            amount: 10,
        };

        let first = client.prepare("0xAbc", payload.clone()).await.unwrap();
        let second = client.prepare("0xabc", payload).await.unwrap();
        match (first, second) {
            (UnsignedTx::Evm(a), UnsignedTx::Evm(b)) => {
                assert_eq!(a.nonce, 0);
                assert_eq!(b.nonce, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_amounts_out_response_layout() {
        let out = amounts_out_response(&[7, 9]);
        // offset, length, two amounts
        assert_eq!(out.len(), 32 * 4);
        assert_eq!(out[31], 32);
        assert_eq!(out[63], 2);
        assert_eq!(out[127], 9);
    }
}
