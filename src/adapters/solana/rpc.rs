//! Solana JSON-RPC client
//!
//! Implements `ChainClient` over an `RpcPool`. Responses decode into the
//! `solana-client` / `solana-transaction-status` wire types and are then
//! normalized (legacy and v0 transactions, inner instructions, token balances).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use solana_account_decoder::{parse_token::UiTokenAmount, UiAccount, UiAccountData, UiAccountEncoding};
use solana_client::rpc_response::{
    Response, RpcBlockhash, RpcConfirmedTransactionStatusWithSignature,
};
use solana_sdk::{hash::Hash, pubkey::Pubkey, system_instruction};
use solana_transaction_status::{
    option_serializer::OptionSerializer, EncodedConfirmedTransactionWithStatusMeta,
    EncodedTransaction, TransactionConfirmationStatus, TransactionStatus, UiCompiledInstruction,
    UiInstruction, UiMessage, UiTransactionTokenBalance,
};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::instructions::associated_token_address;
use crate::adapters::rpc::RpcPool;
use crate::domain::chain::ChainFamily;
use crate::ports::chain::{
    AccountSnapshot, ChainClient, ChainTransaction, EventBatch, EventQuery, EventRef,
    RawInstruction, RpcError, SignedTx, TokenDelta, TxPayload, TxStatus, UnsignedTx,
};

/// Commitment used for reads and confirmations
pub const DEFAULT_COMMITMENT: &str = "confirmed";

/// Solana node error for a token account that does not exist
const INVALID_PARAMS: i64 = -32602;

pub struct SolanaRpcClient {
    chain_id: String,
    pool: RpcPool,
}

impl SolanaRpcClient {
    pub fn new(chain_id: impl Into<String>, pool: RpcPool) -> Self {
        Self {
            chain_id: chain_id.into(),
            pool,
        }
    }

    fn pubkey(address: &str) -> Result<Pubkey, RpcError> {
        Pubkey::from_str(address).map_err(|_| RpcError::InvalidAddress(address.to_string()))
    }

    /// One request through the pool, decoded into `T`
    async fn fetch<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let result = self.pool.request(method, params).await?;
        serde_json::from_value(result).map_err(|e| RpcError::Parse(format!("{}: {}", method, e)))
    }

    async fn latest_blockhash(&self) -> Result<Hash, RpcError> {
        let response: Response<RpcBlockhash> = self
            .fetch("getLatestBlockhash", json!([{ "commitment": DEFAULT_COMMITMENT }]))
            .await?;
        Hash::from_str(&response.value.blockhash)
            .map_err(|e| RpcError::Parse(format!("blockhash: {}", e)))
    }
}

#[async_trait]
impl ChainClient for SolanaRpcClient {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    async fn get_balance(&self, address: &str) -> Result<u128, RpcError> {
        Self::pubkey(address)?;
        let response: Response<u64> = self
            .fetch("getBalance", json!([address, { "commitment": DEFAULT_COMMITMENT }]))
            .await?;
        Ok(u128::from(response.value))
    }

    async fn get_account(&self, address: &str) -> Result<Option<AccountSnapshot>, RpcError> {
        Self::pubkey(address)?;
        let response: Response<Option<UiAccount>> = self
            .fetch(
                "getAccountInfo",
                json!([address, { "encoding": "base64", "commitment": DEFAULT_COMMITMENT }]),
            )
            .await?;
        response
            .value
            .map(|account| account_snapshot(address, account))
            .transpose()
    }

    async fn get_token_account_balance(&self, token_account: &str) -> Result<u128, RpcError> {
        Self::pubkey(token_account)?;
        let response: Response<UiTokenAmount> = self
            .fetch(
                "getTokenAccountBalance",
                json!([token_account, { "commitment": DEFAULT_COMMITMENT }]),
            )
            .await?;
        response
            .value
            .amount
            .parse::<u128>()
            .map_err(|e| RpcError::Parse(format!("token amount: {}", e)))
    }

    async fn get_token_holdings(&self, owner: &str, token: &str) -> Result<u128, RpcError> {
        let ata = associated_token_address(&Self::pubkey(owner)?, &Self::pubkey(token)?);
        match self.get_token_account_balance(&ata.to_string()).await {
            Err(RpcError::Rpc { code, .. }) if code == INVALID_PARAMS => Ok(0),
            other => other,
        }
    }

    async fn poll_events(&self, query: &EventQuery) -> Result<EventBatch, RpcError> {
        let mut config = json!({ "limit": query.limit, "commitment": DEFAULT_COMMITMENT });
        if let Some(cursor) = &query.cursor {
            config["until"] = json!(cursor);
        }
        if let Some(before) = &query.before {
            config["before"] = json!(before);
        }

        let entries: Vec<RpcConfirmedTransactionStatusWithSignature> = self
            .fetch("getSignaturesForAddress", json!([query.address, config]))
            .await?;

        // newest first; a full page means older signatures remain unread
        let newest = entries.first().map(|e| e.signature.clone());
        let next_page = match entries.last() {
            Some(oldest) if query.limit > 0 && entries.len() >= query.limit => {
                Some(oldest.signature.clone())
            }
            _ => None,
        };

        let events = entries
            .into_iter()
            .filter(|e| e.err.is_none())
            .map(|e| EventRef {
                id: e.signature,
                slot: e.slot,
            })
            .collect();

        Ok(EventBatch {
            events,
            cursor: newest.or_else(|| query.cursor.clone()),
            next_page,
        })
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<ChainTransaction>, RpcError> {
        let result: Option<EncodedConfirmedTransactionWithStatusMeta> = self
            .fetch(
                "getTransaction",
                json!([id, {
                    "encoding": "json",
                    "maxSupportedTransactionVersion": 0,
                    "commitment": DEFAULT_COMMITMENT
                }]),
            )
            .await?;

        result.map(|tx| chain_transaction(id, tx)).transpose()
    }

    async fn call(&self, _to: &str, _data: &[u8]) -> Result<Vec<u8>, RpcError> {
        Err(RpcError::Unsupported {
            method: "eth_call".to_string(),
            family: ChainFamily::Solana,
        })
    }

    async fn prepare(&self, from: &str, payload: TxPayload) -> Result<UnsignedTx, RpcError> {
        let payer = Self::pubkey(from)?;
        let instructions = match payload {
            TxPayload::Transfer { to, amount } => {
                let lamports = u64::try_from(amount)
                    .map_err(|_| RpcError::Parse(format!("transfer of {} lamports", amount)))?;
                vec![system_instruction::transfer(&payer, &Self::pubkey(&to)?, lamports)]
            }
            TxPayload::Solana { instructions } => instructions,
            TxPayload::EvmCall { .. } => {
                return Err(RpcError::Unsupported {
                    method: "contract call".to_string(),
                    family: ChainFamily::Solana,
                })
            }
        };

        Ok(UnsignedTx::Solana {
            payer,
            instructions,
            recent_blockhash: self.latest_blockhash().await?,
        })
    }

    async fn send(&self, tx: &SignedTx) -> Result<String, RpcError> {
        let encoded = BASE64.encode(&tx.raw);
        self.fetch(
            "sendTransaction",
            json!([encoded, {
                "encoding": "base64",
                "preflightCommitment": DEFAULT_COMMITMENT,
                "maxRetries": 3
            }]),
        )
        .await
    }

    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, RpcError> {
        let response: Response<Vec<Option<TransactionStatus>>> = self
            .fetch(
                "getSignatureStatuses",
                json!([[tx_hash], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(signature_status(response.value.into_iter().next().flatten()))
    }
}

fn present<T>(value: OptionSerializer<T>) -> Option<T> {
    match value {
        OptionSerializer::Some(v) => Some(v),
        _ => None,
    }
}

/// `getAccountInfo` value into a snapshot
pub fn account_snapshot(address: &str, account: UiAccount) -> Result<AccountSnapshot, RpcError> {
    let data = match &account.data {
        UiAccountData::Binary(encoded, UiAccountEncoding::Base64) => BASE64
            .decode(encoded)
            .map_err(|e| RpcError::Parse(format!("account data: {}", e)))?,
        UiAccountData::Binary(encoded, UiAccountEncoding::Base58)
        | UiAccountData::LegacyBinary(encoded) => bs58::decode(encoded)
            .into_vec()
            .map_err(|e| RpcError::Parse(format!("account data: {}", e)))?,
        other => {
            return Err(RpcError::Parse(format!(
                "account data: unsupported encoding {:?}",
                other
            )))
        }
    };

    Ok(AccountSnapshot {
        address: address.to_string(),
        balance: u128::from(account.lamports),
        owner: Some(account.owner),
        executable: account.executable,
        data,
    })
}

/// One entry of `getSignatureStatuses`; `None` means the node has not seen it
pub fn signature_status(status: Option<TransactionStatus>) -> TxStatus {
    let Some(status) = status else {
        return TxStatus::Pending;
    };
    if let Some(err) = status.err {
        return TxStatus::Failed(err.to_string());
    }
    match status.confirmation_status {
        Some(TransactionConfirmationStatus::Confirmed)
        | Some(TransactionConfirmationStatus::Finalized) => TxStatus::Confirmed,
        Some(TransactionConfirmationStatus::Processed) => TxStatus::Pending,
        // older nodes omit confirmationStatus; null confirmations means rooted
        None if status.confirmations.is_none() => TxStatus::Confirmed,
        None => TxStatus::Pending,
    }
}

fn raw_instruction(keys: &[String], ix: &UiCompiledInstruction) -> Option<RawInstruction> {
    let accounts = ix
        .accounts
        .iter()
        .filter_map(|a| keys.get(*a as usize).cloned())
        .collect();
    let data = bs58::decode(&ix.data).into_vec().ok()?;

    Some(RawInstruction {
        program_id: keys.get(ix.program_id_index as usize)?.clone(),
        accounts,
        data,
    })
}

type TokenAmount = (String, Option<String>, u8, u128);

fn token_amounts(
    keys: &[String],
    balances: OptionSerializer<Vec<UiTransactionTokenBalance>>,
) -> BTreeMap<usize, TokenAmount> {
    let mut out = BTreeMap::new();
    for entry in present(balances).into_iter().flatten() {
        let idx = entry.account_index as usize;
        if keys.get(idx).is_none() {
            continue;
        }
        let Ok(amount) = entry.ui_token_amount.amount.parse::<u128>() else {
            continue;
        };
        out.insert(
            idx,
            (
                entry.mint,
                present(entry.owner),
                entry.ui_token_amount.decimals,
                amount,
            ),
        );
    }
    out
}

/// `getTransaction` (json encoding) into a chain-neutral transaction
pub fn chain_transaction(
    id: &str,
    confirmed: EncodedConfirmedTransactionWithStatusMeta,
) -> Result<ChainTransaction, RpcError> {
    let message = match confirmed.transaction.transaction {
        EncodedTransaction::Json(tx) => match tx.message {
            UiMessage::Raw(raw) => raw,
            UiMessage::Parsed(_) => {
                return Err(RpcError::Parse("getTransaction: expected raw message".into()))
            }
        },
        _ => return Err(RpcError::Parse("getTransaction: expected json encoding".into())),
    };
    let meta = confirmed.transaction.meta;

    // static keys, then v0 lookup-table keys (writable before readonly)
    let mut keys = message.account_keys;
    if let Some(loaded) = meta.as_ref().and_then(|m| present(m.loaded_addresses.clone())) {
        keys.extend(loaded.writable);
        keys.extend(loaded.readonly);
    }

    let mut instructions: Vec<RawInstruction> = message
        .instructions
        .iter()
        .filter_map(|ix| raw_instruction(&keys, ix))
        .collect();

    let Some(meta) = meta else {
        return Ok(ChainTransaction {
            id: id.to_string(),
            block_time: confirmed.block_time,
            failed: false,
            signer: keys.first().cloned(),
            instructions,
            log_messages: Vec::new(),
            token_deltas: Vec::new(),
            evm_logs: Vec::new(),
        });
    };

    for group in present(meta.inner_instructions).into_iter().flatten() {
        instructions.extend(group.instructions.iter().filter_map(|ix| match ix {
            UiInstruction::Compiled(compiled) => raw_instruction(&keys, compiled),
            UiInstruction::Parsed(_) => None,
        }));
    }

    let pre = token_amounts(&keys, meta.pre_token_balances);
    let post = token_amounts(&keys, meta.post_token_balances);
    let mut indices: Vec<usize> = pre.keys().chain(post.keys()).copied().collect();
    indices.sort_unstable();
    indices.dedup();

    let token_deltas = indices
        .into_iter()
        .filter_map(|idx| {
            let (mint, owner, decimals, _) = post.get(&idx).or_else(|| pre.get(&idx))?.clone();
            Some(TokenDelta {
                account: keys[idx].clone(),
                mint,
                owner,
                decimals,
                pre: pre.get(&idx).map_or(0, |p| p.3),
                post: post.get(&idx).map_or(0, |p| p.3),
            })
        })
        .collect();

    Ok(ChainTransaction {
        id: id.to_string(),
        block_time: confirmed.block_time,
        failed: meta.err.is_some(),
        signer: keys.first().cloned(),
        instructions,
        log_messages: present(meta.log_messages).unwrap_or_default(),
        token_deltas,
        evm_logs: Vec::new(),
    })
}
