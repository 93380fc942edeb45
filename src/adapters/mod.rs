//! Adapters Layer - External System Implementations
//!
//! - Solana / EVM: JSON-RPC clients, signing, instruction and ABI encoding
//! - DEX: Raydium, Orca, Serum and Uniswap V2 venue adapters
//! - RPC: endpoint failover and retry
//! - Keystore / Ledger: encrypted wallet files and the JSON-lines trade ledger
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod dex;
pub mod evm;
pub mod keystore;
pub mod ledger;
pub mod rpc;
pub mod solana;

pub use cli::CliApp;
pub use evm::EvmRpcClient;
pub use keystore::{KeyCipher, Keystore};
pub use ledger::{Ledger, LedgerState};
pub use rpc::{RetryPolicy, RpcPool};
pub use solana::SolanaRpcClient;

use std::sync::Arc;
use std::time::Duration;

use crate::domain::chain::{Chain, ChainFamily};
use crate::ports::chain::{ChainClient, RpcError};

/// JSON-RPC client for a chain over its configured endpoint list
pub fn connect(chain: &Chain, timeout: Duration, retry: RetryPolicy) -> Result<Arc<dyn ChainClient>, RpcError> {
    let pool = RpcPool::new(chain.id.clone(), chain.rpc_endpoints.clone(), timeout, retry)?;
    Ok(match chain.family {
        ChainFamily::Solana => Arc::new(SolanaRpcClient::new(chain.id.clone(), pool)),
        ChainFamily::Evm => {
            let evm_chain_id = chain.evm_chain_id.ok_or_else(|| {
                RpcError::Transport(format!("{} has no evm_chain_id", chain.id))
            })?;
            Arc::new(EvmRpcClient::new(chain.id.clone(), evm_chain_id, pool))
        }
    })
}
