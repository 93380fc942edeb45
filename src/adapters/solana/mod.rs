//! Solana adapters: JSON-RPC client, instruction helpers and key handling

pub mod instructions;
pub mod rpc;
pub mod wallet;

pub use rpc::SolanaRpcClient;
