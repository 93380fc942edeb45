//! EVM adapters: JSON-RPC client, contract interfaces and legacy
//! transaction signing

pub mod abi;
pub mod client;
pub mod tx;

pub use client::EvmRpcClient;

use alloy_primitives::Address;
use std::str::FromStr;

/// Parse a hex address in any letter case
pub fn parse_address(s: &str) -> Option<Address> {
    Address::from_str(s.trim()).ok()
}

/// Case-insensitive address comparison
pub fn same_address(a: &str, b: &str) -> bool {
    match (parse_address(a), parse_address(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
