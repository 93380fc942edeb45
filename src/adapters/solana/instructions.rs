//! Shared Solana instruction helpers
//!
//! Associated token accounts and the WSOL wrap/unwrap envelope every
//! native <-> token swap needs on Solana AMMs.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
    system_instruction, system_program,
};
use std::str::FromStr;

use crate::ports::dex::{DexError, SwapSide};

/// Associated Token Account program
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Token-2022 program
pub const TOKEN_2022_PROGRAM_ID: Pubkey = pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// Parse a base58 address
pub fn parse_pubkey(address: &str) -> Result<Pubkey, DexError> {
    Pubkey::from_str(address).map_err(|_| DexError::InvalidAddress(address.to_string()))
}

/// Whether `owner` is one of the SPL token programs
pub fn is_token_program(owner: &str) -> bool {
    owner == spl_token::id().to_string() || owner == TOKEN_2022_PROGRAM_ID.to_string()
}

/// Associated token account of `owner` for `mint` under the classic token program
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), spl_token::id().as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}

/// `CreateIdempotent` on the associated token account program
pub fn create_ata_idempotent(payer: &Pubkey, owner: &Pubkey, mint: &Pubkey) -> Instruction {
    let ata = associated_token_address(owner, mint);
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(ata, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data: vec![1],
    }
}

/// Wrap the swap instructions so native SOL goes in / comes out
///
/// Buy:  create WSOL ATA, fund it, sync, create token ATA, swap, close WSOL.
/// Sell: create WSOL ATA, swap, close WSOL (unwraps proceeds).
pub fn native_swap_envelope(
    owner: &Pubkey,
    token_mint: &Pubkey,
    side: SwapSide,
    amount_in: u64,
    swap: Vec<Instruction>,
) -> Result<Vec<Instruction>, DexError> {
    let wsol = spl_token::native_mint::id();
    let wsol_ata = associated_token_address(owner, &wsol);

    let mut instructions = vec![create_ata_idempotent(owner, owner, &wsol)];

    if side == SwapSide::Buy {
        instructions.push(system_instruction::transfer(owner, &wsol_ata, amount_in));
        instructions.push(
            spl_token::instruction::sync_native(&spl_token::id(), &wsol_ata)
                .map_err(|e| DexError::Encoding(e.to_string()))?,
        );
        instructions.push(create_ata_idempotent(owner, owner, token_mint));
    }

    instructions.extend(swap);
    instructions.push(
        spl_token::instruction::close_account(&spl_token::id(), &wsol_ata, owner, owner, &[])
            .map_err(|e| DexError::Encoding(e.to_string()))?,
    );

    Ok(instructions)
}

/// Source and destination token accounts of `owner` for a swap
pub fn user_token_accounts(owner: &Pubkey, token_mint: &Pubkey, side: SwapSide) -> (Pubkey, Pubkey) {
    let wsol_ata = associated_token_address(owner, &spl_token::native_mint::id());
    let token_ata = associated_token_address(owner, token_mint);
    match side {
        SwapSide::Buy => (wsol_ata, token_ata),
        SwapSide::Sell => (token_ata, wsol_ata),
    }
}

/// Amounts on Solana are u64 on the wire
pub fn to_u64(amount: u128) -> Result<u64, DexError> {
    u64::try_from(amount).map_err(|_| DexError::Encoding(format!("amount {} exceeds u64", amount)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_envelope_wraps_and_unwraps() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let swap = Instruction::new_with_bytes(Pubkey::new_unique(), &[9], vec![]);

        let ixs = native_swap_envelope(&owner, &mint, SwapSide::Buy, 1_000, vec![swap.clone()]).unwrap();
        assert_eq!(ixs.len(), 6);
        assert_eq!(ixs[0].program_id, ASSOCIATED_TOKEN_PROGRAM_ID);
        assert_eq!(ixs[1].program_id, system_program::id());
        assert_eq!(ixs[4], swap);
        assert_eq!(ixs[5].program_id, spl_token::id());
    }

    #[test]
    fn test_sell_envelope_skips_funding() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let swap = Instruction::new_with_bytes(Pubkey::new_unique(), &[9], vec![]);

        let ixs = native_swap_envelope(&owner, &mint, SwapSide::Sell, 1_000, vec![swap.clone()]).unwrap();
        assert_eq!(ixs.len(), 3);
        assert_eq!(ixs[1], swap);
    }

    #[test]
    fn test_user_accounts_swap_direction() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let (src_buy, dst_buy) = user_token_accounts(&owner, &mint, SwapSide::Buy);
        let (src_sell, dst_sell) = user_token_accounts(&owner, &mint, SwapSide::Sell);
        assert_eq!(src_buy, dst_sell);
        assert_eq!(dst_buy, src_sell);
    }

    #[test]
    fn test_token_program_detection() {
        assert!(is_token_program("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"));
        assert!(is_token_program("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb"));
        assert!(!is_token_program("11111111111111111111111111111111"));
    }

    #[test]
    fn test_amount_bounds() {
        assert_eq!(to_u64(5).unwrap(), 5);
        assert!(to_u64(u64::MAX as u128 + 1).is_err());
    }
}
