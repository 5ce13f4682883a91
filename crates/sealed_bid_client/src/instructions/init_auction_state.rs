use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};

use super::mxe_discriminators;
use crate::codec::concat_fixed;

/// Create the auction's bid state record. Fails with "already in use" when
/// the record exists, which callers treat as success.
pub fn init_auction_state(
    mxe_program: &Pubkey,
    payer: &Pubkey,
    bid_state: &Pubkey,
    auction: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *mxe_program,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(*bid_state, false),
            AccountMeta::new_readonly(anchor_lang::system_program::ID, false),
        ],
        data: concat_fixed(&[&mxe_discriminators::INIT_AUCTION_STATE, auction.as_ref()]),
    }
}
