use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};

use super::{computation_account_metas, computation_header, mxe_discriminators};
use crate::cipher::CipherBlock;
use crate::codec::IDENTITY_CHUNKS;
use crate::pda::ComputationAccounts;
use crate::state::AuctionBidState;

/// Reveal request: the circuit decrypts the carried best bid and winner
/// and writes them in plaintext to the result record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealWinnerArgs {
    pub computation_offset: u64,
    pub ephemeral_public_key: [u8; 32],
    pub nonce: u128,
    pub max_bid: CipherBlock,
    pub winner: [CipherBlock; IDENTITY_CHUNKS],
}

impl RevealWinnerArgs {
    pub fn from_state(
        computation_offset: u64,
        ephemeral_public_key: [u8; 32],
        nonce: u128,
        state: &AuctionBidState,
    ) -> Self {
        Self {
            computation_offset,
            ephemeral_public_key,
            nonce,
            max_bid: state.encrypted_max_bid,
            winner: state.encrypted_winner,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = computation_header(
            &mxe_discriminators::REVEAL_WINNER,
            self.computation_offset,
            &self.ephemeral_public_key,
            self.nonce,
        );
        data.extend_from_slice(&self.max_bid);
        for chunk in &self.winner {
            data.extend_from_slice(chunk);
        }
        data
    }
}

pub fn reveal_winner(
    mxe_program: &Pubkey,
    payer: &Pubkey,
    accounts: &ComputationAccounts,
    bid_state: &Pubkey,
    auction_result: &Pubkey,
    args: &RevealWinnerArgs,
) -> Instruction {
    let mut metas = computation_account_metas(payer, accounts);
    metas.push(AccountMeta::new(*bid_state, false));
    metas.push(AccountMeta::new(*auction_result, false));

    Instruction {
        program_id: *mxe_program,
        accounts: metas,
        data: args.encode(),
    }
}
