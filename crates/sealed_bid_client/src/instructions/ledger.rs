//! Sealed auction ledger instructions
//!
//! Escrow, settlement and NFT custody stay in the ledger program; these
//! builders only address it. Token accounts of the winner and the seller are
//! their associated token accounts for the auctioned mint.

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::solana_program::sysvar;
use anchor_spl::associated_token::get_associated_token_address;
use solana_sha256_hasher::hashv;

use super::ledger_discriminators;
use crate::codec::{concat_fixed, encode_u64_le};
use crate::pda::AddressDeriver;

/// Attestation over a reveal result checked by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArciumProof {
    pub message_hash: [u8; 32],
    pub signature: [u8; 64],
}

impl ArciumProof {
    pub const LEN: usize = 32 + 64;

    /// sha256(auction || winner || winning_amount_le)
    pub fn message_hash(auction: &Pubkey, winner: &Pubkey, winning_amount: u64) -> [u8; 32] {
        hashv(&[
            auction.as_ref(),
            winner.as_ref(),
            &winning_amount.to_le_bytes(),
        ])
        .to_bytes()
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[..32].copy_from_slice(&self.message_hash);
        out[32..].copy_from_slice(&self.signature);
        out
    }
}

/// Accounts of an auction whose NFT sits in the ledger's escrow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleAccounts {
    pub seller: Pubkey,
    pub auction: Pubkey,
    pub nft_mint: Pubkey,
    /// Token account holding the NFT, owned by the auction PDA
    pub nft_escrow_account: Pubkey,
}

/// Lock `max_locked_amount` lamports into the bidder's escrow.
pub fn lock_bid_funds(
    deriver: &AddressDeriver,
    bidder: &Pubkey,
    auction: &Pubkey,
    max_locked_amount: u64,
) -> Instruction {
    Instruction {
        program_id: deriver.ledger_program,
        accounts: vec![
            AccountMeta::new(*bidder, true),
            AccountMeta::new(*auction, false),
            AccountMeta::new(deriver.bid_escrow(auction, bidder), false),
            AccountMeta::new_readonly(anchor_lang::system_program::ID, false),
        ],
        data: concat_fixed(&[
            &ledger_discriminators::LOCK_BID_FUNDS,
            &encode_u64_le(max_locked_amount),
        ]),
    }
}

/// Pay the seller from the winner's escrow and transfer the NFT.
pub fn settle_auction(
    deriver: &AddressDeriver,
    accounts: &SettleAccounts,
    winner: &Pubkey,
    winning_amount: u64,
    proof: &ArciumProof,
) -> Instruction {
    Instruction {
        program_id: deriver.ledger_program,
        accounts: vec![
            AccountMeta::new(accounts.seller, false),
            AccountMeta::new(*winner, false),
            AccountMeta::new(accounts.auction, false),
            AccountMeta::new(deriver.bid_escrow(&accounts.auction, winner), false),
            AccountMeta::new(accounts.nft_escrow_account, false),
            AccountMeta::new(get_associated_token_address(winner, &accounts.nft_mint), false),
            AccountMeta::new_readonly(accounts.nft_mint, false),
            AccountMeta::new_readonly(anchor_spl::token::ID, false),
            AccountMeta::new_readonly(anchor_lang::system_program::ID, false),
            AccountMeta::new_readonly(sysvar::instructions::ID, false),
        ],
        data: concat_fixed(&[
            &ledger_discriminators::SETTLE_AUCTION,
            winner.as_ref(),
            &encode_u64_le(winning_amount),
            &proof.encode(),
        ]),
    }
}

/// Return the NFT to the seller when the reveal found no valid winner.
/// Permissionless: `payer` cranks it.
pub fn finalize_no_winner(
    deriver: &AddressDeriver,
    payer: &Pubkey,
    accounts: &SettleAccounts,
    proof: &ArciumProof,
) -> Instruction {
    Instruction {
        program_id: deriver.ledger_program,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(accounts.seller, false),
            AccountMeta::new(accounts.auction, false),
            AccountMeta::new(accounts.nft_escrow_account, false),
            AccountMeta::new(
                get_associated_token_address(&accounts.seller, &accounts.nft_mint),
                false,
            ),
            AccountMeta::new_readonly(anchor_spl::token::ID, false),
            AccountMeta::new_readonly(sysvar::instructions::ID, false),
        ],
        data: concat_fixed(&[&ledger_discriminators::FINALIZE_NO_WINNER, &proof.encode()]),
    }
}

/// Close a losing bidder's escrow back to them. Anyone can crank it.
pub fn refund_loser(deriver: &AddressDeriver, bidder: &Pubkey, auction: &Pubkey) -> Instruction {
    Instruction {
        program_id: deriver.ledger_program,
        accounts: vec![
            AccountMeta::new(*bidder, false),
            AccountMeta::new(deriver.bid_escrow(auction, bidder), false),
            AccountMeta::new_readonly(*auction, false),
            AccountMeta::new_readonly(anchor_lang::system_program::ID, false),
        ],
        data: ledger_discriminators::REFUND_LOSER.to_vec(),
    }
}

/// Seller takes the NFT back from an auction that ended with zero bids.
pub fn reclaim_unsold(deriver: &AddressDeriver, accounts: &SettleAccounts) -> Instruction {
    Instruction {
        program_id: deriver.ledger_program,
        accounts: vec![
            AccountMeta::new(accounts.seller, true),
            AccountMeta::new(accounts.auction, false),
            AccountMeta::new(accounts.nft_escrow_account, false),
            AccountMeta::new(
                get_associated_token_address(&accounts.seller, &accounts.nft_mint),
                false,
            ),
            AccountMeta::new_readonly(anchor_spl::token::ID, false),
        ],
        data: ledger_discriminators::RECLAIM_UNSOLD.to_vec(),
    }
}
