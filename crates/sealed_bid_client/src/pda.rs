//! Address Deriver
//!
//! Deterministic program-derived addresses for every account the
//! orchestrators touch. Seeds are fixed byte strings agreed with the remote
//! programs; multi-byte seed components are little-endian.

use anchor_lang::prelude::Pubkey;

use crate::codec::comp_def_offset;
use crate::config::ClientConfig;
use crate::state::{Auction, AuctionBidState, AuctionResult, MXE_ACCOUNT_SEED};

pub const SIGN_PDA_SEED: &[u8] = b"ArciumSignerAccount";
pub const MEMPOOL_SEED: &[u8] = b"Mempool";
pub const EXECPOOL_SEED: &[u8] = b"Execpool";
pub const COMPUTATION_SEED: &[u8] = b"ComputationAccount";
pub const COMP_DEF_SEED: &[u8] = b"ComputationDefinitionAccount";
pub const CLUSTER_SEED: &[u8] = b"Cluster";
pub const FEE_POOL_SEED: &[u8] = b"FeePool";
pub const CLOCK_SEED: &[u8] = b"ClockAccount";
pub const BID_ESCROW_SEED: &[u8] = b"bid_escrow";

/// Computation definitions registered by the MXE program
pub const SUBMIT_BID_CIRCUIT: &str = "submit_bid";
pub const REVEAL_WINNER_CIRCUIT: &str = "reveal_winner";

/// Derives addresses under the three programs of one deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressDeriver {
    pub mxe_program: Pubkey,
    pub arcium_program: Pubkey,
    pub ledger_program: Pubkey,
    pub cluster_offset: u32,
}

impl AddressDeriver {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            mxe_program: config.mxe_program_id,
            arcium_program: config.arcium_program_id,
            ledger_program: config.ledger_program_id,
            cluster_offset: config.cluster_offset,
        }
    }

    // === MXE program ===

    pub fn bid_state(&self, auction: &Pubkey) -> Pubkey {
        self.mxe(&[AuctionBidState::SEED, auction.as_ref()])
    }

    pub fn auction_result(&self, auction: &Pubkey) -> Pubkey {
        self.mxe(&[AuctionResult::SEED, auction.as_ref()])
    }

    pub fn sign_pda(&self) -> Pubkey {
        self.mxe(&[SIGN_PDA_SEED])
    }

    // === Arcium program ===

    pub fn mxe_account(&self) -> Pubkey {
        self.arcium(&[MXE_ACCOUNT_SEED, self.mxe_program.as_ref()])
    }

    pub fn mempool(&self) -> Pubkey {
        self.arcium(&[MEMPOOL_SEED, &self.cluster_offset.to_le_bytes()])
    }

    pub fn executing_pool(&self) -> Pubkey {
        self.arcium(&[EXECPOOL_SEED, &self.cluster_offset.to_le_bytes()])
    }

    pub fn computation(&self, computation_offset: u64) -> Pubkey {
        self.arcium(&[
            COMPUTATION_SEED,
            &self.cluster_offset.to_le_bytes(),
            &computation_offset.to_le_bytes(),
        ])
    }

    pub fn comp_def(&self, circuit: &str) -> Pubkey {
        self.arcium(&[
            COMP_DEF_SEED,
            self.mxe_program.as_ref(),
            &comp_def_offset(circuit).to_le_bytes(),
        ])
    }

    pub fn cluster(&self) -> Pubkey {
        self.arcium(&[CLUSTER_SEED, &self.cluster_offset.to_le_bytes()])
    }

    pub fn fee_pool(&self) -> Pubkey {
        self.arcium(&[FEE_POOL_SEED])
    }

    pub fn clock(&self) -> Pubkey {
        self.arcium(&[CLOCK_SEED])
    }

    // === Ledger program ===

    /// Ledger auction PDA; its address is the auction id used everywhere else.
    pub fn auction(&self, nft_mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[Auction::SEED, nft_mint.as_ref()], &self.ledger_program).0
    }

    pub fn bid_escrow(&self, auction: &Pubkey, bidder: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[BID_ESCROW_SEED, auction.as_ref(), bidder.as_ref()],
            &self.ledger_program,
        )
        .0
    }

    /// Every Arcium account one queued computation needs.
    pub fn computation_accounts(&self, circuit: &str, computation_offset: u64) -> ComputationAccounts {
        ComputationAccounts {
            sign_pda: self.sign_pda(),
            mxe_account: self.mxe_account(),
            mempool: self.mempool(),
            executing_pool: self.executing_pool(),
            computation: self.computation(computation_offset),
            comp_def: self.comp_def(circuit),
            cluster: self.cluster(),
            fee_pool: self.fee_pool(),
            clock: self.clock(),
            arcium_program: self.arcium_program,
        }
    }

    fn mxe(&self, seeds: &[&[u8]]) -> Pubkey {
        Pubkey::find_program_address(seeds, &self.mxe_program).0
    }

    fn arcium(&self, seeds: &[&[u8]]) -> Pubkey {
        Pubkey::find_program_address(seeds, &self.arcium_program).0
    }
}

/// Arcium accounts shared by `submit_bid` and `reveal_winner`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputationAccounts {
    pub sign_pda: Pubkey,
    pub mxe_account: Pubkey,
    pub mempool: Pubkey,
    pub executing_pool: Pubkey,
    pub computation: Pubkey,
    pub comp_def: Pubkey,
    pub cluster: Pubkey,
    pub fee_pool: Pubkey,
    pub clock: Pubkey,
    pub arcium_program: Pubkey,
}
