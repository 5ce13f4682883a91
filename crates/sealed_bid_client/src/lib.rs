//! Client for sealed-bid auctions settled through an Arcium MXE.
//!
//! Bids are encrypted against the MXE cluster's x25519 key and queued as
//! `submit_bid` computations; the cluster keeps the running best bid
//! encrypted on-chain until `reveal_winner` publishes the result. The
//! sealed auction ledger program holds escrow and the NFT and is only
//! addressed through instruction builders.

pub mod cipher;
pub mod codec;
pub mod config;
pub mod error;
pub mod instructions;
pub mod orchestrator;
pub mod pda;
pub mod reader;
pub mod retry;
pub mod rpc;
pub mod state;

#[cfg(test)]
mod testing;

pub use cipher::{FieldCipher, RescueCipher};
pub use config::ClientConfig;
pub use error::{BidClientError, LedgerErrorCode, Result};
pub use orchestrator::{
    sol_to_lamports, BidRequest, Context, Progress, RevealOrchestrator, RevealOutcome,
    RevealReport, RevealStatus, SettlementPath, SubmissionOrchestrator, SubmissionOutcome,
    SubmissionStatus,
};
pub use pda::AddressDeriver;
pub use reader::StateReader;
pub use retry::{Clock, RetryPolicy, TokioClock};
pub use rpc::{LedgerClient, RpcLedger};
pub use state::{AuctionBidState, AuctionResult};
