//! Records read back from the ledger
//!
//! Every decoder validates the Anchor discriminator and the fixed layout
//! before reading a field; a mismatch is a fatal `Decode` error, never a
//! silently-defaulted value.

pub mod auction;
pub mod auction_result;
pub mod bid_state;
pub mod mxe;

pub use auction::Auction;
pub use auction_result::AuctionResult;
pub use bid_state::AuctionBidState;
pub use mxe::{decode_mxe_x25519_key, MXE_ACCOUNT_DISCRIMINATOR, MXE_ACCOUNT_SEED};

pub fn decode_auction_bid_state(data: &[u8]) -> crate::error::Result<AuctionBidState> {
    AuctionBidState::decode(data)
}

pub fn decode_auction_result(data: &[u8]) -> crate::error::Result<AuctionResult> {
    AuctionResult::decode(data)
}
