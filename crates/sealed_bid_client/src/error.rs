//! Client error taxonomy
//!
//! Five classes of failure reach callers:
//! - transient (`MxeKeyUnavailable`, `Rpc`): safe to retry a read-only step
//! - idempotent duplicates: detected by `is_duplicate_submission` and folded
//!   into success by the orchestrators, never surfaced
//! - business-rule rejections (`Rejected`, `LockBelowBid`): surfaced verbatim
//! - decode/format (`Decode`): protocol mismatch, abort loudly
//! - timeouts: not errors at all, see `SubmissionOutcome::StillProcessing`
//!   and `RevealOutcome::StillProcessing`
//!
//! Anything that fails after a transaction was broadcast is wrapped in
//! `AfterBroadcast` (or reported as `Unconfirmed`) so the caller keeps the
//! signature and computation offset and never re-sends blindly.

use anchor_lang::prelude::Pubkey;
use solana_sdk::signature::Signature;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BidClientError>;

#[derive(Debug, Error)]
pub enum BidClientError {
    #[error(
        "MXE public key for program {program} is not available (key generation not complete); \
         wait for the cluster to finish keygen and retry"
    )]
    MxeKeyUnavailable { program: Pubkey },

    #[error("ledger rejected the transaction: {message}")]
    Rejected {
        message: String,
        code: Option<LedgerErrorCode>,
    },

    #[error("{record} account data does not match the expected layout: {reason}")]
    Decode { record: &'static str, reason: String },

    #[error("nonce already used with this shared secret")]
    NonceReuse,

    #[error("field cipher misbehaved: {0}")]
    Cipher(String),

    #[error("auction {auction} is already revealed; read the result instead of re-submitting")]
    AlreadyRevealed { auction: Pubkey },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("lock amount {lock} lamports is below the bid amount {bid} lamports")]
    LockBelowBid { lock: u64, bid: u64 },

    #[error("failed to sign transaction: {0}")]
    Signing(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("RPC transport error: {0}")]
    Rpc(String),

    /// Broadcast, but confirmation was never observed. The transaction may
    /// still land; look it up by signature before sending again.
    #[error("transaction {signature} was sent but not confirmed: {message}")]
    Unconfirmed { signature: Signature, message: String },

    #[error("computation {computation_offset} (transaction {signature}) was queued, then: {source}")]
    AfterBroadcast {
        signature: Signature,
        computation_offset: u64,
        source: Box<BidClientError>,
    },
}

impl BidClientError {
    /// Build a `Rejected` error from the ledger's error text, decoding the
    /// program's custom error code when one is present.
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        let code = LedgerErrorCode::parse(&message);
        BidClientError::Rejected { message, code }
    }

    pub fn decode(record: &'static str, reason: impl Into<String>) -> Self {
        BidClientError::Decode {
            record,
            reason: reason.into(),
        }
    }

    pub fn after_broadcast(signature: Signature, computation_offset: u64, source: Self) -> Self {
        BidClientError::AfterBroadcast {
            signature,
            computation_offset,
            source: Box::new(source),
        }
    }

    /// Signature of a transaction that was already sent when this failed.
    pub fn broadcast_signature(&self) -> Option<Signature> {
        match self {
            BidClientError::Unconfirmed { signature, .. }
            | BidClientError::AfterBroadcast { signature, .. } => Some(*signature),
            _ => None,
        }
    }

    /// Whether a read-only step that produced this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BidClientError::MxeKeyUnavailable { .. } | BidClientError::Rpc(_)
        )
    }

    /// True when the ledger rejected a submission because an identical one
    /// already landed (account already initialized, reveal already queued).
    pub fn is_duplicate_submission(&self) -> bool {
        match self {
            BidClientError::Rejected { message, .. } => is_duplicate_submission(message),
            _ => false,
        }
    }
}

/// Substrings the remote programs emit when an init or reveal has already
/// happened.
///
/// FRAGILE: neither the system program nor the MXE wrapper exposes a
/// structured duplicate signal, so this list must track their log text.
pub const DUPLICATE_SUBMISSION_MARKERS: &[&str] = &[
    "already in use",
    "already initialized",
    "already revealed",
    "AccountAlreadyInitialized",
];

/// Classify a broadcast error message as a duplicate submission.
pub fn is_duplicate_submission(message: &str) -> bool {
    DUPLICATE_SUBMISSION_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Custom errors of the sealed auction ledger program (Anchor codes 6000+)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerErrorCode {
    AuctionEnded,
    AuctionNotEnded,
    AlreadySettled,
    InvalidArciumProof,
    BelowMinPrice,
    InsufficientEscrow,
    AlreadyWithdrawn,
    BidsAlreadyPlaced,
    AuctionNotSettled,
    InvalidEndTime,
    InvalidMinPrice,
    InvalidSignatureCheck,
}

impl LedgerErrorCode {
    pub const BASE: u32 = 6000;

    pub fn from_code(code: u32) -> Option<Self> {
        use LedgerErrorCode::*;
        let variant = match code.checked_sub(Self::BASE)? {
            0 => AuctionEnded,
            1 => AuctionNotEnded,
            2 => AlreadySettled,
            3 => InvalidArciumProof,
            4 => BelowMinPrice,
            5 => InsufficientEscrow,
            6 => AlreadyWithdrawn,
            7 => BidsAlreadyPlaced,
            8 => AuctionNotSettled,
            9 => InvalidEndTime,
            10 => InvalidMinPrice,
            11 => InvalidSignatureCheck,
            _ => return None,
        };
        Some(variant)
    }

    /// Extract the code from text like `custom program error: 0x1770`.
    pub fn parse(message: &str) -> Option<Self> {
        const MARKER: &str = "custom program error: 0x";
        let start = message.find(MARKER)? + MARKER.len();
        let digits: String = message[start..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .collect();
        let code = u32::from_str_radix(&digits, 16).ok()?;
        Self::from_code(code)
    }

    pub fn message(&self) -> &'static str {
        use LedgerErrorCode::*;
        match self {
            AuctionEnded => "Auction already ended",
            AuctionNotEnded => "Auction not ended",
            AlreadySettled => "Auction already settled",
            InvalidArciumProof => "Invalid Arcium proof",
            BelowMinPrice => "Bid below minimum price",
            InsufficientEscrow => "Insufficient escrow",
            AlreadyWithdrawn => "Funds already withdrawn",
            BidsAlreadyPlaced => "Cannot cancel auction after bids are placed",
            AuctionNotSettled => "Auction must be settled before refunds",
            InvalidEndTime => "Auction end time must be in the future",
            InvalidMinPrice => "Minimum price must be greater than zero",
            InvalidSignatureCheck => "Ed25519 Signature Verification Failed",
        }
    }
}
