//! Client configuration
//!
//! Program ids, cluster routing and polling budgets are passed explicitly to
//! every orchestrator. Nothing here is global or mutable.

use std::env;
use std::str::FromStr;

use anchor_lang::prelude::Pubkey;

use crate::error::{BidClientError, Result};
use crate::retry::RetryPolicy;

/// Arcium Program ID (devnet)
/// Base58: Arcj82pX7HxYKLR92qvgZUAd7vGS1k4hQvAFcPATFdEQ
pub const ARCIUM_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    0x92, 0x6f, 0x09, 0xaa, 0x6d, 0x48, 0x7d, 0xe2,
    0xd8, 0x8c, 0x37, 0x6a, 0x16, 0x1d, 0x07, 0x7f,
    0xb0, 0x81, 0x0b, 0x13, 0x23, 0x6b, 0x7c, 0x76,
    0x47, 0xa0, 0x70, 0x28, 0x03, 0xfa, 0x5d, 0x89,
]);

/// Sealed-bid MXE wrapper program (queues submit_bid / reveal_winner)
/// Base58: 2excUVgCNGZDN4yHGBbxBg4ptNYTH1nyqnJ5HArAG6wC
pub const DEFAULT_MXE_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    0x18, 0x95, 0x0e, 0x9f, 0x9b, 0x8a, 0x2e, 0xfb,
    0x7e, 0xd9, 0x8f, 0x08, 0x66, 0xaa, 0x0b, 0xe3,
    0x87, 0xa3, 0x3b, 0xb4, 0x41, 0x32, 0x8e, 0xc6,
    0xac, 0x99, 0xd1, 0xc6, 0xbc, 0xdc, 0xe1, 0xc3,
]);

/// Sealed auction ledger program (escrow, settlement, NFT custody)
/// Base58: 2rTWXsHTnJdSKxJjdG1wDWdQYFFD3b6RfHbqi3VsR2dt
pub const DEFAULT_LEDGER_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    0x1b, 0x87, 0x1e, 0xdf, 0x15, 0xff, 0x36, 0xb6,
    0x41, 0xa9, 0xf0, 0xec, 0x1e, 0xc2, 0x39, 0x04,
    0x4d, 0x2d, 0x19, 0x4a, 0xc9, 0xdc, 0x62, 0xac,
    0xa6, 0xb9, 0x04, 0x46, 0x0d, 0xa2, 0x82, 0xdf,
]);

/// Active devnet cluster servicing this MXE
pub const DEFAULT_CLUSTER_OFFSET: u32 = 456;

#[cfg(feature = "devnet")]
pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";

#[cfg(not(feature = "devnet"))]
pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

pub const ENV_RPC_URL: &str = "SEALED_BID_RPC_URL";
pub const ENV_MXE_PROGRAM_ID: &str = "SEALED_BID_MXE_PROGRAM_ID";
pub const ENV_LEDGER_PROGRAM_ID: &str = "SEALED_BID_LEDGER_PROGRAM_ID";
pub const ENV_CLUSTER_OFFSET: &str = "SEALED_BID_CLUSTER_OFFSET";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// JSON-RPC endpoint of the ledger
    pub rpc_url: String,
    /// MXE wrapper program owning the bid state and result records
    pub mxe_program_id: Pubkey,
    /// Arcium core program (mempool, cluster, computation accounts)
    pub arcium_program_id: Pubkey,
    /// Sealed auction ledger program
    pub ledger_program_id: Pubkey,
    /// Selects which MPC cluster services requests
    pub cluster_offset: u32,
    pub mxe_key_retry: RetryPolicy,
    pub computation_wait: RetryPolicy,
    pub reveal_poll: RetryPolicy,
}

impl ClientConfig {
    pub fn devnet() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            mxe_program_id: DEFAULT_MXE_PROGRAM_ID,
            arcium_program_id: ARCIUM_PROGRAM_ID,
            ledger_program_id: DEFAULT_LEDGER_PROGRAM_ID,
            cluster_offset: DEFAULT_CLUSTER_OFFSET,
            mxe_key_retry: RetryPolicy::MXE_KEY,
            computation_wait: RetryPolicy::COMPUTATION,
            reveal_poll: RetryPolicy::REVEAL,
        }
    }

    /// Defaults overridden by `SEALED_BID_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::devnet();

        if let Some(url) = lookup(ENV_RPC_URL) {
            config.rpc_url = url;
        }
        if let Some(id) = lookup(ENV_MXE_PROGRAM_ID) {
            config.mxe_program_id = parse_pubkey(ENV_MXE_PROGRAM_ID, &id)?;
        }
        if let Some(id) = lookup(ENV_LEDGER_PROGRAM_ID) {
            config.ledger_program_id = parse_pubkey(ENV_LEDGER_PROGRAM_ID, &id)?;
        }
        if let Some(offset) = lookup(ENV_CLUSTER_OFFSET) {
            config.cluster_offset = offset.trim().parse().map_err(|_| {
                BidClientError::Config(format!("{ENV_CLUSTER_OFFSET} is not a u32: {offset}"))
            })?;
        }

        Ok(config)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::devnet()
    }
}

fn parse_pubkey(name: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value.trim())
        .map_err(|_| BidClientError::Config(format!("{name} is not a base58 pubkey: {value}")))
}
