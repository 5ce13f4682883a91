//! State Reader
//!
//! Absent accounts are a meaningful state ("no bids yet", "no reveal
//! requested") and come back as `None`. A present account that fails to
//! decode is a protocol mismatch and comes back as `Decode`.

use anchor_lang::prelude::Pubkey;
use tracing::{debug, warn};

use crate::error::{BidClientError, Result};
use crate::pda::AddressDeriver;
use crate::retry::{Clock, Polled, RetryPolicy};
use crate::rpc::LedgerClient;
use crate::state::{decode_mxe_x25519_key, Auction, AuctionBidState, AuctionResult};

pub struct StateReader<'a> {
    ledger: &'a dyn LedgerClient,
    deriver: AddressDeriver,
}

impl<'a> StateReader<'a> {
    pub fn new(ledger: &'a dyn LedgerClient, deriver: AddressDeriver) -> Self {
        Self { ledger, deriver }
    }

    pub fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    pub async fn fetch_bid_state(&self, auction: &Pubkey) -> Result<Option<AuctionBidState>> {
        let address = self.deriver.bid_state(auction);
        debug!(%auction, bid_state = %address, "fetching bid state");
        self.fetch(&address, AuctionBidState::decode).await
    }

    pub async fn fetch_result(&self, auction: &Pubkey) -> Result<Option<AuctionResult>> {
        let address = self.deriver.auction_result(auction);
        debug!(%auction, result = %address, "fetching auction result");
        self.fetch(&address, AuctionResult::decode).await
    }

    /// Whether the computation queued at `computation_offset` is still open.
    /// The cluster closes the account once the callback has been applied.
    pub async fn computation_pending(&self, computation_offset: u64) -> Result<bool> {
        let address = self.deriver.computation(computation_offset);
        debug!(computation_offset, computation = %address, "checking computation account");
        Ok(self.ledger.get_account_data(&address).await?.is_some())
    }

    /// Ledger auction record, addressed by its own PDA.
    pub async fn fetch_auction(&self, auction: &Pubkey) -> Result<Option<Auction>> {
        self.fetch(auction, Auction::decode).await
    }

    /// The MXE's x25519 key; unavailable while keygen is incomplete.
    pub async fn fetch_mxe_public_key(&self) -> Result<[u8; 32]> {
        let unavailable = || BidClientError::MxeKeyUnavailable {
            program: self.deriver.mxe_program,
        };
        let data = self
            .ledger
            .get_account_data(&self.deriver.mxe_account())
            .await?
            .ok_or_else(unavailable)?;
        decode_mxe_x25519_key(&data)?
            .filter(|key| key.iter().any(|b| *b != 0))
            .ok_or_else(unavailable)
    }

    /// `fetch_mxe_public_key` retried while the failure is transient.
    pub async fn fetch_mxe_public_key_with_retry(
        &self,
        policy: &RetryPolicy,
        clock: &dyn Clock,
    ) -> Result<[u8; 32]> {
        let polled = policy
            .poll(clock, |attempt| async move {
                match self.fetch_mxe_public_key().await {
                    Ok(key) => Ok(Some(key)),
                    Err(err) if err.is_retryable() => {
                        warn!(attempt, error = %err, "MXE key not ready, retrying");
                        Ok(None)
                    }
                    Err(err) => Err(err),
                }
            })
            .await?;

        match polled {
            Polled::Ready { value, .. } => Ok(value),
            Polled::Exhausted { attempts, elapsed } => {
                warn!(attempts, ?elapsed, "giving up on MXE key");
                Err(BidClientError::MxeKeyUnavailable {
                    program: self.deriver.mxe_program,
                })
            }
        }
    }

    async fn fetch<T>(&self, address: &Pubkey, decode: fn(&[u8]) -> Result<T>) -> Result<Option<T>> {
        match self.ledger.get_account_data(address).await? {
            Some(data) => decode(&data).map(Some),
            None => Ok(None),
        }
    }
}
