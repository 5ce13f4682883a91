//! Reveal Orchestrator
//!
//! `Idle -> CheckingExisting -> (SubmittingReveal | Polling) -> Revealed |
//! NoValidWinner | TimedOut`, plus `NoBids` when reveal is meaningless and
//! `Failed` on fatal errors.

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::Instruction;
use solana_sdk::signature::{Signature, Signer};
use tracing::{debug, error, info, warn};

use super::{random_computation_offset, Context, Progress};
use crate::cipher::derive_shared_context;
use crate::error::{BidClientError, Result};
use crate::instructions::{
    finalize_no_winner, reclaim_unsold, refund_loser, reveal_winner, settle_auction, ArciumProof,
    RevealWinnerArgs, SettleAccounts,
};
use crate::pda::{AddressDeriver, REVEAL_WINNER_CIRCUIT};
use crate::retry::Polled;
use crate::state::{AuctionBidState, AuctionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealStatus {
    Idle,
    CheckingExisting,
    SubmittingReveal,
    Polling,
    Revealed,
    NoValidWinner,
    NoBids,
    TimedOut,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    Winner {
        winner: Pubkey,
        winning_amount: u64,
        revealed_at: i64,
    },
    /// Bids exist but none cleared the minimum price
    NoValidWinner { revealed_at: i64 },
    /// No bid was ever placed; nothing to reveal
    NoBids,
    /// Reveal requested but not finalized within the poll budget
    StillProcessing,
}

impl RevealOutcome {
    pub fn from_result(result: &AuctionResult) -> Self {
        if result.has_valid_winner() {
            RevealOutcome::Winner {
                winner: result.winner,
                winning_amount: result.winning_amount,
                revealed_at: result.revealed_at,
            }
        } else {
            RevealOutcome::NoValidWinner {
                revealed_at: result.revealed_at,
            }
        }
    }

    /// Ledger follow-up for a terminal outcome.
    pub fn settlement_path(&self) -> Option<SettlementPath> {
        match *self {
            RevealOutcome::Winner {
                winner,
                winning_amount,
                ..
            } => Some(SettlementPath::Settle {
                winner,
                winning_amount,
            }),
            RevealOutcome::NoValidWinner { .. } => Some(SettlementPath::FinalizeNoWinner),
            RevealOutcome::NoBids => Some(SettlementPath::Reclaim),
            RevealOutcome::StillProcessing => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealReport {
    pub outcome: RevealOutcome,
    /// Bids recorded in the bid state (0 when it does not exist)
    pub bid_count: u64,
    /// Reveal transaction sent by this call, if any
    pub signature: Option<Signature>,
}

/// Which ledger instruction closes the auction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementPath {
    /// Zero bids: seller takes the NFT back
    Reclaim,
    /// Bids below minimum: NFT back to seller, escrows refunded
    FinalizeNoWinner,
    /// Pay the seller from the winner's escrow, NFT to the winner
    Settle { winner: Pubkey, winning_amount: u64 },
}

impl SettlementPath {
    /// Closing instruction followed by a `refund_loser` per losing bidder.
    ///
    /// `payer` cranks the permissionless paths; `Reclaim` must be signed by
    /// the seller.
    pub fn instructions(
        &self,
        deriver: &AddressDeriver,
        accounts: &SettleAccounts,
        payer: &Pubkey,
        proof: &ArciumProof,
        bidders: &[Pubkey],
    ) -> Vec<Instruction> {
        let mut instructions = match self {
            SettlementPath::Reclaim => return vec![reclaim_unsold(deriver, accounts)],
            SettlementPath::FinalizeNoWinner => {
                vec![finalize_no_winner(deriver, payer, accounts, proof)]
            }
            SettlementPath::Settle {
                winner,
                winning_amount,
            } => vec![settle_auction(deriver, accounts, winner, *winning_amount, proof)],
        };

        let winner = match self {
            SettlementPath::Settle { winner, .. } => Some(*winner),
            _ => None,
        };
        instructions.extend(
            bidders
                .iter()
                .filter(|bidder| Some(**bidder) != winner)
                .map(|bidder| refund_loser(deriver, bidder, &accounts.auction)),
        );
        instructions
    }
}

pub struct RevealOrchestrator<'a> {
    ctx: Context<'a>,
}

impl<'a> RevealOrchestrator<'a> {
    pub fn new(ctx: Context<'a>) -> Self {
        Self { ctx }
    }

    pub async fn reveal<S: Signer>(
        &self,
        auction: &Pubkey,
        payer: &S,
        progress: &dyn Progress<RevealStatus>,
    ) -> Result<RevealReport> {
        progress.report(RevealStatus::Idle);
        let report = self.run(auction, payer, progress).await;
        match &report {
            Ok(report) => transition(progress, terminal_status(&report.outcome)),
            Err(err) => {
                error!(%auction, error = %err, "reveal failed");
                progress.report(RevealStatus::Failed);
            }
        }
        report
    }

    /// Queue the reveal computation for an auction with bids.
    ///
    /// Returns `AlreadyRevealed` when the result is final; `Ok(None)` when
    /// another reveal for the auction is already in flight.
    pub async fn request_reveal<S: Signer>(
        &self,
        auction: &Pubkey,
        state: &AuctionBidState,
        payer: &S,
    ) -> Result<Option<Signature>> {
        match self.ctx.reader().fetch_result(auction).await? {
            Some(result) if result.revealed => {
                return Err(BidClientError::AlreadyRevealed { auction: *auction });
            }
            Some(_) => {
                debug!(%auction, "reveal already pending");
                return Ok(None);
            }
            None => {}
        }
        let queued = self.queue_reveal(auction, state, payer).await?;
        Ok(queued.map(|(signature, _)| signature))
    }

    /// Send `reveal_winner` without consulting the result record. A
    /// duplicate rejection means another reveal got there first: `Ok(None)`.
    async fn queue_reveal<S: Signer>(
        &self,
        auction: &Pubkey,
        state: &AuctionBidState,
        payer: &S,
    ) -> Result<Option<(Signature, u64)>> {
        let reader = self.ctx.reader();
        let deriver = self.ctx.deriver();
        let network_key = reader
            .fetch_mxe_public_key_with_retry(&self.ctx.config.mxe_key_retry, self.ctx.clock)
            .await?;
        let shared = derive_shared_context(&deriver.mxe_program, &network_key)?;
        let nonce = shared.fresh_nonce();

        let computation_offset = random_computation_offset();
        let args = RevealWinnerArgs::from_state(
            computation_offset,
            shared.ephemeral_public_key(),
            u128::from_le_bytes(nonce),
            state,
        );
        let ix = reveal_winner(
            &deriver.mxe_program,
            &payer.pubkey(),
            &deriver.computation_accounts(REVEAL_WINNER_CIRCUIT, computation_offset),
            &deriver.bid_state(auction),
            &deriver.auction_result(auction),
            &args,
        );
        #[cfg(feature = "debug")]
        debug!(payload = %hex::encode(&ix.data), "reveal_winner payload");

        match self.ctx.send(&[ix], payer).await {
            Ok(signature) => {
                info!(%auction, %signature, computation_offset, "reveal queued");
                Ok(Some((signature, computation_offset)))
            }
            Err(err) if err.is_duplicate_submission() => {
                warn!(%auction, error = %err, "reveal raced with another submitter");
                Ok(None)
            }
            Err(err) => Err(match err.broadcast_signature() {
                Some(signature) => BidClientError::after_broadcast(signature, computation_offset, err),
                None => err,
            }),
        }
    }

    async fn run<S: Signer>(
        &self,
        auction: &Pubkey,
        payer: &S,
        progress: &dyn Progress<RevealStatus>,
    ) -> Result<RevealReport> {
        let reader = self.ctx.reader();

        transition(progress, RevealStatus::CheckingExisting);
        let existing = reader.fetch_result(auction).await?;
        let state = reader.fetch_bid_state(auction).await?;
        let bid_count = state.as_ref().map_or(0, |s| s.bid_count);

        if let Some(result) = existing.as_ref().filter(|r| r.revealed) {
            info!(%auction, "already revealed");
            return Ok(RevealReport {
                outcome: RevealOutcome::from_result(result),
                bid_count,
                signature: None,
            });
        }

        let Some(state) = state.filter(|s| s.has_bids()) else {
            info!(%auction, "no bids placed; use the reclaim path");
            return Ok(RevealReport {
                outcome: RevealOutcome::NoBids,
                bid_count,
                signature: None,
            });
        };

        // no second result read: a reveal landing now is picked up by the poll
        let queued = if existing.is_none() {
            transition(progress, RevealStatus::SubmittingReveal);
            self.queue_reveal(auction, &state, payer).await?
        } else {
            None
        };

        transition(progress, RevealStatus::Polling);
        let reader = &reader;
        let polled = self
            .ctx
            .config
            .reveal_poll
            .poll(self.ctx.clock, |attempt| async move {
                match reader.fetch_result(auction).await {
                    Ok(result) => Ok(result.filter(|r| r.revealed)),
                    Err(err) if err.is_retryable() => {
                        warn!(attempt, error = %err, "result read failed, polling again");
                        Ok(None)
                    }
                    Err(err) => Err(err),
                }
            })
            .await
            .map_err(|err| match queued {
                Some((signature, offset)) => BidClientError::after_broadcast(signature, offset, err),
                None => err,
            })?;

        let outcome = match polled {
            Polled::Ready { value, attempts } => {
                info!(%auction, attempts, winner = %value.winner, "result revealed");
                RevealOutcome::from_result(&value)
            }
            Polled::Exhausted { attempts, elapsed } => {
                warn!(%auction, attempts, ?elapsed, "reveal still processing");
                RevealOutcome::StillProcessing
            }
        };

        Ok(RevealReport {
            outcome,
            bid_count,
            signature: queued.map(|(signature, _)| signature),
        })
    }
}

fn terminal_status(outcome: &RevealOutcome) -> RevealStatus {
    match outcome {
        RevealOutcome::Winner { .. } => RevealStatus::Revealed,
        RevealOutcome::NoValidWinner { .. } => RevealStatus::NoValidWinner,
        RevealOutcome::NoBids => RevealStatus::NoBids,
        RevealOutcome::StillProcessing => RevealStatus::TimedOut,
    }
}

fn transition(progress: &dyn Progress<RevealStatus>, status: RevealStatus) {
    debug!(?status, "reveal");
    progress.report(status);
}
