//! Submission Orchestrator
//!
//! `Idle -> Initializing -> Encrypting -> Submitting -> AwaitingComputation
//! -> Submitted`, with `Failed` reachable from every step.

use anchor_lang::prelude::Pubkey;
use solana_sdk::signature::{Signature, Signer};
use tracing::{debug, error, info, warn};

use super::{random_computation_offset, sol_to_lamports, Context, Progress};
use crate::cipher::{derive_shared_context, CipherBlock};
use crate::error::{BidClientError, Result};
use crate::instructions::submit_bid::carry_forward;
use crate::instructions::{init_auction_state, lock_bid_funds, submit_bid};
use crate::instructions::{BidFields, SubmitBidArgs, BID_FIELD_COUNT};
use crate::pda::SUBMIT_BID_CIRCUIT;
use crate::retry::Polled;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Idle,
    Initializing,
    Encrypting,
    Submitting,
    AwaitingComputation,
    Submitted,
    Failed,
}

/// One bid, amounts in lamports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidRequest {
    /// Ledger auction PDA
    pub auction: Pubkey,
    pub amount: u64,
    pub min_price: u64,
    /// Lamports to escrow with the ledger in the same transaction
    pub lock: Option<u64>,
    /// Wait for the MPC callback after confirmation
    pub await_computation: bool,
}

impl BidRequest {
    pub fn new(auction: Pubkey, amount: u64, min_price: u64) -> Self {
        Self {
            auction,
            amount,
            min_price,
            lock: None,
            await_computation: true,
        }
    }

    pub fn from_sol(auction: Pubkey, amount_sol: f64, min_price_sol: f64) -> Result<Self> {
        Ok(Self::new(
            auction,
            sol_to_lamports(amount_sol)?,
            sol_to_lamports(min_price_sol)?,
        ))
    }

    pub fn with_lock(mut self, lamports: u64) -> Self {
        self.lock = Some(lamports);
        self
    }

    pub fn without_computation_wait(mut self) -> Self {
        self.await_computation = false;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.amount == 0 {
            return Err(BidClientError::InvalidAmount("bid amount must be positive".into()));
        }
        match self.lock {
            Some(lock) if lock < self.amount => Err(BidClientError::LockBelowBid {
                lock,
                bid: self.amount,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created(Signature),
    AlreadyInitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The computation for `computation_offset` finalized; `bid_count` is
    /// read afterwards and includes this bid.
    Submitted {
        signature: Signature,
        computation_offset: u64,
        bid_count: u64,
    },
    /// Confirmed on the ledger, computation not observed yet. Re-read the
    /// bid state later; do not re-submit.
    StillProcessing {
        signature: Signature,
        computation_offset: u64,
    },
}

impl SubmissionOutcome {
    pub fn signature(&self) -> Signature {
        match self {
            SubmissionOutcome::Submitted { signature, .. }
            | SubmissionOutcome::StillProcessing { signature, .. } => *signature,
        }
    }
}

pub struct SubmissionOrchestrator<'a> {
    ctx: Context<'a>,
}

impl<'a> SubmissionOrchestrator<'a> {
    pub fn new(ctx: Context<'a>) -> Self {
        Self { ctx }
    }

    /// Create the auction's bid state unless it exists. Safe to call again.
    pub async fn ensure_initialized<S: Signer>(
        &self,
        auction: &Pubkey,
        payer: &S,
    ) -> Result<InitOutcome> {
        let reader = self.ctx.reader();
        if reader.fetch_bid_state(auction).await?.is_some() {
            debug!(%auction, "bid state already initialized");
            return Ok(InitOutcome::AlreadyInitialized);
        }

        let deriver = self.ctx.deriver();
        let ix = init_auction_state(
            &deriver.mxe_program,
            &payer.pubkey(),
            &deriver.bid_state(auction),
            auction,
        );
        match self.ctx.send(&[ix], payer).await {
            Ok(signature) => {
                info!(%auction, %signature, "bid state initialized");
                Ok(InitOutcome::Created(signature))
            }
            Err(err) if err.is_duplicate_submission() => {
                warn!(%auction, error = %err, "bid state initialized concurrently");
                Ok(InitOutcome::AlreadyInitialized)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn submit_bid<S: Signer>(
        &self,
        request: &BidRequest,
        bidder: &S,
        progress: &dyn Progress<SubmissionStatus>,
    ) -> Result<SubmissionOutcome> {
        progress.report(SubmissionStatus::Idle);
        let outcome = self.run(request, bidder, progress).await;
        if let Err(err) = &outcome {
            error!(auction = %request.auction, error = %err, "bid submission failed");
            progress.report(SubmissionStatus::Failed);
        }
        outcome
    }

    async fn run<S: Signer>(
        &self,
        request: &BidRequest,
        bidder: &S,
        progress: &dyn Progress<SubmissionStatus>,
    ) -> Result<SubmissionOutcome> {
        request.validate()?;
        let auction = &request.auction;
        let deriver = self.ctx.deriver();
        let reader = self.ctx.reader();

        transition(progress, SubmissionStatus::Initializing);
        self.ensure_initialized(auction, bidder).await?;

        transition(progress, SubmissionStatus::Encrypting);
        let state = reader.fetch_bid_state(auction).await?;

        let network_key = reader
            .fetch_mxe_public_key_with_retry(&self.ctx.config.mxe_key_retry, self.ctx.clock)
            .await?;
        let mut shared = derive_shared_context(&deriver.mxe_program, &network_key)?;
        let nonce = shared.fresh_nonce();

        let fields = BidFields {
            bidder: bidder.pubkey(),
            amount: request.amount,
            min_price: request.min_price,
        };
        let encrypted = shared.encrypt_fields(self.ctx.cipher, nonce, &fields.plaintext())?;
        let mut blocks: [CipherBlock; BID_FIELD_COUNT] =
            encrypted.try_into().map_err(|blocks: Vec<CipherBlock>| {
                BidClientError::Cipher(format!(
                    "{} blocks for {BID_FIELD_COUNT} values",
                    blocks.len()
                ))
            })?;
        if let Some(state) = state.as_ref().filter(|s| s.has_bids()) {
            carry_forward(&mut blocks, state);
        }

        transition(progress, SubmissionStatus::Submitting);
        let computation_offset = random_computation_offset();
        let args = SubmitBidArgs {
            computation_offset,
            ephemeral_public_key: shared.ephemeral_public_key(),
            nonce: u128::from_le_bytes(nonce),
            blocks,
        };
        drop(shared);

        let bid_ix = submit_bid(
            &deriver.mxe_program,
            &bidder.pubkey(),
            &deriver.computation_accounts(SUBMIT_BID_CIRCUIT, computation_offset),
            &deriver.bid_state(auction),
            &args,
        );
        #[cfg(feature = "debug")]
        debug!(payload = %hex::encode(&bid_ix.data), "submit_bid payload");

        let mut instructions = Vec::with_capacity(2);
        if let Some(lock) = request.lock {
            instructions.push(lock_bid_funds(&deriver, &bidder.pubkey(), auction, lock));
        }
        instructions.push(bid_ix);

        let signature = self
            .ctx
            .send(&instructions, bidder)
            .await
            .map_err(|err| match err.broadcast_signature() {
                Some(signature) => BidClientError::after_broadcast(signature, computation_offset, err),
                None => err,
            })?;
        info!(%auction, %signature, computation_offset, "bid queued");

        if !request.await_computation {
            return Ok(SubmissionOutcome::StillProcessing {
                signature,
                computation_offset,
            });
        }

        transition(progress, SubmissionStatus::AwaitingComputation);
        let outcome = self
            .await_computation(auction, signature, computation_offset)
            .await
            .map_err(|err| BidClientError::after_broadcast(signature, computation_offset, err))?;
        transition(progress, SubmissionStatus::Submitted);
        Ok(outcome)
    }

    /// Poll until the computation account for `computation_offset` closes,
    /// then read the bid count the callback left behind. Other bidders'
    /// callbacks move `bid_count` too, so it is never the completion signal.
    async fn await_computation(
        &self,
        auction: &Pubkey,
        signature: Signature,
        computation_offset: u64,
    ) -> Result<SubmissionOutcome> {
        let reader = self.ctx.reader();
        let reader = &reader;
        let polled = self
            .ctx
            .config
            .computation_wait
            .poll(self.ctx.clock, |attempt| async move {
                match reader.computation_pending(computation_offset).await {
                    Ok(true) => Ok(None),
                    Ok(false) => Ok(Some(())),
                    Err(err) if err.is_retryable() => {
                        warn!(
                            attempt,
                            computation_offset,
                            error = %err,
                            "computation read failed, polling again"
                        );
                        Ok(None)
                    }
                    Err(err) => Err(err),
                }
            })
            .await?;

        match polled {
            Polled::Ready { attempts, .. } => {
                let bid_count = reader
                    .fetch_bid_state(auction)
                    .await?
                    .map_or(0, |state| state.bid_count);
                info!(%auction, computation_offset, bid_count, attempts, "bid computation finalized");
                Ok(SubmissionOutcome::Submitted {
                    signature,
                    computation_offset,
                    bid_count,
                })
            }
            Polled::Exhausted { attempts, elapsed } => {
                warn!(
                    %auction,
                    computation_offset,
                    attempts,
                    ?elapsed,
                    "bid computation still processing"
                );
                Ok(SubmissionOutcome::StillProcessing {
                    signature,
                    computation_offset,
                })
            }
        }
    }
}

fn transition(progress: &dyn Progress<SubmissionStatus>, status: SubmissionStatus) {
    debug!(?status, "submission");
    progress.report(status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::RescueCipher;
    use crate::config::ClientConfig;
    use crate::error::LedgerErrorCode;
    use crate::instructions::{ledger_discriminators, mxe_discriminators};
    use crate::pda::AddressDeriver;
    use crate::retry::Clock;
    use crate::rpc::LedgerClient;
    use crate::testing::{FakeClock, FakeLedger, Injected};
    use solana_sdk::signature::Keypair;
    use tokio::sync::watch;

    struct Harness {
        config: ClientConfig,
        ledger: FakeLedger,
        clock: FakeClock,
    }

    impl Harness {
        fn new() -> Self {
            let config = ClientConfig::devnet();
            let ledger = FakeLedger::new(&config);
            Self {
                config,
                ledger,
                clock: FakeClock::default(),
            }
        }

        fn orchestrator(&self) -> SubmissionOrchestrator<'_> {
            SubmissionOrchestrator::new(Context {
                config: &self.config,
                ledger: &self.ledger,
                clock: &self.clock,
                cipher: &RescueCipher,
            })
        }

        async fn bid_count(&self, auction: &Pubkey) -> Option<u64> {
            self.orchestrator()
                .ctx
                .reader()
                .fetch_bid_state(auction)
                .await
                .unwrap()
                .map(|s| s.bid_count)
        }
    }

    #[tokio::test]
    async fn first_bid_initializes_and_waits_for_computation() {
        let h = Harness::new();
        let auction = Pubkey::new_unique();
        let bidder = Keypair::new();
        let (tx, rx) = watch::channel(SubmissionStatus::Idle);

        let request = BidRequest::from_sol(auction, 1.0, 0.5).unwrap();
        let outcome = h.orchestrator().submit_bid(&request, &bidder, &tx).await.unwrap();

        assert!(matches!(outcome, SubmissionOutcome::Submitted { bid_count: 1, .. }));
        assert_eq!(*rx.borrow(), SubmissionStatus::Submitted);
        assert_eq!(
            h.ledger.sent(),
            vec![mxe_discriminators::INIT_AUCTION_STATE, mxe_discriminators::SUBMIT_BID]
        );
    }

    #[tokio::test]
    async fn later_bids_carry_forward_the_encrypted_state() {
        let h = Harness::new();
        let auction = Pubkey::new_unique();

        for (i, sol) in [1.0, 3.0, 2.0].into_iter().enumerate() {
            let request = BidRequest::from_sol(auction, sol, 0.5).unwrap();
            let outcome = h
                .orchestrator()
                .submit_bid(&request, &Keypair::new(), &())
                .await
                .unwrap();
            match outcome {
                SubmissionOutcome::Submitted { bid_count, .. } => assert_eq!(bid_count, i as u64 + 1),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(h.ledger.count_sent(mxe_discriminators::INIT_AUCTION_STATE), 1);
    }

    #[tokio::test]
    async fn ensure_initialized_is_idempotent() {
        let h = Harness::new();
        let auction = Pubkey::new_unique();
        let payer = Keypair::new();
        let orchestrator = h.orchestrator();

        let first = orchestrator.ensure_initialized(&auction, &payer).await.unwrap();
        assert!(matches!(first, InitOutcome::Created(_)));
        assert_eq!(h.bid_count(&auction).await, Some(0));

        let second = orchestrator.ensure_initialized(&auction, &payer).await.unwrap();
        assert_eq!(second, InitOutcome::AlreadyInitialized);
        assert_eq!(h.bid_count(&auction).await, Some(0));

        let request = BidRequest::from_sol(auction, 1.0, 0.5).unwrap();
        orchestrator.submit_bid(&request, &payer, &()).await.unwrap();
        orchestrator.ensure_initialized(&auction, &payer).await.unwrap();
        assert_eq!(h.bid_count(&auction).await, Some(1));
        assert_eq!(h.ledger.count_sent(mxe_discriminators::INIT_AUCTION_STATE), 1);
    }

    #[tokio::test]
    async fn concurrent_initialization_counts_as_success() {
        let h = Harness::new();
        h.ledger.inject(Injected::Rejected(
            "Allocate: account Address { address: x, base: None } already in use".into(),
        ));

        let outcome = h
            .orchestrator()
            .ensure_initialized(&Pubkey::new_unique(), &Keypair::new())
            .await
            .unwrap();
        assert_eq!(outcome, InitOutcome::AlreadyInitialized);
    }

    #[tokio::test]
    async fn lock_is_sent_in_the_same_transaction() {
        let h = Harness::new();
        let auction = Pubkey::new_unique();
        let bidder = Keypair::new();

        let request = BidRequest::from_sol(auction, 1.0, 0.5)
            .unwrap()
            .with_lock(1_500_000_000);
        h.orchestrator().submit_bid(&request, &bidder, &()).await.unwrap();

        let escrow = AddressDeriver::new(&h.config).bid_escrow(&auction, &bidder.pubkey());
        assert_eq!(h.ledger.escrow(&escrow), Some(1_500_000_000));
        assert_eq!(
            h.ledger.sent()[1..],
            [ledger_discriminators::LOCK_BID_FUNDS, mxe_discriminators::SUBMIT_BID]
        );
    }

    #[tokio::test]
    async fn lock_below_bid_fails_before_any_transaction() {
        let h = Harness::new();
        let (tx, rx) = watch::channel(SubmissionStatus::Idle);
        let request = BidRequest::new(Pubkey::new_unique(), 1_000_000_000, 1).with_lock(999_999_999);

        let err = h
            .orchestrator()
            .submit_bid(&request, &Keypair::new(), &tx)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BidClientError::LockBelowBid { lock: 999_999_999, bid: 1_000_000_000 }
        ));
        assert_eq!(*rx.borrow(), SubmissionStatus::Failed);
        assert!(h.ledger.sent().is_empty());
    }

    #[tokio::test]
    async fn ledger_rejection_is_surfaced_verbatim() {
        let h = Harness::new();
        let auction = Pubkey::new_unique();
        let bidder = Keypair::new();
        h.orchestrator().ensure_initialized(&auction, &bidder).await.unwrap();

        let text = "Transaction simulation failed: Error processing Instruction 0: custom program error: 0x1770";
        h.ledger.inject(Injected::Rejected(text.into()));

        let request = BidRequest::from_sol(auction, 1.0, 0.5).unwrap();
        let err = h
            .orchestrator()
            .submit_bid(&request, &bidder, &())
            .await
            .unwrap_err();

        match err {
            BidClientError::Rejected { message, code } => {
                assert_eq!(message, text);
                assert_eq!(code, Some(LedgerErrorCode::AuctionEnded));
            }
            other => panic!("unexpected error {other:?}"),
        }
        // no automatic re-broadcast
        assert_eq!(h.ledger.count_sent(mxe_discriminators::SUBMIT_BID), 1);
    }

    #[tokio::test]
    async fn slow_computation_is_still_processing() {
        let h = Harness::new();
        h.ledger.set_callback_delay(None);
        let auction = Pubkey::new_unique();

        let request = BidRequest::from_sol(auction, 1.0, 0.5).unwrap();
        let outcome = h
            .orchestrator()
            .submit_bid(&request, &Keypair::new(), &())
            .await
            .unwrap();

        assert!(matches!(outcome, SubmissionOutcome::StillProcessing { .. }));
        assert!(h.clock.elapsed() <= h.config.computation_wait.timeout.unwrap());
        assert_eq!(h.ledger.count_sent(mxe_discriminators::SUBMIT_BID), 1);
    }

    #[tokio::test]
    async fn another_bidders_callback_does_not_finish_ours() {
        let h = Harness::new();
        let auction = Pubkey::new_unique();
        let bidder = Keypair::new();
        h.orchestrator().ensure_initialized(&auction, &bidder).await.unwrap();
        h.ledger.set_callback_delay(None);

        // a foreign bid's callback bumps bid_count while ours never lands
        let bid_state = AddressDeriver::new(&h.config).bid_state(&auction);
        let theirs = h.ledger.sealed_state(&auction, 1, 3_000_000_000, Pubkey::new_unique());
        h.ledger.schedule(bid_state, theirs, 2);

        let request = BidRequest::from_sol(auction, 1.0, 0.5).unwrap();
        let outcome = h.orchestrator().submit_bid(&request, &bidder, &()).await.unwrap();

        assert!(matches!(outcome, SubmissionOutcome::StillProcessing { .. }));
        assert_eq!(h.bid_count(&auction).await, Some(1));
    }

    #[tokio::test]
    async fn transient_computation_reads_are_tolerated() {
        let h = Harness::new();
        h.ledger.set_callback_delay(Some(1));
        h.ledger.fail_computation_reads(2);

        let request = BidRequest::from_sol(Pubkey::new_unique(), 1.0, 0.5).unwrap();
        let outcome = h
            .orchestrator()
            .submit_bid(&request, &Keypair::new(), &())
            .await
            .unwrap();

        assert!(matches!(outcome, SubmissionOutcome::Submitted { bid_count: 1, .. }));
        // two failed reads, one early read, then the closed account
        assert_eq!(h.clock.sleeps(), 3);
    }

    #[tokio::test]
    async fn transport_failure_on_broadcast_is_not_resent() {
        let h = Harness::new();
        let auction = Pubkey::new_unique();
        let bidder = Keypair::new();
        h.orchestrator().ensure_initialized(&auction, &bidder).await.unwrap();
        h.ledger.inject(Injected::Transport("connection reset by peer".into()));

        let request = BidRequest::from_sol(auction, 1.0, 0.5).unwrap();
        let err = h
            .orchestrator()
            .submit_bid(&request, &bidder, &())
            .await
            .unwrap_err();

        assert!(matches!(err, BidClientError::Rpc(_)));
        assert_eq!(err.broadcast_signature(), None);
        assert_eq!(h.ledger.count_sent(mxe_discriminators::SUBMIT_BID), 1);
    }

    #[tokio::test]
    async fn unconfirmed_bid_keeps_signature_and_offset() {
        let h = Harness::new();
        let auction = Pubkey::new_unique();
        let bidder = Keypair::new();
        h.orchestrator().ensure_initialized(&auction, &bidder).await.unwrap();
        h.ledger.inject(Injected::Unconfirmed("unable to confirm transaction".into()));

        let request = BidRequest::from_sol(auction, 1.0, 0.5).unwrap();
        let err = h
            .orchestrator()
            .submit_bid(&request, &bidder, &())
            .await
            .unwrap_err();

        match &err {
            BidClientError::AfterBroadcast { source, .. } => {
                assert!(matches!(**source, BidClientError::Unconfirmed { .. }))
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!err.is_retryable());
        assert!(err.broadcast_signature().is_some());
        assert_eq!(h.ledger.count_sent(mxe_discriminators::SUBMIT_BID), 1);
    }

    #[tokio::test]
    async fn decode_failure_after_broadcast_keeps_signature_and_offset() {
        let h = Harness::new();
        let auction = Pubkey::new_unique();
        let bidder = Keypair::new();
        h.orchestrator().ensure_initialized(&auction, &bidder).await.unwrap();

        // third read of the bid state happens after the computation closed
        let bid_state = AddressDeriver::new(&h.config).bid_state(&auction);
        h.ledger.schedule(bid_state, vec![0u8; 16], 2);

        let request = BidRequest::from_sol(auction, 1.0, 0.5).unwrap();
        let err = h
            .orchestrator()
            .submit_bid(&request, &bidder, &())
            .await
            .unwrap_err();

        match &err {
            BidClientError::AfterBroadcast {
                computation_offset,
                source,
                ..
            } => {
                assert!(matches!(
                    **source,
                    BidClientError::Decode { record: "AuctionBidState", .. }
                ));
                let computation = AddressDeriver::new(&h.config).computation(*computation_offset);
                let closed = h.ledger.get_account_data(&computation).await.unwrap();
                assert!(closed.is_none());
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.broadcast_signature().is_some());
    }

    #[tokio::test]
    async fn skipping_the_wait_returns_after_confirmation() {
        let h = Harness::new();
        let request = BidRequest::from_sol(Pubkey::new_unique(), 1.0, 0.5)
            .unwrap()
            .without_computation_wait();

        let outcome = h
            .orchestrator()
            .submit_bid(&request, &Keypair::new(), &())
            .await
            .unwrap();
        assert!(matches!(outcome, SubmissionOutcome::StillProcessing { .. }));
        assert_eq!(h.clock.sleeps(), 0);
    }

    #[tokio::test]
    async fn missing_mxe_key_is_reported_after_retries() {
        let config = ClientConfig::devnet();
        let ledger = FakeLedger::without_mxe_key(&config);
        let clock = FakeClock::default();
        let orchestrator = SubmissionOrchestrator::new(Context {
            config: &config,
            ledger: &ledger,
            clock: &clock,
            cipher: &RescueCipher,
        });

        let request = BidRequest::from_sol(Pubkey::new_unique(), 1.0, 0.5).unwrap();
        let err = orchestrator
            .submit_bid(&request, &Keypair::new(), &())
            .await
            .unwrap_err();

        assert!(matches!(err, BidClientError::MxeKeyUnavailable { .. }));
        assert!(err.to_string().contains("retry"));
        assert_eq!(ledger.count_sent(mxe_discriminators::SUBMIT_BID), 0);
    }
}
