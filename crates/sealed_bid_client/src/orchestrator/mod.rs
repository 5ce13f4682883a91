//! Submission and reveal workflows
//!
//! Both orchestrators are stateless between calls: everything they need is
//! re-read from the ledger, keyed by the auction id. Only pre-broadcast reads
//! are retried; a broadcast transaction is observed, never re-sent.

pub mod reveal;
pub mod submission;

use anchor_lang::solana_program::instruction::Instruction;
use rand::rngs::OsRng;
use rand::RngCore;
use solana_sdk::signature::{Signature, Signer};
use tokio::sync::watch;
use tracing::info;

use crate::cipher::FieldCipher;
use crate::config::ClientConfig;
use crate::error::{BidClientError, Result};
use crate::pda::AddressDeriver;
use crate::reader::StateReader;
use crate::retry::Clock;
use crate::rpc::{sign_transaction, LedgerClient};

pub use reveal::{RevealOrchestrator, RevealOutcome, RevealReport, RevealStatus, SettlementPath};
pub use submission::{
    BidRequest, InitOutcome, SubmissionOrchestrator, SubmissionOutcome, SubmissionStatus,
};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Receives state-machine transitions for progress display
pub trait Progress<S>: Send + Sync {
    fn report(&self, status: S);
}

impl<S> Progress<S> for () {
    fn report(&self, _status: S) {}
}

impl<S: Send + Sync> Progress<S> for watch::Sender<S> {
    fn report(&self, status: S) {
        self.send_replace(status);
    }
}

/// Collaborators shared by both orchestrators
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub config: &'a ClientConfig,
    pub ledger: &'a dyn LedgerClient,
    pub clock: &'a dyn Clock,
    pub cipher: &'a dyn FieldCipher,
}

impl<'a> Context<'a> {
    pub fn deriver(&self) -> AddressDeriver {
        AddressDeriver::new(self.config)
    }

    pub fn reader(&self) -> StateReader<'a> {
        StateReader::new(self.ledger, self.deriver())
    }

    /// Sign with `payer`, broadcast and wait for `confirmed`.
    pub(crate) async fn send<S: Signer>(
        &self,
        instructions: &[Instruction],
        payer: &S,
    ) -> Result<Signature> {
        let blockhash = self.ledger.get_latest_blockhash().await?;
        let transaction = sign_transaction(instructions, payer, blockhash)?;
        let signature = self.ledger.send_and_confirm(&transaction).await?;
        info!(%signature, instructions = instructions.len(), "transaction confirmed");
        Ok(signature)
    }
}

/// SOL to lamports, rounding down to whole lamports.
pub fn sol_to_lamports(sol: f64) -> Result<u64> {
    if !sol.is_finite() || sol < 0.0 {
        return Err(BidClientError::InvalidAmount(format!("{sol} SOL")));
    }
    let lamports = (sol * LAMPORTS_PER_SOL as f64).floor();
    if lamports >= u64::MAX as f64 {
        return Err(BidClientError::InvalidAmount(format!("{sol} SOL overflows u64 lamports")));
    }
    Ok(lamports as u64)
}

/// Fresh correlation id for one queued computation.
pub fn random_computation_offset() -> u64 {
    OsRng.next_u64()
}
