//! Ledger transport
//!
//! Orchestrators only see `LedgerClient`; `RpcLedger` is the JSON-RPC
//! implementation. Every read and every confirmation uses the `confirmed`
//! commitment level.

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::Instruction;
use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::signature::{Signature, Signer};
use solana_sdk::transaction::Transaction;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{BidClientError, Result};

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Raw account data, `None` when the account does not exist.
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    async fn get_latest_blockhash(&self) -> Result<Hash>;

    /// Broadcast and wait for `confirmed`. Ledger rejections come back as
    /// `BidClientError::Rejected` with the verbatim error and program logs.
    async fn send_and_confirm(&self, transaction: &Transaction) -> Result<Signature>;
}

pub struct RpcLedger {
    client: RpcClient,
}

impl RpcLedger {
    pub fn new(config: &ClientConfig) -> Self {
        Self::from_client(RpcClient::new_with_commitment(
            config.rpc_url.clone(),
            CommitmentConfig::confirmed(),
        ))
    }

    pub fn from_client(client: RpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get_account_with_commitment(address, self.client.commitment())
            .await
            .map_err(|e| BidClientError::Rpc(e.to_string()))?;
        Ok(response.value.map(|account| account.data))
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| BidClientError::Rpc(e.to_string()))
    }

    async fn send_and_confirm(&self, transaction: &Transaction) -> Result<Signature> {
        let signature = transaction.signatures.first().copied().unwrap_or_default();
        self.client
            .send_and_confirm_transaction(transaction)
            .await
            .map_err(|err| classify_client_error(err, signature))
    }
}

/// Marker of `send_and_confirm_transaction` giving up on confirmation after
/// the transaction was already sent
const UNCONFIRMED_MARKER: &str = "unable to confirm transaction";

/// Split transport failures from ledger rejections. Simulation logs are
/// appended to the message since duplicate-init text only shows up there.
fn classify_client_error(err: ClientError, signature: Signature) -> BidClientError {
    if let ClientErrorKind::RpcError(RpcError::RpcResponseError {
        data: RpcResponseErrorData::SendTransactionPreflightFailure(simulation),
        ..
    }) = err.kind()
    {
        let mut message = err.to_string();
        if let Some(logs) = &simulation.logs {
            debug!(lines = logs.len(), "preflight logs attached to rejection");
            message.push_str("\nlogs:\n");
            message.push_str(&logs.join("\n"));
        }
        return BidClientError::rejected(message);
    }

    if err.get_transaction_error().is_some() {
        return BidClientError::rejected(err.to_string());
    }

    if let ClientErrorKind::RpcError(RpcError::ForUser(message)) = err.kind() {
        if message.contains(UNCONFIRMED_MARKER) {
            return BidClientError::Unconfirmed {
                signature,
                message: message.clone(),
            };
        }
    }

    BidClientError::Rpc(err.to_string())
}

/// Build a legacy transaction paid and signed by `payer`.
pub fn sign_transaction<S: Signer>(
    instructions: &[Instruction],
    payer: &S,
    blockhash: Hash,
) -> Result<Transaction> {
    let mut transaction = Transaction::new_with_payer(instructions, Some(&payer.pubkey()));
    transaction
        .try_sign(&[payer], blockhash)
        .map_err(|e| BidClientError::Signing(e.to_string()))?;
    Ok(transaction)
}
