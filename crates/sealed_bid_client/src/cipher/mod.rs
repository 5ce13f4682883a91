//! Ephemeral key agreement and field encryption
//!
//! Each submission derives its own `SharedContext`: a fresh x25519 secret is
//! generated, agreed with the MXE's published key and dropped on the spot, so
//! private key material never outlives a single call.
//!
//! Field values are encrypted one cipher block per value. The value's index
//! selects its keystream lane, so the order of `values` is part of the wire
//! contract with the MPC circuit.

mod rescue;

use std::collections::HashSet;

use anchor_lang::prelude::Pubkey;
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::error::{BidClientError, Result};

pub use rescue::RescueCipher;

pub const CIPHER_BLOCK_LEN: usize = 32;
pub const NONCE_LEN: usize = 16;

/// One encrypted unsigned-integer field
pub type CipherBlock = [u8; CIPHER_BLOCK_LEN];

pub type Nonce = [u8; NONCE_LEN];

/// ECDH output shared between this client and the MXE
#[derive(Clone)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Symmetric cipher over fixed-width field values
///
/// Implemented by `RescueCipher`, the cipher MXE clusters decrypt with.
pub trait FieldCipher: Send + Sync {
    fn encrypt(&self, secret: &SharedSecret, nonce: &Nonce, values: &[u64]) -> Vec<CipherBlock>;

    /// `None` if any block does not decrypt to a u64 (wrong key or nonce).
    fn decrypt(&self, secret: &SharedSecret, nonce: &Nonce, blocks: &[CipherBlock])
        -> Option<Vec<u64>>;
}

/// Key agreement output for one submission
pub struct SharedContext {
    ephemeral_public_key: [u8; 32],
    secret: SharedSecret,
    used_nonces: HashSet<Nonce>,
}

impl SharedContext {
    pub fn ephemeral_public_key(&self) -> [u8; 32] {
        self.ephemeral_public_key
    }

    pub fn secret(&self) -> &SharedSecret {
        &self.secret
    }

    /// Draw a random nonce never used with this context.
    pub fn fresh_nonce(&self) -> Nonce {
        loop {
            let mut nonce = [0u8; NONCE_LEN];
            OsRng.fill_bytes(&mut nonce);
            if !self.used_nonces.contains(&nonce) {
                return nonce;
            }
        }
    }

    /// Encrypt `values` in order, one block each. A nonce can be spent once.
    pub fn encrypt_fields(
        &mut self,
        cipher: &dyn FieldCipher,
        nonce: Nonce,
        values: &[u64],
    ) -> Result<Vec<CipherBlock>> {
        if !self.used_nonces.insert(nonce) {
            return Err(BidClientError::NonceReuse);
        }
        Ok(cipher.encrypt(&self.secret, &nonce, values))
    }
}

/// Agree a fresh shared secret with the MXE's x25519 key.
///
/// An all-zero key means the cluster has not finished keygen yet, which is
/// reported as the retryable `MxeKeyUnavailable`.
pub fn derive_shared_context(
    mxe_program: &Pubkey,
    network_public_key: &[u8; 32],
) -> Result<SharedContext> {
    if network_public_key.iter().all(|b| *b == 0) {
        return Err(BidClientError::MxeKeyUnavailable {
            program: *mxe_program,
        });
    }

    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public_key = PublicKey::from(&ephemeral).to_bytes();
    let shared = ephemeral.diffie_hellman(&PublicKey::from(*network_public_key));

    // low-order point published instead of a real key
    if !shared.was_contributory() {
        return Err(BidClientError::MxeKeyUnavailable {
            program: *mxe_program,
        });
    }

    Ok(SharedContext {
        ephemeral_public_key,
        secret: SharedSecret(shared.to_bytes()),
        used_nonces: HashSet::new(),
    })
}
