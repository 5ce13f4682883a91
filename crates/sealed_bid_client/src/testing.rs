//! Test doubles: a virtual clock and an in-memory ledger that plays the MXE.
//!
//! The fake ledger holds the MXE's x25519 secret, so it can decrypt
//! submissions exactly like the cluster would, run the max-bid selection and
//! write the callback records. Every queued instruction opens its
//! computation account and the callback closes it. Callbacks can be delayed
//! (or withheld) and reads can fail transiently to exercise the polling
//! paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anchor_lang::prelude::Pubkey;
use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::cipher::{CipherBlock, FieldCipher, RescueCipher, SharedSecret};
use crate::codec::{
    account_discriminator, concat_fixed, encode_u64_le, identity_chunks, identity_from_chunks,
    IDENTITY_CHUNKS,
};
use crate::config::ClientConfig;
use crate::error::{BidClientError, Result};
use crate::instructions::submit_bid::{BID_FIELD_COUNT, CARRIED_SLOTS};
use crate::instructions::{ledger_discriminators, mxe_discriminators};
use crate::pda::AddressDeriver;
use crate::retry::Clock;
use crate::rpc::LedgerClient;
use crate::state::mxe::encode_mxe_account;
use crate::state::{AuctionBidState, AuctionResult};

pub const REVEALED_AT: i64 = 1_767_225_600;

#[derive(Default)]
pub struct FakeClock {
    now: Mutex<Duration>,
    sleeps: AtomicU32,
}

impl FakeClock {
    pub fn sleeps(&self) -> u32 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn elapsed(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

/// Failure returned by the next `send_and_confirm`
pub enum Injected {
    Rejected(String),
    /// Nothing reached the ledger
    Transport(String),
    /// Sent, confirmation never observed; nothing is applied
    Unconfirmed(String),
}

/// Account writes; `None` closes the account
type Writes = Vec<(Pubkey, Option<Vec<u8>>)>;

/// Writes applied together once `trigger` has been read often enough
struct Callback {
    trigger: Pubkey,
    writes: Writes,
}

struct Pending {
    callback: Callback,
    reads_left: u32,
}

struct Inner {
    accounts: HashMap<Pubkey, Vec<u8>>,
    pending: Vec<Pending>,
    sent: Vec<(Pubkey, [u8; 8])>,
    injected: VecDeque<Injected>,
    /// Reads of the watched account before an MPC callback lands; `None`
    /// withholds callbacks entirely
    callback_delay: Option<u32>,
    state_nonce: u128,
    escrows: HashMap<Pubkey, u64>,
    computations: HashSet<Pubkey>,
    /// (reads to let through, reads to fail) per address
    read_faults: HashMap<Pubkey, (u32, u32)>,
    computation_read_faults: u32,
}

pub struct FakeLedger {
    deriver: AddressDeriver,
    mxe_secret: StaticSecret,
    state_key: SharedSecret,
    inner: Mutex<Inner>,
}

/// Effects of one transaction, committed only if every instruction succeeds
struct Work {
    accounts: HashMap<Pubkey, Vec<u8>>,
    computations: Vec<Pubkey>,
    callbacks: Vec<Callback>,
    escrows: Vec<(Pubkey, u64)>,
}

fn apply(accounts: &mut HashMap<Pubkey, Vec<u8>>, writes: Writes) {
    for (address, data) in writes {
        match data {
            Some(data) => accounts.insert(address, data),
            None => accounts.remove(&address),
        };
    }
}

impl FakeLedger {
    pub fn new(config: &ClientConfig) -> Self {
        let ledger = Self::without_mxe_key(config);
        let public = PublicKey::from(&ledger.mxe_secret).to_bytes();
        let mxe_account = ledger.deriver.mxe_account();
        ledger.put_account(
            mxe_account,
            encode_mxe_account(Some(config.cluster_offset), None, public, None),
        );
        ledger
    }

    /// No MXE account published yet (keygen not started).
    pub fn without_mxe_key(config: &ClientConfig) -> Self {
        let mut state_key = [0u8; 32];
        OsRng.fill_bytes(&mut state_key);
        Self {
            deriver: AddressDeriver::new(config),
            mxe_secret: StaticSecret::random_from_rng(OsRng),
            state_key: SharedSecret::from_bytes(state_key),
            inner: Mutex::new(Inner {
                accounts: HashMap::new(),
                pending: Vec::new(),
                sent: Vec::new(),
                injected: VecDeque::new(),
                callback_delay: Some(0),
                state_nonce: 1,
                escrows: HashMap::new(),
                computations: HashSet::new(),
                read_faults: HashMap::new(),
                computation_read_faults: 0,
            }),
        }
    }

    pub fn set_callback_delay(&self, delay: Option<u32>) {
        self.lock().callback_delay = delay;
    }

    pub fn inject(&self, failure: Injected) {
        self.lock().injected.push_back(failure);
    }

    pub fn put_account(&self, address: Pubkey, data: Vec<u8>) {
        self.lock().accounts.insert(address, data);
    }

    /// Land `data` at `address` after `reads` reads of it.
    pub fn schedule(&self, address: Pubkey, data: Vec<u8>, reads: u32) {
        self.lock().pending.push(Pending {
            callback: Callback {
                trigger: address,
                writes: vec![(address, Some(data))],
            },
            reads_left: reads,
        });
    }

    /// Let `skip` reads of `address` through, then fail `count` of them
    /// with a transport error.
    pub fn fail_reads(&self, address: Pubkey, skip: u32, count: u32) {
        self.lock().read_faults.insert(address, (skip, count));
    }

    /// Fail the next `count` reads of any computation account.
    pub fn fail_computation_reads(&self, count: u32) {
        self.lock().computation_read_faults = count;
    }

    pub fn count_sent(&self, discriminator: [u8; 8]) -> usize {
        self.lock().sent.iter().filter(|(_, d)| *d == discriminator).count()
    }

    pub fn sent(&self) -> Vec<[u8; 8]> {
        self.lock().sent.iter().map(|(_, d)| *d).collect()
    }

    pub fn escrow(&self, address: &Pubkey) -> Option<u64> {
        self.lock().escrows.get(address).copied()
    }

    /// Bid state record as the MXE would write it, for seeding tests.
    pub fn sealed_state(&self, auction: &Pubkey, bid_count: u64, max: u64, winner: Pubkey) -> Vec<u8> {
        let nonce = {
            let mut inner = self.lock();
            inner.state_nonce += 1;
            inner.state_nonce
        };
        self.seal(auction, bid_count, nonce, max, winner).encode()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Open the computation account `accounts[5]` for the queued offset.
    fn open_computation(&self, work: &mut Work, accounts: &[Pubkey], data: &[u8]) -> Result<Pubkey> {
        let offset = u64::from_le_bytes(data[8..16].try_into().unwrap());
        let computation = accounts[5];
        if computation != self.deriver.computation(offset) {
            return Err(BidClientError::rejected("ConstraintSeeds: computation_account"));
        }
        if work.accounts.contains_key(&computation) {
            return Err(BidClientError::rejected(format!(
                "Allocate: account Address {{ address: {computation}, base: None }} already in use"
            )));
        }
        let record = concat_fixed(&[
            &account_discriminator("ComputationAccount"),
            &encode_u64_le(offset),
        ]);
        work.accounts.insert(computation, record);
        work.computations.push(computation);
        Ok(computation)
    }

    fn seal(&self, auction: &Pubkey, bid_count: u64, nonce: u128, max: u64, winner: Pubkey) -> AuctionBidState {
        let mut values = vec![max];
        values.extend_from_slice(&identity_chunks(&winner));
        let blocks = RescueCipher.encrypt(&self.state_key, &nonce.to_le_bytes(), &values);

        let mut encrypted_winner = [[0u8; 32]; IDENTITY_CHUNKS];
        encrypted_winner.copy_from_slice(&blocks[1..]);
        AuctionBidState {
            auction_id: *auction,
            bid_count,
            encrypted_max_bid: blocks[0],
            encrypted_winner,
            nonce,
            bump: Pubkey::find_program_address(
                &[AuctionBidState::SEED, auction.as_ref()],
                &self.deriver.mxe_program,
            )
            .1,
        }
    }

    fn open(&self, state: &AuctionBidState) -> (u64, Pubkey) {
        if !state.has_bids() {
            return (0, Pubkey::default());
        }
        let mut blocks = vec![state.encrypted_max_bid];
        blocks.extend_from_slice(&state.encrypted_winner);
        let values = RescueCipher
            .decrypt(&self.state_key, &state.nonce.to_le_bytes(), &blocks)
            .expect("state sealed by this fake");
        let mut chunks = [0u64; IDENTITY_CHUNKS];
        chunks.copy_from_slice(&values[1..]);
        (values[0], identity_from_chunks(chunks))
    }

    fn load_state(work: &Work, address: &Pubkey) -> Result<AuctionBidState> {
        let data = work
            .accounts
            .get(address)
            .ok_or_else(|| BidClientError::rejected("AccountNotInitialized: auction_bid_state"))?;
        AuctionBidState::decode(data)
    }

    fn execute(
        &self,
        inner: &mut Inner,
        work: &mut Work,
        program: &Pubkey,
        accounts: &[Pubkey],
        data: &[u8],
    ) -> Result<()> {
        let mut discriminator = [0u8; 8];
        discriminator.copy_from_slice(&data[..8]);

        if *program == self.deriver.ledger_program {
            if discriminator == ledger_discriminators::LOCK_BID_FUNDS {
                let amount = u64::from_le_bytes(data[8..16].try_into().unwrap());
                work.escrows.push((accounts[2], amount));
            }
            return Ok(());
        }
        assert_eq!(*program, self.deriver.mxe_program, "unexpected program");

        match discriminator {
            mxe_discriminators::INIT_AUCTION_STATE => {
                let bid_state = accounts[1];
                if work.accounts.contains_key(&bid_state) {
                    return Err(BidClientError::rejected(format!(
                        "Allocate: account Address {{ address: {bid_state}, base: None }} already in use"
                    )));
                }
                let auction = Pubkey::new_from_array(data[8..40].try_into().unwrap());
                assert_eq!(bid_state, self.deriver.bid_state(&auction));
                inner.state_nonce += 1;
                let state = self.seal(&auction, 0, inner.state_nonce, 0, Pubkey::default());
                work.accounts.insert(bid_state, state.encode());
            }
            mxe_discriminators::SUBMIT_BID => {
                let computation = self.open_computation(work, accounts, data)?;
                let ephemeral: [u8; 32] = data[16..48].try_into().unwrap();
                let nonce: [u8; 16] = data[48..64].try_into().unwrap();
                let mut blocks: Vec<CipherBlock> = data[64..]
                    .chunks(32)
                    .map(|c| <[u8; 32]>::try_from(c).unwrap())
                    .collect();
                assert_eq!(blocks.len(), BID_FIELD_COUNT);

                let state = Self::load_state(work, &accounts[12])?;
                let secret = SharedSecret::from_bytes(
                    self.mxe_secret
                        .diffie_hellman(&PublicKey::from(ephemeral))
                        .to_bytes(),
                );

                if state.has_bids() {
                    let mut carried = vec![state.encrypted_max_bid];
                    carried.extend_from_slice(&state.encrypted_winner);
                    if blocks[..CARRIED_SLOTS] != carried[..] {
                        return Err(BidClientError::rejected("carried ciphertext does not match state"));
                    }
                    let zeros = RescueCipher.encrypt(&secret, &nonce, &[0; CARRIED_SLOTS]);
                    blocks[..CARRIED_SLOTS].copy_from_slice(&zeros);
                }

                let plain = RescueCipher
                    .decrypt(&secret, &nonce, &blocks)
                    .ok_or_else(|| BidClientError::rejected("bid ciphertext does not decrypt"))?;
                assert!(plain[..CARRIED_SLOTS].iter().all(|v| *v == 0));

                let (mut max, mut winner) = self.open(&state);
                let amount = plain[5];
                let bidder = identity_from_chunks(plain[6..10].try_into().unwrap());
                let min_price = plain[10];
                if amount >= min_price && amount > max {
                    max = amount;
                    winner = bidder;
                }

                inner.state_nonce += 1;
                let next = self.seal(&state.auction_id, state.bid_count + 1, inner.state_nonce, max, winner);
                work.callbacks.push(Callback {
                    trigger: computation,
                    writes: vec![(accounts[12], Some(next.encode())), (computation, None)],
                });
            }
            mxe_discriminators::REVEAL_WINNER => {
                let result = accounts[13];
                let queued = inner
                    .pending
                    .iter()
                    .any(|p| p.callback.writes.iter().any(|(address, _)| *address == result));
                if work.accounts.contains_key(&result) || queued {
                    return Err(BidClientError::rejected("Error: auction already revealed"));
                }
                let computation = self.open_computation(work, accounts, data)?;
                let state = Self::load_state(work, &accounts[12])?;
                let (max, winner) = self.open(&state);
                let bump = Pubkey::find_program_address(
                    &[AuctionResult::SEED, state.auction_id.as_ref()],
                    &self.deriver.mxe_program,
                )
                .1;
                let placeholder = AuctionResult {
                    auction_id: state.auction_id,
                    revealed: false,
                    winner: Pubkey::default(),
                    winning_amount: 0,
                    revealed_at: 0,
                    bump,
                };
                let revealed = AuctionResult {
                    revealed: true,
                    winner,
                    winning_amount: max,
                    revealed_at: REVEALED_AT,
                    ..placeholder.clone()
                };
                work.accounts.insert(result, placeholder.encode());
                work.callbacks.push(Callback {
                    trigger: result,
                    writes: vec![(result, Some(revealed.encode())), (computation, None)],
                });
            }
            other => panic!("unexpected MXE instruction {other:?}"),
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let mut inner = self.lock();
        if let Some((skip, count)) = inner.read_faults.get_mut(address) {
            if *skip > 0 {
                *skip -= 1;
            } else if *count > 0 {
                *count -= 1;
                return Err(BidClientError::Rpc(format!("connection reset reading {address}")));
            }
        }
        if inner.computation_read_faults > 0 && inner.computations.contains(address) {
            inner.computation_read_faults -= 1;
            return Err(BidClientError::Rpc(format!("connection reset reading {address}")));
        }

        let mut landed = Vec::new();
        inner.pending.retain_mut(|pending| {
            if pending.callback.trigger != *address {
                return true;
            }
            if pending.reads_left == 0 {
                landed.push(std::mem::take(&mut pending.callback.writes));
                return false;
            }
            pending.reads_left -= 1;
            true
        });
        for writes in landed {
            apply(&mut inner.accounts, writes);
        }
        Ok(inner.accounts.get(address).cloned())
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        Ok(Hash::new_unique())
    }

    async fn send_and_confirm(&self, transaction: &Transaction) -> Result<Signature> {
        transaction
            .verify()
            .map_err(|e| BidClientError::Signing(e.to_string()))?;

        let mut inner = self.lock();
        let keys = &transaction.message.account_keys;
        for ix in &transaction.message.instructions {
            let mut discriminator = [0u8; 8];
            discriminator.copy_from_slice(&ix.data[..8]);
            inner.sent.push((keys[ix.program_id_index as usize], discriminator));
        }

        let signature = transaction.signatures[0];
        match inner.injected.pop_front() {
            Some(Injected::Rejected(message)) => return Err(BidClientError::rejected(message)),
            Some(Injected::Transport(message)) => return Err(BidClientError::Rpc(message)),
            Some(Injected::Unconfirmed(message)) => {
                return Err(BidClientError::Unconfirmed { signature, message })
            }
            None => {}
        }

        let mut work = Work {
            accounts: inner.accounts.clone(),
            computations: Vec::new(),
            callbacks: Vec::new(),
            escrows: Vec::new(),
        };
        for ix in &transaction.message.instructions {
            let program = keys[ix.program_id_index as usize];
            let accounts: Vec<Pubkey> = ix.accounts.iter().map(|i| keys[*i as usize]).collect();
            self.execute(&mut inner, &mut work, &program, &accounts, &ix.data)?;
        }

        match inner.callback_delay {
            Some(0) => {
                for callback in work.callbacks.drain(..) {
                    apply(&mut work.accounts, callback.writes);
                }
            }
            Some(reads) => {
                for callback in work.callbacks.drain(..) {
                    inner.pending.push(Pending {
                        callback,
                        reads_left: reads,
                    });
                }
            }
            None => {}
        }
        inner.accounts = work.accounts;
        inner.computations.extend(work.computations);
        inner.escrows.extend(work.escrows);

        Ok(signature)
    }
}
