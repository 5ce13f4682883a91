//! Rescue-Prime counter-mode cipher over GF(2^255 - 19)
//!
//! This is the cipher MXE clusters run on encrypted inputs. The shared
//! secret is hashed with Rescue-Prime (width 12, rate 7) into a 5-lane key,
//! the key is expanded into a round-key schedule with the cipher
//! permutation, and block `b` of the keystream is the permutation of
//! `[nonce, b, 0, 0, 0]` under that schedule. Each value occupies one field
//! element, so five values share one keystream block.
//!
//! Round counts, MDS matrices and round constants are derived at first use
//! from the SHAKE256 seeds below and cached for the process lifetime.

use std::sync::OnceLock;

use num_bigint::BigUint;
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake256;

use super::{CipherBlock, FieldCipher, Nonce, SharedSecret, CIPHER_BLOCK_LEN};

const SECURITY_LEVEL: usize = 128;

const CIPHER_WIDTH: usize = 5;
const CIPHER_SEED: &[u8] = b"encrypt everything, compute anything";

const HASH_WIDTH: usize = 12;
const HASH_CAPACITY: usize = 5;
const HASH_RATE: usize = HASH_WIDTH - HASH_CAPACITY;
const HASH_DIGEST_LEN: usize = 5;

/// Bytes squeezed per sampled field element (32 + 16 to flatten the bias)
const SAMPLE_LEN: usize = 48;

/// Smallest generator of the multiplicative group, used for the MDS matrices
const GENERATOR: u32 = 2;

type Lanes = Vec<BigUint>;

/// Arithmetic modulo p = 2^255 - 19
struct Field {
    p: BigUint,
}

impl Field {
    fn new() -> Self {
        Self {
            p: (BigUint::from(1u8) << 255usize) - 19u32,
        }
    }

    fn element(&self, value: u64) -> BigUint {
        BigUint::from(value) % &self.p
    }

    fn from_le_bytes(&self, bytes: &[u8]) -> BigUint {
        BigUint::from_bytes_le(bytes) % &self.p
    }

    fn add(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a + b) % &self.p
    }

    /// `a - b` for reduced operands.
    fn sub(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a + &self.p - b) % &self.p
    }

    fn mul(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a * b) % &self.p
    }

    fn pow(&self, base: &BigUint, exponent: &BigUint) -> BigUint {
        base.modpow(exponent, &self.p)
    }

    fn inverse(&self, a: &BigUint) -> BigUint {
        a.modpow(&(&self.p - 2u32), &self.p)
    }

    fn add_lanes(&self, a: &[BigUint], b: &[BigUint]) -> Lanes {
        a.iter().zip(b).map(|(x, y)| self.add(x, y)).collect()
    }

    fn mat_vec(&self, matrix: &[Lanes], v: &[BigUint]) -> Lanes {
        matrix
            .iter()
            .map(|row| {
                row.iter()
                    .zip(v)
                    .fold(BigUint::default(), |acc, (a, b)| acc + a * b)
                    % &self.p
            })
            .collect()
    }

    /// Smallest `alpha >= 3` coprime to p - 1, and its inverse mod p - 1.
    fn alphas(&self) -> (u64, BigUint) {
        let order = &self.p - 1u32;
        let mut alpha = 3u64;
        while gcd(alpha, low_word(&(&order % alpha))) != 1 {
            alpha += 1;
        }
        // alpha * d = k * (p - 1) + 1 for some k < alpha
        let inverse = (1..alpha)
            .map(|k| &order * k + 1u32)
            .find(|candidate| low_word(&(candidate % alpha)) == 0)
            .map(|candidate| candidate / alpha)
            .unwrap_or_default();
        (alpha, inverse)
    }

    /// MDS matrix from the reduced row echelon form of a `width x 2*width`
    /// Vandermonde matrix over `GENERATOR`.
    fn mds(&self, width: usize) -> Vec<Lanes> {
        let generator = BigUint::from(GENERATOR);
        let mut rows: Vec<Lanes> = (0..width)
            .map(|i| {
                (0..2 * width)
                    .map(|j| self.pow(&generator, &BigUint::from((i * j) as u64)))
                    .collect()
            })
            .collect();

        let zero = BigUint::default();
        for col in 0..width {
            let Some(pivot) = (col..width).find(|&r| rows[r][col] != zero) else {
                continue;
            };
            rows.swap(col, pivot);
            let scale = self.inverse(&rows[col][col]);
            rows[col] = rows[col].iter().map(|x| self.mul(x, &scale)).collect();
            for r in 0..width {
                if r == col || rows[r][col] == zero {
                    continue;
                }
                let factor = rows[r][col].clone();
                rows[r] = rows[r]
                    .iter()
                    .zip(&rows[col])
                    .map(|(x, y)| self.sub(x, &self.mul(&factor, y)))
                    .collect();
            }
        }

        (0..width)
            .map(|i| (0..width).map(|j| rows[j][width + i].clone()).collect())
            .collect()
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn low_word(value: &BigUint) -> u64 {
    value.to_u64_digits().first().copied().unwrap_or(0)
}

fn binomial(n: usize, k: usize) -> BigUint {
    (1..=k).fold(BigUint::from(1u8), |acc, i| acc * (n - k + i) / i)
}

/// Cipher rounds for a state of `width` lanes: twice the max of the
/// statistical bound, the interpolation bound and 5.
fn cipher_rounds(width: usize, alpha: u64, field_bits: u64) -> usize {
    let security = SECURITY_LEVEL as f64;
    let m = width as f64;
    let sbox_bits = field_bits as f64 - ((alpha - 1) as f64).log2();
    let l0 = (2.0 * security / ((m + 1.0) * sbox_bits)).ceil();
    let l1 = if alpha == 3 {
        ((security + 2.0) / (4.0 * m)).ceil()
    } else {
        ((security + 3.0) / (5.5 * m)).ceil()
    };
    2 * (l0 as usize).max(l1 as usize).max(5)
}

/// Hash rounds: 1.5x the first round count whose Groebner-basis cost
/// exceeds 2^(2 * security), floored at 5.
fn hash_rounds(alpha: u64) -> usize {
    let bound = BigUint::from(1u8) << (2 * SECURITY_LEVEL);
    let alpha = alpha as usize;
    let rounds = (1..25)
        .find(|&n| {
            let dcon = (alpha - 1) * HASH_WIDTH * (n - 1) / 2 + 2;
            let v = HASH_WIDTH * (n - 1) + HASH_RATE;
            let cost = binomial(v + dcon, v);
            &cost * &cost > bound
        })
        .unwrap_or(25);
    (3 * rounds.max(5)).div_ceil(2)
}

/// Field elements squeezed from SHAKE256(seed).
fn sample(field: &Field, seed: &[u8], count: usize) -> Lanes {
    let mut hasher = Shake256::default();
    hasher.update(seed);
    let mut reader = hasher.finalize_xof();
    let mut buf = [0u8; SAMPLE_LEN];
    (0..count)
        .map(|_| {
            reader.read(&mut buf);
            field.from_le_bytes(&buf)
        })
        .collect()
}

/// One Rescue permutation: S-box exponents alternate between rounds.
struct Permutation {
    mds: Vec<Lanes>,
    exponents: [BigUint; 2],
}

impl Permutation {
    /// Every intermediate state, one per key; the last is the output.
    fn trace(&self, field: &Field, keys: &[Lanes], input: &[BigUint]) -> Vec<Lanes> {
        let Some((first, rest)) = keys.split_first() else {
            return vec![input.to_vec()];
        };
        let mut states = Vec::with_capacity(keys.len());
        let mut state = field.add_lanes(input, first);
        for (round, key) in rest.iter().enumerate() {
            let exponent = &self.exponents[round % 2];
            let boxed: Lanes = state.iter().map(|x| field.pow(x, exponent)).collect();
            let next = field.add_lanes(&field.mat_vec(&self.mds, &boxed), key);
            states.push(std::mem::replace(&mut state, next));
        }
        states.push(state);
        states
    }

    fn permute(&self, field: &Field, keys: &[Lanes], input: &[BigUint]) -> Lanes {
        self.trace(field, keys, input).pop().unwrap_or_default()
    }
}

struct Rescue {
    field: Field,
    cipher: Permutation,
    cipher_constants: Vec<Lanes>,
    hash: Permutation,
    hash_keys: Vec<Lanes>,
}

static PARAMS: OnceLock<Rescue> = OnceLock::new();

impl Rescue {
    fn get() -> &'static Rescue {
        PARAMS.get_or_init(Rescue::new)
    }

    fn new() -> Self {
        let field = Field::new();
        let (alpha, alpha_inverse) = field.alphas();
        let alpha_big = BigUint::from(alpha);

        let rounds = cipher_rounds(CIPHER_WIDTH, alpha, field.p.bits());
        let samples = sample(&field, CIPHER_SEED, CIPHER_WIDTH * CIPHER_WIDTH + 2 * CIPHER_WIDTH);
        let (matrix, rest) = samples.split_at(CIPHER_WIDTH * CIPHER_WIDTH);
        let (initial, affine) = rest.split_at(CIPHER_WIDTH);
        let matrix: Vec<Lanes> = matrix.chunks(CIPHER_WIDTH).map(<[BigUint]>::to_vec).collect();
        let mut cipher_constants = vec![initial.to_vec()];
        for r in 0..2 * rounds {
            let next = field.add_lanes(&field.mat_vec(&matrix, &cipher_constants[r]), affine);
            cipher_constants.push(next);
        }

        let rounds = hash_rounds(alpha);
        let seed = format!("Rescue-XLIX({},{HASH_WIDTH},{HASH_CAPACITY},{SECURITY_LEVEL})", field.p);
        let samples = sample(&field, seed.as_bytes(), 2 * HASH_WIDTH * rounds);
        let mut hash_keys = vec![vec![BigUint::default(); HASH_WIDTH]];
        hash_keys.extend(samples.chunks(HASH_WIDTH).map(<[BigUint]>::to_vec));

        Self {
            cipher: Permutation {
                mds: field.mds(CIPHER_WIDTH),
                exponents: [alpha_inverse.clone(), alpha_big.clone()],
            },
            cipher_constants,
            hash: Permutation {
                mds: field.mds(HASH_WIDTH),
                exponents: [alpha_big, alpha_inverse],
            },
            hash_keys,
            field,
        }
    }

    /// Rescue-Prime sponge: pad with a single 1 then zeros to the rate.
    fn digest(&self, message: &[BigUint]) -> Lanes {
        let mut padded = message.to_vec();
        padded.push(BigUint::from(1u8));
        while padded.len() % HASH_RATE != 0 {
            padded.push(BigUint::default());
        }

        let mut state = vec![BigUint::default(); HASH_WIDTH];
        for block in padded.chunks(HASH_RATE) {
            for (lane, value) in state.iter_mut().zip(block) {
                *lane = self.field.add(lane, value);
            }
            state = self.hash.permute(&self.field, &self.hash_keys, &state);
        }
        state.truncate(HASH_DIGEST_LEN);
        state
    }

    fn cipher_key(&self, secret: &SharedSecret) -> Lanes {
        self.digest(&[
            self.field.element(1),
            self.field.from_le_bytes(secret.as_bytes()),
            self.field.element(CIPHER_WIDTH as u64),
        ])
    }

    fn key_schedule(&self, secret: &SharedSecret) -> Vec<Lanes> {
        let key = self.cipher_key(secret);
        self.cipher.trace(&self.field, &self.cipher_constants, &key)
    }

    /// Keystream lanes for `count` values under (secret, nonce).
    fn keystream(&self, secret: &SharedSecret, nonce: &Nonce, count: usize) -> Lanes {
        let schedule = self.key_schedule(secret);
        let counter = BigUint::from_bytes_le(nonce);
        (0..count.div_ceil(CIPHER_WIDTH))
            .flat_map(|block| {
                let mut input = vec![BigUint::default(); CIPHER_WIDTH];
                input[0] = counter.clone();
                input[1] = self.field.element(block as u64);
                self.cipher.permute(&self.field, &schedule, &input)
            })
            .take(count)
            .collect()
    }
}

fn to_block(value: &BigUint) -> CipherBlock {
    let mut block = [0u8; CIPHER_BLOCK_LEN];
    let bytes = value.to_bytes_le();
    block[..bytes.len()].copy_from_slice(&bytes);
    block
}

/// Arcium's Rescue cipher keyed by an x25519 shared secret
#[derive(Debug, Clone, Copy, Default)]
pub struct RescueCipher;

impl FieldCipher for RescueCipher {
    fn encrypt(&self, secret: &SharedSecret, nonce: &Nonce, values: &[u64]) -> Vec<CipherBlock> {
        let rescue = Rescue::get();
        let field = &rescue.field;
        rescue
            .keystream(secret, nonce, values.len())
            .iter()
            .zip(values)
            .map(|(mask, value)| to_block(&field.add(&field.element(*value), mask)))
            .collect()
    }

    fn decrypt(
        &self,
        secret: &SharedSecret,
        nonce: &Nonce,
        blocks: &[CipherBlock],
    ) -> Option<Vec<u64>> {
        let rescue = Rescue::get();
        let field = &rescue.field;
        rescue
            .keystream(secret, nonce, blocks.len())
            .iter()
            .zip(blocks)
            .map(|(mask, block)| {
                let cipher = BigUint::from_bytes_le(block);
                if cipher >= field.p {
                    return None;
                }
                let plain = field.sub(&cipher, mask);
                (plain.bits() <= 64).then(|| low_word(&plain))
            })
            .collect()
    }
}
