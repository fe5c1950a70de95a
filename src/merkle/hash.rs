//! Poseidon hash and field encodings shared by the native code and the circuit.
//!
//! Everything that ends up inside a proof (Merkle nodes, nullifiers) is hashed
//! with the same Poseidon configuration the circuit uses, so a value computed
//! here can be re-derived in-circuit bit for bit.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    poseidon::{PoseidonConfig, PoseidonSponge},
    CryptographicSponge,
};
use ark_ff::{Field, PrimeField};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::vec::Vec;
use sha2::{Digest, Sha256};

/// Size of a compressed BN254 scalar.
pub const FIELD_BYTES: usize = 32;

// Poseidon instance: width 3 (rate 2, capacity 1), x^5 S-box.
const FULL_ROUNDS: usize = 8;
const PARTIAL_ROUNDS: usize = 57;
const ALPHA: u64 = 5;
const RATE: usize = 2;
const CAPACITY: usize = 1;
const ROUND_CONSTANT_STEP: u64 = 0x9e37_79b9_7f4a_7c15;

/// Poseidon sponge over the BN254 scalar field.
#[derive(Clone)]
pub struct PoseidonHasher {
    config: PoseidonConfig<Fr>,
}

impl PoseidonHasher {
    pub fn new() -> Self {
        let width = RATE + CAPACITY;
        Self {
            config: PoseidonConfig {
                full_rounds: FULL_ROUNDS,
                partial_rounds: PARTIAL_ROUNDS,
                alpha: ALPHA,
                ark: round_constants(width),
                mds: cauchy_mds(width),
                rate: RATE,
                capacity: CAPACITY,
            },
        }
    }

    /// Two-to-one compression used for Merkle nodes.
    pub fn hash_two(&self, left: &Fr, right: &Fr) -> Fr {
        self.hash_many(&[*left, *right])
    }

    pub fn hash_many(&self, elements: &[Fr]) -> Fr {
        let mut sponge = PoseidonSponge::new(&self.config);
        elements.iter().for_each(|element| sponge.absorb(element));
        sponge.squeeze_field_elements::<Fr>(1)[0]
    }

    /// Parameters shared with the in-circuit sponge gadget.
    pub fn config(&self) -> &PoseidonConfig<Fr> {
        &self.config
    }
}

impl Default for PoseidonHasher {
    fn default() -> Self {
        Self::new()
    }
}

fn round_constants(width: usize) -> Vec<Vec<Fr>> {
    (0..FULL_ROUNDS + PARTIAL_ROUNDS)
        .map(|round| {
            (0..width)
                .map(|lane| {
                    let index = (round * width + lane) as u64;
                    Fr::from(index.wrapping_mul(ROUND_CONSTANT_STEP))
                })
                .collect()
        })
        .collect()
}

// Cauchy matrix 1 / (x_i + y_j) with x_i = i + 1, y_j = width + j + 1; the sum
// is never zero.
fn cauchy_mds(width: usize) -> Vec<Vec<Fr>> {
    (0..width)
        .map(|row| {
            (0..width)
                .map(|col| {
                    let sum = Fr::from((row + 1 + width + col + 1) as u64);
                    sum.inverse().unwrap_or(Fr::from(1u64))
                })
                .collect()
        })
        .collect()
}

/// Reduce big-endian bytes into the field.
pub fn bytes_to_field(bytes: &[u8]) -> Fr {
    Fr::from_be_bytes_mod_order(bytes)
}

/// SHA-256 a string label into the scalar field.
///
/// Used for region codes, job identifiers and domain tags, none of which need
/// to be hashed in-circuit.
pub fn label_to_field(label: &str) -> Fr {
    let digest = Sha256::digest(label.as_bytes());
    Fr::from_be_bytes_mod_order(&digest)
}

/// Canonical compressed encoding of a field element.
pub fn field_to_bytes(value: &Fr) -> [u8; FIELD_BYTES] {
    let mut bytes = [0u8; FIELD_BYTES];
    // A BN254 scalar always compresses to exactly 32 bytes.
    let _ = value.serialize_compressed(&mut bytes[..]);
    bytes
}

/// Decode a canonical compressed field element.
pub fn field_from_bytes(bytes: &[u8]) -> Result<Fr, ark_serialize::SerializationError> {
    Fr::deserialize_compressed(bytes)
}

/// Hex form of [`field_to_bytes`].
pub fn field_to_hex(value: &Fr) -> String {
    hex::encode(field_to_bytes(value))
}

/// Inverse of [`field_to_hex`].
pub fn hex_to_field(hex_str: &str) -> Result<Fr, FieldDecodeError> {
    let bytes = hex::decode(hex_str)?;
    Ok(field_from_bytes(&bytes)?)
}

/// Errors decoding a hex-encoded field element.
#[derive(Debug, thiserror::Error)]
pub enum FieldDecodeError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("not a canonical field element: {0}")]
    Field(#[from] ark_serialize::SerializationError),
}
