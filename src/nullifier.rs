//! Per-job applicant pseudonyms.
//!
//! `nullifier = Poseidon(domain, job_id, secret)`. The same secret applying to
//! the same job always lands on the same nullifier, which is what lets the
//! ledger refuse a second application; a different job gives an unrelated
//! field element, so nullifiers cannot be joined across postings.
//!
//! Derivation is a pure function of `(job_id, secret)` for every backend.
//! Nothing time-dependent is ever mixed in, otherwise duplicate detection
//! would silently stop working.

use ark_bn254::Fr;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::merkle::hash::{
    bytes_to_field, field_from_bytes, field_to_bytes, label_to_field, PoseidonHasher, FIELD_BYTES,
};
use crate::model::JobId;

const NULLIFIER_DOMAIN: &str = "ghosthire/nullifier/v1";

/// Domain tag absorbed first by both the native and in-circuit derivation.
pub fn nullifier_domain() -> Fr {
    label_to_field(NULLIFIER_DOMAIN)
}

/// Random token held only by the applicant.
#[derive(Clone, PartialEq, Eq)]
pub struct ApplicantSecret([u8; 32]);

impl ApplicantSecret {
    /// Draw a fresh secret from the OS-seeded thread RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The secret reduced into the scalar field, as the circuit sees it.
    pub fn to_field(&self) -> Fr {
        bytes_to_field(&self.0)
    }
}

impl fmt::Debug for ApplicantSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApplicantSecret(<redacted>)")
    }
}

impl Serialize for ApplicantSecret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for ApplicantSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(serde::de::Error::custom)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("applicant secret must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

/// One-way pseudonym for an `(applicant, job)` pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nullifier([u8; FIELD_BYTES]);

impl Nullifier {
    pub fn from_field(value: &Fr) -> Self {
        Self(field_to_bytes(value))
    }

    pub fn to_field(&self) -> Result<Fr, ark_serialize::SerializationError> {
        field_from_bytes(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; FIELD_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nullifier({})", self.to_hex())
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Nullifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Nullifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(serde::de::Error::custom)?;
        let bytes: [u8; FIELD_BYTES] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("nullifier must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

/// Derives nullifiers with a shared Poseidon instance.
#[derive(Clone, Default)]
pub struct NullifierDeriver {
    hasher: PoseidonHasher,
}

impl NullifierDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field form of the nullifier, the value bound into the proof.
    pub fn derive_field(&self, job_id: &JobId, secret: &ApplicantSecret) -> Fr {
        self.hasher
            .hash_many(&[nullifier_domain(), job_id.to_field(), secret.to_field()])
    }

    pub fn derive(&self, job_id: &JobId, secret: &ApplicantSecret) -> Nullifier {
        Nullifier::from_field(&self.derive_field(job_id, secret))
    }
}

/// Convenience wrapper around [`NullifierDeriver::derive`].
pub fn derive(job_id: &JobId, secret: &ApplicantSecret) -> Nullifier {
    NullifierDeriver::new().derive(job_id, secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn job(posting: &str) -> JobId {
        JobId::new(posting, 1)
    }

    #[test]
    fn test_derive_is_deterministic() {
        let secret = ApplicantSecret::from_bytes([7u8; 32]);
        let first = derive(&job("acme-rust"), &secret);
        let second = derive(&job("acme-rust"), &secret);
        assert_eq!(first, second);
    }

    #[test]
    fn test_different_secrets_differ() {
        let a = derive(&job("acme-rust"), &ApplicantSecret::from_bytes([1u8; 32]));
        let b = derive(&job("acme-rust"), &ApplicantSecret::from_bytes([2u8; 32]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_job_versions_differ() {
        let secret = ApplicantSecret::from_bytes([3u8; 32]);
        let v1 = derive(&JobId::new("acme-rust", 1), &secret);
        let v2 = derive(&JobId::new("acme-rust", 2), &secret);
        assert_ne!(v1, v2);
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = ApplicantSecret::from_bytes([0xab; 32]);
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("abab"));
    }

    #[test]
    fn test_serde_roundtrip() {
        let nullifier = derive(&job("acme-rust"), &ApplicantSecret::generate());
        let json = serde_json::to_string(&nullifier).unwrap();
        let back: Nullifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, nullifier);
        assert!(back.to_field().is_ok());
    }

    fn shared_prefix(a: &[u8], b: &[u8]) -> usize {
        a.iter().zip(b).take_while(|(x, y)| x == y).count()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_unlinkable_across_jobs(
            secret in any::<[u8; 32]>(),
            first in "[a-z]{4,12}",
            second in "[a-z]{4,12}",
        ) {
            prop_assume!(first != second);
            let secret = ApplicantSecret::from_bytes(secret);
            let a = derive(&job(&first), &secret);
            let b = derive(&job(&second), &secret);

            prop_assert_ne!(a, b);
            // A shared prefix or suffix longer than a few bytes would be a correlation handle.
            prop_assert!(shared_prefix(a.as_bytes(), b.as_bytes()) < 4);
            let (mut ra, mut rb) = (a.as_bytes().to_vec(), b.as_bytes().to_vec());
            ra.reverse();
            rb.reverse();
            prop_assert!(shared_prefix(&ra, &rb) < 4);
        }

        #[test]
        fn prop_deterministic(secret in any::<[u8; 32]>(), posting in "[a-z]{1,16}") {
            let secret = ApplicantSecret::from_bytes(secret);
            prop_assert_eq!(derive(&job(&posting), &secret), derive(&job(&posting), &secret));
        }
    }
}
