//! Groth16 proof generation for the eligibility circuit.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{rngs::StdRng, SeedableRng};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

use crate::circuit::EligibilityCircuit;
use crate::inputs::{CircuitInputs, Requirement};
use crate::merkle::tree::REGION_TREE_DEPTH;
use crate::model::VerificationKeyRef;

pub type ProverResult<T> = Result<T, ProverError>;

/// Errors that can occur while producing an eligibility proof.
#[derive(Debug, thiserror::Error)]
pub enum ProverError {
    #[error("not eligible: {}", format_unmet(.unmet))]
    NotEligible { unmet: Vec<Requirement> },

    #[error("proving backend unavailable: {0}")]
    ProvingBackendUnavailable(String),

    #[error("proof generation exceeded its {0:?} deadline")]
    VerificationTimeout(Duration),

    #[error("Trusted setup failed: {0}")]
    SetupFailed(String),

    #[error("Proof generation failed: {0}")]
    ProofGenerationFailed(String),

    #[error("backend returned public outputs that do not match the request: {0}")]
    PublicOutputMismatch(String),

    #[error("invalid profile or job: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProverError {
    /// Transient failures the caller may retry from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProverError::ProvingBackendUnavailable(_) | ProverError::VerificationTimeout(_)
        )
    }
}

fn format_unmet(unmet: &[Requirement]) -> String {
    unmet
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A Groth16 proof plus the instance it was produced for.
#[derive(Clone)]
pub struct SnarkProof {
    pub proof: ark_groth16::Proof<Bn254>,
    pub public_inputs: Vec<Fr>,
}

impl SnarkProof {
    /// Compressed proof bytes; the instance travels separately.
    pub fn proof_bytes(&self) -> ProverResult<Vec<u8>> {
        proof_to_bytes(&self.proof)
    }
}

fn compressed<T: CanonicalSerialize>(value: &T) -> ProverResult<Vec<u8>> {
    let mut bytes = Vec::with_capacity(value.compressed_size());
    value
        .serialize_compressed(&mut bytes)
        .map_err(|e| ProverError::SerializationError(e.to_string()))?;
    Ok(bytes)
}

pub fn proof_to_bytes(proof: &ark_groth16::Proof<Bn254>) -> ProverResult<Vec<u8>> {
    compressed(proof)
}

pub fn proof_from_bytes(bytes: &[u8]) -> ProverResult<ark_groth16::Proof<Bn254>> {
    ark_groth16::Proof::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ProverError::SerializationError(e.to_string()))
}

/// Prover for eligibility proofs.
pub struct EligibilityProver {
    proving_key: ProvingKey<Bn254>,
    /// Region tree depth the circuit was compiled for.
    depth: usize,
    vk_ref: VerificationKeyRef,
}

impl EligibilityProver {
    /// Perform trusted setup with fresh randomness.
    ///
    /// This generates the proving and verifying keys. A real deployment runs
    /// a multi-party ceremony instead.
    pub fn setup() -> ProverResult<(Self, VerifyingKey<Bn254>)> {
        let mut rng = StdRng::from_entropy();
        Self::setup_with_rng(&mut rng)
    }

    /// Deterministic setup for development and tests. NOT secure.
    pub fn setup_with_seed(seed: u64) -> ProverResult<(Self, VerifyingKey<Bn254>)> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::setup_with_rng(&mut rng)
    }

    fn setup_with_rng(rng: &mut StdRng) -> ProverResult<(Self, VerifyingKey<Bn254>)> {
        let circuit = EligibilityCircuit::new_empty();

        let (proving_key, vk) = Groth16::<Bn254>::circuit_specific_setup(circuit, rng)
            .map_err(|e| ProverError::SetupFailed(e.to_string()))?;

        let vk_ref = verification_key_ref(&vk)?;
        Ok((
            Self {
                proving_key,
                depth: REGION_TREE_DEPTH,
                vk_ref,
            },
            vk,
        ))
    }

    /// Generate a proof for the given inputs.
    ///
    /// The `eligible` output is whatever the inputs actually satisfy; the
    /// circuit does not let the prover claim otherwise.
    pub fn prove(&self, inputs: &CircuitInputs) -> ProverResult<SnarkProof> {
        let eligible = inputs.is_eligible();
        let circuit = EligibilityCircuit::from_inputs(inputs, eligible)
            .map_err(|e| ProverError::SerializationError(e.to_string()))?;

        if circuit.depth() != self.depth {
            return Err(ProverError::ProofGenerationFailed(format!(
                "region path has depth {}, keys were built for {}",
                circuit.depth(),
                self.depth
            )));
        }

        let public_inputs = inputs
            .public
            .instance(eligible)
            .map_err(|e| ProverError::SerializationError(e.to_string()))?;

        let mut rng = StdRng::from_entropy();
        let proof = Groth16::<Bn254>::prove(&self.proving_key, circuit, &mut rng)
            .map_err(|e| ProverError::ProofGenerationFailed(e.to_string()))?;

        Ok(SnarkProof {
            proof,
            public_inputs,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn verification_key_ref(&self) -> &VerificationKeyRef {
        &self.vk_ref
    }

    /// Write the proving key, prefixed with the region tree depth as a
    /// little-endian `u32`.
    pub fn save_proving_key(&self, path: &Path) -> ProverResult<()> {
        let mut file = (self.depth as u32).to_le_bytes().to_vec();
        file.extend(compressed(&self.proving_key)?);
        std::fs::write(path, file)?;
        Ok(())
    }

    pub fn load_proving_key(path: &Path) -> ProverResult<Self> {
        let bytes = std::fs::read(path)?;
        if bytes.len() < 4 {
            return Err(ProverError::SerializationError(
                "proving key file is truncated".into(),
            ));
        }
        let (header, body) = bytes.split_at(4);
        let depth = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if depth != REGION_TREE_DEPTH {
            return Err(ProverError::SerializationError(format!(
                "proving key built for depth {depth}, expected {REGION_TREE_DEPTH}"
            )));
        }
        let proving_key = ProvingKey::<Bn254>::deserialize_compressed(body)
            .map_err(|e| ProverError::SerializationError(e.to_string()))?;
        let vk_ref = verification_key_ref(&proving_key.vk)?;

        Ok(Self {
            proving_key,
            depth,
            vk_ref,
        })
    }
}

/// Content address of a verifying key: hex SHA-256 of its compressed form.
pub fn verification_key_ref(vk: &VerifyingKey<Bn254>) -> ProverResult<VerificationKeyRef> {
    let digest = Sha256::digest(compressed(vk)?);
    Ok(VerificationKeyRef(format!("groth16-bn254:{}", hex::encode(digest))))
}

pub fn save_verifying_key(vk: &VerifyingKey<Bn254>, path: &Path) -> ProverResult<()> {
    std::fs::write(path, compressed(vk)?)?;
    Ok(())
}

pub fn load_verifying_key(path: &Path) -> ProverResult<VerifyingKey<Bn254>> {
    let bytes = std::fs::read(path)?;
    VerifyingKey::deserialize_compressed(bytes.as_slice())
        .map_err(|e| ProverError::SerializationError(e.to_string()))
}
