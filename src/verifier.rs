//! Proof verification for eligibility proofs.
//!
//! Verification is a pure function of the proof, the published job and the
//! verifying key. Nothing here touches ledger state.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, VerifyingKey};
use ark_snark::SNARK;

use crate::backend::simulated;
use crate::inputs::public_instance;
use crate::model::{CircuitId, EligibilityProof, Job, ProofSystem, VerificationKeyRef};
use crate::prover::{proof_from_bytes, verification_key_ref};

/// Result type for verifier operations.
pub type VerifierResult<T> = Result<T, VerifierError>;

/// Errors that can occur during verification.
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Invalid proof format: {0}")]
    InvalidProof(String),

    #[error("proof targets circuit {found}, expected {expected}")]
    CircuitMismatch { expected: CircuitId, found: CircuitId },

    #[error("proof was made for verifying key {found}, expected {expected}")]
    KeyMismatch {
        expected: VerificationKeyRef,
        found: VerificationKeyRef,
    },

    #[error("proof is for job {found}, not {expected}")]
    JobMismatch { expected: String, found: String },

    #[error("simulated proofs are not accepted here")]
    SimulatedProofRejected,

    #[error("no verifier configured for {0} proofs")]
    UnsupportedSystem(ProofSystem),

    #[error("no verifying key configured and simulated proofs are not accepted")]
    NoVerifyingKey,
}

/// Groth16 verifier for the eligibility circuit.
pub struct Verifier {
    /// Prepared verifying key for fast verification.
    prepared_vk: PreparedVerifyingKey<Bn254>,
    /// Original verifying key (for serialization).
    verifying_key: VerifyingKey<Bn254>,
    vk_ref: VerificationKeyRef,
}

impl Verifier {
    /// Create a new verifier from a verifying key.
    pub fn new(vk: VerifyingKey<Bn254>) -> VerifierResult<Self> {
        let prepared_vk = Groth16::<Bn254>::process_vk(&vk)
            .map_err(|e| VerifierError::VerificationFailed(e.to_string()))?;
        let vk_ref =
            verification_key_ref(&vk).map_err(|e| VerifierError::InvalidProof(e.to_string()))?;
        Ok(Self {
            prepared_vk,
            verifying_key: vk,
            vk_ref,
        })
    }

    /// Verify a raw Groth16 proof against an ordered instance.
    pub fn verify_instance(
        &self,
        proof: &ark_groth16::Proof<Bn254>,
        public_inputs: &[Fr],
    ) -> VerifierResult<bool> {
        Groth16::<Bn254>::verify_with_processed_vk(&self.prepared_vk, public_inputs, proof)
            .map_err(|e| VerifierError::VerificationFailed(e.to_string()))
    }

    /// Verify an eligibility proof against the job it claims to be for.
    ///
    /// Returns `Ok(false)` for a well-formed proof that does not verify.
    pub fn verify(&self, proof: &EligibilityProof, job: &Job) -> VerifierResult<bool> {
        if proof.verification_key != self.vk_ref {
            return Err(VerifierError::KeyMismatch {
                expected: self.vk_ref.clone(),
                found: proof.verification_key.clone(),
            });
        }

        let snark = proof_from_bytes(&proof.proof)
            .map_err(|e| VerifierError::InvalidProof(e.to_string()))?;
        let instance = public_instance(job, &proof.public_outputs)
            .map_err(|e| VerifierError::InvalidProof(e.to_string()))?;

        self.verify_instance(&snark, &instance)
    }

    /// Get a reference to the verifying key.
    pub fn verifying_key(&self) -> &VerifyingKey<Bn254> {
        &self.verifying_key
    }

    pub fn verification_key_ref(&self) -> &VerificationKeyRef {
        &self.vk_ref
    }
}

/// Checks the structure of simulated proofs. Offers no soundness at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedVerifier;

impl SimulatedVerifier {
    pub fn verify(&self, proof: &EligibilityProof, job: &Job) -> VerifierResult<bool> {
        if proof.verification_key != simulated::verification_key_ref() {
            return Err(VerifierError::KeyMismatch {
                expected: simulated::verification_key_ref(),
                found: proof.verification_key.clone(),
            });
        }
        let instance = public_instance(job, &proof.public_outputs)
            .map_err(|e| VerifierError::InvalidProof(e.to_string()))?;
        Ok(simulated::commitment(&instance) == proof.proof)
    }
}

/// Dispatches on the proof system tag.
///
/// Built once from configuration. A ledger that must not take simulated
/// proofs is simply built without a [`SimulatedVerifier`].
pub struct ProofVerifier {
    circuit: CircuitId,
    groth16: Option<Verifier>,
    simulated: Option<SimulatedVerifier>,
}

impl ProofVerifier {
    /// Accept Groth16 proofs only.
    pub fn groth16(verifier: Verifier) -> Self {
        Self {
            circuit: CircuitId::eligibility_v1(),
            groth16: Some(verifier),
            simulated: None,
        }
    }

    /// Accept simulated proofs only (development without keys).
    pub fn simulated_only() -> Self {
        Self {
            circuit: CircuitId::eligibility_v1(),
            groth16: None,
            simulated: Some(SimulatedVerifier),
        }
    }

    /// Groth16 when a key is given, simulated proofs only when asked for.
    pub fn from_parts(
        vk: Option<VerifyingKey<Bn254>>,
        accept_simulated: bool,
    ) -> VerifierResult<Self> {
        let verifier = match (vk, accept_simulated) {
            (Some(vk), false) => Self::groth16(Verifier::new(vk)?),
            (Some(vk), true) => Self::groth16(Verifier::new(vk)?).with_simulated(),
            (None, true) => Self::simulated_only(),
            (None, false) => return Err(VerifierError::NoVerifyingKey),
        };
        Ok(verifier)
    }

    /// Additionally accept simulated proofs.
    pub fn with_simulated(mut self) -> Self {
        self.simulated = Some(SimulatedVerifier);
        self
    }

    pub fn accepts_simulated(&self) -> bool {
        self.simulated.is_some()
    }

    /// Full cryptographic check of `proof` against `job`.
    pub fn verify(&self, proof: &EligibilityProof, job: &Job) -> VerifierResult<bool> {
        if proof.circuit != self.circuit {
            return Err(VerifierError::CircuitMismatch {
                expected: self.circuit.clone(),
                found: proof.circuit.clone(),
            });
        }
        if &proof.public_outputs.job_id != job.id() {
            return Err(VerifierError::JobMismatch {
                expected: job.id().to_string(),
                found: proof.public_outputs.job_id.to_string(),
            });
        }

        match proof.system {
            ProofSystem::Groth16Bn254 => match &self.groth16 {
                Some(verifier) => verifier.verify(proof, job),
                None => Err(VerifierError::UnsupportedSystem(proof.system)),
            },
            ProofSystem::Simulated => match &self.simulated {
                Some(verifier) => verifier.verify(proof, job),
                None => Err(VerifierError::SimulatedProofRejected),
            },
        }
    }
}
