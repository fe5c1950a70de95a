//! Simulated proving for development without keys or a proving service.
//!
//! The "proof" is a namespaced SHA-256 commitment to the public instance. It
//! has the same shape as a real proof (opaque bytes plus the full ordered
//! instance) but proves nothing, and every proof is tagged
//! [`ProofSystem::Simulated`] so a production ledger refuses it outright.

use ark_bn254::Fr;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

use super::{check_circuit, BackendProof, ProvingBackend};
use crate::inputs::CircuitInputs;
use crate::merkle::hash::field_to_bytes;
use crate::model::{CircuitId, ProofSystem, VerificationKeyRef};
use crate::progress::ProgressReporter;
use crate::prover::{ProverError, ProverResult};

const NAMESPACE: &[u8] = b"ghosthire/simulated-proof/v1";

/// Leading bytes of every simulated proof.
pub const MAGIC: &[u8; 6] = b"GHSIM1";

const STEPS: u32 = 4;

/// Commitment standing in for a proof over `instance`.
pub fn commitment(instance: &[Fr]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(NAMESPACE);
    for value in instance {
        hasher.update(field_to_bytes(value));
    }
    let mut out = MAGIC.to_vec();
    out.extend_from_slice(&hasher.finalize());
    out
}

/// The fixed key reference simulated proofs carry.
pub fn verification_key_ref() -> VerificationKeyRef {
    VerificationKeyRef(format!(
        "simulated:{}",
        hex::encode(Sha256::digest(NAMESPACE))
    ))
}

/// Stand-in prover with a configurable artificial latency.
#[derive(Clone, Debug)]
pub struct SimulatedProver {
    latency: Duration,
}

impl SimulatedProver {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl Default for SimulatedProver {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500))
    }
}

impl ProvingBackend for SimulatedProver {
    fn system(&self) -> ProofSystem {
        ProofSystem::Simulated
    }

    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn generate_proof(
        &self,
        circuit: &CircuitId,
        inputs: &CircuitInputs,
        progress: &ProgressReporter,
    ) -> ProverResult<BackendProof> {
        check_circuit(circuit)?;

        let step = self.latency / STEPS;
        for i in 1..=STEPS {
            if !step.is_zero() {
                tokio::time::sleep(step).await;
            }
            progress.set((i * 90 / STEPS) as u8);
        }

        let public_inputs = inputs
            .public
            .instance(inputs.is_eligible())
            .map_err(|e| ProverError::SerializationError(e.to_string()))?;
        debug!(latency = ?self.latency, "simulated proof ready");

        Ok(BackendProof {
            proof: commitment(&public_inputs),
            public_inputs,
            verification_key: verification_key_ref(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{profile, sample_job};
    use crate::progress;

    #[test]
    fn test_commitment_shape() {
        let a = commitment(&[Fr::from(1u64), Fr::from(2u64)]);
        let b = commitment(&[Fr::from(2u64), Fr::from(1u64)]);
        assert_eq!(&a[..MAGIC.len()], MAGIC);
        assert_eq!(a.len(), MAGIC.len() + 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_ref_is_namespaced() {
        assert!(verification_key_ref().0.starts_with("simulated:"));
        assert_eq!(verification_key_ref(), verification_key_ref());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_latency_and_progress() {
        let prover = SimulatedProver::new(Duration::from_millis(400));
        let inputs =
            CircuitInputs::assemble(&profile(80, 60, 120_000, "CA-ON"), &sample_job()).unwrap();
        let (reporter, watcher) = progress::channel();

        let started = tokio::time::Instant::now();
        let out = prover
            .generate_proof(&CircuitId::eligibility_v1(), &inputs, &reporter)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(400));
        assert_eq!(watcher.current(), 90);
        assert_eq!(out.public_inputs, inputs.public.instance(true).unwrap());
        assert_eq!(out.proof, commitment(&out.public_inputs));
    }

    #[tokio::test]
    async fn test_nullifier_matches_real_derivation() {
        let job = sample_job();
        let applicant = profile(80, 60, 120_000, "US-CA");
        let inputs = CircuitInputs::assemble(&applicant, &job).unwrap();
        let out = SimulatedProver::instant()
            .generate_proof(&CircuitId::eligibility_v1(), &inputs, &ProgressReporter::detached())
            .await
            .unwrap();

        let expected = crate::nullifier::derive(job.id(), &applicant.secret);
        assert_eq!(out.public_inputs[1], expected.to_field().unwrap());
    }
}
