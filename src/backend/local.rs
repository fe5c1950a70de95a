//! In-process Groth16 proving.

use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{check_circuit, BackendProof, ProvingBackend};
use crate::inputs::CircuitInputs;
use crate::model::{CircuitId, ProofSystem};
use crate::progress::ProgressReporter;
use crate::prover::{EligibilityProver, ProverError, ProverResult};

/// Runs the eligibility prover on tokio's blocking pool.
#[derive(Clone)]
pub struct LocalProver {
    prover: Arc<EligibilityProver>,
}

impl LocalProver {
    pub fn new(prover: Arc<EligibilityProver>) -> Self {
        Self { prover }
    }

    /// Load a proving key written by [`EligibilityProver::save_proving_key`].
    pub fn from_key_file(path: &Path) -> ProverResult<Self> {
        Ok(Self::new(Arc::new(EligibilityProver::load_proving_key(
            path,
        )?)))
    }

    pub fn prover(&self) -> &EligibilityProver {
        &self.prover
    }
}

impl ProvingBackend for LocalProver {
    fn system(&self) -> ProofSystem {
        ProofSystem::Groth16Bn254
    }

    fn name(&self) -> &'static str {
        "local"
    }

    async fn generate_proof(
        &self,
        circuit: &CircuitId,
        inputs: &CircuitInputs,
        progress: &ProgressReporter,
    ) -> ProverResult<BackendProof> {
        check_circuit(circuit)?;
        progress.set(10);

        let prover = Arc::clone(&self.prover);
        let inputs = inputs.clone();
        // If the caller drops us the blocking task still finishes, but its
        // result is discarded.
        let snark = tokio::task::spawn_blocking(move || prover.prove(&inputs))
            .await
            .map_err(|e| ProverError::ProofGenerationFailed(e.to_string()))??;
        progress.set(90);

        let proof = snark.proof_bytes()?;
        debug!(bytes = proof.len(), "local groth16 proof ready");

        Ok(BackendProof {
            proof,
            public_inputs: snark.public_inputs,
            verification_key: self.prover.verification_key_ref().clone(),
        })
    }
}
