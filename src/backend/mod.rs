//! Proving backends.
//!
//! A backend turns a [`CircuitInputs`] bundle into proof bytes plus the
//! ordered public instance it proved. Which backend runs is decided once,
//! from configuration, by [`Backend::from_config`]; business logic never
//! probes for one at runtime.

use ark_bn254::Fr;
use std::future::Future;
use std::sync::Arc;

use crate::config::{BackendKind, ProverConfig};
use crate::inputs::CircuitInputs;
use crate::model::{CircuitId, ProofSystem, VerificationKeyRef};
use crate::progress::ProgressReporter;
use crate::prover::{ProverError, ProverResult};

pub mod local;
pub mod remote;
pub mod simulated;

pub use local::LocalProver;
pub use remote::RemoteProver;
pub use simulated::SimulatedProver;

/// File name of the proving key inside the configured key directory.
pub const PROVING_KEY_FILE: &str = "eligibility.pk";
/// File name of the verifying key inside the configured key directory.
pub const VERIFYING_KEY_FILE: &str = "eligibility.vk";

/// Raw backend output, before the generator checks it against the request.
#[derive(Clone, Debug)]
pub struct BackendProof {
    pub proof: Vec<u8>,
    pub public_inputs: Vec<Fr>,
    pub verification_key: VerificationKeyRef,
}

/// A swappable proof generator for a versioned circuit.
pub trait ProvingBackend: Send + Sync {
    /// Tag stamped on every proof this backend emits.
    fn system(&self) -> ProofSystem;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn generate_proof(
        &self,
        circuit: &CircuitId,
        inputs: &CircuitInputs,
        progress: &ProgressReporter,
    ) -> impl Future<Output = ProverResult<BackendProof>> + Send;
}

impl<T: ProvingBackend> ProvingBackend for Arc<T> {
    fn system(&self) -> ProofSystem {
        (**self).system()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn generate_proof(
        &self,
        circuit: &CircuitId,
        inputs: &CircuitInputs,
        progress: &ProgressReporter,
    ) -> impl Future<Output = ProverResult<BackendProof>> + Send {
        (**self).generate_proof(circuit, inputs, progress)
    }
}

/// The configured backend.
pub enum Backend {
    Local(LocalProver),
    Remote(RemoteProver),
    Simulated(SimulatedProver),
}

impl Backend {
    /// Build the backend named by `config`. Loads keys from disk for
    /// [`BackendKind::Local`].
    pub fn from_config(config: &ProverConfig) -> ProverResult<Self> {
        match config.backend {
            BackendKind::Local => {
                let path = config.key_dir.join(PROVING_KEY_FILE);
                Ok(Backend::Local(LocalProver::from_key_file(&path)?))
            }
            BackendKind::Remote => {
                let url = config.remote_url.as_deref().ok_or_else(|| {
                    ProverError::InvalidInput("remote backend needs a remote_url".to_string())
                })?;
                Ok(Backend::Remote(RemoteProver::new(url, config.deadline())?))
            }
            BackendKind::Simulated => Ok(Backend::Simulated(SimulatedProver::new(
                config.simulated_latency(),
            ))),
        }
    }
}

impl ProvingBackend for Backend {
    fn system(&self) -> ProofSystem {
        match self {
            Backend::Local(b) => b.system(),
            Backend::Remote(b) => b.system(),
            Backend::Simulated(b) => b.system(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Backend::Local(b) => b.name(),
            Backend::Remote(b) => b.name(),
            Backend::Simulated(b) => b.name(),
        }
    }

    async fn generate_proof(
        &self,
        circuit: &CircuitId,
        inputs: &CircuitInputs,
        progress: &ProgressReporter,
    ) -> ProverResult<BackendProof> {
        match self {
            Backend::Local(b) => b.generate_proof(circuit, inputs, progress).await,
            Backend::Remote(b) => b.generate_proof(circuit, inputs, progress).await,
            Backend::Simulated(b) => b.generate_proof(circuit, inputs, progress).await,
        }
    }
}

/// Ensure a backend was asked for the one circuit it knows.
pub(crate) fn check_circuit(circuit: &CircuitId) -> ProverResult<()> {
    if circuit.0 != CircuitId::ELIGIBILITY_V1 {
        return Err(ProverError::InvalidInput(format!("unknown circuit {circuit}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::keys;

    fn prover_config(backend: BackendKind) -> ProverConfig {
        ProverConfig {
            backend,
            ..ProverConfig::default()
        }
    }

    #[test]
    fn test_select_simulated() {
        let backend = Backend::from_config(&prover_config(BackendKind::Simulated)).unwrap();
        assert_eq!(backend.system(), ProofSystem::Simulated);
        assert_eq!(backend.name(), "simulated");
    }

    #[test]
    fn test_select_remote() {
        let mut config = prover_config(BackendKind::Remote);
        config.remote_url = Some("http://127.0.0.1:6300".into());
        let backend = Backend::from_config(&config).unwrap();
        assert_eq!(backend.system(), ProofSystem::Groth16Bn254);
        assert_eq!(backend.name(), "remote");

        config.remote_url = None;
        assert!(matches!(
            Backend::from_config(&config),
            Err(ProverError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_select_local_loads_keys() {
        let (prover, _) = keys();
        let dir = tempfile::tempdir().unwrap();
        prover
            .save_proving_key(&dir.path().join(PROVING_KEY_FILE))
            .unwrap();

        let mut config = prover_config(BackendKind::Local);
        config.key_dir = dir.path().to_path_buf();
        let backend = Backend::from_config(&config).unwrap();
        assert_eq!(backend.name(), "local");

        config.key_dir = dir.path().join("missing");
        assert!(matches!(
            Backend::from_config(&config),
            Err(ProverError::IoError(_))
        ));
    }

    #[test]
    fn test_unknown_circuit() {
        assert!(check_circuit(&CircuitId::eligibility_v1()).is_ok());
        assert!(check_circuit(&CircuitId("other-v9".into())).is_err());
    }
}
