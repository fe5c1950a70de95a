//! Eligibility proof generation.
//!
//! [`ProofGenerator::generate`] refuses ineligible inputs before any backend
//! is touched, runs the configured backend under a deadline, and checks that
//! what came back proves exactly the instance that was asked for. The result
//! is one immutable [`EligibilityProof`] that the caller hands to the ledger.
//!
//! Dropping the returned future cancels generation. Nothing is committed
//! anywhere until the proof is submitted.

use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::backend::{Backend, BackendProof, ProvingBackend, SimulatedProver};
use crate::config::Config;
use crate::inputs::{evaluate, CircuitInputs, InputError};
use crate::model::{ApplicantProfile, CircuitId, EligibilityProof, Job, ProofSystem};
use crate::progress::ProgressReporter;
use crate::prover::{ProverError, ProverResult};

pub struct ProofGenerator<B = Backend> {
    backend: B,
    deadline: Duration,
    /// Only ever set for development configurations.
    fallback: Option<SimulatedProver>,
}

impl ProofGenerator<Backend> {
    /// Build the generator `config` describes.
    pub fn from_config(config: &Config) -> ProverResult<Self> {
        let backend = Backend::from_config(&config.prover)?;
        let mut generator = Self::new(backend, config.prover.deadline());
        if config.allows_fallback() {
            generator.fallback = Some(SimulatedProver::new(config.prover.simulated_latency()));
        }
        Ok(generator)
    }
}

impl<B: ProvingBackend> ProofGenerator<B> {
    pub fn new(backend: B, deadline: Duration) -> Self {
        Self {
            backend,
            deadline,
            fallback: None,
        }
    }

    /// Substitute simulated proofs when the backend is unreachable.
    ///
    /// Never call this for a production deployment; [`Self::from_config`]
    /// only does so for development.
    pub fn with_dev_fallback(mut self, fallback: SimulatedProver) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Assemble inputs for `profile` against `job`, then [`Self::generate`].
    ///
    /// A region outside the job's allow-list surfaces as
    /// [`ProverError::NotEligible`] listing every unmet requirement.
    pub async fn generate_for(
        &self,
        profile: &ApplicantProfile,
        job: &Job,
        progress: &ProgressReporter,
    ) -> ProverResult<EligibilityProof> {
        let inputs = match CircuitInputs::assemble(profile, job) {
            Ok(inputs) => inputs,
            Err(InputError::RegionNotAllowed(_)) => {
                let unmet = evaluate(profile, job)
                    .map_err(|e| ProverError::InvalidInput(e.to_string()))?;
                debug!(job = %job.id(), unmet = unmet.len(), "region not allowed");
                return Err(ProverError::NotEligible { unmet });
            }
            Err(e) => return Err(ProverError::InvalidInput(e.to_string())),
        };
        self.generate(&inputs, progress).await
    }

    #[instrument(skip_all, fields(job = %inputs.public.job_id, backend = self.backend.name()))]
    pub async fn generate(
        &self,
        inputs: &CircuitInputs,
        progress: &ProgressReporter,
    ) -> ProverResult<EligibilityProof> {
        let unmet = inputs.unmet_requirements();
        if !unmet.is_empty() {
            debug!(unmet = unmet.len(), "preconditions failed, backend not called");
            return Err(ProverError::NotEligible { unmet });
        }

        let circuit = inputs.public.circuit.clone();
        let started = Instant::now();
        progress.set(5);

        let attempt = self.run(&self.backend, &circuit, inputs, progress).await;
        let (system, raw) = match (attempt, &self.fallback) {
            (Ok(raw), _) => (self.backend.system(), raw),
            (Err(ProverError::ProvingBackendUnavailable(reason)), Some(fallback)) => {
                warn!(%reason, "proving backend unavailable, falling back to simulated proof");
                let raw = self.run(fallback, &circuit, inputs, progress).await?;
                (fallback.system(), raw)
            }
            (Err(e), _) => return Err(e),
        };

        let proof = Self::finish(circuit, system, inputs, raw)?;
        progress.set(100);
        info!(
            %system,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = proof.proof.len(),
            "eligibility proof generated"
        );
        Ok(proof)
    }

    async fn run<P: ProvingBackend>(
        &self,
        backend: &P,
        circuit: &CircuitId,
        inputs: &CircuitInputs,
        progress: &ProgressReporter,
    ) -> ProverResult<BackendProof> {
        match tokio::time::timeout(self.deadline, backend.generate_proof(circuit, inputs, progress))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(deadline = ?self.deadline, backend = backend.name(), "proof generation timed out");
                Err(ProverError::VerificationTimeout(self.deadline))
            }
        }
    }

    /// Check the backend proved exactly the requested instance with `eligible = 1`.
    fn finish(
        circuit: CircuitId,
        system: ProofSystem,
        inputs: &CircuitInputs,
        raw: BackendProof,
    ) -> ProverResult<EligibilityProof> {
        let expected = inputs
            .public
            .instance(true)
            .map_err(|e| ProverError::SerializationError(e.to_string()))?;
        if raw.public_inputs != expected {
            let differing = raw
                .public_inputs
                .iter()
                .zip(expected.iter())
                .position(|(got, want)| got != want)
                .unwrap_or(expected.len().min(raw.public_inputs.len()));
            return Err(ProverError::PublicOutputMismatch(format!(
                "instance differs at position {differing} ({} vs {} elements)",
                raw.public_inputs.len(),
                expected.len()
            )));
        }

        Ok(EligibilityProof {
            circuit,
            system,
            proof: raw.proof,
            public_outputs: inputs.public.outputs(true),
            verification_key: raw.verification_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated;
    use crate::fixtures::{profile, sample_job};
    use crate::inputs::Requirement;
    use crate::model::VerificationKeyRef;
    use crate::progress;
    use ark_bn254::Fr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls, then behaves as configured.
    struct SpyBackend {
        calls: AtomicUsize,
        behaviour: Behaviour,
    }

    enum Behaviour {
        Honest,
        Unavailable,
        Hang,
        WrongInstance,
    }

    impl SpyBackend {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                behaviour,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProvingBackend for SpyBackend {
        fn system(&self) -> ProofSystem {
            ProofSystem::Groth16Bn254
        }

        fn name(&self) -> &'static str {
            "spy"
        }

        async fn generate_proof(
            &self,
            _circuit: &CircuitId,
            inputs: &CircuitInputs,
            _progress: &ProgressReporter,
        ) -> ProverResult<BackendProof> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut public_inputs = inputs.public.instance(true).unwrap();
            match self.behaviour {
                Behaviour::Honest => {}
                Behaviour::Unavailable => {
                    return Err(ProverError::ProvingBackendUnavailable("down".into()))
                }
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Behaviour::WrongInstance => public_inputs[3] = Fr::from(1u64),
            }
            Ok(BackendProof {
                proof: vec![7; 128],
                public_inputs,
                verification_key: VerificationKeyRef("groth16-bn254:spy".into()),
            })
        }
    }

    fn generator(behaviour: Behaviour) -> ProofGenerator<SpyBackend> {
        ProofGenerator::new(SpyBackend::new(behaviour), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_eligible_profile_reaches_backend() {
        let job = sample_job();
        let generator = generator(Behaviour::Honest);
        let (reporter, watcher) = progress::channel();

        let proof = generator
            .generate_for(&profile(80, 60, 120_000, "CA-ON"), &job, &reporter)
            .await
            .unwrap();

        assert_eq!(generator.backend().calls(), 1);
        assert_eq!(proof.system, ProofSystem::Groth16Bn254);
        assert_eq!(proof.circuit, CircuitId::eligibility_v1());
        assert!(proof.public_outputs.eligible);
        assert_eq!(&proof.public_outputs.job_id, job.id());
        assert_eq!(watcher.current(), 100);
    }

    #[tokio::test]
    async fn test_each_violation_skips_backend() {
        let job = sample_job();
        let cases = [
            profile(69, 60, 120_000, "CA-ON"),
            profile(80, 49, 120_000, "CA-ON"),
            profile(80, 60, 89_999, "CA-ON"),
            profile(80, 60, 150_001, "CA-ON"),
        ];
        for applicant in cases {
            let generator = generator(Behaviour::Honest);
            let result = generator
                .generate_for(&applicant, &job, &ProgressReporter::detached())
                .await;
            assert!(matches!(result, Err(ProverError::NotEligible { .. })));
            assert_eq!(generator.backend().calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_disallowed_region_is_not_eligible() {
        let generator = generator(Behaviour::Honest);
        let result = generator
            .generate_for(
                &profile(80, 60, 120_000, "DE-BE"),
                &sample_job(),
                &ProgressReporter::detached(),
            )
            .await;

        match result {
            Err(ProverError::NotEligible { unmet }) => assert_eq!(unmet, vec![Requirement::Region]),
            other => panic!("expected NotEligible, got {other:?}"),
        }
        assert_eq!(generator.backend().calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let generator = ProofGenerator::new(SpyBackend::new(Behaviour::Hang), Duration::from_secs(2))
            .with_dev_fallback(SimulatedProver::instant());
        let result = generator
            .generate_for(
                &profile(80, 60, 120_000, "CA-ON"),
                &sample_job(),
                &ProgressReporter::detached(),
            )
            .await;
        // A timeout is a failure, never a fallback.
        assert!(matches!(result, Err(ProverError::VerificationTimeout(_))));
    }

    #[tokio::test]
    async fn test_unavailable_without_fallback_fails() {
        let generator = generator(Behaviour::Unavailable);
        let result = generator
            .generate_for(
                &profile(80, 60, 120_000, "CA-ON"),
                &sample_job(),
                &ProgressReporter::detached(),
            )
            .await;
        assert!(matches!(result, Err(ProverError::ProvingBackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_dev_fallback_is_tagged_simulated() {
        let job = sample_job();
        let generator =
            generator(Behaviour::Unavailable).with_dev_fallback(SimulatedProver::instant());
        let proof = generator
            .generate_for(&profile(80, 60, 120_000, "CA-ON"), &job, &ProgressReporter::detached())
            .await
            .unwrap();

        assert_eq!(generator.backend().calls(), 1);
        assert_eq!(proof.system, ProofSystem::Simulated);
        assert_eq!(proof.verification_key, simulated::verification_key_ref());
    }

    #[tokio::test]
    async fn test_backend_output_is_checked() {
        let generator = generator(Behaviour::WrongInstance);
        let result = generator
            .generate_for(
                &profile(80, 60, 120_000, "CA-ON"),
                &sample_job(),
                &ProgressReporter::detached(),
            )
            .await;
        assert!(matches!(result, Err(ProverError::PublicOutputMismatch(_))));
    }

    #[test]
    fn test_from_config_respects_environment() {
        let mut config = Config::default();
        config.prover.backend = crate::config::BackendKind::Simulated;
        config.prover.fallback_to_simulated = true;
        let generator = ProofGenerator::from_config(&config).unwrap();
        assert!(generator.fallback.is_some());

        config.environment = crate::config::Environment::Production;
        config.prover.backend = crate::config::BackendKind::Remote;
        config.prover.remote_url = Some("http://127.0.0.1:1".into());
        let generator = ProofGenerator::from_config(&config).unwrap();
        assert!(generator.fallback.is_none());
    }
}
