//! Applicant-side flow: look up the job, prove eligibility, submit.
//!
//! Wallet and network state live in an explicit [`WalletContext`] passed to
//! whatever needs it.

use std::collections::BTreeSet;
use tracing::{info, instrument};

use crate::backend::ProvingBackend;
use crate::generator::ProofGenerator;
use crate::ledger::{ApplicationLedger, ApplicationSubmission, Receipt, Rejection};
use crate::model::{ApplicantProfile, EligibilityProof, JobId};
use crate::privacy::DataPoint;
use crate::progress::ProgressReporter;
use crate::prover::ProverError;
use crate::store::JobSource;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("wallet is not connected")]
    WalletNotConnected,

    #[error("wallet address must not be empty")]
    InvalidAddress,

    #[error("unknown job {0}")]
    UnknownJob(JobId),

    #[error(transparent)]
    Prover(#[from] ProverError),

    #[error(transparent)]
    Rejected(#[from] Rejection),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected { address: String },
}

/// The applicant's wallet connection on one network.
#[derive(Clone, Debug)]
pub struct WalletContext {
    network: String,
    state: ConnectionState,
}

impl WalletContext {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            state: ConnectionState::Disconnected,
        }
    }

    /// Connect `address`, replacing any previous connection.
    pub fn connect(&mut self, address: impl Into<String>) -> Result<(), ClientError> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(ClientError::InvalidAddress);
        }
        info!(network = %self.network, "wallet connected");
        self.state = ConnectionState::Connected { address };
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.is_connected() {
            info!(network = %self.network, "wallet disconnected");
        }
        self.state = ConnectionState::Disconnected;
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected { .. })
    }

    pub fn address(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Connected { address } => Some(address),
            ConnectionState::Disconnected => None,
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }
}

/// Ties a job source, a generator and a ledger together for one applicant.
pub struct ApplicantClient<J, B, L> {
    jobs: J,
    generator: ProofGenerator<B>,
    ledger: L,
}

impl<J, B, L> ApplicantClient<J, B, L>
where
    J: JobSource,
    B: ProvingBackend,
    L: ApplicationLedger,
{
    pub fn new(jobs: J, generator: ProofGenerator<B>, ledger: L) -> Self {
        Self {
            jobs,
            generator,
            ledger,
        }
    }

    pub fn generator(&self) -> &ProofGenerator<B> {
        &self.generator
    }

    /// Generate a proof for `job_id` without submitting it.
    pub async fn prove(
        &self,
        job_id: &JobId,
        profile: &ApplicantProfile,
        progress: &ProgressReporter,
    ) -> Result<EligibilityProof, ClientError> {
        let job = self
            .jobs
            .get_job(job_id)
            .ok_or_else(|| ClientError::UnknownJob(job_id.clone()))?;
        Ok(self.generator.generate_for(profile, &job, progress).await?)
    }

    /// Full flow. The wallet is checked first, so nothing is proved for a
    /// session that could not submit anyway.
    #[instrument(skip_all, fields(job = %job_id))]
    pub async fn apply(
        &self,
        wallet: &WalletContext,
        job_id: &JobId,
        profile: &ApplicantProfile,
        disclosed: BTreeSet<DataPoint>,
        progress: &ProgressReporter,
    ) -> Result<Receipt, ClientError> {
        if !wallet.is_connected() {
            return Err(ClientError::WalletNotConnected);
        }
        let proof = self.prove(job_id, profile, progress).await?;
        let submission = ApplicationSubmission::new(proof).disclosing(disclosed);
        let receipt = self.ledger.submit_application(submission).await?;
        info!(
            application = %receipt.application.id,
            transaction = %receipt.transaction_id,
            "application submitted"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedProver;
    use crate::fixtures::{profile, sample_draft};
    use crate::ledger::{Ledger, RejectionReason};
    use crate::store::{JobBoard, MemoryApplicationStore};
    use crate::verifier::ProofVerifier;
    use std::sync::Arc;
    use std::time::Duration;

    type TestClient = ApplicantClient<Arc<JobBoard>, SimulatedProver, Arc<Ledger>>;

    fn setup() -> (TestClient, JobId) {
        let board = Arc::new(JobBoard::new());
        let job = board.publish("acme-protocol", "acme-hr", sample_draft()).unwrap();
        let ledger = Arc::new(Ledger::new(
            Arc::clone(&board),
            Arc::new(MemoryApplicationStore::new()),
            ProofVerifier::simulated_only(),
        ));
        let generator = ProofGenerator::new(SimulatedProver::instant(), Duration::from_secs(5));
        (ApplicantClient::new(board, generator, ledger), job.id().clone())
    }

    fn connected() -> WalletContext {
        let mut wallet = WalletContext::new("testnet");
        wallet.connect("addr_test1qz").unwrap();
        wallet
    }

    #[test]
    fn test_wallet_lifecycle() {
        let mut wallet = WalletContext::new("testnet");
        assert!(!wallet.is_connected());
        assert!(matches!(wallet.connect("  "), Err(ClientError::InvalidAddress)));

        wallet.connect("addr_test1qz").unwrap();
        assert_eq!(wallet.address(), Some("addr_test1qz"));
        assert_eq!(wallet.network(), "testnet");

        wallet.disconnect();
        assert_eq!(wallet.state(), &ConnectionState::Disconnected);
        assert_eq!(wallet.address(), None);
    }

    #[tokio::test]
    async fn test_apply_end_to_end() {
        let (client, job_id) = setup();
        let receipt = client
            .apply(
                &connected(),
                &job_id,
                &profile(80, 60, 120_000, "CA-ON"),
                BTreeSet::new(),
                &ProgressReporter::detached(),
            )
            .await
            .unwrap();
        assert_eq!(receipt.application.job_id, job_id);
        assert!(receipt.application.public_outputs.eligible);

        let again = client
            .apply(
                &connected(),
                &job_id,
                &profile(80, 60, 120_000, "CA-ON"),
                BTreeSet::new(),
                &ProgressReporter::detached(),
            )
            .await;
        match again {
            Err(ClientError::Rejected(r)) => {
                assert_eq!(r.reason, RejectionReason::DuplicateApplication)
            }
            other => panic!("expected duplicate rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disconnected_wallet_cannot_apply() {
        let (client, job_id) = setup();
        let result = client
            .apply(
                &WalletContext::new("testnet"),
                &job_id,
                &profile(80, 60, 120_000, "CA-ON"),
                BTreeSet::new(),
                &ProgressReporter::detached(),
            )
            .await;
        assert!(matches!(result, Err(ClientError::WalletNotConnected)));
    }

    #[tokio::test]
    async fn test_unknown_job_and_ineligible() {
        let (client, job_id) = setup();
        let missing = client
            .prove(
                &job_id.next_version(),
                &profile(80, 60, 120_000, "CA-ON"),
                &ProgressReporter::detached(),
            )
            .await;
        assert!(matches!(missing, Err(ClientError::UnknownJob(_))));

        let ineligible = client
            .prove(
                &job_id,
                &profile(80, 60, 120_000, "DE-BE"),
                &ProgressReporter::detached(),
            )
            .await;
        assert!(matches!(
            ineligible,
            Err(ClientError::Prover(ProverError::NotEligible { .. }))
        ));
    }
}
