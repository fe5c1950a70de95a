//! The verifying ledger.
//!
//! A submission moves `Submitted -> Verifying -> Accepted | Rejected(reason)`:
//!
//! 1. the proof must verify against the job it names (`InvalidProof`),
//! 2. its public `eligible` flag must be set (`NotEligible`),
//! 3. its `(job, nullifier)` pair must be unused (`DuplicateApplication`),
//! 4. then the nullifier is consumed and a pending [`Application`] created.
//!
//! Steps 3 and 4 happen under one map entry lock, so two racing submissions
//! with the same nullifier can never both be accepted. [`Ledger::verify`] runs
//! steps 1 and 2 only and never mutates anything.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{
    unix_now, Application, ApplicationStatus, EligibilityProof, JobId, ProofSystem,
};
use crate::nullifier::Nullifier;
use crate::privacy::{privacy_score, required_data_points, DataPoint, PrivacyStats};
use crate::store::{ApplicationStore, JobBoard, JobSource, MemoryApplicationStore};
use crate::verifier::{ProofVerifier, VerifierError};

/// Why the ledger refused a submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectionReason {
    InvalidProof(String),
    NotEligible,
    DuplicateApplication,
    UnknownJob(JobId),
    SimulatedProofRejected,
    VerificationTimeout,
    /// The application record could not be stored; nothing was consumed.
    Storage(String),
}

impl RejectionReason {
    /// Whether resubmitting the same proof could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RejectionReason::VerificationTimeout | RejectionReason::Storage(_)
        )
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::InvalidProof(detail) => write!(f, "invalid proof: {detail}"),
            RejectionReason::NotEligible => f.write_str("proof does not attest eligibility"),
            RejectionReason::DuplicateApplication => {
                f.write_str("an application with this nullifier already exists for the job")
            }
            RejectionReason::UnknownJob(job) => write!(f, "unknown job {job}"),
            RejectionReason::SimulatedProofRejected => {
                f.write_str("simulated proofs are not accepted")
            }
            RejectionReason::VerificationTimeout => f.write_str("verification timed out"),
            RejectionReason::Storage(detail) => write!(f, "storage failure: {detail}"),
        }
    }
}

/// A rejected submission.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("submission {submission} rejected: {reason}")]
pub struct Rejection {
    pub submission: Uuid,
    pub reason: RejectionReason,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SubmissionState {
    Submitted,
    Verifying,
    Accepted,
    Rejected(RejectionReason),
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Accepted | SubmissionState::Rejected(_))
    }

    pub fn can_advance_to(&self, next: &SubmissionState) -> bool {
        use SubmissionState::*;
        matches!(
            (self, next),
            (Submitted, Verifying) | (Verifying, Accepted) | (Verifying, Rejected(_))
        )
    }
}

/// Audit entry for one submission.
#[derive(Clone, Debug, Serialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub job_id: JobId,
    pub nullifier: Nullifier,
    pub system: ProofSystem,
    pub state: SubmissionState,
    pub application: Option<Uuid>,
    pub submitted_at: u64,
}

/// What an applicant sends: the proof, plus any data points they chose to
/// disclose in the clear.
#[derive(Clone, Debug)]
pub struct ApplicationSubmission {
    pub proof: EligibilityProof,
    pub disclosed: BTreeSet<DataPoint>,
}

impl ApplicationSubmission {
    pub fn new(proof: EligibilityProof) -> Self {
        Self {
            proof,
            disclosed: BTreeSet::new(),
        }
    }

    pub fn disclosing(mut self, points: impl IntoIterator<Item = DataPoint>) -> Self {
        self.disclosed.extend(points);
        self
    }
}

/// Accepted submission.
#[derive(Clone, Debug, Serialize)]
pub struct Receipt {
    pub transaction_id: Uuid,
    pub application: Application,
}

/// Anything an applicant can submit to.
pub trait ApplicationLedger: Send + Sync {
    fn submit_application(
        &self,
        submission: ApplicationSubmission,
    ) -> impl Future<Output = Result<Receipt, Rejection>> + Send;
}

pub struct Ledger<J = Arc<JobBoard>, S = Arc<MemoryApplicationStore>> {
    jobs: J,
    store: S,
    verifier: ProofVerifier,
    verify_deadline: Option<Duration>,
    consumed: DashMap<(JobId, Nullifier), Uuid>,
    submissions: DashMap<Uuid, SubmissionRecord>,
    /// Submission ids in arrival order.
    arrivals: Mutex<Vec<Uuid>>,
    stats: Mutex<PrivacyStats>,
}

impl<J: JobSource, S: ApplicationStore> Ledger<J, S> {
    pub fn new(jobs: J, store: S, verifier: ProofVerifier) -> Self {
        Self {
            jobs,
            store,
            verifier,
            verify_deadline: None,
            consumed: DashMap::new(),
            submissions: DashMap::new(),
            arrivals: Mutex::new(Vec::new()),
            stats: Mutex::new(PrivacyStats::default()),
        }
    }

    /// Bound verification time for [`ApplicationLedger::submit_application`].
    pub fn with_verify_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.verify_deadline = deadline;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn jobs(&self) -> &J {
        &self.jobs
    }

    /// Cryptographic and eligibility checks. Pure: repeated calls give the
    /// same answer and change nothing.
    pub fn verify(&self, proof: &EligibilityProof) -> Result<(), RejectionReason> {
        let job_id = &proof.public_outputs.job_id;
        let job = self
            .jobs
            .get_job(job_id)
            .ok_or_else(|| RejectionReason::UnknownJob(job_id.clone()))?;

        match self.verifier.verify(proof, &job) {
            Ok(true) => {}
            Ok(false) => {
                return Err(RejectionReason::InvalidProof(
                    "proof does not verify against the job's public inputs".to_string(),
                ))
            }
            Err(VerifierError::SimulatedProofRejected) => {
                return Err(RejectionReason::SimulatedProofRejected)
            }
            Err(e) => return Err(RejectionReason::InvalidProof(e.to_string())),
        }

        if !proof.public_outputs.eligible {
            return Err(RejectionReason::NotEligible);
        }
        Ok(())
    }

    /// Whether `nullifier` has already been used for `job`.
    pub fn is_consumed(&self, job: &JobId, nullifier: &Nullifier) -> bool {
        self.consumed.contains_key(&(job.clone(), *nullifier))
    }

    /// Verify and, if everything holds, accept.
    pub fn submit(&self, submission: ApplicationSubmission) -> Result<Receipt, Rejection> {
        let id = self.open(&submission.proof);
        match self.verify(&submission.proof) {
            Ok(()) => self.commit(id, submission),
            Err(reason) => Err(self.reject(id, reason)),
        }
    }

    /// Record a new submission and move it to `Verifying`.
    fn open(&self, proof: &EligibilityProof) -> Uuid {
        let id = Uuid::new_v4();
        self.submissions.insert(
            id,
            SubmissionRecord {
                id,
                job_id: proof.public_outputs.job_id.clone(),
                nullifier: proof.public_outputs.nullifier,
                system: proof.system,
                state: SubmissionState::Submitted,
                application: None,
                submitted_at: unix_now(),
            },
        );
        self.arrivals.lock().push(id);
        self.advance(id, SubmissionState::Verifying, None);
        id
    }

    fn advance(&self, id: Uuid, next: SubmissionState, application: Option<Uuid>) {
        if let Some(mut record) = self.submissions.get_mut(&id) {
            if record.state.can_advance_to(&next) {
                info!(submission = %id, from = ?record.state, to = ?next, "submission state");
                record.state = next;
                record.application = application;
            } else {
                warn!(submission = %id, from = ?record.state, to = ?next, "ignored invalid submission transition");
            }
        }
    }

    fn reject(&self, id: Uuid, reason: RejectionReason) -> Rejection {
        if let RejectionReason::InvalidProof(detail) = &reason {
            warn!(submission = %id, %detail, "invalid proof submitted, possible tampering");
        }
        self.advance(id, SubmissionState::Rejected(reason.clone()), None);
        Rejection {
            submission: id,
            reason,
        }
    }

    /// Consume the nullifier and create the application, atomically per key.
    fn commit(&self, id: Uuid, submission: ApplicationSubmission) -> Result<Receipt, Rejection> {
        let outputs = &submission.proof.public_outputs;
        let job = match self.jobs.get_job(&outputs.job_id) {
            Some(job) => job,
            None => return Err(self.reject(id, RejectionReason::UnknownJob(outputs.job_id.clone()))),
        };

        let slot = match self.consumed.entry((outputs.job_id.clone(), outputs.nullifier)) {
            Entry::Occupied(_) => return Err(self.reject(id, RejectionReason::DuplicateApplication)),
            Entry::Vacant(slot) => slot,
        };

        let required = required_data_points(&job);
        let disclosed: BTreeSet<DataPoint> = submission
            .disclosed
            .intersection(&required)
            .cloned()
            .collect();
        let score = privacy_score(&required, &disclosed);

        let application = Application {
            id: Uuid::new_v4(),
            job_id: outputs.job_id.clone(),
            public_outputs: outputs.clone(),
            proof_system: submission.proof.system,
            status: ApplicationStatus::Pending,
            privacy_score: score,
            created_at: unix_now(),
        };
        if let Err(e) = self.store.create(application.clone()) {
            drop(slot);
            return Err(self.reject(id, RejectionReason::Storage(e.to_string())));
        }
        slot.insert(application.id);

        self.stats.lock().record(
            score,
            (required.len() - disclosed.len()) as u64,
            disclosed.len() as u64,
        );
        self.advance(id, SubmissionState::Accepted, Some(application.id));
        info!(
            job = %application.job_id,
            application = %application.id,
            privacy_score = score,
            "application accepted"
        );

        Ok(Receipt {
            transaction_id: id,
            application,
        })
    }

    /// Every submission, oldest first.
    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        let arrivals = self.arrivals.lock().clone();
        arrivals.iter().filter_map(|id| self.submission(id)).collect()
    }

    pub fn submission(&self, id: &Uuid) -> Option<SubmissionRecord> {
        self.submissions.get(id).map(|record| record.value().clone())
    }

    pub fn privacy_stats(&self) -> PrivacyStats {
        *self.stats.lock()
    }
}

impl<J, S> Ledger<J, S>
where
    J: JobSource + 'static,
    S: ApplicationStore + 'static,
{
    /// [`Ledger::submit`] with verification bounded by `deadline`.
    ///
    /// Verification runs on the blocking pool. If it overruns, the submission
    /// is rejected with [`RejectionReason::VerificationTimeout`] and nothing is
    /// consumed, even if the verification finishes later.
    pub async fn submit_within(
        self: &Arc<Self>,
        submission: ApplicationSubmission,
        deadline: Duration,
    ) -> Result<Receipt, Rejection> {
        let id = self.open(&submission.proof);
        let ledger = Arc::clone(self);
        let proof = submission.proof.clone();
        let verification = tokio::task::spawn_blocking(move || ledger.verify(&proof));

        match tokio::time::timeout(deadline, verification).await {
            Ok(Ok(Ok(()))) => self.commit(id, submission),
            Ok(Ok(Err(reason))) => Err(self.reject(id, reason)),
            Ok(Err(join)) => Err(self.reject(id, RejectionReason::InvalidProof(join.to_string()))),
            Err(_) => {
                warn!(submission = %id, ?deadline, "verification timed out");
                Err(self.reject(id, RejectionReason::VerificationTimeout))
            }
        }
    }
}

impl<J, S> ApplicationLedger for Arc<Ledger<J, S>>
where
    J: JobSource + 'static,
    S: ApplicationStore + 'static,
{
    async fn submit_application(
        &self,
        submission: ApplicationSubmission,
    ) -> Result<Receipt, Rejection> {
        match self.verify_deadline {
            Some(deadline) => self.submit_within(submission, deadline).await,
            None => self.submit(submission),
        }
    }
}
