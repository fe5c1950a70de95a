//! Job postings and application records.
//!
//! Both are collaborators of the core: the ledger only needs to read a job by
//! id and to create and read application records. The in-memory versions here
//! back the CLI and the tests.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::model::{Application, ApplicationStatus, Job, JobDraft, JobId, ModelError};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    InvalidJob(#[from] ModelError),

    #[error("posting {0} already exists")]
    PostingExists(String),

    #[error("unknown job {0}")]
    UnknownJob(JobId),

    #[error("{job} is not the latest version of its posting")]
    StaleVersion { job: JobId },

    #[error("only {owner} may revise {job}")]
    NotOwner { job: JobId, owner: String },

    #[error("application {0} already exists")]
    DuplicateApplication(Uuid),

    #[error("unknown application {0}")]
    UnknownApplication(Uuid),

    #[error("cannot move application from {from:?} to {to:?}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
}

/// Read access to published jobs.
pub trait JobSource: Send + Sync {
    fn get_job(&self, id: &JobId) -> Option<Arc<Job>>;
}

impl<T: JobSource> JobSource for Arc<T> {
    fn get_job(&self, id: &JobId) -> Option<Arc<Job>> {
        (**self).get_job(id)
    }
}

/// In-memory job board. Published versions are immutable; a revision is a
/// new version next to the old one, so proofs made against the old root keep
/// verifying.
#[derive(Default)]
pub struct JobBoard {
    jobs: DashMap<JobId, Arc<Job>>,
    latest: DashMap<String, u32>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish version 1 of a new posting.
    pub fn publish(
        &self,
        posting: &str,
        employer: &str,
        draft: JobDraft,
    ) -> StoreResult<Arc<Job>> {
        match self.latest.entry(posting.to_string()) {
            Entry::Occupied(_) => Err(StoreError::PostingExists(posting.to_string())),
            Entry::Vacant(slot) => {
                let job = Arc::new(Job::publish(JobId::new(posting, 1), employer, draft)?);
                self.jobs.insert(job.id().clone(), Arc::clone(&job));
                slot.insert(1);
                info!(job = %job.id(), regions = job.allowed_regions().len(), "job published");
                Ok(job)
            }
        }
    }

    /// Publish the next version of the posting `current` belongs to.
    pub fn revise(&self, current: &JobId, employer: &str, draft: JobDraft) -> StoreResult<Arc<Job>> {
        let existing = self
            .get_job(current)
            .ok_or_else(|| StoreError::UnknownJob(current.clone()))?;
        if existing.employer() != employer {
            return Err(StoreError::NotOwner {
                job: current.clone(),
                owner: existing.employer().to_string(),
            });
        }

        let mut latest = self
            .latest
            .get_mut(&current.posting)
            .ok_or_else(|| StoreError::UnknownJob(current.clone()))?;
        if *latest != current.version {
            return Err(StoreError::StaleVersion {
                job: current.clone(),
            });
        }

        let job = Arc::new(Job::publish(current.next_version(), employer, draft)?);
        self.jobs.insert(job.id().clone(), Arc::clone(&job));
        *latest = job.id().version;
        info!(job = %job.id(), "job revised");
        Ok(job)
    }

    /// Newest version of `posting`.
    pub fn latest(&self, posting: &str) -> Option<Arc<Job>> {
        let version = *self.latest.get(posting)?;
        self.get_job(&JobId::new(posting, version))
    }
}

impl JobSource for JobBoard {
    fn get_job(&self, id: &JobId) -> Option<Arc<Job>> {
        self.jobs.get(id).map(|j| Arc::clone(j.value()))
    }
}

/// Persistence for accepted applications.
pub trait ApplicationStore: Send + Sync {
    fn create(&self, application: Application) -> StoreResult<()>;

    fn get(&self, id: &Uuid) -> Option<Application>;

    /// Move an application along the review state machine.
    fn update_status(&self, id: &Uuid, status: ApplicationStatus) -> StoreResult<Application>;

    fn list_for_job(&self, job: &JobId) -> Vec<Application>;
}

impl<T: ApplicationStore> ApplicationStore for Arc<T> {
    fn create(&self, application: Application) -> StoreResult<()> {
        (**self).create(application)
    }

    fn get(&self, id: &Uuid) -> Option<Application> {
        (**self).get(id)
    }

    fn update_status(&self, id: &Uuid, status: ApplicationStatus) -> StoreResult<Application> {
        (**self).update_status(id, status)
    }

    fn list_for_job(&self, job: &JobId) -> Vec<Application> {
        (**self).list_for_job(job)
    }
}

#[derive(Default)]
pub struct MemoryApplicationStore {
    applications: DashMap<Uuid, Application>,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }
}

impl ApplicationStore for MemoryApplicationStore {
    fn create(&self, application: Application) -> StoreResult<()> {
        match self.applications.entry(application.id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateApplication(application.id)),
            Entry::Vacant(slot) => {
                slot.insert(application);
                Ok(())
            }
        }
    }

    fn get(&self, id: &Uuid) -> Option<Application> {
        self.applications.get(id).map(|a| a.value().clone())
    }

    fn update_status(&self, id: &Uuid, status: ApplicationStatus) -> StoreResult<Application> {
        let mut application = self
            .applications
            .get_mut(id)
            .ok_or(StoreError::UnknownApplication(*id))?;
        if !application.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: application.status,
                to: status,
            });
        }
        application.status = status;
        info!(application = %id, ?status, "application status updated");
        Ok(application.clone())
    }

    fn list_for_job(&self, job: &JobId) -> Vec<Application> {
        let mut found: Vec<Application> = self
            .applications
            .iter()
            .filter(|a| &a.job_id == job)
            .map(|a| a.value().clone())
            .collect();
        found.sort_by_key(|a| (a.created_at, a.id));
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sample_draft, sample_job};
    use crate::model::{ProofSystem, PublicOutputs};
    use crate::nullifier::Nullifier;

    fn application(job: &Job) -> Application {
        Application {
            id: Uuid::new_v4(),
            job_id: job.id().clone(),
            public_outputs: PublicOutputs {
                job_id: job.id().clone(),
                nullifier: Nullifier::from_field(&ark_bn254::Fr::from(3u64)),
                eligible: true,
                timestamp: 1,
            },
            proof_system: ProofSystem::Groth16Bn254,
            status: ApplicationStatus::Pending,
            privacy_score: 100,
            created_at: 1,
        }
    }

    #[test]
    fn test_publish_and_get() {
        let board = JobBoard::new();
        let job = board.publish("acme-protocol", "acme-hr", sample_draft()).unwrap();
        assert_eq!(job.id(), &JobId::new("acme-protocol", 1));
        assert_eq!(board.get_job(job.id()).unwrap().region_root(), job.region_root());
        assert!(matches!(
            board.publish("acme-protocol", "acme-hr", sample_draft()),
            Err(StoreError::PostingExists(_))
        ));
    }

    #[test]
    fn test_invalid_draft_is_rejected() {
        let board = JobBoard::new();
        let mut draft = sample_draft();
        draft.salary_min = 200_000;
        assert!(matches!(
            board.publish("bad", "acme-hr", draft),
            Err(StoreError::InvalidJob(_))
        ));
        // A failed publish leaves no trace.
        assert!(board.latest("bad").is_none());
    }

    #[test]
    fn test_revise_keeps_old_version() {
        let board = JobBoard::new();
        let v1 = board.publish("acme-protocol", "acme-hr", sample_draft()).unwrap();

        let mut draft = sample_draft();
        draft.allowed_regions.insert("DE-BE".into());
        let v2 = board.revise(v1.id(), "acme-hr", draft.clone()).unwrap();

        assert_eq!(v2.id().version, 2);
        assert_ne!(v1.region_root(), v2.region_root());
        assert_eq!(board.get_job(v1.id()).unwrap().region_root(), v1.region_root());
        assert_eq!(board.latest("acme-protocol").unwrap().id(), v2.id());

        assert!(matches!(
            board.revise(v1.id(), "acme-hr", draft.clone()),
            Err(StoreError::StaleVersion { .. })
        ));
        assert!(matches!(
            board.revise(v2.id(), "mallory", draft),
            Err(StoreError::NotOwner { .. })
        ));
    }

    #[test]
    fn test_status_transitions() {
        let store = MemoryApplicationStore::new();
        let app = application(&sample_job());
        store.create(app.clone()).unwrap();
        assert!(matches!(
            store.create(app.clone()),
            Err(StoreError::DuplicateApplication(_))
        ));

        assert!(matches!(
            store.update_status(&app.id, ApplicationStatus::Accepted),
            Err(StoreError::InvalidTransition { .. })
        ));
        store.update_status(&app.id, ApplicationStatus::Reviewing).unwrap();
        let done = store.update_status(&app.id, ApplicationStatus::Accepted).unwrap();
        assert_eq!(done.status, ApplicationStatus::Accepted);
        assert_eq!(store.get(&app.id).unwrap().status, ApplicationStatus::Accepted);

        assert!(matches!(
            store.update_status(&Uuid::new_v4(), ApplicationStatus::Reviewing),
            Err(StoreError::UnknownApplication(_))
        ));
    }

    #[test]
    fn test_list_for_job() {
        let store = MemoryApplicationStore::new();
        let job = sample_job();
        store.create(application(&job)).unwrap();
        store.create(application(&job)).unwrap();
        assert_eq!(store.list_for_job(job.id()).len(), 2);
        assert!(store.list_for_job(&job.id().next_version()).is_empty());
        assert_eq!(store.len(), 2);
    }
}
