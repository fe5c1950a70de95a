//! GhostHire - apply to jobs without revealing your profile
//!
//! A zero-knowledge eligibility layer for job applications. An applicant
//! proves that their private skills, expected salary and region satisfy a
//! job's public requirements; the employer learns only "eligible" plus a
//! per-job pseudonym (the nullifier) that blocks duplicate applications.
//!
//! # Architecture
//!
//! 1. Employer publishes a job: thresholds, salary range, and a Poseidon
//!    Merkle root over the allowed regions ([`store::JobBoard`])
//! 2. Applicant assembles circuit inputs from their private profile
//!    ([`inputs::CircuitInputs`])
//! 3. [`generator::ProofGenerator`] checks eligibility locally, then proves it
//!    with the configured backend (local Groth16, remote service, or the
//!    development simulator)
//! 4. [`ledger::Ledger`] verifies the proof, consumes the nullifier
//!    atomically, and records a pending application
//!
//! Region privacy is allow-list membership only: the allowed set is public,
//! the proof hides which member the applicant is.

pub mod backend;
pub mod circuit;
pub mod client;
pub mod config;
pub mod generator;
pub mod inputs;
pub mod ledger;
pub mod merkle;
pub mod model;
pub mod nullifier;
pub mod privacy;
pub mod progress;
pub mod prover;
pub mod store;
pub mod verifier;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export main types
pub use backend::{Backend, ProvingBackend};
pub use client::{ApplicantClient, ClientError, WalletContext};
pub use config::Config;
pub use generator::ProofGenerator;
pub use inputs::{CircuitInputs, Requirement};
pub use ledger::{ApplicationSubmission, Ledger, Receipt, Rejection, RejectionReason};
pub use model::{ApplicantProfile, EligibilityProof, Job, JobDraft, JobId};
pub use nullifier::{ApplicantSecret, Nullifier};
pub use prover::{EligibilityProver, ProverError};
pub use verifier::{ProofVerifier, Verifier};
