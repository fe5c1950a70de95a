//! Shared test data: the "acme-protocol" job and Groth16 keys from a fixed seed.

use ark_bn254::{Bn254, Fr};
use ark_groth16::VerifyingKey;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::inputs::CircuitInputs;
use crate::merkle::tree::{padding_leaf, MerkleTree, REGION_TREE_DEPTH};
use crate::merkle::{region_leaf, PoseidonHasher};
use crate::model::{ApplicantProfile, Job, JobDraft, JobId};
use crate::nullifier::ApplicantSecret;
use crate::prover::EligibilityProver;

pub(crate) const SETUP_SEED: u64 = 7;

pub(crate) fn sample_draft() -> JobDraft {
    JobDraft {
        title: "Protocol Engineer".into(),
        company: "Acme".into(),
        skill_thresholds: [("rust".to_string(), 70), ("zk".to_string(), 50)].into(),
        salary_min: 90_000,
        salary_max: 150_000,
        allowed_regions: ["US-CA".to_string(), "CA-ON".to_string()].into(),
    }
}

pub(crate) fn sample_job() -> Job {
    Job::publish(JobId::new("acme-protocol", 1), "acme-hr", sample_draft()).unwrap()
}

pub(crate) fn profile(rust: u8, zk: u8, salary: u64, region: &str) -> ApplicantProfile {
    profile_with_secret(rust, zk, salary, region, [9; 32])
}

pub(crate) fn profile_with_secret(
    rust: u8,
    zk: u8,
    salary: u64,
    region: &str,
    secret: [u8; 32],
) -> ApplicantProfile {
    let skills: BTreeMap<String, u8> = [("rust".to_string(), rust), ("zk".to_string(), zk)].into();
    ApplicantProfile::new(skills, region, salary, ApplicantSecret::from_bytes(secret)).unwrap()
}

/// Setup is slow; every test in the crate shares one key pair.
pub(crate) fn keys() -> (&'static EligibilityProver, &'static VerifyingKey<Bn254>) {
    static KEYS: OnceLock<(EligibilityProver, VerifyingKey<Bn254>)> = OnceLock::new();
    let (prover, vk) =
        KEYS.get_or_init(|| EligibilityProver::setup_with_seed(SETUP_SEED).unwrap());
    (prover, vk)
}

/// Inputs for an otherwise qualified applicant from `region` whose region
/// witness is the last padding slot of `job`'s tree. That slot hashes into the
/// published root like any real leaf.
pub(crate) fn padding_slot_inputs(job: &Job, region: &str) -> CircuitInputs {
    let mut inputs =
        CircuitInputs::assemble_at(&profile(80, 60, 120_000, "CA-ON"), job, 1_700_000_000).unwrap();

    let capacity = 1usize << REGION_TREE_DEPTH;
    let mut leaves: Vec<Fr> = job.allowed_regions().iter().map(|r| region_leaf(r)).collect();
    leaves.resize(capacity, padding_leaf());
    let tree = MerkleTree::with_depth(leaves, REGION_TREE_DEPTH).unwrap();
    assert_eq!(tree.root(), job.region_root());

    inputs.private.region = region.to_string();
    inputs.private.region_path = tree.path(capacity - 1).unwrap();
    assert_eq!(inputs.private.region_path.leaf, padding_leaf());
    assert!(inputs
        .private
        .region_path
        .verify(&job.region_root(), &PoseidonHasher::new()));
    inputs
}
