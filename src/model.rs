//! Jobs, applicant profiles, proofs and applications.

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::merkle::hash::label_to_field;
use crate::merkle::region::{normalize_region, RegionIndex};
use crate::merkle::tree::TreeError;
use crate::nullifier::{ApplicantSecret, Nullifier};

/// Skill slots compiled into the eligibility circuit.
pub const MAX_SKILLS: usize = 8;

/// Highest skill score or threshold.
pub const MAX_SCORE: u8 = 100;

/// Bit width of every salary value inside the circuit.
pub const SALARY_BITS: usize = 40;

/// Largest salary the circuit can compare.
pub const MAX_SALARY: u64 = (1u64 << SALARY_BITS) - 1;

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Canonical skill key (`" Rust "` becomes `"rust"`).
pub fn normalize_skill(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Errors for malformed jobs and profiles.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("score {score} for skill {skill} exceeds {MAX_SCORE}")]
    ScoreOutOfRange { skill: String, score: u8 },

    #[error("skill name must not be empty")]
    EmptySkillName,

    #[error("skill {0} is listed more than once")]
    DuplicateSkill(String),

    #[error("{0} skill thresholds exceed the {MAX_SKILLS} supported slots")]
    TooManySkills(usize),

    #[error("salary range [{min}, {max}] is inverted")]
    InvalidSalaryRange { min: u64, max: u64 },

    #[error("salary {0} exceeds the supported maximum")]
    SalaryTooLarge(u64),

    #[error("region set: {0}")]
    Region(#[from] TreeError),
}

/// Versioned job identifier. Revising a posting bumps the version, so proofs
/// made against an earlier version keep verifying against that version's root.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId {
    pub posting: String,
    pub version: u32,
}

impl JobId {
    pub fn new(posting: impl Into<String>, version: u32) -> Self {
        Self {
            posting: posting.into(),
            version,
        }
    }

    pub fn next_version(&self) -> Self {
        Self::new(self.posting.clone(), self.version + 1)
    }

    /// Field element used as the job's public input.
    pub fn to_field(&self) -> Fr {
        label_to_field(&format!("ghosthire/job/{self}"))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.posting, self.version)
    }
}

/// Employer input for a new posting.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobDraft {
    pub title: String,
    pub company: String,
    pub skill_thresholds: BTreeMap<String, u8>,
    pub salary_min: u64,
    pub salary_max: u64,
    pub allowed_regions: BTreeSet<String>,
}

/// A published, immutable job posting.
#[derive(Clone, Debug, Serialize)]
pub struct Job {
    id: JobId,
    employer: String,
    title: String,
    company: String,
    skill_thresholds: BTreeMap<String, u8>,
    salary_min: u64,
    salary_max: u64,
    allowed_regions: BTreeSet<String>,
    #[serde(serialize_with = "serialize_field")]
    region_root: Fr,
}

impl Job {
    /// Validate a draft and commit to its region set.
    pub fn publish(id: JobId, employer: impl Into<String>, draft: JobDraft) -> Result<Self, ModelError> {
        if draft.skill_thresholds.len() > MAX_SKILLS {
            return Err(ModelError::TooManySkills(draft.skill_thresholds.len()));
        }

        let mut skill_thresholds = BTreeMap::new();
        for (skill, threshold) in draft.skill_thresholds {
            let skill = normalize_skill(&skill);
            if skill.is_empty() {
                return Err(ModelError::EmptySkillName);
            }
            if threshold > MAX_SCORE {
                return Err(ModelError::ScoreOutOfRange {
                    skill,
                    score: threshold,
                });
            }
            if skill_thresholds.insert(skill.clone(), threshold).is_some() {
                return Err(ModelError::DuplicateSkill(skill));
            }
        }

        if draft.salary_min > draft.salary_max {
            return Err(ModelError::InvalidSalaryRange {
                min: draft.salary_min,
                max: draft.salary_max,
            });
        }
        if draft.salary_max > MAX_SALARY {
            return Err(ModelError::SalaryTooLarge(draft.salary_max));
        }

        let index = RegionIndex::new(&draft.allowed_regions)?;
        let allowed_regions = index.regions().iter().cloned().collect();

        Ok(Self {
            id,
            employer: employer.into(),
            title: draft.title,
            company: draft.company,
            skill_thresholds,
            salary_min: draft.salary_min,
            salary_max: draft.salary_max,
            allowed_regions,
            region_root: index.root(),
        })
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn employer(&self) -> &str {
        &self.employer
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn skill_thresholds(&self) -> &BTreeMap<String, u8> {
        &self.skill_thresholds
    }

    pub fn salary_min(&self) -> u64 {
        self.salary_min
    }

    pub fn salary_max(&self) -> u64 {
        self.salary_max
    }

    pub fn allowed_regions(&self) -> &BTreeSet<String> {
        &self.allowed_regions
    }

    pub fn region_root(&self) -> Fr {
        self.region_root
    }

    /// Region index rebuilt from the public allow-list.
    pub fn region_index(&self) -> Result<RegionIndex, TreeError> {
        RegionIndex::new(&self.allowed_regions)
    }

    /// Thresholds in circuit slot order, padded with zeros.
    pub fn threshold_slots(&self) -> [u64; MAX_SKILLS] {
        let mut slots = [0u64; MAX_SKILLS];
        for (slot, threshold) in slots.iter_mut().zip(self.skill_thresholds.values()) {
            *slot = u64::from(*threshold);
        }
        slots
    }

    /// Draft carrying this job's content, the starting point for a revision.
    pub fn to_draft(&self) -> JobDraft {
        JobDraft {
            title: self.title.clone(),
            company: self.company.clone(),
            skill_thresholds: self.skill_thresholds.clone(),
            salary_min: self.salary_min,
            salary_max: self.salary_max,
            allowed_regions: self.allowed_regions.clone(),
        }
    }
}

fn serialize_field<S: serde::Serializer>(value: &Fr, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&crate::merkle::hash::field_to_hex(value))
}

/// The applicant's private profile. Never leaves the applicant's machine.
///
/// Deserializing goes through [`ApplicantProfile::new`], so stored profiles
/// are normalized and validated like constructed ones.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "ProfileRecord")]
pub struct ApplicantProfile {
    pub skills: BTreeMap<String, u8>,
    pub region: String,
    pub expected_salary: u64,
    pub secret: ApplicantSecret,
}

impl ApplicantProfile {
    pub fn new(
        skills: BTreeMap<String, u8>,
        region: impl Into<String>,
        expected_salary: u64,
        secret: ApplicantSecret,
    ) -> Result<Self, ModelError> {
        let mut normalized = BTreeMap::new();
        for (skill, score) in skills {
            let skill = normalize_skill(&skill);
            if normalized.insert(skill.clone(), score).is_some() {
                return Err(ModelError::DuplicateSkill(skill));
            }
        }
        let profile = Self {
            skills: normalized,
            region: normalize_region(&region.into()),
            expected_salary,
            secret,
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Range checks the circuit would otherwise fail on.
    pub fn validate(&self) -> Result<(), ModelError> {
        for (skill, score) in &self.skills {
            if *score > MAX_SCORE {
                return Err(ModelError::ScoreOutOfRange {
                    skill: skill.clone(),
                    score: *score,
                });
            }
        }
        if self.expected_salary > MAX_SALARY {
            return Err(ModelError::SalaryTooLarge(self.expected_salary));
        }
        Ok(())
    }

    /// Score for `skill`; missing skills count as zero.
    pub fn score(&self, skill: &str) -> u8 {
        self.skills
            .get(&normalize_skill(skill))
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Deserialize)]
struct ProfileRecord {
    skills: BTreeMap<String, u8>,
    region: String,
    expected_salary: u64,
    secret: ApplicantSecret,
}

impl TryFrom<ProfileRecord> for ApplicantProfile {
    type Error = ModelError;

    fn try_from(record: ProfileRecord) -> Result<Self, Self::Error> {
        Self::new(record.skills, record.region, record.expected_salary, record.secret)
    }
}

impl fmt::Debug for ApplicantProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicantProfile")
            .field("skills", &self.skills.len())
            .field("region", &"<redacted>")
            .field("expected_salary", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Identifier of a deployed circuit. Changing the public-input layout
/// requires a new identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircuitId(pub String);

impl CircuitId {
    pub const ELIGIBILITY_V1: &'static str = "ghosthire-eligibility-v1";

    pub fn eligibility_v1() -> Self {
        Self(Self::ELIGIBILITY_V1.to_string())
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which proving system produced a proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofSystem {
    /// Real Groth16 proof over BN254.
    Groth16Bn254,
    /// Locally synthesized stand-in. Never accepted by a production ledger.
    Simulated,
}

impl fmt::Display for ProofSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Groth16Bn254 => f.write_str("groth16-bn254"),
            Self::Simulated => f.write_str("simulated"),
        }
    }
}

/// Reference to the verification key a proof was made for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationKeyRef(pub String);

impl fmt::Display for VerificationKeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four public outputs of an eligibility proof, in wire order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicOutputs {
    pub job_id: JobId,
    pub nullifier: Nullifier,
    pub eligible: bool,
    pub timestamp: u64,
}

impl PublicOutputs {
    /// `[job_id, nullifier, eligible, timestamp]` as field elements.
    pub fn to_fields(&self) -> Result<[Fr; 4], ark_serialize::SerializationError> {
        Ok([
            self.job_id.to_field(),
            self.nullifier.to_field()?,
            Fr::from(u64::from(self.eligible)),
            Fr::from(self.timestamp),
        ])
    }
}

/// The artifact an applicant submits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityProof {
    pub circuit: CircuitId,
    pub system: ProofSystem,
    #[serde(with = "hex_bytes")]
    pub proof: Vec<u8>,
    pub public_outputs: PublicOutputs,
    pub verification_key: VerificationKeyRef,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Review state of an accepted application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Reviewing,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    /// Employer review moves forward only: pending, reviewing, then a decision.
    pub fn can_transition_to(self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (Pending, Reviewing) | (Reviewing, Accepted) | (Reviewing, Rejected) | (Pending, Rejected)
        )
    }
}

/// An application recorded after its proof was accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub job_id: JobId,
    pub public_outputs: PublicOutputs,
    pub proof_system: ProofSystem,
    pub status: ApplicationStatus,
    pub privacy_score: u8,
    pub created_at: u64,
}
