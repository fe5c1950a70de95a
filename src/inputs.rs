//! Private and public input bundles for the eligibility circuit.
//!
//! Pure data assembly: no I/O, no proving. The same bundle feeds the local
//! Groth16 prover, the remote proving service and the simulator.

use ark_bn254::Fr;
use serde::Serialize;
use std::fmt;

use crate::merkle::hash::PoseidonHasher;
use crate::merkle::region::region_leaf;
use crate::merkle::tree::{MerklePath, TreeError};
use crate::model::{
    unix_now, ApplicantProfile, CircuitId, Job, JobId, ModelError, PublicOutputs, MAX_SKILLS,
};
use crate::nullifier::{Nullifier, NullifierDeriver};

/// Number of field elements in the circuit's public instance.
pub const PUBLIC_INSTANCE_LEN: usize = 7 + MAX_SKILLS;

/// Errors while assembling circuit inputs.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error(transparent)]
    RegionNotAllowed(TreeError),

    #[error("invalid job region set: {0}")]
    Region(TreeError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<TreeError> for InputError {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::RegionNotAllowed(_) => InputError::RegionNotAllowed(e),
            other => InputError::Region(other),
        }
    }
}

/// One unmet job requirement, as seen by the applicant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    Skill { skill: String, threshold: u8 },
    SalaryAboveMinimum { minimum: u64 },
    SalaryBelowMaximum { maximum: u64 },
    Region,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Skill { skill, threshold } => write!(f, "{skill} >= {threshold}"),
            Requirement::SalaryAboveMinimum { minimum } => write!(f, "salary >= {minimum}"),
            Requirement::SalaryBelowMaximum { maximum } => write!(f, "salary <= {maximum}"),
            Requirement::Region => f.write_str("region in allowed set"),
        }
    }
}

/// Witness values. Held only by the applicant's session.
#[derive(Clone)]
pub struct PrivateInputs {
    pub skill_scores: [u64; MAX_SKILLS],
    pub expected_salary: u64,
    pub region: String,
    pub region_path: MerklePath,
    pub secret: Fr,
}

impl fmt::Debug for PrivateInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateInputs(<redacted>)")
    }
}

/// Values the verifier also knows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicInputs {
    pub circuit: CircuitId,
    pub job_id: JobId,
    /// Skill names in slot order; not part of the instance.
    pub skills: Vec<String>,
    pub thresholds: [u64; MAX_SKILLS],
    pub salary_min: u64,
    pub salary_max: u64,
    pub region_root: Fr,
    pub nullifier: Nullifier,
    pub timestamp: u64,
}

impl PublicInputs {
    /// Public outputs claimed for a given eligibility result.
    pub fn outputs(&self, eligible: bool) -> PublicOutputs {
        PublicOutputs {
            job_id: self.job_id.clone(),
            nullifier: self.nullifier,
            eligible,
            timestamp: self.timestamp,
        }
    }

    /// Full ordered instance for the given eligibility flag.
    pub fn instance(&self, eligible: bool) -> Result<Vec<Fr>, ark_serialize::SerializationError> {
        let outputs = self.outputs(eligible).to_fields()?;
        Ok(ordered_instance(
            outputs,
            self.region_root,
            self.salary_min,
            self.salary_max,
            &self.thresholds,
        ))
    }
}

/// Instance a verifier rebuilds from the published job and the claimed outputs.
pub fn public_instance(
    job: &Job,
    outputs: &PublicOutputs,
) -> Result<Vec<Fr>, ark_serialize::SerializationError> {
    Ok(ordered_instance(
        outputs.to_fields()?,
        job.region_root(),
        job.salary_min(),
        job.salary_max(),
        &job.threshold_slots(),
    ))
}

/// `[job_id, nullifier, eligible, timestamp, region_root, salary_min,
/// salary_max, threshold_0 .. threshold_7]`.
fn ordered_instance(
    outputs: [Fr; 4],
    region_root: Fr,
    salary_min: u64,
    salary_max: u64,
    thresholds: &[u64; MAX_SKILLS],
) -> Vec<Fr> {
    let mut instance = Vec::with_capacity(PUBLIC_INSTANCE_LEN);
    instance.extend_from_slice(&outputs);
    instance.push(region_root);
    instance.push(Fr::from(salary_min));
    instance.push(Fr::from(salary_max));
    instance.extend(thresholds.iter().map(|t| Fr::from(*t)));
    instance
}

/// Everything one proving session needs.
#[derive(Clone, Debug)]
pub struct CircuitInputs {
    pub private: PrivateInputs,
    pub public: PublicInputs,
}

impl CircuitInputs {
    /// Assemble inputs for `profile` applying to `job`, stamped now.
    pub fn assemble(profile: &ApplicantProfile, job: &Job) -> Result<Self, InputError> {
        Self::assemble_at(profile, job, unix_now())
    }

    /// Assemble inputs with an explicit timestamp.
    ///
    /// Skills the profile lacks are filled with score 0, which simply fails
    /// any positive threshold.
    pub fn assemble_at(
        profile: &ApplicantProfile,
        job: &Job,
        timestamp: u64,
    ) -> Result<Self, InputError> {
        profile.validate()?;

        let region_path = job.region_index()?.path(&profile.region)?;

        let mut skill_scores = [0u64; MAX_SKILLS];
        for (slot, skill) in skill_scores.iter_mut().zip(job.skill_thresholds().keys()) {
            *slot = u64::from(profile.score(skill));
        }

        let nullifier = NullifierDeriver::new().derive(job.id(), &profile.secret);

        Ok(Self {
            private: PrivateInputs {
                skill_scores,
                expected_salary: profile.expected_salary,
                region: profile.region.clone(),
                region_path,
                secret: profile.secret.to_field(),
            },
            public: PublicInputs {
                circuit: CircuitId::eligibility_v1(),
                job_id: job.id().clone(),
                skills: job.skill_thresholds().keys().cloned().collect(),
                thresholds: job.threshold_slots(),
                salary_min: job.salary_min(),
                salary_max: job.salary_max(),
                region_root: job.region_root(),
                nullifier,
                timestamp,
            },
        })
    }

    /// Requirements these inputs fail; empty means eligible.
    pub fn unmet_requirements(&self) -> Vec<Requirement> {
        let mut unmet = Vec::new();
        let (private, public) = (&self.private, &self.public);

        for (i, (score, threshold)) in private
            .skill_scores
            .iter()
            .zip(public.thresholds.iter())
            .enumerate()
        {
            if score < threshold {
                unmet.push(Requirement::Skill {
                    skill: public.skills.get(i).cloned().unwrap_or_default(),
                    threshold: *threshold as u8,
                });
            }
        }

        if private.expected_salary < public.salary_min {
            unmet.push(Requirement::SalaryAboveMinimum {
                minimum: public.salary_min,
            });
        }
        if private.expected_salary > public.salary_max {
            unmet.push(Requirement::SalaryBelowMaximum {
                maximum: public.salary_max,
            });
        }

        let path = &private.region_path;
        let leaf_matches = path.leaf == region_leaf(&private.region);
        if !leaf_matches || !path.verify(&public.region_root, &PoseidonHasher::new()) {
            unmet.push(Requirement::Region);
        }

        unmet
    }

    pub fn is_eligible(&self) -> bool {
        self.unmet_requirements().is_empty()
    }
}

/// Requirements `profile` fails for `job`.
///
/// A region outside the allow-list is reported as [`Requirement::Region`]
/// alongside any other misses instead of aborting the evaluation.
pub fn evaluate(profile: &ApplicantProfile, job: &Job) -> Result<Vec<Requirement>, InputError> {
    match CircuitInputs::assemble(profile, job) {
        Ok(inputs) => Ok(inputs.unmet_requirements()),
        Err(InputError::RegionNotAllowed(_)) => {
            let mut unmet = Vec::new();
            for (skill, threshold) in job.skill_thresholds() {
                if profile.score(skill) < *threshold {
                    unmet.push(Requirement::Skill {
                        skill: skill.clone(),
                        threshold: *threshold,
                    });
                }
            }
            if profile.expected_salary < job.salary_min() {
                unmet.push(Requirement::SalaryAboveMinimum {
                    minimum: job.salary_min(),
                });
            }
            if profile.expected_salary > job.salary_max() {
                unmet.push(Requirement::SalaryBelowMaximum {
                    maximum: job.salary_max(),
                });
            }
            unmet.push(Requirement::Region);
            Ok(unmet)
        }
        Err(e) => Err(e),
    }
}
