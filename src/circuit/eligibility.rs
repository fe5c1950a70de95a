//! Job eligibility circuit.
//!
//! Proves, without revealing the applicant's values, that:
//! - every skill score meets its slot's threshold,
//! - the expected salary lies in `[salary_min, salary_max]`,
//! - the applicant's region leaf sits under the job's region root and is not
//!   an empty padding slot,
//! - the nullifier is `Poseidon(domain, job_id, secret)`.
//!
//! The first three collapse into the public `eligible` bit; the nullifier
//! relation is enforced unconditionally.
//!
//! Public inputs, in allocation order:
//! `job_id, nullifier, eligible, timestamp, region_root, salary_min,
//! salary_max, threshold_0 .. threshold_7`
//!
//! Private witnesses: skill scores, salary, region leaf, Merkle siblings and
//! directions, applicant secret.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_r1cs_std::{
    alloc::AllocVar, boolean::Boolean, eq::EqGadget, fields::fp::FpVar, fields::FieldVar,
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use ark_std::vec::Vec;

use super::gadgets::{bind, enforce_bit_length, is_ge, merkle_root, poseidon_hash};
use crate::inputs::CircuitInputs;
use crate::merkle::hash::PoseidonHasher;
use crate::merkle::tree::{padding_leaf, REGION_TREE_DEPTH};
use crate::model::{MAX_SKILLS, SALARY_BITS};
use crate::nullifier::nullifier_domain;

/// Bits needed for a score or threshold in `0..=100`.
pub const SCORE_BITS: usize = 7;

/// Circuit for proving a profile satisfies a job's public requirements.
#[derive(Clone)]
pub struct EligibilityCircuit {
    /// Poseidon configuration
    pub poseidon_config: PoseidonConfig<Fr>,

    /// Private: skill scores in slot order
    pub skill_scores: Vec<Option<Fr>>,
    /// Private: expected salary
    pub salary: Option<Fr>,
    /// Private: region leaf
    pub region_leaf: Option<Fr>,
    /// Private: Merkle siblings
    pub path: Vec<Option<Fr>>,
    /// Private: Merkle directions
    pub path_indices: Vec<Option<bool>>,
    /// Private: applicant secret
    pub secret: Option<Fr>,

    /// Public: job identifier
    pub job_id: Option<Fr>,
    /// Public: nullifier
    pub nullifier: Option<Fr>,
    /// Public: eligibility bit
    pub eligible: Option<Fr>,
    /// Public: proof timestamp
    pub timestamp: Option<Fr>,
    /// Public: region Merkle root
    pub region_root: Option<Fr>,
    /// Public: salary bounds
    pub salary_min: Option<Fr>,
    pub salary_max: Option<Fr>,
    /// Public: thresholds in slot order
    pub thresholds: Vec<Option<Fr>>,
}

impl EligibilityCircuit {
    /// Create a circuit with dummy but satisfying values for trusted setup.
    pub fn new_empty() -> Self {
        let hasher = PoseidonHasher::new();
        let zero = Fr::from(0u64);
        let leaf = Fr::from(1u64);

        let mut root = leaf;
        for _ in 0..REGION_TREE_DEPTH {
            root = hasher.hash_two(&root, &zero);
        }
        let job_id = zero;
        let secret = zero;
        let nullifier = hasher.hash_many(&[nullifier_domain(), job_id, secret]);

        Self {
            poseidon_config: hasher.config().clone(),
            skill_scores: vec![Some(zero); MAX_SKILLS],
            salary: Some(zero),
            region_leaf: Some(leaf),
            path: vec![Some(zero); REGION_TREE_DEPTH],
            path_indices: vec![Some(false); REGION_TREE_DEPTH],
            secret: Some(secret),
            job_id: Some(job_id),
            nullifier: Some(nullifier),
            eligible: Some(Fr::from(1u64)),
            timestamp: Some(zero),
            region_root: Some(root),
            salary_min: Some(zero),
            salary_max: Some(zero),
            thresholds: vec![Some(zero); MAX_SKILLS],
        }
    }

    /// Create a circuit with actual witness values, claiming `eligible`.
    pub fn from_inputs(
        inputs: &CircuitInputs,
        eligible: bool,
    ) -> Result<Self, ark_serialize::SerializationError> {
        let hasher = PoseidonHasher::new();
        let (private, public) = (&inputs.private, &inputs.public);
        let nullifier = public.nullifier.to_field()?;

        Ok(Self {
            poseidon_config: hasher.config().clone(),
            skill_scores: private
                .skill_scores
                .iter()
                .map(|s| Some(Fr::from(*s)))
                .collect(),
            salary: Some(Fr::from(private.expected_salary)),
            region_leaf: Some(private.region_path.leaf),
            path: private.region_path.siblings.iter().map(|s| Some(*s)).collect(),
            path_indices: private.region_path.indices.iter().map(|i| Some(*i)).collect(),
            secret: Some(private.secret),
            job_id: Some(public.job_id.to_field()),
            nullifier: Some(nullifier),
            eligible: Some(Fr::from(u64::from(eligible))),
            timestamp: Some(Fr::from(public.timestamp)),
            region_root: Some(public.region_root),
            salary_min: Some(Fr::from(public.salary_min)),
            salary_max: Some(Fr::from(public.salary_max)),
            thresholds: public.thresholds.iter().map(|t| Some(Fr::from(*t))).collect(),
        })
    }

    /// Merkle depth this circuit was built for.
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

fn witness(cs: &ConstraintSystemRef<Fr>, value: Option<Fr>) -> Result<FpVar<Fr>, SynthesisError> {
    FpVar::new_witness(cs.clone(), || value.ok_or(SynthesisError::AssignmentMissing))
}

fn input(cs: &ConstraintSystemRef<Fr>, value: Option<Fr>) -> Result<FpVar<Fr>, SynthesisError> {
    FpVar::new_input(cs.clone(), || value.ok_or(SynthesisError::AssignmentMissing))
}

impl ConstraintSynthesizer<Fr> for EligibilityCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        if self.skill_scores.len() != MAX_SKILLS
            || self.thresholds.len() != MAX_SKILLS
            || self.path.len() != REGION_TREE_DEPTH
            || self.path_indices.len() != REGION_TREE_DEPTH
        {
            return Err(SynthesisError::Unsatisfiable);
        }

        // Public inputs, in wire order.
        let job_id = input(&cs, self.job_id)?;
        let nullifier = input(&cs, self.nullifier)?;
        let eligible = input(&cs, self.eligible)?;
        let timestamp = input(&cs, self.timestamp)?;
        let region_root = input(&cs, self.region_root)?;
        let salary_min = input(&cs, self.salary_min)?;
        let salary_max = input(&cs, self.salary_max)?;
        let thresholds = self
            .thresholds
            .iter()
            .map(|t| input(&cs, *t))
            .collect::<Result<Vec<_>, _>>()?;

        // Private witnesses.
        let scores = self
            .skill_scores
            .iter()
            .map(|s| witness(&cs, *s))
            .collect::<Result<Vec<_>, _>>()?;
        let salary = witness(&cs, self.salary)?;
        let leaf = witness(&cs, self.region_leaf)?;
        let siblings = self
            .path
            .iter()
            .map(|s| witness(&cs, *s))
            .collect::<Result<Vec<_>, _>>()?;
        let directions = self
            .path_indices
            .iter()
            .map(|idx| {
                Boolean::new_witness(cs.clone(), || idx.ok_or(SynthesisError::AssignmentMissing))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let secret = witness(&cs, self.secret)?;

        let mut checks = Vec::with_capacity(MAX_SKILLS + 4);

        // Skills: range-check both sides, then compare.
        for (score, threshold) in scores.iter().zip(thresholds.iter()) {
            enforce_bit_length(cs.clone(), score, SCORE_BITS)?;
            enforce_bit_length(cs.clone(), threshold, SCORE_BITS)?;
            checks.push(is_ge(cs.clone(), score, threshold, SCORE_BITS)?);
        }

        // Salary within [min, max].
        for value in [&salary, &salary_min, &salary_max] {
            enforce_bit_length(cs.clone(), value, SALARY_BITS)?;
        }
        checks.push(is_ge(cs.clone(), &salary, &salary_min, SALARY_BITS)?);
        checks.push(is_ge(cs.clone(), &salary_max, &salary, SALARY_BITS)?);

        // Region membership. Padding slots hash into the root too, so a
        // padding leaf must not count as a member.
        let computed_root =
            merkle_root(cs.clone(), &self.poseidon_config, &leaf, &siblings, &directions)?;
        checks.push(computed_root.is_eq(&region_root)?);
        checks.push(leaf.is_neq(&FpVar::constant(padding_leaf()))?);

        let all_met = Boolean::kary_and(&checks)?;
        eligible.enforce_equal(&FpVar::from(all_met))?;

        // Nullifier binds the proof to (job, secret).
        let domain = FpVar::constant(nullifier_domain());
        let computed_nullifier =
            poseidon_hash(cs.clone(), &self.poseidon_config, &[domain, job_id, secret])?;
        computed_nullifier.enforce_equal(&nullifier)?;

        bind(&timestamp)?;

        Ok(())
    }
}
