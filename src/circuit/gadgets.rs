//! R1CS building blocks shared by the eligibility circuit.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    constraints::CryptographicSpongeVar,
    poseidon::{constraints::PoseidonSpongeVar, PoseidonConfig},
};
use ark_ff::{BigInteger, PrimeField};
use ark_r1cs_std::{
    alloc::AllocVar, boolean::Boolean, eq::EqGadget, fields::fp::FpVar, fields::FieldVar,
    select::CondSelectGadget, R1CSVar,
};
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

/// Poseidon over any number of field elements, absorbed one at a time like
/// [`crate::merkle::PoseidonHasher::hash_many`].
pub fn poseidon_hash(
    cs: ConstraintSystemRef<Fr>,
    config: &PoseidonConfig<Fr>,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::new(cs, config);
    for input in inputs {
        sponge.absorb(input)?;
    }
    let output = sponge.squeeze_field_elements(1)?;
    Ok(output[0].clone())
}

/// Recompute a Merkle root from a leaf, its siblings and direction bits.
pub fn merkle_root(
    cs: ConstraintSystemRef<Fr>,
    config: &PoseidonConfig<Fr>,
    leaf: &FpVar<Fr>,
    siblings: &[FpVar<Fr>],
    is_right: &[Boolean<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut current = leaf.clone();

    for (sibling, is_right) in siblings.iter().zip(is_right.iter()) {
        // is_right: current is the right child, hash(sibling, current)
        let left = FpVar::conditionally_select(is_right, sibling, &current)?;
        let right = FpVar::conditionally_select(is_right, &current, sibling)?;
        current = poseidon_hash(cs.clone(), config, &[left, right])?;
    }

    Ok(current)
}

/// Decompose `value` into `num_bits` little-endian bits, enforcing that it
/// fits. Unsatisfiable when `value >= 2^num_bits`.
pub fn enforce_bit_length(
    cs: ConstraintSystemRef<Fr>,
    value: &FpVar<Fr>,
    num_bits: usize,
) -> Result<Vec<Boolean<Fr>>, SynthesisError> {
    let bits = (0..num_bits)
        .map(|i| {
            Boolean::new_witness(cs.clone(), || {
                let v = value.value()?;
                Ok(v.into_bigint().get_bit(i))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Boolean::le_bits_to_fp_var(&bits)?.enforce_equal(value)?;
    Ok(bits)
}

/// `a >= b` for values already known to fit in `num_bits`.
///
/// `a + 2^n - b` lies in `(0, 2^(n+1))`; its top bit is set exactly when
/// `a >= b`.
pub fn is_ge(
    cs: ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
    num_bits: usize,
) -> Result<Boolean<Fr>, SynthesisError> {
    if num_bits >= 63 {
        return Err(SynthesisError::Unsatisfiable);
    }
    let offset = FpVar::constant(Fr::from(1u64 << num_bits));
    let shifted = a + &offset - b;
    let bits = enforce_bit_length(cs, &shifted, num_bits + 1)?;
    Ok(bits[num_bits].clone())
}

/// Put a public input into a constraint so the proof is bound to its value.
pub fn bind(value: &FpVar<Fr>) -> Result<(), SynthesisError> {
    value.square()?;
    Ok(())
}
