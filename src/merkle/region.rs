//! Region allow-list commitments.
//!
//! A job publishes the Poseidon root of its sorted allowed-region set; an
//! applicant proves their region is one of the leaves.
//!
//! The allowed set itself is public: anyone reading the job posting can
//! enumerate it, and the applicant builds the path from that plaintext list.
//! The proof hides *which* leaf the applicant holds, nothing more. Treat this
//! as allow-list membership, not as anonymity of the region set.

use ark_bn254::Fr;
use std::collections::BTreeSet;

use super::hash::label_to_field;
use super::tree::{MerklePath, MerkleTree, TreeError, REGION_TREE_DEPTH};

/// Largest allowed-region set a single job can publish.
pub const MAX_REGIONS: usize = 1 << REGION_TREE_DEPTH;

const REGION_LEAF_DOMAIN: &str = "ghosthire/region-leaf/v1";

/// Canonical form of a region code (`" ca-on "` becomes `"CA-ON"`).
pub fn normalize_region(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Leaf value committed for a region code.
pub fn region_leaf(code: &str) -> Fr {
    label_to_field(&format!("{REGION_LEAF_DOMAIN}:{}", normalize_region(code)))
}

/// Merkle index over one job's allowed regions.
#[derive(Clone)]
pub struct RegionIndex {
    regions: Vec<String>,
    tree: MerkleTree,
}

impl RegionIndex {
    /// Build the index; input order and letter case do not matter.
    pub fn new<I, S>(regions: I) -> Result<Self, TreeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sorted: BTreeSet<String> = regions
            .into_iter()
            .map(|r| normalize_region(r.as_ref()))
            .filter(|r| !r.is_empty())
            .collect();

        if sorted.is_empty() {
            return Err(TreeError::EmptyRegionSet);
        }

        let regions: Vec<String> = sorted.into_iter().collect();
        let leaves = regions.iter().map(|r| region_leaf(r)).collect();
        let tree = MerkleTree::with_depth(leaves, REGION_TREE_DEPTH)?;

        Ok(Self { regions, tree })
    }

    pub fn root(&self) -> Fr {
        self.tree.root()
    }

    /// Sorted, normalized region codes.
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn contains(&self, region: &str) -> bool {
        self.tree.contains(&region_leaf(region))
    }

    /// Membership path for `region`.
    pub fn path(&self, region: &str) -> Result<MerklePath, TreeError> {
        self.tree
            .path_for(&region_leaf(region))
            .ok_or_else(|| TreeError::RegionNotAllowed(normalize_region(region)))
    }

    /// Check a path against this index's root.
    pub fn verify(&self, path: &MerklePath) -> bool {
        path.verify(&self.tree.root(), self.tree.hasher())
    }
}

/// Root committed for an allowed-region set.
pub fn build_root<I, S>(regions: I) -> Result<Fr, TreeError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Ok(RegionIndex::new(regions)?.root())
}

/// Membership path for `region` within `regions`.
///
/// Fails with [`TreeError::RegionNotAllowed`] when the region is not in the
/// set; callers treat that as "not eligible", not as a system fault.
pub fn build_path<I, S>(region: &str, regions: I) -> Result<MerklePath, TreeError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    RegionIndex::new(regions)?.path(region)
}
