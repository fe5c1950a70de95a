//! Fixed-depth binary Merkle tree over Poseidon.
//!
//! The eligibility circuit is compiled for one tree depth, so every tree that
//! feeds it is padded with zero leaves up to [`REGION_TREE_DEPTH`] levels
//! regardless of how many leaves are actually present.

use ark_bn254::Fr;
use ark_std::vec::Vec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::hash::{field_from_bytes, field_to_bytes, PoseidonHasher, FIELD_BYTES};

/// Depth of every region tree (32 regions per job at most).
pub const REGION_TREE_DEPTH: usize = 5;

/// Deepest tree [`MerkleTree::with_depth`] will allocate.
pub const MAX_DEPTH: usize = 30;

/// Value of every unused leaf slot. Never a member; the eligibility circuit
/// refuses it as a region leaf.
pub fn padding_leaf() -> Fr {
    Fr::from(0u64)
}

/// Membership witness: the leaf plus one sibling per level, bottom first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerklePath {
    pub leaf: Fr,
    pub siblings: Vec<Fr>,
    /// `true` where the running node is the right child at that level.
    pub indices: Vec<bool>,
}

impl MerklePath {
    pub fn verify(&self, root: &Fr, hasher: &PoseidonHasher) -> bool {
        self.siblings.len() == self.indices.len() && self.compute_root(hasher) == *root
    }

    /// Fold the leaf up through every sibling.
    pub fn compute_root(&self, hasher: &PoseidonHasher) -> Fr {
        self.siblings
            .iter()
            .zip(&self.indices)
            .fold(self.leaf, |node, (sibling, &node_is_right)| {
                if node_is_right {
                    hasher.hash_two(sibling, &node)
                } else {
                    hasher.hash_two(&node, sibling)
                }
            })
    }

    pub fn depth(&self) -> usize {
        self.siblings.len()
    }
}

/// Wire form of a [`MerklePath`]: hex siblings plus direction bits.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerklePathData {
    pub leaf: String,
    pub siblings: Vec<String>,
    pub indices: Vec<bool>,
}

impl From<&MerklePath> for MerklePathData {
    fn from(path: &MerklePath) -> Self {
        Self {
            leaf: hex::encode(field_to_bytes(&path.leaf)),
            siblings: path
                .siblings
                .iter()
                .map(|s| hex::encode(field_to_bytes(s)))
                .collect(),
            indices: path.indices.clone(),
        }
    }
}

impl TryFrom<&MerklePathData> for MerklePath {
    type Error = TreeError;

    fn try_from(data: &MerklePathData) -> Result<Self, Self::Error> {
        let decode = |s: &str| -> Result<Fr, TreeError> {
            let bytes =
                hex::decode(s).map_err(|e| TreeError::DeserializationError(e.to_string()))?;
            field_from_bytes(&bytes).map_err(|e| TreeError::DeserializationError(e.to_string()))
        };

        Ok(Self {
            leaf: decode(&data.leaf)?,
            siblings: data
                .siblings
                .iter()
                .map(|s| decode(s))
                .collect::<Result<Vec<_>, _>>()?,
            indices: data.indices.clone(),
        })
    }
}

/// Poseidon Merkle tree kept as one vector per level.
///
/// `levels[0]` holds the zero-padded leaves and the last level holds only the
/// root. Padding leaves are never reported as members.
#[derive(Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Fr>>,
    occupied: usize,
    hasher: PoseidonHasher,
    positions: HashMap<[u8; FIELD_BYTES], usize>,
}

impl MerkleTree {
    /// Build a tree of exactly `depth` levels, padding with zero leaves.
    pub fn with_depth(leaves: Vec<Fr>, depth: usize) -> Result<Self, TreeError> {
        Self::with_hasher(leaves, depth, PoseidonHasher::new())
    }

    pub fn with_hasher(
        mut leaves: Vec<Fr>,
        depth: usize,
        hasher: PoseidonHasher,
    ) -> Result<Self, TreeError> {
        if !(1..=MAX_DEPTH).contains(&depth) {
            return Err(TreeError::UnsupportedDepth(depth));
        }
        let capacity = 1usize << depth;
        let occupied = leaves.len();
        if occupied > capacity {
            return Err(TreeError::TooManyLeaves {
                leaves: occupied,
                capacity,
            });
        }

        // First occurrence wins for duplicate leaves.
        let mut positions = HashMap::with_capacity(occupied);
        for (position, leaf) in leaves.iter().enumerate() {
            positions.entry(field_to_bytes(leaf)).or_insert(position);
        }

        leaves.resize(capacity, padding_leaf());
        let mut levels = Vec::with_capacity(depth + 1);
        levels.push(leaves);
        while let Some(below) = levels.last().filter(|level| level.len() > 1) {
            let above = below
                .chunks_exact(2)
                .map(|pair| hasher.hash_two(&pair[0], &pair[1]))
                .collect();
            levels.push(above);
        }

        Ok(Self {
            levels,
            occupied,
            hasher,
            positions,
        })
    }

    pub fn root(&self) -> Fr {
        self.levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Leaves supplied by the caller, padding excluded.
    pub fn num_leaves(&self) -> usize {
        self.occupied
    }

    pub fn hasher(&self) -> &PoseidonHasher {
        &self.hasher
    }

    pub fn position(&self, leaf: &Fr) -> Option<usize> {
        self.positions.get(&field_to_bytes(leaf)).copied()
    }

    pub fn contains(&self, leaf: &Fr) -> bool {
        self.position(leaf).is_some()
    }

    /// Path for the leaf at `position`, or `None` for a padding slot.
    pub fn path(&self, position: usize) -> Option<MerklePath> {
        if position >= self.occupied {
            return None;
        }

        let depth = self.depth();
        let mut siblings = Vec::with_capacity(depth);
        let mut indices = Vec::with_capacity(depth);
        let mut cursor = position;
        for level in &self.levels[..depth] {
            siblings.push(level[cursor ^ 1]);
            indices.push(cursor & 1 == 1);
            cursor >>= 1;
        }

        Some(MerklePath {
            leaf: self.levels[0][position],
            siblings,
            indices,
        })
    }

    pub fn path_for(&self, leaf: &Fr) -> Option<MerklePath> {
        self.path(self.position(leaf)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("region {0} is not in the job's allowed set")]
    RegionNotAllowed(String),

    #[error("region set is empty")]
    EmptyRegionSet,

    #[error("{leaves} leaves do not fit a tree with {capacity} slots")]
    TooManyLeaves { leaves: usize, capacity: usize },

    #[error("unsupported tree depth {0}")]
    UnsupportedDepth(usize),

    #[error("malformed path encoding: {0}")]
    DeserializationError(String),
}
