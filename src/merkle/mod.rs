pub mod hash;
pub mod region;
pub mod tree;

pub use hash::PoseidonHasher;
pub use region::{build_path, build_root, region_leaf, RegionIndex};
pub use tree::{padding_leaf, MerklePath, MerkleTree, TreeError, REGION_TREE_DEPTH};
