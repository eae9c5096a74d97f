//! Merkle tree over attestation hashes
//!
//! The leaf order is load-bearing: all providers build the tree over the
//! consensus-selected attestation hashes in ascending attestation-index
//! order, so the resulting root must be bit-identical across independent
//! implementations.

use crate::hash::{keccak256, Hash32, ZERO_HASH};

/// Merkle tree built once per round over the validated attestation hashes
#[derive(Debug, Clone)]
pub struct MerkleTree {
    root: Hash32,
    leaf_count: usize,
}

impl MerkleTree {
    /// Builds the tree from the ordered leaf hashes.
    /// An empty leaf set yields the all-zero root.
    pub fn new(leaves: &[Hash32]) -> Self {
        let root = if leaves.is_empty() {
            ZERO_HASH
        } else {
            build_tree_level(leaves)
        };
        Self {
            root,
            leaf_count: leaves.len(),
        }
    }

    /// The tree root
    pub fn root(&self) -> Hash32 {
        self.root
    }

    /// Number of leaves the tree was built over
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }
}

/// Recursively builds a level of the Merkle tree
fn build_tree_level(hashes: &[Hash32]) -> Hash32 {
    if hashes.len() == 1 {
        return hashes[0];
    }

    let mut next_level = Vec::with_capacity(hashes.len().div_ceil(2));

    // Process pairs of hashes
    for i in (0..hashes.len()).step_by(2) {
        let left = &hashes[i];
        // If there's no right child, duplicate the left one
        let right = if i + 1 < hashes.len() { &hashes[i + 1] } else { left };

        let mut combined = [0u8; 64];
        combined[..32].copy_from_slice(left);
        combined[32..].copy_from_slice(right);
        next_level.push(keccak256(&combined));
    }

    build_tree_level(&next_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(value: u8) -> Hash32 {
        keccak256(&[value])
    }

    #[test]
    fn test_empty_tree_has_zero_root() {
        let tree = MerkleTree::new(&[]);
        assert_eq!(tree.root(), ZERO_HASH);
        assert_eq!(tree.leaf_count(), 0);
    }

    #[test]
    fn test_single_leaf_is_root() {
        let tree = MerkleTree::new(&[leaf(1)]);
        assert_eq!(tree.root(), leaf(1));
    }

    #[test]
    fn test_root_is_deterministic() {
        let leaves = [leaf(1), leaf(2), leaf(3)];
        let first = MerkleTree::new(&leaves);
        let second = MerkleTree::new(&leaves);
        assert_eq!(first.root(), second.root());
    }

    #[test]
    fn test_leaf_order_changes_root() {
        let forward = MerkleTree::new(&[leaf(1), leaf(2)]);
        let reversed = MerkleTree::new(&[leaf(2), leaf(1)]);
        assert_ne!(forward.root(), reversed.root());
    }

    #[test]
    fn test_odd_count_duplicates_last_leaf() {
        // with three leaves the dangling third is paired with itself
        let leaves = [leaf(1), leaf(2), leaf(3)];
        let tree = MerkleTree::new(&leaves);

        let mut pair = [0u8; 64];
        pair[..32].copy_from_slice(&leaf(1));
        pair[32..].copy_from_slice(&leaf(2));
        let left = keccak256(&pair);
        pair[..32].copy_from_slice(&leaf(3));
        pair[32..].copy_from_slice(&leaf(3));
        let right = keccak256(&pair);
        pair[..32].copy_from_slice(&left);
        pair[32..].copy_from_slice(&right);

        assert_eq!(tree.root(), keccak256(&pair));
    }
}
