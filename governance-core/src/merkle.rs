//! Merkle tree over ordered leaf hashes. Odd levels
//! duplicate the last node ("pair with self") instead of promoting it
//! unpaired, so every level except the root has an even width.

use contract_model::hash::hex_pair_hash;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling_hash: String,
    pub position: Position,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_hash: String,
    pub path: Vec<ProofStep>,
    pub root: String,
}

impl MerkleProof {
    /// Fold the leaf with each sibling in its recorded position and compare
    /// to the stored root.
    pub fn verify(&self) -> bool {
        let mut current = self.leaf_hash.clone();
        for step in &self.path {
            current = match step.position {
                // sibling is on the left: parent = H(sibling || current)
                Position::Left => hex_pair_hash(&step.sibling_hash, &current),
                // sibling is on the right: parent = H(current || sibling)
                Position::Right => hex_pair_hash(&current, &step.sibling_hash),
            };
        }
        current == self.root
    }
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<String>>,
}

impl MerkleTree {
    /// Build from an ordered, non-empty list of leaf hashes.
    pub fn build(leaves: &[String]) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }
        let mut levels = vec![leaves.to_vec()];
        while levels.last().unwrap().len() > 1 {
            let current = levels.last().unwrap();
            let mut next = Vec::with_capacity((current.len() + 1) / 2);
            let mut i = 0;
            while i < current.len() {
                let left = &current[i];
                let right = if i + 1 < current.len() {
                    &current[i + 1]
                } else {
                    left
                };
                next.push(hex_pair_hash(left, right));
                i += 2;
            }
            levels.push(next);
        }
        Some(Self { levels })
    }

    pub fn root(&self) -> &str {
        &self.levels.last().unwrap()[0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Inclusion proof for the leaf at `index`. `None` if out of range.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count() {
            return None;
        }
        let leaf_hash = self.levels[0][index].clone();
        let mut path = Vec::new();
        let mut i = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = i ^ 1;
            let sibling = if sibling_index < level.len() {
                level[sibling_index].clone()
            } else {
                level[i].clone()
            };
            // i even -> this node is the left child -> sibling is on the right.
            let position = if i % 2 == 0 { Position::Right } else { Position::Left };
            path.push(ProofStep { sibling_hash: sibling, position });
            i /= 2;
        }
        Some(MerkleProof {
            leaf_hash,
            path,
            root: self.root().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contract_model::hash::hex_sha256;

    fn leaf(s: &str) -> String {
        hex_sha256(s.as_bytes())
    }

    #[test]
    fn single_leaf_tree_root_equals_leaf() {
        let leaves = vec![leaf("a")];
        let tree = MerkleTree::build(&leaves).unwrap();
        assert_eq!(tree.root(), leaves[0]);
        let proof = tree.proof(0).unwrap();
        assert!(proof.path.is_empty());
        assert!(proof.verify());
    }

    #[test]
    fn three_leaf_tree_proof_has_two_steps_and_verifies() {
        let leaves = vec![leaf("a"), leaf("b"), leaf("c")];
        let tree = MerkleTree::build(&leaves).unwrap();
        let proof = tree.proof(0).unwrap();
        assert_eq!(proof.path.len(), 2);
        assert!(proof.verify());
    }

    #[test]
    fn tampered_leaf_fails_verification() {
        let leaves = vec![leaf("a"), leaf("b"), leaf("c")];
        let tree = MerkleTree::build(&leaves).unwrap();
        let mut proof = tree.proof(1).unwrap();
        assert!(proof.verify());
        proof.leaf_hash = leaf("tampered");
        assert!(!proof.verify());
    }

    #[test]
    fn proof_for_every_leaf_verifies_in_even_sized_tree() {
        let leaves: Vec<String> = (0..8).map(|i| leaf(&i.to_string())).collect();
        let tree = MerkleTree::build(&leaves).unwrap();
        for i in 0..leaves.len() {
            assert!(tree.proof(i).unwrap().verify());
        }
    }

    #[test]
    fn out_of_range_index_has_no_proof() {
        let leaves = vec![leaf("a"), leaf("b")];
        let tree = MerkleTree::build(&leaves).unwrap();
        assert!(tree.proof(5).is_none());
    }
}
