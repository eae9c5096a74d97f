//! Commit-reveal masking construction
//!
//! The masked Merkle root binds the round's true root, a fresh random value
//! and the submitting account, so a reveal cannot be replayed by a different
//! submitter. Every provider in the network must use the identical
//! construction for the on-chain verification to succeed.

use crate::errors::CoreResult;
use crate::hash::{bytes_from_hex, keccak256, Hash32};
use rand::rngs::OsRng;
use rand::RngCore;

/// Computes the masked commitment `keccak256(root || random || address)`.
/// The address is the submitter's account as a hex string.
pub fn commit_hash(merkle_root: &Hash32, random: &Hash32, address: &str) -> CoreResult<Hash32> {
    let address_bytes = bytes_from_hex(&address.to_lowercase())?;
    let mut data = Vec::with_capacity(64 + address_bytes.len());
    data.extend_from_slice(merkle_root);
    data.extend_from_slice(random);
    data.extend_from_slice(&address_bytes);
    Ok(keccak256(&data))
}

/// Generates a cryptographically secure 32-byte random value for the
/// commit-reveal scheme
pub fn crypto_safe_random() -> Hash32 {
    let mut random = [0u8; 32];
    OsRng.fill_bytes(&mut random);
    random
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ZERO_HASH;

    const ADDRESS: &str = "0x1a0cc05953efa5b79b0d1d69db8a40ceea6df9aa";

    #[test]
    fn test_commit_hash_is_deterministic() {
        let root = keccak256(b"root");
        let random = keccak256(b"random");
        let first = commit_hash(&root, &random, ADDRESS).unwrap();
        let second = commit_hash(&root, &random, ADDRESS).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_commit_hash_binds_all_inputs() {
        let root = keccak256(b"root");
        let random = keccak256(b"random");
        let base = commit_hash(&root, &random, ADDRESS).unwrap();

        let other_root = commit_hash(&ZERO_HASH, &random, ADDRESS).unwrap();
        let other_random = commit_hash(&root, &ZERO_HASH, ADDRESS).unwrap();
        let other_address =
            commit_hash(&root, &random, "0x2b1dd06a64efa5b79b0d1d69db8a40ceea6df9bb").unwrap();

        assert_ne!(base, other_root);
        assert_ne!(base, other_random);
        assert_ne!(base, other_address);
    }

    #[test]
    fn test_commit_hash_ignores_address_case() {
        let root = keccak256(b"root");
        let random = keccak256(b"random");
        let lower = commit_hash(&root, &random, ADDRESS).unwrap();
        let upper = commit_hash(&root, &random, &ADDRESS.to_uppercase().replace("0X", "0x")).unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_random_values_differ() {
        assert_ne!(crypto_safe_random(), crypto_safe_random());
    }
}
