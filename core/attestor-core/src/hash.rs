//! 32-byte hash type and hex helpers

use crate::errors::{CoreError, CoreResult};
use sha3::{Digest, Keccak256};

/// 32-byte hash value used for attestation hashes, Merkle nodes and commitments
pub type Hash32 = [u8; 32];

/// The all-zero hash, used as the empty commitment root
pub const ZERO_HASH: Hash32 = [0u8; 32];

/// Computes the Keccak-256 digest of the input.
/// All participants must use the identical construction, so this is the
/// single hashing entry point for Merkle nodes and commit hashes.
pub fn keccak256(data: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Formats a hash as a `0x`-prefixed lowercase hex string
pub fn to_hex(hash: &Hash32) -> String {
    prefix_0x(&hex::encode(hash))
}

/// Parses a `0x`-prefixed (or bare) hex string into a 32-byte hash
pub fn hash_from_hex(input: &str) -> CoreResult<Hash32> {
    let bytes = bytes_from_hex(input)?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CoreError::InvalidLength { expected: 32, actual })
}

/// Parses a `0x`-prefixed (or bare) hex string into raw bytes
pub fn bytes_from_hex(input: &str) -> CoreResult<Vec<u8>> {
    let stripped = un_prefix_0x(input);
    if stripped.len() % 2 != 0 {
        return Err(CoreError::OddLengthHex(input.to_string()));
    }
    Ok(hex::decode(stripped)?)
}

/// Prepends `0x` if not already present
pub fn prefix_0x(input: &str) -> String {
    if input.starts_with("0x") {
        input.to_string()
    } else {
        format!("0x{input}")
    }
}

/// Strips a leading `0x` if present
pub fn un_prefix_0x(input: &str) -> &str {
    input.strip_prefix("0x").unwrap_or(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let hash = keccak256(b"attestor");
        let encoded = to_hex(&hash);
        assert!(encoded.starts_with("0x"));
        assert_eq!(encoded.len(), 66);
        assert_eq!(hash_from_hex(&encoded).unwrap(), hash);
    }

    #[test]
    fn test_keccak_known_vector() {
        // keccak256("") is a fixed constant
        let empty = keccak256(b"");
        assert_eq!(
            to_hex(&empty),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(matches!(
            hash_from_hex("0x1234"),
            Err(CoreError::InvalidLength { expected: 32, actual: 2 })
        ));
        assert!(matches!(hash_from_hex("0x123"), Err(CoreError::OddLengthHex(_))));
    }
}
