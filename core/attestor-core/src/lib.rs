//! Attestor Core Module
//!
//! Primitive value types shared across the attestation provider:
//! bit-vote bitmasks, 32-byte hashes, Merkle trees and the
//! commit-reveal masking construction.

pub mod bitmask;
pub mod commitment;
pub mod errors;
pub mod hash;
pub mod merkle;

// Re-export main types for public API
pub use bitmask::BitmaskAccumulator;
pub use commitment::{commit_hash, crypto_safe_random};
pub use errors::{CoreError, CoreResult};
pub use hash::{keccak256, Hash32, ZERO_HASH};
pub use merkle::MerkleTree;
