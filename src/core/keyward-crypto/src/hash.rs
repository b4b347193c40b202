//! Digest functions.
//!
//! Every signing payload produced by the custody core is a 32-byte digest
//! computed by one of these functions.

use sha2::Sha256;
use sha3::{Digest, Keccak256};

/// A 32-byte digest.
pub type Digest32 = [u8; 32];

/// Computes the SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> Digest32 {
    Sha256::digest(data).into()
}

/// Computes the Keccak-256 digest of `data` (the Ethereum variant, not SHA3-256).
pub fn keccak256(data: &[u8]) -> Digest32 {
    Keccak256::digest(data).into()
}
