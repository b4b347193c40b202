//! # Keyward Crypto
//!
//! Core cryptographic primitives for Keyward.
//!
//! This crate provides the small set of primitives the custody core needs:
//! - SHA-256 and Keccak-256 digests used by the signing payload parsers
//! - Derived module addresses (e.g. the custody address of a keychain)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod error;
pub mod hash;

pub use address::{Address, ADDRESS_LEN};
pub use error::CryptoError;
pub use hash::{keccak256, sha256, Digest32};
