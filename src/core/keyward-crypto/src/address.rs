//! Derived module addresses.
//!
//! Module-owned accounts (such as the custody account of a keychain) have no
//! private key. Their address is derived deterministically from a module name
//! and a key, so any node computes the same value:
//!
//! `address = sha256(sha256(module) || key)[..20]`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CryptoError;
use crate::hash::sha256;

/// Length in bytes of an [`Address`].
pub const ADDRESS_LEN: usize = 20;

/// A 20-byte account address, displayed as lowercase hex with a `0x` prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Derives the address of a module-owned account.
    pub fn derive(module: &str, key: &[u8]) -> Self {
        let module_hash = sha256(module.as_bytes());

        let mut preimage = Vec::with_capacity(module_hash.len() + key.len());
        preimage.extend_from_slice(&module_hash);
        preimage.extend_from_slice(key);

        let digest = sha256(&preimage);
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[..ADDRESS_LEN]);
        Self(bytes)
    }

    /// Creates an address from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 20 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != ADDRESS_LEN {
            return Err(CryptoError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_LEN,
                bytes.len()
            )));
        }

        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Returns the raw address bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)
            .map_err(|e| CryptoError::InvalidAddress(format!("hex decode error: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
