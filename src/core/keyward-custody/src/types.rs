//! Custody entities.

use std::fmt;
use std::str::FromStr;

use keyward_crypto::Address;
use keyward_intent::{Expr, Intent, Value};
use serde::{Deserialize, Serialize};

use crate::sign_method::SignMethod;

/// Serializes byte vectors as lowercase hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes as hex.
    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    /// Deserializes from hex, with or without a `0x` prefix.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Fees a keychain charges for its services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Charged once per executed signature request.
    pub signature_request_fee: u64,
}

/// A custody operator grouping keys under one activation flag and fee schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keychain {
    /// Sequence-assigned id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Addresses allowed to manage the keychain.
    #[serde(default)]
    pub admins: Vec<String>,
    /// Whether new signature requests are accepted.
    pub is_active: bool,
    /// Optional fee schedule.
    #[serde(default)]
    pub fees: Option<FeeSchedule>,
}

impl Keychain {
    /// Derived custody address receiving this keychain's fees.
    pub fn address(&self) -> Address {
        Address::derive("keychain", &self.id.to_be_bytes())
    }
}

/// Ownership and policy grouping of keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    /// Sequence-assigned id.
    pub id: u64,
    /// Owner addresses.
    pub owners: Vec<String>,
    /// Intent governing signature requests (0 = generated default).
    #[serde(default)]
    pub sign_intent_id: u64,
}

impl Space {
    /// Intent used when neither the key nor the space configures one:
    /// at least one owner approves.
    pub fn default_sign_intent(&self) -> Intent {
        Intent::generated(
            self.id,
            format!("space-{}-default-sign", self.id),
            Expr::Any(
                Box::new(Expr::Literal(Value::Int(1))),
                Box::new(Expr::Ident("space.owners".to_string())),
            ),
        )
    }
}

/// Key algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// ECDSA over secp256k1.
    EcdsaSecp256k1,
    /// EdDSA over Ed25519.
    EddsaEd25519,
}

/// A managed key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Sequence-assigned id.
    pub id: u64,
    /// Owning space.
    pub space_id: u64,
    /// Keychain holding the key material.
    pub keychain_id: u64,
    /// Intent overriding the space's (0 = none).
    #[serde(default)]
    pub intent_id: u64,
    /// How inputs are turned into data for signing.
    pub sign_method: SignMethod,
    /// Key algorithm.
    pub key_type: KeyType,
    /// Public key, once generated.
    #[serde(default, with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

/// Lifecycle of a sign request. Transitions past `Pending` belong to the
/// signing keychain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignRequestStatus {
    /// Waiting for the keychain.
    Pending,
    /// Signature delivered.
    Fulfilled,
    /// Keychain refused to sign.
    Rejected,
}

impl fmt::Display for SignRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignRequestStatus::Pending => "pending",
            SignRequestStatus::Fulfilled => "fulfilled",
            SignRequestStatus::Rejected => "rejected",
        })
    }
}

impl FromStr for SignRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(SignRequestStatus::Pending),
            "fulfilled" => Ok(SignRequestStatus::Fulfilled),
            "rejected" => Ok(SignRequestStatus::Rejected),
            other => Err(format!("unknown sign request status: {other}")),
        }
    }
}

/// Durable record of an approved request to sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    /// Sequence-assigned id.
    pub id: u64,
    /// Requesting address.
    pub creator: String,
    /// Key to sign with.
    pub key_id: u64,
    /// Keychain the key belongs to.
    pub keychain_id: u64,
    /// Canonical payload handed to the signer.
    #[serde(with = "hex_bytes")]
    pub data_for_signing: Vec<u8>,
    /// Current status.
    pub status: SignRequestStatus,
}
