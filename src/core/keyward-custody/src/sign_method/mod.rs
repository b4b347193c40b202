//! Sign methods: turning a raw request input into canonical data for signing.
//!
//! The set of schemes is closed. Each variant of [`SignMethod`] owns a parser
//! in its own submodule, and each parser accepts exactly one metadata variant.

pub mod black_box;
pub mod cosmos;
pub mod ethereum;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CustodyError;

pub use ethereum::EthereumTransaction;

/// Type url of [`MetadataEthereum`].
pub const ETHEREUM_METADATA_TYPE_URL: &str = "/keyward.custody.v1.MetadataEthereum";

/// Type url of [`MetadataCosmos`].
pub const COSMOS_METADATA_TYPE_URL: &str = "/keyward.custody.v1.MetadataCosmos";

/// Signing scheme of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SignMethod {
    /// No scheme configured. Never valid for signing.
    Unspecified,
    /// Opaque bytes signed verbatim.
    BlackBox,
    /// Unsigned Ethereum transaction, signed over its EIP-155/EIP-1559 hash.
    Ethereum,
    /// Cosmos JSON sign document, signed over the SHA-256 of its canonical form.
    Cosmos,
}

impl SignMethod {
    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignMethod::Unspecified => "unspecified",
            SignMethod::BlackBox => "black_box",
            SignMethod::Ethereum => "ethereum",
            SignMethod::Cosmos => "cosmos",
        }
    }

    /// Parses `input` into data for signing.
    pub fn parse(&self, input: &[u8], metadata: &Metadata) -> Result<Vec<u8>, CustodyError> {
        match self {
            SignMethod::Unspecified => Err(CustodyError::UnknownSignMethod(self.as_str().to_string())),
            SignMethod::BlackBox => black_box::parse(input),
            SignMethod::Ethereum => match metadata {
                Metadata::Ethereum(meta) => ethereum::parse(input, meta),
                other => Err(metadata_mismatch(*self, other)),
            },
            SignMethod::Cosmos => match metadata {
                Metadata::Cosmos(meta) => cosmos::parse(input, meta),
                other => Err(metadata_mismatch(*self, other)),
            },
        }
    }
}

fn metadata_mismatch(method: SignMethod, metadata: &Metadata) -> CustodyError {
    CustodyError::TransferParse(format!(
        "{} requires its own metadata, got {}",
        method.as_str(),
        metadata.name()
    ))
}

impl fmt::Display for SignMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignMethod {
    type Err = CustodyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "black_box" | "blackbox" => Ok(SignMethod::BlackBox),
            "ethereum" | "eth" => Ok(SignMethod::Ethereum),
            "cosmos" => Ok(SignMethod::Cosmos),
            _ => Err(CustodyError::UnknownSignMethod(s.to_string())),
        }
    }
}

/// Unknown names decode to `Unspecified` so they fail at execution, not at load.
impl From<String> for SignMethod {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(SignMethod::Unspecified)
    }
}

impl From<SignMethod> for String {
    fn from(m: SignMethod) -> Self {
        m.as_str().to_string()
    }
}

/// Ethereum parser settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEthereum {
    /// Chain the transaction must target.
    pub chain_id: u64,
}

/// Cosmos parser settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataCosmos {
    /// Chain the sign document must target.
    pub chain_id: String,
}

/// Metadata as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedMetadata {
    /// Identifies the concrete metadata type.
    pub type_url: String,
    /// Encoded metadata.
    pub value: serde_json::Value,
}

/// Unpacked request metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Metadata {
    /// No metadata supplied.
    #[default]
    None,
    /// Ethereum settings.
    Ethereum(MetadataEthereum),
    /// Cosmos settings.
    Cosmos(MetadataCosmos),
}

impl Metadata {
    /// Resolves packed metadata into its concrete variant.
    pub fn unpack(packed: Option<&PackedMetadata>) -> Result<Self, CustodyError> {
        let Some(packed) = packed else {
            return Ok(Metadata::None);
        };
        let decode_err = |e: serde_json::Error| CustodyError::MetadataUnpack(format!("{}: {e}", packed.type_url));
        match packed.type_url.as_str() {
            ETHEREUM_METADATA_TYPE_URL => serde_json::from_value(packed.value.clone())
                .map(Metadata::Ethereum)
                .map_err(decode_err),
            COSMOS_METADATA_TYPE_URL => serde_json::from_value(packed.value.clone())
                .map(Metadata::Cosmos)
                .map_err(decode_err),
            other => Err(CustodyError::MetadataUnpack(format!("unknown type url {other}"))),
        }
    }

    /// Wire form, `None` for absent metadata.
    pub fn pack(&self) -> Option<PackedMetadata> {
        let (type_url, value) = match self {
            Metadata::None => return None,
            Metadata::Ethereum(m) => (ETHEREUM_METADATA_TYPE_URL, serde_json::json!({ "chain_id": m.chain_id })),
            Metadata::Cosmos(m) => (COSMOS_METADATA_TYPE_URL, serde_json::json!({ "chain_id": m.chain_id })),
        };
        Some(PackedMetadata {
            type_url: type_url.to_string(),
            value,
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Metadata::None => "none",
            Metadata::Ethereum(_) => "ethereum metadata",
            Metadata::Cosmos(_) => "cosmos metadata",
        }
    }
}
