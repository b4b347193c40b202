//! Cosmos JSON sign documents.

use keyward_crypto::sha256;
use serde_json::Value;

use super::MetadataCosmos;
use crate::error::CustodyError;

/// Hashes the RFC 8785 canonical form of a sign document targeting
/// `meta.chain_id`.
pub fn parse(input: &[u8], meta: &MetadataCosmos) -> Result<Vec<u8>, CustodyError> {
    let doc: Value = serde_json::from_slice(input)
        .map_err(|e| CustodyError::TransferParse(format!("invalid sign doc: {e}")))?;
    let chain_id = doc
        .as_object()
        .ok_or_else(|| CustodyError::TransferParse("sign doc must be a JSON object".into()))?
        .get("chain_id")
        .and_then(Value::as_str)
        .ok_or_else(|| CustodyError::TransferParse("sign doc has no chain_id".into()))?;
    if chain_id != meta.chain_id {
        return Err(CustodyError::TransferParse(format!(
            "sign doc chain_id {chain_id} does not match {}",
            meta.chain_id
        )));
    }

    let canonical = serde_jcs::to_vec(&doc).map_err(|e| CustodyError::TransferParse(e.to_string()))?;
    Ok(sha256(&canonical).to_vec())
}
