//! Opaque payloads.

use crate::error::CustodyError;

/// Returns the input unchanged. Empty input is rejected.
pub fn parse(input: &[u8]) -> Result<Vec<u8>, CustodyError> {
    if input.is_empty() {
        return Err(CustodyError::TransferParse("empty black box payload".into()));
    }
    Ok(input.to_vec())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        assert_eq!(parse(b"hello").unwrap(), b"hello".to_vec());
        assert!(parse(b"").is_err());
    }
}
