//! Custody error types.

use keyward_intent::IntentError;
use keyward_storage::StorageError;
use thiserror::Error;

/// Errors raised while proposing or executing a signature request.
///
/// Every variant aborts the atomic unit it occurs in.
#[derive(Debug, Error)]
pub enum CustodyError {
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind ("key", "space", ...).
        entity: &'static str,
        /// Requested id.
        id: u64,
    },

    /// The key's keychain is not accepting requests.
    #[error("keychain {0} is inactive")]
    InactiveKeychain(u64),

    /// More than one analyzer returned data for signing.
    #[error("analyzer {contract} tried to set data for signing after {previous} already did")]
    MultipleOverride {
        /// Contract that already supplied an override.
        previous: String,
        /// Contract that supplied the second override.
        contract: String,
    },

    /// An analyzer contract failed or ran out of gas.
    #[error("analyzer {contract} failed: {reason}")]
    AnalyzerExecution {
        /// Contract address.
        contract: String,
        /// Failure description.
        reason: String,
    },

    /// Request metadata could not be unpacked.
    #[error("failed to unpack metadata: {0}")]
    MetadataUnpack(String),

    /// The input could not be parsed into data for signing.
    #[error("failed to parse tx: {0}")]
    TransferParse(String),

    /// The payer cannot cover the fee.
    #[error("insufficient funds: {account} has {available}{denom}, needs {required}{denom}")]
    InsufficientFunds {
        /// Paying account.
        account: String,
        /// Coin denomination.
        denom: String,
        /// Current balance.
        available: u64,
        /// Amount requested.
        required: u64,
    },

    /// The sign method is unspecified or unknown.
    #[error("unknown sign method: {0}")]
    UnknownSignMethod(String),

    /// The intent could not be evaluated.
    #[error("policy evaluation failed: {0}")]
    PolicyEvaluation(String),

    /// Invalid request input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Action gate error (not found, expired, already approved, ...).
    #[error(transparent)]
    Intent(IntentError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<IntentError> for CustodyError {
    fn from(e: IntentError) -> Self {
        match e {
            IntentError::Evaluation(msg) => CustodyError::PolicyEvaluation(msg),
            IntentError::Storage(e) => CustodyError::Storage(e),
            other => CustodyError::Intent(other),
        }
    }
}

impl CustodyError {
    pub(crate) fn not_found(entity: &'static str, id: u64) -> Self {
        CustodyError::NotFound { entity, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_maps_to_policy_error() {
        let err: CustodyError = IntentError::Evaluation("unknown identifier 'x'".into()).into();
        assert!(matches!(err, CustodyError::PolicyEvaluation(_)));

        let err: CustodyError = IntentError::ActionNotFound(3).into();
        assert_eq!(err.to_string(), "action not found: 3");
    }
}
