//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use keyward_custody::CustodyError;
use keyward_intent::IntentError;
use serde_json::json;
use thiserror::Error;

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Domain failure from the custody module.
    #[error(transparent)]
    Custody(#[from] CustodyError),

    /// Malformed request outside the domain's own validation.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Custody(err) => custody_status(err),
        }
    }
}

fn custody_status(err: &CustodyError) -> StatusCode {
    match err {
        CustodyError::NotFound { .. } => StatusCode::NOT_FOUND,
        CustodyError::InactiveKeychain(_) | CustodyError::InsufficientFunds { .. } => StatusCode::CONFLICT,
        CustodyError::MultipleOverride { .. }
        | CustodyError::AnalyzerExecution { .. }
        | CustodyError::MetadataUnpack(_)
        | CustodyError::TransferParse(_)
        | CustodyError::UnknownSignMethod(_)
        | CustodyError::PolicyEvaluation(_)
        | CustodyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CustodyError::Intent(err) => intent_status(err),
        CustodyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn intent_status(err: &IntentError) -> StatusCode {
    match err {
        IntentError::IntentNotFound(_) | IntentError::ActionNotFound(_) => StatusCode::NOT_FOUND,
        IntentError::ActionNotPending { .. } | IntentError::AlreadyApproved { .. } => StatusCode::CONFLICT,
        IntentError::ActionExpired { .. } => StatusCode::PRECONDITION_FAILED,
        IntentError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        IntentError::Parse { .. } | IntentError::Evaluation(_) | IntentError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        },
        IntentError::NoHandler(_) | IntentError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found: ApiError = CustodyError::NotFound { entity: "key", id: 4 }.into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let inactive: ApiError = CustodyError::InactiveKeychain(1).into();
        assert_eq!(inactive.status(), StatusCode::CONFLICT);

        let expired: ApiError = CustodyError::Intent(IntentError::ActionExpired { id: 1, timeout_height: 3 }).into();
        assert_eq!(expired.status(), StatusCode::PRECONDITION_FAILED);

        let policy: ApiError = CustodyError::PolicyEvaluation("unknown identifier".into()).into();
        assert_eq!(policy.status(), StatusCode::BAD_REQUEST);
    }
}
