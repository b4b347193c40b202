//! Intent and action gate error types.

use keyward_storage::StorageError;
use thiserror::Error;

use crate::action::ActionStatus;

/// Errors raised while parsing or evaluating intents and driving actions.
#[derive(Debug, Error)]
pub enum IntentError {
    /// Intent definition could not be parsed.
    #[error("parse error at offset {position}: {message}")]
    Parse {
        /// Byte offset in the definition.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// Intent evaluation failed (unknown identifier, type mismatch, ...).
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Invalid intent or action input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No intent with this id.
    #[error("intent not found: {0}")]
    IntentNotFound(u64),

    /// No action with this id.
    #[error("action not found: {0}")]
    ActionNotFound(u64),

    /// Action already left the pending state.
    #[error("action {id} is {status}, not pending")]
    ActionNotPending {
        /// Action id.
        id: u64,
        /// Current status.
        status: ActionStatus,
    },

    /// Action passed its timeout height.
    #[error("action {id} expired at height {timeout_height}")]
    ActionExpired {
        /// Action id.
        id: u64,
        /// Last height at which the action could execute.
        timeout_height: u64,
    },

    /// The approver already approved this action.
    #[error("{approver} already approved action {id}")]
    AlreadyApproved {
        /// Action id.
        id: u64,
        /// Duplicate approver.
        approver: String,
    },

    /// Caller may not perform this operation on the action.
    #[error("{caller} is not allowed to modify action {id}")]
    Unauthorized {
        /// Action id.
        id: u64,
        /// Rejected caller.
        caller: String,
    },

    /// No handler registered for the payload kind.
    #[error("no handler registered for {0}")]
    NoHandler(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl IntentError {
    pub(crate) fn eval(message: impl Into<String>) -> Self {
        IntentError::Evaluation(message.into())
    }
}
