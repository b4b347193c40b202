//! Actions: payloads awaiting approval.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::intent::Intent;

/// A message that can be wrapped in an [`Action`].
///
/// `Kind` selects the handler; `Output` is what the handler returns and is
/// stored on the action once executed.
pub trait ActionPayload: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Discriminant used for handler dispatch.
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Result recorded when the action executes.
    type Output: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Kind of this payload.
    fn kind(&self) -> Self::Kind;
}

/// Lifecycle state of an action.
///
/// Only `Pending` actions can change; the other states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Waiting for approvals.
    Pending,
    /// Handler ran and the result is recorded.
    Executed,
    /// Timeout height passed before the intent was satisfied.
    Expired,
    /// Rejected by its creator or the gate authority.
    Rejected,
}

impl ActionStatus {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Executed => "executed",
            ActionStatus::Expired => "expired",
            ActionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ActionStatus::Pending),
            "executed" => Ok(ActionStatus::Executed),
            "expired" => Ok(ActionStatus::Expired),
            "rejected" => Ok(ActionStatus::Rejected),
            other => Err(format!("unknown action status: {other}")),
        }
    }
}

/// A payload gated by an intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Action<P: ActionPayload> {
    /// Sequence-assigned id.
    pub id: u64,
    /// Submitter; counts as the first approver.
    pub creator: String,
    /// Wrapped message.
    pub payload: P,
    /// Intent with submission-time bindings already substituted.
    pub intent: Intent,
    /// Distinct approvers in approval order.
    pub approvers: Vec<String>,
    /// Current state.
    pub status: ActionStatus,
    /// Height at which the action was submitted.
    pub created_height: u64,
    /// Last height at which the action may execute.
    pub timeout_height: u64,
    /// Handler output, once executed.
    #[serde(default)]
    pub result: Option<P::Output>,
    /// Reason given on rejection.
    #[serde(default)]
    pub reject_reason: Option<String>,
}

impl<P: ActionPayload> Action<P> {
    /// Whether the action can still change.
    pub fn is_pending(&self) -> bool {
        self.status == ActionStatus::Pending
    }

    /// Whether `height` is past the timeout.
    pub fn is_expired_at(&self, height: u64) -> bool {
        height > self.timeout_height
    }
}

/// Criteria for listing actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFilter {
    /// Only actions submitted by this address.
    #[serde(default)]
    pub creator: Option<String>,
    /// Only actions in this state.
    #[serde(default)]
    pub status: Option<ActionStatus>,
}

impl ActionFilter {
    /// Whether `action` passes the filter.
    pub fn matches<P: ActionPayload>(&self, action: &Action<P>) -> bool {
        self.creator.as_deref().map_or(true, |c| action.creator == c)
            && self.status.map_or(true, |s| action.status == s)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_display() {
        for s in [
            ActionStatus::Pending,
            ActionStatus::Executed,
            ActionStatus::Expired,
            ActionStatus::Rejected,
        ] {
            assert_eq!(s.to_string().parse::<ActionStatus>().unwrap(), s);
        }
        assert_eq!("PENDING".parse::<ActionStatus>().unwrap(), ActionStatus::Pending);
        assert!("done".parse::<ActionStatus>().is_err());
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_string(&ActionStatus::Executed).unwrap(), r#""executed""#);
    }
}
