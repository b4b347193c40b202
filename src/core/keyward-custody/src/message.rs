//! Messages gated by intents and their results.

use keyward_intent::{Action, ActionPayload};
use serde::{Deserialize, Serialize};

use crate::sign_method::PackedMetadata;
use crate::types::hex_bytes;

/// Request to sign `input` with key `key_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgNewSignatureRequest {
    /// Requesting address; pays the keychain fee.
    pub creator: String,
    /// Key to sign with.
    pub key_id: u64,
    /// Analyzer contracts to run, in order.
    #[serde(default)]
    pub analyzers: Vec<String>,
    /// Raw input, interpreted by the key's sign method.
    #[serde(with = "hex_bytes")]
    pub input: Vec<u8>,
    /// Sign-method specific settings.
    #[serde(default)]
    pub metadata: Option<PackedMetadata>,
    /// Blocks the request may wait for approvals (0 = default).
    #[serde(default)]
    pub btl: u64,
}

/// Every message the custody module gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CustodyMessage {
    /// See [`MsgNewSignatureRequest`].
    NewSignatureRequest(MsgNewSignatureRequest),
}

/// Discriminant of [`CustodyMessage`], used to select the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// [`CustodyMessage::NewSignatureRequest`]
    NewSignatureRequest,
}

/// Result stored on an executed custody action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CustodyResponse {
    /// A sign request was appended.
    NewSignatureRequest {
        /// Id of the new sign request.
        sign_request_id: u64,
    },
}

impl ActionPayload for CustodyMessage {
    type Kind = MessageKind;
    type Output = CustodyResponse;

    fn kind(&self) -> MessageKind {
        match self {
            CustodyMessage::NewSignatureRequest(_) => MessageKind::NewSignatureRequest,
        }
    }
}

/// An action wrapping a custody message.
pub type CustodyAction = Action<CustodyMessage>;
