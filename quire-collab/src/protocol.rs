//! Realtime event protocol.
//!
//! Every WebSocket text frame carries exactly one event:
//! ```text
//! { "event": "send-changes", "data": { "ops": [ { "retain": 5 }, { "insert": "!" } ] } }
//!   └──── event name ────┘   └──────────────── payload ────────────────────────────┘
//! ```
//!
//! Client → server: `join-room`, `send-changes`, `save-document`, `leave-room`.
//! Server → client: `document-loaded`, `receive-changes`, `users-in-room`, `error`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delta::Delta;

/// Identifies one live WebSocket connection.
pub type ConnectionId = Uuid;

/// Who is behind a connection. Resolved once from the credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Checkpoint request sent by an editing session.
///
/// The content is the sender's view of the document. The server persists
/// its own snapshot instead, so the payload is only a hint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinRoom(String),
    SendChanges(Delta),
    SaveDocument(#[serde(default)] SaveHint),
    LeaveRoom(String),
}

/// Body of an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Events the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Current snapshot, sent once per join to the joiner only.
    DocumentLoaded(Delta),
    /// A peer's edit, verbatim as the peer sent it.
    ReceiveChanges(Delta),
    /// Full member list of the room, in join order.
    UsersInRoom(Vec<UserIdentity>),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DocumentLoaded(_) => "document-loaded",
            Self::ReceiveChanges(_) => "receive-changes",
            Self::UsersInRoom(_) => "users-in-room",
            Self::Error(_) => "error",
        }
    }
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "join-room",
            Self::SendChanges(_) => "send-changes",
            Self::SaveDocument(_) => "save-document",
            Self::LeaveRoom(_) => "leave-room",
        }
    }
}

/// Serialize an event to a text frame.
pub fn encode<T: Serialize>(event: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Parse a text frame.
pub fn decode<'a, T: Deserialize<'a>>(frame: &'a str) -> Result<T, ProtocolError> {
    serde_json::from_str(frame).map_err(|e| ProtocolError::Deserialization(e.to_string()))
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("WebSocket error: {0}")]
    Transport(String),
    #[error("Handshake failed: {0}")]
    Handshake(String),
}
