//! Wire protocol for the admin session
//!
//! Every frame is a JSON text message shaped as a named event plus payload.
//! Responses to commands arrive on a dynamic event named after the command's
//! correlation token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed channel carrying outbound admin commands
pub const ADMIN_SOCKET_API_ACTION: &str = "ADMIN_SOCKET_API_ACTION";
/// Verification handshake request, sent once per physical connection
pub const ADMIN_VERIFY_SOCKET: &str = "ADMIN_VERIFY_SOCKET";
/// Verification verdicts
pub const ADMIN_SOCKET_VERIFIED: &str = "ADMIN_SOCKET_VERIFIED";
pub const ADMIN_SOCKET_VERIFY_ERROR: &str = "ADMIN_SOCKET_VERIFY_ERROR";
/// Inbound read-query requests served while the app is active
pub const ADMIN_SOCKET_GET_QUERY: &str = "ADMIN_SOCKET_GET_QUERY";
/// Inbound write-document requests served while the app is active
pub const ADMIN_SOCKET_WRITE_DOC: &str = "ADMIN_SOCKET_WRITE_DOC";

/// One WebSocket text frame: a named event with an opaque payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// Admin command actions understood by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminAction {
    #[serde(rename = "START_APP")]
    StartApp,
    #[serde(rename = "STOP_APP")]
    StopApp,
}

/// Outbound command envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCommand {
    pub action: AdminAction,
    pub body: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
}

impl ApiCommand {
    pub fn new(action: AdminAction, body: Value) -> Self {
        Self {
            action,
            body,
            response_id: None,
        }
    }
}

/// Error body attached to a failed response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl ApiError {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            date: None,
        }
    }
}

/// Inbound response envelope, delivered on the token's event channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Inbound route request forwarded by the service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    pub route_id: String,
    #[serde(default)]
    pub body: Value,
    pub response_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get_doc: Option<bool>,
}

/// Body shape of an inbound write-document request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteBody {
    #[serde(default)]
    pub client_data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_data: Option<crate::traits::WriteDoc>,
}
