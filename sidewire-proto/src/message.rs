//! Protocol message types for controller↔peer communication.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Asks the peer to allow unsigned code execution for a process.
///
/// Serialized as `{"identifier": "...", "processId": 123}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct EnableUnsignedExecutionRequest {
    /// Device identifier the process runs on.
    pub identifier: String,
    /// Target process ID.
    pub process_id: u32,
}

impl EnableUnsignedExecutionRequest {
    /// Creates a request for `process_id` on the device `identifier`.
    pub fn new(identifier: impl Into<String>, process_id: u32) -> Self {
        Self {
            identifier: identifier.into(),
            process_id,
        }
    }
}

/// Response sent from peer to controller.
///
/// Discriminated by the `kind` field. A `kind` outside this set fails to
/// decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
#[non_exhaustive]
pub enum ServerResponse {
    /// The peer rejected the command.
    Error {
        /// Error reported by the peer.
        error: PeerError,
    },
    /// Acknowledgment for [`EnableUnsignedExecutionRequest`].
    EnableUnsignedExecutionAck,
}

impl ServerResponse {
    /// Wire discriminator of this response.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::EnableUnsignedExecutionAck => "enableUnsignedExecutionAck",
        }
    }
}

/// Command-level failure reported by the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct PeerError {
    /// Peer-defined error code.
    pub code: i32,
    /// Human-readable description, if the peer sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PeerError {
    /// Creates a peer error with an optional message.
    pub fn new(code: i32, message: Option<String>) -> Self {
        Self { code, message }
    }
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{message} (code {})", self.code),
            None => write!(f, "peer error code {}", self.code),
        }
    }
}

impl std::error::Error for PeerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_fields() {
        let req = EnableUnsignedExecutionRequest::new("ABCD", 123);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "identifier": "ABCD", "processId": 123 })
        );
    }

    #[test]
    fn decodes_ack() {
        let resp: ServerResponse =
            serde_json::from_str(r#"{ "kind": "enableUnsignedExecutionAck" }"#).unwrap();
        assert_eq!(resp, ServerResponse::EnableUnsignedExecutionAck);
        assert_eq!(resp.kind(), "enableUnsignedExecutionAck");
    }

    #[test]
    fn decodes_error_envelope() {
        let resp: ServerResponse = serde_json::from_str(
            r#"{ "kind": "error", "error": { "code": 7, "message": "denied" } }"#,
        )
        .unwrap();
        match resp {
            ServerResponse::Error { error } => {
                assert_eq!(error.code, 7);
                assert_eq!(error.message.as_deref(), Some("denied"));
                assert_eq!(error.to_string(), "denied (code 7)");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn error_message_is_optional() {
        let resp: ServerResponse =
            serde_json::from_str(r#"{ "kind": "error", "error": { "code": 3 } }"#).unwrap();
        assert_eq!(
            resp,
            ServerResponse::Error {
                error: PeerError::new(3, None)
            }
        );
    }

    #[test]
    fn rejects_unknown_kind() {
        let result = serde_json::from_str::<ServerResponse>(r#"{ "kind": "installProgress" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_kind() {
        let result = serde_json::from_str::<ServerResponse>(r#"{ "error": { "code": 1 } }"#);
        assert!(result.is_err());
    }
}
