//! Session error taxonomy and the wire-format error shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_wire::WireError;

/// Machine-readable code carried by a [`RemoteError`]: a number or a string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    /// Numeric code.
    Number(serde_json::Number),
    /// Textual code.
    Text(String),
}

/// Error shape exchanged over the wire: `{message, code, type}`.
///
/// Produced by failing hook handlers (travels inside an ACK) and by ERROR
/// packets. Receive-side coercions: a non-string `message` becomes
/// `"No message."`, a `code` that is neither number nor string becomes
/// `null`, a non-string `type` becomes `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Human-readable message.
    pub message: String,
    /// Machine-readable code, if any.
    pub code: Option<ErrorCode>,
    /// Error class name, if any.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl RemoteError {
    /// Fallback message for malformed error objects.
    pub const NO_MESSAGE: &'static str = "No message.";

    /// Create an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            kind: None,
        }
    }

    /// Attach a numeric code.
    #[must_use]
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(ErrorCode::Number(code.into()));
        self
    }

    /// Attach a textual code.
    #[must_use]
    pub fn with_text_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(ErrorCode::Text(code.into()));
        self
    }

    /// Attach an error class name.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Build from a decoded wire value, applying the receive-side coercions.
    pub fn from_value(value: &Value) -> Self {
        let message = match value.get("message").and_then(Value::as_str) {
            Some(text) => text.to_owned(),
            None => Self::NO_MESSAGE.to_owned(),
        };
        let code = match value.get("code") {
            Some(Value::Number(n)) => Some(ErrorCode::Number(n.clone())),
            Some(Value::String(s)) => Some(ErrorCode::Text(s.clone())),
            _ => None,
        };
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_owned);
        Self {
            message,
            code,
            kind,
        }
    }

    /// Wire-format value: `{message, code, type}` with explicit nulls.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RemoteError {}

/// Human-readable name for a WebSocket close code.
///
/// Codes 1000 and 1001 are clean closures and never reach this table in
/// practice; every other code maps to its RFC 6455 name, `UNKNOWN_CODE` on
/// miss.
pub fn close_code_name(code: u16) -> &'static str {
    match code {
        1000 => "NORMAL_CLOSURE",
        1001 => "GOING_AWAY",
        1002 => "PROTOCOL_ERROR",
        1003 => "UNSUPPORTED_DATA",
        1005 => "NO_STATUS_RECEIVED",
        1006 => "ABNORMAL_CLOSURE",
        1007 => "INVALID_FRAME_PAYLOAD_DATA",
        1008 => "POLICY_VIOLATION",
        1009 => "MESSAGE_TOO_BIG",
        1010 => "MISSING_EXTENSION",
        1011 => "INTERNAL_ERROR",
        1012 => "SERVICE_RESTART",
        1013 => "TRY_AGAIN_LATER",
        _ => "UNKNOWN_CODE",
    }
}

/// Whether a close code indicates a clean shutdown.
pub fn is_clean_close(code: u16) -> bool {
    matches!(code, 1000 | 1001)
}

/// Errors surfaced by a session, on the error channel or from API calls.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// The remote peer reported an error (ACK error or ERROR packet).
    #[error("{0}")]
    Remote(RemoteError),

    /// A pending call exceeded its deadline (or the session closed).
    #[error("Job timed out.")]
    JobTimeout,

    /// The transport did not reach the open state in time.
    #[error("Timed out waiting for connection.")]
    ConnectTimeout,

    /// The peer stopped answering ping challenges.
    #[error("Connection is stalling (ping).")]
    Stalling,

    /// The peer requested a transport upgrade, which is unsupported.
    #[error("Cannot upgrade from websocket.")]
    Upgrade,

    /// The chunk did not decode to any known frame.
    #[error("Unknown frame.")]
    UnknownFrame,

    /// The peer violated the protocol in some other way.
    #[error("{message}")]
    Protocol {
        /// What went wrong.
        message: String,
    },

    /// The transport failed.
    #[error("{message}")]
    Transport {
        /// Failure description from the transport.
        message: String,
    },

    /// The transport closed with an abnormal close code.
    #[error("{} (code {code})", close_code_name(*code))]
    AbnormalClose {
        /// WebSocket close code.
        code: u16,
        /// Close reason supplied by the transport.
        reason: String,
    },

    /// A frame or packet failed to decode.
    #[error("{0}")]
    Wire(WireError),

    /// The event name is reserved by the session itself.
    #[error("event name {name:?} is reserved")]
    ReservedName {
        /// Offending name.
        name: String,
    },

    /// A hook is already bound for this event name.
    #[error("hook {name:?} is already bound")]
    DuplicateHook {
        /// Offending name.
        name: String,
    },

    /// A freshly allocated call id collided with a live job.
    #[error("call id {id} collides with a pending job")]
    JobCollision {
        /// The colliding id.
        id: u32,
    },

    /// The session has been destroyed.
    #[error("session is destroyed")]
    Destroyed,

    /// Channel membership is only available on accepted sessions.
    #[error("channel operations require an accepted session")]
    NotInbound,
}

impl SocketError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

impl From<WireError> for SocketError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::UnknownFrameKind(_) => Self::UnknownFrame,
            other => Self::Wire(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_error_display_is_message() {
        let err = RemoteError::new("bad").with_code(42).with_kind("X");
        assert_eq!(err.to_string(), "bad");
    }

    #[test]
    fn remote_error_wire_shape() {
        let err = RemoteError::new("bad").with_code(42).with_kind("X");
        assert_eq!(
            err.to_value(),
            json!({ "message": "bad", "code": 42, "type": "X" })
        );
    }

    #[test]
    fn remote_error_wire_shape_has_explicit_nulls() {
        let err = RemoteError::new("plain");
        assert_eq!(
            err.to_value(),
            json!({ "message": "plain", "code": null, "type": null })
        );
    }

    #[test]
    fn from_value_passes_well_formed_fields() {
        let err = RemoteError::from_value(&json!({
            "message": "boom", "code": "E_BOOM", "type": "RangeError",
        }));
        assert_eq!(err.message, "boom");
        assert_eq!(err.code, Some(ErrorCode::Text("E_BOOM".into())));
        assert_eq!(err.kind.as_deref(), Some("RangeError"));
    }

    #[test]
    fn from_value_coerces_missing_message() {
        let err = RemoteError::from_value(&json!({ "code": 1 }));
        assert_eq!(err.message, RemoteError::NO_MESSAGE);
    }

    #[test]
    fn from_value_coerces_non_string_message() {
        let err = RemoteError::from_value(&json!({ "message": 7 }));
        assert_eq!(err.message, RemoteError::NO_MESSAGE);
    }

    #[test]
    fn from_value_coerces_bad_code_and_type() {
        let err = RemoteError::from_value(&json!({
            "message": "m", "code": { "nested": true }, "type": 3,
        }));
        assert_eq!(err.code, None);
        assert_eq!(err.kind, None);
    }

    #[test]
    fn from_value_keeps_numeric_code() {
        let err = RemoteError::from_value(&json!({ "message": "m", "code": 42 }));
        assert_eq!(err.code, Some(ErrorCode::Number(42.into())));
    }

    #[test]
    fn close_code_table() {
        assert_eq!(close_code_name(1006), "ABNORMAL_CLOSURE");
        assert_eq!(close_code_name(1011), "INTERNAL_ERROR");
        assert_eq!(close_code_name(4999), "UNKNOWN_CODE");
    }

    #[test]
    fn clean_close_codes() {
        assert!(is_clean_close(1000));
        assert!(is_clean_close(1001));
        assert!(!is_clean_close(1006));
    }

    #[test]
    fn abnormal_close_display_uses_table() {
        let err = SocketError::AbnormalClose {
            code: 1006,
            reason: String::new(),
        };
        assert_eq!(err.to_string(), "ABNORMAL_CLOSURE (code 1006)");
    }

    #[test]
    fn wire_facing_messages_are_exact() {
        assert_eq!(SocketError::JobTimeout.to_string(), "Job timed out.");
        assert_eq!(
            SocketError::ConnectTimeout.to_string(),
            "Timed out waiting for connection."
        );
        assert_eq!(
            SocketError::Stalling.to_string(),
            "Connection is stalling (ping)."
        );
        assert_eq!(
            SocketError::Upgrade.to_string(),
            "Cannot upgrade from websocket."
        );
        assert_eq!(SocketError::UnknownFrame.to_string(), "Unknown frame.");
    }

    #[test]
    fn unknown_frame_kind_maps_to_unknown_frame() {
        let err: SocketError = WireError::UnknownFrameKind(9).into();
        assert!(matches!(err, SocketError::UnknownFrame));
    }
}
