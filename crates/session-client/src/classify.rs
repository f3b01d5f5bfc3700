//! User-facing messages for failed requests
//!
//! Maps a failed response (status and JSON body) or a transport failure to
//! the text shown by the notifier. Server-provided messages win over the
//! generic status texts, so validation errors reach the user verbatim.

use serde_json::Value;

pub const SESSION_EXPIRED_MESSAGE: &str = "session expired, please log in again";
pub const FORBIDDEN_MESSAGE: &str = "insufficient permission";
pub const PAYLOAD_TOO_LARGE_MESSAGE: &str = "payload too large";
pub const SERVER_BUSY_MESSAGE: &str = "server busy, try again later";
pub const NETWORK_FALLBACK_MESSAGE: &str = "request failed, check network";

/// Body fields consulted before the status code, highest precedence first.
const MESSAGE_FIELDS: &[&str] = &["error", "detail"];

/// Classify a failed request into a user-facing message.
///
/// Precedence, first match wins:
/// 1. `error` field of the body
/// 2. `detail` field of the body
/// 3. 401, 403, 413, then any 5xx status
/// 4. the transport message, or a generic network hint
pub fn classify_error(
    status: Option<u16>,
    body: Option<&Value>,
    transport_message: Option<&str>,
) -> String {
    if let Some(body) = body {
        for field in MESSAGE_FIELDS {
            if let Some(message) = body.get(field).and_then(message_text) {
                return message;
            }
        }
    }

    match status {
        Some(401) => return SESSION_EXPIRED_MESSAGE.to_string(),
        Some(403) => return FORBIDDEN_MESSAGE.to_string(),
        Some(413) => return PAYLOAD_TOO_LARGE_MESSAGE.to_string(),
        Some(s) if s >= 500 => return SERVER_BUSY_MESSAGE.to_string(),
        _ => {}
    }

    match transport_message {
        Some(message) if !message.is_empty() => message.to_string(),
        _ => NETWORK_FALLBACK_MESSAGE.to_string(),
    }
}

/// Render a body field as message text. Empty, null, false and zero values
/// carry no message.
fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}
