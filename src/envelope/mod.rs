//! Result envelope: the uniform shape every invocation returns.
//!
//! ```text
//! { "successful": true,  "data": <value> }
//! { "successful": false, "error": { "kind": "INVALID_INPUT", "message": "...", "violations": [...] } }
//! ```
//!
//! Exactly one of `data`/`error` is present. The invariant is enforced by
//! construction and re-checked on deserialization.

mod kinds;

pub use kinds::ErrorKind;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::Violation;

/// Default cap for `error.message`.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 512;

// =============================================================================
// Error info
// =============================================================================

/// Caller-facing error detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    /// Per-field detail for `INVALID_INPUT`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    /// HTTP status for `REMOTE_CALL` errors that got a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorInfo {
    /// Build with a sanitized message capped at `max_len` characters.
    pub fn new(kind: ErrorKind, message: &str, max_len: usize) -> Self {
        let mut message = sanitize_message(message, max_len);
        if message.is_empty() {
            message = kind.default_message().to_string();
        }
        Self {
            kind,
            message,
            violations: Vec::new(),
            status: None,
        }
    }

    pub fn with_violations(mut self, violations: Vec<Violation>) -> Self {
        self.violations = violations;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether retrying after fixing the cause (or simply later) can succeed.
    pub fn is_recoverable(&self) -> bool {
        match (self.kind, self.status) {
            (ErrorKind::RemoteCall, Some(status)) => status == 429 || status >= 500,
            (kind, _) => kind.is_recoverable(),
        }
    }
}

/// Strip diagnostic noise from a message meant for callers.
///
/// Keeps the first line, drops backtrace markers, and truncates on a char
/// boundary.
pub fn sanitize_message(raw: &str, max_len: usize) -> String {
    let first_line = raw.lines().next().unwrap_or("");
    let cleaned = match first_line.find("stack backtrace") {
        Some(idx) => &first_line[..idx],
        None => first_line,
    }
    .trim();

    if cleaned.chars().count() <= max_len {
        return cleaned.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let mut out: String = cleaned.chars().take(keep).collect();
    out.push_str("...");
    out
}

// =============================================================================
// Envelope
// =============================================================================

/// Uniform success/error wrapper returned from every invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct ResultEnvelope {
    successful: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

#[derive(Deserialize)]
struct RawEnvelope {
    successful: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<ErrorInfo>,
}

impl TryFrom<RawEnvelope> for ResultEnvelope {
    type Error = String;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        match (raw.successful, raw.data, raw.error) {
            (true, data, None) => Ok(Self::success(data.unwrap_or(Value::Null))),
            (false, None, Some(error)) => Ok(Self::failure(error)),
            (true, _, Some(_)) => Err("successful envelope must not carry an error".to_string()),
            (false, Some(_), _) => Err("failed envelope must not carry data".to_string()),
            (false, None, None) => Err("failed envelope must carry an error".to_string()),
        }
    }
}

impl ResultEnvelope {
    pub fn success(data: Value) -> Self {
        Self {
            successful: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: ErrorInfo) -> Self {
        Self {
            successful: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.successful
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    /// Kind of the error, if the call failed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn into_result(self) -> Result<Value, ErrorInfo> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(error),
            (data, None) => Ok(data.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let env = ResultEnvelope::success(json!(5));
        assert!(env.is_successful());
        assert!(env.error().is_none());
        assert_eq!(serde_json::to_value(&env).unwrap(), json!({"successful": true, "data": 5}));
    }

    #[test]
    fn test_failure_shape() {
        let env = ResultEnvelope::failure(
            ErrorInfo::new(ErrorKind::InvalidInput, "bad input", 100).with_violations(vec![
                Violation {
                    path: "$.a".into(),
                    message: "expected integer, got string".into(),
                },
            ]),
        );
        assert!(env.data().is_none());
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({
                "successful": false,
                "error": {
                    "kind": "INVALID_INPUT",
                    "message": "bad input",
                    "violations": [{"path": "$.a", "message": "expected integer, got string"}]
                }
            })
        );
    }

    #[test]
    fn test_deserialize_enforces_invariant() {
        let ok: ResultEnvelope =
            serde_json::from_value(json!({"successful": true, "data": {"x": 1}})).unwrap();
        assert_eq!(ok.data(), Some(&json!({"x": 1})));

        let bad = serde_json::from_value::<ResultEnvelope>(json!({
            "successful": false,
            "data": 1,
            "error": {"kind": "HANDLER", "message": "boom"}
        }));
        assert!(bad.is_err());

        let bad = serde_json::from_value::<ResultEnvelope>(json!({"successful": false}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_sanitize_drops_backtrace_and_extra_lines() {
        let raw = "connection refused\n   0: std::backtrace\n   at src/main.rs:10";
        assert_eq!(sanitize_message(raw, 100), "connection refused");
        assert_eq!(
            sanitize_message("panicked: oops stack backtrace: ...", 100),
            "panicked: oops"
        );
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let raw = "ééééééééé";
        let out = sanitize_message(raw, 6);
        assert_eq!(out, "ééé...");
    }

    #[test]
    fn test_empty_message_gets_default() {
        let info = ErrorInfo::new(ErrorKind::Timeout, "\n", 100);
        assert_eq!(info.message, ErrorKind::Timeout.default_message());
    }

    #[test]
    fn test_remote_recoverability_by_status() {
        let throttled = ErrorInfo::new(ErrorKind::RemoteCall, "429", 100).with_status(429);
        let forbidden = ErrorInfo::new(ErrorKind::RemoteCall, "403", 100).with_status(403);
        let transport = ErrorInfo::new(ErrorKind::RemoteCall, "reset", 100);
        assert!(throttled.is_recoverable());
        assert!(!forbidden.is_recoverable());
        assert!(transport.is_recoverable());
    }
}
