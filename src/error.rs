//! Error types for SimpliVity management operations.

use std::fmt;

/// Categorised error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OvcErrorKind {
    /// OVC unreachable or the HTTP client could not be built
    ConnectionError,
    /// Authentication failed or the access token expired (401)
    AuthenticationError,
    /// Permission denied (403)
    AccessDenied,
    /// Resource not found (404); drives the create-instead-of-update path
    NotFound,
    /// An OmniStack task finished in the FAILED state
    TaskError,
    /// HTTP / API error with status code
    ApiError(u16),
    /// Request or task-poll timeout
    Timeout,
    /// JSON parse / deserialization error
    ParseError,
    /// Client configuration missing or invalid; raised before any remote call
    ConfigError,
    /// Caller-supplied data is inappropriate for the operation
    InvalidParameter,
    /// Generic
    Other,
}

/// Crate error type carrying a kind + human-readable message.
#[derive(Debug, Clone)]
pub struct OvcError {
    pub kind: OvcErrorKind,
    pub message: String,
}

impl OvcError {
    pub fn new(kind: OvcErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(OvcErrorKind::ConnectionError, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(OvcErrorKind::AuthenticationError, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(OvcErrorKind::NotFound, msg)
    }

    pub fn task(msg: impl Into<String>) -> Self {
        Self::new(OvcErrorKind::TaskError, msg)
    }

    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::new(OvcErrorKind::ApiError(status), msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(OvcErrorKind::Timeout, msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(OvcErrorKind::ParseError, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(OvcErrorKind::ConfigError, msg)
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::new(OvcErrorKind::InvalidParameter, msg)
    }

    /// Whether this is the recoverable not-found case.
    pub fn is_not_found(&self) -> bool {
        self.kind == OvcErrorKind::NotFound
    }

    /// Build an API error from a response body, preferring the `message`
    /// field OmniStack puts in its JSON error envelope over the raw text.
    pub fn from_api_body(status: u16, body: &str, context: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| body.to_string());

        if detail.is_empty() {
            Self::api(status, format!("{context} (HTTP {status})"))
        } else {
            Self::api(status, format!("{context}: {detail}"))
        }
    }
}

impl fmt::Display for OvcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for OvcError {}

impl From<reqwest::Error> for OvcError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("HTTP timeout: {e}"))
        } else if e.is_connect() {
            Self::connection(format!("Connection failed: {e}"))
        } else {
            Self::new(OvcErrorKind::Other, format!("HTTP error: {e}"))
        }
    }
}

impl From<serde_json::Error> for OvcError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {e}"))
    }
}

/// Convenience alias.
pub type OvcResult<T> = Result<T, OvcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = OvcError::not_found("policy 'gold' not found");
        assert_eq!(err.to_string(), "[NotFound] policy 'gold' not found");
    }

    #[test]
    fn not_found_detection() {
        assert!(OvcError::not_found("x").is_not_found());
        assert!(!OvcError::auth("x").is_not_found());
    }

    #[test]
    fn api_body_message_extraction() {
        let body = r#"{"exception":"ApplicationException","message":"Datastore name already in use","path":"/api/datastores"}"#;
        let err = OvcError::from_api_body(400, body, "Create failed");
        assert!(matches!(err.kind, OvcErrorKind::ApiError(400)));
        assert_eq!(err.message, "Create failed: Datastore name already in use");
    }

    #[test]
    fn api_body_falls_back_to_raw_text() {
        let err = OvcError::from_api_body(502, "bad gateway", "Request failed");
        assert_eq!(err.message, "Request failed: bad gateway");
    }

    #[test]
    fn api_body_empty() {
        let err = OvcError::from_api_body(500, "", "Request failed");
        assert_eq!(err.message, "Request failed (HTTP 500)");
    }

    #[test]
    fn json_error_maps_to_parse_kind() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: OvcError = json_err.into();
        assert_eq!(err.kind, OvcErrorKind::ParseError);
    }
}
