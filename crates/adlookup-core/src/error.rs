//! Error types for directory lookup operations.
//!
//! This module provides the error taxonomy shared by the connectivity and directory crates,
//! together with a structured error response used by the operation surface.

use serde::Serialize;
use thiserror::Error;

/// Main error type for directory lookup operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Caller input was missing or invalid; raised before any network activity
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Token acquisition or tunnel provisioning failed
    #[error("Tunnel failure: {0}")]
    TunnelFailure(String),

    /// The directory rejected the bind credentials
    #[error("Bind failure: {0}")]
    BindFailure(String),

    /// TLS or LDAP protocol failure while establishing a session
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The directory reported an error for a search
    #[error("Search error: {0}")]
    SearchError(String),

    /// The transport closed before the search completed
    #[error("Socket closed: {0}")]
    SocketClosed(String),

    /// The session was idle for longer than the configured timeout
    #[error("Idle timeout: {0}")]
    IdleTimeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Specialized result type for directory lookup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for serialization.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    /// HTTP-style status code
    pub code: u16,
    /// Error details
    pub error: ErrorDetail,
    /// Optional request ID for tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail structure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub kind: String,
    /// Human-readable error message
    pub message: String,
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::TunnelFailure(_) => "TUNNEL_FAILURE",
            Self::BindFailure(_) => "BIND_FAILURE",
            Self::ProtocolError(_) => "PROTOCOL_ERROR",
            Self::SearchError(_) => "SEARCH_ERROR",
            Self::SocketClosed(_) => "SOCKET_CLOSED",
            Self::IdleTimeout(_) => "IDLE_TIMEOUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Converts the error into an `ErrorResponse` with status 500.
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        self.into_error_response_with_id(None)
    }

    /// Converts the error into an `ErrorResponse` with status 500 and a request ID.
    ///
    /// Every failure reaching the operation surface is reported as a server error, including
    /// validation failures raised by the query translator.
    #[must_use]
    pub fn into_error_response_with_id(self, request_id: Option<String>) -> ErrorResponse {
        ErrorResponse {
            code: 500,
            error: ErrorDetail {
                kind: self.error_code().to_string(),
                message: self.to_string(),
            },
            request_id,
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        !matches!(self, Self::ValidationError(_))
    }

    /// Returns true if the error originated in the transport rather than the directory.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TunnelFailure(_) | Self::SocketClosed(_) | Self::IdleTimeout(_)
        )
    }
}

impl ErrorResponse {
    /// Prefixes the human-readable message with operation context.
    #[must_use]
    pub fn with_context(mut self, context: &str) -> Self {
        self.error.message = format!("{context}: {}", self.error.message);
        self
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.error.message
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TunnelFailure(format!("token request timed out: {err}"))
        } else if err.is_decode() {
            Self::TunnelFailure(format!("malformed token response: {err}"))
        } else {
            Self::TunnelFailure(format!("token request failed: {err}"))
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid URL: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(format!("invalid JSON: {err}"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => Self::SocketClosed(err.to_string()),
            std::io::ErrorKind::TimedOut => Self::IdleTimeout(err.to_string()),
            _ => Self::InternalError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::ValidationError("test".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            Error::TunnelFailure("test".to_string()).error_code(),
            "TUNNEL_FAILURE"
        );
        assert_eq!(
            Error::BindFailure("test".to_string()).error_code(),
            "BIND_FAILURE"
        );
        assert_eq!(
            Error::ProtocolError("test".to_string()).error_code(),
            "PROTOCOL_ERROR"
        );
        assert_eq!(
            Error::SearchError("test".to_string()).error_code(),
            "SEARCH_ERROR"
        );
        assert_eq!(
            Error::SocketClosed("test".to_string()).error_code(),
            "SOCKET_CLOSED"
        );
        assert_eq!(
            Error::IdleTimeout("test".to_string()).error_code(),
            "IDLE_TIMEOUT"
        );
        assert_eq!(
            Error::ConfigError("test".to_string()).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(
            Error::InternalError("test".to_string()).error_code(),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::SocketClosed("search aborted".to_string());
        assert_eq!(err.to_string(), "Socket closed: search aborted");

        let err = Error::BindFailure("invalid credentials (rc=49)".to_string());
        assert_eq!(err.to_string(), "Bind failure: invalid credentials (rc=49)");
    }

    #[test]
    fn test_into_error_response() {
        let err = Error::SearchError("no such object".to_string());
        let response = err.clone().into_error_response();

        assert_eq!(response.code, 500);
        assert_eq!(response.error.kind, "SEARCH_ERROR");
        assert_eq!(response.message(), "Search error: no such object");
        assert!(response.request_id.is_none());

        let response_with_id = err.into_error_response_with_id(Some("req-456".to_string()));
        assert_eq!(response_with_id.request_id, Some("req-456".to_string()));
    }

    #[test]
    fn test_error_response_with_context() {
        let response = Error::SocketClosed("Socket closed".to_string())
            .into_error_response()
            .with_context("Failed to fetch users");
        assert_eq!(
            response.message(),
            "Failed to fetch users: Socket closed: Socket closed"
        );
    }

    #[test]
    fn test_should_log() {
        assert!(Error::TunnelFailure("test".to_string()).should_log());
        assert!(Error::SocketClosed("test".to_string()).should_log());
        assert!(!Error::ValidationError("test".to_string()).should_log());
    }

    #[test]
    fn test_is_transport() {
        assert!(Error::SocketClosed("x".to_string()).is_transport());
        assert!(Error::IdleTimeout("x".to_string()).is_transport());
        assert!(!Error::SearchError("x".to_string()).is_transport());
        assert!(!Error::BindFailure("x".to_string()).is_transport());
    }

    #[test]
    fn test_from_io_error() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(err, Error::SocketClosed(_)));

        let err: Error = std::io::Error::from(std::io::ErrorKind::TimedOut).into();
        assert!(matches!(err, Error::IdleTimeout(_)));

        let err: Error = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(matches!(err, Error::InternalError(_)));
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let lookup_err: Error = err.into();
        assert!(matches!(lookup_err, Error::ConfigError(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let lookup_err: Error = err.into();
        assert!(matches!(lookup_err, Error::ConfigError(_)));
    }

    #[test]
    fn test_error_response_serialization() {
        let response = Error::TunnelFailure("proxy refused".to_string())
            .into_error_response_with_id(Some("req-123".to_string()));

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("TUNNEL_FAILURE"));
        assert!(json.contains("proxy refused"));
        assert!(json.contains("req-123"));
        assert!(json.contains("\"code\":500"));
    }

    #[test]
    fn test_error_response_serialization_no_request_id() {
        let response = Error::InternalError("boom".to_string()).into_error_response();
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("request_id"));
    }
}
