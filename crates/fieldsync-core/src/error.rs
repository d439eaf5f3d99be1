//! Error types for the FieldSync client.
//!
//! This module provides a unified error type with explicit variants for
//! network, HTTP status, authentication, permission, storage, and input
//! validation failures.
//!
//! Every variant is `Clone`: a single token-refresh failure has to be handed
//! to every request that was queued behind it.

use std::fmt;
use thiserror::Error;

/// The unified error type for FieldSync operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// No response reached the client (DNS, TLS, connection, timeout).
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// A response was received with a non-2xx status.
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Authentication errors (expired session, failed refresh).
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Location permission was refused.
    #[error("permission denied: {0}")]
    PermissionDenied(#[from] PermissionError),

    /// Durable storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A 2xx response whose body could not be decoded.
    #[error("unexpected response: {message}")]
    UnexpectedResponse { message: String },

    /// Input validation errors (invalid URL, ticket id).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),
}

impl Error {
    /// Returns the HTTP status code, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http(err) => Some(err.status),
            _ => None,
        }
    }

    /// Check if this is a raw HTTP 401 response.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Check if the session can no longer be used and the user must log in again.
    ///
    /// This covers an exhausted retry, a rejected refresh token, a missing
    /// session, and raw 401/403 responses that bypassed the refresh protocol.
    pub fn requires_login(&self) -> bool {
        match self {
            Error::Auth(_) => true,
            Error::Http(err) => err.status == 401 || err.status == 403,
            _ => false,
        }
    }

    /// Check if the server reports that the addressed resource is gone or
    /// no longer accessible to the caller (404 or 403).
    pub fn indicates_gone(&self) -> bool {
        matches!(self.status(), Some(403) | Some(404))
    }
}

/// Failures where no HTTP response reached the client.
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// WebSocket transport failure.
    #[error("websocket error: {message}")]
    WebSocket { message: String },

    /// Any other transport failure.
    #[error("{message}")]
    Other { message: String },
}

/// A non-2xx HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    /// HTTP status code.
    pub status: u16,
    /// Error message from the server, if the body carried one.
    pub message: Option<String>,
}

impl HttpError {
    /// Create a new HTTP error.
    pub fn new(status: u16, message: Option<String>) -> Self {
        Self { status, message }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(ref message) = self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {}

/// Authentication-related errors.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The request was retried with a refreshed token and still got 401.
    #[error("session expired")]
    AuthExpired,

    /// The refresh endpoint rejected the refresh token, or could not be reached.
    #[error("token refresh failed: {0}")]
    RefreshFailed(Box<Error>),

    /// There are no credentials to authenticate with.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The realtime channel refused the handshake credential.
    #[error("realtime channel rejected credentials: {message}")]
    ChannelRejected { message: String },
}

/// Which location permission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PermissionError {
    /// Foreground location permission is required.
    #[error("foreground location permission is required")]
    Foreground,

    /// Background location permission is required.
    #[error("background location permission is required")]
    Background,
}

/// Durable storage errors.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Underlying I/O failure.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// A stored value could not be decoded.
    #[error("corrupt value for '{key}': {message}")]
    Corrupt { key: String, message: String },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io {
            message: err.to_string(),
        }
    }
}

/// Input validation errors.
#[derive(Debug, Clone, Error)]
pub enum InvalidInputError {
    /// Invalid backend base URL.
    #[error("invalid base URL '{value}': {reason}")]
    BaseUrl { value: String, reason: String },

    /// Invalid ticket identifier.
    #[error("invalid ticket id '{value}': {reason}")]
    TicketId { value: String, reason: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_includes_message() {
        let err = HttpError::new(404, Some("Ticket not found".to_string()));
        assert_eq!(err.to_string(), "HTTP 404: Ticket not found");
        assert_eq!(HttpError::new(500, None).to_string(), "HTTP 500");
    }

    #[test]
    fn classifies_statuses() {
        let unauthorized: Error = HttpError::new(401, None).into();
        assert!(unauthorized.is_unauthorized());
        assert!(unauthorized.requires_login());
        assert!(!unauthorized.indicates_gone());

        let forbidden: Error = HttpError::new(403, None).into();
        assert!(forbidden.requires_login());
        assert!(forbidden.indicates_gone());

        let server: Error = HttpError::new(503, None).into();
        assert!(!server.requires_login());
        assert!(!server.indicates_gone());

        let network: Error = NetworkError::Timeout.into();
        assert_eq!(network.status(), None);
        assert!(!network.requires_login());
    }

    #[test]
    fn refresh_failure_wraps_cause() {
        let cause: Error = HttpError::new(403, Some("Invalid refresh token".to_string())).into();
        let err: Error = AuthError::RefreshFailed(Box::new(cause)).into();
        assert!(err.requires_login());
        assert!(err.to_string().contains("Invalid refresh token"));
    }
}
