// Error handling module
// Defines the error type shared by the refresh coordinator and every caller waiting on it

use thiserror::Error;

/// Errors that can occur while keeping a session alive.
///
/// The type is `Clone` because a single refresh failure is delivered to the
/// leader and to every queued waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// No refresh credential is stored, so no refresh call can be made
    #[error("No refresh token available")]
    MissingRefreshToken,

    /// The refresh endpoint answered with a non-success status
    #[error("Token refresh rejected: {status} - {message}")]
    RefreshRejected { status: u16, message: String },

    /// The login endpoint answered with a non-success status
    #[error("Login rejected: {status} - {message}")]
    LoginRejected { status: u16, message: String },

    /// A success response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request never produced a response (connect, timeout, body...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        // Categorize the error for better debugging
        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection_failed"
        } else if e.is_request() {
            "request_error"
        } else if e.is_body() {
            "body_error"
        } else if e.is_decode() {
            "decode_error"
        } else {
            "unknown"
        };
        SessionError::Transport(format!("{} (kind: {})", e, kind))
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
