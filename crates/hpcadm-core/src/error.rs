//! Error types for account-maintenance operations.
//!
//! One error enum is shared by every crate in the workspace. Library code
//! never terminates the process: every fallible operation returns a
//! `Result` so callers (and tests) can inspect what happened.

use serde::Serialize;
use thiserror::Error;

/// Main error type for maintenance operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend service is unavailable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Configuration or settings error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Operation timed out
    #[error("Timeout waiting for service: {0}")]
    Timeout(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Bad request with details
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Conflict error
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Directory (LDAP) operation failed
    #[error("Directory error: {0}")]
    DirectoryError(String),

    /// Subprocess exited nonzero
    #[error("Command `{command}` failed with status {status}: {stderr}")]
    CommandFailed {
        /// Command line that was executed
        command: String,
        /// Exit status (or -1 when killed by a signal)
        status: i32,
        /// Captured standard error
        stderr: String,
    },

    /// Data-integrity check failed (e.g. more than one match where exactly
    /// one was expected); fatal to avoid corrupting the wrong record
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// Text output could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Filesystem operation failed
    #[error("I/O error on {path}: {message}")]
    IoError {
        /// Path the operation touched
        path: String,
        /// Underlying error message
        message: String,
    },

    /// External service error
    #[error("External service error: {service}: {message}")]
    ExternalServiceError {
        /// Service name that failed
        service: String,
        /// Error message
        message: String,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Specialized result type for maintenance operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for serialization.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail structure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::HttpError(_) => "HTTP_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::DirectoryError(_) => "DIRECTORY_ERROR",
            Self::CommandFailed { .. } => "COMMAND_FAILED",
            Self::IntegrityError(_) => "INTEGRITY_ERROR",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::IoError { .. } => "IO_ERROR",
            Self::ExternalServiceError { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Converts the error into an `ErrorResponse`.
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
            },
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::InternalError(_)
                | Self::ConfigError(_)
                | Self::IntegrityError(_)
                | Self::CommandFailed { .. }
                | Self::ExternalServiceError { .. }
        )
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::ServiceUnavailable(err.to_string())
        } else {
            Self::HttpError(err.to_string())
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
        Self::ParseError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}
