//! Error types for Maroon.
//!
//! Collaborator failures ([`IssueError`]) and parse failures ([`ParseError`]) are
//! their own enums and nest inside the top-level [`MaroonError`].

use thiserror::Error;

/// Failure reported by the credential-issuing API.
#[derive(Debug, Error)]
pub enum IssueError {
    /// The bearer token was rejected (HTTP 401).
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    /// Any other failure: transport error, non-200 status, malformed body.
    #[error("request failed: {message}")]
    RequestFailed { message: String },
}

impl IssueError {
    pub(crate) fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed {
            message: message.into(),
        }
    }
}

/// A persisted file could not be understood.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Malformed profile store JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed section/key-value document.
    #[error("line {line}: {message}")]
    Document { line: usize, message: String },
}

/// Top-level error type for every core operation.
#[derive(Debug, Error)]
pub enum MaroonError {
    /// No profile with this name.
    #[error("profile '{profile}' does not exist")]
    NotFound { profile: String },

    /// A profile with this name is already configured.
    #[error("profile '{profile}' already exists")]
    AlreadyExists { profile: String },

    /// Fresh credentials could not be obtained.
    #[error("credential refresh failed: {0}")]
    RefreshFailed(#[from] IssueError),

    /// Local file read, write or rename failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted file is malformed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A value does not satisfy its format rules.
    #[error("invalid {field} '{value}': {reason}")]
    InvalidInput {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// The home or configuration directory could not be determined.
    #[error("configuration directory not available")]
    ConfigDirUnavailable,
}

impl MaroonError {
    pub(crate) fn invalid(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidInput {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Whether the upstream service rejected the bearer token.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::RefreshFailed(IssueError::InvalidOrExpiredToken))
    }
}

impl From<serde_json::Error> for MaroonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(ParseError::Json(err))
    }
}
