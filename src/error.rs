// src/error.rs

//! Unified error handling for the bulletin pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for portwatch operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Interactive login failed, timed out, or the new bundle failed verification
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The portal rejected a freshly refreshed session
    #[error("Session expired for {port}: portal rejected the refreshed session (HTTP {status})")]
    SessionExpired { port: String, status: u16 },

    /// Transport failure after the retry budget was exhausted
    #[error("Network error after {attempts} attempt(s) for {url}: {message}")]
    Network {
        url: String,
        attempts: u32,
        message: String,
    },

    /// Non-retryable, non-auth HTTP status
    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    /// Bulletin-level parse failure
    #[error("Parse error: {0}")]
    Parse(String),

    /// Single malformed data line
    #[error(transparent)]
    FieldParse(#[from] FieldParseError),

    /// Record store write or read failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// A malformed bulletin data line. Recovered by the parser and kept as a warning.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}: {reason}")]
pub struct FieldParseError {
    /// 1-based line number in the raw bulletin text
    pub line: usize,
    pub reason: String,
}

impl FieldParseError {
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// Why a port could not be assessed in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Authentication,
    SessionExpired,
    Fetch,
    Parse,
    NoData,
}

impl FailureKind {
    /// Status label shown to downstream reporting.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Authentication => "auth-error",
            FailureKind::SessionExpired => "session-expired",
            FailureKind::Fetch => "fetch-error",
            FailureKind::Parse => "parse-error",
            FailureKind::NoData => "no-data",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppError {
    /// Create an authentication error.
    pub fn authentication(message: impl fmt::Display) -> Self {
        Self::Authentication(message.to_string())
    }

    /// Create a network error for an exhausted retry budget.
    pub fn network(url: impl Into<String>, attempts: u32, message: impl fmt::Display) -> Self {
        Self::Network {
            url: url.into(),
            attempts,
            message: message.to_string(),
        }
    }

    /// Create a bulletin parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create a persistence error.
    pub fn persistence(message: impl fmt::Display) -> Self {
        Self::Persistence(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Map this error to the per-port failure kind reported in a cycle.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AppError::Authentication(_) => FailureKind::Authentication,
            AppError::SessionExpired { .. } => FailureKind::SessionExpired,
            AppError::Parse(_) | AppError::FieldParse(_) => FailureKind::Parse,
            AppError::UnexpectedStatus { status: 404, .. } => FailureKind::NoData,
            _ => FailureKind::Fetch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            AppError::authentication("login timed out").failure_kind(),
            FailureKind::Authentication
        );
        assert_eq!(
            AppError::SessionExpired {
                port: "KHH".into(),
                status: 401
            }
            .failure_kind(),
            FailureKind::SessionExpired
        );
        assert_eq!(
            AppError::network("http://x", 3, "connection refused").failure_kind(),
            FailureKind::Fetch
        );
        assert_eq!(
            AppError::parse("missing data section").failure_kind(),
            FailureKind::Parse
        );
        assert_eq!(
            AppError::UnexpectedStatus {
                url: "http://x".into(),
                status: 404
            }
            .failure_kind(),
            FailureKind::NoData
        );
    }

    #[test]
    fn test_failure_kind_labels() {
        assert_eq!(FailureKind::Fetch.to_string(), "fetch-error");
        assert_eq!(FailureKind::NoData.as_str(), "no-data");
    }

    #[test]
    fn test_field_parse_error_display() {
        let err = FieldParseError::new(7, "expected 11 fields, found 9");
        assert_eq!(err.to_string(), "line 7: expected 11 fields, found 9");
    }
}
