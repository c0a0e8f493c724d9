// src/error.rs

//! Unified error handling for the harvester.
//!
//! `AppError` covers everything that can stop a phase outright. Per-fetch
//! failures live in [`FetchError`], which the resilience policy absorbs or
//! hands back to the phase coordinator.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built
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

    /// CSV reading or writing failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A phase ended in a fatal state after reporting its outcome
    #[error("{phase} aborted: {reason}")]
    Aborted { phase: String, reason: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an abort error for a named phase.
    pub fn aborted(phase: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Aborted {
            phase: phase.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure class reported in a run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Retryable, expected flakiness
    Transient,
    /// Challenged or throttled by the site
    Blocked,
    /// Programming or configuration error, never retried
    Fatal,
    /// Structurally extracted but semantically invalid
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Blocked => "blocked",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Validation => "validation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transient failure happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientCause {
    /// The attempt exceeded the operation timeout
    Timeout(Duration),
    /// The server answered with a retryable status
    Status(u16),
    /// Connection-level failure
    Connect(String),
    /// The page body was empty
    EmptyRender,
    /// The readiness selector never appeared
    PartialRender(String),
}

impl fmt::Display for TransientCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientCause::Timeout(limit) => write!(f, "timed out after {:?}", limit),
            TransientCause::Status(code) => write!(f, "server returned {}", code),
            TransientCause::Connect(msg) => write!(f, "connection failed: {}", msg),
            TransientCause::EmptyRender => f.write_str("empty page body"),
            TransientCause::PartialRender(selector) => {
                write!(f, "page never rendered '{}'", selector)
            }
        }
    }
}

/// Error returned by a single fetch operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transient failure for {url}: {cause}")]
    Transient { url: String, cause: TransientCause },

    #[error("blocked at {url}: {signature}")]
    Blocked { url: String, signature: String },

    #[error("fatal failure for {url}: {message}")]
    Fatal { url: String, message: String },
}

impl FetchError {
    pub fn transient(url: impl Into<String>, cause: TransientCause) -> Self {
        Self::Transient {
            url: url.into(),
            cause,
        }
    }

    pub fn blocked(url: impl Into<String>, signature: impl Into<String>) -> Self {
        Self::Blocked {
            url: url.into(),
            signature: signature.into(),
        }
    }

    pub fn fatal(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fatal {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Classify a `reqwest` failure.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::transient(url, TransientCause::Timeout(Duration::ZERO))
        } else if err.is_connect() || err.is_body() || err.is_decode() {
            Self::transient(url, TransientCause::Connect(err.to_string()))
        } else if err.is_builder() || err.is_redirect() {
            Self::fatal(url, err)
        } else {
            Self::transient(url, TransientCause::Connect(err.to_string()))
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Transient { .. } => ErrorKind::Transient,
            FetchError::Blocked { .. } => ErrorKind::Blocked,
            FetchError::Fatal { .. } => ErrorKind::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Fatal { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Transient { url, .. }
            | FetchError::Blocked { url, .. }
            | FetchError::Fatal { url, .. } => url,
        }
    }
}
