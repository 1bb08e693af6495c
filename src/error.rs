//! Error types for stickerhub
//!
//! This module provides the error taxonomy of the pipeline:
//! - Per-item failures (fetch, conversion, pack) that are collected into reports
//!   and never abort sibling work
//! - Whole-build failures that roll back the partially built collection
//! - HTTP status code mapping for the publication surface

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for stickerhub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for stickerhub
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers")
        key: Option<String>,
    },

    /// Collection name is empty or contains characters unsafe for a directory name
    #[error("invalid collection name: {0}")]
    InvalidName(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The origin answered with an error that is not a plain "not found"
    #[error("origin error: {0}")]
    Origin(String),

    /// Collection (or a published artifact of it) not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Archive packing failed
    #[error("pack failed: {0}")]
    Pack(#[from] PackError),

    /// Unhandled failure during the building phase; the partial directory was removed
    #[error("internal failure building {collection}, nothing produced: {reason}")]
    Build {
        /// Collection whose build was rolled back
        collection: String,
        /// What went wrong
        reason: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Per-item fetch failures
#[derive(Debug, Error)]
pub enum FetchError {
    /// The origin could not turn the item reference into a download locator
    #[error("failed to resolve {reference}: {reason}")]
    Resolve {
        /// Opaque origin reference of the item
        reference: String,
        /// Why resolution failed
        reason: String,
    },

    /// The origin answered with a non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Requested URL (token redacted)
        url: String,
    },

    /// Connection, timeout or body streaming failure
    #[error("transfer failed: {reason}")]
    Transfer {
        /// Underlying error message
        reason: String,
        /// Whether the failure was a timeout
        timeout: bool,
    },

    /// Writing the downloaded bytes to disk failed
    #[error("failed to write {path}: {source}")]
    Write {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transfer {
            timeout: e.is_timeout(),
            reason: e.without_url().to_string(),
        }
    }
}

/// Per-item conversion failures
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The external program could not be started
    #[error("failed to run {program}: {reason}")]
    Spawn {
        /// Program that was invoked
        program: String,
        /// Spawn failure reason
        reason: String,
    },

    /// The external program exited with a non-zero status
    #[error("{program} exited with code {code:?}: {stderr}")]
    NonZeroExit {
        /// Program that was invoked
        program: String,
        /// Exit code (None when killed by a signal)
        code: Option<i32>,
        /// Captured standard error (trimmed)
        stderr: String,
    },

    /// The conversion exceeded its time budget and was killed
    #[error("{program} timed out after {timeout:?}")]
    Timeout {
        /// Program (or in-process step) that timed out
        program: String,
        /// The budget that was exceeded
        timeout: Duration,
    },

    /// The converter reported success but produced no output file
    #[error("converter produced no output at {path}")]
    MissingOutput {
        /// Expected output path
        path: PathBuf,
    },

    /// In-process image decode or GIF encode failed
    #[error("image conversion failed: {0}")]
    Image(String),

    /// No converter is available for this item
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Archive packing failures
#[derive(Debug, Error)]
pub enum PackError {
    /// A normalized output listed for packing is not on disk
    #[error("missing file {path}")]
    MissingFile {
        /// The missing file
        path: PathBuf,
    },

    /// Writing an archive part failed
    #[error("failed to write archive {path}: {reason}")]
    Archive {
        /// Archive being written
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },
}

/// API error response format
///
/// Returned by the publication surface when a request fails.
///
/// ```json
/// {
///   "error": {
///     "code": "build_failed",
///     "message": "internal failure building cats, nothing produced: disk full",
///     "details": { "collection": "cats" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "build_failed")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::InvalidName(_) => 400,

            Error::NotFound(_) => 404,

            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::Pack(_) => 500,
            Error::Build { .. } => 500,
            Error::Other(_) => 500,

            Error::Origin(_) => 502,
            Error::Network(_) => 502,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidName(_) => "invalid_name",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Origin(_) => "origin_error",
            Error::NotFound(_) => "not_found",
            Error::Pack(e) => match e {
                PackError::MissingFile { .. } => "missing_file",
                PackError::Archive { .. } => "archive_failed",
            },
            Error::Build { .. } => "build_failed",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Build { collection, .. } => Some(serde_json::json!({
                "collection": collection,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::Pack(PackError::Archive { path, .. }) => Some(serde_json::json!({
                "path": path,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
