//! Error types for crawling, caching and schema resolution.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the monolith and its collaborators.
///
/// Fetch failures other than 401 and the BIOS settings path are not errors:
/// the crawl prunes the path and carries on.
#[derive(Debug, Error)]
pub enum MonolithError {
    // Fatal crawl errors
    #[error("BIOS is not registered correctly: {path} did not respond with 200")]
    BiosUnregistered { path: String },

    #[error("invalid session, please log out and log back in or include credentials")]
    SessionExpired,

    #[error("schema validation failed: {message}")]
    SchemaValidation { message: String },

    // Caller misuse
    #[error("unable to locate instance for '{type_name}'")]
    InstanceNotFound { type_name: String },

    // Transport errors (exit code 3)
    #[error("transport failure for {path}: {message}")]
    Transport { path: String, message: String },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Snapshot IO (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
}

impl MonolithError {
    /// Shorthand for a [`MonolithError::SchemaValidation`].
    pub(crate) fn schema(message: impl Into<String>) -> Self {
        MonolithError::SchemaValidation {
            message: message.into(),
        }
    }

    /// Returns true for errors that abort a crawl.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MonolithError::InstanceNotFound { .. })
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            MonolithError::Transport { .. }
            | MonolithError::FileNotFound { .. }
            | MonolithError::ReadError { .. }
            | MonolithError::WriteError { .. } => 3,
            #[cfg(feature = "remote")]
            MonolithError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors while validating a cached body against a cached schema.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Monolith(#[from] MonolithError),

    #[error("validation failed with {} error(s)", errors.len())]
    Invalid { errors: Vec<BodyError> },
}

/// Single validation error with path context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BodyError {
    /// JSON Pointer (RFC 6901) to the invalid field.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for BodyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::Monolith(e) => e.exit_code(),
            ValidateError::Invalid { .. } => 1,
        }
    }
}
