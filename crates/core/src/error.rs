//! Core error types for splitd operations.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type shared by the evaluator, the recorder and configuration loading.
#[derive(Debug, Error)]
pub enum Error {
    // Backend errors
    #[error("evaluation of '{feature}' failed: {reason}")]
    Evaluation { feature: String, reason: String },

    #[error("recorder failed to post {kind} for '{tag}': {reason}")]
    Recorder {
        kind: &'static str,
        tag: String,
        reason: String,
    },

    // File errors
    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    // Parsing errors
    #[error("YAML parse error: {reason}")]
    YamlParseFailed { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Generic I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an evaluation error.
    pub fn evaluation(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Evaluation {
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    /// Create a recorder error.
    pub fn recorder(kind: &'static str, tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Recorder {
            kind,
            tag: tag.into(),
            reason: reason.into(),
        }
    }

    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a YAML parse error.
    pub fn yaml_parse_failed(reason: impl Into<String>) -> Self {
        Self::YamlParseFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
