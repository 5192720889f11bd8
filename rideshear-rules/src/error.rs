use std::path::PathBuf;

use thiserror::Error;

use crate::resolver::ResolverError;

/// Errors returned by the policy engine when loading policies, building
/// evaluation contexts or talking to the document resolver.
///
/// Denials are never errors; they are reported through [`crate::Decision`].
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("policy path does not exist: {0}")]
    MissingPath(String),
    #[error("failed to read policies from {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse policies from {path}: {message}")]
    Parse { path: String, message: String },
    #[error("duplicate policy for {pattern} ({operation})")]
    DuplicateRule { pattern: String, operation: String },
    #[error("invalid document path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("invalid collection pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("document resolver failure")]
    Resolver(#[from] ResolverError),
}

impl RuleError {
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RuleError::Io {
            path: path.into().display().to_string(),
            source,
        }
    }

    pub fn parse_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        RuleError::Parse {
            path: path.into().display().to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        RuleError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        RuleError::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error stems from the storage side rather than from the request.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, RuleError::Resolver(_))
    }
}
