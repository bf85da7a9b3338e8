//! Error types for versioning operations and their structured response form.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    InvalidStrategy,
    InvalidBranch,
    InvalidTaskId,
    InvalidCommit,
    SameBranch,

    // Integrity errors
    DataCorruption,

    // Internal errors
    IoError,
    SerializationError,
    ConfigError,
}

/// Errors raised by the commit tracker, task store and merge engine.
#[derive(Debug, Error)]
pub enum VersioningError {
    /// A backing file exists but does not hold valid data.
    #[error("data corruption in {path}: {source}")]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown merge strategy '{0}'. Valid options: source, target, newer")]
    InvalidStrategy(String),

    #[error("invalid branch name '{name}': {reason}")]
    InvalidBranch { name: String, reason: String },

    #[error("invalid task id '{id}': {reason}")]
    InvalidTaskId { id: String, reason: String },

    #[error("invalid commit: {0}")]
    InvalidCommit(String),

    #[error("source and target branch are both '{0}'")]
    SameBranch(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration in {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}

impl VersioningError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupted(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Corrupted {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_branch(name: &str, reason: &str) -> Self {
        Self::InvalidBranch {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_task_id(id: &str, reason: &str) -> Self {
        Self::InvalidTaskId {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Corrupted { .. } => ErrorCode::DataCorruption,
            Self::Io { .. } => ErrorCode::IoError,
            Self::InvalidStrategy(_) => ErrorCode::InvalidStrategy,
            Self::InvalidBranch { .. } => ErrorCode::InvalidBranch,
            Self::InvalidTaskId { .. } => ErrorCode::InvalidTaskId,
            Self::InvalidCommit(_) => ErrorCode::InvalidCommit,
            Self::SameBranch(_) => ErrorCode::SameBranch,
            Self::Serialization(_) => ErrorCode::SerializationError,
            Self::Config { .. } => ErrorCode::ConfigError,
        }
    }
}

pub type Result<T> = std::result::Result<T, VersioningError>;

/// Structured error for command responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<&VersioningError> for ErrorResponse {
    fn from(err: &VersioningError) -> Self {
        let response = Self::new(err.code(), err.to_string());
        match std::error::Error::source(err) {
            Some(source) => response.with_details(source.to_string()),
            None => response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = VersioningError::InvalidStrategy("fastest".to_string());
        assert_eq!(err.code(), ErrorCode::InvalidStrategy);
        assert!(err.to_string().contains("source, target, newer"));

        let err = VersioningError::invalid_branch("", "branch name cannot be empty");
        assert_eq!(err.code(), ErrorCode::InvalidBranch);
    }

    #[test]
    fn test_error_response_serializes_code() {
        let err = VersioningError::SameBranch("main".to_string());
        let response = ErrorResponse::from(&err);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["code"], "SAME_BRANCH");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_error_response_includes_source() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = VersioningError::corrupted("commits.json", parse_err);
        let response = ErrorResponse::from(&err);
        assert_eq!(response.code, ErrorCode::DataCorruption);
        assert!(response.details.is_some());
    }
}
