//! Error types and handling for `td_rust`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Supports `anyhow` integration at the CLI edge
//! - Provides recovery hints for user-facing errors
//! - Provides structured JSON output for AI coding agents

mod context;
mod structured;

pub use context::{OptionExt, ResultExt};
pub use structured::{ErrorCode, StructuredError};

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `td_rust` operations.
#[derive(Error, Debug)]
pub enum TdError {
    // === Storage Errors ===
    /// Database file not found at the specified path.
    #[error("Database not found at '{path}'")]
    DatabaseNotFound { path: PathBuf },

    /// `SQLite` database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    // === Issue Errors ===
    /// Issue with the specified ID was not found.
    #[error("Issue not found: {id}")]
    IssueNotFound { id: String },

    /// Attempted to create an issue with an ID that already exists.
    #[error("Issue ID collision: {id}")]
    IdCollision { id: String },

    /// Session with the specified ID was not found.
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    // === Validation Errors ===
    /// Field validation failed.
    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Invalid status value.
    #[error("Invalid status: {status}")]
    InvalidStatus { status: String },

    /// Invalid priority value.
    #[error("Priority must be P0-P3, got: {priority}")]
    InvalidPriority { priority: String },

    // === Dependency Errors ===
    /// Adding the dependency would create a cycle.
    #[error("Cycle detected: {from} -> {to} would close a dependency loop")]
    DependencyCycle { from: String, to: String },

    /// Duplicate dependency.
    #[error("Dependency already exists: {from} -> {to}")]
    DuplicateDependency { from: String, to: String },

    // === Query Errors ===
    /// The query expression could not be parsed.
    #[error("Query parse error at position {position}: {reason}")]
    QueryParse { position: usize, reason: String },

    // === Webhook Errors ===
    /// Webhook delivery failed (network error or non-2xx response).
    #[error("Webhook delivery failed: {0}")]
    Transport(String),

    // === Configuration Errors ===
    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// td workspace not initialized.
    #[error("td not initialized: run 'td init' first")]
    NotInitialized,

    /// Already initialized.
    #[error("Already initialized at '{path}'")]
    AlreadyInitialized { path: PathBuf },

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Wrapped errors ===
    /// Error with additional context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TdError {
    /// Can the user fix this without code changes?
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseNotFound { .. }
                | Self::NotInitialized
                | Self::IssueNotFound { .. }
                | Self::SessionNotFound { .. }
                | Self::Validation { .. }
                | Self::InvalidStatus { .. }
                | Self::InvalidPriority { .. }
                | Self::QueryParse { .. }
                | Self::DependencyCycle { .. }
                | Self::DuplicateDependency { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run: td init"),
            Self::DatabaseNotFound { .. } => Some("Check path or run: td init"),
            Self::DependencyCycle { .. } => Some("Remove one dependency to break the cycle"),
            Self::DuplicateDependency { .. } => Some("The dependency is already recorded"),
            Self::AlreadyInitialized { .. } => Some("The workspace is ready to use"),
            Self::InvalidPriority { .. } => Some("Use a priority between P0 (critical) and P3 (low)"),
            Self::InvalidStatus { .. } => {
                Some("Valid statuses: open, in_progress, blocked, in_review, closed")
            }
            Self::QueryParse { .. } => {
                Some("Example: status = open AND (type = bug OR labels ~ urgent)")
            }
            _ => None,
        }
    }

    /// Get the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }

    /// Create a validation error for a specific field.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a query parse error at a byte offset.
    #[must_use]
    pub fn query_parse(position: usize, reason: impl Into<String>) -> Self {
        Self::QueryParse {
            position,
            reason: reason.into(),
        }
    }
}

/// Result type using `TdError`.
pub type Result<T> = std::result::Result<T, TdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TdError::IssueNotFound {
            id: "td-abc123".to_string(),
        };
        assert_eq!(err.to_string(), "Issue not found: td-abc123");
    }

    #[test]
    fn test_validation_error() {
        let err = TdError::validation("title", "cannot be empty");
        assert_eq!(err.to_string(), "Validation failed: title: cannot be empty");
    }

    #[test]
    fn test_query_parse_display() {
        let err = TdError::query_parse(7, "expected value");
        assert_eq!(
            err.to_string(),
            "Query parse error at position 7: expected value"
        );
    }

    #[test]
    fn test_user_recoverable() {
        assert!(TdError::NotInitialized.is_user_recoverable());

        let not_recoverable = TdError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            None,
        ));
        assert!(!not_recoverable.is_user_recoverable());
        assert!(!TdError::Transport("boom".into()).is_user_recoverable());
    }

    #[test]
    fn test_suggestion() {
        assert_eq!(TdError::NotInitialized.suggestion(), Some("Run: td init"));
        let err = TdError::DependencyCycle {
            from: "td-a".into(),
            to: "td-b".into(),
        };
        assert_eq!(
            err.suggestion(),
            Some("Remove one dependency to break the cycle")
        );
    }
}
