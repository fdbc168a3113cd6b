//! Structured error output for AI coding agents.
//!
//! Provides machine-parseable error information with:
//! - Error codes for categorization
//! - Hints for self-correction
//! - Retryability flags
//! - Context for debugging

use crate::error::TdError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Machine-readable error codes.
///
/// These codes are stable and can be used for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // === Database Errors (exit code 2) ===
    DatabaseNotFound,
    DatabaseError,
    NotInitialized,
    AlreadyInitialized,

    // === Entity Errors (exit code 3) ===
    IssueNotFound,
    SessionNotFound,
    IdCollision,

    // === Validation Errors (exit code 4) ===
    ValidationFailed,
    InvalidStatus,
    InvalidPriority,
    QueryParseError,

    // === Dependency Errors (exit code 5) ===
    CycleDetected,
    DuplicateDependency,

    // === Webhook Errors (exit code 6) ===
    TransportError,

    // === Config Errors (exit code 7) ===
    ConfigError,

    // === I/O Errors (exit code 8) ===
    IoError,
    JsonError,
    YamlError,

    // === Internal Errors (exit code 1) ===
    InternalError,
}

impl ErrorCode {
    /// Get the string representation for JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DatabaseNotFound => "DATABASE_NOT_FOUND",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::IssueNotFound => "ISSUE_NOT_FOUND",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::IdCollision => "ID_COLLISION",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::InvalidPriority => "INVALID_PRIORITY",
            Self::QueryParseError => "QUERY_PARSE_ERROR",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::DuplicateDependency => "DUPLICATE_DEPENDENCY",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::YamlError => "YAML_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// Retryable means the agent might succeed if it waits, or fixes the
    /// input and tries again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed
                | Self::InvalidStatus
                | Self::InvalidPriority
                | Self::QueryParseError
                | Self::TransportError
        )
    }

    /// Get the exit code for this error category.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::DatabaseNotFound
            | Self::DatabaseError
            | Self::NotInitialized
            | Self::AlreadyInitialized => 2,
            Self::IssueNotFound | Self::SessionNotFound | Self::IdCollision => 3,
            Self::ValidationFailed
            | Self::InvalidStatus
            | Self::InvalidPriority
            | Self::QueryParseError => 4,
            Self::CycleDetected | Self::DuplicateDependency => 5,
            Self::TransportError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError | Self::YamlError => 8,
            Self::InternalError => 1,
        }
    }
}

/// Structured error for machine-parseable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional hint for fixing the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether the operation can be retried
    pub retryable: bool,
    /// Additional context data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl StructuredError {
    /// Create a new structured error from a `TdError`.
    #[must_use]
    pub fn from_error(err: &TdError) -> Self {
        let (code, context) = Self::extract_code_and_context(err);
        let hint = Self::generate_hint(err)
            .or_else(|| err.suggestion().map(str::to_string));

        Self {
            code,
            message: err.to_string(),
            hint,
            retryable: code.is_retryable(),
            context,
        }
    }

    /// Serialize to JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "hint": self.hint,
                "retryable": self.retryable,
                "context": self.context,
            }
        })
    }

    /// Format for human-readable output.
    #[must_use]
    pub fn to_human(&self, color: bool) -> String {
        let mut output = String::new();

        if color {
            output.push_str("\x1b[31mError:\x1b[0m ");
        } else {
            output.push_str("Error: ");
        }

        output.push_str(&self.message);

        if let Some(hint) = &self.hint {
            output.push('\n');
            if color {
                output.push_str("\x1b[33mHint:\x1b[0m ");
            } else {
                output.push_str("Hint: ");
            }
            output.push_str(hint);
        }

        output
    }

    fn extract_code_and_context(err: &TdError) -> (ErrorCode, Option<Value>) {
        match err {
            TdError::DatabaseNotFound { path } => (
                ErrorCode::DatabaseNotFound,
                Some(json!({"path": path.display().to_string()})),
            ),
            TdError::Database(_) | TdError::WithContext { .. } => (ErrorCode::DatabaseError, None),
            TdError::NotInitialized => (ErrorCode::NotInitialized, None),
            TdError::AlreadyInitialized { path } => (
                ErrorCode::AlreadyInitialized,
                Some(json!({"path": path.display().to_string()})),
            ),
            TdError::IssueNotFound { id } => {
                (ErrorCode::IssueNotFound, Some(json!({"searched_id": id})))
            }
            TdError::SessionNotFound { id } => {
                (ErrorCode::SessionNotFound, Some(json!({"session_id": id})))
            }
            TdError::IdCollision { id } => (ErrorCode::IdCollision, Some(json!({"id": id}))),
            TdError::Validation { field, reason } => (
                ErrorCode::ValidationFailed,
                Some(json!({"field": field, "reason": reason})),
            ),
            TdError::InvalidStatus { status } => {
                (ErrorCode::InvalidStatus, Some(json!({"status": status})))
            }
            TdError::InvalidPriority { priority } => (
                ErrorCode::InvalidPriority,
                Some(json!({"priority": priority, "valid_values": ["P0", "P1", "P2", "P3"]})),
            ),
            TdError::QueryParse { position, reason } => (
                ErrorCode::QueryParseError,
                Some(json!({"position": position, "reason": reason})),
            ),
            TdError::DependencyCycle { from, to } => (
                ErrorCode::CycleDetected,
                Some(json!({"issue_id": from, "depends_on_id": to})),
            ),
            TdError::DuplicateDependency { from, to } => (
                ErrorCode::DuplicateDependency,
                Some(json!({"issue_id": from, "depends_on_id": to})),
            ),
            TdError::Transport(detail) => {
                (ErrorCode::TransportError, Some(json!({"detail": detail})))
            }
            TdError::Config(_) => (ErrorCode::ConfigError, None),
            TdError::Io(_) => (ErrorCode::IoError, None),
            TdError::Json(_) => (ErrorCode::JsonError, None),
            TdError::Yaml(_) => (ErrorCode::YamlError, None),
            TdError::Other(_) => (ErrorCode::InternalError, None),
        }
    }

    fn generate_hint(err: &TdError) -> Option<String> {
        match err {
            TdError::InvalidStatus { status } => detect_status_intent(status)
                .map(|detected| format!("Did you mean --status {detected}?")),
            TdError::IssueNotFound { .. } => {
                Some("Run 'td list' to see available issues.".to_string())
            }
            _ => None,
        }
    }
}

/// Status synonyms for intent detection.
static STATUS_SYNONYMS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    [
        ("done", "closed"),
        ("complete", "closed"),
        ("completed", "closed"),
        ("resolved", "closed"),
        ("wip", "in_progress"),
        ("working", "in_progress"),
        ("active", "in_progress"),
        ("started", "in_progress"),
        ("review", "in_review"),
        ("reviewing", "in_review"),
        ("new", "open"),
        ("todo", "open"),
        ("waiting", "blocked"),
    ]
    .into_iter()
    .collect()
});

fn detect_status_intent(provided: &str) -> Option<&'static str> {
    let normalized = provided.trim().to_lowercase().replace('-', "_");
    STATUS_SYNONYMS.get(normalized.as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_initialized_maps_to_database_exit_code() {
        let structured = StructuredError::from_error(&TdError::NotInitialized);
        assert_eq!(structured.code, ErrorCode::NotInitialized);
        assert_eq!(structured.code.exit_code(), 2);
        assert_eq!(structured.hint.as_deref(), Some("Run: td init"));
    }

    #[test]
    fn status_synonym_produces_hint() {
        let err = TdError::InvalidStatus {
            status: "done".to_string(),
        };
        let structured = StructuredError::from_error(&err);
        assert_eq!(
            structured.hint.as_deref(),
            Some("Did you mean --status closed?")
        );
        assert!(structured.retryable);
    }

    #[test]
    fn query_parse_json_shape() {
        let err = TdError::query_parse(3, "unexpected token ')'");
        let value = StructuredError::from_error(&err).to_json();
        assert_eq!(value["error"]["code"], "QUERY_PARSE_ERROR");
        assert_eq!(value["error"]["context"]["position"], 3);
    }

    #[test]
    fn human_output_without_color() {
        let structured = StructuredError::from_error(&TdError::Transport("HTTP 500".into()));
        let text = structured.to_human(false);
        assert!(text.starts_with("Error: Webhook delivery failed: HTTP 500"));
    }
}
