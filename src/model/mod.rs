//! Core data types for `td_rust`.
//!
//! This module defines the fundamental types used throughout the application:
//! - `Issue` - The core work item
//! - `Status`, `IssueType`, `Priority` - Issue classification
//! - `Log`, `Comment`, `Handoff`, `IssueFile` - Per-issue event streams
//! - `ActionLog` - Append-only audit rows
//! - `Session` - Per-agent work sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The only dependency kind the tracker records.
pub const DEPENDS_ON: &str = "depends_on";

/// Issue lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    InReview,
    Closed,
    #[serde(untagged)]
    Custom(String),
}

impl Status {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::InReview => "in_review",
            Self::Closed => "closed",
            Self::Custom(value) => value,
        }
    }

    /// Closed issues count as completed for readiness and blocked-set pruning.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = crate::error::TdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "open" => Ok(Self::Open),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "in_review" | "inreview" => Ok(Self::InReview),
            "closed" => Ok(Self::Closed),
            other => Err(crate::error::TdError::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Issue priority, `P0` (critical) through `P3` (low).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum Priority {
    P0,
    P1,
    #[default]
    P2,
    P3,
}

impl Priority {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = crate::error::TdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        let val = upper.strip_prefix('P').unwrap_or(&upper);
        match val {
            "0" => Ok(Self::P0),
            "1" => Ok(Self::P1),
            "2" => Ok(Self::P2),
            "3" => Ok(Self::P3),
            _ => Err(crate::error::TdError::InvalidPriority {
                priority: s.trim().to_string(),
            }),
        }
    }
}

/// Issue type category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    #[default]
    Task,
    Bug,
    Feature,
    Epic,
    Chore,
    #[serde(untagged)]
    Custom(String),
}

impl IssueType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Epic => "epic",
            Self::Chore => "chore",
            Self::Custom(value) => value,
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = crate::error::TdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "epic" => Ok(Self::Epic),
            "chore" => Ok(Self::Chore),
            other => Ok(Self::Custom(other.to_string())),
        }
    }
}

/// The primary issue entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    /// Unique ID (e.g., "td-a1b2c3").
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: Status,

    #[serde(rename = "type", default)]
    pub issue_type: IssueType,

    #[serde(default)]
    pub priority: Priority,

    /// Parent issue (epics own their children through this field).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Issue {
    /// Build a new open issue with default classification.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            status: Status::Open,
            issue_type: IssueType::Task,
            priority: Priority::P2,
            parent_id: None,
            labels: Vec::new(),
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }
}

/// A directed `depends_on` edge between two issues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dependency {
    /// The issue that has the dependency (source).
    pub issue_id: String,
    /// The issue being depended on (target).
    pub depends_on_id: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// Category of a progress log entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    #[default]
    Progress,
    Blocker,
    Decision,
    Hypothesis,
    Tried,
    Result,
    #[serde(untagged)]
    Custom(String),
}

impl LogType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Progress => "progress",
            Self::Blocker => "blocker",
            Self::Decision => "decision",
            Self::Hypothesis => "hypothesis",
            Self::Tried => "tried",
            Self::Result => "result",
            Self::Custom(value) => value,
        }
    }
}

impl FromStr for LogType {
    type Err = crate::error::TdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "progress" => Self::Progress,
            "blocker" => Self::Blocker,
            "decision" => Self::Decision,
            "hypothesis" => Self::Hypothesis,
            "tried" => Self::Tried,
            "result" => Self::Result,
            other => Self::Custom(other.to_string()),
        })
    }
}

/// A progress log entry attached to an issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Log {
    pub id: i64,
    pub issue_id: String,
    pub session_id: String,
    pub message: String,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub timestamp: DateTime<Utc>,
}

/// A comment on an issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: i64,
    pub issue_id: String,
    pub session_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Session-to-session handoff notes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Handoff {
    pub id: i64,
    pub issue_id: String,
    pub session_id: String,
    #[serde(default)]
    pub done: Vec<String>,
    #[serde(default)]
    pub remaining: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub uncertain: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Role a linked file plays for an issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    #[default]
    Implementation,
    Test,
    Reference,
    Config,
    #[serde(untagged)]
    Custom(String),
}

impl FileRole {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Implementation => "implementation",
            Self::Test => "test",
            Self::Reference => "reference",
            Self::Config => "config",
            Self::Custom(value) => value,
        }
    }
}

impl FromStr for FileRole {
    type Err = crate::error::TdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "implementation" | "impl" => Self::Implementation,
            "test" => Self::Test,
            "reference" | "ref" => Self::Reference,
            "config" => Self::Config,
            other => Self::Custom(other.to_string()),
        })
    }
}

/// A file linked to an issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueFile {
    pub issue_id: String,
    pub path: String,
    pub role: FileRole,
    /// SHA-256 of the file content at link time; empty when unreadable.
    pub content_hash: String,
    pub linked_at: DateTime<Utc>,
}

/// High-level action recorded in the action log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Start,
    Review,
    Approve,
    Reject,
    Close,
    Reopen,
    AddDep,
    RemoveDep,
    LinkFile,
    Handoff,
    Comment,
    Log,
    #[serde(untagged)]
    Custom(String),
}

impl ActionType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Start => "start",
            Self::Review => "review",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Close => "close",
            Self::Reopen => "reopen",
            Self::AddDep => "add_dep",
            Self::RemoveDep => "remove_dep",
            Self::LinkFile => "link_file",
            Self::Handoff => "handoff",
            Self::Comment => "comment",
            Self::Log => "log",
            Self::Custom(value) => value,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = crate::error::TdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "create" => Self::Create,
            "update" => Self::Update,
            "start" => Self::Start,
            "review" => Self::Review,
            "approve" => Self::Approve,
            "reject" => Self::Reject,
            "close" => Self::Close,
            "reopen" => Self::Reopen,
            "add_dep" => Self::AddDep,
            "remove_dep" => Self::RemoveDep,
            "link_file" => Self::LinkFile,
            "handoff" => Self::Handoff,
            "comment" => Self::Comment,
            "log" => Self::Log,
            other => Self::Custom(other.to_string()),
        })
    }
}

/// An append-only audit row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionLog {
    pub id: i64,
    pub session_id: String,
    pub action_type: ActionType,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub previous_data: String,
    #[serde(default)]
    pub new_data: String,
    pub timestamp: DateTime<Utc>,
}

/// A per-agent work session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// `ses_` followed by six hex characters.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub branch: String,
    pub fingerprint: String,
    pub agent_type: String,
    #[serde(default)]
    pub agent_pid: u32,
    #[serde(default)]
    pub previous_session_id: String,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_types_cover_recorded_actions_only() {
        for name in ["start", "review", "reject", "add_dep", "link_file", "log"] {
            assert_eq!(name.parse::<ActionType>().unwrap().as_str(), name);
        }
        assert_eq!(
            "delete".parse::<ActionType>().unwrap(),
            ActionType::Custom("delete".to_string())
        );
        assert_eq!(
            "block".parse::<ActionType>().unwrap(),
            ActionType::Custom("block".to_string())
        );
    }

    #[test]
    fn status_custom_roundtrip() {
        let status: Status = serde_json::from_str("\"waiting_on_vendor\"").unwrap();
        assert_eq!(status, Status::Custom("waiting_on_vendor".to_string()));
        let serialized = serde_json::to_string(&status).unwrap();
        assert_eq!(serialized, "\"waiting_on_vendor\"");
    }

    #[test]
    fn status_parse_accepts_dashes_and_case() {
        assert_eq!("In-Progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("CLOSED".parse::<Status>().unwrap(), Status::Closed);
        assert!("done".parse::<Status>().is_err());
    }

    #[test]
    fn priority_parse_forms() {
        assert_eq!("p1".parse::<Priority>().unwrap(), Priority::P1);
        assert_eq!("3".parse::<Priority>().unwrap(), Priority::P3);
        assert!("P4".parse::<Priority>().is_err());
        assert_eq!(serde_json::to_string(&Priority::P0).unwrap(), "\"P0\"");
    }

    #[test]
    fn issue_serializes_type_field() {
        let mut issue = Issue::new("td-abc123", "Wire up webhook");
        issue.issue_type = IssueType::Epic;
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("\"type\":\"epic\""));
        assert!(json.contains("\"status\":\"open\""));
        assert!(!json.contains("labels"));
        assert!(!json.contains("parent_id"));
    }

    #[test]
    fn action_type_snake_case() {
        assert_eq!(serde_json::to_string(&ActionType::AddDep).unwrap(), "\"add_dep\"");
        assert_eq!("REJECT".parse::<ActionType>().unwrap(), ActionType::Reject);
        assert_eq!(
            "archived".parse::<ActionType>().unwrap(),
            ActionType::Custom("archived".to_string())
        );
    }

    #[test]
    fn only_closed_is_terminal() {
        assert!(Status::Closed.is_terminal());
        assert!(!Status::InReview.is_terminal());
        assert!(!Status::Custom("done".into()).is_terminal());
    }
}
