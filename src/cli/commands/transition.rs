//! Workflow transitions: start, review, approve, reject, close, reopen.
//!
//! ```text
//! open ──start──▶ in_progress ──review──▶ in_review ──approve──▶ closed
//!                      ▲                      │
//!                      └───────reject─────────┘
//! ```
//! `close` works from any open state and `reopen` returns a closed issue to
//! `open`.

use super::{CommandContext, issue_line};
use crate::cli::TransitionArgs;
use crate::config::CliOverrides;
use crate::error::{Result, TdError};
use crate::model::{ActionType, Issue, LogType, Status};
use crate::storage::{IssueUpdate, SqliteStorage};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Review,
    Approve,
    Reject,
    Close,
    Reopen,
}

impl Transition {
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Review => "review",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Close => "close",
            Self::Reopen => "reopen",
        }
    }

    #[must_use]
    pub const fn target(self) -> Status {
        match self {
            Self::Start | Self::Reject => Status::InProgress,
            Self::Review => Status::InReview,
            Self::Approve | Self::Close => Status::Closed,
            Self::Reopen => Status::Open,
        }
    }

    #[must_use]
    pub const fn action(self) -> ActionType {
        match self {
            Self::Start => ActionType::Start,
            Self::Review => ActionType::Review,
            Self::Approve => ActionType::Approve,
            Self::Reject => ActionType::Reject,
            Self::Close => ActionType::Close,
            Self::Reopen => ActionType::Reopen,
        }
    }

    /// Whether an issue in `from` may take this transition.
    #[must_use]
    pub fn allowed_from(self, from: &Status) -> bool {
        match self {
            Self::Start => !from.is_terminal() && *from != Status::InProgress,
            Self::Review => matches!(from, Status::Open | Status::InProgress | Status::Blocked),
            Self::Approve | Self::Reject => *from == Status::InReview,
            Self::Close => !from.is_terminal(),
            Self::Reopen => from.is_terminal(),
        }
    }

    const fn log_type(self) -> LogType {
        match self {
            Self::Approve | Self::Reject => LogType::Decision,
            _ => LogType::Progress,
        }
    }
}

/// Apply `transition` to one issue, logging `reason` when given.
///
/// # Errors
///
/// Returns `IssueNotFound`, a validation error for a disallowed move, or a
/// database error.
pub fn apply(
    storage: &mut SqliteStorage,
    id: &str,
    transition: Transition,
    reason: Option<&str>,
    session_id: &str,
) -> Result<Issue> {
    let issue = super::require_issue(storage, id)?;
    if !transition.allowed_from(&issue.status) {
        return Err(TdError::validation(
            "status",
            format!(
                "cannot {} {id}: issue is {}",
                transition.verb(),
                issue.status
            ),
        ));
    }

    let updated = storage.update_issue(
        id,
        &IssueUpdate::status(transition.target()),
        transition.action(),
        session_id,
    )?;
    if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
        storage.add_log(
            id,
            session_id,
            &format!("{}: {reason}", transition.verb()),
            &transition.log_type(),
        )?;
    }
    info!(id, transition = transition.verb(), status = %updated.status, "transitioned issue");
    Ok(updated)
}

/// Execute a transition command over every id.
///
/// # Errors
///
/// Stops at the first issue that cannot be moved.
pub fn execute(
    transition: Transition,
    args: &TransitionArgs,
    json: bool,
    cli: &CliOverrides,
) -> Result<()> {
    let mut ctx = CommandContext::open(cli, json)?;
    let session = ctx.session()?;

    let mut updated = Vec::with_capacity(args.ids.len());
    let mut failure = None;
    for id in &args.ids {
        match apply(
            &mut ctx.storage,
            id,
            transition,
            args.reason.as_deref(),
            &session.id,
        ) {
            Ok(issue) => updated.push(issue),
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    // Whatever succeeded is already committed and should be announced.
    ctx.finish();
    if let Some(err) = failure {
        return Err(err);
    }
    ctx.emit(&updated, || {
        for issue in &updated {
            println!("{} {}", capitalize(transition.verb()), issue_line(issue));
        }
    })
}

fn capitalize(verb: &str) -> String {
    let mut chars = verb.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ActionFilter;

    fn store_with(id: &str) -> SqliteStorage {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.create_issue(&Issue::new(id, "work"), "ses_1").unwrap();
        storage
    }

    #[test]
    fn review_cycle_records_actions() {
        let mut storage = store_with("td-0000aa");
        apply(&mut storage, "td-0000aa", Transition::Start, None, "ses_1").unwrap();
        apply(&mut storage, "td-0000aa", Transition::Review, None, "ses_1").unwrap();
        let back = apply(
            &mut storage,
            "td-0000aa",
            Transition::Reject,
            Some("missing tests"),
            "ses_2",
        )
        .unwrap();
        assert_eq!(back.status, Status::InProgress);

        let actions: Vec<_> = storage
            .list_action_log(&ActionFilter {
                entity_id: Some("td-0000aa".into()),
                ..ActionFilter::default()
            })
            .unwrap()
            .into_iter()
            .map(|a| a.action_type)
            .collect();
        // The reason is logged after the status change.
        assert!(actions.ends_with(&[
            ActionType::Start,
            ActionType::Review,
            ActionType::Reject,
            ActionType::Log
        ]));

        let workflow: Vec<_> = storage
            .list_action_log(&ActionFilter {
                entity_id: Some("td-0000aa".into()),
                action_types: vec![ActionType::Start, ActionType::Review, ActionType::Reject],
                ..ActionFilter::default()
            })
            .unwrap()
            .into_iter()
            .map(|a| a.action_type)
            .collect();
        assert_eq!(
            workflow,
            vec![ActionType::Start, ActionType::Review, ActionType::Reject]
        );
        let logs = storage.list_logs(Some("td-0000aa")).unwrap();
        assert_eq!(logs[0].message, "reject: missing tests");
        assert_eq!(logs[0].log_type, LogType::Decision);
    }

    #[test]
    fn approve_closes_and_reopen_clears() {
        let mut storage = store_with("td-0000bb");
        apply(&mut storage, "td-0000bb", Transition::Review, None, "ses_1").unwrap();
        let closed = apply(&mut storage, "td-0000bb", Transition::Approve, None, "ses_2").unwrap();
        assert_eq!(closed.status, Status::Closed);
        assert!(closed.closed_at.is_some());

        let reopened = apply(&mut storage, "td-0000bb", Transition::Reopen, None, "ses_2").unwrap();
        assert_eq!(reopened.status, Status::Open);
        assert!(reopened.closed_at.is_none());
    }

    #[test]
    fn disallowed_moves_are_validation_errors() {
        let mut storage = store_with("td-0000cc");
        let err = apply(&mut storage, "td-0000cc", Transition::Approve, None, "ses_1").unwrap_err();
        assert!(matches!(err, TdError::Validation { .. }));
        let err = apply(&mut storage, "td-0000cc", Transition::Reopen, None, "ses_1").unwrap_err();
        assert!(matches!(err, TdError::Validation { .. }));
        let err = apply(&mut storage, "td-missing", Transition::Close, None, "ses_1").unwrap_err();
        assert!(matches!(err, TdError::IssueNotFound { .. }));
    }

    #[test]
    fn capitalize_verbs() {
        assert_eq!(capitalize("approve"), "Approve");
        assert_eq!(capitalize(""), "");
    }
}
