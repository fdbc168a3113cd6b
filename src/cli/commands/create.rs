//! Create command implementation.

use super::{CommandContext, issue_line};
use crate::cli::CreateArgs;
use crate::config::CliOverrides;
use crate::deps;
use crate::error::{Result, TdError};
use crate::model::{Issue, IssueType, Priority};
use crate::storage::SqliteStorage;
use crate::util::generate_issue_id;
use chrono::Utc;
use std::str::FromStr;

const MAX_TITLE_LEN: usize = 500;

/// Build the issue described by `args`, with a fresh id.
///
/// # Errors
///
/// Returns a validation error for a bad title, priority, or type.
pub fn build_issue(storage: &SqliteStorage, args: &CreateArgs) -> Result<Issue> {
    let title = args.title.trim();
    if title.is_empty() {
        return Err(TdError::validation("title", "must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(TdError::validation(
            "title",
            format!("must be at most {MAX_TITLE_LEN} characters"),
        ));
    }

    let created_at = Utc::now();
    let id = generate_issue_id(title, created_at, |candidate| storage.id_exists(candidate))?;

    let mut issue = Issue::new(id, title);
    issue.created_at = created_at;
    issue.updated_at = created_at;
    issue.description = args
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    if let Some(priority) = &args.priority {
        issue.priority = Priority::from_str(priority)?;
    }
    if let Some(issue_type) = &args.issue_type {
        issue.issue_type = IssueType::from_str(issue_type)?;
    }
    issue.parent_id = args.parent.clone().filter(|p| !p.is_empty());
    issue.labels = args
        .labels
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    issue.labels.sort();
    issue.labels.dedup();
    Ok(issue)
}

/// Execute the create command.
///
/// # Errors
///
/// Returns an error if validation or any store operation fails.
pub fn execute(args: &CreateArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let mut ctx = CommandContext::open(cli, json)?;
    let session = ctx.session()?;

    let issue = build_issue(&ctx.storage, args)?;
    let mut targets = args.depends_on.clone();
    targets.sort();
    targets.dedup();
    // Nothing depends on a new issue yet, so no edge from it can cycle.
    for target in &targets {
        super::require_issue(&ctx.storage, target)?;
    }

    ctx.storage.create_issue(&issue, &session.id)?;
    tracing::info!(id = %issue.id, session = %session.id, "created issue");

    for target in &targets {
        deps::validate_and_add(&mut ctx.storage, &issue.id, target, &session.id)?;
    }

    ctx.finish();
    ctx.emit(&issue, || println!("Created {}", issue_line(&issue)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(title: &str) -> CreateArgs {
        CreateArgs {
            title: title.to_string(),
            ..CreateArgs::default()
        }
    }

    #[test]
    fn builds_with_classification() {
        let storage = SqliteStorage::open_memory().unwrap();
        let mut a = args("  Add retries  ");
        a.priority = Some("p0".into());
        a.issue_type = Some("bug".into());
        a.labels = vec!["net".into(), " ".into(), "net".into(), "api".into()];

        let issue = build_issue(&storage, &a).unwrap();
        assert_eq!(issue.title, "Add retries");
        assert_eq!(issue.priority, Priority::P0);
        assert_eq!(issue.issue_type, IssueType::Bug);
        assert_eq!(issue.labels, vec!["api", "net"]);
        assert!(issue.id.starts_with("td-"));
    }

    #[test]
    fn rejects_bad_input() {
        let storage = SqliteStorage::open_memory().unwrap();
        assert!(matches!(
            build_issue(&storage, &args("   ")).unwrap_err(),
            TdError::Validation { .. }
        ));
        let mut a = args("x");
        a.priority = Some("P9".into());
        assert!(matches!(
            build_issue(&storage, &a).unwrap_err(),
            TdError::InvalidPriority { .. }
        ));
    }
}
