//! Dependency command implementation.

use super::{CommandContext, print_issue_lines, require_issue};
use crate::cli::DepCommands;
use crate::config::CliOverrides;
use crate::deps;
use crate::error::Result;
use crate::model::Issue;
use crate::query::Snapshot;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Serialize)]
struct EdgeResult<'a> {
    status: &'static str,
    issue_id: &'a str,
    depends_on_id: &'a str,
}

/// Execute the dep command.
///
/// # Errors
///
/// Returns validation errors unchanged, or a database error.
pub fn execute(command: &DepCommands, json: bool, cli: &CliOverrides) -> Result<()> {
    let mut ctx = CommandContext::open(cli, json)?;

    match command {
        DepCommands::Add { issue, depends_on } => {
            let session = ctx.session()?;
            deps::validate_and_add(&mut ctx.storage, issue, depends_on, &session.id)?;
            ctx.finish();
            let result = EdgeResult {
                status: "added",
                issue_id: issue,
                depends_on_id: depends_on,
            };
            ctx.emit(&result, || println!("Added dependency: {issue} -> {depends_on}"))
        }
        DepCommands::Rm { issue, depends_on } => {
            let session = ctx.session()?;
            let removed = deps::remove(&mut ctx.storage, issue, depends_on, &session.id)?;
            ctx.finish();
            let result = EdgeResult {
                status: if removed { "removed" } else { "not_found" },
                issue_id: issue,
                depends_on_id: depends_on,
            };
            ctx.emit(&result, || {
                if removed {
                    println!("Removed dependency: {issue} -> {depends_on}");
                } else {
                    println!("Dependency not found: {issue} -> {depends_on}");
                }
            })
        }
        DepCommands::List { id, reverse } => {
            require_issue(&ctx.storage, id)?;
            let issues = if *reverse {
                deps::get_dependents(&ctx.storage, id)?
            } else {
                deps::get_dependencies(&ctx.storage, id)?
            };
            let empty = if *reverse {
                format!("Nothing depends on {id}")
            } else {
                format!("{id} has no dependencies")
            };
            ctx.emit(&issues, || print_issue_lines(&issues, &empty))
        }
        DepCommands::Blocked { id, open_only } => {
            require_issue(&ctx.storage, id)?;
            let snapshot = Snapshot::load(&ctx.storage)?;
            let issues = blocked_by(&snapshot, id, *open_only)?;
            let empty = format!("Nothing is blocked by {id}");
            ctx.emit(&issues, || print_issue_lines(&issues, &empty))
        }
        DepCommands::Ready { limit } => {
            let snapshot = Snapshot::load(&ctx.storage)?;
            let mut issues = ready_issues(&snapshot)?;
            if let Some(limit) = limit {
                issues.truncate(*limit);
            }
            ctx.emit(&issues, || print_issue_lines(&issues, "No ready issues."))
        }
    }
}

/// Issues transitively blocked by `id`, in natural order.
///
/// # Errors
///
/// Returns an error if the graph lookup fails.
pub fn blocked_by(snapshot: &Snapshot, id: &str, open_only: bool) -> Result<Vec<Issue>> {
    let mut visited = HashSet::new();
    let ids: HashSet<String> = if open_only {
        deps::transitive_blocked_open(snapshot, id, &mut visited)?
    } else {
        deps::transitive_blocked(snapshot, id, &mut visited)?
    }
    .into_iter()
    .collect();
    Ok(snapshot
        .issues()
        .iter()
        .filter(|issue| ids.contains(&issue.id))
        .cloned()
        .collect())
}

/// Open issues with no open dependencies, in natural order.
///
/// # Errors
///
/// Returns an error if the graph lookup fails.
pub fn ready_issues(snapshot: &Snapshot) -> Result<Vec<Issue>> {
    let mut ready = Vec::new();
    for issue in snapshot.issues() {
        if !issue.status.is_terminal() && deps::is_ready(snapshot, &issue.id)? {
            ready.push(issue.clone());
        }
    }
    Ok(ready)
}
