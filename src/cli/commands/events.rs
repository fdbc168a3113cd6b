//! Per-issue event streams: log, comment, handoff, link.

use super::CommandContext;
use crate::cli::{CommentArgs, HandoffArgs, LinkArgs, LogArgs};
use crate::config::CliOverrides;
use crate::error::{Result, TdError};
use crate::model::{FileRole, LogType};
use crate::storage::NewHandoff;
use crate::util::hash_file;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

fn non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TdError::validation(field, "must not be empty"));
    }
    Ok(trimmed)
}

/// Execute the log command.
///
/// # Errors
///
/// Returns an error if the message is empty or the issue is missing.
pub fn log(args: &LogArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let message = non_empty("message", &args.message)?;
    let log_type = LogType::from_str(&args.log_type)?;
    let mut ctx = CommandContext::open(cli, json)?;
    let session = ctx.session()?;

    let entry = ctx
        .storage
        .add_log(&args.issue, &session.id, message, &log_type)?;
    ctx.finish();
    ctx.emit(&entry, || {
        println!("Logged [{}] on {}", entry.log_type.as_str(), entry.issue_id);
    })
}

/// Execute the comment command.
///
/// # Errors
///
/// Returns an error if the text is empty or the issue is missing.
pub fn comment(args: &CommentArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let text = non_empty("text", &args.text)?;
    let mut ctx = CommandContext::open(cli, json)?;
    let session = ctx.session()?;

    let comment = ctx.storage.add_comment(&args.issue, &session.id, text)?;
    ctx.finish();
    ctx.emit(&comment, || println!("Commented on {}", comment.issue_id))
}

/// Execute the handoff command.
///
/// # Errors
///
/// Returns an error if every list is empty or the issue is missing.
pub fn handoff(args: &HandoffArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    if args.done.is_empty()
        && args.remaining.is_empty()
        && args.decisions.is_empty()
        && args.uncertain.is_empty()
    {
        return Err(TdError::validation(
            "handoff",
            "give at least one of --done, --remaining, --decision, --uncertain",
        ));
    }
    let mut ctx = CommandContext::open(cli, json)?;
    let session = ctx.session()?;

    let handoff = ctx.storage.add_handoff(&NewHandoff {
        issue_id: &args.issue,
        session_id: &session.id,
        done: &args.done,
        remaining: &args.remaining,
        decisions: &args.decisions,
        uncertain: &args.uncertain,
    })?;
    ctx.finish();
    ctx.emit(&handoff, || println!("Recorded handoff on {}", handoff.issue_id))
}

/// Hash of the file, or empty when it cannot be read.
#[must_use]
pub fn content_hash_or_empty(path: &Path) -> String {
    match hash_file(path) {
        Ok(hash) => hash,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "linking unreadable file");
            String::new()
        }
    }
}

/// Execute the link command.
///
/// # Errors
///
/// Returns an error if the issue is missing or the store fails.
pub fn link(args: &LinkArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let role = FileRole::from_str(&args.role)?;
    let mut ctx = CommandContext::open(cli, json)?;
    let session = ctx.session()?;

    // Store paths relative to the project when possible.
    let absolute = std::path::absolute(&args.path)?;
    let display_path = absolute
        .strip_prefix(ctx.config.project_dir())
        .unwrap_or(&absolute)
        .to_string_lossy()
        .into_owned();
    let hash = content_hash_or_empty(&absolute);

    let file = ctx
        .storage
        .link_file(&args.issue, &display_path, &role, &hash, &session.id)?;
    ctx.finish();
    ctx.emit(&file, || {
        println!("Linked {} ({}) to {}", file.path, file.role.as_str(), file.issue_id);
    })
}
