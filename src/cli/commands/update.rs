use super::{CommandContext, issue_line};
use crate::cli::UpdateArgs;
use crate::config::CliOverrides;
use crate::error::{Result, TdError};
use crate::model::{ActionType, IssueType, Priority, Status};
use crate::storage::IssueUpdate;
use std::str::FromStr;

/// Translate CLI flags into an update. Empty strings clear optional fields.
///
/// # Errors
///
/// Returns an error for invalid values or when nothing would change.
pub fn update_from_args(args: &UpdateArgs) -> Result<IssueUpdate> {
    let title = match args.title.as_deref().map(str::trim) {
        Some("") => return Err(TdError::validation("title", "must not be empty")),
        other => other.map(str::to_string),
    };
    let update = IssueUpdate {
        title,
        description: args
            .description
            .as_deref()
            .map(|d| Some(d.trim().to_string()).filter(|d| !d.is_empty())),
        status: args.status.as_deref().map(Status::from_str).transpose()?,
        priority: args.priority.as_deref().map(Priority::from_str).transpose()?,
        issue_type: args.issue_type.as_deref().map(IssueType::from_str).transpose()?,
        parent_id: args
            .parent
            .as_deref()
            .map(|p| Some(p.trim().to_string()).filter(|p| !p.is_empty())),
        labels: args.labels.clone(),
    };
    if update.is_empty() {
        return Err(TdError::validation("update", "no fields to update"));
    }
    Ok(update)
}

/// Execute the update command.
///
/// # Errors
///
/// Returns an error if validation or the store update fails.
pub fn execute(args: &UpdateArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let update = update_from_args(args)?;
    let mut ctx = CommandContext::open(cli, json)?;
    let session = ctx.session()?;

    let issue = ctx
        .storage
        .update_issue(&args.id, &update, ActionType::Update, &session.id)?;
    ctx.finish();
    ctx.emit(&issue, || println!("Updated {}", issue_line(&issue)))
}
