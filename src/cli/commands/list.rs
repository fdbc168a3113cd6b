use super::{CommandContext, print_issue_lines};
use crate::cli::ListArgs;
use crate::config::CliOverrides;
use crate::error::Result;
use crate::model::{IssueType, Priority, Status};
use crate::storage::ListFilters;
use std::str::FromStr;

/// Translate CLI flags into store filters.
///
/// # Errors
///
/// Returns an error for an unknown status or priority.
pub fn filters_from_args(args: &ListArgs) -> Result<ListFilters> {
    let statuses = args
        .status
        .iter()
        .map(|s| Status::from_str(s))
        .collect::<Result<Vec<_>>>()?;
    let types = args
        .issue_type
        .iter()
        .map(|t| IssueType::from_str(t))
        .collect::<Result<Vec<_>>>()?;
    let priorities = args
        .priority
        .iter()
        .map(|p| Priority::from_str(p))
        .collect::<Result<Vec<_>>>()?;

    // An explicit status filter implies the caller knows whether closed
    // issues belong in the result.
    let include_closed = args.all || statuses.iter().any(Status::is_terminal);

    Ok(ListFilters {
        statuses: (!statuses.is_empty()).then_some(statuses),
        types: (!types.is_empty()).then_some(types),
        priorities: (!priorities.is_empty()).then_some(priorities),
        parent_id: args.parent.clone(),
        label: args.label.clone(),
        include_closed,
        limit: args.limit,
    })
}

/// Execute the list command.
///
/// # Errors
///
/// Returns an error if filters are invalid or the query fails.
pub fn execute(args: &ListArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let filters = filters_from_args(args)?;
    let ctx = CommandContext::open(cli, json)?;
    let issues = ctx.storage.list_issues(&filters)?;
    ctx.emit(&issues, || print_issue_lines(&issues, "No issues found."))
}
