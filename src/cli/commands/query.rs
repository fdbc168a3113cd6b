use super::{CommandContext, print_issue_lines};
use crate::cli::{QueryArgs, SearchArgs};
use crate::config::CliOverrides;
use crate::error::Result;
use crate::query::{self, QueryOptions};

/// Execute the query command.
///
/// # Errors
///
/// Returns `QueryParse` for malformed expressions, or a database error.
pub fn execute(args: &QueryArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    // Parse before touching the workspace so syntax errors are cheap.
    let expr = query::parse(&args.expr)?;
    tracing::debug!(expr = %expr, "parsed query");

    let ctx = CommandContext::open(cli, json)?;
    let options = QueryOptions {
        limit: args.limit,
        max_results: ctx.config.max_results,
    };
    let issues = query::execute_expr(&ctx.storage, &expr, &options)?;
    ctx.emit(&issues, || print_issue_lines(&issues, "No matching issues."))
}

/// Execute the search command.
///
/// # Errors
///
/// Returns an error if the search fails.
pub fn search(args: &SearchArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let ctx = CommandContext::open(cli, json)?;
    let issues = query::quick_search(&ctx.storage, &args.term, args.limit)?;
    ctx.emit(&issues, || print_issue_lines(&issues, "No matching issues."))
}
