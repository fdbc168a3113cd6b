use super::{CommandContext, issue_line, require_issue};
use crate::config::CliOverrides;
use crate::deps;
use crate::error::Result;
use crate::model::{Comment, Handoff, Issue, IssueFile, Log};
use crate::storage::{ListFilters, SqliteStorage};
use serde::Serialize;

/// Everything known about one issue.
#[derive(Debug, Serialize)]
pub struct IssueDetails {
    #[serde(flatten)]
    pub issue: Issue,
    pub depends_on: Vec<Issue>,
    pub blocks: Vec<Issue>,
    pub children: Vec<Issue>,
    pub logs: Vec<Log>,
    pub comments: Vec<Comment>,
    pub handoffs: Vec<Handoff>,
    pub files: Vec<IssueFile>,
}

/// # Errors
///
/// Returns `IssueNotFound` or a database error.
pub fn load_details(storage: &SqliteStorage, id: &str) -> Result<IssueDetails> {
    let issue = require_issue(storage, id)?;
    let children = storage.list_issues(&ListFilters {
        parent_id: Some(id.to_string()),
        ..ListFilters::all()
    })?;
    Ok(IssueDetails {
        depends_on: deps::get_dependencies(storage, id)?,
        blocks: deps::get_dependents(storage, id)?,
        children,
        logs: storage.list_logs(Some(id))?,
        comments: storage.list_comments(Some(id))?,
        handoffs: storage.list_handoffs(Some(id))?,
        files: storage.list_files(Some(id))?,
        issue,
    })
}

/// Execute the show command.
///
/// # Errors
///
/// Returns `IssueNotFound` or a database error.
pub fn execute(id: &str, json: bool, cli: &CliOverrides) -> Result<()> {
    let ctx = CommandContext::open(cli, json)?;
    let details = load_details(&ctx.storage, id)?;
    ctx.emit(&details, || print_details(&details))
}

fn print_details(d: &IssueDetails) {
    let issue = &d.issue;
    println!("{}: {}", issue.id, issue.title);
    println!(
        "Status: {}  Priority: {}  Type: {}",
        issue.status, issue.priority, issue.issue_type
    );
    if let Some(parent) = &issue.parent_id {
        println!("Parent: {parent}");
    }
    if !issue.labels.is_empty() {
        println!("Labels: {}", issue.labels.join(", "));
    }
    println!("Created: {}", issue.created_at.format("%Y-%m-%d %H:%M"));
    if let Some(closed) = issue.closed_at {
        println!("Closed: {}", closed.format("%Y-%m-%d %H:%M"));
    }
    if let Some(description) = &issue.description {
        println!("\n{description}");
    }

    print_section("Depends on", &d.depends_on);
    print_section("Blocks", &d.blocks);
    print_section("Children", &d.children);

    if !d.logs.is_empty() {
        println!("\nLog:");
        for log in &d.logs {
            println!(
                "  {} [{}] {}",
                log.timestamp.format("%m-%d %H:%M"),
                log.log_type.as_str(),
                log.message
            );
        }
    }
    if !d.comments.is_empty() {
        println!("\nComments:");
        for comment in &d.comments {
            println!("  {} {}: {}", comment.created_at.format("%m-%d %H:%M"), comment.session_id, comment.text);
        }
    }
    if let Some(handoff) = d.handoffs.last() {
        println!("\nLast handoff ({}):", handoff.session_id);
        for (heading, items) in [
            ("done", &handoff.done),
            ("remaining", &handoff.remaining),
            ("decisions", &handoff.decisions),
            ("uncertain", &handoff.uncertain),
        ] {
            for item in items {
                println!("  {heading}: {item}");
            }
        }
    }
    if !d.files.is_empty() {
        println!("\nFiles:");
        for file in &d.files {
            println!("  {} ({})", file.path, file.role.as_str());
        }
    }
}

fn print_section(heading: &str, issues: &[Issue]) {
    if issues.is_empty() {
        return;
    }
    println!("\n{heading}:");
    for issue in issues {
        println!("  {}", issue_line(issue));
    }
}
