//! CLI definitions and entry point.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Local, agent-aware issue tracker (`SQLite`)
#[derive(Parser, Debug)]
#[command(name = "td", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (defaults to .todos/issues.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Actor name recorded on new sessions
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// `SQLite` busy timeout in ms
    #[arg(long, global = true)]
    pub lock_timeout: Option<u64>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a td workspace in the current directory
    Init,

    /// Create a new issue
    Create(CreateArgs),

    /// Show issue details
    Show {
        /// Issue ID
        id: String,
    },

    /// List issues
    List(ListArgs),

    /// Update an issue
    Update(UpdateArgs),

    /// Begin work on issues
    Start(TransitionArgs),

    /// Submit issues for review
    Review(TransitionArgs),

    /// Approve reviewed issues (closes them)
    Approve(TransitionArgs),

    /// Send issues back for rework
    Reject(TransitionArgs),

    /// Close issues
    Close(TransitionArgs),

    /// Reopen closed issues
    Reopen(TransitionArgs),

    /// Manage dependencies
    Dep {
        #[command(subcommand)]
        command: DepCommands,
    },

    /// Run a query expression
    Query(QueryArgs),

    /// Search ids, titles and labels
    Search(SearchArgs),

    /// Append a progress log entry
    Log(LogArgs),

    /// Comment on an issue
    Comment(CommentArgs),

    /// Record handoff notes for the next session
    Handoff(HandoffArgs),

    /// Link a file to an issue
    Link(LinkArgs),

    /// Inspect and rotate sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Deliver a spooled webhook payload
    #[command(hide = true)]
    WebhookDispatch {
        /// Spool file written by a mutating command
        spool: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct CreateArgs {
    /// Issue title
    pub title: String,

    /// Longer description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Issue type (task, bug, feature, epic, chore)
    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    /// Priority (P0-P3)
    #[arg(short, long)]
    pub priority: Option<String>,

    /// Parent issue ID
    #[arg(long)]
    pub parent: Option<String>,

    /// Labels (comma-separated or repeated)
    #[arg(short, long = "labels", value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Issues this one depends on
    #[arg(long = "depends-on", value_delimiter = ',')]
    pub depends_on: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Filter by status (repeatable)
    #[arg(short, long)]
    pub status: Vec<String>,

    /// Filter by type (repeatable)
    #[arg(short = 't', long = "type")]
    pub issue_type: Vec<String>,

    /// Filter by priority (repeatable)
    #[arg(short, long)]
    pub priority: Vec<String>,

    /// Only children of this issue
    #[arg(long)]
    pub parent: Option<String>,

    /// Only issues with this label
    #[arg(short, long)]
    pub label: Option<String>,

    /// Include closed issues
    #[arg(short, long)]
    pub all: bool,

    /// Maximum rows
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    /// Issue ID
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    /// New description (empty clears)
    #[arg(short, long)]
    pub description: Option<String>,

    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    #[arg(short, long)]
    pub priority: Option<String>,

    #[arg(short, long)]
    pub status: Option<String>,

    /// New parent (empty clears)
    #[arg(long)]
    pub parent: Option<String>,

    /// Replace labels (comma-separated)
    #[arg(short, long = "labels", value_delimiter = ',')]
    pub labels: Option<Vec<String>>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TransitionArgs {
    /// Issue IDs
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Reason, logged on each issue
    #[arg(short, long)]
    pub reason: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum DepCommands {
    /// ISSUE depends on DEPENDS_ON
    Add {
        issue: String,
        depends_on: String,
    },

    /// Remove a dependency edge
    #[command(alias = "remove")]
    Rm {
        issue: String,
        depends_on: String,
    },

    /// List what an issue depends on
    List {
        id: String,

        /// List dependents instead
        #[arg(long)]
        reverse: bool,
    },

    /// Everything transitively blocked by an issue
    Blocked {
        id: String,

        /// Stop at closed issues
        #[arg(long)]
        open_only: bool,
    },

    /// Open issues whose dependencies are all closed
    Ready {
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Query expression, e.g. `status = open AND priority = P1`
    pub expr: String,

    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Matched against id, title and labels
    pub term: String,

    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LogArgs {
    pub issue: String,

    pub message: String,

    /// progress, blocker, decision, hypothesis, tried, result
    #[arg(short = 't', long = "type", default_value = "progress")]
    pub log_type: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CommentArgs {
    pub issue: String,

    pub text: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct HandoffArgs {
    pub issue: String,

    #[arg(long)]
    pub done: Vec<String>,

    #[arg(long)]
    pub remaining: Vec<String>,

    #[arg(long = "decision")]
    pub decisions: Vec<String>,

    #[arg(long)]
    pub uncertain: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LinkArgs {
    pub issue: String,

    pub path: PathBuf,

    /// implementation, test, reference, config
    #[arg(long, default_value = "implementation")]
    pub role: String,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Show (or start) the current session
    Whoami,

    /// Start a fresh session for this agent
    New {
        #[arg(long)]
        name: Option<String>,
    },

    /// List all sessions
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn create_splits_labels() {
        let cli = Cli::parse_from(["td", "create", "Fix it", "-l", "a,b", "--depends-on", "td-aaaaaa"]);
        let Commands::Create(args) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.labels, vec!["a", "b"]);
        assert_eq!(args.depends_on, vec!["td-aaaaaa"]);
    }

    #[test]
    fn globals_after_subcommand() {
        let cli = Cli::parse_from(["td", "list", "--json", "--lock-timeout", "5"]);
        assert!(cli.json);
        assert_eq!(cli.lock_timeout, Some(5));
    }
}
