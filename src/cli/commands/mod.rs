//! Command implementations.
//!
//! Each command opens a [`CommandContext`], does its work, and prints either
//! plain text or pretty JSON. Mutating commands call
//! [`CommandContext::finish`] so new action rows reach the webhook.

pub mod create;
pub mod dep;
pub mod events;
pub mod init;
pub mod list;
pub mod query;
pub mod session;
pub mod show;
pub mod transition;
pub mod update;
pub mod webhook;

use anyhow::Context as _;
use crate::config::{self, CliOverrides, Config};
use crate::error::{OptionExt, Result};
use crate::model::{Issue, Session};
use crate::session::SessionManager;
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::env;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Resolved configuration plus an open store for one command.
pub struct CommandContext {
    pub config: Config,
    pub storage: SqliteStorage,
    pub json: bool,
}

impl CommandContext {
    /// Discover the workspace and open its database.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` outside a workspace, or a config/database error.
    pub fn open(cli: &CliOverrides, json: bool) -> Result<Self> {
        let config = Config::load(cli)?;
        let storage = config::open_storage(&config)?;
        debug!(db = %config.db_path.display(), "opened workspace");
        Ok(Self {
            config,
            storage,
            json,
        })
    }

    /// The session this invocation acts under, created on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be resolved.
    pub fn session(&mut self) -> Result<Session> {
        let branch = self.config.resolve_branch();
        let mut manager = SessionManager::new(&mut self.storage, &self.config.todos_dir, &branch)?;
        Ok(manager.get_or_create()?.session)
    }

    /// Spool new action rows and hand them to a background dispatcher.
    ///
    /// Webhook problems never fail the command that caused them.
    pub fn finish(&mut self) {
        let Some(webhook) = self.config.webhook.clone() else {
            return;
        };
        let project_dir = self.config.project_dir().to_string_lossy().into_owned();
        match crate::webhook::spool_pending(
            &mut self.storage,
            &webhook.url,
            &webhook.secret,
            &project_dir,
        ) {
            Ok(Some(path)) => spawn_dispatcher(&path),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to spool webhook payload"),
        }
    }

    /// Print `value` as JSON, or run `text` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn emit<T, F>(&self, value: &T, text: F) -> Result<()>
    where
        T: Serialize + ?Sized,
        F: FnOnce(),
    {
        if self.json {
            print_json(value)
        } else {
            text();
            Ok(())
        }
    }
}

/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn spawn_dispatcher(spool: &Path) {
    match start_dispatcher(spool) {
        Ok(pid) => debug!(pid, spool = %spool.display(), "webhook dispatcher started"),
        Err(err) => warn!(error = format!("{err:#}"), "failed to start webhook dispatcher"),
    }
}

fn start_dispatcher(spool: &Path) -> anyhow::Result<u32> {
    let exe = env::current_exe().context("locating td binary")?;
    let child = Command::new(&exe)
        .arg("webhook-dispatch")
        .arg(spool)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("spawning {}", exe.display()))?;
    Ok(child.id())
}

/// Load an issue or fail with `IssueNotFound`.
///
/// # Errors
///
/// Returns `IssueNotFound` or a database error.
pub fn require_issue(storage: &SqliteStorage, id: &str) -> Result<Issue> {
    storage.get_issue(id)?.or_issue_not_found(id)
}

/// One-line summary used by list-style output.
#[must_use]
pub fn issue_line(issue: &Issue) -> String {
    let labels = if issue.labels.is_empty() {
        String::new()
    } else {
        format!(" [{}]", issue.labels.join(", "))
    };
    format!(
        "{}  {}  {:<11}  {:<7}  {}{}",
        issue.id,
        issue.priority,
        issue.status.as_str(),
        issue.issue_type.as_str(),
        issue.title,
        labels
    )
}

/// Print issues one per line, or a note when there are none.
pub fn print_issue_lines(issues: &[Issue], empty: &str) {
    if issues.is_empty() {
        println!("{empty}");
        return;
    }
    for issue in issues {
        println!("{}", issue_line(issue));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_line_includes_labels() {
        let mut issue = Issue::new("td-abc123", "Wire webhook");
        assert_eq!(
            issue_line(&issue),
            "td-abc123  P2  open         task     Wire webhook"
        );
        issue.labels = vec!["api".into(), "infra".into()];
        assert!(issue_line(&issue).ends_with("Wire webhook [api, infra]"));
    }
}
