//! `SQLite` storage implementation.

use crate::deps::{DependencyGraph, DependencyStore};
use crate::error::{Result, TdError};
use crate::model::{
    ActionLog, ActionType, Comment, DEPENDS_ON, Dependency, FileRole, Handoff, Issue, IssueFile, IssueType,
    Log, LogType, Priority, Session, Status,
};
use crate::storage::schema::apply_schema;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const ISSUE_COLUMNS: &str = "id, title, description, status, type, priority, parent_id, \
                             created_at, updated_at, closed_at";

const SESSION_COLUMNS: &str = "id, name, branch, fingerprint, agent_type, agent_pid, \
                               previous_session_id, started_at, last_activity";

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// An action row waiting to be written when the mutation commits.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub action_type: ActionType,
    pub entity_type: String,
    pub entity_id: String,
    pub previous_data: String,
    pub new_data: String,
}

/// Context for a mutation operation, collecting action-log side effects.
pub struct MutationContext {
    pub op_name: String,
    pub session_id: String,
    pub actions: Vec<PendingAction>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str, session_id: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            session_id: session_id.to_string(),
            actions: Vec::new(),
        }
    }

    /// Queue an action-log row for this mutation.
    pub fn record_action(
        &mut self,
        action_type: ActionType,
        entity_type: &str,
        entity_id: &str,
        previous_data: String,
        new_data: String,
    ) {
        self.actions.push(PendingAction {
            action_type,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            previous_data,
            new_data,
        });
    }
}

impl SqliteStorage {
    /// Open a new connection to the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a new connection with an optional busy timeout (ms).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open_with_timeout(path: &Path, lock_timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        if let Some(timeout) = lock_timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        }
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Execute a mutation inside an immediate transaction.
    ///
    /// Action rows queued on the context are appended before commit, so an
    /// aborted mutation leaves no audit trail behind.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, session_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut ctx = MutationContext::new(op, session_id);

        let result = f(&tx, &mut ctx)?;

        for action in &ctx.actions {
            insert_action_row(&tx, &ctx.session_id, action)?;
        }

        tx.commit()?;
        debug!(op = %ctx.op_name, actions = ctx.actions.len(), "mutation committed");

        Ok(result)
    }

    // ========================================================================
    // ISSUES
    // ========================================================================

    /// Create a new issue (with labels).
    ///
    /// # Errors
    ///
    /// Returns `IdCollision` if the id exists, `IssueNotFound` if the parent
    /// is missing, or a database error.
    pub fn create_issue(&mut self, issue: &Issue, session_id: &str) -> Result<()> {
        self.mutate("create_issue", session_id, |tx, ctx| {
            if issue_exists_tx(tx, &issue.id)? {
                return Err(TdError::IdCollision {
                    id: issue.id.clone(),
                });
            }
            if let Some(parent) = issue.parent_id.as_deref().filter(|p| !p.is_empty()) {
                if !issue_exists_tx(tx, parent)? {
                    return Err(TdError::IssueNotFound {
                        id: parent.to_string(),
                    });
                }
            }

            tx.execute(
                "INSERT INTO issues (
                    id, title, description, status, type, priority, parent_id,
                    created_at, updated_at, closed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    issue.id,
                    issue.title,
                    issue.description.as_deref().unwrap_or(""),
                    issue.status.as_str(),
                    issue.issue_type.as_str(),
                    issue.priority.as_str(),
                    issue.parent_id.as_deref().unwrap_or(""),
                    format_datetime(&issue.created_at),
                    format_datetime(&issue.updated_at),
                    issue.closed_at.map(|dt| format_datetime(&dt)),
                ],
            )?;

            for label in &issue.labels {
                tx.execute(
                    "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?, ?)",
                    rusqlite::params![issue.id, label],
                )?;
            }

            ctx.record_action(
                ActionType::Create,
                "issue",
                &issue.id,
                String::new(),
                serde_json::to_string(issue)?,
            );

            Ok(())
        })
    }

    /// Update an issue's fields, recording `action` in the action log.
    ///
    /// # Errors
    ///
    /// Returns an error if the issue doesn't exist, the new parent is invalid,
    /// or the update fails.
    pub fn update_issue(
        &mut self,
        id: &str,
        updates: &IssueUpdate,
        action: ActionType,
        session_id: &str,
    ) -> Result<Issue> {
        self.mutate("update_issue", session_id, |tx, ctx| {
            let before = get_issue_tx(tx, id)?.ok_or_else(|| TdError::IssueNotFound {
                id: id.to_string(),
            })?;
            let mut after = before.clone();

            if let Some(title) = &updates.title {
                after.title.clone_from(title);
            }
            if let Some(description) = &updates.description {
                after.description.clone_from(description);
            }
            if let Some(issue_type) = &updates.issue_type {
                after.issue_type = issue_type.clone();
            }
            if let Some(priority) = updates.priority {
                after.priority = priority;
            }
            if let Some(status) = &updates.status {
                if status.is_terminal() && !before.status.is_terminal() {
                    after.closed_at = Some(Utc::now());
                } else if !status.is_terminal() {
                    after.closed_at = None;
                }
                after.status = status.clone();
            }
            if let Some(parent) = &updates.parent_id {
                let parent = parent.clone().filter(|p| !p.is_empty());
                if let Some(parent_id) = parent.as_deref() {
                    validate_parent_tx(tx, id, parent_id)?;
                }
                after.parent_id = parent;
            }
            if let Some(labels) = &updates.labels {
                after.labels = normalize_labels(labels);
            }
            after.updated_at = Utc::now();

            tx.execute(
                "UPDATE issues SET title = ?, description = ?, status = ?, type = ?,
                        priority = ?, parent_id = ?, updated_at = ?, closed_at = ?
                 WHERE id = ?",
                rusqlite::params![
                    after.title,
                    after.description.as_deref().unwrap_or(""),
                    after.status.as_str(),
                    after.issue_type.as_str(),
                    after.priority.as_str(),
                    after.parent_id.as_deref().unwrap_or(""),
                    format_datetime(&after.updated_at),
                    after.closed_at.map(|dt| format_datetime(&dt)),
                    id,
                ],
            )?;

            if updates.labels.is_some() {
                tx.execute("DELETE FROM labels WHERE issue_id = ?", [id])?;
                for label in &after.labels {
                    tx.execute(
                        "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?, ?)",
                        rusqlite::params![id, label],
                    )?;
                }
            }

            ctx.record_action(
                action,
                "issue",
                id,
                serde_json::to_string(&before)?,
                serde_json::to_string(&after)?,
            );

            Ok(after)
        })
    }

    /// Get an issue by ID (labels populated).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_issue(&self, id: &str) -> Result<Option<Issue>> {
        get_issue_tx(&self.conn, id)
    }

    /// Check whether an issue exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn id_exists(&self, id: &str) -> Result<bool> {
        issue_exists_tx(&self.conn, id)
    }

    /// List issues in natural order (creation time, then insertion).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_issues(&self, filters: &ListFilters) -> Result<Vec<Issue>> {
        let mut sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref statuses) = filters.statuses {
            if !statuses.is_empty() {
                let placeholders: Vec<&str> = statuses.iter().map(|_| "?").collect();
                let _ = write!(sql, " AND status IN ({})", placeholders.join(","));
                for s in statuses {
                    params.push(Box::new(s.as_str().to_string()));
                }
            }
        }

        if let Some(ref types) = filters.types {
            if !types.is_empty() {
                let placeholders: Vec<&str> = types.iter().map(|_| "?").collect();
                let _ = write!(sql, " AND type IN ({})", placeholders.join(","));
                for t in types {
                    params.push(Box::new(t.as_str().to_string()));
                }
            }
        }

        if let Some(ref priorities) = filters.priorities {
            if !priorities.is_empty() {
                let placeholders: Vec<&str> = priorities.iter().map(|_| "?").collect();
                let _ = write!(sql, " AND priority IN ({})", placeholders.join(","));
                for p in priorities {
                    params.push(Box::new(p.as_str()));
                }
            }
        }

        if let Some(ref parent_id) = filters.parent_id {
            sql.push_str(" AND parent_id = ?");
            params.push(Box::new(parent_id.clone()));
        }

        if let Some(ref label) = filters.label {
            sql.push_str(" AND id IN (SELECT issue_id FROM labels WHERE label = ?)");
            params.push(Box::new(label.clone()));
        }

        if !filters.include_closed {
            sql.push_str(" AND status != 'closed'");
        }

        sql.push_str(" ORDER BY created_at ASC, rowid ASC");

        if let Some(limit) = filters.limit {
            if limit > 0 {
                sql.push_str(" LIMIT ?");
                params.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));
            }
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
        let mut issues = stmt
            .query_map(params_refs.as_slice(), issue_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let labels = self.get_all_labels()?;
        for issue in &mut issues {
            if let Some(found) = labels.get(&issue.id) {
                issue.labels.clone_from(found);
            }
        }

        Ok(issues)
    }

    /// Get all issue IDs in natural order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_all_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM issues ORDER BY created_at ASC, rowid ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Get labels for one issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label FROM labels WHERE issue_id = ? ORDER BY label")?;
        let labels = stmt
            .query_map([issue_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(labels)
    }

    /// Get every label grouped by issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_all_labels(&self) -> Result<HashMap<String, Vec<String>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT issue_id, label FROM labels ORDER BY issue_id, label")?;
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (issue_id, label) = row?;
            map.entry(issue_id).or_default().push(label);
        }
        Ok(map)
    }

    // ========================================================================
    // DEPENDENCIES
    // ========================================================================

    /// Insert a dependency edge. Returns false when the edge already exists.
    ///
    /// No cycle checking happens here; callers go through `deps::validate_and_add`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn add_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        kind: &str,
        session_id: &str,
    ) -> Result<bool> {
        self.mutate("add_dependency", session_id, |tx, ctx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO dependencies (issue_id, depends_on_id, kind, created_at)
                 VALUES (?, ?, ?, ?)",
                rusqlite::params![issue_id, depends_on_id, kind, format_datetime(&Utc::now())],
            )?;

            if inserted > 0 {
                ctx.record_action(
                    ActionType::AddDep,
                    "dependency",
                    issue_id,
                    String::new(),
                    depends_on_id.to_string(),
                );
            }

            Ok(inserted > 0)
        })
    }

    /// Remove a dependency link. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn remove_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        session_id: &str,
    ) -> Result<bool> {
        self.mutate("remove_dependency", session_id, |tx, ctx| {
            let rows = tx.execute(
                "DELETE FROM dependencies WHERE issue_id = ? AND depends_on_id = ?",
                rusqlite::params![issue_id, depends_on_id],
            )?;

            if rows > 0 {
                ctx.record_action(
                    ActionType::RemoveDep,
                    "dependency",
                    issue_id,
                    depends_on_id.to_string(),
                    String::new(),
                );
            }

            Ok(rows > 0)
        })
    }

    /// Get IDs of issues this one depends on (forward edges, insertion order).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_dependencies(&self, issue_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT depends_on_id FROM dependencies WHERE issue_id = ? AND kind = ? ORDER BY rowid",
        )?;
        let ids = stmt
            .query_map(rusqlite::params![issue_id, DEPENDS_ON], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Get IDs of issues that depend on this one (reverse edges, insertion order).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_dependents(&self, issue_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT issue_id FROM dependencies WHERE depends_on_id = ? AND kind = ? ORDER BY rowid",
        )?;
        let ids = stmt
            .query_map(rusqlite::params![issue_id, DEPENDS_ON], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Every `depends_on` edge in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_all_dependencies(&self) -> Result<Vec<Dependency>> {
        let mut stmt = self.conn.prepare(
            "SELECT issue_id, depends_on_id, kind, created_at FROM dependencies
             WHERE kind = ? ORDER BY rowid",
        )?;
        let deps = stmt
            .query_map([DEPENDS_ON], |row| {
                Ok(Dependency {
                    issue_id: row.get(0)?,
                    depends_on_id: row.get(1)?,
                    kind: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(deps)
    }

    /// Check whether a specific edge exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn dependency_exists_between(&self, issue_id: &str, depends_on_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM dependencies WHERE issue_id = ? AND depends_on_id = ? AND kind = ?",
            rusqlite::params![issue_id, depends_on_id, DEPENDS_ON],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ========================================================================
    // EVENT STREAMS
    // ========================================================================

    /// Append a progress log entry.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the issue is missing, or a database error.
    pub fn add_log(
        &mut self,
        issue_id: &str,
        session_id: &str,
        message: &str,
        log_type: &LogType,
    ) -> Result<Log> {
        self.mutate("add_log", session_id, |tx, ctx| {
            require_issue_tx(tx, issue_id)?;
            let timestamp = Utc::now();
            tx.execute(
                "INSERT INTO logs (issue_id, session_id, message, type, timestamp)
                 VALUES (?, ?, ?, ?, ?)",
                rusqlite::params![
                    issue_id,
                    session_id,
                    message,
                    log_type.as_str(),
                    format_datetime(&timestamp)
                ],
            )?;
            let id = tx.last_insert_rowid();
            ctx.record_action(
                ActionType::Log,
                "log",
                issue_id,
                String::new(),
                message.to_string(),
            );
            Ok(Log {
                id,
                issue_id: issue_id.to_string(),
                session_id: session_id.to_string(),
                message: message.to_string(),
                log_type: log_type.clone(),
                timestamp,
            })
        })
    }

    /// List logs, optionally for a single issue, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_logs(&self, issue_id: Option<&str>) -> Result<Vec<Log>> {
        let sql = "SELECT id, issue_id, session_id, message, type, timestamp FROM logs
                   WHERE (?1 IS NULL OR issue_id = ?1) ORDER BY id ASC";
        let mut stmt = self.conn.prepare(sql)?;
        let logs = stmt
            .query_map([issue_id], |row| {
                Ok(Log {
                    id: row.get(0)?,
                    issue_id: row.get(1)?,
                    session_id: row.get(2)?,
                    message: row.get(3)?,
                    log_type: row
                        .get::<_, String>(4)?
                        .parse()
                        .unwrap_or_default(),
                    timestamp: parse_datetime(&row.get::<_, String>(5)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// Add a comment to an issue.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the issue is missing, or a database error.
    pub fn add_comment(&mut self, issue_id: &str, session_id: &str, text: &str) -> Result<Comment> {
        self.mutate("add_comment", session_id, |tx, ctx| {
            require_issue_tx(tx, issue_id)?;
            let created_at = Utc::now();
            tx.execute(
                "INSERT INTO comments (issue_id, session_id, text, created_at) VALUES (?, ?, ?, ?)",
                rusqlite::params![issue_id, session_id, text, format_datetime(&created_at)],
            )?;
            let id = tx.last_insert_rowid();
            ctx.record_action(
                ActionType::Comment,
                "comment",
                issue_id,
                String::new(),
                text.to_string(),
            );
            Ok(Comment {
                id,
                issue_id: issue_id.to_string(),
                session_id: session_id.to_string(),
                text: text.to_string(),
                created_at,
            })
        })
    }

    /// List comments, optionally for a single issue, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_comments(&self, issue_id: Option<&str>) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, issue_id, session_id, text, created_at FROM comments
             WHERE (?1 IS NULL OR issue_id = ?1) ORDER BY id ASC",
        )?;
        let comments = stmt
            .query_map([issue_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    issue_id: row.get(1)?,
                    session_id: row.get(2)?,
                    text: row.get(3)?,
                    created_at: parse_datetime(&row.get::<_, String>(4)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    /// Record a handoff.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the issue is missing, or a database error.
    pub fn add_handoff(&mut self, handoff: &NewHandoff<'_>) -> Result<Handoff> {
        self.mutate("add_handoff", handoff.session_id, |tx, ctx| {
            require_issue_tx(tx, handoff.issue_id)?;
            let timestamp = Utc::now();
            tx.execute(
                "INSERT INTO handoffs (issue_id, session_id, done, remaining, decisions, uncertain, timestamp)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    handoff.issue_id,
                    handoff.session_id,
                    serde_json::to_string(handoff.done)?,
                    serde_json::to_string(handoff.remaining)?,
                    serde_json::to_string(handoff.decisions)?,
                    serde_json::to_string(handoff.uncertain)?,
                    format_datetime(&timestamp),
                ],
            )?;
            let record = Handoff {
                id: tx.last_insert_rowid(),
                issue_id: handoff.issue_id.to_string(),
                session_id: handoff.session_id.to_string(),
                done: handoff.done.to_vec(),
                remaining: handoff.remaining.to_vec(),
                decisions: handoff.decisions.to_vec(),
                uncertain: handoff.uncertain.to_vec(),
                timestamp,
            };
            ctx.record_action(
                ActionType::Handoff,
                "handoff",
                handoff.issue_id,
                String::new(),
                serde_json::to_string(&record)?,
            );
            Ok(record)
        })
    }

    /// List handoffs, optionally for a single issue, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_handoffs(&self, issue_id: Option<&str>) -> Result<Vec<Handoff>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, issue_id, session_id, done, remaining, decisions, uncertain, timestamp
             FROM handoffs WHERE (?1 IS NULL OR issue_id = ?1) ORDER BY id ASC",
        )?;
        let handoffs = stmt
            .query_map([issue_id], |row| {
                Ok(Handoff {
                    id: row.get(0)?,
                    issue_id: row.get(1)?,
                    session_id: row.get(2)?,
                    done: parse_string_list(&row.get::<_, String>(3)?),
                    remaining: parse_string_list(&row.get::<_, String>(4)?),
                    decisions: parse_string_list(&row.get::<_, String>(5)?),
                    uncertain: parse_string_list(&row.get::<_, String>(6)?),
                    timestamp: parse_datetime(&row.get::<_, String>(7)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(handoffs)
    }

    /// Link (or relink) a file to an issue.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the issue is missing, or a database error.
    pub fn link_file(
        &mut self,
        issue_id: &str,
        path: &str,
        role: &FileRole,
        content_hash: &str,
        session_id: &str,
    ) -> Result<IssueFile> {
        self.mutate("link_file", session_id, |tx, ctx| {
            require_issue_tx(tx, issue_id)?;
            let linked_at = Utc::now();
            tx.execute(
                "INSERT INTO issue_files (issue_id, path, role, content_hash, linked_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(issue_id, path) DO UPDATE SET
                    role = excluded.role,
                    content_hash = excluded.content_hash,
                    linked_at = excluded.linked_at",
                rusqlite::params![
                    issue_id,
                    path,
                    role.as_str(),
                    content_hash,
                    format_datetime(&linked_at)
                ],
            )?;
            ctx.record_action(
                ActionType::LinkFile,
                "file",
                issue_id,
                String::new(),
                path.to_string(),
            );
            Ok(IssueFile {
                issue_id: issue_id.to_string(),
                path: path.to_string(),
                role: role.clone(),
                content_hash: content_hash.to_string(),
                linked_at,
            })
        })
    }

    /// List linked files, optionally for a single issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_files(&self, issue_id: Option<&str>) -> Result<Vec<IssueFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT issue_id, path, role, content_hash, linked_at FROM issue_files
             WHERE (?1 IS NULL OR issue_id = ?1) ORDER BY rowid ASC",
        )?;
        let files = stmt
            .query_map([issue_id], |row| {
                Ok(IssueFile {
                    issue_id: row.get(0)?,
                    path: row.get(1)?,
                    role: row.get::<_, String>(2)?.parse().unwrap_or_default(),
                    content_hash: row.get(3)?,
                    linked_at: parse_datetime(&row.get::<_, String>(4)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    // ========================================================================
    // ACTION LOG
    // ========================================================================

    /// Append an action row outside of any other mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn log_action(&mut self, session_id: &str, action: &PendingAction) -> Result<i64> {
        insert_action_row(&self.conn, session_id, action)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// List action-log rows matching the filter, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_action_log(&self, filter: &ActionFilter) -> Result<Vec<ActionLog>> {
        let mut sql = String::from(
            "SELECT id, session_id, action_type, entity_type, entity_id,
                    previous_data, new_data, timestamp
             FROM action_log WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(after_id) = filter.after_id {
            sql.push_str(" AND id > ?");
            params.push(Box::new(after_id));
        }
        if let Some(ref session_id) = filter.session_id {
            sql.push_str(" AND session_id = ?");
            params.push(Box::new(session_id.clone()));
        }
        if let Some(ref entity_type) = filter.entity_type {
            sql.push_str(" AND entity_type = ?");
            params.push(Box::new(entity_type.clone()));
        }
        if let Some(ref entity_id) = filter.entity_id {
            sql.push_str(" AND entity_id = ?");
            params.push(Box::new(entity_id.clone()));
        }
        if !filter.action_types.is_empty() {
            let placeholders: Vec<&str> = filter.action_types.iter().map(|_| "?").collect();
            let _ = write!(sql, " AND action_type IN ({})", placeholders.join(","));
            for action in &filter.action_types {
                params.push(Box::new(action.as_str().to_string()));
            }
        }

        sql.push_str(" ORDER BY id ASC");

        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
        let rows = stmt
            .query_map(params_refs.as_slice(), |row| {
                Ok(ActionLog {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    action_type: row
                        .get::<_, String>(2)?
                        .parse()
                        .unwrap_or_else(|_| ActionType::Custom(String::new())),
                    entity_type: row.get(3)?,
                    entity_id: row.get(4)?,
                    previous_data: row.get(5)?,
                    new_data: row.get(6)?,
                    timestamp: parse_datetime(&row.get::<_, String>(7)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    /// Insert a session row.
    ///
    /// # Errors
    ///
    /// Returns an error if the id already exists or the insert fails.
    pub fn create_session(&mut self, session: &Session) -> Result<()> {
        insert_session_row(&self.conn, session, false)?;
        Ok(())
    }

    /// Insert a session row unless its id already exists.
    ///
    /// Returns whether a row was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_session_if_absent(&mut self, session: &Session) -> Result<bool> {
        Ok(insert_session_row(&self.conn, session, true)? > 0)
    }

    /// Get a session by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_session_by_id(&self, id: &str) -> Result<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?");
        let session = self
            .conn
            .query_row(&sql, [id], session_from_row)
            .optional()?;
        Ok(session)
    }

    /// Get the newest session bound to (branch, fingerprint).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_session_by_fingerprint(
        &self,
        branch: &str,
        fingerprint: &str,
    ) -> Result<Option<Session>> {
        find_session_tx(&self.conn, branch, fingerprint)
    }

    /// List every session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_all_sessions(&self) -> Result<Vec<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at ASC, rowid ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Atomically reuse the session bound to (branch, fingerprint) or insert `candidate`.
    ///
    /// Returns the bound session and whether it was newly created. Lookup and
    /// insert share one immediate transaction, so concurrent callers converge
    /// on a single row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query or insert fails.
    pub fn claim_session(&mut self, candidate: &Session) -> Result<(Session, bool)> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(mut existing) =
            find_session_tx(&tx, &candidate.branch, &candidate.fingerprint)?
        {
            let now = Utc::now();
            tx.execute(
                "UPDATE sessions SET last_activity = ? WHERE id = ?",
                rusqlite::params![format_datetime(&now), existing.id],
            )?;
            tx.commit()?;
            existing.last_activity = now;
            return Ok((existing, false));
        }

        insert_session_row(&tx, candidate, false)?;
        tx.commit()?;
        Ok((candidate.clone(), true))
    }

    /// Insert a session that supersedes whatever is bound to its (branch, fingerprint).
    ///
    /// The candidate's `previous_session_id` is overwritten with the currently
    /// bound id (or left empty).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query or insert fails.
    pub fn supersede_session(&mut self, candidate: &Session) -> Result<Session> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous = find_session_tx(&tx, &candidate.branch, &candidate.fingerprint)?;
        let mut session = candidate.clone();
        session.previous_session_id = previous.map(|s| s.id).unwrap_or_default();

        insert_session_row(&tx, &session, false)?;
        tx.commit()?;
        Ok(session)
    }

    // ========================================================================
    // METADATA
    // ========================================================================

    /// Get a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }
}

/// Filter options for listing issues.
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub statuses: Option<Vec<Status>>,
    pub types: Option<Vec<IssueType>>,
    pub priorities: Option<Vec<Priority>>,
    pub parent_id: Option<String>,
    pub label: Option<String>,
    pub include_closed: bool,
    pub limit: Option<usize>,
}

impl ListFilters {
    /// Every issue, closed ones included.
    #[must_use]
    pub fn all() -> Self {
        Self {
            include_closed: true,
            ..Self::default()
        }
    }
}

/// Fields to update on an issue.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub issue_type: Option<IssueType>,
    pub parent_id: Option<Option<String>>,
    pub labels: Option<Vec<String>>,
}

impl IssueUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.issue_type.is_none()
            && self.parent_id.is_none()
            && self.labels.is_none()
    }

    /// An update that only changes status.
    #[must_use]
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Borrowed handoff contents for insertion.
#[derive(Debug, Clone, Copy)]
pub struct NewHandoff<'a> {
    pub issue_id: &'a str,
    pub session_id: &'a str,
    pub done: &'a [String],
    pub remaining: &'a [String],
    pub decisions: &'a [String],
    pub uncertain: &'a [String],
}

/// Filter options for the action log.
#[derive(Debug, Clone, Default)]
pub struct ActionFilter {
    pub after_id: Option<i64>,
    pub session_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub action_types: Vec<ActionType>,
    pub limit: Option<usize>,
}

impl DependencyGraph for SqliteStorage {
    fn issue_exists(&self, id: &str) -> Result<bool> {
        self.id_exists(id)
    }

    fn load_issue(&self, id: &str) -> Result<Option<Issue>> {
        self.get_issue(id)
    }

    fn dependency_exists(&self, issue_id: &str, depends_on_id: &str) -> Result<bool> {
        self.dependency_exists_between(issue_id, depends_on_id)
    }

    fn forward_ids(&self, id: &str) -> Result<Vec<String>> {
        self.get_dependencies(id)
    }

    fn reverse_ids(&self, id: &str) -> Result<Vec<String>> {
        self.get_dependents(id)
    }
}

impl DependencyStore for SqliteStorage {
    fn insert_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        session_id: &str,
    ) -> Result<bool> {
        self.add_dependency(issue_id, depends_on_id, DEPENDS_ON, session_id)
    }

    fn delete_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        session_id: &str,
    ) -> Result<bool> {
        self.remove_dependency(issue_id, depends_on_id, session_id)
    }
}

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    let description: String = row.get(2)?;
    let parent_id: String = row.get(6)?;
    Ok(Issue {
        id: row.get(0)?,
        title: row.get(1)?,
        description: Some(description).filter(|d| !d.is_empty()),
        status: parse_status(&row.get::<_, String>(3)?),
        issue_type: row
            .get::<_, String>(4)?
            .parse()
            .unwrap_or_default(),
        priority: row.get::<_, String>(5)?.parse().unwrap_or_default(),
        parent_id: Some(parent_id).filter(|p| !p.is_empty()),
        labels: Vec::new(),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
        closed_at: row
            .get::<_, Option<String>>(9)?
            .map(|s| parse_datetime(&s)),
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    let name: String = row.get(1)?;
    Ok(Session {
        id: row.get(0)?,
        name: Some(name).filter(|n| !n.is_empty()),
        branch: row.get(2)?,
        fingerprint: row.get(3)?,
        agent_type: row.get(4)?,
        agent_pid: row.get(5)?,
        previous_session_id: row.get(6)?,
        started_at: parse_datetime(&row.get::<_, String>(7)?),
        last_activity: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn get_issue_tx(conn: &Connection, id: &str) -> Result<Option<Issue>> {
    let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?");
    let Some(mut issue) = conn.query_row(&sql, [id], issue_from_row).optional()? else {
        return Ok(None);
    };

    let mut stmt = conn.prepare("SELECT label FROM labels WHERE issue_id = ? ORDER BY label")?;
    issue.labels = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(issue))
}

fn issue_exists_tx(conn: &Connection, id: &str) -> Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM issues WHERE id = ?", [id], |row| {
        row.get(0)
    })?;
    Ok(count > 0)
}

fn require_issue_tx(conn: &Connection, id: &str) -> Result<()> {
    if issue_exists_tx(conn, id)? {
        Ok(())
    } else {
        Err(TdError::IssueNotFound { id: id.to_string() })
    }
}

/// A parent must exist and must not be the issue itself or one of its descendants.
fn validate_parent_tx(conn: &Connection, id: &str, parent_id: &str) -> Result<()> {
    if parent_id == id {
        return Err(TdError::validation("parent", "issue cannot be its own parent"));
    }
    require_issue_tx(conn, parent_id)?;

    let mut current = parent_id.to_string();
    let mut hops = 0;
    while hops < 1000 {
        let next: Option<String> = conn
            .query_row(
                "SELECT parent_id FROM issues WHERE id = ?",
                [&current],
                |row| row.get(0),
            )
            .optional()?;
        match next.filter(|p| !p.is_empty()) {
            Some(p) if p == id => {
                return Err(TdError::validation(
                    "parent",
                    format!("{parent_id} is a descendant of {id}"),
                ));
            }
            Some(p) => current = p,
            None => return Ok(()),
        }
        hops += 1;
    }
    Ok(())
}

fn find_session_tx(conn: &Connection, branch: &str, fingerprint: &str) -> Result<Option<Session>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE branch = ? AND fingerprint = ?
         ORDER BY started_at DESC, rowid DESC LIMIT 1"
    );
    let session = conn
        .query_row(&sql, rusqlite::params![branch, fingerprint], session_from_row)
        .optional()?;
    Ok(session)
}

fn insert_session_row(conn: &Connection, session: &Session, ignore_existing: bool) -> Result<usize> {
    let verb = if ignore_existing {
        "INSERT OR IGNORE"
    } else {
        "INSERT"
    };
    let sql = format!(
        "{verb} INTO sessions ({SESSION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );
    let rows = conn.execute(
        &sql,
        rusqlite::params![
            session.id,
            session.name.as_deref().unwrap_or(""),
            session.branch,
            session.fingerprint,
            session.agent_type,
            session.agent_pid,
            session.previous_session_id,
            format_datetime(&session.started_at),
            format_datetime(&session.last_activity),
        ],
    )?;
    Ok(rows)
}

fn insert_action_row(conn: &Connection, session_id: &str, action: &PendingAction) -> Result<()> {
    conn.execute(
        "INSERT INTO action_log (session_id, action_type, entity_type, entity_id,
                                 previous_data, new_data, timestamp)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            session_id,
            action.action_type.as_str(),
            action.entity_type,
            action.entity_id,
            action.previous_data,
            action.new_data,
            format_datetime(&Utc::now()),
        ],
    )?;
    Ok(())
}

fn normalize_labels(labels: &[String]) -> Vec<String> {
    let mut out: Vec<String> = labels
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn parse_status(s: &str) -> Status {
    s.parse().unwrap_or_else(|_| Status::Custom(s.to_string()))
}

fn parse_string_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Utc.from_utc_datetime(&naive);
    }

    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Issue, IssueType, Status};
    use tempfile::TempDir;

    fn issue(id: &str, title: &str) -> Issue {
        Issue::new(id, title)
    }

    #[test]
    fn test_open_memory() {
        assert!(SqliteStorage::open_memory().is_ok());
    }

    #[test]
    fn create_issue_records_action() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut i = issue("td-000001", "First");
        i.labels = vec!["backend".into()];
        storage.create_issue(&i, "ses_aaaaaa").unwrap();

        let fetched = storage.get_issue("td-000001").unwrap().expect("issue");
        assert_eq!(fetched.title, "First");
        assert_eq!(fetched.labels, vec!["backend".to_string()]);

        let actions = storage.list_action_log(&ActionFilter::default()).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Create);
        assert_eq!(actions[0].session_id, "ses_aaaaaa");
        assert_eq!(actions[0].entity_id, "td-000001");
    }

    #[test]
    fn create_issue_rejects_collision_and_missing_parent() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.create_issue(&issue("td-1", "a"), "").unwrap();
        let err = storage.create_issue(&issue("td-1", "b"), "").unwrap_err();
        assert!(matches!(err, TdError::IdCollision { .. }));

        let mut orphan = issue("td-2", "orphan");
        orphan.parent_id = Some("td-missing".into());
        let err = storage.create_issue(&orphan, "").unwrap_err();
        assert!(matches!(err, TdError::IssueNotFound { id } if id == "td-missing"));
    }

    #[test]
    fn transaction_rollback_drops_queued_actions() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let result: Result<()> = storage.mutate("test_fail", "ses_x", |tx, ctx| {
            tx.execute(
                "INSERT INTO issues (id, title, created_at, updated_at) VALUES (?, ?, ?, ?)",
                rusqlite::params!["td-rb", "Rollback", format_datetime(&Utc::now()), format_datetime(&Utc::now())],
            )?;
            ctx.record_action(ActionType::Create, "issue", "td-rb", String::new(), String::new());
            Err(TdError::IssueNotFound { id: "forced".into() })
        });
        assert!(result.is_err());
        assert!(storage.get_issue("td-rb").unwrap().is_none());
        assert!(storage.list_action_log(&ActionFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn update_status_sets_and_clears_closed_at() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.create_issue(&issue("td-1", "a"), "").unwrap();

        let closed = storage
            .update_issue("td-1", &IssueUpdate::status(Status::Closed), ActionType::Close, "")
            .unwrap();
        assert!(closed.closed_at.is_some());

        let reopened = storage
            .update_issue("td-1", &IssueUpdate::status(Status::Open), ActionType::Reopen, "")
            .unwrap();
        assert!(reopened.closed_at.is_none());

        let actions = storage
            .list_action_log(&ActionFilter {
                entity_id: Some("td-1".into()),
                ..ActionFilter::default()
            })
            .unwrap();
        let kinds: Vec<&str> = actions.iter().map(|a| a.action_type.as_str()).collect();
        assert_eq!(kinds, vec!["create", "close", "reopen"]);
    }

    #[test]
    fn update_parent_rejects_descendant() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.create_issue(&issue("td-a", "a"), "").unwrap();
        let mut b = issue("td-b", "b");
        b.parent_id = Some("td-a".into());
        storage.create_issue(&b, "").unwrap();

        let update = IssueUpdate {
            parent_id: Some(Some("td-b".into())),
            ..IssueUpdate::default()
        };
        let err = storage
            .update_issue("td-a", &update, ActionType::Update, "")
            .unwrap_err();
        assert!(matches!(err, TdError::Validation { .. }));
    }

    #[test]
    fn list_issues_filters_and_orders() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut epic = issue("td-e", "epic");
        epic.issue_type = IssueType::Epic;
        storage.create_issue(&epic, "").unwrap();
        let mut closed = issue("td-c", "closed one");
        closed.status = Status::Closed;
        storage.create_issue(&closed, "").unwrap();

        let open = storage.list_issues(&ListFilters::default()).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "td-e");

        let all = storage.list_issues(&ListFilters::all()).unwrap();
        assert_eq!(all.len(), 2);

        let epics = storage
            .list_issues(&ListFilters {
                types: Some(vec![IssueType::Epic]),
                ..ListFilters::all()
            })
            .unwrap();
        assert_eq!(epics.len(), 1);
    }

    #[test]
    fn dependency_insert_is_unique_and_ordered() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        for id in ["td-a", "td-b", "td-c"] {
            storage.create_issue(&issue(id, id), "").unwrap();
        }
        assert!(storage.add_dependency("td-a", "td-c", DEPENDS_ON, "").unwrap());
        assert!(storage.add_dependency("td-a", "td-b", DEPENDS_ON, "").unwrap());
        assert!(!storage.add_dependency("td-a", "td-b", DEPENDS_ON, "").unwrap());

        assert_eq!(storage.get_dependencies("td-a").unwrap(), vec!["td-c", "td-b"]);
        assert_eq!(storage.get_dependents("td-b").unwrap(), vec!["td-a"]);
        assert!(storage.remove_dependency("td-a", "td-b", "").unwrap());
        assert!(!storage.remove_dependency("td-a", "td-b", "").unwrap());
    }

    #[test]
    fn event_streams_require_existing_issue() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let err = storage
            .add_log("td-none", "ses_1", "hello", &LogType::Progress)
            .unwrap_err();
        assert!(matches!(err, TdError::IssueNotFound { .. }));

        storage.create_issue(&issue("td-1", "a"), "").unwrap();
        storage
            .add_log("td-1", "ses_1", "hello", &LogType::Decision)
            .unwrap();
        storage.add_comment("td-1", "ses_1", "looks good").unwrap();
        let done = vec!["wrote parser".to_string()];
        let remaining = vec!["tests".to_string()];
        storage
            .add_handoff(&NewHandoff {
                issue_id: "td-1",
                session_id: "ses_1",
                done: &done,
                remaining: &remaining,
                decisions: &[],
                uncertain: &[],
            })
            .unwrap();
        storage
            .link_file("td-1", "src/lib.rs", &FileRole::Implementation, "abc", "ses_1")
            .unwrap();
        storage
            .link_file("td-1", "src/lib.rs", &FileRole::Test, "def", "ses_1")
            .unwrap();

        assert_eq!(storage.list_logs(Some("td-1")).unwrap()[0].log_type, LogType::Decision);
        assert_eq!(storage.list_comments(None).unwrap().len(), 1);
        assert_eq!(storage.list_handoffs(Some("td-1")).unwrap()[0].done, done);
        let files = storage.list_files(Some("td-1")).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].role, FileRole::Test);
    }

    #[test]
    fn claim_session_reuses_binding() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let now = Utc::now();
        let candidate = Session {
            id: "ses_000001".into(),
            name: None,
            branch: "main".into(),
            fingerprint: "explicit_a".into(),
            agent_type: "explicit".into(),
            agent_pid: 0,
            previous_session_id: String::new(),
            started_at: now,
            last_activity: now,
        };
        let (first, created) = storage.claim_session(&candidate).unwrap();
        assert!(created);
        let mut other = candidate.clone();
        other.id = "ses_000002".into();
        let (second, created) = storage.claim_session(&other).unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        let superseding = storage.supersede_session(&other).unwrap();
        assert_eq!(superseding.previous_session_id, "ses_000001");
        let bound = storage
            .get_session_by_fingerprint("main", "explicit_a")
            .unwrap()
            .unwrap();
        assert_eq!(bound.id, "ses_000002");
    }

    #[test]
    fn insert_session_if_absent_ignores_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut storage = SqliteStorage::open(&dir.path().join("td.db")).unwrap();
        let now = Utc::now();
        let session = Session {
            id: "ses_abcdef".into(),
            name: Some("legacy".into()),
            branch: "main".into(),
            fingerprint: "legacy".into(),
            agent_type: "unknown".into(),
            agent_pid: 0,
            previous_session_id: String::new(),
            started_at: now,
            last_activity: now,
        };
        assert!(storage.insert_session_if_absent(&session).unwrap());
        assert!(!storage.insert_session_if_absent(&session).unwrap());
        assert!(storage.create_session(&session).is_err());
        assert_eq!(storage.list_all_sessions().unwrap().len(), 1);
    }
}
