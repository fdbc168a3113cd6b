//! Database schema definitions and migration logic.

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the td database.
pub const SCHEMA_SQL: &str = r"
    -- Issues table
    CREATE TABLE IF NOT EXISTS issues (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'open',
        type TEXT NOT NULL DEFAULT 'task',
        priority TEXT NOT NULL DEFAULT 'P2',
        parent_id TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        closed_at TEXT,
        CHECK (length(title) >= 1 AND length(title) <= 500)
    );

    CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
    CREATE INDEX IF NOT EXISTS idx_issues_parent_id ON issues(parent_id);
    CREATE INDEX IF NOT EXISTS idx_issues_created_at ON issues(created_at);

    -- Labels
    CREATE TABLE IF NOT EXISTS labels (
        issue_id TEXT NOT NULL,
        label TEXT NOT NULL,
        PRIMARY KEY (issue_id, label),
        FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_labels_label ON labels(label);

    -- Dependencies
    CREATE TABLE IF NOT EXISTS dependencies (
        issue_id TEXT NOT NULL,
        depends_on_id TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'depends_on',
        created_at TEXT NOT NULL,
        PRIMARY KEY (issue_id, depends_on_id, kind)
    );
    CREATE INDEX IF NOT EXISTS idx_dependencies_depends_on_id ON dependencies(depends_on_id);

    -- Progress logs
    CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id TEXT NOT NULL,
        session_id TEXT NOT NULL DEFAULT '',
        message TEXT NOT NULL,
        type TEXT NOT NULL DEFAULT 'progress',
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_logs_issue_id ON logs(issue_id);

    -- Comments
    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id TEXT NOT NULL,
        session_id TEXT NOT NULL DEFAULT '',
        text TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_comments_issue_id ON comments(issue_id);

    -- Handoffs (list columns hold JSON arrays)
    CREATE TABLE IF NOT EXISTS handoffs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id TEXT NOT NULL,
        session_id TEXT NOT NULL DEFAULT '',
        done TEXT NOT NULL DEFAULT '[]',
        remaining TEXT NOT NULL DEFAULT '[]',
        decisions TEXT NOT NULL DEFAULT '[]',
        uncertain TEXT NOT NULL DEFAULT '[]',
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_handoffs_issue_id ON handoffs(issue_id);

    -- Linked files
    CREATE TABLE IF NOT EXISTS issue_files (
        issue_id TEXT NOT NULL,
        path TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'implementation',
        content_hash TEXT NOT NULL DEFAULT '',
        linked_at TEXT NOT NULL,
        PRIMARY KEY (issue_id, path)
    );

    -- Action log (append-only)
    CREATE TABLE IF NOT EXISTS action_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL DEFAULT '',
        action_type TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        previous_data TEXT NOT NULL DEFAULT '',
        new_data TEXT NOT NULL DEFAULT '',
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_action_log_entity ON action_log(entity_type, entity_id);

    -- Sessions
    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL DEFAULT '',
        branch TEXT NOT NULL DEFAULT '',
        fingerprint TEXT NOT NULL DEFAULT '',
        agent_type TEXT NOT NULL DEFAULT '',
        agent_pid INTEGER NOT NULL DEFAULT 0,
        previous_session_id TEXT NOT NULL DEFAULT '',
        started_at TEXT NOT NULL,
        last_activity TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_branch_fingerprint ON sessions(branch, fingerprint);

    -- Metadata
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Apply the schema to the database.
///
/// Idempotent: every statement uses `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', ?)",
        [CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}
