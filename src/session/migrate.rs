//! One-shot import of on-disk session files into the store.
//!
//! Two layouts predate the `sessions` table:
//!
//! - `.todos/session`: a single file, either JSON or five lines
//!   (id, started_at, context_id, name, previous_session_id).
//! - `.todos/sessions/<branch...>/<fingerprint>.json`: one JSON file per
//!   branch and fingerprint. Branch names with slashes nest directories.
//!
//! Every parseable file is inserted under its original id (rows that already
//! exist are left alone). Only after the insert pass are both paths removed,
//! so an interrupted migration simply repeats on the next run.

use super::agent::{AgentFingerprint, sanitize};
use crate::error::Result;
use crate::model::Session;
use crate::storage::SqliteStorage;
use crate::storage::sqlite::parse_datetime;
use chrono::Utc;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const LEGACY_SESSION_FILE: &str = "session";
pub const LEGACY_SESSIONS_DIR: &str = "sessions";

/// Where the caller currently stands.
#[derive(Debug, Clone, Copy)]
pub struct MigrationContext<'a> {
    pub branch: &'a str,
    pub fingerprint: &'a AgentFingerprint,
    /// The caller's legacy context id; a single-file session carrying the
    /// same id is bound to the caller's current branch and fingerprint.
    pub legacy_context: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Any legacy path was present.
    pub found: bool,
    /// Rows newly written to the store.
    pub imported: usize,
    /// Files that could not be parsed.
    pub skipped: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyRecord {
    id: String,
    name: Option<String>,
    branch: Option<String>,
    fingerprint: Option<String>,
    agent_type: Option<String>,
    agent_pid: Option<u32>,
    context_id: Option<String>,
    previous_session_id: Option<String>,
    started_at: Option<String>,
    last_activity: Option<String>,
}

impl LegacyRecord {
    fn into_session(self, branch: String, fingerprint: String) -> Session {
        let started_at = self
            .started_at
            .as_deref()
            .map_or_else(Utc::now, parse_datetime);
        let last_activity = self
            .last_activity
            .as_deref()
            .map_or(started_at, parse_datetime);
        Session {
            id: self.id,
            name: self.name.filter(|n| !n.is_empty()),
            branch,
            fingerprint,
            agent_type: self.agent_type.unwrap_or_else(|| "unknown".to_string()),
            agent_pid: self.agent_pid.unwrap_or(0),
            previous_session_id: self.previous_session_id.unwrap_or_default(),
            started_at,
            last_activity,
        }
    }
}

/// Import legacy session files, then delete them.
///
/// Unparseable files are skipped. Removal failures are logged, not returned.
///
/// # Errors
///
/// Returns an error if the store rejects an insert; legacy files are left in
/// place in that case.
pub fn migrate_legacy(
    store: &mut SqliteStorage,
    todos_dir: &Path,
    ctx: &MigrationContext<'_>,
) -> Result<MigrationReport> {
    let single = todos_dir.join(LEGACY_SESSION_FILE);
    let nested = todos_dir.join(LEGACY_SESSIONS_DIR);
    let single_present = single.is_file();
    let nested_present = nested.is_dir();

    let mut report = MigrationReport {
        found: single_present || nested_present,
        ..MigrationReport::default()
    };
    if !report.found {
        return Ok(report);
    }

    let mut sessions = Vec::new();

    if single_present {
        match read_single_file(&single, ctx) {
            Some(session) => sessions.push(session),
            None => report.skipped += 1,
        }
    }

    if nested_present {
        for (path, branch) in branch_files(&nested) {
            match read_branch_file(&path, &branch) {
                Some(session) => sessions.push(session),
                None => report.skipped += 1,
            }
        }
    }

    for session in &sessions {
        if store.insert_session_if_absent(session)? {
            report.imported += 1;
        }
    }

    cleanup(&single, single_present, &nested, nested_present);

    info!(
        imported = report.imported,
        skipped = report.skipped,
        "migrated legacy sessions"
    );
    Ok(report)
}

fn read_single_file(path: &Path, ctx: &MigrationContext<'_>) -> Option<Session> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "unreadable legacy session file");
            return None;
        }
    };

    let record = parse_single(&contents).or_else(|| {
        warn!(path = %path.display(), "malformed legacy session file");
        None
    })?;

    let context = record.context_id.clone().unwrap_or_default();
    let (branch, fingerprint) = if !context.is_empty() && context == ctx.legacy_context {
        (ctx.branch.to_string(), ctx.fingerprint.to_string())
    } else {
        let branch = record
            .branch
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| ctx.branch.to_string());
        let fingerprint = if context.is_empty() {
            "legacy".to_string()
        } else {
            format!("legacy_{}", sanitize(&context))
        };
        (branch, fingerprint)
    };

    Some(record.into_session(branch, fingerprint))
}

/// JSON object, or the line format. `None` when no id can be recovered.
fn parse_single(contents: &str) -> Option<LegacyRecord> {
    let trimmed = contents.trim();
    if trimmed.starts_with('{') {
        let record: LegacyRecord = serde_json::from_str(trimmed).ok()?;
        return (!record.id.trim().is_empty()).then_some(record);
    }

    let mut lines = trimmed.lines().map(str::trim);
    let id = lines.next().filter(|l| !l.is_empty())?.to_string();
    let non_empty = |line: Option<&str>| line.filter(|l| !l.is_empty()).map(str::to_string);
    Some(LegacyRecord {
        id,
        started_at: non_empty(lines.next()),
        context_id: non_empty(lines.next()),
        name: non_empty(lines.next()),
        previous_session_id: non_empty(lines.next()),
        ..LegacyRecord::default()
    })
}

/// `<fingerprint>.json` files under `dir`, paired with the branch their
/// directory path spells.
fn branch_files(dir: &Path) -> Vec<(PathBuf, String)> {
    WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping unreadable legacy session entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
        .map(|entry| {
            let branch = entry
                .path()
                .parent()
                .and_then(|parent| parent.strip_prefix(dir).ok())
                .map(|rel| {
                    rel.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .unwrap_or_default();
            (entry.into_path(), branch)
        })
        .collect()
}

fn read_branch_file(path: &Path, branch: &str) -> Option<Session> {
    let contents = fs::read_to_string(path).ok()?;
    let record: LegacyRecord = match serde_json::from_str(&contents) {
        Ok(record) => record,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "malformed legacy session file");
            return None;
        }
    };
    if record.id.trim().is_empty() {
        warn!(path = %path.display(), "legacy session file has no id");
        return None;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let branch = record
        .branch
        .clone()
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| branch.to_string());
    let fingerprint = record
        .fingerprint
        .clone()
        .filter(|f| !f.is_empty())
        .unwrap_or(stem);

    debug!(id = %record.id, branch = %branch, fingerprint = %fingerprint, "parsed legacy session");
    Some(record.into_session(branch, fingerprint))
}

fn cleanup(single: &Path, single_present: bool, nested: &Path, nested_present: bool) {
    if single_present {
        if let Err(err) = fs::remove_file(single) {
            warn!(path = %single.display(), error = %err, "failed to remove legacy session file");
        }
    }
    if nested_present {
        if let Err(err) = fs::remove_dir_all(nested) {
            warn!(path = %nested.display(), error = %err, "failed to remove legacy sessions dir");
        }
    }
}
