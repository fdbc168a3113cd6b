//! Per-agent work sessions.
//!
//! A session is keyed by (branch, fingerprint). The first call from a new
//! agent creates one; later calls reuse it until `force_new_session`
//! supersedes it, chaining the ids through `previous_session_id`.

pub mod agent;
pub mod migrate;

pub use agent::{AgentFingerprint, EnvSnapshot, detect, legacy_context_id, sanitize};
pub use migrate::{MigrationContext, MigrationReport, migrate_legacy};

use crate::error::{Result, TdError};
use crate::model::Session;
use crate::storage::SqliteStorage;
use crate::util::generate_session_id;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MAX_ID_ATTEMPTS: usize = 16;

/// Result of [`SessionManager::get_or_create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub session: Session,
    pub is_new: bool,
}

/// Resolves the current session for one invocation.
pub struct SessionManager<'a> {
    store: &'a mut SqliteStorage,
    todos_dir: PathBuf,
    branch: String,
    env: EnvSnapshot,
    fingerprint: AgentFingerprint,
    parent_pid: u32,
}

impl<'a> SessionManager<'a> {
    /// Build a manager for the process's own environment and ancestry.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if `todos_dir` does not exist.
    pub fn new(store: &'a mut SqliteStorage, todos_dir: &Path, branch: &str) -> Result<Self> {
        let env = EnvSnapshot::from_process();
        let fingerprint = detect(&env);
        Self::with_fingerprint(store, todos_dir, branch, env, fingerprint)
    }

    /// Build a manager with an explicit environment and fingerprint.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if `todos_dir` does not exist.
    pub fn with_fingerprint(
        store: &'a mut SqliteStorage,
        todos_dir: &Path,
        branch: &str,
        env: EnvSnapshot,
        fingerprint: AgentFingerprint,
    ) -> Result<Self> {
        if !todos_dir.is_dir() {
            return Err(TdError::NotInitialized);
        }
        Ok(Self {
            store,
            todos_dir: todos_dir.to_path_buf(),
            branch: branch.to_string(),
            env,
            fingerprint,
            parent_pid: agent::parent_pid(),
        })
    }

    #[must_use]
    pub const fn fingerprint(&self) -> &AgentFingerprint {
        &self.fingerprint
    }

    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Reuse the session bound to this branch and fingerprint, or create one.
    ///
    /// # Errors
    ///
    /// Returns an error if migration or the store fails.
    pub fn get_or_create(&mut self) -> Result<SessionOutcome> {
        self.migrate()?;
        let candidate = self.candidate(None)?;
        let (session, is_new) = self.store.claim_session(&candidate)?;
        if is_new {
            info!(id = %session.id, fingerprint = %session.fingerprint, "started session");
        } else {
            debug!(id = %session.id, "reusing session");
        }
        Ok(SessionOutcome { session, is_new })
    }

    /// Always start a fresh session, linking it to the one it replaces.
    ///
    /// # Errors
    ///
    /// Returns an error if migration or the store fails.
    pub fn force_new_session(&mut self, name: Option<&str>) -> Result<Session> {
        self.migrate()?;
        let candidate = self.candidate(name)?;
        let session = self.store.supersede_session(&candidate)?;
        info!(
            id = %session.id,
            previous = %session.previous_session_id,
            "forced new session"
        );
        Ok(session)
    }

    /// The session currently bound, without creating one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn current(&self) -> Result<Option<Session>> {
        self.store
            .get_session_by_fingerprint(&self.branch, &self.fingerprint.to_string())
    }

    fn migrate(&mut self) -> Result<MigrationReport> {
        let legacy = legacy_context_id(&self.env, self.parent_pid);
        let fingerprint = self.fingerprint.clone();
        let ctx = MigrationContext {
            branch: &self.branch,
            fingerprint: &fingerprint,
            legacy_context: &legacy,
        };
        migrate_legacy(self.store, &self.todos_dir, &ctx)
    }

    fn candidate(&self, name: Option<&str>) -> Result<Session> {
        let mut id = generate_session_id();
        for _ in 0..MAX_ID_ATTEMPTS {
            if self.store.get_session_by_id(&id)?.is_none() {
                break;
            }
            id = generate_session_id();
        }

        let now = Utc::now();
        Ok(Session {
            id,
            name: name.map(str::to_string).filter(|n| !n.is_empty()),
            branch: self.branch.clone(),
            fingerprint: self.fingerprint.to_string(),
            agent_type: self.fingerprint.agent_type.clone(),
            agent_pid: self.fingerprint.pid,
            previous_session_id: String::new(),
            started_at: now,
            last_activity: now,
        })
    }
}
