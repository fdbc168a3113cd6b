#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;
use std::time::Instant;
use td_rust::storage::SqliteStorage;
use tempfile::TempDir;
use tracing::info;

pub mod cli;
pub mod fixtures;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        td_rust::logging::init_test_logging();
    });
}

pub struct TestLogGuard {
    name: String,
    start: Instant,
}

impl TestLogGuard {
    fn new(name: &str) -> Self {
        init_test_logging();
        info!("{name}: starting");
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for TestLogGuard {
    fn drop(&mut self) {
        info!(
            "{}: assertions passed (elapsed {:?})",
            self.name,
            self.start.elapsed()
        );
    }
}

pub fn test_log(name: &str) -> TestLogGuard {
    TestLogGuard::new(name)
}

pub fn test_db() -> SqliteStorage {
    init_test_logging();
    SqliteStorage::open_memory().expect("Failed to create test database")
}

/// A workspace with `.todos/issues.db`. Returns the storage, the `.todos`
/// path, and the guard keeping the directory alive.
pub fn test_db_with_dir() -> (SqliteStorage, PathBuf, TempDir) {
    init_test_logging();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let todos = dir.path().join(".todos");
    std::fs::create_dir_all(&todos).expect("create .todos");
    let storage = SqliteStorage::open(&todos.join("issues.db")).expect("open test database");
    (storage, todos, dir)
}
