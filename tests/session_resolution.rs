//! Session resolution, rotation and legacy migration on a file-backed store.

mod common;

use common::{test_db_with_dir, test_log};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use td_rust::session::{EnvSnapshot, SessionManager, agent};
use td_rust::storage::SqliteStorage;

fn explicit(id: &str) -> (EnvSnapshot, agent::AgentFingerprint) {
    let env = EnvSnapshot::from_pairs([("TD_SESSION_ID", id)]);
    let fp = agent::detect_with(&env, 1, || None);
    (env, fp)
}

fn manager<'a>(store: &'a mut SqliteStorage, todos: &Path, id: &str) -> SessionManager<'a> {
    let (env, fp) = explicit(id);
    SessionManager::with_fingerprint(store, todos, "main", env, fp).unwrap()
}

#[test]
fn explicit_ids_are_distinct_and_chain_on_rotation() {
    let _log = test_log("explicit_ids_are_distinct_and_chain_on_rotation");
    let (mut store, todos, _dir) = test_db_with_dir();

    let a = manager(&mut store, &todos, "a").get_or_create().unwrap();
    assert!(a.is_new);
    let again = manager(&mut store, &todos, "a").get_or_create().unwrap();
    assert!(!again.is_new);
    assert_eq!(again.session.id, a.session.id);

    let b = manager(&mut store, &todos, "b").get_or_create().unwrap();
    assert!(b.is_new);
    assert_ne!(b.session.id, a.session.id);

    let rotated = manager(&mut store, &todos, "a")
        .force_new_session(Some("second pass"))
        .unwrap();
    assert_eq!(rotated.previous_session_id, a.session.id);
    assert_eq!(rotated.name.as_deref(), Some("second pass"));

    assert_eq!(store.list_all_sessions().unwrap().len(), 3);
}

#[test]
fn branches_partition_sessions() {
    let _log = test_log("branches_partition_sessions");
    let (mut store, todos, _dir) = test_db_with_dir();
    let (env, fp) = explicit("a");
    let main = SessionManager::with_fingerprint(&mut store, &todos, "main", env.clone(), fp.clone())
        .unwrap()
        .get_or_create()
        .unwrap();
    let feature = SessionManager::with_fingerprint(&mut store, &todos, "feature/x", env, fp)
        .unwrap()
        .get_or_create()
        .unwrap();
    assert!(feature.is_new);
    assert_ne!(main.session.id, feature.session.id);
    assert_eq!(feature.session.branch, "feature/x");
}

#[test]
fn concurrent_callers_share_one_session() {
    let _log = test_log("concurrent_callers_share_one_session");
    let (_store, todos, _dir) = test_db_with_dir();
    let db_path = todos.join("issues.db");
    let workers = 4;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let todos = todos.clone();
            let db_path = db_path.clone();
            thread::spawn(move || {
                let mut store = SqliteStorage::open_with_timeout(&db_path, Some(10_000)).unwrap();
                let (env, fp) = explicit("shared");
                let mut mgr =
                    SessionManager::with_fingerprint(&mut store, &todos, "main", env, fp).unwrap();
                barrier.wait();
                let outcome = mgr.get_or_create().unwrap();
                (outcome.session.id, outcome.is_new)
            })
        })
        .collect();

    let results: Vec<(String, bool)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let first = &results[0].0;
    assert!(results.iter().all(|(id, _)| id == first), "{results:?}");
    assert_eq!(results.iter().filter(|(_, is_new)| *is_new).count(), 1);
}

#[test]
fn legacy_tree_is_imported_then_removed() {
    let _log = test_log("legacy_tree_is_imported_then_removed");
    let (mut store, todos, _dir) = test_db_with_dir();
    let branch_dir = todos.join("sessions").join("feature").join("login");
    fs::create_dir_all(&branch_dir).unwrap();
    fs::write(
        branch_dir.join("explicit_old.json"),
        r#"{"id":"ses_0f0f0f","name":"old","branch":"feature/login","agent_type":"explicit","started_at":"2025-01-02T03:04:05Z"}"#,
    )
    .unwrap();
    fs::write(branch_dir.join("broken.json"), "{ not json").unwrap();

    let outcome = manager(&mut store, &todos, "fresh").get_or_create().unwrap();
    assert!(outcome.is_new);

    let imported = store.get_session_by_id("ses_0f0f0f").unwrap().expect("imported");
    assert_eq!(imported.branch, "feature/login");
    assert_eq!(imported.name.as_deref(), Some("old"));
    assert!(!todos.join("sessions").exists());
}
