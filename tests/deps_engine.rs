//! Dependency engine against a real `SQLite` store.

mod common;

use common::fixtures::{SESSION, seed, set_status};
use common::{test_db, test_log};
use std::collections::HashSet;
use td_rust::TdError;
use td_rust::deps;
use td_rust::model::{ActionType, Status};
use td_rust::storage::ActionFilter;

fn set(ids: Vec<String>) -> HashSet<String> {
    ids.into_iter().collect()
}

fn ids(list: &[&str]) -> HashSet<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn cycle_detection_on_chain() {
    let _log = test_log("cycle_detection_on_chain");
    let mut storage = test_db();
    seed(&mut storage, &["A", "B", "C"]);
    deps::validate_and_add(&mut storage, "A", "B", SESSION).unwrap();
    deps::validate_and_add(&mut storage, "B", "C", SESSION).unwrap();

    assert!(deps::would_create_cycle(&storage, "C", "A").unwrap());
    assert!(deps::would_create_cycle(&storage, "C", "B").unwrap());
    assert!(!deps::would_create_cycle(&storage, "A", "C").unwrap());

    let err = deps::validate_and_add(&mut storage, "C", "A", SESSION).unwrap_err();
    assert!(matches!(err, TdError::DependencyCycle { .. }));
    assert!(storage.get_dependencies("C").unwrap().is_empty());
}

#[test]
fn diamond_reports_each_node_once() {
    let _log = test_log("diamond_reports_each_node_once");
    let mut storage = test_db();
    seed(&mut storage, &["A", "B", "C", "D"]);
    // B and C depend on A; D depends on both.
    deps::validate_and_add(&mut storage, "B", "A", SESSION).unwrap();
    deps::validate_and_add(&mut storage, "C", "A", SESSION).unwrap();
    deps::validate_and_add(&mut storage, "D", "B", SESSION).unwrap();
    deps::validate_and_add(&mut storage, "D", "C", SESSION).unwrap();

    let blocked = deps::transitive_blocked(&storage, "A", &mut HashSet::new()).unwrap();
    assert_eq!(blocked.len(), 3);
    assert_eq!(set(blocked), ids(&["B", "C", "D"]));

    let upstream = deps::transitive_dependencies(&storage, "D", &mut HashSet::new()).unwrap();
    assert_eq!(set(upstream), ids(&["A", "B", "C"]));
}

#[test]
fn closed_issue_cuts_open_walk() {
    let _log = test_log("closed_issue_cuts_open_walk");
    let mut storage = test_db();
    seed(&mut storage, &["A", "B", "C"]);
    deps::validate_and_add(&mut storage, "B", "A", SESSION).unwrap();
    deps::validate_and_add(&mut storage, "C", "B", SESSION).unwrap();
    set_status(&mut storage, "B", Status::Closed, ActionType::Close);

    let all = deps::transitive_blocked(&storage, "A", &mut HashSet::new()).unwrap();
    assert_eq!(set(all), ids(&["B", "C"]));
    let open = deps::transitive_blocked_open(&storage, "A", &mut HashSet::new()).unwrap();
    assert!(open.is_empty());
}

#[test]
fn closed_branch_of_diamond_keeps_open_path() {
    let _log = test_log("closed_branch_of_diamond_keeps_open_path");
    let mut storage = test_db();
    seed(&mut storage, &["A", "B", "C", "D"]);
    deps::validate_and_add(&mut storage, "B", "A", SESSION).unwrap();
    deps::validate_and_add(&mut storage, "C", "A", SESSION).unwrap();
    deps::validate_and_add(&mut storage, "D", "B", SESSION).unwrap();
    deps::validate_and_add(&mut storage, "D", "C", SESSION).unwrap();
    set_status(&mut storage, "B", Status::Closed, ActionType::Close);

    let all = set(deps::transitive_blocked(&storage, "A", &mut HashSet::new()).unwrap());
    let open = set(deps::transitive_blocked_open(&storage, "A", &mut HashSet::new()).unwrap());
    assert_eq!(all, ids(&["B", "C", "D"]));
    // D stays reachable through open C even though B is closed.
    assert_eq!(open, ids(&["C", "D"]));
    assert!(open.is_subset(&all));
}

#[test]
fn closed_cut_without_alternate_path_drops_subtree() {
    let _log = test_log("closed_cut_without_alternate_path_drops_subtree");
    let mut storage = test_db();
    seed(&mut storage, &["A", "B", "C", "D"]);
    deps::validate_and_add(&mut storage, "B", "A", SESSION).unwrap();
    deps::validate_and_add(&mut storage, "C", "A", SESSION).unwrap();
    deps::validate_and_add(&mut storage, "D", "B", SESSION).unwrap();
    set_status(&mut storage, "B", Status::Closed, ActionType::Close);

    let all = set(deps::transitive_blocked(&storage, "A", &mut HashSet::new()).unwrap());
    let open = set(deps::transitive_blocked_open(&storage, "A", &mut HashSet::new()).unwrap());
    assert_eq!(all, ids(&["B", "C", "D"]));
    assert_eq!(open, ids(&["C"]));
    assert!(open.is_subset(&all));
}

#[test]
fn validation_order_and_duplicates() {
    let _log = test_log("validation_order_and_duplicates");
    let mut storage = test_db();
    seed(&mut storage, &["A", "B"]);

    let err = deps::validate_and_add(&mut storage, "A", "missing", SESSION).unwrap_err();
    assert!(matches!(err, TdError::IssueNotFound { ref id } if id == "missing"));

    let err = deps::validate_and_add(&mut storage, "A", "A", SESSION).unwrap_err();
    assert!(matches!(err, TdError::DependencyCycle { .. }));

    deps::validate_and_add(&mut storage, "A", "B", SESSION).unwrap();
    let err = deps::validate_and_add(&mut storage, "A", "B", SESSION).unwrap_err();
    assert!(matches!(err, TdError::DuplicateDependency { .. }));
}

#[test]
fn readiness_tracks_dependency_status() {
    let _log = test_log("readiness_tracks_dependency_status");
    let mut storage = test_db();
    seed(&mut storage, &["A", "B"]);
    deps::validate_and_add(&mut storage, "B", "A", SESSION).unwrap();

    assert!(deps::is_ready(&storage, "A").unwrap());
    assert!(!deps::is_ready(&storage, "B").unwrap());
    assert!(deps::has_open_deps(&storage, "B").unwrap());

    set_status(&mut storage, "A", Status::Closed, ActionType::Close);
    assert!(deps::is_ready(&storage, "B").unwrap());
    assert!(!deps::has_open_deps(&storage, "B").unwrap());
}

#[test]
fn add_and_remove_are_audited() {
    let _log = test_log("add_and_remove_are_audited");
    let mut storage = test_db();
    seed(&mut storage, &["A", "B"]);
    deps::validate_and_add(&mut storage, "A", "B", "ses_aaaaaa").unwrap();
    assert!(deps::remove(&mut storage, "A", "B", "ses_aaaaaa").unwrap());
    assert!(!deps::remove(&mut storage, "A", "B", "ses_aaaaaa").unwrap());

    let actions = storage
        .list_action_log(&ActionFilter {
            session_id: Some("ses_aaaaaa".into()),
            ..ActionFilter::default()
        })
        .unwrap();
    let kinds: Vec<_> = actions.iter().map(|a| a.action_type.clone()).collect();
    assert_eq!(kinds, vec![ActionType::AddDep, ActionType::RemoveDep]);
    assert_eq!(actions[0].entity_id, "A");
}

#[test]
fn dependency_listings_resolve_issues() {
    let _log = test_log("dependency_listings_resolve_issues");
    let mut storage = test_db();
    seed(&mut storage, &["A", "B", "C"]);
    deps::validate_and_add(&mut storage, "A", "B", SESSION).unwrap();
    deps::validate_and_add(&mut storage, "A", "C", SESSION).unwrap();

    let forward: Vec<_> = deps::get_dependencies(&storage, "A")
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(forward, vec!["B", "C"]);
    let reverse: Vec<_> = deps::get_dependents(&storage, "C")
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(reverse, vec!["A"]);
}
