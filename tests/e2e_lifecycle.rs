//! The `td` binary driven end to end in a scratch workspace.

mod common;

use assert_cmd::Command;
use common::cli::{TdWorkspace, run_td, run_td_with_env};
use predicates::prelude::*;

fn create(workspace: &TdWorkspace, args: &[&str], label: &str) -> String {
    let mut argv = vec!["create", "--json"];
    argv.extend_from_slice(args);
    let run = run_td(workspace, argv, label);
    assert!(run.status.success(), "create failed: {}", run.stderr);
    run.json()["id"].as_str().expect("id").to_string()
}

#[test]
fn commands_outside_workspace_report_not_initialized() {
    let workspace = TdWorkspace::new();
    let run = run_td(&workspace, ["list", "--json"], "list_uninit");
    assert_eq!(run.status.code(), Some(2));
    assert!(run.stderr.contains("NOT_INITIALIZED"), "{}", run.stderr);
}

#[test]
fn init_twice_fails() {
    let workspace = TdWorkspace::initialized();
    assert!(workspace.root.join(".todos").join("issues.db").is_file());
    assert!(workspace.root.join(".todos").join("config.yaml").is_file());

    let run = run_td(&workspace, ["init"], "init_again");
    assert_eq!(run.status.code(), Some(2));
}

#[test]
fn create_show_and_list() {
    let workspace = TdWorkspace::initialized();
    let id = create(
        &workspace,
        &["Fix login redirect", "-p", "P1", "-t", "bug", "-l", "auth,web"],
        "create",
    );
    assert!(id.starts_with("td-"), "{id}");

    let shown = run_td(&workspace, ["show", &id, "--json"], "show").json();
    assert_eq!(shown["title"], "Fix login redirect");
    assert_eq!(shown["priority"], "P1");
    assert_eq!(shown["type"], "bug");
    assert_eq!(shown["status"], "open");
    assert_eq!(shown["labels"], serde_json::json!(["auth", "web"]));

    let listed = run_td(&workspace, ["list", "--json"], "list").json();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let missing = run_td(&workspace, ["show", "td-000000", "--json"], "show_missing");
    assert_eq!(missing.status.code(), Some(3));
}

#[test]
fn empty_title_is_rejected() {
    let workspace = TdWorkspace::initialized();
    let run = run_td(&workspace, ["create", "   "], "create_blank");
    assert_eq!(run.status.code(), Some(4));
    assert!(run.stderr.contains("title"), "{}", run.stderr);
}

#[test]
fn dependency_cycle_exits_with_dependency_code() {
    let workspace = TdWorkspace::initialized();
    let a = create(&workspace, &["Schema"], "create_a");
    let b = create(&workspace, &["Migration", "--depends-on", &a], "create_b");

    let cycle = run_td(&workspace, ["dep", "add", &a, &b, "--json"], "dep_cycle");
    assert_eq!(cycle.status.code(), Some(5));
    assert!(cycle.stderr.contains("CYCLE_DETECTED"), "{}", cycle.stderr);

    let ready = run_td(&workspace, ["dep", "ready", "--json"], "dep_ready").json();
    let ready_ids: Vec<_> = ready
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ready_ids, vec![a.clone()]);

    let blocked = run_td(&workspace, ["dep", "blocked", &a, "--json"], "dep_blocked").json();
    assert_eq!(blocked[0]["id"], b.as_str());
}

#[test]
fn workflow_transitions_and_query() {
    let workspace = TdWorkspace::initialized();
    let id = create(&workspace, &["Write docs", "-p", "P1"], "create");

    for (verb, label) in [("start", "start"), ("review", "review")] {
        let run = run_td(&workspace, [verb, id.as_str()], label);
        assert!(run.status.success(), "{verb}: {}", run.stderr);
    }
    let reject = run_td(&workspace, ["reject", &id, "-r", "missing examples"], "reject");
    assert!(reject.status.success(), "{}", reject.stderr);

    let rework = run_td(&workspace, ["query", "rework()", "--json"], "query_rework").json();
    assert_eq!(rework[0]["id"], id.as_str());

    let by_priority = run_td(
        &workspace,
        ["query", "status = in_progress AND priority = P1", "--json"],
        "query_priority",
    )
    .json();
    assert_eq!(by_priority.as_array().unwrap().len(), 1);

    let reopen = run_td(&workspace, ["reopen", &id], "reopen_not_closed");
    assert!(!reopen.status.success());

    let bad = run_td(&workspace, ["query", "status = open AND", "--json"], "query_bad");
    assert_eq!(bad.status.code(), Some(4));
    assert!(bad.stderr.contains("QUERY_PARSE_ERROR"), "{}", bad.stderr);
}

#[test]
fn session_identity_follows_explicit_id() {
    let workspace = TdWorkspace::initialized();
    let first = run_td(&workspace, ["session", "whoami", "--json"], "whoami_1").json();
    assert_eq!(first["is_new"], true);
    let again = run_td(&workspace, ["session", "whoami", "--json"], "whoami_2").json();
    assert_eq!(again["is_new"], false);
    assert_eq!(again["id"], first["id"]);

    let other = run_td_with_env(
        &workspace,
        ["session", "whoami", "--json"],
        [("TD_SESSION_ID", "someone-else")],
        "whoami_other",
    )
    .json();
    assert_ne!(other["id"], first["id"]);

    let rotated = run_td(&workspace, ["session", "new", "--json"], "session_new").json();
    assert_eq!(rotated["previous_session_id"], first["id"]);
}

#[test]
fn help_lists_core_commands() {
    Command::new(assert_cmd::cargo::cargo_bin!("td"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("query").and(predicate::str::contains("handoff")));
}
