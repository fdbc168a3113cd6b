#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use td_rust::model::{ActionType, Issue, IssueType, Status};
use td_rust::storage::{IssueUpdate, SqliteStorage};

pub const SESSION: &str = "ses_000001";

/// Fixed creation time so natural order falls back to insertion order.
pub fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_735_689_600, 0).unwrap() // 2025-01-01 00:00:00 UTC
}

pub fn issue(id: &str, title: &str) -> Issue {
    let mut issue = Issue::new(id, title);
    issue.created_at = base_time();
    issue.updated_at = base_time();
    issue
}

pub fn epic(id: &str, title: &str) -> Issue {
    let mut issue = issue(id, title);
    issue.issue_type = IssueType::Epic;
    issue
}

pub fn child(id: &str, title: &str, parent: &str) -> Issue {
    let mut issue = issue(id, title);
    issue.parent_id = Some(parent.to_string());
    issue
}

/// Insert plain issues with the given ids (title = id).
pub fn seed(storage: &mut SqliteStorage, ids: &[&str]) {
    for id in ids {
        storage
            .create_issue(&issue(id, id), SESSION)
            .expect("seed issue");
    }
}

pub fn set_status(storage: &mut SqliteStorage, id: &str, status: Status, action: ActionType) {
    storage
        .update_issue(id, &IssueUpdate::status(status), action, SESSION)
        .expect("set status");
}
