//! Property-based tests for issue ids, session ids and fingerprint sanitizing.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;
use tracing::info;

use td_rust::session::sanitize;
use td_rust::util::id::{generate_issue_id, generate_session_id, is_valid_issue_id, is_valid_session_id};

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        ..Default::default()
    })]

    /// Sanitized output only uses the safe alphabet and is capped at 32 chars.
    #[test]
    fn sanitize_alphabet_and_length(raw in "\\PC{0,80}") {
        init_test_logging();
        let clean = sanitize(&raw);
        info!("proptest_sanitize: in={} out={clean}", raw.chars().count());

        prop_assert!(clean.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        prop_assert_eq!(clean.chars().count(), raw.chars().count().min(32));
    }

    #[test]
    fn sanitize_is_idempotent(raw in "\\PC{0,80}") {
        let once = sanitize(&raw);
        prop_assert_eq!(sanitize(&once), once.clone());
    }

    /// Same title and timestamp always yield the same valid id.
    #[test]
    fn issue_id_is_deterministic(title in "\\PC{1,120}", secs in 0i64..4_000_000_000) {
        let at = Utc.timestamp_opt(secs, 0).unwrap();
        let a = generate_issue_id(&title, at, |_| Ok(false)).unwrap();
        let b = generate_issue_id(&title, at, |_| Ok(false)).unwrap();
        prop_assert!(is_valid_issue_id(&a), "{a}");
        prop_assert_eq!(a, b);
    }

    /// Taken ids are skipped; the result is never one of them.
    #[test]
    fn issue_id_avoids_taken(title in "[a-zA-Z ]{1,40}", taken_count in 1usize..8) {
        let at = Utc.timestamp_opt(1_735_689_600, 0).unwrap();
        let mut taken = HashSet::new();
        for _ in 0..taken_count {
            let id = generate_issue_id(&title, at, |c| Ok(taken.contains(c))).unwrap();
            prop_assert!(!taken.contains(&id));
            taken.insert(id);
        }
        prop_assert_eq!(taken.len(), taken_count);
    }
}

#[test]
fn session_ids_are_well_formed() {
    for _ in 0..200 {
        let id = generate_session_id();
        assert!(is_valid_session_id(&id), "{id}");
    }
}
