//! ID generation for issues and sessions.
//!
//! Issue ids are `td-` followed by six lowercase hex characters taken from a
//! SHA-256 over the title, creation time and a nonce. Session ids are `ses_`
//! followed by six random hex characters.

use crate::error::{Result, TdError};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub const ISSUE_PREFIX: &str = "td";
pub const SESSION_PREFIX: &str = "ses_";
pub const HASH_LENGTH: usize = 6;

const MAX_NONCE: u32 = 10_000;

/// Seed string for a candidate issue id: `title | created_at (ns) | nonce`.
#[must_use]
pub fn generate_id_seed(title: &str, created_at: DateTime<Utc>, nonce: u32) -> String {
    format!(
        "{}|{}|{}",
        title,
        created_at.timestamp_nanos_opt().unwrap_or(0),
        nonce
    )
}

/// Lowercase hex SHA-256 of `input`, truncated to `length` characters.
#[must_use]
pub fn compute_id_hash(input: &str, length: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(length);
    encoded
}

/// Generate an unused issue id.
///
/// `exists` should return true when the candidate is already taken.
///
/// # Errors
///
/// Returns `IdCollision` if every nonce collides.
pub fn generate_issue_id<F>(title: &str, created_at: DateTime<Utc>, exists: F) -> Result<String>
where
    F: Fn(&str) -> Result<bool>,
{
    let mut last = String::new();
    for nonce in 0..MAX_NONCE {
        let seed = generate_id_seed(title, created_at, nonce);
        let candidate = format!("{ISSUE_PREFIX}-{}", compute_id_hash(&seed, HASH_LENGTH));
        if !exists(&candidate)? {
            return Ok(candidate);
        }
        last = candidate;
    }
    Err(TdError::IdCollision { id: last })
}

/// Fresh random session id.
#[must_use]
pub fn generate_session_id() -> String {
    let value: u32 = rand::random::<u32>() & 0x00ff_ffff;
    format!("{SESSION_PREFIX}{value:06x}")
}

fn is_lower_hex(s: &str) -> bool {
    s.len() == HASH_LENGTH && s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

#[must_use]
pub fn is_valid_issue_id(id: &str) -> bool {
    id.strip_prefix("td-").is_some_and(is_lower_hex)
}

#[must_use]
pub fn is_valid_session_id(id: &str) -> bool {
    id.strip_prefix(SESSION_PREFIX).is_some_and(is_lower_hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn issue_ids_are_deterministic_for_seed() {
        let at = Utc::now();
        let a = generate_issue_id("Fix login", at, |_| Ok(false)).unwrap();
        let b = generate_issue_id("Fix login", at, |_| Ok(false)).unwrap();
        assert_eq!(a, b);
        assert!(is_valid_issue_id(&a), "{a}");
    }

    #[test]
    fn collisions_advance_the_nonce() {
        let at = Utc::now();
        let first = generate_issue_id("Same title", at, |_| Ok(false)).unwrap();
        let taken = HashSet::from([first.clone()]);
        let second = generate_issue_id("Same title", at, |id| Ok(taken.contains(id))).unwrap();
        assert_ne!(first, second);
        assert!(is_valid_issue_id(&second));
    }

    #[test]
    fn exhausted_nonces_report_collision() {
        let err = generate_issue_id("x", Utc::now(), |_| Ok(true)).unwrap_err();
        assert!(matches!(err, TdError::IdCollision { .. }));
    }

    #[test]
    fn session_id_shape() {
        for _ in 0..50 {
            let id = generate_session_id();
            assert!(is_valid_session_id(&id), "{id}");
        }
        assert!(!is_valid_session_id("ses_ABCDEF"));
        assert!(!is_valid_issue_id("td-12345"));
    }
}
