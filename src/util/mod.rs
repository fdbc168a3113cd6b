//! Shared utilities for `td_rust`.
//!
//! - ID generation (issue hash ids, random session ids)
//! - SHA-256 file hashing for linked files
//! - Git branch discovery

pub mod git;
mod hash;
pub mod id;

pub use git::current_branch;
pub use hash::{hash_file, sha256_hex};
pub use id::{generate_issue_id, generate_session_id, is_valid_issue_id, is_valid_session_id};
