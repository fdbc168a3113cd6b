//! `td_rust`: a local, agent-aware issue tracker backed by SQLite.
//!
//! Issues form a dependency graph, can be filtered through a small query
//! language, and every mutation is attributed to a per-agent session and
//! recorded in an append-only action log that can be pushed to a webhook.

pub mod cli;
pub mod config;
pub mod deps;
pub mod error;
pub mod logging;
pub mod model;
pub mod query;
pub mod session;
pub mod storage;
pub mod util;
pub mod webhook;

pub use error::{Result, StructuredError, TdError};
