//! Persistent store for issues, dependencies, event streams, and sessions.

pub mod schema;
pub mod sqlite;

pub use sqlite::{
    ActionFilter, IssueUpdate, ListFilters, MutationContext, NewHandoff, PendingAction,
    SqliteStorage,
};
