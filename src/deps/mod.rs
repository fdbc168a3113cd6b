//! Dependency graph engine.
//!
//! Edges point from an issue to the issue it depends on. Reverse edges
//! (dependents) are the issues a given issue blocks. All operations run over
//! the [`DependencyGraph`] and [`DependencyStore`] traits so they can be
//! driven by the `SQLite` store or by an in-memory snapshot.
//!
//! References to issues that no longer resolve are dead edges: they are
//! skipped in listings, suppressed in blocked sets, and never block
//! readiness.

use crate::error::{Result, ResultExt, TdError};
use crate::model::Issue;
use std::collections::HashSet;
use tracing::debug;

/// Read access to the dependency graph.
pub trait DependencyGraph {
    /// Return true if the issue exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage lookup fails.
    fn issue_exists(&self, id: &str) -> Result<bool>;

    /// Load an issue, or `None` when the id does not resolve.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage lookup fails.
    fn load_issue(&self, id: &str) -> Result<Option<Issue>>;

    /// Return true if the exact edge already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage lookup fails.
    fn dependency_exists(&self, issue_id: &str, depends_on_id: &str) -> Result<bool>;

    /// Ids this issue depends on, in edge insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage lookup fails.
    fn forward_ids(&self, id: &str) -> Result<Vec<String>>;

    /// Ids depending on this issue, in edge insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage lookup fails.
    fn reverse_ids(&self, id: &str) -> Result<Vec<String>>;
}

/// Write access to the dependency graph.
pub trait DependencyStore: DependencyGraph {
    /// Insert an edge, returning false if it already existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn insert_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        session_id: &str,
    ) -> Result<bool>;

    /// Delete an edge, returning whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        session_id: &str,
    ) -> Result<bool>;
}

/// Would adding `issue_id -> depends_on_id` close a loop?
///
/// True when a forward path from `depends_on_id` already reaches `issue_id`,
/// and always for a self edge.
///
/// # Errors
///
/// Returns an error if the graph lookup fails.
pub fn would_create_cycle<G: DependencyGraph + ?Sized>(
    graph: &G,
    issue_id: &str,
    depends_on_id: &str,
) -> Result<bool> {
    if issue_id == depends_on_id {
        return Ok(true);
    }

    let mut visited = HashSet::new();
    let mut stack = vec![depends_on_id.to_string()];
    while let Some(current) = stack.pop() {
        if current == issue_id {
            return Ok(true);
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        for next in graph.forward_ids(&current)? {
            if !visited.contains(&next) {
                stack.push(next);
            }
        }
    }

    Ok(false)
}

/// Check that `issue_id -> depends_on_id` may be added.
///
/// # Errors
///
/// `IssueNotFound` if either end is missing, `DependencyCycle` if the edge
/// would close a loop, `DuplicateDependency` if it is already recorded.
pub fn validate<G: DependencyGraph + ?Sized>(
    graph: &G,
    issue_id: &str,
    depends_on_id: &str,
) -> Result<()> {
    for id in [issue_id, depends_on_id] {
        if !graph.issue_exists(id)? {
            return Err(TdError::IssueNotFound { id: id.to_string() });
        }
    }

    if would_create_cycle(graph, issue_id, depends_on_id)? {
        return Err(TdError::DependencyCycle {
            from: issue_id.to_string(),
            to: depends_on_id.to_string(),
        });
    }

    if graph.dependency_exists(issue_id, depends_on_id)? {
        return Err(TdError::DuplicateDependency {
            from: issue_id.to_string(),
            to: depends_on_id.to_string(),
        });
    }

    Ok(())
}

/// Validate, then insert the edge.
///
/// # Errors
///
/// Returns validation errors unchanged; store failures carry a context message.
pub fn validate_and_add<S: DependencyStore + ?Sized>(
    store: &mut S,
    issue_id: &str,
    depends_on_id: &str,
    session_id: &str,
) -> Result<()> {
    validate(&*store, issue_id, depends_on_id)?;
    store
        .insert_dependency(issue_id, depends_on_id, session_id)
        .with_context(|| format!("adding dependency {issue_id} -> {depends_on_id}"))?;
    debug!(issue_id, depends_on_id, "dependency added");
    Ok(())
}

/// Remove an edge if present. Absence is not an error.
///
/// # Errors
///
/// Store failures carry a context message.
pub fn remove<S: DependencyStore + ?Sized>(
    store: &mut S,
    issue_id: &str,
    depends_on_id: &str,
    session_id: &str,
) -> Result<bool> {
    store
        .delete_dependency(issue_id, depends_on_id, session_id)
        .with_context(|| format!("removing dependency {issue_id} -> {depends_on_id}"))
}

/// Issues `id` depends on. Unresolvable targets are skipped.
///
/// # Errors
///
/// Returns an error if the graph lookup fails.
pub fn get_dependencies<G: DependencyGraph + ?Sized>(graph: &G, id: &str) -> Result<Vec<Issue>> {
    resolve_all(graph, graph.forward_ids(id)?)
}

/// Issues depending on `id`. Unresolvable sources are skipped.
///
/// # Errors
///
/// Returns an error if the graph lookup fails.
pub fn get_dependents<G: DependencyGraph + ?Sized>(graph: &G, id: &str) -> Result<Vec<Issue>> {
    resolve_all(graph, graph.reverse_ids(id)?)
}

fn resolve_all<G: DependencyGraph + ?Sized>(graph: &G, ids: Vec<String>) -> Result<Vec<Issue>> {
    let mut issues = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(issue) = graph.load_issue(&id)? {
            issues.push(issue);
        }
    }
    Ok(issues)
}

/// Every issue transitively blocked by `id` (reverse-edge closure).
///
/// `visited` is shared across calls so callers can union several roots
/// without duplicates. `id` itself is never in the result.
///
/// # Errors
///
/// Returns an error if the graph lookup fails.
pub fn transitive_blocked<G: DependencyGraph + ?Sized>(
    graph: &G,
    id: &str,
    visited: &mut HashSet<String>,
) -> Result<Vec<String>> {
    visited.insert(id.to_string());
    let mut out = Vec::new();
    walk(graph, id, visited, &mut out, Direction::Reverse, false)?;
    Ok(out)
}

/// Like [`transitive_blocked`], but closed issues cut the walk.
///
/// A closed node is marked visited and neither reported nor recursed through.
///
/// # Errors
///
/// Returns an error if the graph lookup fails.
pub fn transitive_blocked_open<G: DependencyGraph + ?Sized>(
    graph: &G,
    id: &str,
    visited: &mut HashSet<String>,
) -> Result<Vec<String>> {
    visited.insert(id.to_string());
    let mut out = Vec::new();
    walk(graph, id, visited, &mut out, Direction::Reverse, true)?;
    Ok(out)
}

/// Everything `id` transitively depends on (forward-edge closure).
///
/// # Errors
///
/// Returns an error if the graph lookup fails.
pub fn transitive_dependencies<G: DependencyGraph + ?Sized>(
    graph: &G,
    id: &str,
    visited: &mut HashSet<String>,
) -> Result<Vec<String>> {
    visited.insert(id.to_string());
    let mut out = Vec::new();
    walk(graph, id, visited, &mut out, Direction::Forward, false)?;
    Ok(out)
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Reverse,
}

fn walk<G: DependencyGraph + ?Sized>(
    graph: &G,
    id: &str,
    visited: &mut HashSet<String>,
    out: &mut Vec<String>,
    direction: Direction,
    cut_closed: bool,
) -> Result<()> {
    let neighbors = match direction {
        Direction::Forward => graph.forward_ids(id)?,
        Direction::Reverse => graph.reverse_ids(id)?,
    };

    for next in neighbors {
        if !visited.insert(next.clone()) {
            continue;
        }
        let Some(issue) = graph.load_issue(&next)? else {
            continue;
        };
        if cut_closed && issue.status.is_terminal() {
            continue;
        }
        out.push(next.clone());
        walk(graph, &next, visited, out, direction, cut_closed)?;
    }

    Ok(())
}

/// An issue is ready when everything it depends on is closed.
///
/// # Errors
///
/// Returns an error if the graph lookup fails.
pub fn is_ready<G: DependencyGraph + ?Sized>(graph: &G, id: &str) -> Result<bool> {
    for dep in graph.forward_ids(id)? {
        if let Some(issue) = graph.load_issue(&dep)? {
            if !issue.status.is_terminal() {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Negation of [`is_ready`].
///
/// # Errors
///
/// Returns an error if the graph lookup fails.
pub fn has_open_deps<G: DependencyGraph + ?Sized>(graph: &G, id: &str) -> Result<bool> {
    Ok(!is_ready(graph, id)?)
}
