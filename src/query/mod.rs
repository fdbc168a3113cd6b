//! Query language over the issue store.
//!
//! ```text
//! status = open AND (type = bug OR labels ~ urgent)
//! NOT epic.labels ~ "deferred" AND is_ready()
//! log.type = blocker OR rework()
//! ```

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use ast::{Expr, Field, Func, Op};
pub use eval::{Evaluator, IdSet, Snapshot};
pub use parser::parse;

use crate::error::Result;
use crate::model::Issue;
use crate::storage::SqliteStorage;
use tracing::debug;

/// Cap on rows materialized per query unless configured otherwise.
pub const DEFAULT_MAX_RESULTS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// Truncate the materialized rows to this many.
    pub limit: Option<usize>,
    /// Never materialize more than this many rows.
    pub max_results: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl QueryOptions {
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

/// Parse and run a query, returning issues in natural store order.
///
/// # Errors
///
/// Returns `QueryParse` for malformed input, or a store error.
pub fn execute(store: &SqliteStorage, query: &str, options: &QueryOptions) -> Result<Vec<Issue>> {
    let expr = parse(query)?;
    execute_expr(store, &expr, options)
}

/// Run an already parsed expression.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn execute_expr(
    store: &SqliteStorage,
    expr: &Expr,
    options: &QueryOptions,
) -> Result<Vec<Issue>> {
    let evaluator = Evaluator::new(store)?;
    let matched = evaluator.eval(expr)?;
    let total = matched.len();

    let mut rows: Vec<Issue> = evaluator
        .into_snapshot()
        .into_issues()
        .into_iter()
        .filter(|issue| matched.contains(&issue.id))
        .take(options.max_results)
        .collect();

    if let Some(limit) = options.limit {
        rows.truncate(limit);
    }

    debug!(query = %expr, matched = total, returned = rows.len(), "query executed");
    Ok(rows)
}

/// Match `term` as an exact id, a title substring, or a label substring.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn quick_search(store: &SqliteStorage, term: &str, limit: Option<usize>) -> Result<Vec<Issue>> {
    let expr = Expr::or(
        Expr::or(
            Expr::compare(Field::Id, Op::Eq, term),
            Expr::compare(Field::Title, Op::Contains, term),
        ),
        Expr::compare(Field::Labels, Op::Contains, term),
    );
    execute_expr(
        store,
        &expr,
        &QueryOptions {
            limit,
            ..QueryOptions::default()
        },
    )
}
