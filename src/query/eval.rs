//! Set-valued evaluation of query expressions.
//!
//! Every atom produces the set of matching issue ids. `AND`, `OR` and `NOT`
//! are intersection, union and complement against the universe of all ids.
//! Issues, labels and dependency edges are loaded once into a [`Snapshot`];
//! cross-entity tables (logs, comments, handoffs, files, action log) are
//! loaded on first use. Ids from those tables that no longer resolve are
//! intersected away.

use super::ast::{Expr, Field, Func, Op};
use crate::deps::{self, DependencyGraph};
use crate::error::Result;
use crate::model::{
    ActionType, Comment, Handoff, Issue, IssueFile, IssueType, Log, Priority, Status,
};
use crate::storage::{ActionFilter, ListFilters, SqliteStorage};
use std::cell::OnceCell;
use std::collections::{HashMap, HashSet, VecDeque};

pub type IdSet = HashSet<String>;

/// In-memory view of issues and dependency edges, in natural store order.
#[derive(Debug, Default)]
pub struct Snapshot {
    issues: Vec<Issue>,
    index: HashMap<String, usize>,
    children: HashMap<String, Vec<String>>,
    forward: HashMap<String, Vec<String>>,
    reverse: HashMap<String, Vec<String>>,
}

impl Snapshot {
    /// Load every issue (labels included) and every dependency edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn load(store: &SqliteStorage) -> Result<Self> {
        let issues = store.list_issues(&ListFilters::all())?;
        let mut snapshot = Self::from_issues(issues);
        for dep in store.list_all_dependencies()? {
            snapshot
                .forward
                .entry(dep.issue_id.clone())
                .or_default()
                .push(dep.depends_on_id.clone());
            snapshot
                .reverse
                .entry(dep.depends_on_id)
                .or_default()
                .push(dep.issue_id);
        }
        Ok(snapshot)
    }

    fn from_issues(issues: Vec<Issue>) -> Self {
        let mut index = HashMap::with_capacity(issues.len());
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for (pos, issue) in issues.iter().enumerate() {
            index.insert(issue.id.clone(), pos);
            if let Some(parent) = &issue.parent_id {
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(issue.id.clone());
            }
        }
        Self {
            issues,
            index,
            children,
            forward: HashMap::new(),
            reverse: HashMap::new(),
        }
    }

    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    #[must_use]
    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Issue> {
        self.index.get(id).map(|&pos| &self.issues[pos])
    }

    #[must_use]
    pub fn universe(&self) -> IdSet {
        self.issues.iter().map(|i| i.id.clone()).collect()
    }

    fn select(&self, pred: impl Fn(&Issue) -> bool) -> IdSet {
        self.issues
            .iter()
            .filter(|i| pred(i))
            .map(|i| i.id.clone())
            .collect()
    }

    /// Children, grandchildren, and so on; never the root itself.
    #[must_use]
    pub fn descendants(&self, root: &str) -> IdSet {
        let mut out = IdSet::new();
        let mut queue = VecDeque::from([root.to_string()]);
        while let Some(current) = queue.pop_front() {
            for child in self.children.get(&current).into_iter().flatten() {
                if child != root && out.insert(child.clone()) {
                    queue.push_back(child.clone());
                }
            }
        }
        out
    }
}

impl DependencyGraph for Snapshot {
    fn issue_exists(&self, id: &str) -> Result<bool> {
        Ok(self.index.contains_key(id))
    }

    fn load_issue(&self, id: &str) -> Result<Option<Issue>> {
        Ok(self.get(id).cloned())
    }

    fn dependency_exists(&self, issue_id: &str, depends_on_id: &str) -> Result<bool> {
        Ok(self
            .forward
            .get(issue_id)
            .is_some_and(|targets| targets.iter().any(|t| t == depends_on_id)))
    }

    fn forward_ids(&self, id: &str) -> Result<Vec<String>> {
        Ok(self.forward.get(id).cloned().unwrap_or_default())
    }

    fn reverse_ids(&self, id: &str) -> Result<Vec<String>> {
        Ok(self.reverse.get(id).cloned().unwrap_or_default())
    }
}

/// Evaluates expressions against one store snapshot.
pub struct Evaluator<'a> {
    store: &'a SqliteStorage,
    snapshot: Snapshot,
    universe: IdSet,
    logs: OnceCell<Vec<Log>>,
    comments: OnceCell<Vec<Comment>>,
    handoffs: OnceCell<Vec<Handoff>>,
    files: OnceCell<Vec<IssueFile>>,
    rework: OnceCell<IdSet>,
}

impl<'a> Evaluator<'a> {
    /// Snapshot the store for evaluation.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn new(store: &'a SqliteStorage) -> Result<Self> {
        let snapshot = Snapshot::load(store)?;
        let universe = snapshot.universe();
        Ok(Self {
            store,
            snapshot,
            universe,
            logs: OnceCell::new(),
            comments: OnceCell::new(),
            handoffs: OnceCell::new(),
            files: OnceCell::new(),
            rework: OnceCell::new(),
        })
    }

    #[must_use]
    pub const fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn into_snapshot(self) -> Snapshot {
        self.snapshot
    }

    /// Evaluate `expr` to the set of matching issue ids.
    ///
    /// # Errors
    ///
    /// Returns an error if a lazily loaded table cannot be read.
    pub fn eval(&self, expr: &Expr) -> Result<IdSet> {
        match expr {
            Expr::All => Ok(self.universe.clone()),
            Expr::And(lhs, rhs) => {
                let left = self.eval(lhs)?;
                if left.is_empty() {
                    return Ok(left);
                }
                let right = self.eval(rhs)?;
                Ok(left.intersection(&right).cloned().collect())
            }
            Expr::Or(lhs, rhs) => {
                let mut left = self.eval(lhs)?;
                left.extend(self.eval(rhs)?);
                Ok(left)
            }
            Expr::Not(inner) => {
                let matched = self.eval(inner)?;
                Ok(self.universe.difference(&matched).cloned().collect())
            }
            Expr::Compare { field, op, value } => self.compare(*field, *op, value),
            Expr::Call { func, args } => self.call(*func, args),
        }
    }

    fn compare(&self, field: Field, op: Op, value: &str) -> Result<IdSet> {
        let snap = &self.snapshot;
        let set = match field {
            Field::Id => snap.select(|i| match op {
                Op::Eq => i.id.eq_ignore_ascii_case(value),
                Op::Contains => contains_ci(&i.id, value),
            }),
            Field::Title => snap.select(|i| text_match(op, &i.title, value)),
            Field::Description => {
                snap.select(|i| text_match(op, i.description.as_deref().unwrap_or(""), value))
            }
            Field::Status => {
                let wanted = normalize_status(value);
                snap.select(|i| enum_match(op, i.status.as_str(), value, &wanted))
            }
            Field::Type => {
                let wanted = normalize_type(value);
                snap.select(|i| enum_match(op, i.issue_type.as_str(), value, &wanted))
            }
            Field::Priority => {
                let wanted = value
                    .parse::<Priority>()
                    .map_or_else(|_| value.to_uppercase(), |p| p.as_str().to_string());
                snap.select(|i| enum_match(op, i.priority.as_str(), value, &wanted))
            }
            Field::Labels => snap.select(|i| i.labels.iter().any(|l| label_match(op, l, value))),
            Field::Parent => snap.select(|i| {
                i.parent_id.as_deref().is_some_and(|p| match op {
                    Op::Eq => p.eq_ignore_ascii_case(value),
                    Op::Contains => contains_ci(p, value),
                })
            }),
            Field::Epic => snap.descendants(value),
            Field::EpicLabels => {
                let mut out = IdSet::new();
                for epic in snap.issues().iter().filter(|i| {
                    i.issue_type == IssueType::Epic
                        && i.labels.iter().any(|l| label_match(op, l, value))
                }) {
                    out.extend(snap.descendants(&epic.id));
                }
                out
            }
            Field::LogMessage => self.attached(self.logs()?, |l| {
                text_match(op, &l.message, value).then_some(l.issue_id.as_str())
            }),
            Field::LogType => {
                let wanted = value.trim().to_lowercase();
                self.attached(self.logs()?, |l| {
                    enum_match(op, l.log_type.as_str(), value, &wanted)
                        .then_some(l.issue_id.as_str())
                })
            }
            Field::CommentText => self.attached(self.comments()?, |c| {
                text_match(op, &c.text, value).then_some(c.issue_id.as_str())
            }),
            Field::HandoffDone => self.attached(self.handoffs()?, |h| {
                h.done
                    .iter()
                    .any(|item| text_match(op, item, value))
                    .then_some(h.issue_id.as_str())
            }),
            Field::HandoffRemaining => self.attached(self.handoffs()?, |h| {
                h.remaining
                    .iter()
                    .any(|item| text_match(op, item, value))
                    .then_some(h.issue_id.as_str())
            }),
            Field::FilePath => self.attached(self.files()?, |f| {
                text_match(op, &f.path, value).then_some(f.issue_id.as_str())
            }),
            Field::FileRole => {
                let wanted = value
                    .parse::<crate::model::FileRole>()
                    .map_or_else(|_| value.to_lowercase(), |r| r.as_str().to_string());
                self.attached(self.files()?, |f| {
                    enum_match(op, f.role.as_str(), value, &wanted).then_some(f.issue_id.as_str())
                })
            }
        };
        Ok(set)
    }

    fn call(&self, func: Func, args: &[String]) -> Result<IdSet> {
        let arg = args.first().map_or("", String::as_str);
        let snap = &self.snapshot;
        let set = match func {
            Func::Is => self.compare(Field::Status, Op::Eq, arg)?,
            Func::ChildOf => snap
                .children
                .get(arg)
                .map(|kids| kids.iter().cloned().collect())
                .unwrap_or_default(),
            Func::DescendantOf => snap.descendants(arg),
            Func::Blocks => {
                if self.universe.contains(arg) {
                    deps::transitive_dependencies(snap, arg, &mut HashSet::new())?
                        .into_iter()
                        .collect()
                } else {
                    IdSet::new()
                }
            }
            Func::BlockedBy => {
                if self.universe.contains(arg) {
                    deps::transitive_blocked(snap, arg, &mut HashSet::new())?
                        .into_iter()
                        .collect()
                } else {
                    IdSet::new()
                }
            }
            Func::IsReady => {
                let mut out = IdSet::new();
                for issue in snap.issues() {
                    if deps::is_ready(snap, &issue.id)? {
                        out.insert(issue.id.clone());
                    }
                }
                out
            }
            Func::HasOpenDeps => {
                let mut out = IdSet::new();
                for issue in snap.issues() {
                    if deps::has_open_deps(snap, &issue.id)? {
                        out.insert(issue.id.clone());
                    }
                }
                out
            }
            Func::Rework => self.rework()?.clone(),
        };
        Ok(set)
    }

    /// Issue ids of attached rows accepted by `pick`, restricted to live issues.
    fn attached<'r, T: 'r>(
        &self,
        rows: &'r [T],
        pick: impl Fn(&'r T) -> Option<&'r str>,
    ) -> IdSet {
        rows.iter()
            .filter_map(pick)
            .filter(|id| self.universe.contains(*id))
            .map(str::to_string)
            .collect()
    }

    fn logs(&self) -> Result<&[Log]> {
        if let Some(rows) = self.logs.get() {
            return Ok(rows);
        }
        let rows = self.store.list_logs(None)?;
        Ok(self.logs.get_or_init(|| rows))
    }

    fn comments(&self) -> Result<&[Comment]> {
        if let Some(rows) = self.comments.get() {
            return Ok(rows);
        }
        let rows = self.store.list_comments(None)?;
        Ok(self.comments.get_or_init(|| rows))
    }

    fn handoffs(&self) -> Result<&[Handoff]> {
        if let Some(rows) = self.handoffs.get() {
            return Ok(rows);
        }
        let rows = self.store.list_handoffs(None)?;
        Ok(self.handoffs.get_or_init(|| rows))
    }

    fn files(&self) -> Result<&[IssueFile]> {
        if let Some(rows) = self.files.get() {
            return Ok(rows);
        }
        let rows = self.store.list_files(None)?;
        Ok(self.files.get_or_init(|| rows))
    }

    /// In-progress issues whose most recent reject/review action is a reject.
    fn rework(&self) -> Result<&IdSet> {
        if let Some(set) = self.rework.get() {
            return Ok(set);
        }

        let actions = self.store.list_action_log(&ActionFilter {
            entity_type: Some("issue".to_string()),
            action_types: vec![ActionType::Reject, ActionType::Review],
            ..ActionFilter::default()
        })?;

        let mut latest: HashMap<&str, &ActionType> = HashMap::new();
        for action in &actions {
            latest.insert(action.entity_id.as_str(), &action.action_type);
        }

        let set = latest
            .into_iter()
            .filter(|(_, action)| **action == ActionType::Reject)
            .filter_map(|(id, _)| self.snapshot.get(id))
            .filter(|issue| issue.status == Status::InProgress)
            .map(|issue| issue.id.clone())
            .collect();

        Ok(self.rework.get_or_init(|| set))
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn text_match(op: Op, actual: &str, value: &str) -> bool {
    match op {
        Op::Eq => actual == value,
        Op::Contains => contains_ci(actual, value),
    }
}

fn label_match(op: Op, label: &str, value: &str) -> bool {
    match op {
        Op::Eq => label.eq_ignore_ascii_case(value),
        Op::Contains => contains_ci(label, value),
    }
}

/// `=` compares against the normalized enum spelling, `~` against the raw value.
fn enum_match(op: Op, actual: &str, raw: &str, normalized: &str) -> bool {
    match op {
        Op::Eq => actual.eq_ignore_ascii_case(normalized),
        Op::Contains => contains_ci(actual, raw),
    }
}

fn normalize_status(value: &str) -> String {
    value.parse::<Status>().map_or_else(
        |_| value.trim().to_lowercase().replace('-', "_"),
        |s| s.as_str().to_string(),
    )
}

fn normalize_type(value: &str) -> String {
    value
        .parse::<IssueType>()
        .map_or_else(|_| value.trim().to_lowercase(), |t| t.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descendants_exclude_root_and_survive_parent_loops() {
        let mut a = Issue::new("a", "a");
        a.parent_id = Some("c".into());
        let mut b = Issue::new("b", "b");
        b.parent_id = Some("a".into());
        let mut c = Issue::new("c", "c");
        c.parent_id = Some("b".into());
        let snap = Snapshot::from_issues(vec![a, b, c]);

        let mut found: Vec<String> = snap.descendants("a").into_iter().collect();
        found.sort();
        assert_eq!(found, vec!["b", "c"]);
    }

    #[test]
    fn enum_match_normalizes_equality_only() {
        assert!(enum_match(Op::Eq, "in_progress", "In-Progress", &normalize_status("In-Progress")));
        assert!(enum_match(Op::Contains, "in_progress", "PROG", "prog"));
        assert!(!enum_match(Op::Eq, "in_progress", "prog", "prog"));
    }
}
