//! Query syntax tree.

use std::fmt;

/// Comparison operator of a simple predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `=` exact match.
    Eq,
    /// `~` case-insensitive substring.
    Contains,
}

/// Fields addressable in `field op value` atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Title,
    Description,
    Status,
    Type,
    Priority,
    Labels,
    Parent,
    Epic,
    EpicLabels,
    LogMessage,
    LogType,
    CommentText,
    HandoffDone,
    HandoffRemaining,
    FilePath,
    FileRole,
}

impl Field {
    /// Resolve a field name, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "id" => Self::Id,
            "title" => Self::Title,
            "description" => Self::Description,
            "status" => Self::Status,
            "type" => Self::Type,
            "priority" => Self::Priority,
            "labels" | "label" => Self::Labels,
            "parent" | "parent_id" => Self::Parent,
            "epic" => Self::Epic,
            "epic.labels" => Self::EpicLabels,
            "log.message" => Self::LogMessage,
            "log.type" => Self::LogType,
            "comment.text" => Self::CommentText,
            "handoff.done" => Self::HandoffDone,
            "handoff.remaining" => Self::HandoffRemaining,
            "file.path" => Self::FilePath,
            "file.role" => Self::FileRole,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::Description => "description",
            Self::Status => "status",
            Self::Type => "type",
            Self::Priority => "priority",
            Self::Labels => "labels",
            Self::Parent => "parent",
            Self::Epic => "epic",
            Self::EpicLabels => "epic.labels",
            Self::LogMessage => "log.message",
            Self::LogType => "log.type",
            Self::CommentText => "comment.text",
            Self::HandoffDone => "handoff.done",
            Self::HandoffRemaining => "handoff.remaining",
            Self::FilePath => "file.path",
            Self::FileRole => "file.role",
        }
    }

    /// Whether `op` is meaningful for this field.
    #[must_use]
    pub const fn supports(self, op: Op) -> bool {
        !matches!((self, op), (Self::Epic, Op::Contains))
    }
}

/// Built-in query functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Is,
    ChildOf,
    DescendantOf,
    Blocks,
    BlockedBy,
    IsReady,
    HasOpenDeps,
    Rework,
}

impl Func {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "is" => Self::Is,
            "child_of" => Self::ChildOf,
            "descendant_of" => Self::DescendantOf,
            "blocks" => Self::Blocks,
            "blocked_by" => Self::BlockedBy,
            "is_ready" => Self::IsReady,
            "has_open_deps" => Self::HasOpenDeps,
            "rework" => Self::Rework,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Is => "is",
            Self::ChildOf => "child_of",
            Self::DescendantOf => "descendant_of",
            Self::Blocks => "blocks",
            Self::BlockedBy => "blocked_by",
            Self::IsReady => "is_ready",
            Self::HasOpenDeps => "has_open_deps",
            Self::Rework => "rework",
        }
    }

    /// Number of arguments the function takes.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Is | Self::ChildOf | Self::DescendantOf | Self::Blocks | Self::BlockedBy => 1,
            Self::IsReady | Self::HasOpenDeps | Self::Rework => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Matches every issue (the empty query).
    All,
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare { field: Field, op: Op, value: String },
    Call { func: Func, args: Vec<String> },
}

impl Expr {
    #[must_use]
    pub fn compare(field: Field, op: Op, value: impl Into<String>) -> Self {
        Self::Compare {
            field,
            op,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn or(lhs: Self, rhs: Self) -> Self {
        Self::Or(Box::new(lhs), Box::new(rhs))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => Ok(()),
            Self::And(l, r) => write!(f, "({l} AND {r})"),
            Self::Or(l, r) => write!(f, "({l} OR {r})"),
            Self::Not(e) => write!(f, "NOT {e}"),
            Self::Compare { field, op, value } => {
                let op = match op {
                    Op::Eq => "=",
                    Op::Contains => "~",
                };
                write!(f, "{} {op} {}", field.name(), quote(value))
            }
            Self::Call { func, args } => {
                let args: Vec<String> = args.iter().map(String::as_str).map(quote).collect();
                write!(f, "{}({})", func.name(), args.join(", "))
            }
        }
    }
}

/// Double-quote `value`, escaping only what the lexer unescapes.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;

    #[test]
    fn rendering_keeps_control_characters_literal() {
        let expr = Expr::compare(Field::Title, Op::Contains, "a\nb\t\"q\" \\ end");
        let rendered = expr.to_string();
        assert_eq!(rendered, "title ~ \"a\nb\t\\\"q\\\" \\\\ end\"");
        assert_eq!(parse(&rendered).unwrap(), expr);
    }

    #[test]
    fn call_arguments_are_quoted() {
        let expr = Expr::Call {
            func: Func::ChildOf,
            args: vec!["td-\"x".to_string()],
        };
        assert_eq!(expr.to_string(), "child_of(\"td-\\\"x\")");
        assert_eq!(parse(&expr.to_string()).unwrap(), expr);
    }
}
