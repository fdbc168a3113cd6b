//! Context helpers for attaching messages to errors.

use crate::error::{Result, TdError};

/// Attach a context message to a failing result.
pub trait ResultExt<T> {
    /// Wrap the error with a static context message.
    ///
    /// # Errors
    ///
    /// Returns `TdError::WithContext` wrapping the original error.
    fn context(self, context: &str) -> Result<T>;

    /// Wrap the error with a lazily built context message.
    ///
    /// # Errors
    ///
    /// Returns `TdError::WithContext` wrapping the original error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|source| TdError::WithContext {
            context: context.to_string(),
            source: Box::new(source),
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|source| TdError::WithContext {
            context: f(),
            source: Box::new(source),
        })
    }
}

/// Turn a missing value into an error.
pub trait OptionExt<T> {
    /// Map `None` to `TdError::IssueNotFound`.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` when the option is empty.
    fn or_issue_not_found(self, id: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_issue_not_found(self, id: &str) -> Result<T> {
        self.ok_or_else(|| TdError::IssueNotFound { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_source() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::other("disk gone"));
        let err = res.context("adding dependency").unwrap_err();
        assert_eq!(err.to_string(), "adding dependency: disk gone");
    }

    #[test]
    fn option_maps_to_not_found() {
        let missing: Option<u8> = None;
        let err = missing.or_issue_not_found("td-zzz").unwrap_err();
        assert!(matches!(err, TdError::IssueNotFound { id } if id == "td-zzz"));
    }
}
