use crate::error::Result;
use crate::webhook;
use std::path::Path;

/// Deliver one spool file. Runs detached from the command that wrote it.
///
/// # Errors
///
/// Returns an error if the spool is unreadable or delivery fails.
pub fn dispatch(spool: &Path) -> Result<()> {
    match webhook::dispatch_spool(spool) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::warn!(spool = %spool.display(), error = %err, "webhook delivery failed");
            Err(err)
        }
    }
}
