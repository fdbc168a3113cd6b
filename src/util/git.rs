//! Version-control helpers.

use std::path::Path;
use std::process::Command;
use tracing::debug;

pub const DEFAULT_BRANCH: &str = "main";

/// Current branch of the repository containing `dir`, or `main` when git is
/// unavailable or `dir` is not inside a repository.
#[must_use]
pub fn current_branch(dir: &Path) -> String {
    let output = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(dir)
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let branch = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if branch.is_empty() {
                DEFAULT_BRANCH.to_string()
            } else {
                branch
            }
        }
        Ok(out) => {
            debug!(status = ?out.status, "git rev-parse failed; using default branch");
            DEFAULT_BRANCH.to_string()
        }
        Err(err) => {
            debug!(error = %err, "git unavailable; using default branch");
            DEFAULT_BRANCH.to_string()
        }
    }
}
