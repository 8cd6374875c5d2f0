//! Clone stage (§4.5 stage 1): fetches the repo at an exact commit into a
//! scratch directory. Shells out to the `git` binary the same way the CLI's
//! deploy steps shell out to external tooling rather than linking a git
//! library in-process.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub struct ClonedRepo {
    pub dir: tempfile::TempDir,
}

impl ClonedRepo {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Clones `repository` and checks out `git_sha` into a fresh scratch
/// directory. Classifies failures so the caller can tell an auth problem
/// from a missing commit without scraping stderr at every call site.
pub async fn clone_at_commit(repository: &str, git_sha: &str) -> Result<ClonedRepo> {
    let dir = tempfile::tempdir()
        .map_err(|e| Error::internal(format!("failed to create scratch directory: {e}")))?;

    let clone_output = Command::new("git")
        .args(["clone", "--no-checkout", "--quiet", repository])
        .arg(dir.path())
        .output()
        .await
        .map_err(|e| Error::dependency_failed(format!("failed to spawn git: {e}")))?;

    if !clone_output.status.success() {
        let stderr = String::from_utf8_lossy(&clone_output.stderr);
        return Err(classify_git_failure(&stderr, "clone"));
    }

    let checkout_output = Command::new("git")
        .args(["checkout", "--quiet", git_sha])
        .current_dir(dir.path())
        .output()
        .await
        .map_err(|e| Error::dependency_failed(format!("failed to spawn git: {e}")))?;

    if !checkout_output.status.success() {
        let stderr = String::from_utf8_lossy(&checkout_output.stderr);
        return Err(classify_git_failure(&stderr, "checkout"));
    }

    Ok(ClonedRepo { dir })
}

fn classify_git_failure(stderr: &str, stage: &str) -> Error {
    let lower = stderr.to_lowercase();
    if lower.contains("authentication") || lower.contains("permission denied") || lower.contains("could not read") {
        Error::auth(format!("git {stage} failed: repository access denied")).with_context("stderr", stderr.to_string())
    } else if lower.contains("did not match any") || lower.contains("reference is not a tree") || lower.contains("unknown revision") {
        Error::not_found(format!("git {stage} failed: commit not found")).with_context("stderr", stderr.to_string())
    } else {
        Error::dependency_failed(format!("git {stage} failed")).with_context("stderr", stderr.to_string())
    }
}

pub fn app_path_within(repo_dir: &Path, app_path: &str) -> PathBuf {
    repo_dir.join(app_path)
}
