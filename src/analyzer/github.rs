//! GitHub repository tree fetching (§4.4, §6:
//! `/integrations/github/repos/{owner}/{repo}/analyze`). Grounded on
//! `auth::oidc::discover`'s plain `reqwest::get`-and-decode shape — the
//! closest existing pattern for talking to an external HTTP API, since
//! nothing in this crate previously fetched from a source host.

#![cfg(feature = "server")]

use serde::Deserialize;

use super::RemoteTreeEntry;
use crate::error::{Error, Result};

const MANIFEST_BASENAMES: &[&str] = &[
    "Dockerfile",
    "package.json",
    "pyproject.toml",
    "requirements.txt",
    "go.mod",
];

#[derive(Debug, Deserialize)]
struct RepoMetadata {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Fetches the full tree at `owner/repo`'s default branch and resolves
/// content for every file the detector inspects. GitHub caps a single
/// recursive tree listing at 100,000 entries; a `truncated` response is
/// surfaced as an error rather than silently analyzing a partial tree.
pub async fn fetch_tree(client: &reqwest::Client, owner: &str, repo: &str) -> Result<Vec<RemoteTreeEntry>> {
    let repo_meta: RepoMetadata = client
        .get(format!("https://api.github.com/repos/{owner}/{repo}"))
        .header("User-Agent", "enclii-analyzer")
        .send()
        .await
        .map_err(|e| Error::dependency_failed(format!("failed to reach GitHub: {e}")))?
        .error_for_status()
        .map_err(|_| Error::not_found(format!("repository {owner}/{repo} not found")))?
        .json()
        .await
        .map_err(|e| Error::dependency_failed(format!("malformed repository metadata: {e}")))?;

    let branch = repo_meta.default_branch;
    let tree_resp: TreeResponse = client
        .get(format!(
            "https://api.github.com/repos/{owner}/{repo}/git/trees/{branch}?recursive=1"
        ))
        .header("User-Agent", "enclii-analyzer")
        .send()
        .await
        .map_err(|e| Error::dependency_failed(format!("failed to fetch repository tree: {e}")))?
        .error_for_status()
        .map_err(|e| Error::dependency_failed(format!("GitHub rejected the tree request: {e}")))?
        .json()
        .await
        .map_err(|e| Error::dependency_failed(format!("malformed tree response: {e}")))?;

    if tree_resp.truncated {
        return Err(Error::dependency_failed(
            "repository tree is too large to analyze in a single listing",
        ));
    }

    let mut entries = Vec::with_capacity(tree_resp.tree.len());
    for entry in tree_resp.tree {
        if entry.kind == "tree" {
            entries.push(RemoteTreeEntry::dir(entry.path));
            continue;
        }
        if is_manifest(&entry.path) {
            match fetch_raw_content(client, owner, repo, &branch, &entry.path).await {
                Ok(content) => entries.push(RemoteTreeEntry::file_with_content(entry.path, content)),
                Err(_) => entries.push(RemoteTreeEntry::file(entry.path)),
            }
        } else {
            entries.push(RemoteTreeEntry::file(entry.path));
        }
    }
    Ok(entries)
}

fn is_manifest(path: &str) -> bool {
    let basename = path.rsplit('/').next().unwrap_or(path);
    MANIFEST_BASENAMES.contains(&basename)
}

async fn fetch_raw_content(
    client: &reqwest::Client,
    owner: &str,
    repo: &str,
    branch: &str,
    path: &str,
) -> Result<String> {
    client
        .get(format!("https://raw.githubusercontent.com/{owner}/{repo}/{branch}/{path}"))
        .header("User-Agent", "enclii-analyzer")
        .send()
        .await
        .map_err(|e| Error::dependency_failed(format!("failed to fetch {path}: {e}")))?
        .error_for_status()
        .map_err(|e| Error::dependency_failed(format!("GitHub rejected content fetch for {path}: {e}")))?
        .text()
        .await
        .map_err(|e| Error::dependency_failed(format!("malformed content response for {path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_manifest_basenames_regardless_of_directory() {
        assert!(is_manifest("apps/api/package.json"));
        assert!(is_manifest("Dockerfile"));
        assert!(!is_manifest("apps/api/README.md"));
    }
}
