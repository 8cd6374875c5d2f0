//! Source analyzer (C4, §4.4): walks a remote repo tree at a commit and
//! proposes deployable services without cloning.

pub mod detect;
#[cfg(feature = "server")]
pub mod github;

pub use detect::{detect_services, DetectedService, Framework, Runtime};

/// One entry in a repo tree listing, abstracted so the detector can be fed
/// either a real git-host API tree response or a fixture in tests.
#[derive(Debug, Clone)]
pub struct RemoteTreeEntry {
    /// Path relative to the repo root, e.g. `"apps/api/package.json"`.
    pub path: String,
    pub is_dir: bool,
    /// Blob content, fetched alongside the tree listing for the small set of
    /// manifest files the detector inspects (`Dockerfile`, `package.json`,
    /// `pyproject.toml`, `requirements.txt`, `go.mod`). `None` for
    /// everything else, including directories.
    pub content: Option<String>,
}

impl RemoteTreeEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            content: None,
        }
    }

    pub fn file_with_content(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            content: Some(content.into()),
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            content: None,
        }
    }

    fn dir_of(&self) -> &str {
        match self.path.rfind('/') {
            Some(i) => &self.path[..i],
            None => "",
        }
    }

    fn basename(&self) -> &str {
        match self.path.rfind('/') {
            Some(i) => &self.path[i + 1..],
            None => &self.path,
        }
    }
}

/// A monorepo build tool detected at the repo root, and its conventional
/// candidate roots for deployable apps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonorepoTool {
    Turborepo,
    Nx,
    Lerna,
    PnpmWorkspace,
}

impl MonorepoTool {
    pub fn candidate_roots(self) -> &'static [&'static str] {
        &["apps", "services", "packages"]
    }
}

/// Detects a monorepo tool from root-level manifest files.
pub fn detect_monorepo_tool(entries: &[RemoteTreeEntry]) -> Option<MonorepoTool> {
    let root_files: std::collections::HashSet<&str> = entries
        .iter()
        .filter(|e| !e.is_dir && !e.path.contains('/'))
        .map(|e| e.path.as_str())
        .collect();

    if root_files.contains("turbo.json") {
        Some(MonorepoTool::Turborepo)
    } else if root_files.contains("nx.json") {
        Some(MonorepoTool::Nx)
    } else if root_files.contains("lerna.json") {
        Some(MonorepoTool::Lerna)
    } else if root_files.contains("pnpm-workspace.yaml") {
        Some(MonorepoTool::PnpmWorkspace)
    } else {
        None
    }
}

/// Shared directories (`packages/`, `libs/`, `shared/`) whose changes should
/// be treated by the webhook router (C9) as affecting every detected
/// service, rather than being mapped to one.
pub fn shared_directories(entries: &[RemoteTreeEntry]) -> Vec<String> {
    const NAMES: &[&str] = &["packages", "libs", "shared"];
    entries
        .iter()
        .filter(|e| e.is_dir && NAMES.contains(&e.path.as_str()))
        .map(|e| e.path.clone())
        .collect()
}
