//! Builder selection (§4.5 stage 2): Dockerfile if present in the app path,
//! otherwise a buildpack auto-detect.

use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderKind {
    Dockerfile { path: String },
    Buildpack,
}

/// Inspects the cloned scratch directory's app path and picks a builder the
/// same way the CLI's build-method selector does: a `Dockerfile` wins
/// outright; otherwise fall back to a buildpack auto-detect over the same
/// directory.
pub fn select_builder(scratch_dir: &Path, app_path: &str) -> BuilderKind {
    let dockerfile = scratch_dir.join(app_path).join("Dockerfile");
    if dockerfile.exists() && dockerfile.is_file() {
        BuilderKind::Dockerfile {
            path: "Dockerfile".to_string(),
        }
    } else {
        BuilderKind::Buildpack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn prefers_dockerfile_when_present() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        let kind = select_builder(dir.path(), "");
        assert_eq!(
            kind,
            BuilderKind::Dockerfile {
                path: "Dockerfile".to_string()
            }
        );
    }

    #[test]
    fn falls_back_to_buildpack_without_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        let kind = select_builder(dir.path(), "");
        assert_eq!(kind, BuilderKind::Buildpack);
    }
}
