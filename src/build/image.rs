//! Build-image stage (§4.5 stage 3): produces an OCI image tagged
//! `registry/project/service:git-sha`, with the digest captured from the
//! builder's output.

use super::builder::BuilderKind;
use crate::error::{Error, Result};
use std::path::Path;
use tokio::process::Command;

pub struct BuiltImage {
    pub tag: String,
    pub digest: String,
}

/// Runs the selected builder against the app path and returns the image tag
/// plus its content digest. Dockerfile builds shell to `docker build`;
/// buildpack builds shell to `pack build`, mirroring the CLI's two build
/// backends.
pub async fn build_image(
    scratch_dir: &Path,
    app_path: &str,
    kind: &BuilderKind,
    tag: &str,
) -> Result<BuiltImage> {
    let context_dir = scratch_dir.join(app_path);

    let status = match kind {
        BuilderKind::Dockerfile { path } => {
            Command::new("docker")
                .args(["build", "-f"])
                .arg(context_dir.join(path))
                .args(["-t", tag])
                .arg(&context_dir)
                .status()
                .await
        }
        BuilderKind::Buildpack => {
            Command::new("pack")
                .args(["build", tag, "--path"])
                .arg(&context_dir)
                .status()
                .await
        }
    }
    .map_err(|e| Error::dependency_failed(format!("failed to spawn builder: {e}")))?;

    if !status.success() {
        return Err(Error::dependency_failed("image build failed").with_context(
            "builder",
            match kind {
                BuilderKind::Dockerfile { .. } => "docker",
                BuilderKind::Buildpack => "pack",
            },
        ));
    }

    let digest = capture_digest(tag).await?;
    Ok(BuiltImage {
        tag: tag.to_string(),
        digest,
    })
}

async fn capture_digest(tag: &str) -> Result<String> {
    let output = Command::new("docker")
        .args(["inspect", "--format={{index .Id}}", tag])
        .output()
        .await
        .map_err(|e| Error::dependency_failed(format!("failed to spawn docker inspect: {e}")))?;

    if !output.status.success() {
        return Err(Error::dependency_failed("failed to capture image digest"));
    }

    let digest = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if digest.is_empty() {
        return Err(Error::dependency_failed("docker inspect returned no digest"));
    }
    Ok(digest)
}

/// The image tag for a `(registry, project, service, git_sha)` tuple, per
/// §4.5's `registry/project/service:git-sha` convention.
pub fn image_tag(registry: &str, project: &str, service: &str, git_sha: &str) -> String {
    format!("{registry}/{project}/{service}:{git_sha}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_follows_convention() {
        assert_eq!(
            image_tag("registry.internal", "acme", "api", "abc123"),
            "registry.internal/acme/api:abc123"
        );
    }
}
