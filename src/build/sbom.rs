//! SBOM generation stage (§4.5 stage 4): an adaptor trait, matching the
//! teacher's habit of shelling out to external tooling (`buildkit.rs`)
//! rather than re-implementing a supply-chain scanner in-process.

use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::process::Command;

#[async_trait]
pub trait SbomGenerator: Send + Sync {
    /// Generates an SBOM for `image_tag` and returns an object-storage
    /// reference to it.
    async fn generate(&self, image_tag: &str) -> Result<String>;
}

/// Shells out to `syft`, writing the SBOM to a path under `store_prefix`
/// and returning that path as the stored reference.
pub struct SyftGenerator {
    pub store_prefix: String,
}

#[async_trait]
impl SbomGenerator for SyftGenerator {
    async fn generate(&self, image_tag: &str) -> Result<String> {
        let output_ref = format!("{}/{}.spdx.json", self.store_prefix, sanitize(image_tag));

        let status = Command::new("syft")
            .args([image_tag, "-o", &format!("spdx-json={output_ref}")])
            .status()
            .await
            .map_err(|e| Error::dependency_failed(format!("failed to spawn syft: {e}")))?;

        if !status.success() {
            return Err(Error::dependency_failed("SBOM generation failed"));
        }

        Ok(output_ref)
    }
}

fn sanitize(image_tag: &str) -> String {
    image_tag.replace(['/', ':'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_image_tag_for_storage_path() {
        assert_eq!(sanitize("registry.internal/acme/api:abc123"), "registry.internal_acme_api_abc123");
    }
}
