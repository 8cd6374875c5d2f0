//! Image signing stage (§4.5 stage 5): an adaptor trait with a cosign-style
//! external-process default, mirroring `sbom.rs`'s shell-out pattern.

use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::process::Command;

#[async_trait]
pub trait ImageSigner: Send + Sync {
    /// Produces a detached signature bound to `digest` and returns its
    /// stored reference.
    async fn sign(&self, image_tag: &str, digest: &str) -> Result<String>;
}

pub struct CosignSigner {
    pub key_ref: String,
    pub store_prefix: String,
}

#[async_trait]
impl ImageSigner for CosignSigner {
    async fn sign(&self, image_tag: &str, digest: &str) -> Result<String> {
        let status = Command::new("cosign")
            .args(["sign", "--key", &self.key_ref, "--yes", image_tag])
            .status()
            .await
            .map_err(|e| Error::dependency_failed(format!("failed to spawn cosign: {e}")))?;

        if !status.success() {
            return Err(Error::dependency_failed("image signing failed"));
        }

        Ok(format!("{}/{}.sig", self.store_prefix, digest))
    }
}
