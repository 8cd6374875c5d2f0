//! Registry push (part of §4.5 stage 3), grounded on the teacher's
//! `RegistryProvider` abstraction: credentials and tag formatting are
//! behind a trait so a client-auth ("already `docker login`'d") provider and
//! a credentialed one share the same push path.

use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::process::Command;

#[async_trait]
pub trait RegistryProvider: Send + Sync {
    fn registry_url(&self) -> &str;
    async fn get_push_credentials(&self) -> Result<(String, String)>;
}

/// Assumes the operator has already authenticated the local `docker` CLI
/// (e.g. via `docker login`); credentials are empty and push relies on the
/// CLI's stored auth, matching the teacher's `OciClientAuthProvider`.
pub struct ClientAuthRegistry {
    pub registry_url: String,
}

#[async_trait]
impl RegistryProvider for ClientAuthRegistry {
    fn registry_url(&self) -> &str {
        &self.registry_url
    }

    async fn get_push_credentials(&self) -> Result<(String, String)> {
        Ok((String::new(), String::new()))
    }
}

/// Pushes `tag` to the registry and returns nothing further: the digest was
/// already captured from the local build (`image::build_image`), and per
/// §4.5 it must never be re-derived from the push response, since registries
/// may recompute manifests differently than the local daemon.
pub async fn push(registry: &dyn RegistryProvider, tag: &str) -> Result<()> {
    let _ = registry.get_push_credentials().await?;
    let status = Command::new("docker")
        .args(["push", tag])
        .status()
        .await
        .map_err(|e| Error::dependency_failed(format!("failed to spawn docker push: {e}")))?;

    if !status.success() {
        return Err(Error::dependency_failed(format!("push of {tag} failed")));
    }
    Ok(())
}
