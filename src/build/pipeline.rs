//! Top-level stage orchestration (§4.5): clone, select builder, build image,
//! generate SBOM, sign, finalize. Any stage failure sets the Release to
//! `failed` with the stage name and a captured log tail; no partial Release
//! is ever `ready`.

use super::{clone, image, registry::RegistryProvider, sbom::SbomGenerator, sign::ImageSigner};
use super::{BUILD_TIMEOUT, CLONE_TIMEOUT, SBOM_TIMEOUT, SIGN_TIMEOUT};
use crate::db::releases;
use crate::error::{Error, Result};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Clone,
    SelectBuilder,
    BuildImage,
    GenerateSbom,
    SignImage,
    Finalize,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Clone => "clone",
            Stage::SelectBuilder => "select_builder",
            Stage::BuildImage => "build_image",
            Stage::GenerateSbom => "generate_sbom",
            Stage::SignImage => "sign_image",
            Stage::Finalize => "finalize",
        }
    }
}

pub struct StageFailure {
    pub stage: Stage,
    pub log_tail: String,
}

pub struct BuildRequest {
    pub release_id: Uuid,
    pub service_id: Uuid,
    pub git_sha: String,
    pub repository: String,
    pub app_path: String,
    pub registry: String,
    pub project_slug: String,
    pub service_slug: String,
    pub builder_identity: String,
}

/// Runs the full pipeline for an already-`building` Release, writing the
/// terminal status (`ready` or `failed`) before returning. Every exit path —
/// including a timeout — cleans up the scratch directory via `ClonedRepo`'s
/// `Drop`.
pub async fn run_build(
    pool: &PgPool,
    req: BuildRequest,
    sbom_gen: &dyn SbomGenerator,
    signer: &dyn ImageSigner,
    registry: &dyn RegistryProvider,
) -> Result<()> {
    crate::metrics::record_build_started();
    match run_stages(pool, &req, sbom_gen, signer, registry).await {
        Ok(()) => {
            crate::metrics::record_build_finished(None);
            Ok(())
        }
        Err(failure) => {
            releases::mark_failed(pool, req.release_id, failure.stage.name(), &failure.log_tail)
                .await?;
            crate::metrics::record_build_finished(Some(failure.stage.name()));
            Err(Error::dependency_failed(format!(
                "build failed at stage {}",
                failure.stage.name()
            )))
        }
    }
}

async fn run_stages(
    pool: &PgPool,
    req: &BuildRequest,
    sbom_gen: &dyn SbomGenerator,
    signer: &dyn ImageSigner,
    registry: &dyn RegistryProvider,
) -> std::result::Result<(), StageFailure> {
    let cloned = with_timeout(Stage::Clone, CLONE_TIMEOUT, clone::clone_at_commit(&req.repository, &req.git_sha)).await?;

    let builder_kind = super::builder::select_builder(cloned.path(), &req.app_path);

    let tag = image::image_tag(&req.registry, &req.project_slug, &req.service_slug, &req.git_sha);
    let built = with_timeout(
        Stage::BuildImage,
        BUILD_TIMEOUT,
        image::build_image(cloned.path(), &req.app_path, &builder_kind, &tag),
    )
    .await?;

    with_timeout(Stage::BuildImage, BUILD_TIMEOUT, super::registry::push(registry, &tag))
        .await
        .map_err(|mut f| {
            f.stage = Stage::BuildImage;
            f
        })?;

    let sbom_ref = with_timeout(Stage::GenerateSbom, SBOM_TIMEOUT, sbom_gen.generate(&built.tag)).await?;

    let signature_ref = with_timeout(Stage::SignImage, SIGN_TIMEOUT, signer.sign(&built.tag, &built.digest)).await?;

    releases::mark_ready(
        pool,
        req.release_id,
        &built.tag,
        &built.digest,
        &sbom_ref,
        &signature_ref,
        &format!("builder:{}", req.builder_identity),
    )
    .await
    .map_err(|e| StageFailure {
        stage: Stage::Finalize,
        log_tail: e.message,
    })?;

    Ok(())
}

async fn with_timeout<T>(
    stage: Stage,
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> std::result::Result<T, StageFailure> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(StageFailure {
            stage,
            log_tail: e.message,
        }),
        Err(_) => Err(StageFailure {
            stage,
            log_tail: format!("stage exceeded its {}s timeout", timeout.as_secs()),
        }),
    }
}
