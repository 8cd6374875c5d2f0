//! `CreateGroup` and group execution (§4.6): select -> layer -> persist ->
//! execute -> rollback -> cancel. Grounded on the teacher's
//! `run_project_controller_loop` background-loop shape, generalized from a
//! single global loop to one serialized executor per `(project,
//! environment)` key via `worker_pool::GroupSerializer`.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::graph;
use super::state_machine;
use super::worker_pool::{GroupKey, GroupSerializer};
use crate::build::coalesce::{BuildCoalescer, Coalesced};
use crate::build::registry::RegistryProvider;
use crate::build::sbom::SbomGenerator;
use crate::build::sign::ImageSigner;
use crate::build::{BuildRequest, run_build};
use crate::db::models::{DeployStrategy, DeploymentGroup, DeploymentStatus, GroupStatus, Strategy, Trigger};
use crate::db::{dependencies, deployment_groups, deployments, environments, projects, releases, services};
use crate::error::{Error, Result};
use crate::reconciler::{DeploymentBackend, ReconcilePhase};

pub struct CreateGroupRequest {
    pub project_id: Uuid,
    pub environment_id: Uuid,
    pub service_ids: Option<Vec<Uuid>>,
    pub trigger: Trigger,
    pub commit_sha: String,
    pub pr_url: Option<String>,
    /// Changed file paths, present for webhook-triggered groups; used to
    /// intersect the full project's services down to the affected set
    /// (§4.6 step 1, §4.9).
    pub changed_paths: Option<Vec<String>>,
}

pub struct Orchestrator {
    pool: sqlx::PgPool,
    backend: Arc<dyn DeploymentBackend>,
    sbom_gen: Arc<dyn SbomGenerator>,
    signer: Arc<dyn ImageSigner>,
    registry: Arc<dyn RegistryProvider>,
    coalescer: Arc<BuildCoalescer>,
    serializer: Arc<GroupSerializer>,
    build_registry_url: String,
}

impl Orchestrator {
    pub fn new(
        pool: sqlx::PgPool,
        backend: Arc<dyn DeploymentBackend>,
        sbom_gen: Arc<dyn SbomGenerator>,
        signer: Arc<dyn ImageSigner>,
        registry: Arc<dyn RegistryProvider>,
        build_registry_url: String,
    ) -> Self {
        Self {
            pool,
            backend,
            sbom_gen,
            signer,
            registry,
            coalescer: Arc::new(BuildCoalescer::new()),
            serializer: Arc::new(GroupSerializer::default()),
            build_registry_url,
        }
    }

    /// Selects services per §4.6 step 1: explicit list, full project, or
    /// (webhook) the set whose `app_path` prefixes a changed file, widened
    /// to every service if a shared directory was touched.
    async fn select_services(&self, req: &CreateGroupRequest) -> Result<Vec<Uuid>> {
        let all = services::list_for_project(&self.pool, req.project_id).await?;

        if let Some(ref explicit) = req.service_ids {
            let all_ids: Vec<Uuid> = all.iter().map(|s| s.id).collect();
            graph::validate_selection(explicit, &all_ids)?;
            return Ok(explicit.clone());
        }

        if let Some(ref changed) = req.changed_paths {
            let shared_touched = changed
                .iter()
                .any(|p| p.starts_with("packages/") || p.starts_with("libs/") || p.starts_with("shared/"));
            if shared_touched {
                return Ok(all.iter().map(|s| s.id).collect());
            }
            let affected: Vec<Uuid> = all
                .iter()
                .filter(|svc| changed.iter().any(|p| p.starts_with(&svc.app_path)))
                .map(|s| s.id)
                .collect();
            return Ok(affected);
        }

        Ok(all.iter().map(|s| s.id).collect())
    }

    /// Runs §4.6 steps 1-3: select, layer, persist. Does not dispatch
    /// execution — call `execute` once the caller holds the per-`(project,
    /// environment)` serialization guard.
    pub async fn create_group(&self, req: CreateGroupRequest) -> Result<(DeploymentGroup, graph::Layers)> {
        let selected = self.select_services(&req).await?;
        if selected.is_empty() {
            return Err(Error::validation("group selection is empty"));
        }

        let edges = dependencies::list_for_project(&self.pool, req.project_id).await?;
        let layers = graph::layer(&selected, &edges)?;

        let group = crate::db::with_tx(&self.pool, |mut tx| {
            let req = &req;
            let layers = &layers;
            Box::pin(async move {
                let group = deployment_groups::create(
                    &mut tx,
                    req.project_id,
                    req.environment_id,
                    req.trigger,
                    &req.commit_sha,
                    req.pr_url.as_deref(),
                    Strategy::DependencyOrdered,
                )
                .await?;

                for (layer_index, layer) in layers.iter().enumerate() {
                    for service_id in layer {
                        deployments::create(
                            &mut tx,
                            deployments::NewDeployment {
                                service_id: *service_id,
                                environment_id: req.environment_id,
                                deployment_group_id: Some(group.id),
                                replica_count: 1,
                                strategy: DeployStrategy::Rolling,
                                deploy_order: layer_index as i32,
                            },
                        )
                        .await?;
                    }
                }

                Ok((tx, group))
            })
        })
        .await?;

        Ok((group, layers))
    }

    /// Acquires the per-`(project, environment)` serialization guard, then
    /// runs `create_group` followed immediately by `execute`. §4.6's
    /// "groups serialize within a pair" rule means a second caller for the
    /// same pair blocks here until this group reaches a terminal status.
    pub async fn create_and_run(self: &Arc<Self>, req: CreateGroupRequest, cancel: CancellationToken) -> Result<Uuid> {
        let (group, layers) = self.create_group(req).await?;
        self.run_group(group, layers, cancel).await
    }

    /// Dispatches an already-persisted group (§4.9: webhook-enqueued groups
    /// are created synchronously so the caller gets a group id back, then
    /// dispatched in the background). Acquires the same per-`(project,
    /// environment)` guard `create_and_run` would.
    pub async fn run_group(
        self: &Arc<Self>,
        group: DeploymentGroup,
        layers: graph::Layers,
        cancel: CancellationToken,
    ) -> Result<Uuid> {
        let key = GroupKey {
            project_id: group.project_id,
            environment_id: group.environment_id,
        };
        let _guard = self.serializer.acquire(key).await;

        crate::metrics::record_deployment_group_created(trigger_label(group.trigger));
        deployment_groups::set_status(&self.pool, group.id, GroupStatus::InProgress).await?;

        let outcome = self.execute(&group, &layers, &cancel).await;
        match outcome {
            Ok(()) => {
                deployment_groups::set_status(&self.pool, group.id, GroupStatus::Succeeded).await?;
                crate::metrics::record_deployment_group_finished(true);
            }
            Err(ExecuteOutcome::Cancelled) => {
                deployment_groups::set_status(&self.pool, group.id, GroupStatus::Failed).await?;
                crate::metrics::record_deployment_group_finished(false);
            }
            Err(ExecuteOutcome::Failed) => {
                self.rollback_group(&group).await;
                deployment_groups::set_status(&self.pool, group.id, GroupStatus::Failed).await?;
                crate::metrics::record_deployment_group_finished(false);
            }
        }

        Ok(group.id)
    }

    /// §4.6 step 4: dispatch each layer's deployments in parallel; a layer
    /// completes when every Deployment in it is `healthy`.
    async fn execute(
        &self,
        group: &DeploymentGroup,
        layers: &graph::Layers,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), ExecuteOutcome> {
        for layer in layers {
            if cancel.is_cancelled() {
                info!(group_id = %group.id, "group cancelled before dispatching a layer");
                return Err(ExecuteOutcome::Cancelled);
            }

            let all_deployments = deployments::list_for_group(&self.pool, group.id)
                .await
                .map_err(|_| ExecuteOutcome::Failed)?;
            let layer_deployments: Vec<_> = all_deployments
                .into_iter()
                .filter(|d| layer.contains(&d.service_id))
                .collect();

            let futures = layer_deployments.into_iter().map(|deployment| {
                let group = group.clone();
                let cancel = cancel.clone();
                async move { self.run_deployment(&group, deployment, &cancel).await }
            });

            let results = join_all(futures).await;
            if cancel.is_cancelled() {
                return Err(ExecuteOutcome::Cancelled);
            }
            if results.iter().any(|r| r.is_err()) {
                warn!(group_id = %group.id, "a deployment in this layer failed, group transitions to failed");
                return Err(ExecuteOutcome::Failed);
            }
        }
        Ok(())
    }

    /// Per-Deployment execution (§4.6): build (C5) then reconcile (C7),
    /// waiting for health. Coalesces builds for identical `(service,
    /// git_sha)` so concurrent layers across groups never double-build.
    async fn run_deployment(
        &self,
        group: &DeploymentGroup,
        deployment: crate::db::models::Deployment,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let service = services::get(&self.pool, deployment.service_id).await?;
        let project = projects::get(&self.pool, group.project_id).await?;
        let _environment = environments::get(&self.pool, group.environment_id).await?;

        deployments::set_status(&self.pool, deployment.id, DeploymentStatus::Building, None).await?;
        let release_id = self
            .ensure_release(&service, &group.commit_sha, &project)
            .await?;
        deployments::set_release(&self.pool, deployment.id, release_id).await?;

        let mut deployment = deployments::set_status(
            &self.pool,
            deployment.id,
            DeploymentStatus::Deploying,
            None,
        )
        .await?;

        let mut phase = ReconcilePhase::NotStarted;
        loop {
            if cancel.is_cancelled() {
                self.backend.stop_polling(&deployment).await.ok();
                return Err(Error::transient("deployment cancelled"));
            }

            let outcome = self
                .backend
                .reconcile(&deployment, &service, &project, phase)
                .await
                .map_err(|e| Error::dependency_failed(e.to_string()))?;

            state_machine::validate_transition(deployment.status, outcome.status)?;
            deployment = deployments::set_status(&self.pool, deployment.id, outcome.status, outcome.note.as_deref())
                .await?;
            if let Some(digest) = outcome.observed_image_digest {
                deployments::set_observed_digest(&self.pool, deployment.id, &digest).await?;
            }
            phase = outcome.phase;

            match deployment.status {
                DeploymentStatus::Healthy => return Ok(()),
                DeploymentStatus::Failed | DeploymentStatus::Degraded => {
                    return Err(Error::dependency_failed("deployment did not reach healthy"));
                }
                _ => {
                    if phase == ReconcilePhase::Completed {
                        return Ok(());
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                }
            }
        }
    }

    /// §4.5 idempotence: an existing Release for `(service, sha)` is reused
    /// rather than rebuilt; concurrent requests for a new one coalesce onto
    /// a single leader build.
    async fn ensure_release(
        &self,
        service: &crate::db::models::Service,
        git_sha: &str,
        project: &crate::db::models::Project,
    ) -> Result<Uuid> {
        if let Some(release) = releases::find_by_service_sha(&self.pool, service.id, git_sha).await? {
            if release.is_well_formed() {
                return Ok(release.id);
            }
        }

        let key = crate::build::coalesce::BuildKey {
            service_id: service.id,
            git_sha: git_sha.to_string(),
        };

        match self.coalescer.join_or_start(key.clone()).await {
            Coalesced::Leader(notify) => {
                let release = crate::db::with_tx(&self.pool, |mut tx| {
                    let git_sha = git_sha.to_string();
                    Box::pin(async move {
                        let release = releases::create_building(&mut tx, service.id, &git_sha, "enclii-orchestrator").await?;
                        Ok((tx, release))
                    })
                })
                .await?;

                let req = BuildRequest {
                    release_id: release.id,
                    service_id: service.id,
                    git_sha: git_sha.to_string(),
                    repository: service.git_repository.clone(),
                    app_path: service.app_path.clone(),
                    registry: self.build_registry_url.clone(),
                    project_slug: project.slug.clone(),
                    service_slug: service.name.clone(),
                    builder_identity: "enclii-orchestrator".to_string(),
                };

                let result = run_build(
                    &self.pool,
                    req,
                    self.sbom_gen.as_ref(),
                    self.signer.as_ref(),
                    self.registry.as_ref(),
                )
                .await;
                self.coalescer.finish(&key, &notify).await;
                result?;
                Ok(release.id)
            }
            Coalesced::Follower(notify) => {
                notify.notified().await;
                let release = releases::find_by_service_sha(&self.pool, service.id, git_sha)
                    .await?
                    .ok_or_else(|| Error::dependency_failed("build finished but no release was recorded"))?;
                if !release.is_well_formed() {
                    return Err(Error::dependency_failed("the coalesced build failed"));
                }
                Ok(release.id)
            }
        }
    }

    /// Manually triggers (or reuses, per §4.5 idempotence) a build for
    /// `service` at `git_sha`, outside of any deployment group (§6: `POST
    /// /services/{id}/builds`). Returns as soon as the release row exists
    /// in `building` (or an already-settled release is found); the build
    /// itself then runs in the background on this same pipeline, using the
    /// orchestrator's own configured providers rather than one-off copies.
    pub async fn trigger_build(
        self: &Arc<Self>,
        service: &crate::db::models::Service,
        git_sha: &str,
        project: &crate::db::models::Project,
    ) -> Result<Uuid> {
        if let Some(release) = releases::find_by_service_sha(&self.pool, service.id, git_sha).await? {
            let still_live = release.status == crate::db::models::ReleaseStatus::Building
                || (release.status == crate::db::models::ReleaseStatus::Ready && release.is_well_formed());
            if still_live {
                return Ok(release.id);
            }
        }

        let release = crate::db::with_tx(&self.pool, |mut tx| {
            let git_sha = git_sha.to_string();
            Box::pin(async move {
                let release = releases::create_building(&mut tx, service.id, &git_sha, "manual-trigger").await?;
                Ok((tx, release))
            })
        })
        .await?;
        let release_id = release.id;

        let this = Arc::clone(self);
        let service = service.clone();
        let project = project.clone();
        let git_sha = git_sha.to_string();
        tokio::spawn(async move {
            let req = BuildRequest {
                release_id,
                service_id: service.id,
                git_sha,
                repository: service.git_repository.clone(),
                app_path: service.app_path.clone(),
                registry: this.build_registry_url.clone(),
                project_slug: project.slug.clone(),
                service_slug: service.name.clone(),
                builder_identity: "manual-trigger".to_string(),
            };
            if let Err(e) = run_build(&this.pool, req, this.sbom_gen.as_ref(), this.signer.as_ref(), this.registry.as_ref()).await {
                error!(release_id = %release_id, error = %e, "manually-triggered build failed");
            }
        });

        Ok(release_id)
    }

    /// Rolls back an already-dispatched group on demand (§6: `POST
    /// /projects/{slug}/deployments/{group}/rollback`), independent of the
    /// automatic rollback `run_group` performs when a group fails on its
    /// own. Refuses a group that is still in progress — `run_group` already
    /// owns that group's serialization guard until it reaches a terminal
    /// status.
    pub async fn rollback_group_by_id(self: &Arc<Self>, group_id: Uuid) -> Result<()> {
        let group = deployment_groups::get(&self.pool, group_id).await?;
        if group.status == GroupStatus::InProgress || group.status == GroupStatus::Pending {
            return Err(Error::conflict("cannot roll back a group that is still in progress"));
        }
        if group.status == GroupStatus::RolledBack {
            return Ok(());
        }

        let key = GroupKey {
            project_id: group.project_id,
            environment_id: group.environment_id,
        };
        let _guard = self.serializer.acquire(key).await;

        self.rollback_group(&group).await;
        deployment_groups::set_status(&self.pool, group.id, GroupStatus::RolledBack).await?;
        Ok(())
    }

    /// §4.6 group rollback: traverse completed Deployments in reverse
    /// `deploy_order`, restoring each service's previous known-good Release.
    /// Rollback failures are recorded per-service rather than reverting the
    /// group's terminal status.
    async fn rollback_group(&self, group: &DeploymentGroup) {
        let mut completed = match deployments::list_for_group(&self.pool, group.id).await {
            Ok(list) => list,
            Err(e) => {
                error!(group_id = %group.id, error = %e, "failed to list deployments for rollback");
                return;
            }
        };
        completed.sort_by(|a, b| b.deploy_order.cmp(&a.deploy_order));

        for deployment in completed {
            if !state_machine::is_rollback_target(deployment.status) {
                continue;
            }
            let target = deployments::last_healthy_excluding(
                &self.pool,
                deployment.service_id,
                deployment.environment_id,
                deployment.id,
            )
            .await
            .ok()
            .flatten();

            let target_release_id = target.and_then(|d| d.release_id);
            if let Err(e) = self.backend.rollback(&deployment, target_release_id).await {
                warn!(deployment_id = %deployment.id, error = %e, "rollback failed for this deployment");
                let _ = deployments::set_status(
                    &self.pool,
                    deployment.id,
                    DeploymentStatus::Failed,
                    Some(&format!("rollback failed: {e}")),
                )
                .await;
                continue;
            }
            let _ = deployments::set_status(&self.pool, deployment.id, DeploymentStatus::RolledBack, None).await;
        }
    }
}

enum ExecuteOutcome {
    Failed,
    Cancelled,
}

fn trigger_label(trigger: Trigger) -> &'static str {
    match trigger {
        Trigger::Webhook => "webhook",
        Trigger::Manual => "manual",
        Trigger::Preview => "preview",
    }
}
