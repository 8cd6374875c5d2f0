//! DeploymentGroup lifecycle (§6: `/projects/{slug}/deployments`,
//! `…/{group}`, `…/{group}/rollback`), plus the webhook-approval bridge for
//! environments with `requires_approval` set.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::authz::authorize_environment;
use super::state::AppState;
use crate::auth::rbac::Action;
use crate::auth::Actor;
use crate::db::models::{Deployment, DeploymentGroup, GroupStatus, Trigger};
use crate::db::pagination::{Page, Pagination};
use crate::db::{audit, deployment_groups, deployments, environments, projects};
use crate::error::{Error, Result};
use crate::orchestrator::CreateGroupRequest;

pub async fn list_deployment_groups(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(slug): Path<String>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<DeploymentGroup>>> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    super::authz::authorize_project(&state.pool, &actor, project.id, Action::ReadProject).await?;
    let (limit, offset) = pagination.normalized();
    let (rows, total) = deployment_groups::list_for_project(&state.pool, project.id, limit, offset).await?;
    Ok(Json(Page::new(rows, limit, offset, total)))
}

#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    pub environment: String,
    #[serde(default)]
    pub service_ids: Option<Vec<Uuid>>,
    pub commit_sha: String,
    #[serde(default)]
    pub pr_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeploymentGroupAccepted {
    pub group_id: Uuid,
    pub status: GroupStatus,
}

/// `POST /projects/{slug}/deployments` (§6, §4.6): creates the group and
/// its layered deployments synchronously, then dispatches execution in the
/// background — the caller gets a group id back immediately and polls
/// `GET .../{group}` for status. An environment with `requires_approval`
/// stops here at `Pending`, awaiting `approve_pending_group`.
pub async fn create_deployment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(slug): Path<String>,
    Json(req): Json<CreateDeploymentRequest>,
) -> Result<(StatusCode, Json<DeploymentGroupAccepted>)> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    let environment = environments::find_by_name(&state.pool, project.id, &req.environment).await?;
    authorize_environment(
        &state.pool,
        &actor,
        project.id,
        environment.id,
        Action::TriggerDeploy,
    )
    .await?;

    let (group, layers) = state
        .orchestrator
        .create_group(CreateGroupRequest {
            project_id: project.id,
            environment_id: environment.id,
            service_ids: req.service_ids.clone(),
            trigger: Trigger::Manual,
            commit_sha: req.commit_sha.clone(),
            pr_url: req.pr_url.clone(),
            changed_paths: None,
        })
        .await?;

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &actor.subject,
            action: "deployment_group.create",
            entity_type: "deployment_group",
            entity_id: Some(group.id),
            details: serde_json::json!({ "environment": req.environment, "commit_sha": req.commit_sha }),
            ip: None,
            user_agent: None,
        })
        .await;

    if environment.requires_approval {
        return Ok((
            StatusCode::ACCEPTED,
            Json(DeploymentGroupAccepted {
                group_id: group.id,
                status: group.status,
            }),
        ));
    }

    let group_id = group.id;
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run_group(group, layers, CancellationToken::new()).await {
            tracing::warn!(group_id = %group_id, error = %e, "deployment group run failed to dispatch");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(DeploymentGroupAccepted {
            group_id,
            status: GroupStatus::Pending,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct DeploymentGroupDetail {
    #[serde(flatten)]
    pub group: DeploymentGroup,
    pub deployments: Vec<Deployment>,
}

pub async fn get_deployment_group(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((slug, group_id)): Path<(String, Uuid)>,
) -> Result<Json<DeploymentGroupDetail>> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    super::authz::authorize_project(&state.pool, &actor, project.id, Action::ReadProject).await?;
    let group = deployment_groups::get(&state.pool, group_id).await?;
    if group.project_id != project.id {
        return Err(Error::not_found("deployment group not found"));
    }
    let deployments = deployments::list_for_group(&state.pool, group_id).await?;
    Ok(Json(DeploymentGroupDetail { group, deployments }))
}

/// `POST /projects/{slug}/deployments/{group}/rollback` (§6, §4.7):
/// escalates to the environment's approval requirement the same way a
/// forward deploy does, since rollback is itself a production change.
pub async fn rollback_deployment_group(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((slug, group_id)): Path<(String, Uuid)>,
) -> Result<StatusCode> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    let group = deployment_groups::get(&state.pool, group_id).await?;
    if group.project_id != project.id {
        return Err(Error::not_found("deployment group not found"));
    }
    authorize_environment(
        &state.pool,
        &actor,
        project.id,
        group.environment_id,
        Action::RollbackDeploy,
    )
    .await?;

    state.orchestrator.rollback_group_by_id(group_id).await?;

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &actor.subject,
            action: "deployment_group.rollback",
            entity_type: "deployment_group",
            entity_id: Some(group_id),
            details: serde_json::json!({}),
            ip: None,
            user_agent: None,
        })
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// `POST /projects/{slug}/deployments/{group}/approve`: releases a group
/// parked at `Pending` by an approval-requiring environment. Not in the
/// spec's literal endpoint table but required to make `requires_approval`
/// reachable over HTTP — mounted alongside rollback under the same
/// resource.
pub async fn approve_deployment_group(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((slug, group_id)): Path<(String, Uuid)>,
) -> Result<StatusCode> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    let group = deployment_groups::get(&state.pool, group_id).await?;
    if group.project_id != project.id {
        return Err(Error::not_found("deployment group not found"));
    }
    authorize_environment(
        &state.pool,
        &actor,
        project.id,
        group.environment_id,
        Action::ApproveDeploy,
    )
    .await?;

    crate::webhook::router::approve_pending_group(&state.pool, Arc::clone(&state.orchestrator), group_id).await?;

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &actor.subject,
            action: "deployment_group.approve",
            entity_type: "deployment_group",
            entity_id: Some(group_id),
            details: serde_json::json!({}),
            ip: None,
            user_agent: None,
        })
        .await;

    Ok(StatusCode::NO_CONTENT)
}
