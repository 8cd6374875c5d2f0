//! Project CRUD and Environment CRUD (§3, §6: `/projects`,
//! `/projects/{slug}/environments`).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::AppState;
use crate::auth::rbac::Action;
use crate::auth::Actor;
use crate::db::audit;
use crate::db::models::{Environment, Project};
use crate::db::pagination::{Page, Pagination};
use crate::db::{environments, projects};
use crate::error::{Error, Result};

use super::authz::{authorize_environment, authorize_project};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub slug: String,
    pub name: String,
}

pub async fn list_projects(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<Project>>> {
    let (limit, offset) = pagination.normalized();
    let (rows, total) = projects::list(&state.pool, limit, offset).await?;
    Ok(Json(Page::new(rows, limit, offset, total)))
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>)> {
    if actor.role < crate::db::models::Role::Developer {
        return Err(Error::forbidden("creating a project requires at least Developer"));
    }
    let owner_user_id = actor_uuid(&actor)?;
    let project = projects::create(&state.pool, &req.slug, &req.name, owner_user_id).await?;

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &actor.subject,
            action: "project.create",
            entity_type: "project",
            entity_id: Some(project.id),
            details: serde_json::json!({ "slug": project.slug }),
            ip: None,
            user_agent: None,
        })
        .await;

    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_project(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(slug): Path<String>,
) -> Result<Json<Project>> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    authorize_project(&state.pool, &actor, project.id, Action::ReadProject).await?;
    Ok(Json(project))
}

#[derive(Debug, Deserialize)]
pub struct RenameProjectRequest {
    pub name: String,
}

pub async fn rename_project(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(slug): Path<String>,
    Json(req): Json<RenameProjectRequest>,
) -> Result<Json<Project>> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    authorize_project(&state.pool, &actor, project.id, Action::WriteProject).await?;
    let updated = projects::rename(&state.pool, project.id, &req.name).await?;

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &actor.subject,
            action: "project.rename",
            entity_type: "project",
            entity_id: Some(project.id),
            details: serde_json::json!({ "name": req.name }),
            ip: None,
            user_agent: None,
        })
        .await;

    Ok(Json(updated))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(slug): Path<String>,
) -> Result<StatusCode> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    authorize_project(&state.pool, &actor, project.id, Action::DeleteProject).await?;
    projects::delete(&state.pool, project.id).await?;

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &actor.subject,
            action: "project.delete",
            entity_type: "project",
            entity_id: Some(project.id),
            details: serde_json::json!({ "slug": slug }),
            ip: None,
            user_agent: None,
        })
        .await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct EnvironmentList {
    pub data: Vec<Environment>,
}

pub async fn list_environments(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(slug): Path<String>,
) -> Result<Json<EnvironmentList>> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    authorize_project(&state.pool, &actor, project.id, Action::ReadProject).await?;
    let data = environments::list_for_project(&state.pool, project.id).await?;
    Ok(Json(EnvironmentList { data }))
}

#[derive(Debug, Deserialize)]
pub struct CreateEnvironmentRequest {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub auto_deploy_branch: Option<String>,
    #[serde(default)]
    pub requires_approval: bool,
}

pub async fn create_environment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(slug): Path<String>,
    Json(req): Json<CreateEnvironmentRequest>,
) -> Result<(StatusCode, Json<Environment>)> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    authorize_project(&state.pool, &actor, project.id, Action::WriteProject).await?;

    let environment = environments::create(
        &state.pool,
        project.id,
        &req.name,
        &req.namespace,
        req.auto_deploy_branch.as_deref(),
        req.requires_approval,
    )
    .await?;

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &actor.subject,
            action: "environment.create",
            entity_type: "environment",
            entity_id: Some(environment.id),
            details: serde_json::json!({ "name": environment.name }),
            ip: None,
            user_agent: None,
        })
        .await;

    Ok((StatusCode::CREATED, Json(environment)))
}

pub async fn get_environment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((slug, name)): Path<(String, String)>,
) -> Result<Json<Environment>> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    authorize_project(&state.pool, &actor, project.id, Action::ReadProject).await?;
    let environment = environments::find_by_name(&state.pool, project.id, &name).await?;
    Ok(Json(environment))
}

pub async fn delete_environment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((slug, name)): Path<(String, String)>,
) -> Result<StatusCode> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    let environment = environments::find_by_name(&state.pool, project.id, &name).await?;
    authorize_environment(
        &state.pool,
        &actor,
        project.id,
        environment.id,
        Action::WriteProject,
    )
    .await?;
    environments::delete(&state.pool, environment.id).await?;

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &actor.subject,
            action: "environment.delete",
            entity_type: "environment",
            entity_id: Some(environment.id),
            details: serde_json::json!({ "name": name }),
            ip: None,
            user_agent: None,
        })
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Identity subjects are opaque strings (user ids or service-account ids);
/// project ownership wants a `Uuid`. Local and federated subjects are both
/// minted as UUIDs upstream, so this just parses rather than minting one.
fn actor_uuid(actor: &Actor) -> Result<Uuid> {
    Uuid::parse_str(&actor.subject)
        .map_err(|_| Error::validation("actor subject is not a valid project owner id"))
}
