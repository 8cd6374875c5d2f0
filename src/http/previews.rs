//! Preview-environment lifecycle (§6: `/projects/{slug}/previews`).
//! Preview creation/teardown normally arrives via `/webhooks/{provider}`;
//! this surface lets an operator drive the same lifecycle directly for a
//! project that has no webhook configured yet, or to force-close one.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::authz::authorize_project;
use super::state::AppState;
use crate::auth::rbac::Action;
use crate::auth::Actor;
use crate::db::models::PreviewEnvironment;
use crate::db::{previews, projects, services};
use crate::error::{Error, Result};
use crate::webhook::router::{PullRequestAction, PullRequestEvent};

#[derive(Debug, Serialize)]
pub struct PreviewList {
    pub data: Vec<PreviewEnvironment>,
}

pub async fn list_previews(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(slug): Path<String>,
) -> Result<Json<PreviewList>> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    authorize_project(&state.pool, &actor, project.id, Action::ReadProject).await?;
    let data = previews::list_for_project(&state.pool, project.id).await?;
    Ok(Json(PreviewList { data }))
}

#[derive(Debug, Deserialize)]
pub struct OpenPreviewRequest {
    pub pr_number: i32,
    pub head_sha: String,
    #[serde(default)]
    pub head_ref: String,
}

#[derive(Debug, Serialize)]
pub struct PreviewAccepted {
    pub preview_id: Uuid,
}

/// `POST /projects/{slug}/previews`: synthesizes a pull-request-opened
/// event for the project's repository and routes it through
/// `PreviewController::handle_event`, the same lifecycle a `pull_request`
/// webhook triggers (§4.8).
pub async fn open_preview(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(slug): Path<String>,
    Json(req): Json<OpenPreviewRequest>,
) -> Result<(StatusCode, Json<PreviewAccepted>)> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    authorize_project(&state.pool, &actor, project.id, Action::TriggerDeploy).await?;

    let repository = project_repository(&state, project.id).await?;
    let event = PullRequestEvent {
        action: PullRequestAction::Opened,
        number: req.pr_number,
        repository,
        head_sha: req.head_sha,
        head_ref: req.head_ref,
    };
    let preview_id = state.previews.handle_event(event).await?;

    Ok((StatusCode::ACCEPTED, Json(PreviewAccepted { preview_id })))
}

/// `DELETE /projects/{slug}/previews/{pr_number}`: synthesizes a
/// pull-request-closed event, tearing the preview down the same way a
/// merged/closed PR webhook does.
pub async fn close_preview(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((slug, pr_number)): Path<(String, i32)>,
) -> Result<StatusCode> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    authorize_project(&state.pool, &actor, project.id, Action::TriggerDeploy).await?;

    let preview = previews::find_by_pr(&state.pool, project.id, pr_number)
        .await?
        .ok_or_else(|| Error::not_found("no preview environment for this pull request"))?;

    let repository = project_repository(&state, project.id).await?;
    let event = PullRequestEvent {
        action: PullRequestAction::Closed,
        number: pr_number,
        repository,
        head_sha: preview.commit_sha.clone(),
        head_ref: String::new(),
    };
    state.previews.handle_event(event).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Previews are keyed by `(project, pr_number)`, but `PreviewController`
/// resolves a project from the *repository* named in the event, since that
/// is what a real webhook payload carries. Driving the lifecycle directly
/// from a project-scoped endpoint needs the inverse lookup: any service
/// registered to this project names the shared repository.
async fn project_repository(state: &AppState, project_id: Uuid) -> Result<String> {
    services::list_for_project(&state.pool, project_id)
        .await?
        .into_iter()
        .next()
        .map(|s| s.git_repository)
        .ok_or_else(|| Error::validation("project has no registered services to resolve a repository from"))
}
