//! Per-request authorization helper (§4.1, §6): resolves a subject's
//! effective role for a project (global role, raised by any project grant)
//! and checks it against the RBAC table, escalating to the production-
//! approval requirement when the target environment asks for one.

use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::rbac::{authorize, Action};
use crate::auth::Actor;
use crate::db::models::Role;
use crate::db::{environments, project_grants};
use crate::error::Result;

pub async fn effective_role(pool: &PgPool, actor: &Actor, project_id: Uuid) -> Result<Role> {
    project_grants::effective_role(pool, project_id, &actor.subject, actor.role).await
}

/// Authorizes `action` scoped to a project with no environment-specific
/// approval escalation (project/service/dependency CRUD).
pub async fn authorize_project(
    pool: &PgPool,
    actor: &Actor,
    project_id: Uuid,
    action: Action,
) -> Result<Role> {
    let role = effective_role(pool, actor, project_id).await?;
    authorize(role, action, false)?;
    Ok(role)
}

/// Authorizes `action` scoped to a specific environment, honoring its
/// `requires_approval` flag for `TriggerDeploy`/`ApproveDeploy` (§4.1).
pub async fn authorize_environment(
    pool: &PgPool,
    actor: &Actor,
    project_id: Uuid,
    environment_id: Uuid,
    action: Action,
) -> Result<Role> {
    let role = effective_role(pool, actor, project_id).await?;
    let env = environments::get(pool, environment_id).await?;
    authorize(role, action, env.requires_approval)?;
    Ok(role)
}
