//! Per-project role grants (§4.1), backing `auth::rbac::ProjectGrant`. A
//! grant raises a subject's effective role for actions scoped to this
//! project; it never lowers the subject's global role.

#![cfg(feature = "server")]

use super::models::Role;
use crate::error::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn upsert(pool: &PgPool, project_id: Uuid, subject: &str, role: Role) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO project_grants (project_id, subject, role)
           VALUES ($1, $2, $3)
           ON CONFLICT (project_id, subject) DO UPDATE SET role = EXCLUDED.role"#,
    )
    .bind(project_id)
    .bind(subject)
    .bind(role)
    .execute(pool)
    .await
    .map_err(Error::from)?;
    Ok(())
}

pub async fn revoke(pool: &PgPool, project_id: Uuid, subject: &str) -> Result<()> {
    sqlx::query("DELETE FROM project_grants WHERE project_id = $1 AND subject = $2")
        .bind(project_id)
        .bind(subject)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    Ok(())
}

pub async fn find(pool: &PgPool, project_id: Uuid, subject: &str) -> Result<Option<Role>> {
    sqlx::query_scalar::<_, Role>(
        "SELECT role FROM project_grants WHERE project_id = $1 AND subject = $2",
    )
    .bind(project_id)
    .bind(subject)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)
}

pub async fn list_for_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<(String, Role)>> {
    sqlx::query_as::<_, (String, Role)>(
        "SELECT subject, role FROM project_grants WHERE project_id = $1 ORDER BY subject",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

/// The subject's effective role for this project: the higher of their
/// global role and any project-specific grant.
pub async fn effective_role(pool: &PgPool, project_id: Uuid, subject: &str, global_role: Role) -> Result<Role> {
    let grant = find(pool, project_id, subject).await?;
    Ok(grant.map(|r| r.max(global_role)).unwrap_or(global_role))
}
