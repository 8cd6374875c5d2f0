//! Environment CRUD (§3: unique `(project, name)`).

#![cfg(feature = "server")]

use super::models::Environment;
use crate::error::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn create(
    pool: &PgPool,
    project_id: Uuid,
    name: &str,
    namespace: &str,
    auto_deploy_branch: Option<&str>,
    requires_approval: bool,
) -> Result<Environment> {
    sqlx::query_as::<_, Environment>(
        r#"INSERT INTO environments
           (id, project_id, name, namespace, auto_deploy_branch, auto_deploy_enabled, requires_approval, created_at, updated_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $4 IS NOT NULL, $5, now(), now())
           RETURNING id, project_id, name, namespace, auto_deploy_branch, auto_deploy_enabled,
                     requires_approval, created_at, updated_at"#,
    )
    .bind(project_id)
    .bind(name)
    .bind(namespace)
    .bind(auto_deploy_branch)
    .bind(requires_approval)
    .fetch_one(pool)
    .await
    .map_err(Error::from)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Environment> {
    sqlx::query_as::<_, Environment>(
        "SELECT id, project_id, name, namespace, auto_deploy_branch, auto_deploy_enabled,
                requires_approval, created_at, updated_at
         FROM environments WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found("environment not found"))
}

pub async fn find_by_name(pool: &PgPool, project_id: Uuid, name: &str) -> Result<Environment> {
    sqlx::query_as::<_, Environment>(
        "SELECT id, project_id, name, namespace, auto_deploy_branch, auto_deploy_enabled,
                requires_approval, created_at, updated_at
         FROM environments WHERE project_id = $1 AND name = $2",
    )
    .bind(project_id)
    .bind(name)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found(format!("environment '{name}' not found")))
}

pub async fn list_for_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<Environment>> {
    sqlx::query_as::<_, Environment>(
        "SELECT id, project_id, name, namespace, auto_deploy_branch, auto_deploy_enabled,
                requires_approval, created_at, updated_at
         FROM environments WHERE project_id = $1 ORDER BY created_at",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

/// Environments matching `(repo's tracked branch, auto_deploy_enabled)`,
/// consumed by the webhook router (§4.9) to decide which groups to enqueue.
pub async fn list_auto_deploy_for_branch(
    pool: &PgPool,
    project_id: Uuid,
    branch: &str,
) -> Result<Vec<Environment>> {
    sqlx::query_as::<_, Environment>(
        "SELECT id, project_id, name, namespace, auto_deploy_branch, auto_deploy_enabled,
                requires_approval, created_at, updated_at
         FROM environments
         WHERE project_id = $1 AND auto_deploy_enabled = true AND auto_deploy_branch = $2",
    )
    .bind(project_id)
    .bind(branch)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM environments WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found("environment not found"));
    }
    Ok(())
}
