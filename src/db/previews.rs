//! PreviewEnvironment persistence (§3, §4.8). Unique `(project, pr_number)`
//! and unique `preview_subdomain`, enforced by database unique indexes.

#![cfg(feature = "server")]

use super::models::{PreviewEnvironment, PreviewStatus};
use crate::error::{Error, Result};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub async fn create(
    tx: &mut Transaction<'_, Postgres>,
    project_id: Uuid,
    pr_number: i32,
    preview_subdomain: &str,
    commit_sha: &str,
    environment_id: Uuid,
) -> Result<PreviewEnvironment> {
    sqlx::query_as::<_, PreviewEnvironment>(
        r#"INSERT INTO preview_environments
           (id, project_id, pr_number, preview_subdomain, status, commit_sha, environment_id,
            deployment_group_id, last_accessed_at, created_at, updated_at)
           VALUES (gen_random_uuid(), $1, $2, $3, 'Pending', $4, $5, NULL, now(), now(), now())
           RETURNING id, project_id, pr_number, preview_subdomain, status, commit_sha,
                     environment_id, deployment_group_id, last_accessed_at, created_at, updated_at"#,
    )
    .bind(project_id)
    .bind(pr_number)
    .bind(preview_subdomain)
    .bind(commit_sha)
    .bind(environment_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(Error::from)
}

pub async fn find_by_pr(
    pool: &PgPool,
    project_id: Uuid,
    pr_number: i32,
) -> Result<Option<PreviewEnvironment>> {
    sqlx::query_as::<_, PreviewEnvironment>(
        "SELECT id, project_id, pr_number, preview_subdomain, status, commit_sha,
                environment_id, deployment_group_id, last_accessed_at, created_at, updated_at
         FROM preview_environments WHERE project_id = $1 AND pr_number = $2",
    )
    .bind(project_id)
    .bind(pr_number)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<PreviewEnvironment> {
    sqlx::query_as::<_, PreviewEnvironment>(
        "SELECT id, project_id, pr_number, preview_subdomain, status, commit_sha,
                environment_id, deployment_group_id, last_accessed_at, created_at, updated_at
         FROM preview_environments WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found("preview environment not found"))
}

pub async fn set_status(
    pool: &PgPool,
    id: Uuid,
    status: PreviewStatus,
) -> Result<PreviewEnvironment> {
    sqlx::query_as::<_, PreviewEnvironment>(
        r#"UPDATE preview_environments SET status = $2, updated_at = now() WHERE id = $1
           RETURNING id, project_id, pr_number, preview_subdomain, status, commit_sha,
                     environment_id, deployment_group_id, last_accessed_at, created_at, updated_at"#,
    )
    .bind(id)
    .bind(status)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found("preview environment not found"))
}

pub async fn set_commit(pool: &PgPool, id: Uuid, commit_sha: &str) -> Result<()> {
    sqlx::query("UPDATE preview_environments SET commit_sha = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(commit_sha)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    Ok(())
}

pub async fn set_deployment_group(pool: &PgPool, id: Uuid, deployment_group_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE preview_environments SET deployment_group_id = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(deployment_group_id)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    Ok(())
}

pub async fn list_for_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<PreviewEnvironment>> {
    sqlx::query_as::<_, PreviewEnvironment>(
        "SELECT id, project_id, pr_number, preview_subdomain, status, commit_sha,
                environment_id, deployment_group_id, last_accessed_at, created_at, updated_at
         FROM preview_environments WHERE project_id = $1 ORDER BY created_at DESC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

pub async fn touch_accessed(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE preview_environments SET last_accessed_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    Ok(())
}

/// Previews idle for longer than `auto_sleep_after`, candidates for the
/// idle-sleep sweeper (§4.8).
pub async fn list_idle_active(
    pool: &PgPool,
    auto_sleep_after_secs: i64,
) -> Result<Vec<PreviewEnvironment>> {
    sqlx::query_as::<_, PreviewEnvironment>(
        "SELECT id, project_id, pr_number, preview_subdomain, status, commit_sha,
                environment_id, deployment_group_id, last_accessed_at, created_at, updated_at
         FROM preview_environments
         WHERE status = 'Active' AND last_accessed_at < now() - make_interval(secs => $1)",
    )
    .bind(auto_sleep_after_secs as f64)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}
