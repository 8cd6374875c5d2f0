//! DeploymentGroup persistence (§3, §4.6). Group + child Deployments are
//! always created together inside a single transaction.

#![cfg(feature = "server")]

use super::models::{DeploymentGroup, GroupStatus, Strategy, Trigger};
use crate::error::{Error, Result};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub async fn create(
    tx: &mut Transaction<'_, Postgres>,
    project_id: Uuid,
    environment_id: Uuid,
    trigger: Trigger,
    commit_sha: &str,
    pr_url: Option<&str>,
    strategy: Strategy,
) -> Result<DeploymentGroup> {
    sqlx::query_as::<_, DeploymentGroup>(
        r#"INSERT INTO deployment_groups
           (id, project_id, environment_id, trigger, commit_sha, pr_url, strategy, status, created_at, updated_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, 'Pending', now(), now())
           RETURNING id, project_id, environment_id, trigger, commit_sha, pr_url, strategy,
                     status, created_at, updated_at"#,
    )
    .bind(project_id)
    .bind(environment_id)
    .bind(trigger)
    .bind(commit_sha)
    .bind(pr_url)
    .bind(strategy)
    .fetch_one(&mut **tx)
    .await
    .map_err(Error::from)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<DeploymentGroup> {
    sqlx::query_as::<_, DeploymentGroup>(
        "SELECT id, project_id, environment_id, trigger, commit_sha, pr_url, strategy,
                status, created_at, updated_at
         FROM deployment_groups WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found("deployment group not found"))
}

/// Serialization check (§4.6, §8): is there already a non-terminal group for
/// this `(project, environment)`? Answered with `SELECT ... FOR UPDATE`
/// semantics at the call site via the orchestrator's per-key mutex; this
/// query is the read the mutex guards.
pub async fn find_in_progress(
    pool: &PgPool,
    project_id: Uuid,
    environment_id: Uuid,
) -> Result<Option<DeploymentGroup>> {
    sqlx::query_as::<_, DeploymentGroup>(
        "SELECT id, project_id, environment_id, trigger, commit_sha, pr_url, strategy,
                status, created_at, updated_at
         FROM deployment_groups
         WHERE project_id = $1 AND environment_id = $2
           AND status IN ('Pending', 'InProgress')
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(project_id)
    .bind(environment_id)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)
}

pub async fn set_status(pool: &PgPool, id: Uuid, status: GroupStatus) -> Result<DeploymentGroup> {
    sqlx::query_as::<_, DeploymentGroup>(
        r#"UPDATE deployment_groups SET status = $2, updated_at = now() WHERE id = $1
           RETURNING id, project_id, environment_id, trigger, commit_sha, pr_url, strategy,
                     status, created_at, updated_at"#,
    )
    .bind(id)
    .bind(status)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found("deployment group not found"))
}

pub async fn list_for_project(
    pool: &PgPool,
    project_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<(Vec<DeploymentGroup>, i64)> {
    let rows = sqlx::query_as::<_, DeploymentGroup>(
        "SELECT id, project_id, environment_id, trigger, commit_sha, pr_url, strategy,
                status, created_at, updated_at
         FROM deployment_groups WHERE project_id = $1
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(project_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(Error::from)?;

    let total: i64 =
        sqlx::query_scalar("SELECT count(*) FROM deployment_groups WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(pool)
            .await
            .map_err(Error::from)?;

    Ok((rows, total))
}
