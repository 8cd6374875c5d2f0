//! Deployment persistence (§3, §4.6, §4.7).

#![cfg(feature = "server")]

use super::models::{DeployStrategy, Deployment, DeploymentStatus};
use crate::error::{Error, Result};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub struct NewDeployment {
    pub service_id: Uuid,
    pub environment_id: Uuid,
    pub deployment_group_id: Option<Uuid>,
    pub replica_count: i32,
    pub strategy: DeployStrategy,
    pub deploy_order: i32,
}

pub async fn create(
    tx: &mut Transaction<'_, Postgres>,
    input: NewDeployment,
) -> Result<Deployment> {
    sqlx::query_as::<_, Deployment>(
        r#"INSERT INTO deployments
           (id, service_id, environment_id, release_id, deployment_group_id, replica_count,
            strategy, status, deploy_order, created_at, updated_at)
           VALUES (gen_random_uuid(), $1, $2, NULL, $3, $4, $5, 'Pending', $6, now(), now())
           RETURNING id, service_id, environment_id, release_id, deployment_group_id,
                     replica_count, strategy, status, deploy_order, approved_by, approval_at,
                     previous_release_id, observed_image_digest, last_reconcile_note,
                     created_at, updated_at"#,
    )
    .bind(input.service_id)
    .bind(input.environment_id)
    .bind(input.deployment_group_id)
    .bind(input.replica_count)
    .bind(input.strategy)
    .bind(input.deploy_order)
    .fetch_one(&mut **tx)
    .await
    .map_err(Error::from)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Deployment> {
    sqlx::query_as::<_, Deployment>(
        "SELECT id, service_id, environment_id, release_id, deployment_group_id,
                replica_count, strategy, status, deploy_order, approved_by, approval_at,
                previous_release_id, observed_image_digest, last_reconcile_note,
                created_at, updated_at
         FROM deployments WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found("deployment not found"))
}

pub async fn list_for_group(pool: &PgPool, group_id: Uuid) -> Result<Vec<Deployment>> {
    sqlx::query_as::<_, Deployment>(
        "SELECT id, service_id, environment_id, release_id, deployment_group_id,
                replica_count, strategy, status, deploy_order, approved_by, approval_at,
                previous_release_id, observed_image_digest, last_reconcile_note,
                created_at, updated_at
         FROM deployments WHERE deployment_group_id = $1 ORDER BY deploy_order",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

pub async fn set_release(pool: &PgPool, id: Uuid, release_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE deployments SET release_id = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(release_id)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    Ok(())
}

pub async fn set_status(
    pool: &PgPool,
    id: Uuid,
    status: DeploymentStatus,
    note: Option<&str>,
) -> Result<Deployment> {
    sqlx::query_as::<_, Deployment>(
        r#"UPDATE deployments
           SET status = $2, last_reconcile_note = COALESCE($3, last_reconcile_note), updated_at = now()
           WHERE id = $1
           RETURNING id, service_id, environment_id, release_id, deployment_group_id,
                     replica_count, strategy, status, deploy_order, approved_by, approval_at,
                     previous_release_id, observed_image_digest, last_reconcile_note,
                     created_at, updated_at"#,
    )
    .bind(id)
    .bind(status)
    .bind(note)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found("deployment not found"))
}

pub async fn set_observed_digest(pool: &PgPool, id: Uuid, digest: &str) -> Result<()> {
    sqlx::query("UPDATE deployments SET observed_image_digest = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(digest)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    Ok(())
}

/// The last deployment that reached `Healthy` for this service+environment,
/// excluding `exclude_id` — the rollback target (§4.6, §4.7).
pub async fn last_healthy_excluding(
    pool: &PgPool,
    service_id: Uuid,
    environment_id: Uuid,
    exclude_id: Uuid,
) -> Result<Option<Deployment>> {
    sqlx::query_as::<_, Deployment>(
        "SELECT id, service_id, environment_id, release_id, deployment_group_id,
                replica_count, strategy, status, deploy_order, approved_by, approval_at,
                previous_release_id, observed_image_digest, last_reconcile_note,
                created_at, updated_at
         FROM deployments
         WHERE service_id = $1 AND environment_id = $2 AND id != $3 AND status = 'Healthy'
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(service_id)
    .bind(environment_id)
    .bind(exclude_id)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)
}
