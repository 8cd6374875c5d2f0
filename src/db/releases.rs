//! Release CRUD (§3: immutable once `ready`; image ref never reused).

#![cfg(feature = "server")]

use super::models::Release;
use crate::error::{Error, Result};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub async fn create_building(
    tx: &mut Transaction<'_, Postgres>,
    service_id: Uuid,
    git_sha: &str,
    builder_identity: &str,
) -> Result<Release> {
    sqlx::query_as::<_, Release>(
        r#"INSERT INTO releases
           (id, service_id, git_sha, status, builder_identity, created_at, updated_at)
           VALUES (gen_random_uuid(), $1, $2, 'Building', $3, now(), now())
           RETURNING id, service_id, git_sha, status, image_ref, image_digest, sbom_ref,
                     signature_ref, builder_logs_ref, builder_identity, failed_stage,
                     failure_log_tail, created_at, updated_at"#,
    )
    .bind(service_id)
    .bind(git_sha)
    .bind(builder_identity)
    .fetch_one(&mut **tx)
    .await
    .map_err(Error::from)
}

/// Idempotence (§4.5): look up an existing release for `(service, sha)`
/// before starting a new build.
pub async fn find_by_service_sha(
    pool: &PgPool,
    service_id: Uuid,
    git_sha: &str,
) -> Result<Option<Release>> {
    sqlx::query_as::<_, Release>(
        "SELECT id, service_id, git_sha, status, image_ref, image_digest, sbom_ref,
                signature_ref, builder_logs_ref, builder_identity, failed_stage,
                failure_log_tail, created_at, updated_at
         FROM releases WHERE service_id = $1 AND git_sha = $2
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(service_id)
    .bind(git_sha)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Release> {
    sqlx::query_as::<_, Release>(
        "SELECT id, service_id, git_sha, status, image_ref, image_digest, sbom_ref,
                signature_ref, builder_logs_ref, builder_identity, failed_stage,
                failure_log_tail, created_at, updated_at
         FROM releases WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found("release not found"))
}

/// `building -> ready`. The image ref/digest uniqueness invariant (§3: never
/// reused, even across services) is enforced by database-level unique
/// indexes on `image_ref` and `image_digest`.
pub async fn mark_ready(
    pool: &PgPool,
    id: Uuid,
    image_ref: &str,
    image_digest: &str,
    sbom_ref: &str,
    signature_ref: &str,
    builder_logs_ref: &str,
) -> Result<Release> {
    sqlx::query_as::<_, Release>(
        r#"UPDATE releases
           SET status = 'Ready', image_ref = $2, image_digest = $3, sbom_ref = $4,
               signature_ref = $5, builder_logs_ref = $6, updated_at = now()
           WHERE id = $1 AND status = 'Building'
           RETURNING id, service_id, git_sha, status, image_ref, image_digest, sbom_ref,
                     signature_ref, builder_logs_ref, builder_identity, failed_stage,
                     failure_log_tail, created_at, updated_at"#,
    )
    .bind(id)
    .bind(image_ref)
    .bind(image_digest)
    .bind(sbom_ref)
    .bind(signature_ref)
    .bind(builder_logs_ref)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::conflict("release is not in building state"))
}

/// `building -> failed`. No partial release is ever `ready` (§4.5).
pub async fn mark_failed(
    pool: &PgPool,
    id: Uuid,
    failed_stage: &str,
    failure_log_tail: &str,
) -> Result<Release> {
    sqlx::query_as::<_, Release>(
        r#"UPDATE releases
           SET status = 'Failed', failed_stage = $2, failure_log_tail = $3, updated_at = now()
           WHERE id = $1 AND status = 'Building'
           RETURNING id, service_id, git_sha, status, image_ref, image_digest, sbom_ref,
                     signature_ref, builder_logs_ref, builder_identity, failed_stage,
                     failure_log_tail, created_at, updated_at"#,
    )
    .bind(id)
    .bind(failed_stage)
    .bind(failure_log_tail)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::conflict("release is not in building state"))
}

pub async fn latest_ready_for_service(pool: &PgPool, service_id: Uuid) -> Result<Option<Release>> {
    sqlx::query_as::<_, Release>(
        "SELECT id, service_id, git_sha, status, image_ref, image_digest, sbom_ref,
                signature_ref, builder_logs_ref, builder_identity, failed_stage,
                failure_log_tail, created_at, updated_at
         FROM releases WHERE service_id = $1 AND status = 'Ready'
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(service_id)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)
}
