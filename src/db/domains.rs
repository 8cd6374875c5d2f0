//! CustomDomain CRUD (§3: unique `(service, environment, hostname)`).

#![cfg(feature = "server")]

use super::models::{CustomDomain, DomainVerificationState, TlsState};
use crate::error::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn create(
    pool: &PgPool,
    service_id: Uuid,
    environment_id: Uuid,
    hostname: &str,
    zero_trust: bool,
) -> Result<CustomDomain> {
    sqlx::query_as::<_, CustomDomain>(
        r#"INSERT INTO custom_domains
           (id, service_id, environment_id, hostname, verification_state, tls_state,
            zero_trust, ingress_rule_ref, created_at, updated_at)
           VALUES (gen_random_uuid(), $1, $2, $3, 'Pending', 'Pending', $4, NULL, now(), now())
           RETURNING id, service_id, environment_id, hostname, verification_state, tls_state,
                     zero_trust, ingress_rule_ref, created_at, updated_at"#,
    )
    .bind(service_id)
    .bind(environment_id)
    .bind(hostname)
    .bind(zero_trust)
    .fetch_one(pool)
    .await
    .map_err(Error::from)
}

pub async fn list_for_service(pool: &PgPool, service_id: Uuid) -> Result<Vec<CustomDomain>> {
    sqlx::query_as::<_, CustomDomain>(
        "SELECT id, service_id, environment_id, hostname, verification_state, tls_state,
                zero_trust, ingress_rule_ref, created_at, updated_at
         FROM custom_domains WHERE service_id = $1",
    )
    .bind(service_id)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

pub async fn list_verified_for_deployment_target(
    pool: &PgPool,
    service_id: Uuid,
    environment_id: Uuid,
) -> Result<Vec<CustomDomain>> {
    sqlx::query_as::<_, CustomDomain>(
        "SELECT id, service_id, environment_id, hostname, verification_state, tls_state,
                zero_trust, ingress_rule_ref, created_at, updated_at
         FROM custom_domains
         WHERE service_id = $1 AND environment_id = $2 AND verification_state = 'Verified'",
    )
    .bind(service_id)
    .bind(environment_id)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

pub async fn set_verification(
    pool: &PgPool,
    id: Uuid,
    state: DomainVerificationState,
) -> Result<CustomDomain> {
    sqlx::query_as::<_, CustomDomain>(
        r#"UPDATE custom_domains SET verification_state = $2, updated_at = now() WHERE id = $1
           RETURNING id, service_id, environment_id, hostname, verification_state, tls_state,
                     zero_trust, ingress_rule_ref, created_at, updated_at"#,
    )
    .bind(id)
    .bind(state)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found("custom domain not found"))
}

pub async fn set_tls_state(pool: &PgPool, id: Uuid, state: TlsState) -> Result<()> {
    sqlx::query("UPDATE custom_domains SET tls_state = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(state)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM custom_domains WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found("custom domain not found"));
    }
    Ok(())
}
