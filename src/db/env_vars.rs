//! EnvVar CRUD (§3: values encrypted at rest, write-only/masked on read).

#![cfg(feature = "server")]

use super::models::EnvVar;
use crate::error::{Error, Result};
use crate::secrets::EncryptionProvider;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn upsert(
    pool: &PgPool,
    encryption: &dyn EncryptionProvider,
    service_id: Uuid,
    environment_id: Uuid,
    key: &str,
    value: &str,
) -> Result<EnvVar> {
    let encrypted_value = encryption.encrypt(value.as_bytes()).await?;
    sqlx::query_as::<_, EnvVar>(
        r#"INSERT INTO env_vars (id, service_id, environment_id, key, encrypted_value, created_at, updated_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, now(), now())
           ON CONFLICT (service_id, environment_id, key)
           DO UPDATE SET encrypted_value = EXCLUDED.encrypted_value, updated_at = now()
           RETURNING id, service_id, environment_id, key, encrypted_value, created_at, updated_at"#,
    )
    .bind(service_id)
    .bind(environment_id)
    .bind(key)
    .bind(encrypted_value)
    .fetch_one(pool)
    .await
    .map_err(Error::from)
}

/// Masked listing for the read API: keys only, values never leave the store
/// once written (§6: "values write-only, read masked").
pub async fn list_keys(
    pool: &PgPool,
    service_id: Uuid,
    environment_id: Uuid,
) -> Result<Vec<String>> {
    sqlx::query_scalar(
        "SELECT key FROM env_vars WHERE service_id = $1 AND environment_id = $2 ORDER BY key",
    )
    .bind(service_id)
    .bind(environment_id)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

/// Decrypted values for injection into a workload spec — used only by the
/// reconciler, never returned over the HTTP API.
pub async fn resolve_for_deploy(
    pool: &PgPool,
    encryption: &dyn EncryptionProvider,
    service_id: Uuid,
    environment_id: Uuid,
) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query_as::<_, EnvVar>(
        "SELECT id, service_id, environment_id, key, encrypted_value, created_at, updated_at
         FROM env_vars WHERE service_id = $1 AND environment_id = $2",
    )
    .bind(service_id)
    .bind(environment_id)
    .fetch_all(pool)
    .await
    .map_err(Error::from)?;

    let mut resolved = Vec::with_capacity(rows.len());
    for row in rows {
        let plaintext = encryption.decrypt(&row.encrypted_value).await?;
        let value = String::from_utf8(plaintext)
            .map_err(|_| Error::internal("decrypted env var is not valid UTF-8"))?;
        resolved.push((row.key, value));
    }
    Ok(resolved)
}

pub async fn delete(pool: &PgPool, service_id: Uuid, environment_id: Uuid, key: &str) -> Result<()> {
    let result = sqlx::query(
        "DELETE FROM env_vars WHERE service_id = $1 AND environment_id = $2 AND key = $3",
    )
    .bind(service_id)
    .bind(environment_id)
    .bind(key)
    .execute(pool)
    .await
    .map_err(Error::from)?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found("env var not found"));
    }
    Ok(())
}
