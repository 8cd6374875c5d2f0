//! Route CRUD (§3: unique `(hostname, path_prefix)` per environment).

#![cfg(feature = "server")]

use super::models::Route;
use crate::error::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn create(
    pool: &PgPool,
    environment_id: Uuid,
    service_id: Uuid,
    hostname: &str,
    path_prefix: &str,
    port: i32,
) -> Result<Route> {
    let existing = find_conflict(pool, environment_id, hostname, path_prefix).await?;
    if existing.is_some() {
        return Err(Error::conflict(format!(
            "route {hostname}{path_prefix} already exists in this environment"
        )));
    }

    sqlx::query_as::<_, Route>(
        r#"INSERT INTO routes (id, environment_id, service_id, hostname, path_prefix, port, created_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, now())
           RETURNING id, environment_id, service_id, hostname, path_prefix, port, created_at"#,
    )
    .bind(environment_id)
    .bind(service_id)
    .bind(hostname)
    .bind(path_prefix)
    .bind(port)
    .fetch_one(pool)
    .await
    .map_err(Error::from)
}

pub async fn find_conflict(
    pool: &PgPool,
    environment_id: Uuid,
    hostname: &str,
    path_prefix: &str,
) -> Result<Option<Route>> {
    sqlx::query_as::<_, Route>(
        "SELECT id, environment_id, service_id, hostname, path_prefix, port, created_at
         FROM routes WHERE environment_id = $1 AND hostname = $2 AND path_prefix = $3",
    )
    .bind(environment_id)
    .bind(hostname)
    .bind(path_prefix)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)
}

pub async fn list_for_service(pool: &PgPool, service_id: Uuid) -> Result<Vec<Route>> {
    sqlx::query_as::<_, Route>(
        "SELECT id, environment_id, service_id, hostname, path_prefix, port, created_at
         FROM routes WHERE service_id = $1",
    )
    .bind(service_id)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM routes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found("route not found"));
    }
    Ok(())
}
