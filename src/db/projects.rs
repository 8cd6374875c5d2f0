//! Project CRUD (§3: stable id + unique slug, owner, optional team).

#![cfg(feature = "server")]

use super::models::Project;
use crate::error::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn create(pool: &PgPool, slug: &str, name: &str, owner_user_id: Uuid) -> Result<Project> {
    sqlx::query_as::<_, Project>(
        r#"INSERT INTO projects (id, slug, name, owner_user_id, team_id, created_at, updated_at)
           VALUES (gen_random_uuid(), $1, $2, $3, NULL, now(), now())
           RETURNING id, slug, name, owner_user_id, team_id, created_at, updated_at"#,
    )
    .bind(slug)
    .bind(name)
    .bind(owner_user_id)
    .fetch_one(pool)
    .await
    .map_err(Error::from)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Project> {
    sqlx::query_as::<_, Project>(
        "SELECT id, slug, name, owner_user_id, team_id, created_at, updated_at
         FROM projects WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found("project not found"))
}

pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Project> {
    sqlx::query_as::<_, Project>(
        "SELECT id, slug, name, owner_user_id, team_id, created_at, updated_at
         FROM projects WHERE slug = $1",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found(format!("project '{slug}' not found")))
}

pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<(Vec<Project>, i64)> {
    let rows = sqlx::query_as::<_, Project>(
        "SELECT id, slug, name, owner_user_id, team_id, created_at, updated_at
         FROM projects ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(Error::from)?;

    let total: i64 = sqlx::query_scalar("SELECT count(*) FROM projects")
        .fetch_one(pool)
        .await
        .map_err(Error::from)?;

    Ok((rows, total))
}

pub async fn rename(pool: &PgPool, id: Uuid, name: &str) -> Result<Project> {
    sqlx::query_as::<_, Project>(
        "UPDATE projects SET name = $2, updated_at = now() WHERE id = $1
         RETURNING id, slug, name, owner_user_id, team_id, created_at, updated_at",
    )
    .bind(id)
    .bind(name)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found("project not found"))
}

/// Destruction cascades (§3); the foreign keys on environments/services/
/// releases/deployments/domains/routes all carry `ON DELETE CASCADE`.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found("project not found"));
    }
    Ok(())
}
