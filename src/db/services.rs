//! Service CRUD (§3: unique `(project, name)`).

#![cfg(feature = "server")]

use super::models::{BuildType, Service};
use crate::error::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub struct NewService<'a> {
    pub project_id: Uuid,
    pub name: &'a str,
    pub git_repository: &'a str,
    pub git_branch: &'a str,
    pub app_path: &'a str,
    pub build_type: BuildType,
    pub dockerfile: Option<&'a str>,
    pub build_command: Option<&'a str>,
    pub start_command: Option<&'a str>,
    pub spec: serde_json::Value,
}

pub async fn create(pool: &PgPool, input: NewService<'_>) -> Result<Service> {
    sqlx::query_as::<_, Service>(
        r#"INSERT INTO services
           (id, project_id, name, git_repository, git_branch, app_path, build_type,
            dockerfile, build_command, start_command, spec, created_at, updated_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now(), now())
           RETURNING id, project_id, name, git_repository, git_branch, app_path, build_type,
                     dockerfile, build_command, start_command, spec, created_at, updated_at"#,
    )
    .bind(input.project_id)
    .bind(input.name)
    .bind(input.git_repository)
    .bind(input.git_branch)
    .bind(input.app_path)
    .bind(input.build_type)
    .bind(input.dockerfile)
    .bind(input.build_command)
    .bind(input.start_command)
    .bind(input.spec)
    .fetch_one(pool)
    .await
    .map_err(Error::from)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Service> {
    sqlx::query_as::<_, Service>(
        "SELECT id, project_id, name, git_repository, git_branch, app_path, build_type,
                dockerfile, build_command, start_command, spec, created_at, updated_at
         FROM services WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?
    .ok_or_else(|| Error::not_found("service not found"))
}

pub async fn list_for_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<Service>> {
    sqlx::query_as::<_, Service>(
        "SELECT id, project_id, name, git_repository, git_branch, app_path, build_type,
                dockerfile, build_command, start_command, spec, created_at, updated_at
         FROM services WHERE project_id = $1 ORDER BY name",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

pub async fn list_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Service>> {
    sqlx::query_as::<_, Service>(
        "SELECT id, project_id, name, git_repository, git_branch, app_path, build_type,
                dockerfile, build_command, start_command, spec, created_at, updated_at
         FROM services WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

/// Services whose `(git_repository, git_branch)` match a webhook push event.
pub async fn list_for_repo_branch(
    pool: &PgPool,
    repo: &str,
    branch: &str,
) -> Result<Vec<Service>> {
    sqlx::query_as::<_, Service>(
        "SELECT id, project_id, name, git_repository, git_branch, app_path, build_type,
                dockerfile, build_command, start_command, spec, created_at, updated_at
         FROM services WHERE git_repository = $1 AND git_branch = $2",
    )
    .bind(repo)
    .bind(branch)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

/// Services registered against `repo`, regardless of tracked branch. Used to
/// resolve a pull-request event (opened on an arbitrary head branch) back to
/// its owning project (§4.8).
pub async fn list_for_repo(pool: &PgPool, repo: &str) -> Result<Vec<Service>> {
    sqlx::query_as::<_, Service>(
        "SELECT id, project_id, name, git_repository, git_branch, app_path, build_type,
                dockerfile, build_command, start_command, spec, created_at, updated_at
         FROM services WHERE git_repository = $1",
    )
    .bind(repo)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM services WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found("service not found"));
    }
    Ok(())
}
