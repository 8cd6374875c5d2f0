//! ServiceDependency edges (§3). Acyclicity is enforced at the orchestrator
//! layer (`orchestrator::graph`) at group-creation time, not here — the
//! store only guarantees the edge itself is well-formed and unique.

#![cfg(feature = "server")]

use super::models::{DependencyType, ServiceDependency};
use crate::error::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn create(
    pool: &PgPool,
    project_id: Uuid,
    service_id: Uuid,
    depends_on_service_id: Uuid,
    dependency_type: DependencyType,
) -> Result<ServiceDependency> {
    if service_id == depends_on_service_id {
        return Err(Error::validation("a service cannot depend on itself"));
    }
    sqlx::query_as::<_, ServiceDependency>(
        r#"INSERT INTO service_dependencies
           (id, project_id, service_id, depends_on_service_id, dependency_type, created_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, now())
           RETURNING id, project_id, service_id, depends_on_service_id, dependency_type, created_at"#,
    )
    .bind(project_id)
    .bind(service_id)
    .bind(depends_on_service_id)
    .bind(dependency_type)
    .fetch_one(pool)
    .await
    .map_err(Error::from)
}

pub async fn list_for_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<ServiceDependency>> {
    sqlx::query_as::<_, ServiceDependency>(
        "SELECT id, project_id, service_id, depends_on_service_id, dependency_type, created_at
         FROM service_dependencies WHERE project_id = $1",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM service_dependencies WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found("dependency not found"));
    }
    Ok(())
}
