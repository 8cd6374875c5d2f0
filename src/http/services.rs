//! Service lifecycle (§6: `/projects/{slug}/services`), and everything
//! scoped to a service: dependencies, builds, custom domains, routes, env
//! vars.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::authz::authorize_project;
use super::state::AppState;
use crate::auth::rbac::Action;
use crate::auth::Actor;
use crate::db::models::{
    BuildType, CustomDomain, DependencyType, EnvVar, Release, Route, Service, ServiceDependency,
};
use crate::db::{audit, dependencies, domains, env_vars, projects, releases, routes, services};
use crate::error::{Error, Result};
use crate::spec::validate::{self, ContentType};

// --- Service CRUD -----------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ServiceList {
    pub data: Vec<Service>,
}

pub async fn list_services(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(slug): Path<String>,
) -> Result<Json<ServiceList>> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    authorize_project(&state.pool, &actor, project.id, Action::ReadProject).await?;
    let data = services::list_for_project(&state.pool, project.id).await?;
    Ok(Json(ServiceList { data }))
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub spec: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// The spec validator (C3) owns field-level rules; this handler's job is
/// only to route the validated document into the `services` table's flat
/// columns plus the original JSON (§4.3: "store the canonical, validated
/// document alongside the flattened columns the orchestrator reads").
pub async fn create_service(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(slug): Path<String>,
    Json(req): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>)> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    authorize_project(&state.pool, &actor, project.id, Action::WriteProject).await?;

    let content_type = match req.content_type.as_deref() {
        Some("json") => ContentType::Json,
        _ => ContentType::Yaml,
    };
    let doc = validate::validate(&req.spec, content_type)?;

    let build_type = match doc.spec.build.kind {
        crate::spec::model::BuildKind::Dockerfile => BuildType::Dockerfile,
        crate::spec::model::BuildKind::Buildpacks => BuildType::Buildpacks,
        crate::spec::model::BuildKind::Nixpacks => BuildType::Nixpacks,
    };

    let spec_json = serde_json::to_value(&doc).internal_err_spec()?;

    let service = services::create(
        &state.pool,
        services::NewService {
            project_id: project.id,
            name: &doc.metadata.name,
            git_repository: &doc.spec.source.git.repository,
            git_branch: &doc.spec.source.git.branch,
            app_path: &doc.spec.source.app_path,
            build_type,
            dockerfile: doc.spec.build.dockerfile.as_deref(),
            build_command: doc.spec.build.build_command.as_deref(),
            start_command: doc.spec.build.start_command.as_deref(),
            spec: spec_json,
        },
    )
    .await?;

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &actor.subject,
            action: "service.create",
            entity_type: "service",
            entity_id: Some(service.id),
            details: serde_json::json!({ "name": service.name }),
            ip: None,
            user_agent: None,
        })
        .await;

    Ok((StatusCode::CREATED, Json(service)))
}

/// `serde_json::to_value` on an already-deserialized document is infallible
/// in practice; wrapped so a future non-`Serialize`-safe field doesn't
/// panic the handler.
trait SpecJsonExt<T> {
    fn internal_err_spec(self) -> Result<T>;
}

impl<T> SpecJsonExt<T> for std::result::Result<T, serde_json::Error> {
    fn internal_err_spec(self) -> Result<T> {
        self.map_err(|e| Error::internal(format!("failed to serialize canonical spec: {e}")))
    }
}

pub async fn get_service(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((slug, name)): Path<(String, String)>,
) -> Result<Json<Service>> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    authorize_project(&state.pool, &actor, project.id, Action::ReadProject).await?;
    let service = find_service_by_name(&state.pool, project.id, &name).await?;
    Ok(Json(service))
}

pub async fn delete_service(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((slug, name)): Path<(String, String)>,
) -> Result<StatusCode> {
    let project = projects::find_by_slug(&state.pool, &slug).await?;
    authorize_project(&state.pool, &actor, project.id, Action::WriteProject).await?;
    let service = find_service_by_name(&state.pool, project.id, &name).await?;
    services::delete(&state.pool, service.id).await?;

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &actor.subject,
            action: "service.delete",
            entity_type: "service",
            entity_id: Some(service.id),
            details: serde_json::json!({ "name": name }),
            ip: None,
            user_agent: None,
        })
        .await;

    Ok(StatusCode::NO_CONTENT)
}

async fn find_service_by_name(pool: &sqlx::PgPool, project_id: Uuid, name: &str) -> Result<Service> {
    services::list_for_project(pool, project_id)
        .await?
        .into_iter()
        .find(|s| s.name == name)
        .ok_or_else(|| Error::not_found(format!("service '{name}' not found")))
}

async fn load_service_and_authorize(
    state: &AppState,
    actor: &Actor,
    service_id: Uuid,
    action: Action,
) -> Result<Service> {
    let service = services::get(&state.pool, service_id).await?;
    authorize_project(&state.pool, actor, service.project_id, action).await?;
    Ok(service)
}

// --- Dependency edges --------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DependencyList {
    pub data: Vec<ServiceDependency>,
}

pub async fn list_dependencies(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(service_id): Path<Uuid>,
) -> Result<Json<DependencyList>> {
    let service = load_service_and_authorize(&state, &actor, service_id, Action::ReadProject).await?;
    let all = dependencies::list_for_project(&state.pool, service.project_id).await?;
    let data = all.into_iter().filter(|d| d.service_id == service_id).collect();
    Ok(Json(DependencyList { data }))
}

#[derive(Debug, Deserialize)]
pub struct CreateDependencyRequest {
    pub depends_on_service_id: Uuid,
    #[serde(default = "default_dependency_type")]
    pub dependency_type: DependencyType,
}

fn default_dependency_type() -> DependencyType {
    DependencyType::Runtime
}

pub async fn create_dependency(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(service_id): Path<Uuid>,
    Json(req): Json<CreateDependencyRequest>,
) -> Result<(StatusCode, Json<ServiceDependency>)> {
    let service = load_service_and_authorize(&state, &actor, service_id, Action::ManageDependencies).await?;
    let dependency = dependencies::create(
        &state.pool,
        service.project_id,
        service_id,
        req.depends_on_service_id,
        req.dependency_type,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(dependency)))
}

pub async fn delete_dependency(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((service_id, dependency_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    load_service_and_authorize(&state, &actor, service_id, Action::ManageDependencies).await?;
    dependencies::delete(&state.pool, dependency_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Builds -------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TriggerBuildRequest {
    pub git_sha: String,
}

#[derive(Debug, Serialize)]
pub struct BuildAccepted {
    pub release_id: Uuid,
    pub status: crate::db::models::ReleaseStatus,
}

/// `POST /services/{id}/builds` (§6, §4.5): idempotent on `(service,
/// git_sha)` — an existing well-formed release is returned immediately
/// rather than rebuilt. Delegates to the orchestrator's `trigger_build` so
/// manually- and deployment-triggered builds share the same coalescing
/// path and provider wiring.
pub async fn trigger_build(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(service_id): Path<Uuid>,
    Json(req): Json<TriggerBuildRequest>,
) -> Result<(StatusCode, Json<BuildAccepted>)> {
    let service = load_service_and_authorize(&state, &actor, service_id, Action::TriggerBuild).await?;
    let project = projects::get(&state.pool, service.project_id).await?;

    let release_id = state
        .orchestrator
        .trigger_build(&service, &req.git_sha, &project)
        .await?;
    let release = releases::get(&state.pool, release_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(BuildAccepted {
            release_id: release.id,
            status: release.status,
        }),
    ))
}

pub async fn get_build(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(release_id): Path<Uuid>,
) -> Result<Json<Release>> {
    let release = releases::get(&state.pool, release_id).await?;
    load_service_and_authorize(&state, &actor, release.service_id, Action::ReadProject).await?;
    Ok(Json(release))
}

// --- Custom domains -------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DomainList {
    pub data: Vec<CustomDomain>,
}

pub async fn list_domains(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(service_id): Path<Uuid>,
) -> Result<Json<DomainList>> {
    load_service_and_authorize(&state, &actor, service_id, Action::ReadProject).await?;
    let data = domains::list_for_service(&state.pool, service_id).await?;
    Ok(Json(DomainList { data }))
}

#[derive(Debug, Deserialize)]
pub struct CreateDomainRequest {
    pub environment_id: Uuid,
    pub hostname: String,
    #[serde(default)]
    pub zero_trust: bool,
}

pub async fn create_domain(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(service_id): Path<Uuid>,
    Json(req): Json<CreateDomainRequest>,
) -> Result<(StatusCode, Json<CustomDomain>)> {
    load_service_and_authorize(&state, &actor, service_id, Action::ManageDomains).await?;
    let domain = domains::create(&state.pool, service_id, req.environment_id, &req.hostname, req.zero_trust).await?;
    Ok((StatusCode::CREATED, Json(domain)))
}

pub async fn delete_domain(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((service_id, domain_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    load_service_and_authorize(&state, &actor, service_id, Action::ManageDomains).await?;
    domains::delete(&state.pool, domain_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Routes ---------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct RouteList {
    pub data: Vec<Route>,
}

pub async fn list_routes(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(service_id): Path<Uuid>,
) -> Result<Json<RouteList>> {
    load_service_and_authorize(&state, &actor, service_id, Action::ReadProject).await?;
    let data = routes::list_for_service(&state.pool, service_id).await?;
    Ok(Json(RouteList { data }))
}

#[derive(Debug, Deserialize)]
pub struct CreateRouteRequest {
    pub environment_id: Uuid,
    pub hostname: String,
    pub path_prefix: String,
    pub port: i32,
}

pub async fn create_route(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(service_id): Path<Uuid>,
    Json(req): Json<CreateRouteRequest>,
) -> Result<(StatusCode, Json<Route>)> {
    load_service_and_authorize(&state, &actor, service_id, Action::ManageDomains).await?;
    let route = routes::create(
        &state.pool,
        req.environment_id,
        service_id,
        &req.hostname,
        &req.path_prefix,
        req.port,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(route)))
}

pub async fn delete_route(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((service_id, route_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    load_service_and_authorize(&state, &actor, service_id, Action::ManageDomains).await?;
    routes::delete(&state.pool, route_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Env vars ---------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct EnvVarKeyList {
    pub data: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListEnvVarsQuery {
    pub environment_id: Uuid,
}

pub async fn list_env_vars(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(service_id): Path<Uuid>,
    axum::extract::Query(query): axum::extract::Query<ListEnvVarsQuery>,
) -> Result<Json<EnvVarKeyList>> {
    load_service_and_authorize(&state, &actor, service_id, Action::ReadProject).await?;
    let data = env_vars::list_keys(&state.pool, service_id, query.environment_id).await?;
    Ok(Json(EnvVarKeyList { data }))
}

#[derive(Debug, Deserialize)]
pub struct UpsertEnvVarRequest {
    pub environment_id: Uuid,
    pub key: String,
    pub value: String,
}

/// The stored value is never echoed back (§3, §6): this returns the row
/// with `encrypted_value` already dropped by `EnvVar`'s `#[serde(skip_serializing)]`.
pub async fn upsert_env_var(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(service_id): Path<Uuid>,
    Json(req): Json<UpsertEnvVarRequest>,
) -> Result<(StatusCode, Json<EnvVar>)> {
    load_service_and_authorize(&state, &actor, service_id, Action::ManageEnvVars).await?;
    let env_var = env_vars::upsert(
        &state.pool,
        state.encryption.as_ref(),
        service_id,
        req.environment_id,
        &req.key,
        &req.value,
    )
    .await?;

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &actor.subject,
            action: "envvar.upsert",
            entity_type: "service",
            entity_id: Some(service_id),
            details: serde_json::json!({ "key": req.key }),
            ip: None,
            user_agent: None,
        })
        .await;

    Ok((StatusCode::OK, Json(env_var)))
}

#[derive(Debug, Deserialize)]
pub struct DeleteEnvVarQuery {
    pub environment_id: Uuid,
}

pub async fn delete_env_var(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((service_id, key)): Path<(Uuid, String)>,
    axum::extract::Query(query): axum::extract::Query<DeleteEnvVarQuery>,
) -> Result<StatusCode> {
    load_service_and_authorize(&state, &actor, service_id, Action::ManageEnvVars).await?;
    env_vars::delete(&state.pool, service_id, query.environment_id, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}
