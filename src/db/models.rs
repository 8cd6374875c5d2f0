//! Entity model for the repository store (§3). Every enum that is persisted
//! derives `sqlx::Type` with a `text` representation, matching the teacher's
//! convention for Postgres-backed status columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub owner_user_id: Uuid,
    pub team_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub namespace: String,
    pub auto_deploy_branch: Option<String>,
    pub auto_deploy_enabled: bool,
    pub requires_approval: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::Type))]
#[cfg_attr(feature = "server", sqlx(type_name = "text"))]
pub enum BuildType {
    Dockerfile,
    Buildpacks,
    Nixpacks,
}

#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub git_repository: String,
    pub git_branch: String,
    pub app_path: String,
    pub build_type: BuildType,
    pub dockerfile: Option<String>,
    pub build_command: Option<String>,
    pub start_command: Option<String>,
    /// Canonical, validated spec JSON (see `spec::model::ServiceSpec`).
    pub spec: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::Type))]
#[cfg_attr(feature = "server", sqlx(type_name = "text"))]
pub enum DependencyType {
    Runtime,
    Build,
    Data,
}

#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDependency {
    pub id: Uuid,
    pub project_id: Uuid,
    pub service_id: Uuid,
    pub depends_on_service_id: Uuid,
    pub dependency_type: DependencyType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::Type))]
#[cfg_attr(feature = "server", sqlx(type_name = "text"))]
pub enum ReleaseStatus {
    Building,
    Ready,
    Failed,
}

#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: Uuid,
    pub service_id: Uuid,
    pub git_sha: String,
    pub status: ReleaseStatus,
    pub image_ref: Option<String>,
    pub image_digest: Option<String>,
    pub sbom_ref: Option<String>,
    pub signature_ref: Option<String>,
    pub builder_logs_ref: Option<String>,
    pub builder_identity: Option<String>,
    pub failed_stage: Option<String>,
    pub failure_log_tail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Release {
    /// Invariant (§8): every `ready` release has a non-empty digest, SBOM
    /// reference, and signature reference.
    pub fn is_well_formed(&self) -> bool {
        if self.status != ReleaseStatus::Ready {
            return true;
        }
        matches!(&self.image_digest, Some(d) if !d.is_empty())
            && matches!(&self.sbom_ref, Some(s) if !s.is_empty())
            && matches!(&self.signature_ref, Some(s) if !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::Type))]
#[cfg_attr(feature = "server", sqlx(type_name = "text"))]
pub enum Trigger {
    Webhook,
    Manual,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::Type))]
#[cfg_attr(feature = "server", sqlx(type_name = "text"))]
pub enum Strategy {
    Parallel,
    DependencyOrdered,
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::Type))]
#[cfg_attr(feature = "server", sqlx(type_name = "text"))]
pub enum GroupStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    RolledBack,
}

#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentGroup {
    pub id: Uuid,
    pub project_id: Uuid,
    pub environment_id: Uuid,
    pub trigger: Trigger,
    pub commit_sha: String,
    pub pr_url: Option<String>,
    pub strategy: Strategy,
    pub status: GroupStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::Type))]
#[cfg_attr(feature = "server", sqlx(type_name = "text"))]
pub enum DeployStrategy {
    Rolling,
    BlueGreen,
    Canary,
}

/// Deployment lifecycle (§3). Forward-only except the single allowed
/// `{Healthy, Degraded, Failed} -> RolledBack` transition; enforced by
/// `orchestrator::state_machine::validate_transition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::Type))]
#[cfg_attr(feature = "server", sqlx(type_name = "text"))]
pub enum DeploymentStatus {
    Pending,
    Building,
    Deploying,
    Healthy,
    Degraded,
    Failed,
    RolledBack,
}

#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub service_id: Uuid,
    pub environment_id: Uuid,
    pub release_id: Option<Uuid>,
    pub deployment_group_id: Option<Uuid>,
    pub replica_count: i32,
    pub strategy: DeployStrategy,
    pub status: DeploymentStatus,
    pub deploy_order: i32,
    pub approved_by: Option<Uuid>,
    pub approval_at: Option<DateTime<Utc>>,
    pub previous_release_id: Option<Uuid>,
    pub observed_image_digest: Option<String>,
    pub last_reconcile_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::Type))]
#[cfg_attr(feature = "server", sqlx(type_name = "text"))]
pub enum PreviewStatus {
    Pending,
    Building,
    Deploying,
    Active,
    Sleeping,
    Failed,
    Deleted,
}

#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewEnvironment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub pr_number: i32,
    pub preview_subdomain: String,
    pub status: PreviewStatus,
    pub commit_sha: String,
    pub environment_id: Uuid,
    pub deployment_group_id: Option<Uuid>,
    pub last_accessed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::Type))]
#[cfg_attr(feature = "server", sqlx(type_name = "text"))]
pub enum DomainVerificationState {
    Pending,
    Verified,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::Type))]
#[cfg_attr(feature = "server", sqlx(type_name = "text"))]
pub enum TlsState {
    Pending,
    Issued,
    Failed,
}

#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomDomain {
    pub id: Uuid,
    pub service_id: Uuid,
    pub environment_id: Uuid,
    pub hostname: String,
    pub verification_state: DomainVerificationState,
    pub tls_state: TlsState,
    pub zero_trust: bool,
    pub ingress_rule_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub service_id: Uuid,
    pub hostname: String,
    pub path_prefix: String,
    pub port: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVar {
    pub id: Uuid,
    pub service_id: Uuid,
    pub environment_id: Uuid,
    pub key: String,
    /// Ciphertext; never serialized back to clients (see `db::env_vars::masked`).
    #[serde(skip_serializing)]
    pub encrypted_value: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub subject: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::Type))]
#[cfg_attr(feature = "server", sqlx(type_name = "text"))]
pub enum Role {
    Viewer,
    Developer,
    Admin,
}

impl Role {
    pub fn satisfies(self, minimum: Role) -> bool {
        self >= minimum
    }
}
