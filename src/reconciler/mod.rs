//! Cluster reconciler (C7, §4.7): for each Deployment, converges workloads,
//! services, ingress, routes, and subdomains toward the Release's spec;
//! monitors health; triggers rollback.

#![cfg(feature = "server")]

#[cfg(feature = "k8s")]
pub mod kubernetes;
pub mod health;
pub mod strategy;

use crate::db::models::{Deployment, DeploymentStatus, Project, Service};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result of one reconciliation pass. Reconciliation is called repeatedly
/// until the deployment reaches a terminal state (for this pass) and must
/// be idempotent: a crashed reconcile resumes from `ReconcilePhase` rather
/// than restarting from scratch.
pub struct ReconcileResult {
    pub status: DeploymentStatus,
    pub phase: ReconcilePhase,
    pub observed_image_digest: Option<String>,
    pub note: Option<String>,
}

pub struct HealthStatus {
    pub healthy: bool,
    pub error_rate: f64,
    pub p95_latency_ms: Option<f64>,
    pub checked_at: DateTime<Utc>,
}

/// Tracks progress through a single deployment's convergence so a crashed
/// or restarted reconcile loop resumes instead of recreating objects that
/// already exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReconcilePhase {
    #[default]
    NotStarted,
    CreatingWorkload,
    WaitingForWorkload,
    UpdatingService,
    UpdatingIngress,
    /// Canary only (§4.7): traffic is split `weight`% to the candidate
    /// workload; each pass re-checks the health window before advancing to
    /// the next rung, retracting, or (at 100 with no breach) promoting.
    CanaryWeighted { weight: u8 },
    Completed,
}

/// The backend that actually converges a deployment toward its Release's
/// spec. One implementation per target (Kubernetes is the only one carried
/// here; others plug in the same way).
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    async fn reconcile(
        &self,
        deployment: &Deployment,
        service: &Service,
        project: &Project,
        phase: ReconcilePhase,
    ) -> anyhow::Result<ReconcileResult>;

    async fn health_check(&self, deployment: &Deployment) -> anyhow::Result<HealthStatus>;

    /// Requests a restore to `target_release_id` (or deletion of the
    /// workload if `None`) as part of a deployment-group rollback (§4.6).
    async fn rollback(
        &self,
        deployment: &Deployment,
        target_release_id: Option<uuid::Uuid>,
    ) -> anyhow::Result<()>;

    /// Stops reconciliation/health polling for a cancelled deployment
    /// without tearing down infrastructure (§4.6 cancellation semantics).
    async fn stop_polling(&self, deployment: &Deployment) -> anyhow::Result<()>;
}
