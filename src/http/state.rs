//! Shared application state (§6), grounded on the teacher's
//! `server::state::AppState`: one struct threaded through every handler via
//! axum's `State` extractor, built once at startup in `http::run_server`.

use std::sync::Arc;

use sqlx::PgPool;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::auth::middleware::AuthState;
use crate::config::Settings;
use crate::db::audit::AuditSink;
use crate::orchestrator::Orchestrator;
use crate::preview::controller::PreviewController;
use crate::secrets::EncryptionProvider;
use crate::webhook::router::WebhookRouter;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub settings: Arc<Settings>,
    pub auth: Arc<AuthState>,
    pub orchestrator: Arc<Orchestrator>,
    pub previews: Arc<PreviewController>,
    pub webhooks: Arc<WebhookRouter>,
    pub audit: AuditSink,
    pub encryption: Arc<dyn EncryptionProvider>,
    pub jwt_signer: Option<Arc<crate::auth::jwt::JwtSigner>>,
    pub jwks: Arc<crate::auth::jwks::JwksDocument>,
    pub metrics_handle: PrometheusHandle,
}
