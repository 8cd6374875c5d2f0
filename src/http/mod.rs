//! Thin HTTP adaptor (§6) over the rest of the crate, grounded on the
//! teacher's `server::routes` module: one `Router<AppState>`, a public half
//! with no identity gate and a protected half wrapped in `auth_middleware`
//! and `csrf_middleware`.

#![cfg(feature = "server")]

pub mod analyze;
pub mod auth;
pub mod authz;
pub mod csrf;
pub mod deployments;
pub mod previews;
pub mod projects;
pub mod services;
pub mod state;
pub mod webhooks;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::auth::middleware::{auth_middleware, AuthState};
use state::AppState;

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics_handler(axum::extract::State(state): axum::extract::State<AppState>) -> String {
    state.metrics_handle.render()
}

/// Routes reachable with no bearer token: the identity gate's own entry
/// points, the webhook receiver (authenticated by HMAC signature instead),
/// and the health/metrics probes.
fn public_router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/auth/login", post(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/jwks", get(auth::jwks))
        .route("/webhooks/{provider}", post(webhooks::handle_webhook))
}

/// Everything else: every route here runs behind `auth_middleware`
/// (resolves the bearer token into an `Actor`) and `csrf_middleware`
/// (double-submit cookie check on mutating methods).
fn protected_router(auth_state: Arc<AuthState>) -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(auth::logout))
        .route(
            "/integrations/github/repos/{owner}/{repo}/analyze",
            get(analyze::analyze_repository),
        )
        .route("/projects", get(projects::list_projects).post(projects::create_project))
        .route(
            "/projects/{slug}",
            get(projects::get_project)
                .patch(projects::rename_project)
                .delete(projects::delete_project),
        )
        .route(
            "/projects/{slug}/environments",
            get(projects::list_environments).post(projects::create_environment),
        )
        .route(
            "/projects/{slug}/environments/{name}",
            get(projects::get_environment).delete(projects::delete_environment),
        )
        .route(
            "/projects/{slug}/services",
            get(services::list_services).post(services::create_service),
        )
        .route(
            "/projects/{slug}/services/{name}",
            get(services::get_service).delete(services::delete_service),
        )
        .route(
            "/services/{service_id}/dependencies",
            get(services::list_dependencies).post(services::create_dependency),
        )
        .route(
            "/services/{service_id}/dependencies/{dependency_id}",
            delete(services::delete_dependency),
        )
        .route("/services/{service_id}/builds", post(services::trigger_build))
        .route("/builds/{release_id}", get(services::get_build))
        .route(
            "/services/{service_id}/domains",
            get(services::list_domains).post(services::create_domain),
        )
        .route("/services/{service_id}/domains/{domain_id}", delete(services::delete_domain))
        .route(
            "/services/{service_id}/routes",
            get(services::list_routes).post(services::create_route),
        )
        .route("/services/{service_id}/routes/{route_id}", delete(services::delete_route))
        .route(
            "/services/{service_id}/env-vars",
            get(services::list_env_vars).put(services::upsert_env_var),
        )
        .route(
            "/services/{service_id}/env-vars/{key}",
            delete(services::delete_env_var),
        )
        .route(
            "/projects/{slug}/deployments",
            get(deployments::list_deployment_groups).post(deployments::create_deployment),
        )
        .route("/projects/{slug}/deployments/{group_id}", get(deployments::get_deployment_group))
        .route(
            "/projects/{slug}/deployments/{group_id}/rollback",
            post(deployments::rollback_deployment_group),
        )
        .route(
            "/projects/{slug}/deployments/{group_id}/approve",
            post(deployments::approve_deployment_group),
        )
        .route(
            "/projects/{slug}/previews",
            get(previews::list_previews).post(previews::open_preview),
        )
        .route("/projects/{slug}/previews/{pr_number}", delete(previews::close_preview))
        .layer(middleware::from_fn(csrf::csrf_middleware))
        .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
}

/// Assembles the full router; `auth_state` is layered in separately from
/// `AppState` because `auth_middleware` runs as a `State<Arc<AuthState>>`
/// extractor independent of the router's own state type.
pub fn router(app_state: AppState) -> Router {
    let auth_state = app_state.auth.clone();
    Router::new()
        .merge(public_router())
        .merge(protected_router(auth_state))
        .with_state(app_state)
}

fn build_role_resolver(
    settings: &crate::config::Settings,
) -> Arc<dyn Fn(&str) -> crate::db::models::Role + Send + Sync> {
    let admins: std::collections::HashSet<String> = settings.auth.admin_subjects.iter().cloned().collect();
    let developers: std::collections::HashSet<String> = settings.auth.developer_subjects.iter().cloned().collect();
    Arc::new(move |subject: &str| {
        if admins.contains(subject) {
            crate::db::models::Role::Admin
        } else if developers.contains(subject) {
            crate::db::models::Role::Developer
        } else {
            crate::db::models::Role::Viewer
        }
    })
}

/// Local mode signs its own tokens with an operator-provided RSA keypair and
/// publishes the public half at `/auth/jwks` (§4.1, §9); federated mode
/// defers entirely to the external issuer's JWKS and publishes nothing of
/// its own.
async fn setup_auth(
    settings: &crate::config::Settings,
) -> anyhow::Result<(
    crate::auth::VerificationMode,
    Option<Arc<crate::auth::jwt::JwtSigner>>,
    Option<jsonwebtoken::DecodingKey>,
    Option<crate::auth::oidc::FederatedValidator>,
    Arc<crate::auth::jwks::JwksDocument>,
)> {
    use crate::auth::jwks::{jwks_from_public_key_pem, JwksDocument};
    use crate::auth::jwt::JwtSigner;
    use crate::auth::oidc::FederatedValidator;
    use crate::auth::VerificationMode;
    use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
    use rsa::RsaPrivateKey;

    if settings.auth.mode == "federated" {
        let issuer_url = settings
            .auth
            .oidc_issuer_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("auth.oidc_issuer_url is required in federated mode"))?;
        let validator = FederatedValidator::new(issuer_url, settings.auth.audience.clone()).await?;
        return Ok((
            VerificationMode::Federated,
            None,
            None,
            Some(validator),
            Arc::new(JwksDocument { keys: Vec::new() }),
        ));
    }

    let key_path = settings
        .auth
        .local_signing_key_path
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("auth.local_signing_key_path is required in local mode"))?;
    let private_pem = tokio::fs::read_to_string(key_path).await?;
    let private_key = RsaPrivateKey::from_pkcs1_pem(&private_pem)?;
    let public_pem = private_key.to_public_key().to_pkcs1_pem(LineEnding::LF)?;

    let signer = JwtSigner::new(private_pem.as_bytes(), settings.auth.issuer.clone(), settings.auth.audience.clone())?;
    let decoding_key = jsonwebtoken::DecodingKey::from_rsa_pem(public_pem.as_bytes())?;
    let jwks_doc = jwks_from_public_key_pem(&public_pem, &settings.auth.jwks_kid)?;

    Ok((
        VerificationMode::Local,
        Some(Arc::new(signer)),
        Some(decoding_key),
        None,
        Arc::new(jwks_doc),
    ))
}

/// Boots the full server: migrates the database, wires every component
/// (identity gate, audit drain, orchestrator and its build-pipeline
/// adaptors, preview controller + sweeper, webhook router), then serves
/// until a shutdown signal arrives.
///
/// `make_backend` builds the `DeploymentBackend` from the pool and
/// encryption provider this function constructs, rather than this function
/// taking a ready-made one: only the `k8s` feature provides an
/// implementation (`KubernetesBackend`), and it needs both the pool and the
/// encryption provider to read/decrypt env vars during reconcile. Keeping
/// the factory as a callback lets this module, and the migrations and
/// repository layer it drives, stay buildable under `server` alone.
pub async fn run_server(
    settings: crate::config::Settings,
    make_backend: impl FnOnce(
        sqlx::PgPool,
        Arc<dyn crate::secrets::EncryptionProvider>,
    ) -> Arc<dyn crate::reconciler::DeploymentBackend>,
) -> anyhow::Result<()> {
    use crate::auth::middleware::AuthState;
    use crate::auth::session_cache::RevocationCache;
    use crate::build::registry::{ClientAuthRegistry, RegistryProvider};
    use crate::build::sbom::{SbomGenerator, SyftGenerator};
    use crate::build::sign::{CosignSigner, ImageSigner};
    use crate::db::audit::AuditSink;
    use crate::db::Store;
    use crate::orchestrator::Orchestrator;
    use crate::preview::controller::PreviewController;
    use crate::secrets::{self, EncryptionProvider, LocalEncryptionProvider};
    use crate::supervisor::Supervisor;
    use crate::webhook::router::WebhookRouter;
    use std::time::Duration;

    let store = Store::connect(&settings.database.url, settings.database.max_connections).await?;
    store.migrate().await?;
    let pool = store.pool.clone();

    let metrics_handle = crate::metrics::install()?;

    let key_b64 = settings
        .encryption
        .key_b64
        .clone()
        .ok_or_else(|| anyhow::anyhow!("encryption.key_b64 is required to start the server"))?;
    let encryption: Arc<dyn EncryptionProvider> = Arc::new(LocalEncryptionProvider::new(&key_b64)?);
    secrets::self_test(encryption.as_ref()).await?;

    let mut supervisor = Supervisor::new();
    let audit = AuditSink::spawn(&mut supervisor, pool.clone(), 1024, false);

    let role_of = build_role_resolver(&settings);
    let (mode, jwt_signer, local_decoding_key, federated, jwks_doc) = setup_auth(&settings).await?;

    let auth_state = Arc::new(AuthState {
        mode,
        local_decoding_key,
        federated,
        audience: settings.auth.audience.clone(),
        revocation_cache: Arc::new(RevocationCache::new(
            settings.auth.revocation_cache_capacity,
            settings.auth.strict_revocation_check,
        )),
        strict_revocation_check: settings.auth.strict_revocation_check,
        role_of,
        audit: audit.clone(),
    });

    let registry: Arc<dyn RegistryProvider> = Arc::new(ClientAuthRegistry {
        registry_url: settings.build.registry_url.clone(),
    });
    let sbom_gen: Arc<dyn SbomGenerator> = Arc::new(SyftGenerator {
        store_prefix: settings.build.sbom_store_prefix.clone(),
    });
    let signer: Arc<dyn ImageSigner> = Arc::new(CosignSigner {
        key_ref: settings.build.cosign_key_ref.clone(),
        store_prefix: settings.build.signature_store_prefix.clone(),
    });

    let backend = make_backend(pool.clone(), encryption.clone());
    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        backend,
        sbom_gen,
        signer,
        registry,
        settings.build.registry_url.clone(),
    ));

    let previews = Arc::new(PreviewController::new(
        pool.clone(),
        orchestrator.clone(),
        settings.server.preview_base_domain.clone(),
    ));
    let webhooks = Arc::new(WebhookRouter::new(
        settings.server.webhook_secret.clone(),
        orchestrator.clone(),
        previews.clone(),
    ));

    let sweep_pool = pool.clone();
    let auto_sleep_after_secs = settings.controller.preview_auto_sleep_after_secs;
    let sweep_interval = Duration::from_secs(settings.controller.preview_sweep_interval_secs);
    supervisor.spawn("preview-sweeper", move |cancel| {
        let pool = sweep_pool.clone();
        async move { crate::preview::sweeper::run(pool, auto_sleep_after_secs, sweep_interval, cancel).await }
    });

    let host = settings.server.host.clone();
    let port = settings.server.port;

    let app_state = AppState {
        pool,
        settings: Arc::new(settings),
        auth: auth_state,
        orchestrator,
        previews,
        webhooks,
        audit,
        encryption,
        jwt_signer,
        jwks: jwks_doc,
        metrics_handle,
    };

    let app = router(app_state);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "enclii listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    supervisor.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
