//! Identity-gate HTTP surface (§6): `/auth/login`, `/auth/logout`,
//! `/auth/callback`, `/auth/jwks`. Login and the OIDC callback exchange have
//! no prior bearer token to check, so they (and the jwks document) are
//! mounted on the public router in `http::routes`; logout acts on the
//! caller's own session and is mounted on the protected router.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::AppState;
use crate::auth::Actor;
use crate::db::{audit, sessions};
use crate::error::{Error, ErrorExt, Result};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub subject: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// `POST /auth/login` — local mode only (§6). Federated deployments have no
/// password of their own to check here; the browser goes straight to the
/// IdP's authorization endpoint and lands back on `/auth/callback`.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    if state.settings.auth.mode != "local" {
        return Err(Error::validation(
            "local login is disabled in federated mode; authenticate with the configured OIDC provider",
        ));
    }
    let signer = state
        .jwt_signer
        .as_ref()
        .ok_or_else(|| Error::internal("local signing key is not configured"))?;

    let session_id = Uuid::new_v4().to_string();
    let ttl = state.settings.auth.token_ttl_secs;
    let expires_at = Utc::now() + Duration::seconds(ttl);
    sessions::create(&state.pool, &session_id, &req.subject, &req.scopes, expires_at).await?;

    let token = signer
        .issue(&req.subject, &session_id, req.scopes.clone(), ttl)
        .internal_err("failed to issue session token")?;

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &req.subject,
            action: "auth.login",
            entity_type: "session",
            entity_id: None,
            details: serde_json::json!({ "session_id": session_id }),
            ip: None,
            user_agent: None,
        })
        .await;

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer",
        expires_in: ttl,
    }))
}

/// `POST /auth/logout` (§6): revokes the caller's own session, both in the
/// durable store and in the fast in-process revocation cache so the next
/// request with this token is rejected immediately.
pub async fn logout(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<StatusCode> {
    sessions::revoke(&state.pool, &actor.session_id).await?;
    state.auth.revocation_cache.revoke(&actor.session_id);

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &actor.subject,
            action: "auth.logout",
            entity_type: "session",
            entity_id: None,
            details: serde_json::json!({ "session_id": actor.session_id }),
            ip: None,
            user_agent: None,
        })
        .await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: Option<u64>,
}

/// `GET /auth/callback` (§6): completes the OIDC authorization-code
/// exchange, validates the returned access token against the issuer's JWKS,
/// and records a session so it can later be revoked.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<CallbackResponse>> {
    let federated = state
        .auth
        .federated
        .as_ref()
        .ok_or_else(|| Error::internal("federated verification is not configured"))?;

    let client_id = state
        .settings
        .auth
        .oidc_client_id
        .clone()
        .ok_or_else(|| Error::internal("oidc_client_id is not configured"))?;
    let client_secret = state.settings.auth.oidc_client_secret.clone();
    let redirect_url = state
        .settings
        .auth
        .oidc_redirect_url
        .clone()
        .ok_or_else(|| Error::internal("oidc_redirect_url is not configured"))?;

    let client = oauth2::basic::BasicClient::new(
        oauth2::ClientId::new(client_id),
        client_secret.map(oauth2::ClientSecret::new),
        oauth2::AuthUrl::new(federated.metadata.authorization_endpoint.clone())
            .internal_err("invalid authorization endpoint")?,
        Some(
            oauth2::TokenUrl::new(federated.metadata.token_endpoint.clone())
                .internal_err("invalid token endpoint")?,
        ),
    )
    .set_redirect_uri(oauth2::RedirectUrl::new(redirect_url).internal_err("invalid redirect url")?);

    let token_result = client
        .exchange_code(oauth2::AuthorizationCode::new(query.code))
        .request_async(oauth2::reqwest::async_http_client)
        .await
        .map_err(|e| Error::auth(format!("authorization code exchange failed: {e}")))?;

    let access_token = oauth2::TokenResponse::access_token(&token_result)
        .secret()
        .clone();
    let expires_in = oauth2::TokenResponse::expires_in(&token_result).map(|d| d.as_secs());

    let claims = federated
        .verify(&access_token)
        .await
        .map_err(|e| Error::auth(format!("issued token failed verification: {e}")))?;

    let expires_at = Utc::now() + Duration::seconds(expires_in.unwrap_or(3600) as i64);
    sessions::create(&state.pool, &claims.sid, &claims.sub, &claims.scopes, expires_at).await?;

    let _ = state
        .audit
        .emit(audit::NewAuditRecord {
            actor: &claims.sub,
            action: "auth.login",
            entity_type: "session",
            entity_id: None,
            details: serde_json::json!({ "session_id": claims.sid, "state": query.state }),
            ip: None,
            user_agent: None,
        })
        .await;

    Ok(Json(CallbackResponse {
        token: access_token,
        token_type: "Bearer",
        expires_in,
    }))
}

/// `GET /auth/jwks` (§6, §9): publishes the local verification keys so every
/// replica of this service (and any other relying party) can verify tokens
/// issued by any replica.
pub async fn jwks(State(state): State<AppState>) -> Json<std::sync::Arc<crate::auth::jwks::JwksDocument>> {
    Json(state.jwks.clone())
}
