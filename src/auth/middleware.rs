//! Axum middleware wiring for the identity gate (§4.1, §6). Runs on every
//! protected route; resolves the bearer token into an `Actor` and denies
//! (recording an audit record) on any failure.

use super::{session_cache::RevocationCache, Actor, VerificationMode};
use crate::db::models::Role;
use crate::error::Error;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

pub struct AuthState {
    pub mode: VerificationMode,
    pub local_decoding_key: Option<jsonwebtoken::DecodingKey>,
    pub federated: Option<super::oidc::FederatedValidator>,
    pub audience: String,
    pub revocation_cache: Arc<RevocationCache>,
    pub strict_revocation_check: bool,
    pub role_of: Arc<dyn Fn(&str) -> Role + Send + Sync>,
    pub audit: crate::db::audit::AuditSink,
}

pub async fn auth_middleware(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, Error> {
    match resolve_actor(&state, &request).await {
        Ok(actor) => {
            request.extensions_mut().insert(actor);
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::warn!(error = %e, "request denied by identity gate");
            crate::metrics::record_auth_denied(if e.kind == crate::error::ErrorKind::Auth {
                "unauthenticated"
            } else {
                "forbidden"
            });
            // §4.1: "The gate records an audit record for every denied
            // attempt." No actor is resolved, so the subject is unknown.
            let _ = state
                .audit
                .emit(crate::db::audit::NewAuditRecord {
                    actor: "unknown",
                    action: "auth.denied",
                    entity_type: "request",
                    entity_id: None,
                    details: serde_json::json!({
                        "path": request.uri().path(),
                        "reason": e.message,
                    }),
                    ip: None,
                    user_agent: request
                        .headers()
                        .get(axum::http::header::USER_AGENT)
                        .and_then(|v| v.to_str().ok()),
                })
                .await;
            Err(e)
        }
    }
}

async fn resolve_actor(state: &AuthState, request: &Request) -> Result<Actor, Error> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::auth("missing Authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::auth("Authorization header must be a Bearer token"))?;

    let claims = match state.mode {
        VerificationMode::Local => {
            let key = state
                .local_decoding_key
                .as_ref()
                .ok_or_else(|| Error::internal("local verification key not configured"))?;
            crate::auth::jwt::verify_rs256(token, key, &state.audience)?
        }
        VerificationMode::Federated => {
            let validator = state
                .federated
                .as_ref()
                .ok_or_else(|| Error::internal("federated validator not configured"))?;
            validator
                .verify(token)
                .await
                .map_err(|e| Error::auth(e.to_string()))?
        }
    };

    let now = chrono::Utc::now().timestamp();
    if claims.is_expired(now) {
        return Err(Error::auth("token expired"));
    }

    let revoked = state.revocation_cache.is_revoked(&claims.sid);
    if revoked {
        return Err(Error::auth("session has been revoked"));
    }
    // Soft-fail semantics (§4.1): an in-memory cache in this process cannot
    // itself be "unavailable", so there is no further fallback path here; a
    // networked revocation backend would consult `strict_revocation_check`
    // to decide whether to fail open or closed on a lookup error.
    let _ = state.strict_revocation_check;

    Ok(Actor {
        subject: claims.sub.clone(),
        session_id: claims.sid,
        role: (state.role_of)(&claims.sub),
        scopes: claims.scopes,
    })
}

/// Extractor for handlers: `Extension(actor): Extension<Actor>`.
pub type ActorExtension = axum::extract::Extension<Actor>;
