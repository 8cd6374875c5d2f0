//! Inbound webhook delivery (§6: `POST /webhooks/{provider}`, §4.9).
//! Unauthenticated by bearer token — the HMAC signature on the body is the
//! only credential — so this route is mounted on the public router.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use super::state::AppState;
use crate::error::{Error, Result};
use crate::webhook::router::WebhookOutcome;

#[derive(Debug, Serialize)]
#[serde(tag = "outcome")]
pub enum WebhookResponse {
    Ignored,
    Replayed,
    PushProcessed {
        enqueued: Vec<Uuid>,
        pending_approval: Vec<Uuid>,
    },
    PreviewProcessed {
        preview_id: Uuid,
    },
}

impl From<WebhookOutcome> for WebhookResponse {
    fn from(outcome: WebhookOutcome) -> Self {
        match outcome {
            WebhookOutcome::Ignored => WebhookResponse::Ignored,
            WebhookOutcome::Replayed => WebhookResponse::Replayed,
            WebhookOutcome::PushProcessed { enqueued, pending_approval } => {
                WebhookResponse::PushProcessed { enqueued, pending_approval }
            }
            WebhookOutcome::PreviewProcessed { preview_id } => WebhookResponse::PreviewProcessed { preview_id },
        }
    }
}

/// `{provider}` is accepted but not yet branched on — every supported
/// provider delivers the same `push`/`pull_request` shapes `WebhookRouter`
/// already parses; the path segment exists so distinct providers can get
/// distinct secrets and signature schemes once a second one is onboarded.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(_provider): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>)> {
    let event_type = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::validation("missing X-GitHub-Event header"))?;
    let delivery_id = headers
        .get("X-GitHub-Delivery")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::validation("missing X-GitHub-Delivery header"))?;
    let signature_header = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::validation("missing X-Hub-Signature-256 header"))?;

    let outcome = state
        .webhooks
        .handle(&state.pool, event_type, delivery_id, signature_header, &body)
        .await?;

    Ok((StatusCode::OK, Json(outcome.into())))
}
