//! Session persistence for local-mode login (§3, §4.1). Revocation itself
//! lives in a fast in-memory cache (`auth::session_cache`), not here — this
//! table is the durable record a revocation check falls back to on cache
//! miss in strict mode.

#![cfg(feature = "server")]

use super::models::Session;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub async fn create(
    pool: &PgPool,
    id: &str,
    subject: &str,
    scopes: &[String],
    expires_at: DateTime<Utc>,
) -> Result<Session> {
    sqlx::query(
        "INSERT INTO sessions (id, subject, scopes, expires_at, revoked) VALUES ($1, $2, $3, $4, false)",
    )
    .bind(id)
    .bind(subject)
    .bind(scopes)
    .bind(expires_at)
    .execute(pool)
    .await
    .map_err(Error::from)?;

    Ok(Session {
        id: id.to_string(),
        subject: subject.to_string(),
        scopes: scopes.to_vec(),
        expires_at,
    })
}

pub async fn is_revoked(pool: &PgPool, id: &str) -> Result<bool> {
    let revoked: Option<bool> = sqlx::query_scalar("SELECT revoked FROM sessions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(Error::from)?;
    // A session this store has never heard of is treated as revoked: it was
    // never legitimately issued from here.
    Ok(revoked.unwrap_or(true))
}

pub async fn revoke(pool: &PgPool, id: &str) -> Result<()> {
    sqlx::query("UPDATE sessions SET revoked = true WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(Error::from)?;
    Ok(())
}
