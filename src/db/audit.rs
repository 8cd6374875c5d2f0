//! AuditRecord persistence (§3: append-only, write-only at the API surface,
//! deletions forbidden — enforced both by never exposing a delete function
//! here and by a database rule/trigger denying `DELETE` on the table).

#![cfg(feature = "server")]

use super::models::AuditRecord;
use crate::error::{Error, Result};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub struct NewAuditRecord<'a> {
    pub actor: &'a str,
    pub action: &'a str,
    pub entity_type: &'a str,
    pub entity_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

/// Appends a record on the given transaction handle so it commits atomically
/// with the mutation it describes (§4.2, §5: "Audit records for a single
/// request are ... written in the same transaction as the mutation").
pub async fn append_tx(
    tx: &mut Transaction<'_, Postgres>,
    record: NewAuditRecord<'_>,
) -> Result<AuditRecord> {
    sqlx::query_as::<_, AuditRecord>(
        r#"INSERT INTO audit_records (id, actor, action, entity_type, entity_id, timestamp, details, ip, user_agent)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, now(), $5, $6, $7)
           RETURNING id, actor, action, entity_type, entity_id, timestamp, details, ip, user_agent"#,
    )
    .bind(record.actor)
    .bind(record.action)
    .bind(record.entity_type)
    .bind(record.entity_id)
    .bind(record.details)
    .bind(record.ip)
    .bind(record.user_agent)
    .fetch_one(&mut **tx)
    .await
    .map_err(Error::from)
}

/// Appends directly on the pool — used by the bounded audit-drain task
/// (§5) for events not tied to a single request transaction (e.g. a denied
/// auth attempt before any entity mutation exists).
pub async fn append(pool: &PgPool, record: NewAuditRecord<'_>) -> Result<AuditRecord> {
    sqlx::query_as::<_, AuditRecord>(
        r#"INSERT INTO audit_records (id, actor, action, entity_type, entity_id, timestamp, details, ip, user_agent)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, now(), $5, $6, $7)
           RETURNING id, actor, action, entity_type, entity_id, timestamp, details, ip, user_agent"#,
    )
    .bind(record.actor)
    .bind(record.action)
    .bind(record.entity_type)
    .bind(record.entity_id)
    .bind(record.details)
    .bind(record.ip)
    .bind(record.user_agent)
    .fetch_one(pool)
    .await
    .map_err(Error::from)
}

/// An owned copy of `NewAuditRecord`, for records that outlive the request
/// that produced them on their way through the drain channel.
pub struct OwnedAuditRecord {
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl From<NewAuditRecord<'_>> for OwnedAuditRecord {
    fn from(r: NewAuditRecord<'_>) -> Self {
        Self {
            actor: r.actor.to_string(),
            action: r.action.to_string(),
            entity_type: r.entity_type.to_string(),
            entity_id: r.entity_id,
            details: r.details,
            ip: r.ip.map(str::to_string),
            user_agent: r.user_agent.map(str::to_string),
        }
    }
}

/// Single-writer audit drain (§5): mutations that have no open transaction
/// to piggyback on (chiefly denied-auth attempts, §4.1) enqueue here instead
/// of writing directly. A bounded channel backs it; a full channel is a
/// fail-open drop with a counter bump by default, or a hard error in strict
/// mode, matching the redesign flag in §9 ("never silently discard audit
/// records without a counter bump").
#[derive(Clone)]
pub struct AuditSink {
    tx: tokio::sync::mpsc::Sender<OwnedAuditRecord>,
    fail_closed: bool,
}

impl AuditSink {
    /// Spawns the drain task under `supervisor` and returns a sink handle.
    /// `capacity` bounds the channel (§5: "a bounded channel"); `fail_closed`
    /// selects the §5 behavior when it's full.
    pub fn spawn(
        supervisor: &mut crate::supervisor::Supervisor,
        pool: PgPool,
        capacity: usize,
        fail_closed: bool,
    ) -> Self {
        let (tx, rx) = tokio::sync::mpsc::channel::<OwnedAuditRecord>(capacity);
        let rx = std::sync::Arc::new(tokio::sync::Mutex::new(rx));
        supervisor.spawn("audit-drain", move |cancel| {
            let pool = pool.clone();
            let rx = rx.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        received = async { rx.lock().await.recv().await } => {
                            let Some(record) = received else { return };
                            let result = append(
                                &pool,
                                NewAuditRecord {
                                    actor: &record.actor,
                                    action: &record.action,
                                    entity_type: &record.entity_type,
                                    entity_id: record.entity_id,
                                    details: record.details,
                                    ip: record.ip.as_deref(),
                                    user_agent: record.user_agent.as_deref(),
                                },
                            )
                            .await;
                            if let Err(e) = result {
                                tracing::error!(error = %e, "failed to persist drained audit record");
                            }
                        }
                    }
                }
            }
        });
        Self { tx, fail_closed }
    }

    /// Enqueues `record`. Never blocks: a full channel is handled per
    /// `fail_closed` rather than backpressuring the caller.
    pub async fn emit(&self, record: NewAuditRecord<'_>) -> Result<()> {
        match self.tx.try_send(record.into()) {
            Ok(()) => Ok(()),
            Err(_full_or_closed) => {
                crate::metrics::record_audit_dropped();
                if self.fail_closed {
                    Err(Error::internal("audit drain channel saturated (fail-closed)"))
                } else {
                    tracing::warn!("audit drain channel full, dropping record (fail-open)");
                    Ok(())
                }
            }
        }
    }
}

pub async fn list_for_entity(
    pool: &PgPool,
    entity_type: &str,
    entity_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditRecord>> {
    sqlx::query_as::<_, AuditRecord>(
        "SELECT id, actor, action, entity_type, entity_id, timestamp, details, ip, user_agent
         FROM audit_records WHERE entity_type = $1 AND entity_id = $2
         ORDER BY timestamp DESC LIMIT $3 OFFSET $4",
    )
    .bind(entity_type)
    .bind(entity_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(Error::from)
}
