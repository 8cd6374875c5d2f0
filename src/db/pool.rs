//! `withTx` primitive (§4.2): read-committed, all-or-nothing multi-entity
//! writes. Every transactional operation also writes its audit record on the
//! same handle, so a rollback discards both or neither.

use crate::error::{Error, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;

#[derive(Clone)]
pub struct Store {
    pub pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Runs `f` inside a transaction, committing on `Ok` and rolling back on
/// `Err` or panic. Pool saturation surfaces as `ErrorKind::Transient`
/// (§4.2: "Connection pool is bounded; saturation is a Transient").
pub async fn with_tx<F, Fut, T>(pool: &PgPool, f: F) -> Result<T>
where
    F: FnOnce(Transaction<'static, Postgres>) -> Fut,
    Fut: std::future::Future<Output = Result<(Transaction<'static, Postgres>, T)>>,
{
    let tx = pool.begin().await.map_err(|e| match e {
        sqlx::Error::PoolTimedOut => {
            Error::transient("connection pool saturated").with_retry_after(1)
        }
        other => Error::from(other),
    })?;

    let (tx, value) = f(tx).await?;
    tx.commit()
        .await
        .map_err(|e| Error::internal_anyhow(e.into(), "failed to commit transaction"))?;
    Ok(value)
}
