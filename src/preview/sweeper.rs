//! Idle-sleep sweeper (§4.8: "a background sweeper marks previews `sleeping`
//! after `auto_sleep_after` of inactivity"). Spawned alongside the other
//! controller loops in `run_server`, using the same `tokio::spawn` +
//! `tokio::time::interval` shape as the teacher's project/ECR controllers.

use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::db::models::PreviewStatus;
use crate::db::previews;

/// Runs until `cancel` fires, checking for idle previews every `interval`.
pub async fn run(pool: PgPool, auto_sleep_after_secs: i64, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("preview idle sweeper shutting down");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = sweep_once(&pool, auto_sleep_after_secs).await {
                    error!(error = %e, "preview idle sweep failed");
                }
            }
        }
    }
}

async fn sweep_once(pool: &PgPool, auto_sleep_after_secs: i64) -> crate::error::Result<()> {
    let idle = previews::list_idle_active(pool, auto_sleep_after_secs).await?;
    for preview in idle {
        previews::set_status(pool, preview.id, PreviewStatus::Sleeping).await?;
        crate::metrics::record_preview_sleep();
        info!(preview_id = %preview.id, pr_number = preview.pr_number, "preview environment put to sleep after inactivity");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_is_reasonable() {
        let interval = Duration::from_secs(60);
        assert!(interval.as_secs() > 0 && interval.as_secs() <= 300);
    }
}
