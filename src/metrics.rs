//! Prometheus metrics (§5 AMBIENT). The teacher doesn't expose a metrics
//! endpoint; this is pulled in from the pack's broader convention of
//! exporting `metrics` + `metrics-exporter-prometheus` text at `/metrics`
//! for anything meant to run as a long-lived service.

#![cfg(feature = "server")]

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global recorder; call once at startup before any of the
/// `record_*` functions below are used. The returned handle renders the
/// current snapshot as Prometheus text exposition format.
pub fn install() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

pub fn record_build_started() {
    metrics::counter!("enclii_builds_started_total").increment(1);
}

pub fn record_build_finished(stage_failed: Option<&str>) {
    match stage_failed {
        None => metrics::counter!("enclii_builds_finished_total", "status" => "ready").increment(1),
        Some(stage) => {
            metrics::counter!("enclii_builds_finished_total", "status" => "failed").increment(1);
            metrics::counter!("enclii_build_stage_failures_total", "stage" => stage.to_string())
                .increment(1);
        }
    }
}

pub fn record_deployment_group_created(trigger: &str) {
    metrics::counter!("enclii_deployment_groups_created_total", "trigger" => trigger.to_string())
        .increment(1);
}

pub fn record_deployment_group_finished(succeeded: bool) {
    let status = if succeeded { "succeeded" } else { "failed" };
    metrics::counter!("enclii_deployment_groups_finished_total", "status" => status).increment(1);
}

pub fn record_reconcile_pass(phase: &str) {
    metrics::counter!("enclii_reconcile_passes_total", "phase" => phase.to_string()).increment(1);
}

pub fn record_webhook_replay_dropped(provider: &str) {
    metrics::counter!("enclii_webhook_replays_dropped_total", "provider" => provider.to_string())
        .increment(1);
}

pub fn record_preview_sleep() {
    metrics::counter!("enclii_previews_slept_total").increment(1);
}

pub fn record_preview_wake() {
    metrics::counter!("enclii_previews_woken_total").increment(1);
}

/// §5: "fail-open with an incremented dropped-audit counter" when the audit
/// drain's bounded channel is full.
pub fn record_audit_dropped() {
    metrics::counter!("enclii_audit_records_dropped_total").increment(1);
}

pub fn record_auth_denied(reason: &str) {
    metrics::counter!("enclii_auth_denied_total", "reason" => reason.to_string()).increment(1);
}

/// §4.7 health-gated rollback: a canary's sustained error-rate breach (2%
/// for >= 2 minutes) aborted the rollout before it reached 100%.
pub fn record_canary_rollback() {
    metrics::counter!("enclii_canary_rollbacks_total").increment(1);
}
