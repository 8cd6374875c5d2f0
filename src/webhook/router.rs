//! Event parsing and dispatch (§4.9). Push events are resolved to affected
//! services/environments and handed to the orchestrator (C6); pull-request
//! events are delegated whole to the preview controller (C8).

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::dedup::DeliveryDedup;
use super::signature;
use crate::db::models::{GroupStatus, Trigger};
use crate::db::{deployment_groups, environments, services};
use crate::error::{Error, Result};
use crate::orchestrator::{CreateGroupRequest, Orchestrator};
use crate::preview::controller::PreviewController;

#[derive(Debug, Deserialize)]
struct CommitInfo {
    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    removed: Vec<String>,
    #[serde(default)]
    modified: Vec<String>,
}

/// A source-control push event. `repository` is expected to match the
/// `git_repository` value services were registered with.
#[derive(Debug, Deserialize)]
pub struct PushEvent {
    pub repository: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub head_commit_sha: String,
    #[serde(default)]
    commits: Vec<CommitInfo>,
}

impl PushEvent {
    fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/heads/")
    }

    fn changed_paths(&self) -> Vec<String> {
        let mut paths = BTreeSet::new();
        for commit in &self.commits {
            paths.extend(commit.added.iter().cloned());
            paths.extend(commit.removed.iter().cloned());
            paths.extend(commit.modified.iter().cloned());
        }
        paths.into_iter().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Opened,
    Reopened,
    Synchronize,
    Closed,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,
    pub number: i32,
    pub repository: String,
    pub head_sha: String,
    pub head_ref: String,
}

#[derive(Debug)]
pub enum WebhookOutcome {
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

pub struct WebhookRouter {
    secret: String,
    dedup: DeliveryDedup,
    orchestrator: Arc<Orchestrator>,
    previews: Arc<PreviewController>,
}

impl WebhookRouter {
    pub fn new(secret: String, orchestrator: Arc<Orchestrator>, previews: Arc<PreviewController>) -> Self {
        Self {
            secret,
            dedup: DeliveryDedup::default(),
            orchestrator,
            previews,
        }
    }

    /// Entry point for `POST /webhooks/{provider}` (§6). Verifies the
    /// signature, drops replays, then dispatches by event type. Unrecognized
    /// event types are acknowledged as `Ignored` rather than rejected, per
    /// §4.9: "Unrecognized events are ignored."
    pub async fn handle(
        &self,
        pool: &PgPool,
        event_type: &str,
        delivery_id: &str,
        signature_header: &str,
        body: &[u8],
    ) -> Result<WebhookOutcome> {
        signature::verify(&self.secret, body, signature_header)?;

        if self.dedup.is_replay(delivery_id) {
            info!(delivery_id, "dropping replayed webhook delivery");
            crate::metrics::record_webhook_replay_dropped(event_type);
            return Ok(WebhookOutcome::Replayed);
        }

        match event_type {
            "push" => {
                let event: PushEvent = serde_json::from_slice(body)
                    .map_err(|e| Error::validation(format!("malformed push payload: {e}")))?;
                self.handle_push(pool, event).await
            }
            "pull_request" => {
                let event: PullRequestEvent = serde_json::from_slice(body)
                    .map_err(|e| Error::validation(format!("malformed pull_request payload: {e}")))?;
                self.handle_pull_request(pool, event).await
            }
            other => {
                info!(event = other, "ignoring unrecognized webhook event type");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// §4.9 push handling: resolve the tracked `(repo, branch)` to its
    /// services, compute the affected set (delegated to the orchestrator's
    /// `select_services`, invoked via `create_group`'s `changed_paths`
    /// path), and enqueue one DeploymentGroup per matching environment.
    async fn handle_push(&self, pool: &PgPool, event: PushEvent) -> Result<WebhookOutcome> {
        let Some(branch) = event.branch() else {
            info!(git_ref = %event.git_ref, "ignoring push to a non-branch ref");
            return Ok(WebhookOutcome::Ignored);
        };

        let matched_services = services::list_for_repo_branch(pool, &event.repository, branch).await?;
        if matched_services.is_empty() {
            return Ok(WebhookOutcome::PushProcessed {
                enqueued: Vec::new(),
                pending_approval: Vec::new(),
            });
        }

        let mut project_ids: BTreeSet<Uuid> = matched_services.iter().map(|s| s.project_id).collect();
        let changed_paths = event.changed_paths();

        let mut enqueued = Vec::new();
        let mut pending_approval = Vec::new();

        for project_id in project_ids.drain() {
            let target_envs = environments::list_auto_deploy_for_branch(pool, project_id, branch).await?;
            for env in target_envs {
                let req = CreateGroupRequest {
                    project_id,
                    environment_id: env.id,
                    service_ids: None,
                    trigger: Trigger::Webhook,
                    commit_sha: event.head_commit_sha.clone(),
                    pr_url: None,
                    changed_paths: Some(changed_paths.clone()),
                };

                if env.requires_approval {
                    match self.orchestrator.create_group(req).await {
                        Ok((group, _layers)) => pending_approval.push(group.id),
                        Err(e) => warn!(environment_id = %env.id, error = %e, "failed to create pending group for approval"),
                    }
                    continue;
                }

                match self.orchestrator.create_group(req).await {
                    Ok((group, layers)) => {
                        enqueued.push(group.id);
                        let orchestrator = self.orchestrator.clone();
                        let group_for_task = group.clone();
                        tokio::spawn(async move {
                            if let Err(e) = orchestrator
                                .run_group(group_for_task, layers, CancellationToken::new())
                                .await
                            {
                                warn!(error = %e, "webhook-dispatched group failed");
                            }
                        });
                    }
                    Err(e) => warn!(environment_id = %env.id, error = %e, "failed to create deployment group"),
                }
            }
        }

        Ok(WebhookOutcome::PushProcessed {
            enqueued,
            pending_approval,
        })
    }

    async fn handle_pull_request(&self, _pool: &PgPool, event: PullRequestEvent) -> Result<WebhookOutcome> {
        let preview_id = self.previews.handle_event(event).await?;
        Ok(WebhookOutcome::PreviewProcessed { preview_id })
    }
}

/// Approves a group that was created `pending` by an approval-requiring
/// environment (§4.6 escalation, §4.9). Dispatches it the same way a fresh
/// webhook-triggered group would be.
pub async fn approve_pending_group(
    pool: &PgPool,
    orchestrator: Arc<Orchestrator>,
    group_id: Uuid,
) -> Result<()> {
    let group = deployment_groups::get(pool, group_id).await?;
    if group.status != GroupStatus::Pending {
        return Err(Error::conflict("group is not awaiting approval"));
    }

    let deployments = crate::db::deployments::list_for_group(pool, group.id).await?;
    let mut layers: Vec<Vec<Uuid>> = Vec::new();
    for d in &deployments {
        let idx = d.deploy_order as usize;
        while layers.len() <= idx {
            layers.push(Vec::new());
        }
        layers[idx].push(d.service_id);
    }

    orchestrator.run_group(group, layers, CancellationToken::new()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_event_collects_changed_paths_across_commits() {
        let raw = serde_json::json!({
            "repository": "git@github.com:acme/api.git",
            "ref": "refs/heads/main",
            "head_commit_sha": "abc123",
            "commits": [
                {"added": ["apps/api/server.go"], "removed": [], "modified": []},
                {"added": [], "removed": [], "modified": ["packages/shared/util.ts"]}
            ]
        });
        let event: PushEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.branch(), Some("main"));
        let paths = event.changed_paths();
        assert!(paths.contains(&"apps/api/server.go".to_string()));
        assert!(paths.contains(&"packages/shared/util.ts".to_string()));
    }

    #[test]
    fn push_event_to_a_tag_is_not_a_branch() {
        let raw = serde_json::json!({
            "repository": "git@github.com:acme/api.git",
            "ref": "refs/tags/v1.0.0",
            "head_commit_sha": "abc123",
            "commits": []
        });
        let event: PushEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.branch(), None);
    }

    #[test]
    fn unknown_pull_request_action_falls_back_to_other() {
        let raw = serde_json::json!({
            "action": "labeled",
            "number": 1,
            "repository": "git@github.com:acme/api.git",
            "head_sha": "abc123",
            "head_ref": "feature/x"
        });
        let event: PullRequestEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.action, PullRequestAction::Other);
    }
}
