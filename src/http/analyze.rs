//! `GET /integrations/github/repos/{owner}/{repo}/analyze` (§6, §4.4): fetch
//! a repository's tree and propose deployable services, without cloning or
//! registering anything.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::state::AppState;
use crate::analyzer::{self, github, DetectedService};
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    #[serde(default)]
    pub subpath: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub services: Vec<DetectedService>,
    pub monorepo_tool: Option<&'static str>,
}

pub async fn analyze_repository(
    State(_state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<AnalyzeQuery>,
) -> Result<Json<AnalyzeResponse>> {
    let client = reqwest::Client::new();
    let entries = github::fetch_tree(&client, &owner, &repo).await?;

    let monorepo_tool = analyzer::detect_monorepo_tool(&entries).map(|tool| match tool {
        analyzer::MonorepoTool::Turborepo => "turborepo",
        analyzer::MonorepoTool::Nx => "nx",
        analyzer::MonorepoTool::Lerna => "lerna",
        analyzer::MonorepoTool::PnpmWorkspace => "pnpm-workspace",
    });

    let services = analyzer::detect_services(&entries, query.subpath.as_deref());

    Ok(Json(AnalyzeResponse { services, monorepo_tool }))
}
