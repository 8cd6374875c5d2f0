//! Client-side subcommands: each variant mirrors one of the HTTP endpoints
//! in `http::mod::protected_router`. Naming and `visible_alias` usage follow
//! the teacher's `rise-cli::{Project,Team,Deployment}Commands` style.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::Table;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::client::ApiClient;

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create a new project
    #[command(visible_alias = "c")]
    Create { slug: String, name: String },
    /// List all projects
    #[command(visible_alias = "ls")]
    List {},
    /// Show project details
    #[command(visible_alias = "s")]
    Show { slug: String },
    /// Delete a project
    #[command(visible_alias = "rm")]
    Delete { slug: String },
}

#[derive(Subcommand, Debug)]
pub enum ServiceCommands {
    /// List services in a project
    #[command(visible_alias = "ls")]
    List { project: String },
    /// Show a service
    #[command(visible_alias = "s")]
    Show { project: String, name: String },
    /// Delete a service
    #[command(visible_alias = "rm")]
    Delete { project: String, name: String },
}

#[derive(Subcommand, Debug)]
pub enum DeploymentCommands {
    /// List deployment groups for a project
    #[command(visible_alias = "ls")]
    List { project: String },
    /// Trigger a new deployment
    #[command(visible_alias = "c")]
    Create {
        project: String,
        /// Environment name, e.g. "production"
        environment: String,
        /// Commit sha to deploy
        commit_sha: String,
    },
    /// Show a deployment group's status
    #[command(visible_alias = "s")]
    Show { project: String, group_id: String },
    /// Roll a deployment group back to its previous release
    Rollback { project: String, group_id: String },
    /// Approve a deployment group pending approval
    Approve { project: String, group_id: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct Project {
    id: String,
    slug: String,
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Service {
    id: String,
    name: String,
    git_repository: String,
    git_branch: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct DeploymentGroup {
    id: String,
    status: String,
    commit_sha: String,
    created_at: String,
}

pub async fn run_project(client: &ApiClient, cmd: ProjectCommands) -> Result<()> {
    match cmd {
        ProjectCommands::Create { slug, name } => {
            let project: Project = client.post("projects", &json!({ "slug": slug, "name": name })).await?;
            println!("created project {} ({})", project.slug, project.id);
        }
        ProjectCommands::List {} => {
            let page: Page<Project> = client.get("projects").await?;
            let mut table = Table::new();
            table.set_header(vec!["SLUG", "NAME", "ID"]);
            for p in page.data {
                table.add_row(vec![p.slug, p.name, p.id]);
            }
            println!("{table}");
        }
        ProjectCommands::Show { slug } => {
            let project: Project = client.get(&format!("projects/{slug}")).await?;
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        ProjectCommands::Delete { slug } => {
            client.delete(&format!("projects/{slug}")).await?;
            println!("deleted project {slug}");
        }
    }
    Ok(())
}

pub async fn run_service(client: &ApiClient, cmd: ServiceCommands) -> Result<()> {
    match cmd {
        ServiceCommands::List { project } => {
            let page: Page<Service> = client.get(&format!("projects/{project}/services")).await?;
            let mut table = Table::new();
            table.set_header(vec!["NAME", "REPOSITORY", "BRANCH"]);
            for s in page.data {
                table.add_row(vec![s.name, s.git_repository, s.git_branch]);
            }
            println!("{table}");
        }
        ServiceCommands::Show { project, name } => {
            let service: Service = client.get(&format!("projects/{project}/services/{name}")).await?;
            println!("{}", serde_json::to_string_pretty(&service)?);
        }
        ServiceCommands::Delete { project, name } => {
            client.delete(&format!("projects/{project}/services/{name}")).await?;
            println!("deleted service {name}");
        }
    }
    Ok(())
}

pub async fn run_deployment(client: &ApiClient, cmd: DeploymentCommands) -> Result<()> {
    match cmd {
        DeploymentCommands::List { project } => {
            let page: Page<DeploymentGroup> = client.get(&format!("projects/{project}/deployments")).await?;
            let mut table = Table::new();
            table.set_header(vec!["ID", "STATUS", "COMMIT", "CREATED"]);
            for g in page.data {
                table.add_row(vec![g.id, g.status, g.commit_sha, g.created_at]);
            }
            println!("{table}");
        }
        DeploymentCommands::Create {
            project,
            environment,
            commit_sha,
        } => {
            let accepted: serde_json::Value = client
                .post(
                    &format!("projects/{project}/deployments"),
                    &json!({ "environment": environment, "commit_sha": commit_sha }),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&accepted)?);
        }
        DeploymentCommands::Show { project, group_id } => {
            let detail: serde_json::Value = client.get(&format!("projects/{project}/deployments/{group_id}")).await?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
        DeploymentCommands::Rollback { project, group_id } => {
            client
                .post_action(&format!("projects/{project}/deployments/{group_id}/rollback"))
                .await?;
            println!("rollback requested for {group_id}");
        }
        DeploymentCommands::Approve { project, group_id } => {
            client
                .post_action(&format!("projects/{project}/deployments/{group_id}/approve"))
                .await?;
            println!("approved {group_id}");
        }
    }
    Ok(())
}
