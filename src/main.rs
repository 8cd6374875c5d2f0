//! enclii entry point: one binary, two faces. `enclii serve` runs the
//! control-plane server (requires the `k8s` feature, since that is the only
//! feature providing a `DeploymentBackend`); every other subcommand is a
//! thin HTTP client mirroring `rise-cli`'s shape, talking to a running
//! server over the API in `http::mod`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "cli")]
mod cli;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the control-plane server
    #[cfg(feature = "k8s")]
    Serve,

    /// Authenticate with the enclii backend (local mode)
    #[cfg(feature = "cli")]
    Login {
        /// Backend URL to authenticate with; overrides the stored default
        #[arg(long)]
        url: Option<String>,
    },

    /// Project management commands
    #[cfg(feature = "cli")]
    #[command(subcommand, visible_alias = "p")]
    Project(cli::commands::ProjectCommands),

    /// Service management commands
    #[cfg(feature = "cli")]
    #[command(subcommand, visible_alias = "svc")]
    Service(cli::commands::ServiceCommands),

    /// Deployment management commands
    #[cfg(feature = "cli")]
    #[command(subcommand, visible_alias = "d")]
    Deployment(cli::commands::DeploymentCommands),
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        #[cfg(feature = "k8s")]
        Commands::Serve => run_serve().await,

        #[cfg(feature = "cli")]
        Commands::Login { url } => {
            let mut config = cli::config::Config::load()?;
            let backend_url = url.unwrap_or_else(|| config.get_backend_url());
            cli::login::handle_login(&backend_url, &mut config).await
        }

        #[cfg(feature = "cli")]
        Commands::Project(cmd) => {
            let client = cli_client()?;
            cli::commands::run_project(&client, cmd).await
        }

        #[cfg(feature = "cli")]
        Commands::Service(cmd) => {
            let client = cli_client()?;
            cli::commands::run_service(&client, cmd).await
        }

        #[cfg(feature = "cli")]
        Commands::Deployment(cmd) => {
            let client = cli_client()?;
            cli::commands::run_deployment(&client, cmd).await
        }
    }
}

#[cfg(feature = "cli")]
fn cli_client() -> Result<cli::client::ApiClient> {
    let config = cli::config::Config::load()?;
    cli::client::ApiClient::new(&config.get_backend_url(), config.get_token())
}

#[cfg(feature = "k8s")]
async fn run_serve() -> Result<()> {
    use std::sync::Arc;

    use enclii::config::Settings;
    use enclii::reconciler::kubernetes::KubernetesBackend;
    use enclii::reconciler::DeploymentBackend;
    use enclii::secrets::EncryptionProvider;

    let settings = Settings::load()?;
    let ingress_class = settings.kubernetes.ingress_class.clone();
    let ingress_tls_secret_name = settings.kubernetes.ingress_tls_secret_name.clone();

    let kube_client = match &settings.kubernetes.kubeconfig {
        Some(path) => {
            let kubeconfig = kube::config::Kubeconfig::read_from(path)?;
            let options = kube::config::KubeConfigOptions::default();
            let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?;
            kube::Client::try_from(config)?
        }
        None => kube::Client::try_default().await?,
    };

    enclii::http::run_server(settings, move |pool, encryption: Arc<dyn EncryptionProvider>| {
        Arc::new(KubernetesBackend::new(
            pool,
            kube_client,
            encryption,
            ingress_class,
            ingress_tls_secret_name,
        )) as Arc<dyn DeploymentBackend>
    })
    .await
}
