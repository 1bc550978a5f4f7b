use anyhow::{Context, Result};
use clap::Parser;
use repochat::{
    api::{self, AppState},
    config, logging,
    rag::RagService,
    registry::JsonFileRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "repo-chat",
    about = "Register GitHub repositories and chat with their contents"
)]
struct Cli {
    /// Address to bind (overrides HOST).
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Registry file (overrides REPOS_FILE).
    #[arg(long)]
    repos_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config(|config| {
        if let Some(host) = cli.host {
            config.host = host;
        }
        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(repos_file) = cli.repos_file {
            config.repos_file = repos_file;
        }
    })
    .context("Failed to load configuration")?;
    logging::init_tracing(config);

    let rag = RagService::new(config)
        .await
        .context("Failed to initialize retrieval backend")?;
    let registry = JsonFileRegistry::new(config.repos_file.clone());
    tracing::info!(path = %registry.path().display(), "Using repository registry");

    let app = api::create_router(AppState::new(Arc::new(registry), Arc::new(rag)));

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    tracing::info!(
        "Listening on http://{}",
        listener.local_addr().context("Listener has no local address")?
    );
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
