use anyhow::{Context, Result};
use rmcp::ServiceExt;
use runmaster::{config::Config, server::RunMasterServer};
use tokio::io::{stdin, stdout};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    // Load OAuth config
    let config = Config::from_env().context(
        "Failed to load configuration. Please set STRAVA_CLIENT_ID and STRAVA_CLIENT_SECRET environment variables.",
    )?;

    let server = RunMasterServer::new(config).context("Failed to create Strava HTTP client")?;

    // Create stdio transport
    let transport = (stdin(), stdout());

    tracing::info!("Starting RunMaster MCP server");
    let service = server.clone().serve(transport).await.map_err(|e| {
        tracing::error!(error = %e, "Error starting server");
        e
    })?;

    service.waiting().await?;
    tracing::info!("Client disconnected");

    server.shutdown().await;
    Ok(())
}

/// Logs go to stderr; stdout carries the MCP protocol.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("runmaster=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
