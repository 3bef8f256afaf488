use meokten_agent::{agent::AgentGraph, api::start_server, config::AgentConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AgentConfig::from_env()?;

    info!("🍜 Meokten restaurant agent - API Server");
    info!("📍 Port: {}", config.port);
    info!("🗄️  Database: {}", config.database_url);

    let agent = Arc::new(AgentGraph::from_config(&config).await?);

    info!("✅ Agent graph initialized");
    info!("📡 Starting API server...");

    start_server(agent, config.port).await?;

    Ok(())
}
