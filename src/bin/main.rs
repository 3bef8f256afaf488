use meokten_agent::{agent::AgentGraph, config::AgentConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout stays pure JSON
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        eprintln!("usage: meokten <question>");
        eprintln!("example: meokten 논현역 맛집 추천해줘");
        std::process::exit(2);
    }

    let config = AgentConfig::from_env()?;
    let agent = AgentGraph::from_config(&config).await?;

    info!(question = %question, "Running agent");

    let output = agent.run_agent(&question).await;
    println!("{}", serde_json::to_string_pretty(&output)?);

    if output.is_error() {
        std::process::exit(1);
    }
    Ok(())
}
