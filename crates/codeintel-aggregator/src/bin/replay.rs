//! codeintel-replay - run one request against scripted providers
//!
//! Loads an optional aggregator configuration and a YAML scenario, replays
//! the scenario through the aggregator and prints what the caller received.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use codeintel_aggregator::{AggregatorConfig, ConfigManager, Scenario};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codeintel-replay")]
#[command(about = "Replay a completion scenario against scripted providers")]
struct Cli {
    /// Scenario file (YAML)
    scenario: PathBuf,

    /// Aggregator configuration file (.yaml, .yml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the request deadline in milliseconds
    #[arg(short, long)]
    wait_for_ms: Option<u64>,

    /// Pretty-print the output
    #[arg(short, long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConfigManager::load_from_file(path)
            .await
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => AggregatorConfig::default(),
    };
    if let Some(wait_for_ms) = cli.wait_for_ms {
        config.wait_for_ms = wait_for_ms;
    }

    let scenario = Scenario::load(&cli.scenario)
        .await
        .with_context(|| format!("loading scenario from {}", cli.scenario.display()))?;

    tracing::info!(
        request_type = %scenario.request_type,
        providers = scenario.providers.len(),
        wait_for_ms = config.wait_for_ms,
        "Replaying scenario"
    );
    let outcome = scenario.replay(config).await?;

    let output = serde_json::json!({
        "request_type": scenario.request_type,
        "delivered": outcome.response.is_some(),
        "elapsed_ms": outcome.elapsed.as_millis() as u64,
        "pending": outcome.pending,
        "response": outcome.response.map(|r| r.to_value()),
    });
    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", rendered);

    Ok(())
}
