//! Relay Daemon - routes natural-language prompts to the backends that can answer them.

use anyhow::{Context, Result};
use clap::Parser;
use relayd::classifier::RelevanceClassifier;
use relayd::config::{Config, Credentials};
use relayd::formatter::ActivityFormatter;
use relayd::llm_client::{OpenAiClient, TextModel};
use relayd::metrics::DispatchMetrics;
use relayd::orchestrator::{DispatchSettings, Dispatcher};
use relayd::registry::BackendRegistry;
use relayd::server::{self, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "relayd", version, about = "Prompt dispatch and aggregation daemon")]
struct Args {
    /// Path to config file (defaults to /etc/relay/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding config and PORT
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relayd=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    info!("[BOOT] Relay Daemon v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.apply_env_overrides(|var| std::env::var(var).ok());
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let credentials = Credentials::resolve(&config).context("Failed to resolve credentials")?;
    info!("[BOOT] Config loaded ({} backends)", config.backends.len());

    let model: Arc<dyn TextModel> = Arc::new(
        OpenAiClient::new(
            config.model.endpoint.clone(),
            config.model.model.clone(),
            credentials.model_key.clone(),
            config.model.timeout_secs,
        )
        .context("Failed to build model client")?,
    );

    let registry = BackendRegistry::from_config(&config, &credentials, model.clone())
        .context("Failed to build backend registry")?;
    info!("[BOOT] Backends online: {}", registry.names().join(", "));

    let metrics = DispatchMetrics::new().context("Failed to register metrics")?;
    let classifier = RelevanceClassifier::new(model.clone(), config.backend_names());
    let dispatcher = Dispatcher::new(
        classifier,
        Arc::new(registry),
        DispatchSettings {
            threshold: config.dispatch.threshold,
            task_timeout: config.dispatch.task_timeout(),
        },
    )
    .with_metrics(metrics.clone());
    let formatter = ActivityFormatter::new(model);

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .context("Invalid bind address")?;

    server::run(AppState::new(dispatcher, formatter, metrics), addr).await
}
