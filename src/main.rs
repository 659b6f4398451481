//! hostprobe: host reachability probe service.
//!
//! This is the application entry point. It loads configuration, initializes
//! tracing, builds the probe executors and the dispatcher with its admission
//! gate, and serves the probe endpoint until a shutdown signal arrives.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hostprobe::config::{AppConfig, DEFAULT_LOG_FILTER};
use hostprobe::dispatch::Dispatcher;
use hostprobe::http::start_server;
use hostprobe::probe::SystemProber;
use hostprobe::routes::create_router;
use hostprobe::state::AppState;

/// hostprobe: ICMP latency and HTTP status probes over HTTP
#[derive(Parser, Debug)]
#[command(name = "hostprobe", version, about)]
struct Args {
    /// Optional TOML configuration file (API_KEY and CONCURRENCY_LIMIT override it)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level filter (e.g., "hostprobe=debug")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration first so the log format can come from it
    let config = AppConfig::load(args.config.as_deref())?;

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.is_json() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(config_file = ?args.config, "Loaded configuration");
    config.log_summary();

    let prober = SystemProber::new(&config.probe)?;
    let dispatcher = Dispatcher::new(&config, Arc::new(prober));
    let config = Arc::new(config);
    let state = AppState::new(config.clone(), dispatcher);

    let app = create_router(state);
    start_server(app, &config).await?;

    Ok(())
}
