//! mqttproxy - A transparent MQTT reverse proxy
//!
//! Accepts MQTT clients over raw TCP or WebSocket, relays every session to
//! a real broker, and can record a binary trace of each session.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use mqttproxy::config::ConfigManager;
use mqttproxy::ProxyServer;

/// CLI arguments for mqttproxy
#[derive(Parser, Debug)]
#[command(name = "mqttproxy")]
#[command(about = "mqttproxy - A transparent MQTT reverse proxy")]
#[command(version)]
#[command(long_about = "
mqttproxy - A transparent MQTT reverse proxy

Accepts MQTT clients over raw TCP or WebSocket, opens a matching connection
to the real broker, and relays packets in both directions while decoding
each one for observability.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  MQTTPROXY_LISTEN_ADDR     - TCP listen address (e.g., 0.0.0.0:1882)
  MQTTPROXY_WS_LISTEN_ADDR  - WebSocket listen address (e.g., 0.0.0.0:8080)
  MQTTPROXY_BROKER_URL      - Broker URL (e.g., mqtt://127.0.0.1:1883)
  MQTTPROXY_CONNECT_TIMEOUT - Broker connect timeout (e.g., 10s)
  MQTTPROXY_TRACE_DIR       - Directory for session trace files
  all_proxy                 - SOCKS proxy for plain and TLS broker dials
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    /// Address to listen on for raw MQTT clients
    #[arg(short, long, help = "TCP listen address (e.g., 0.0.0.0:1882)")]
    pub listen: Option<SocketAddr>,

    /// Address to listen on for MQTT-over-WebSocket clients
    #[arg(short, long, help = "WebSocket listen address (e.g., 0.0.0.0:8080)")]
    pub ws_listen: Option<SocketAddr>,

    /// URL of the broker to relay every session to
    #[arg(short, long, help = "Broker URL (e.g., mqtt://127.0.0.1:1883)")]
    pub server: Option<Url>,

    /// Dump verbose per-frame debug information
    #[arg(short = 'v', long, help = "Dump verbose per-frame debug information")]
    pub verbose: bool,

    /// Record every session to a trace file
    #[arg(short = 't', long, help = "Record every session to a trace file")]
    pub trace: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", help = "Log level")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    init_tracing(&args)?;

    info!("Starting mqttproxy v{}", env!("CARGO_PKG_VERSION"));

    // Priority: CLI args > config file > environment > defaults
    let mut config = match &args.config {
        Some(path) => ConfigManager::load_from_file(path)?,
        None => ConfigManager::load_from_env()?,
    };

    config.merge_with_cli_args(
        args.listen,
        args.ws_listen,
        args.server.clone(),
        args.verbose,
        args.trace,
    );

    config.validate()?;

    info!("Listen address: {}", config.server.listen_addr);
    info!("WebSocket listen address: {}", config.server.ws_listen_addr);
    info!("Broker: {}", config.server.broker_url);
    if config.server.trace {
        info!(
            "Session tracing enabled, writing to {}",
            config.server.trace_dir.display()
        );
    }

    // Bind failure inside run() surfaces here and exits non-zero
    ProxyServer::new(config).run().await
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
