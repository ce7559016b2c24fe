//! Configuration Types

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
}

/// Proxy server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the raw MQTT listener binds to
    pub listen_addr: SocketAddr,
    /// Address the MQTT-over-WebSocket listener binds to
    pub ws_listen_addr: SocketAddr,
    /// URL of the real broker every session is relayed to
    pub broker_url: Url,
    /// Budget for establishing the broker connection, per session
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Log the byte count of every relayed frame
    pub debug: bool,
    /// Record each session's broker-to-client packets to a trace file
    pub trace: bool,
    /// Directory trace files are written into
    pub trace_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:1882".parse().expect("default listen address"),
            ws_listen_addr: "0.0.0.0:8080".parse().expect("default ws listen address"),
            broker_url: Url::parse("mqtt://127.0.0.1:1883").expect("default broker url"),
            connect_timeout: Duration::from_secs(10),
            debug: false,
            trace: false,
            trace_dir: PathBuf::from("."),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
        }
    }
}
