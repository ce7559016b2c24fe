//! mqttproxy Library
//!
//! A transparent reverse proxy for MQTT: raw TCP and WebSocket listeners,
//! a packet-aware bidirectional relay with optional session tracing, a
//! multi-transport broker connector, and a standalone SigV4 presigner for
//! WebSocket broker URLs.

pub mod config;
pub mod packet;
pub mod recorder;
pub mod relay;
pub mod server;
pub mod sign;
pub mod transport;

pub use config::Config;
pub use server::{BoundProxyServer, ProxyServer};

/// Common error type for the proxy
pub type Result<T> = anyhow::Result<T>;
