//! Configuration Manager

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{bail, Context};
use url::Url;

use super::Config;
use crate::transport::SUPPORTED_SCHEMES;
use crate::Result;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        tracing::info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    /// Load configuration from environment variables, on top of defaults
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(listen) = std::env::var("MQTTPROXY_LISTEN_ADDR") {
            config.server.listen_addr = listen
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid MQTTPROXY_LISTEN_ADDR: {listen}"))?;
        }

        if let Ok(ws_listen) = std::env::var("MQTTPROXY_WS_LISTEN_ADDR") {
            config.server.ws_listen_addr = ws_listen
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid MQTTPROXY_WS_LISTEN_ADDR: {ws_listen}"))?;
        }

        if let Ok(broker) = std::env::var("MQTTPROXY_BROKER_URL") {
            config.server.broker_url = Url::parse(&broker)
                .with_context(|| format!("Invalid MQTTPROXY_BROKER_URL: {broker}"))?;
        }

        if let Ok(timeout) = std::env::var("MQTTPROXY_CONNECT_TIMEOUT") {
            config.server.connect_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid MQTTPROXY_CONNECT_TIMEOUT: {timeout}"))?;
        }

        if let Ok(trace_dir) = std::env::var("MQTTPROXY_TRACE_DIR") {
            config.server.trace_dir = trace_dir.into();
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let scheme = self.server.broker_url.scheme();
        if !SUPPORTED_SCHEMES.contains(&scheme) {
            bail!(
                "broker_url scheme '{}' is not supported (expected one of: {})",
                scheme,
                SUPPORTED_SCHEMES.join(", ")
            );
        }

        if self.server.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }

        // Port 0 asks the OS for an ephemeral port, so only explicit ports
        // can collide
        if self.server.listen_addr == self.server.ws_listen_addr
            && self.server.listen_addr.port() != 0
        {
            bail!("listen_addr and ws_listen_addr must differ");
        }

        Ok(())
    }

    /// Merge with CLI arguments (highest priority)
    pub fn merge_with_cli_args(
        &mut self,
        listen: Option<SocketAddr>,
        ws_listen: Option<SocketAddr>,
        broker: Option<Url>,
        debug: bool,
        trace: bool,
    ) {
        if let Some(listen) = listen {
            self.server.listen_addr = listen;
        }

        if let Some(ws_listen) = ws_listen {
            self.server.ws_listen_addr = ws_listen;
        }

        if let Some(broker) = broker {
            self.server.broker_url = broker;
        }

        if debug {
            self.server.debug = true;
        }

        if trace {
            self.server.trace = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_unsupported_broker_scheme_rejected() {
        let mut config = Config::default();
        config.server.broker_url = Url::parse("ftp://broker:1883").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = Config::default();
        let listen: SocketAddr = "127.0.0.1:2000".parse().unwrap();
        let broker = Url::parse("tls://broker.example.com:8883").unwrap();

        config.merge_with_cli_args(Some(listen), None, Some(broker.clone()), true, false);

        assert_eq!(config.server.listen_addr, listen);
        assert_eq!(config.server.broker_url, broker);
        assert!(config.server.debug);
        assert!(!config.server.trace);
    }

    #[test]
    fn test_parse_toml_config() {
        let config: Config = toml::from_str(
            r#"
            [server]
            listen_addr = "127.0.0.1:1882"
            broker_url = "mqtts://broker.example.com:8883"
            connect_timeout = "5s"
            trace = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.broker_url.scheme(), "mqtts");
        assert_eq!(config.server.connect_timeout.as_secs(), 5);
        assert!(config.server.trace);
        // Unspecified fields keep their defaults
        assert_eq!(config.server.ws_listen_addr.port(), 8080);
    }
}
