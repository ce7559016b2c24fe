//! Broker Connector
//!
//! Opens the outbound connection for a broker URL. The scheme alone decides
//! the dial strategy; nothing MQTT-specific happens here.

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tracing::{debug, warn};
use url::Url;

use super::stream::{BrokerStream, WsByteStream};

/// Broker URL schemes the connector understands
pub const SUPPORTED_SCHEMES: &[&str] = &[
    "ws", "wss", "mqtt", "tcp", "unix", "ssl", "tls", "mqtts", "mqtt+ssl", "tcps",
];

const DEFAULT_PLAIN_PORT: u16 = 1883;
const DEFAULT_TLS_PORT: u16 = 8883;

/// Errors raised while establishing a broker connection
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unsupported broker scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("broker url has no host")]
    MissingHost,

    #[error("connecting to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("dial failed: {0}")]
    Dial(#[from] std::io::Error),

    #[error("TLS handshake failed: {0}")]
    Tls(std::io::Error),

    #[error("invalid TLS server name '{0}'")]
    InvalidServerName(String),

    #[error("SOCKS proxy connect failed: {0}")]
    Socks(#[from] tokio_socks::Error),

    #[error("invalid SOCKS proxy address '{0}'")]
    InvalidProxy(String),

    #[error("websocket handshake failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid websocket header '{0}'")]
    InvalidHeader(String),
}

/// Open a connection to the broker named by `url`.
///
/// `timeout` bounds connection establishment (including TLS and WebSocket
/// handshakes), never the lifetime of the returned stream. When the
/// `all_proxy` environment variable is set, plain and TLS dials go through
/// the SOCKS proxy it names; for TLS the handshake then runs explicitly over
/// the tunneled stream. `headers` are applied to WebSocket upgrade requests
/// only.
pub async fn open_connection(
    url: &Url,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    connect_timeout: Duration,
    headers: &[(String, String)],
) -> Result<BrokerStream, TransportError> {
    match url.scheme() {
        "ws" | "wss" => open_websocket(url, tls_config, connect_timeout, headers).await,
        "mqtt" | "tcp" => {
            let (host, port) = host_port(url, DEFAULT_PLAIN_PORT)?;
            let stream = dial_tcp(&host, port, connect_timeout).await?;
            Ok(match stream {
                DialedTcp::Direct(s) => BrokerStream::Tcp(s),
                DialedTcp::Proxied(s) => BrokerStream::Socks(s),
            })
        }
        "unix" => open_unix(url, connect_timeout).await,
        "ssl" | "tls" | "mqtts" | "mqtt+ssl" | "tcps" => {
            open_tls(url, tls_config, connect_timeout).await
        }
        other => Err(TransportError::UnsupportedScheme(other.to_string())),
    }
}

/// A plain dial, direct or through the environment's SOCKS proxy
enum DialedTcp {
    Direct(TcpStream),
    Proxied(Socks5Stream<TcpStream>),
}

async fn dial_tcp(host: &str, port: u16, connect_timeout: Duration) -> Result<DialedTcp, TransportError> {
    let addr = format!("{host}:{port}");

    match socks_proxy_from_env() {
        None => {
            let stream = timeout(connect_timeout, TcpStream::connect(&addr))
                .await
                .map_err(|_| TransportError::ConnectTimeout {
                    addr: addr.clone(),
                    timeout: connect_timeout,
                })??;
            debug!("connected to {}", addr);
            Ok(DialedTcp::Direct(stream))
        }
        Some(proxy) => {
            let proxy_addr = parse_proxy_addr(&proxy)?;
            debug!("connecting to {} via SOCKS proxy {}", addr, proxy_addr);
            let stream = timeout(
                connect_timeout,
                Socks5Stream::connect(proxy_addr.as_str(), (host, port)),
            )
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                addr: addr.clone(),
                timeout: connect_timeout,
            })??;
            Ok(DialedTcp::Proxied(stream))
        }
    }
}

async fn open_tls(
    url: &Url,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    connect_timeout: Duration,
) -> Result<BrokerStream, TransportError> {
    let (host, port) = host_port(url, DEFAULT_TLS_PORT)?;
    let addr = format!("{host}:{port}");

    let config = match tls_config {
        Some(config) => config,
        None => default_tls_config()?,
    };
    let connector = TlsConnector::from(config);
    let server_name = ServerName::try_from(host.clone())
        .map_err(|_| TransportError::InvalidServerName(host.clone()))?;

    // The handshake is part of connection establishment, so it shares the
    // dial timeout. Dropping the half-built stream on failure closes it.
    timeout(connect_timeout, async {
        match dial_tcp_inner(&host, port).await? {
            DialedTcp::Direct(stream) => {
                let tls = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(TransportError::Tls)?;
                Ok(BrokerStream::Tls(Box::new(tls)))
            }
            DialedTcp::Proxied(stream) => {
                let tls = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(TransportError::Tls)?;
                Ok(BrokerStream::SocksTls(Box::new(tls)))
            }
        }
    })
    .await
    .map_err(|_| TransportError::ConnectTimeout {
        addr,
        timeout: connect_timeout,
    })?
}

/// Plain dial without its own timeout, for callers that bound the whole
/// establishment sequence themselves.
async fn dial_tcp_inner(host: &str, port: u16) -> Result<DialedTcp, TransportError> {
    let addr = format!("{host}:{port}");
    match socks_proxy_from_env() {
        None => Ok(DialedTcp::Direct(TcpStream::connect(&addr).await?)),
        Some(proxy) => {
            let proxy_addr = parse_proxy_addr(&proxy)?;
            debug!("connecting to {} via SOCKS proxy {}", addr, proxy_addr);
            Ok(DialedTcp::Proxied(
                Socks5Stream::connect(proxy_addr.as_str(), (host, port)).await?,
            ))
        }
    }
}

async fn open_websocket(
    url: &Url,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    connect_timeout: Duration,
    headers: &[(String, String)],
) -> Result<BrokerStream, TransportError> {
    let mut request = url.as_str().into_client_request()?;
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(value.clone()))?;
        request.headers_mut().append(name, value);
    }

    let connector = if url.scheme() == "wss" {
        let config = match tls_config {
            Some(config) => config,
            None => default_tls_config()?,
        };
        Some(Connector::Rustls(config))
    } else {
        None
    };

    let (ws, _response) = timeout(
        connect_timeout,
        connect_async_tls_with_config(request, None, false, connector),
    )
    .await
    .map_err(|_| TransportError::ConnectTimeout {
        addr: url.to_string(),
        timeout: connect_timeout,
    })??;

    debug!("websocket connected to {}", url);
    Ok(BrokerStream::Ws(Box::new(WsByteStream::new(ws))))
}

#[cfg(unix)]
async fn open_unix(url: &Url, connect_timeout: Duration) -> Result<BrokerStream, TransportError> {
    let path = unix_socket_path(url)?;
    let stream = timeout(connect_timeout, tokio::net::UnixStream::connect(&path))
        .await
        .map_err(|_| TransportError::ConnectTimeout {
            addr: path.clone(),
            timeout: connect_timeout,
        })??;
    Ok(BrokerStream::Unix(stream))
}

#[cfg(not(unix))]
async fn open_unix(url: &Url, _connect_timeout: Duration) -> Result<BrokerStream, TransportError> {
    Err(TransportError::UnsupportedScheme(url.scheme().to_string()))
}

#[cfg(unix)]
fn unix_socket_path(url: &Url) -> Result<String, TransportError> {
    // unix:///var/run/mqtt.sock parses with an empty host and the socket in
    // the path; unix://mqtt.sock puts a relative name in the host.
    let path = match url.host_str() {
        Some(host) if !host.is_empty() => format!("{}{}", host, url.path()),
        _ => url.path().to_string(),
    };
    if path.is_empty() {
        return Err(TransportError::MissingHost);
    }
    Ok(path)
}

fn host_port(url: &Url, default_port: u16) -> Result<(String, u16), TransportError> {
    let host = url.host_str().ok_or(TransportError::MissingHost)?.to_string();
    Ok((host, url.port().unwrap_or(default_port)))
}

/// Read the SOCKS proxy address from the environment, if configured.
fn socks_proxy_from_env() -> Option<String> {
    std::env::var("all_proxy")
        .or_else(|_| std::env::var("ALL_PROXY"))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Reduce a proxy specification to `host:port`. Accepts `socks5://host:port`
/// (and the hostname-resolving `socks5h` variant) or a bare `host:port`.
fn parse_proxy_addr(raw: &str) -> Result<String, TransportError> {
    if let Ok(url) = Url::parse(raw) {
        if url.has_host() {
            match url.scheme() {
                "socks5" | "socks5h" | "socks" => {
                    let host = url.host_str().ok_or_else(|| {
                        TransportError::InvalidProxy(raw.to_string())
                    })?;
                    let port = url.port().unwrap_or(1080);
                    return Ok(format!("{host}:{port}"));
                }
                _ => return Err(TransportError::InvalidProxy(raw.to_string())),
            }
        }
    }
    if raw.contains(':') {
        return Ok(raw.to_string());
    }
    Err(TransportError::InvalidProxy(raw.to_string()))
}

/// Client TLS configuration trusting the platform's native roots.
pub fn default_tls_config() -> Result<Arc<rustls::ClientConfig>, TransportError> {
    let mut roots = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    for cert in native_certs.certs {
        let _ = roots.add(cert);
    }
    if !native_certs.errors.is_empty() {
        warn!(
            "native certificate loading reported {} issues, continuing with available roots",
            native_certs.errors.len()
        );
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proxy_addr_url_forms() {
        assert_eq!(
            parse_proxy_addr("socks5://127.0.0.1:1080").unwrap(),
            "127.0.0.1:1080"
        );
        assert_eq!(
            parse_proxy_addr("socks5h://proxy.example.com").unwrap(),
            "proxy.example.com:1080"
        );
        assert_eq!(parse_proxy_addr("10.0.0.1:9050").unwrap(), "10.0.0.1:9050");
    }

    #[test]
    fn test_parse_proxy_addr_rejects_other_schemes() {
        assert!(matches!(
            parse_proxy_addr("http://proxy.example.com:8080"),
            Err(TransportError::InvalidProxy(_))
        ));
        assert!(matches!(
            parse_proxy_addr("not-a-proxy"),
            Err(TransportError::InvalidProxy(_))
        ));
    }

    #[test]
    fn test_host_port_defaults() {
        let url = Url::parse("mqtt://broker.local").unwrap();
        assert_eq!(host_port(&url, 1883).unwrap(), ("broker.local".to_string(), 1883));

        let url = Url::parse("mqtts://broker.local:8884").unwrap();
        assert_eq!(host_port(&url, 8883).unwrap(), ("broker.local".to_string(), 8884));
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_socket_path_forms() {
        let url = Url::parse("unix:///var/run/mqtt.sock").unwrap();
        assert_eq!(unix_socket_path(&url).unwrap(), "/var/run/mqtt.sock");

        let url = Url::parse("unix://mqtt.sock").unwrap();
        assert_eq!(unix_socket_path(&url).unwrap(), "mqtt.sock");
    }
}
