//! Listener Front-Ends
//!
//! Two accept loops, one for raw MQTT over TCP and one for MQTT over
//! WebSocket, both relaying every accepted client to the same broker. Bind
//! failures are fatal; anything that goes wrong after accept is contained
//! to its own connection.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as HsRequest, Response as HsResponse,
};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, error, info};
use url::Url;

use crate::config::Config;
use crate::recorder::{trace_file_name, FileRecorder};
use crate::relay::{run_session, LogObserver, PacketObserver, RelayOptions};
use crate::transport::{default_tls_config, open_connection};
use crate::Result;

const WS_SUBPROTOCOL: &str = "mqtt";

/// Shared state for both accept loops
struct ServerContext {
    config: Config,
    broker_url: Url,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    observer: Arc<dyn PacketObserver>,
}

/// The MQTT reverse proxy server
pub struct ProxyServer {
    config: Config,
    observer: Arc<dyn PacketObserver>,
}

impl ProxyServer {
    /// Create a proxy server with the default tracing-backed observer
    pub fn new(config: Config) -> Self {
        Self {
            config,
            observer: Arc::new(LogObserver),
        }
    }

    /// Replace the per-packet observer
    pub fn with_observer(mut self, observer: Arc<dyn PacketObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Bind both listeners. Either bind failing is fatal and returned to
    /// the caller; there is no degraded single-listener mode.
    pub async fn bind(self) -> Result<BoundProxyServer> {
        let listen_addr = self.config.server.listen_addr;
        let ws_listen_addr = self.config.server.ws_listen_addr;
        let broker_url = self.config.server.broker_url.clone();

        let tcp_listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("Failed to bind MQTT listener to {listen_addr}"))?;
        let ws_listener = TcpListener::bind(ws_listen_addr)
            .await
            .with_context(|| format!("Failed to bind WebSocket listener to {ws_listen_addr}"))?;

        info!("MQTT listener bound to {}", tcp_listener.local_addr()?);
        info!("WebSocket listener bound to {}", ws_listener.local_addr()?);
        info!("Relaying to broker {}", broker_url);

        // Build the client TLS configuration once; per-session dials reuse it
        let tls_config = match broker_url.scheme() {
            "wss" | "ssl" | "tls" | "mqtts" | "mqtt+ssl" | "tcps" => Some(
                default_tls_config().context("Failed to build broker TLS configuration")?,
            ),
            _ => None,
        };

        Ok(BoundProxyServer {
            tcp_listener,
            ws_listener,
            ctx: Arc::new(ServerContext {
                config: self.config,
                broker_url,
                tls_config,
                observer: self.observer,
            }),
        })
    }

    /// Bind both listeners and serve until the process is stopped.
    pub async fn run(self) -> Result<()> {
        self.bind().await?.run().await
    }
}

/// A proxy server whose listeners are bound and ready to accept
pub struct BoundProxyServer {
    tcp_listener: TcpListener,
    ws_listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl BoundProxyServer {
    /// Actual address of the raw MQTT listener
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        Ok(self.tcp_listener.local_addr()?)
    }

    /// Actual address of the WebSocket listener
    pub fn ws_listen_addr(&self) -> Result<SocketAddr> {
        Ok(self.ws_listener.local_addr()?)
    }

    /// Serve both accept loops until the process is stopped.
    pub async fn run(self) -> Result<()> {
        tokio::try_join!(
            accept_tcp_clients(self.tcp_listener, Arc::clone(&self.ctx)),
            accept_ws_clients(self.ws_listener, self.ctx),
        )?;

        Ok(())
    }
}

/// Accept raw MQTT clients
async fn accept_tcp_clients(listener: TcpListener, ctx: Arc<ServerContext>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    serve_client(stream, peer, ctx).await;
                });
            }
            Err(e) => {
                // Transient accept failures should not take the listener down
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

/// Accept MQTT-over-WebSocket clients
async fn accept_ws_clients(listener: TcpListener, ctx: Arc<ServerContext>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    match upgrade_websocket(stream).await {
                        Ok(ws) => {
                            serve_client(crate::transport::WsByteStream::new(ws), peer, ctx).await;
                        }
                        Err(e) => {
                            error!("WebSocket upgrade from {} failed: {}", peer, e);
                        }
                    }
                });
            }
            Err(e) => {
                error!("Error accepting websocket connection: {}", e);
            }
        }
    }
}

/// Perform the server side of the WebSocket handshake, negotiating the
/// `mqtt` subprotocol when the client offers it.
async fn upgrade_websocket(
    stream: TcpStream,
) -> std::result::Result<
    tokio_tungstenite::WebSocketStream<TcpStream>,
    tokio_tungstenite::tungstenite::Error,
> {
    let callback = |req: &HsRequest,
                    mut response: HsResponse|
     -> std::result::Result<HsResponse, ErrorResponse> {
        let offered_mqtt = req
            .headers()
            .get("sec-websocket-protocol")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').any(|p| p.trim() == WS_SUBPROTOCOL))
            .unwrap_or(false);

        if offered_mqtt {
            response.headers_mut().insert(
                "sec-websocket-protocol",
                HeaderValue::from_static(WS_SUBPROTOCOL),
            );
        }

        Ok(response)
    };

    tokio_tungstenite::accept_hdr_async(stream, callback).await
}

/// Serve one accepted client: open the recorder if tracing, dial the
/// broker, run the relay. Every failure stops this connection only.
async fn serve_client<S>(client: S, peer: SocketAddr, ctx: Arc<ServerContext>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let server = &ctx.config.server;

    if server.debug {
        debug!("new connection: {}", peer);
        debug!("connecting to: {}", ctx.broker_url);
    }

    let recorder = if server.trace {
        let path = server.trace_dir.join(trace_file_name(&peer));
        match FileRecorder::create(&path) {
            Ok(recorder) => {
                info!("tracing session from {} to {}", peer, path.display());
                Some(recorder)
            }
            Err(e) => {
                error!("Failed to open trace for {}: {}", peer, e);
                return;
            }
        }
    } else {
        None
    };

    let broker = match open_connection(
        &ctx.broker_url,
        ctx.tls_config.clone(),
        server.connect_timeout,
        &[],
    )
    .await
    {
        Ok(broker) => broker,
        Err(e) => {
            error!("Failed to reach broker for {}: {}", peer, e);
            return;
        }
    };

    run_session(
        client,
        broker,
        recorder,
        Arc::clone(&ctx.observer),
        RelayOptions {
            debug: server.debug,
        },
    )
    .await;

    info!("connection from {} closed", peer);
}
