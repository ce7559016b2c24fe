//! Relay Session
//!
//! Pairs one accepted client stream with one dialed broker stream and runs
//! the two directional pumps to completion.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info, warn};

use crate::packet::Packet;
use crate::recorder::FileRecorder;
use crate::relay::pump::{pump, Direction, PumpOutcome};

/// Observability capability invoked with every relayed packet.
///
/// Injected at session construction so components never reach for a
/// process-wide hook.
pub trait PacketObserver: Send + Sync {
    fn observe(&self, direction: Direction, packet: &Packet);
}

/// Default observer: one tracing line per packet, labeled from the client's
/// point of view (`SENT` toward the broker, `RCVD` from it).
pub struct LogObserver;

impl PacketObserver for LogObserver {
    fn observe(&self, direction: Direction, packet: &Packet) {
        info!("{}: {}", direction, packet.summary());
    }
}

/// Per-session relay configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayOptions {
    /// Emit a debug line with the byte count of every written frame
    pub debug: bool,
}

/// Relay packets between `client` and `broker` until either side ends.
///
/// The broker-to-client direction is the recorded one when a recorder is
/// supplied. The first pump to terminate tears the session down: the
/// surviving pump is aborted so neither a half-open connection nor a stuck
/// task outlives the session. A panicking pump is contained here and never
/// reaches the listener.
pub async fn run_session<C, B>(
    client: C,
    broker: B,
    recorder: Option<FileRecorder>,
    observer: Arc<dyn PacketObserver>,
    options: RelayOptions,
) where
    C: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (broker_read, broker_write) = tokio::io::split(broker);

    let mut inbound = tokio::spawn(pump(
        broker_read,
        client_write,
        Direction::BrokerToClient,
        recorder,
        Arc::clone(&observer),
        options.debug,
    ));
    let mut outbound = tokio::spawn(pump(
        client_read,
        broker_write,
        Direction::ClientToBroker,
        None,
        observer,
        options.debug,
    ));

    tokio::select! {
        result = &mut inbound => {
            log_pump_result(Direction::BrokerToClient, result);
            outbound.abort();
            let _ = outbound.await;
        }
        result = &mut outbound => {
            log_pump_result(Direction::ClientToBroker, result);
            inbound.abort();
            let _ = inbound.await;
        }
    }
}

fn log_pump_result(direction: Direction, result: Result<PumpOutcome, tokio::task::JoinError>) {
    match result {
        Ok(PumpOutcome::EndOfStream) => {
            info!("{}: stream closed", direction);
        }
        Ok(PumpOutcome::Decode(e)) => {
            warn!("{}: stopping relay on decode error: {}", direction, e);
        }
        Ok(PumpOutcome::Write(e)) => {
            warn!("{}: stopping relay on write error: {}", direction, e);
        }
        Err(e) if e.is_panic() => {
            error!("{}: pump panicked, session torn down: {}", direction, e);
        }
        Err(_) => {}
    }
}
