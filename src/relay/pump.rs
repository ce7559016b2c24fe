//! Directional Pump
//!
//! One pump owns one direction of a session: decode a packet, hand the
//! summary to the observer, optionally record the raw bytes, write the
//! re-encoded frame to the destination. Every failure terminates the loop
//! as a typed [`PumpOutcome`]; nothing escapes the pump's task.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::packet::{codec, read_packet, CodecError};
use crate::recorder::{FileRecorder, TraceRecord};
use crate::relay::session::PacketObserver;

/// Direction of packet flow through the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToBroker,
    BrokerToClient,
}

impl Direction {
    /// Log label matching the client's point of view
    pub fn label(&self) -> &'static str {
        match self {
            Direction::ClientToBroker => "SENT",
            Direction::BrokerToClient => "RCVD",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a pump stopped. Constructed for every termination, expected or not.
#[derive(Debug)]
pub enum PumpOutcome {
    /// The source stream ended on a packet boundary
    EndOfStream,
    /// The source produced bytes that do not frame as a packet
    Decode(CodecError),
    /// The destination refused the re-encoded packet
    Write(std::io::Error),
}

/// Run one direction of a session until the stream ends or fails.
///
/// The recorder, when present, belongs to this pump alone and is closed
/// before the pump returns.
pub async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    mut recorder: Option<FileRecorder>,
    observer: Arc<dyn PacketObserver>,
    debug_frames: bool,
) -> PumpOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let outcome = loop {
        let packet = match read_packet(&mut reader).await {
            Ok(packet) => packet,
            Err(CodecError::EndOfStream) => break PumpOutcome::EndOfStream,
            Err(e) => break PumpOutcome::Decode(e),
        };

        observer.observe(direction, &packet);

        let frame = codec::encode(&packet);

        if let Some(mut rec) = recorder.take() {
            match rec.append(&TraceRecord::now(frame.to_vec())) {
                Ok(()) => recorder = Some(rec),
                Err(e) => {
                    warn!("{}: trace append failed, session continues untraced: {}", direction, e);
                }
            }
        }

        if let Err(e) = writer.write_all(&frame).await {
            break PumpOutcome::Write(e);
        }
        if let Err(e) = writer.flush().await {
            break PumpOutcome::Write(e);
        }

        if debug_frames {
            debug!("{}: wrote {} bytes", direction, frame.len());
        }
    };

    if let Some(mut rec) = recorder.take() {
        if let Err(e) = rec.close() {
            warn!("{}: failed to close trace recorder: {}", direction, e);
        }
    }

    outcome
}
