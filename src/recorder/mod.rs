//! Session Trace Recorder
//!
//! Persists the raw packets of one proxied session to an append-only trace
//! file. Records are bincode-framed, so a trace is replayable by reading
//! records back until the file ends.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One recorded packet: arrival timestamp plus the exact wire bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Nanoseconds since the UNIX epoch at the moment the packet was relayed
    pub timestamp_ns: u64,
    /// The packet exactly as it appeared on the wire
    pub payload: Vec<u8>,
}

impl TraceRecord {
    /// Capture a record for `payload` stamped with the current time
    pub fn now(payload: Vec<u8>) -> Self {
        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            timestamp_ns,
            payload,
        }
    }
}

/// Errors raised by the recorder
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("failed to open trace file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to append trace record: {0}")]
    Append(#[from] bincode::Error),

    #[error("failed to flush trace file: {0}")]
    Flush(std::io::Error),

    #[error("recorder is closed")]
    Closed,
}

/// Append-only recorder writing [`TraceRecord`]s to a single file.
///
/// Records are written in arrival order and never reordered. `close`
/// releases the file exactly once; any use after that is a programming
/// error surfaced as [`RecorderError::Closed`].
pub struct FileRecorder {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
}

impl FileRecorder {
    /// Create the trace file at `path`, truncating any previous trace of the
    /// same name.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| RecorderError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            path,
        })
    }

    /// Append one record to the trace.
    pub fn append(&mut self, record: &TraceRecord) -> Result<(), RecorderError> {
        let writer = self.writer.as_mut().ok_or(RecorderError::Closed)?;
        bincode::serialize_into(writer, record)?;
        Ok(())
    }

    /// Flush and release the trace file. Idempotence is not offered: a
    /// second close is the same programming error as a late append.
    pub fn close(&mut self) -> Result<(), RecorderError> {
        let mut writer = self.writer.take().ok_or(RecorderError::Closed)?;
        writer.flush().map_err(RecorderError::Flush)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileRecorder {
    fn drop(&mut self) {
        // An aborted pump drops its recorder without reaching close
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

/// Replay a trace file into its ordered record sequence.
pub fn read_trace(path: impl AsRef<Path>) -> Result<Vec<TraceRecord>, RecorderError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| RecorderError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let mut records = Vec::new();
    loop {
        match bincode::deserialize_from::<_, TraceRecord>(&mut reader) {
            Ok(record) => records.push(record),
            Err(e) => match *e {
                bincode::ErrorKind::Io(ref io)
                    if io.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                _ => return Err(RecorderError::Append(e)),
            },
        }
    }
    Ok(records)
}

/// Derive the trace file name for a peer address: colons are not portable in
/// file names, so `127.0.0.1:51432` becomes `127.0.0.1-51432.trace`.
pub fn trace_file_name(peer: &SocketAddr) -> String {
    format!("{}.trace", peer.to_string().replace(':', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_replay_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.trace");

        let mut recorder = FileRecorder::create(&path).unwrap();
        let records: Vec<TraceRecord> = (0..5u8)
            .map(|i| TraceRecord {
                timestamp_ns: 1_000 + i as u64,
                payload: vec![0x30, 0x01, i],
            })
            .collect();
        for record in &records {
            recorder.append(record).unwrap();
        }
        recorder.close().unwrap();

        let replayed = read_trace(&path).unwrap();
        assert_eq!(replayed, records);
    }

    #[test]
    fn test_append_after_close_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = FileRecorder::create(dir.path().join("t.trace")).unwrap();
        recorder.close().unwrap();

        let record = TraceRecord {
            timestamp_ns: 1,
            payload: vec![0xC0, 0x00],
        };
        assert!(matches!(
            recorder.append(&record),
            Err(RecorderError::Closed)
        ));
        assert!(matches!(recorder.close(), Err(RecorderError::Closed)));
    }

    #[test]
    fn test_empty_trace_replays_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.trace");
        let mut recorder = FileRecorder::create(&path).unwrap();
        recorder.close().unwrap();

        assert!(read_trace(&path).unwrap().is_empty());
    }

    #[test]
    fn test_trace_file_name_replaces_separators() {
        let peer: SocketAddr = "127.0.0.1:51432".parse().unwrap();
        assert_eq!(trace_file_name(&peer), "127.0.0.1-51432.trace");

        let peer: SocketAddr = "[::1]:1882".parse().unwrap();
        assert_eq!(trace_file_name(&peer), "[--1]-1882.trace");
    }
}
