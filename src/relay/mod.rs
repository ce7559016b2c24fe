//! Proxy Relay
//!
//! Moves decoded MQTT packets between a client stream and a broker stream,
//! one concurrent pump per direction.

pub mod pump;
pub mod session;

pub use pump::{Direction, PumpOutcome};
pub use session::{run_session, LogObserver, PacketObserver, RelayOptions};
