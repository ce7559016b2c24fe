//! MQTT Packet Framing
//!
//! Decodes and re-encodes MQTT control packets at the framing level only.
//! The proxy relays packets transparently, so nothing beyond the fixed
//! header and remaining length is interpreted.

pub mod codec;
pub mod constants;
pub mod types;

pub use codec::{encode, read_packet, CodecError};
pub use constants::*;
pub use types::{Packet, PacketType};
