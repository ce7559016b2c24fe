//! MQTT Packet Types

use bytes::Bytes;

use crate::packet::constants::*;

/// MQTT 3.1.1 control packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect,
    Connack,
    Publish,
    Puback,
    Pubrec,
    Pubrel,
    Pubcomp,
    Subscribe,
    Suback,
    Unsubscribe,
    Unsuback,
    Pingreq,
    Pingresp,
    Disconnect,
    /// Type codes 0 and 15 are reserved by the protocol. The proxy relays
    /// such frames unchanged rather than rejecting them.
    Reserved(u8),
}

impl PacketType {
    /// Create from a type code (the high nibble of the fixed header byte)
    pub fn from_code(code: u8) -> Self {
        match code {
            PACKET_TYPE_CONNECT => PacketType::Connect,
            PACKET_TYPE_CONNACK => PacketType::Connack,
            PACKET_TYPE_PUBLISH => PacketType::Publish,
            PACKET_TYPE_PUBACK => PacketType::Puback,
            PACKET_TYPE_PUBREC => PacketType::Pubrec,
            PACKET_TYPE_PUBREL => PacketType::Pubrel,
            PACKET_TYPE_PUBCOMP => PacketType::Pubcomp,
            PACKET_TYPE_SUBSCRIBE => PacketType::Subscribe,
            PACKET_TYPE_SUBACK => PacketType::Suback,
            PACKET_TYPE_UNSUBSCRIBE => PacketType::Unsubscribe,
            PACKET_TYPE_UNSUBACK => PacketType::Unsuback,
            PACKET_TYPE_PINGREQ => PacketType::Pingreq,
            PACKET_TYPE_PINGRESP => PacketType::Pingresp,
            PACKET_TYPE_DISCONNECT => PacketType::Disconnect,
            other => PacketType::Reserved(other),
        }
    }

    /// Get the type code for this packet type
    pub fn type_code(&self) -> u8 {
        match self {
            PacketType::Connect => PACKET_TYPE_CONNECT,
            PacketType::Connack => PACKET_TYPE_CONNACK,
            PacketType::Publish => PACKET_TYPE_PUBLISH,
            PacketType::Puback => PACKET_TYPE_PUBACK,
            PacketType::Pubrec => PACKET_TYPE_PUBREC,
            PacketType::Pubrel => PACKET_TYPE_PUBREL,
            PacketType::Pubcomp => PACKET_TYPE_PUBCOMP,
            PacketType::Subscribe => PACKET_TYPE_SUBSCRIBE,
            PacketType::Suback => PACKET_TYPE_SUBACK,
            PacketType::Unsubscribe => PACKET_TYPE_UNSUBSCRIBE,
            PacketType::Unsuback => PACKET_TYPE_UNSUBACK,
            PacketType::Pingreq => PACKET_TYPE_PINGREQ,
            PacketType::Pingresp => PACKET_TYPE_PINGRESP,
            PacketType::Disconnect => PACKET_TYPE_DISCONNECT,
            PacketType::Reserved(code) => *code,
        }
    }

    /// Protocol name of the packet type, for logging
    pub fn name(&self) -> &'static str {
        match self {
            PacketType::Connect => "CONNECT",
            PacketType::Connack => "CONNACK",
            PacketType::Publish => "PUBLISH",
            PacketType::Puback => "PUBACK",
            PacketType::Pubrec => "PUBREC",
            PacketType::Pubrel => "PUBREL",
            PacketType::Pubcomp => "PUBCOMP",
            PacketType::Subscribe => "SUBSCRIBE",
            PacketType::Suback => "SUBACK",
            PacketType::Unsubscribe => "UNSUBSCRIBE",
            PacketType::Unsuback => "UNSUBACK",
            PacketType::Pingreq => "PINGREQ",
            PacketType::Pingresp => "PINGRESP",
            PacketType::Disconnect => "DISCONNECT",
            PacketType::Reserved(_) => "RESERVED",
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One complete MQTT control packet as read off a stream.
///
/// The payload is kept opaque; ownership moves from the reading pump to the
/// writing side (and the recorder) without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// The fixed header byte: type code in the high nibble, flags in the low
    pub fixed_header: u8,
    /// The variable header and payload, exactly `remaining length` bytes
    pub payload: Bytes,
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        PacketType::from_code(self.fixed_header >> 4)
    }

    pub fn flags(&self) -> u8 {
        self.fixed_header & FIXED_HEADER_FLAGS_MASK
    }

    pub fn remaining_length(&self) -> usize {
        self.payload.len()
    }

    /// Human-readable one-line summary for observability output
    pub fn summary(&self) -> String {
        format!(
            "{} (flags 0x{:x}, {} bytes)",
            self.packet_type(),
            self.flags(),
            self.remaining_length()
        )
    }
}
