//! MQTT Packet Codec
//!
//! Reads exactly one frame per call and never consumes bytes belonging to
//! the next frame. Encoding a decoded packet reproduces the input bytes.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::packet::constants::*;
use crate::packet::types::Packet;

/// Errors raised while decoding a packet from a stream
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The stream ended cleanly on a frame boundary
    #[error("end of stream")]
    EndOfStream,

    /// The stream ended in the middle of a frame
    #[error("stream truncated mid-frame: {0}")]
    Truncated(std::io::Error),

    /// The remaining-length field used more than four bytes
    #[error("malformed remaining length: continuation past {REMAINING_LENGTH_MAX_BYTES} bytes")]
    MalformedLength,

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Read one MQTT control packet from the stream.
///
/// EOF before the first header byte is `EndOfStream`; EOF anywhere after it
/// is `Truncated`.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 1];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(CodecError::EndOfStream);
        }
        Err(e) => return Err(CodecError::Io(e)),
    }

    let remaining = read_remaining_length(reader).await?;

    let mut payload = vec![0u8; remaining];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => CodecError::Truncated(e),
            _ => CodecError::Io(e),
        })?;

    Ok(Packet {
        fixed_header: header[0],
        payload: Bytes::from(payload),
    })
}

/// Serialize a packet back to wire bytes.
pub fn encode(packet: &Packet) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + REMAINING_LENGTH_MAX_BYTES + packet.payload.len());
    buf.put_u8(packet.fixed_header);
    put_remaining_length(&mut buf, packet.payload.len());
    buf.extend_from_slice(&packet.payload);
    buf.freeze()
}

/// Decode the variable byte integer following the fixed header byte.
async fn read_remaining_length<R>(reader: &mut R) -> Result<usize, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut value: usize = 0;
    let mut shift: u32 = 0;

    for i in 0.. {
        if i == REMAINING_LENGTH_MAX_BYTES {
            return Err(CodecError::MalformedLength);
        }

        let mut byte = [0u8; 1];
        reader
            .read_exact(&mut byte)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => CodecError::Truncated(e),
                _ => CodecError::Io(e),
            })?;

        value |= ((byte[0] & REMAINING_LENGTH_VALUE_MASK) as usize) << shift;
        shift += 7;

        if byte[0] & REMAINING_LENGTH_CONTINUATION == 0 {
            break;
        }
    }

    Ok(value)
}

/// Encode a remaining length as a variable byte integer.
fn put_remaining_length(buf: &mut BytesMut, mut len: usize) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= REMAINING_LENGTH_CONTINUATION;
        }
        buf.put_u8(byte);
        if len == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::types::PacketType;

    async fn decode(bytes: &[u8]) -> Result<Packet, CodecError> {
        let mut cursor = std::io::Cursor::new(bytes.to_vec());
        read_packet(&mut cursor).await
    }

    #[tokio::test]
    async fn test_decode_pingreq() {
        let packet = decode(&[0xC0, 0x00]).await.unwrap();
        assert_eq!(packet.packet_type(), PacketType::Pingreq);
        assert_eq!(packet.remaining_length(), 0);
    }

    #[tokio::test]
    async fn test_decode_consumes_exactly_one_frame() {
        let mut bytes = vec![0xC0, 0x00]; // PINGREQ
        bytes.extend_from_slice(&[0xD0, 0x00]); // PINGRESP
        let mut cursor = std::io::Cursor::new(bytes);

        let first = read_packet(&mut cursor).await.unwrap();
        assert_eq!(first.packet_type(), PacketType::Pingreq);

        let second = read_packet(&mut cursor).await.unwrap();
        assert_eq!(second.packet_type(), PacketType::Pingresp);

        assert!(matches!(
            read_packet(&mut cursor).await,
            Err(CodecError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn test_decode_multi_byte_remaining_length() {
        // 321 = 0xC1 0x02 in variable byte encoding
        let mut bytes = vec![0x30, 0xC1, 0x02];
        bytes.extend_from_slice(&vec![0xAB; 321]);

        let packet = decode(&bytes).await.unwrap();
        assert_eq!(packet.packet_type(), PacketType::Publish);
        assert_eq!(packet.remaining_length(), 321);
    }

    #[tokio::test]
    async fn test_decode_malformed_remaining_length() {
        // Five continuation bytes overflow the four byte limit
        let result = decode(&[0x30, 0x80, 0x80, 0x80, 0x80, 0x01]).await;
        assert!(matches!(result, Err(CodecError::MalformedLength)));
    }

    #[tokio::test]
    async fn test_decode_truncated_payload() {
        // Claims 10 payload bytes but provides 3
        let result = decode(&[0x30, 0x0A, 0x01, 0x02, 0x03]).await;
        assert!(matches!(result, Err(CodecError::Truncated(_))));
    }

    #[tokio::test]
    async fn test_decode_truncated_length_field() {
        let result = decode(&[0x30, 0x80]).await;
        assert!(matches!(result, Err(CodecError::Truncated(_))));
    }

    #[tokio::test]
    async fn test_encode_round_trip() {
        let cases: Vec<Vec<u8>> = vec![
            vec![0xC0, 0x00],
            vec![0xE0, 0x00],
            {
                // CONNECT with a small variable header
                let mut v = vec![0x10, 0x0C];
                v.extend_from_slice(&[0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x02, 0x00, 0x3C, 0x00, 0x00]);
                v
            },
            {
                // PUBLISH crossing the one byte length boundary (remaining = 200)
                let mut v = vec![0x30, 0xC8, 0x01];
                v.extend_from_slice(&vec![0x55; 200]);
                v
            },
        ];

        for bytes in cases {
            let packet = decode(&bytes).await.unwrap();
            assert_eq!(encode(&packet).as_ref(), bytes.as_slice());
        }
    }

    #[test]
    fn test_remaining_length_encoding_boundaries() {
        for (len, expected) in [
            (0usize, vec![0x00u8]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (16_383, vec![0xFF, 0x7F]),
            (16_384, vec![0x80, 0x80, 0x01]),
            (REMAINING_LENGTH_MAX, vec![0xFF, 0xFF, 0xFF, 0x7F]),
        ] {
            let mut buf = BytesMut::new();
            put_remaining_length(&mut buf, len);
            assert_eq!(buf.as_ref(), expected.as_slice(), "length {len}");
        }
    }
}
