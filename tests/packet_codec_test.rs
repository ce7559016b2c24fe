//! Tests for the MQTT packet codec

use mqttproxy::packet::{codec, read_packet, CodecError, PacketType};

/// Build a syntactically valid frame with the given type code and payload size
fn frame(type_code: u8, flags: u8, payload_len: usize) -> Vec<u8> {
    let mut bytes = vec![(type_code << 4) | flags];
    let mut len = payload_len;
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        bytes.push(byte);
        if len == 0 {
            break;
        }
    }
    bytes.extend((0..payload_len).map(|i| (i % 251) as u8));
    bytes
}

#[tokio::test]
async fn test_round_trip_law() {
    // Every packet type at several payload sizes, including the encoding
    // boundaries of the remaining-length field
    for type_code in 1u8..=14 {
        for payload_len in [0usize, 1, 2, 127, 128, 129, 16_383, 16_384] {
            let bytes = frame(type_code, 0, payload_len);
            let mut cursor = std::io::Cursor::new(bytes.clone());

            let packet = read_packet(&mut cursor).await.unwrap();
            assert_eq!(
                codec::encode(&packet).as_ref(),
                bytes.as_slice(),
                "type {type_code} payload {payload_len}"
            );
        }
    }
}

#[tokio::test]
async fn test_flags_survive_round_trip() {
    // PUBLISH dup/qos/retain flags live in the low nibble
    for flags in [0x0u8, 0x1, 0x2, 0x3, 0x8, 0xB] {
        let bytes = frame(3, flags, 16);
        let mut cursor = std::io::Cursor::new(bytes.clone());

        let packet = read_packet(&mut cursor).await.unwrap();
        assert_eq!(packet.flags(), flags);
        assert_eq!(codec::encode(&packet).as_ref(), bytes.as_slice());
    }
}

#[tokio::test]
async fn test_decode_never_over_reads() {
    let mut bytes = Vec::new();
    let frames: Vec<Vec<u8>> = vec![frame(1, 0, 12), frame(3, 2, 300), frame(12, 0, 0)];
    for f in &frames {
        bytes.extend_from_slice(f);
    }
    let mut cursor = std::io::Cursor::new(bytes);

    let first = read_packet(&mut cursor).await.unwrap();
    assert_eq!(first.packet_type(), PacketType::Connect);

    let second = read_packet(&mut cursor).await.unwrap();
    assert_eq!(second.packet_type(), PacketType::Publish);
    assert_eq!(second.remaining_length(), 300);

    let third = read_packet(&mut cursor).await.unwrap();
    assert_eq!(third.packet_type(), PacketType::Pingreq);

    assert!(matches!(
        read_packet(&mut cursor).await,
        Err(CodecError::EndOfStream)
    ));
}

#[tokio::test]
async fn test_decode_across_fragmented_reads() {
    // A frame arriving in arbitrary chunks must decode identically
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let bytes = frame(3, 1, 200);
    let expected = bytes.clone();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        for chunk in bytes.chunks(7) {
            stream.write_all(chunk).await.unwrap();
            stream.flush().await.unwrap();
            tokio::task::yield_now().await;
        }
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let packet = read_packet(&mut stream).await.unwrap();
    assert_eq!(codec::encode(&packet).as_ref(), expected.as_slice());
}
