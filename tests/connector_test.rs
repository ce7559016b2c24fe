//! Tests for the broker transport connector

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use mqttproxy::transport::{open_connection, BrokerStream, TransportError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_unsupported_scheme_is_a_typed_error() {
    for bad in ["ftp://broker:1883", "http://broker:1883", "mqttx://broker"] {
        let url = Url::parse(bad).unwrap();
        let result = open_connection(&url, None, CONNECT_TIMEOUT, &[]).await;
        assert!(
            matches!(result, Err(TransportError::UnsupportedScheme(_))),
            "{bad} should be rejected as an unsupported scheme"
        );
    }
}

#[tokio::test]
async fn test_plain_schemes_dial_tcp() {
    for scheme in ["mqtt", "tcp"] {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let echo = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        });

        let url = Url::parse(&format!("{scheme}://127.0.0.1:{}", addr.port())).unwrap();
        let mut stream = open_connection(&url, None, CONNECT_TIMEOUT, &[])
            .await
            .unwrap();
        assert!(matches!(stream, BrokerStream::Tcp(_)));

        stream.write_all(&[0xC0, 0x00]).await.unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0xC0, 0x00]);

        echo.await.unwrap();
    }
}

#[tokio::test]
async fn test_ws_scheme_dials_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // A WebSocket peer that echoes binary frames back
    let echo = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Binary(data) => ws.send(Message::Binary(data)).await.unwrap(),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let url = Url::parse(&format!("ws://127.0.0.1:{}", addr.port())).unwrap();
    let mut stream = open_connection(&url, None, CONNECT_TIMEOUT, &[])
        .await
        .unwrap();
    assert!(matches!(stream, BrokerStream::Ws(_)));

    // The byte-stream adapter should carry packet bytes through frames
    stream.write_all(&[0xC0, 0x00]).await.unwrap();
    stream.flush().await.unwrap();

    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0xC0, 0x00]);

    drop(stream);
    echo.await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_scheme_dials_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let sock_path = dir.path().join("broker.sock");

    let listener = tokio::net::UnixListener::bind(&sock_path).unwrap();
    let echo = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        stream.write_all(&buf).await.unwrap();
    });

    let url = Url::parse(&format!("unix://{}", sock_path.display())).unwrap();
    let mut stream = open_connection(&url, None, CONNECT_TIMEOUT, &[])
        .await
        .unwrap();
    assert!(matches!(stream, BrokerStream::Unix(_)));

    stream.write_all(&[0xD0, 0x00]).await.unwrap();
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0xD0, 0x00]);

    echo.await.unwrap();
}

#[tokio::test]
async fn test_dial_failure_is_contained_to_the_attempt() {
    // Nothing listens on this port; the dial must fail with a typed error,
    // not hang past the establishment timeout
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("mqtt://127.0.0.1:{}", addr.port())).unwrap();
    let result = open_connection(&url, None, CONNECT_TIMEOUT, &[]).await;
    assert!(matches!(
        result,
        Err(TransportError::Dial(_) | TransportError::ConnectTimeout { .. })
    ));
}
