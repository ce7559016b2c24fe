//! Broker Stream Types
//!
//! A dialed broker connection can sit on plain TCP, TLS, a SOCKS tunnel, a
//! Unix socket, or a WebSocket. `BrokerStream` erases that choice behind one
//! `AsyncRead + AsyncWrite` type so the relay never branches on transport.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, BytesMut};
use futures_util::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// A dialed broker connection
pub enum BrokerStream {
    Tcp(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
    Socks(Socks5Stream<TcpStream>),
    SocksTls(Box<tokio_rustls::client::TlsStream<Socks5Stream<TcpStream>>>),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
    Ws(Box<WsByteStream<MaybeTlsStream<TcpStream>>>),
}

macro_rules! dispatch {
    ($self:expr, $stream:pat => $body:expr) => {
        match $self {
            BrokerStream::Tcp($stream) => $body,
            BrokerStream::Tls($stream) => $body,
            BrokerStream::Socks($stream) => $body,
            BrokerStream::SocksTls($stream) => $body,
            #[cfg(unix)]
            BrokerStream::Unix($stream) => $body,
            BrokerStream::Ws($stream) => $body,
        }
    };
}

impl AsyncRead for BrokerStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        dispatch!(self.get_mut(), s => Pin::new(s).poll_read(cx, buf))
    }
}

impl AsyncWrite for BrokerStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        dispatch!(self.get_mut(), s => Pin::new(s).poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        dispatch!(self.get_mut(), s => Pin::new(s).poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        dispatch!(self.get_mut(), s => Pin::new(s).poll_shutdown(cx))
    }
}

/// Adapts a WebSocket into a duplex byte stream.
///
/// MQTT-over-WebSocket carries packet bytes in binary frames. Reads drain
/// incoming binary (and text) frames into an internal buffer; each write
/// becomes one binary frame. A Close frame or the end of the message stream
/// reads as EOF.
pub struct WsByteStream<S> {
    inner: WebSocketStream<S>,
    read_buf: BytesMut,
}

impl<S> WsByteStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: WebSocketStream<S>) -> Self {
        Self {
            inner,
            read_buf: BytesMut::new(),
        }
    }
}

fn ws_to_io_error(err: WsError) -> std::io::Error {
    match err {
        WsError::Io(e) => e,
        other => std::io::Error::other(other),
    }
}

impl<S> AsyncRead for WsByteStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.read_buf.is_empty() {
                let n = this.read_buf.len().min(buf.remaining());
                buf.put_slice(&this.read_buf[..n]);
                this.read_buf.advance(n);
                return Poll::Ready(Ok(()));
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(Message::Binary(data)))) => {
                    this.read_buf.extend_from_slice(&data);
                }
                Poll::Ready(Some(Ok(Message::Text(text)))) => {
                    this.read_buf.extend_from_slice(text.as_bytes());
                }
                // Pings are answered by tungstenite itself on subsequent polls
                Poll::Ready(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
                Poll::Ready(Some(Ok(Message::Frame(_)))) => continue,
                Poll::Ready(Some(Ok(Message::Close(_)))) | Poll::Ready(None) => {
                    return Poll::Ready(Ok(()));
                }
                Poll::Ready(Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed))) => {
                    return Poll::Ready(Ok(()));
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(ws_to_io_error(e))),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<S> AsyncWrite for WsByteStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();

        match Pin::new(&mut this.inner).poll_ready(cx) {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(e)) => return Poll::Ready(Err(ws_to_io_error(e))),
            Poll::Pending => return Poll::Pending,
        }

        Pin::new(&mut this.inner)
            .start_send(Message::Binary(buf.to_vec()))
            .map_err(ws_to_io_error)?;

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner)
            .poll_flush(cx)
            .map_err(ws_to_io_error)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_close(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
            Poll::Ready(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(ws_to_io_error(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}
