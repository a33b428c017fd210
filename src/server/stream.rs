// src/server/stream.rs

use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{client, server};

/// Wraps the concrete transports a connection endpoint can run over: a plain
/// TCP socket, a server-side (control service accepting an agent) or
/// client-side (agent dialing the control service) mutually-authenticated
/// TLS stream, or an in-process `tokio::io::duplex()` pipe used by loopback
/// tests. One `AsyncRead + AsyncWrite` type lets `ConnectionHandler` stay
/// agnostic of which transport it's driving.
pub enum AnyStream {
    Tcp(TcpStream),
    TlsServer(Box<server::TlsStream<TcpStream>>),
    TlsClient(Box<client::TlsStream<TcpStream>>),
    Duplex(DuplexStream),
}

impl AnyStream {
    pub fn from_duplex(stream: DuplexStream) -> Self {
        AnyStream::Duplex(stream)
    }
}

impl AsyncRead for AnyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            AnyStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            AnyStream::TlsServer(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            AnyStream::TlsClient(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            AnyStream::Duplex(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for AnyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        match self.get_mut() {
            AnyStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            AnyStream::TlsServer(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            AnyStream::TlsClient(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            AnyStream::Duplex(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            AnyStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            AnyStream::TlsServer(s) => Pin::new(s.as_mut()).poll_flush(cx),
            AnyStream::TlsClient(s) => Pin::new(s.as_mut()).poll_flush(cx),
            AnyStream::Duplex(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            AnyStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            AnyStream::TlsServer(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            AnyStream::TlsClient(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            AnyStream::Duplex(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
