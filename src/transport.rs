//! The byte-stream seam between the protocol engine and the outside world.
//!
//! The engine consumes anything that is `AsyncRead + AsyncWrite`; TLS
//! handshakes (and their ALPN result) happen in a [`Connect`]
//! implementation supplied by the embedder. Two implementations ship with
//! the crate: [`TcpConnector`] for cleartext prior-knowledge h2c, and the
//! deterministic in-memory [`mock`] used by the test suite.

use crate::error::Error;

use http::Uri;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Marker trait for transports the engine can drive.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// A type-erased transport.
pub struct BoxIo {
    inner: Box<dyn Io>,
}

impl BoxIo {
    pub fn new<T: Io + 'static>(io: T) -> BoxIo {
        BoxIo { inner: Box::new(io) }
    }
}

impl fmt::Debug for BoxIo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("BoxIo")
    }
}

impl AsyncRead for BoxIo {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for BoxIo {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut *self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_shutdown(cx)
    }
}

/// The protocol scheme of an origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// A connection target: (scheme, host, port).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Origin {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Origin {
        Origin {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Extract the origin of a request URI.
    pub fn from_uri(uri: &Uri) -> Result<Origin, Error> {
        let scheme = match uri.scheme_str() {
            Some("http") => Scheme::Http,
            Some("https") => Scheme::Https,
            _ => return Err(crate::codec::UserError::MissingUriSchemeAndAuthority.into()),
        };

        let host = match uri.host() {
            Some(host) => host.to_string(),
            None => return Err(crate::codec::UserError::MissingUriSchemeAndAuthority.into()),
        };

        let port = uri.port_u16().unwrap_or_else(|| scheme.default_port());

        Ok(Origin { scheme, host, port })
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

/// The application protocol selected while establishing a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alpn {
    /// `h2` was negotiated (or is implied by prior knowledge).
    H2,
    /// The peer selected `http/1.1` (or offered no ALPN at all).
    Http11,
}

/// An established transport plus its negotiated protocol.
#[derive(Debug)]
pub struct Connected {
    pub io: BoxIo,
    pub alpn: Alpn,
}

impl Connected {
    pub fn new<T: Io + 'static>(io: T, alpn: Alpn) -> Connected {
        Connected {
            io: BoxIo::new(io),
            alpn,
        }
    }
}

pub type ConnectFuture = Pin<Box<dyn Future<Output = Result<Connected, Error>> + Send>>;

/// Establishes transports for the client.
///
/// TLS connectors perform the handshake (including certificate
/// verification per `Config::verify_ssl`) and report the ALPN outcome;
/// this crate never looks inside the handshake.
pub trait Connect: Send + Sync + 'static {
    fn connect(&self, origin: &Origin) -> ConnectFuture;
}

/// Plain TCP, for cleartext prior-knowledge h2c.
///
/// Refuses `https://` origins: those need a TLS-capable connector from the
/// embedder.
#[derive(Debug, Default, Clone)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> TcpConnector {
        TcpConnector
    }
}

impl Connect for TcpConnector {
    fn connect(&self, origin: &Origin) -> ConnectFuture {
        let origin = origin.clone();

        Box::pin(async move {
            if origin.scheme == Scheme::Https {
                return Err(Error::from_io(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "https origins require a TLS connector",
                )));
            }

            tracing::debug!("connecting; origin={}", origin);

            let stream = TcpStream::connect((origin.host.as_str(), origin.port))
                .await
                .map_err(Error::from_io)?;
            stream.set_nodelay(true).map_err(Error::from_io)?;

            // Cleartext connections only exist in prior-knowledge mode, so
            // the protocol is h2 by definition.
            Ok(Connected::new(stream, Alpn::H2))
        })
    }
}

pub mod mock {
    //! A deterministic in-memory transport.
    //!
    //! [`pair`] returns the two ends of a duplex pipe. Tests hand one end
    //! to the client and drive the other as the peer: bytes written by the
    //! client appear on the peer end, bytes written by the peer are read
    //! by the client, and shutting either end down surfaces EOF on the
    //! other.

    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll, Waker};

    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

    /// One direction of the pipe.
    #[derive(Debug, Default)]
    struct Channel {
        data: VecDeque<u8>,
        closed: bool,
        reader: Option<Waker>,
    }

    impl Channel {
        fn wake(&mut self) {
            if let Some(waker) = self.reader.take() {
                waker.wake();
            }
        }
    }

    /// One end of an in-memory duplex transport.
    #[derive(Debug)]
    pub struct Mock {
        read: Arc<Mutex<Channel>>,
        write: Arc<Mutex<Channel>>,
    }

    /// Create a connected pair of mock transports.
    pub fn pair() -> (Mock, Mock) {
        let a = Arc::new(Mutex::new(Channel::default()));
        let b = Arc::new(Mutex::new(Channel::default()));

        (
            Mock {
                read: a.clone(),
                write: b.clone(),
            },
            Mock { read: b, write: a },
        )
    }

    impl Mock {
        /// Whether this end's outbound half has been shut down.
        pub fn is_closed(&self) -> bool {
            self.write.lock().unwrap().closed
        }
    }

    impl AsyncRead for Mock {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let mut chan = self.read.lock().unwrap();

            if chan.data.is_empty() {
                if chan.closed {
                    // EOF
                    return Poll::Ready(Ok(()));
                }

                chan.reader = Some(cx.waker().clone());
                return Poll::Pending;
            }

            let n = std::cmp::min(buf.remaining(), chan.data.len());
            for byte in chan.data.drain(..n) {
                buf.put_slice(&[byte]);
            }

            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for Mock {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let mut chan = self.write.lock().unwrap();

            if chan.closed {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }

            chan.data.extend(buf);
            chan.wake();

            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            let mut chan = self.write.lock().unwrap();
            chan.closed = true;
            chan.wake();
            Poll::Ready(Ok(()))
        }
    }

    impl Drop for Mock {
        fn drop(&mut self) {
            // The peer observes a dropped endpoint as EOF.
            let mut chan = self.write.lock().unwrap();
            chan.closed = true;
            chan.wake();
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        #[tokio::test]
        async fn round_trips_bytes() {
            let (mut client, mut server) = pair();

            client.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            server.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");

            server.write_all(b"pong").await.unwrap();
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"pong");
        }

        #[tokio::test]
        async fn dropping_an_end_surfaces_eof() {
            let (mut client, server) = pair();
            drop(server);

            let mut buf = Vec::new();
            let n = client.read_to_end(&mut buf).await.unwrap();
            assert_eq!(n, 0);
        }
    }
}
