//! Client implementation of the HTTP/2 protocol.
//!
//! # Getting started
//!
//! There are two ways in. The low level one mirrors the shape of the
//! protocol: obtain a connected transport (TCP for prior-knowledge h2c, or
//! a TLS stream whose ALPN already selected `h2`), hand it to
//! [`handshake`], and receive a ([`SendRequest`], [`Connection`]) pair.
//! The [`Connection`] is a future that drives all I/O for the connection
//! and must be spawned; the [`SendRequest`] handle opens streams on it
//! from any task.
//!
//! The high level one is [`Client`]: a pooled, origin-keyed front end that
//! wires the protocol negotiator, the connection pool and the per-origin
//! circuit breakers together and exposes a single
//! [`request`](Client::request) call.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use h2_client::client;
//! use http::Request;
//! use tokio::net::TcpStream;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let tcp = TcpStream::connect("127.0.0.1:8080").await?;
//! let (mut h2, connection) = client::handshake(tcp).await?;
//!
//! tokio::spawn(async move {
//!     if let Err(e) = connection.await {
//!         eprintln!("connection failed: {}", e);
//!     }
//! });
//!
//! let request = Request::builder()
//!     .uri("http://127.0.0.1:8080/")
//!     .body(Bytes::new())?;
//!
//! let response = h2.send_request(request)?.await?;
//! println!("status: {}", response.status());
//! # Ok(())
//! # }
//! ```

use crate::breaker::BreakerRegistry;
use crate::codec::{Codec, UserError};
use crate::config::Config;
use crate::error::Error;
use crate::frame::{Pseudo, StreamId};
use crate::hpack::header::validate_field_name;
use crate::hpack::BytesStr;
use crate::negotiator::{Negotiator, Protocol};
use crate::pool::{Pool, Token};
use crate::proto;
use crate::transport::{Alpn, BoxIo, Connect, Origin, Scheme, TcpConnector};

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// The client connection preface, sent before any frame.
pub(crate) const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Performs the HTTP/2 handshake over `io` with the default configuration.
///
/// `io` must already be a negotiated h2 transport: a TLS stream whose ALPN
/// selected `h2`, or a cleartext stream used with prior knowledge.
pub async fn handshake<T>(io: T) -> Result<(SendRequest, Connection<T>), Error>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    Builder::new().handshake(io).await
}

/// Builds client connections with custom protocol settings.
#[derive(Clone, Debug, Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            config: Config::default(),
        }
    }

    pub fn from_config(config: Config) -> Builder {
        Builder { config }
    }

    /// Set the advertised initial stream window size.
    pub fn initial_window_size(&mut self, size: u32) -> &mut Self {
        self.config.initial_window_size = size;
        self
    }

    /// Set the max frame size of received frames.
    pub fn max_frame_size(&mut self, max: u32) -> &mut Self {
        self.config.max_frame_size = max;
        self
    }

    /// Set the maximum number of concurrent streams advertised to the
    /// peer.
    pub fn max_concurrent_streams(&mut self, max: u32) -> &mut Self {
        self.config.max_concurrent_streams = max;
        self
    }

    /// Bound the decoded size of a header list.
    pub fn max_header_list_size(&mut self, max: u32) -> &mut Self {
        self.config.max_header_list_size = Some(max);
        self
    }

    /// Perform the HTTP/2 handshake: preface, then the local SETTINGS.
    ///
    /// Requests may be submitted immediately, but are not transmitted
    /// until the peer's first SETTINGS frame has been received and
    /// acknowledged.
    pub async fn handshake<T>(&self, mut io: T) -> Result<(SendRequest, Connection<T>), Error>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        tracing::debug!("binding client connection");

        io.write_all(PREFACE).await.map_err(Error::from_io)?;

        let local_settings = self.config.local_settings();

        let mut codec = Codec::with_max_recv_frame_size(io, self.config.max_frame_size as usize);

        // Buffer the initial SETTINGS frame; it goes out with the first
        // flush of the connection task.
        codec
            .buffer(local_settings.clone().into())
            .expect("invalid SETTINGS frame");

        let inner = proto::Connection::new(
            codec,
            proto::Config {
                local_settings,
                continuation_limits: self.config.continuation_limits(),
            },
        );

        let send_request = SendRequest {
            inner: inner.streams(),
        };

        tracing::debug!("client connection bound");

        Ok((send_request, Connection { inner }))
    }
}

// ===== impl Connection =====

/// A future that drives all I/O and protocol state for one connection.
///
/// This must be spawned (or polled) for any stream on the connection to
/// make progress.
#[must_use = "futures do nothing unless polled"]
pub struct Connection<T> {
    inner: proto::Connection<T>,
}

impl<T> Future for Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll(cx).map_err(Into::into)
    }
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("Connection").finish()
    }
}

// ===== impl SendRequest =====

/// A handle for opening streams on an established connection.
///
/// Cheap to clone; every clone talks to the same connection.
#[derive(Clone, Debug)]
pub struct SendRequest {
    inner: proto::Streams,
}

impl SendRequest {
    /// Send a request on a new HTTP/2 stream.
    ///
    /// The request body is taken up front; END_STREAM rides on the HEADERS
    /// frame when it is empty, otherwise on the final DATA frame. The
    /// returned future resolves to the complete response. Dropping it
    /// cancels the stream with RST_STREAM(CANCEL).
    pub fn send_request(&mut self, request: Request<Bytes>) -> Result<ResponseFuture, Error> {
        let (parts, body) = request.into_parts();
        let (pseudo, fields) = Peer::convert_send_message(parts)?;

        let (id, rx) = self.inner.send_request(pseudo, fields, body)?;

        Ok(ResponseFuture {
            streams: self.inner.clone(),
            id,
            rx,
            done: false,
        })
    }

    /// Measure the connection round-trip time with a PING frame.
    pub fn ping(&mut self) -> Result<PingFuture, Error> {
        let rx = self.inner.ping()?;
        Ok(PingFuture { rx })
    }

    /// Begin a graceful shutdown: a GOAWAY(NO_ERROR) is sent, in-flight
    /// streams run to completion, and the connection then closes.
    pub fn graceful_close(&self) {
        self.inner.graceful_close();
    }

    /// Number of streams that have not fully closed yet.
    pub fn active_streams(&self) -> usize {
        self.inner.active_streams()
    }

    /// Whether this connection can accept another request right now.
    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }
}

// ===== impl ResponseFuture =====

/// A future of a fully assembled HTTP response.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct ResponseFuture {
    streams: proto::Streams,
    id: StreamId,
    rx: oneshot::Receiver<Result<Response<Bytes>, proto::Error>>,
    done: bool,
}

impl ResponseFuture {
    /// The stream carrying this response.
    pub fn stream_id(&self) -> u32 {
        self.id.into()
    }
}

impl Future for ResponseFuture {
    type Output = Result<Response<Bytes>, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(Ok(response))) => Ok(response),
            Poll::Ready(Ok(Err(e))) => Err(e.into()),
            Poll::Ready(Err(_)) => {
                // The connection went away without resolving the stream.
                Err(Error::from_io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "connection closed before the response arrived",
                )))
            }
            Poll::Pending => return Poll::Pending,
        };

        self.done = true;
        Poll::Ready(result)
    }
}

impl Drop for ResponseFuture {
    fn drop(&mut self) {
        if !self.done {
            self.streams.cancel_stream(self.id);
        }
    }
}

/// A future of a PING round-trip time.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct PingFuture {
    rx: oneshot::Receiver<Duration>,
}

impl Future for PingFuture {
    type Output = Result<Duration, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| {
            res.map_err(|_| {
                Error::from_io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "connection closed before the ping was acknowledged",
                ))
            })
        })
    }
}

// ===== impl Peer =====

/// Translates `http` requests into HEADERS frame parts.
pub(crate) struct Peer;

impl Peer {
    pub fn convert_send_message(
        parts: http::request::Parts,
    ) -> Result<(Pseudo, HeaderMap), Error> {
        let method = parts.method;
        let uri = parts.uri;
        let mut headers = parts.headers;

        let is_connect = method == Method::CONNECT;

        let mut pseudo = if is_connect {
            // CONNECT omits :scheme and :path and requires :authority.
            Pseudo {
                method: Some(method),
                scheme: None,
                authority: None,
                path: None,
                status: None,
            }
        } else {
            let scheme = uri
                .scheme_str()
                .ok_or(UserError::MissingUriSchemeAndAuthority)?;

            // `:path` must never be empty for http(s) requests.
            let path = uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .filter(|path| !path.is_empty())
                .unwrap_or("/");

            Pseudo::request(method, BytesStr::from(scheme), BytesStr::from(path))
        };

        if let Some(authority) = uri.authority() {
            pseudo.set_authority(BytesStr::from(authority.as_str()));
        }

        // A `host` header is carried as `:authority`, with the value's case
        // preserved.
        if let Some(host) = headers.remove(http::header::HOST) {
            if pseudo.authority.is_none() {
                let host = host.to_str().map_err(|_| UserError::MalformedHeaders)?;
                pseudo.set_authority(BytesStr::from(host));
            }
        }

        if pseudo.authority.is_none() {
            return Err(UserError::MissingUriSchemeAndAuthority.into());
        }

        for (name, value) in headers.iter() {
            // HTTP/2 carries no connection-specific headers (RFC 9113
            // § 8.2.2).
            let rejected = match *name {
                http::header::CONNECTION
                | http::header::TRANSFER_ENCODING
                | http::header::UPGRADE => true,
                http::header::TE => value.as_bytes() != b"trailers",
                _ => {
                    let name = name.as_str();
                    name == "keep-alive" || name.starts_with("proxy-")
                }
            };

            if rejected {
                tracing::debug!("rejecting connection-specific header; name={:?}", name);
                return Err(UserError::MalformedHeaders.into());
            }

            if validate_field_name(name.as_str().as_bytes()).is_err() {
                return Err(UserError::MalformedHeaders.into());
            }
        }

        Ok((pseudo, headers))
    }
}

// ===== impl Client =====

/// A pooled HTTP/2 client.
///
/// Requests flow negotiator → circuit breaker → pool → connection; the
/// pool scores connections after every request and the breakers contain
/// per-origin failure storms.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Config,
    connector: Arc<dyn Connect>,
    pool: Pool,
    negotiator: Negotiator,
    breakers: BreakerRegistry,
}

impl std::fmt::Debug for ClientInner {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Client {
    fn default() -> Self {
        Client::new()
    }
}

impl Client {
    /// A client with default configuration and the plain TCP connector.
    ///
    /// Without a TLS-capable connector only prior-knowledge cleartext
    /// origins are reachable; see [`Client::with_connector`].
    pub fn new() -> Client {
        Client::with_connector(Arc::new(TcpConnector::new()), Config::from_env())
    }

    pub fn with_config(config: Config) -> Client {
        Client::with_connector(Arc::new(TcpConnector::new()), config)
    }

    /// A client using `connector` to establish (and, for `https`,
    /// TLS-handshake) transports.
    pub fn with_connector(connector: Arc<dyn Connect>, config: Config) -> Client {
        Client {
            inner: Arc::new(ClientInner {
                pool: Pool::new(config.connection_pool_size, config.pool_idle_timeout),
                negotiator: Negotiator::new(config.negotiation_memo_ttl),
                breakers: BreakerRegistry::new(
                    config.circuit_breaker_failure_threshold,
                    config.circuit_breaker_recovery_timeout,
                ),
                connector,
                config,
            }),
        }
    }

    /// The process-wide shared client.
    pub fn shared() -> &'static Client {
        static SHARED: OnceLock<Client> = OnceLock::new();
        SHARED.get_or_init(Client::new)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Send a request and await the complete response.
    ///
    /// A response with a non-2xx status is not an error.
    pub async fn request(&self, request: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let origin = Origin::from_uri(request.uri())?;

        let breaker = if self.inner.config.circuit_breaker_enabled {
            let breaker = self.inner.breakers.get(&origin.to_string());
            if !breaker.should_allow() {
                tracing::debug!("circuit open; origin={}", origin);
                return Err(Error::circuit_open());
            }
            Some(breaker)
        } else {
            None
        };

        let result = self.request_inner(&origin, request).await;

        if let Some(breaker) = breaker {
            match &result {
                Ok(_) => breaker.record_success(),
                Err(e) => breaker.record_failure(e),
            }
        }

        result
    }

    async fn request_inner(
        &self,
        origin: &Origin,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, Error> {
        self.inner.pool.cleanup_expired();

        let (mut sender, token) = self.acquire(origin).await?;

        let started = Instant::now();
        let result = tokio::time::timeout(self.inner.config.default_timeout, async {
            sender.send_request(request)?.await
        })
        .await;
        let rtt = started.elapsed();

        // Dropping the response future on timeout already sent
        // RST_STREAM(CANCEL); only the bookkeeping is left.
        let result = match result {
            Ok(result) => result,
            Err(_) => Err(Error::timeout()),
        };

        self.inner.pool.release(token, result.is_ok(), rtt);

        result
    }

    /// Open a connection to `origin` before the first request needs it.
    pub fn warmup(&self, origin: Origin) {
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.acquire(&origin).await {
                tracing::debug!("warmup failed; origin={} err={}", origin, e);
            }
        });
    }

    /// Close pooled connections that have been idle past the configured
    /// TTL.
    pub fn cleanup_expired(&self) {
        self.inner.pool.cleanup_expired();
    }

    async fn acquire(&self, origin: &Origin) -> Result<(SendRequest, Token), Error> {
        if let Some(hit) = self.inner.pool.checkout(origin) {
            return Ok(hit);
        }

        // Serialize connection creation per origin so parallel callers
        // coalesce onto one new connection.
        let create_lock = self.inner.pool.create_lock(origin);
        let _guard = create_lock.lock().await;

        if let Some(hit) = self.inner.pool.checkout(origin) {
            return Ok(hit);
        }

        let sender = self.connect(origin).await?;
        let token = self.inner.pool.insert(origin.clone(), sender.clone());

        Ok((sender, token))
    }

    async fn connect(&self, origin: &Origin) -> Result<SendRequest, Error> {
        self.inner
            .negotiator
            .plan(origin, self.inner.config.h2_prior_knowledge)?;

        let connect = self.inner.connector.connect(origin);
        let connected = tokio::time::timeout(self.inner.config.connect_timeout, connect)
            .await
            .map_err(|_| Error::timeout())??;

        let protocol = match connected.alpn {
            Alpn::H2 => {
                if origin.scheme == Scheme::Http {
                    Protocol::H2c
                } else {
                    Protocol::H2
                }
            }
            Alpn::Http11 => Protocol::H11,
        };
        self.inner.negotiator.record(origin, protocol);

        if protocol == Protocol::H11 {
            tracing::debug!("peer negotiated http/1.1; origin={}", origin);
            return Err(crate::frame::Reason::HTTP_1_1_REQUIRED.into());
        }

        let (sender, connection): (_, Connection<BoxIo>) =
            Builder::from_config(self.inner.config.clone())
                .handshake(connected.io)
                .await?;

        let display_origin = origin.to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("connection terminated; origin={} err={}", display_origin, e);
            }
        });

        Ok(sender)
    }
}
