//! An asynchronous HTTP/2 client.
//!
//! This crate implements the client side of the HTTP/2 protocol (RFC
//! 9113) and the machinery a production client needs around it:
//!
//! * the frame codec and HPACK header compression (RFC 7541),
//! * stream multiplexing with full flow control at both the connection
//!   and stream scope,
//! * a connection pool with per-connection health scoring,
//! * a per-origin protocol negotiator (ALPN outcome memoization and
//!   cleartext prior-knowledge h2c), and
//! * per-origin circuit breakers with optional state persistence.
//!
//! # Layering
//!
//! [`client::handshake`] is the protocol-level entry point: it takes any
//! `AsyncRead + AsyncWrite` transport that already negotiated h2 and
//! returns a ([`client::SendRequest`], [`client::Connection`]) pair, in
//! the same two-handle shape used across the tokio HTTP stack. The
//! [`client::Connection`] future owns all I/O and must be spawned.
//!
//! [`client::Client`] sits on top and adds origin management: it keys
//! connections by `(scheme, host, port)`, scores and reuses them, refuses
//! calls to origins whose circuit breaker is open, and applies the
//! configured request and connect deadlines.
//!
//! TLS is deliberately out of scope: the engine consumes transports whose
//! handshake (and ALPN result) was produced by a
//! [`transport::Connect`] implementation supplied by the embedder.
//!
//! Responses are buffered and surfaced as a single owned
//! `http::Response<bytes::Bytes>` once the peer finishes the stream;
//! trailer fields, when present, ride in the response extensions as
//! [`Trailers`].

#![deny(missing_debug_implementations)]

macro_rules! proto_err {
    (conn: $($msg:tt)+) => {
        tracing::debug!("connection error PROTOCOL_ERROR -- {};", format_args!($($msg)+))
    };
    (stream: $($msg:tt)+) => {
        tracing::debug!("stream error PROTOCOL_ERROR -- {};", format_args!($($msg)+))
    };
}

#[cfg(feature = "unstable")]
pub mod codec;
#[cfg(not(feature = "unstable"))]
mod codec;

#[cfg(feature = "unstable")]
pub mod frame;
#[cfg(not(feature = "unstable"))]
mod frame;

#[cfg(feature = "unstable")]
pub mod hpack;
#[cfg(not(feature = "unstable"))]
mod hpack;

mod config;
mod error;
mod pool;
mod proto;

pub mod breaker;
pub mod client;
pub mod negotiator;
pub mod transport;

pub use crate::config::Config;
pub use crate::error::{Error, Reason};
pub use crate::proto::Trailers;

pub use crate::client::{handshake, Client};

/// Wire-level internals for the test harness; no stability guarantees.
#[cfg(feature = "unstable")]
pub use crate::proto::Error as ProtoError;
