use crate::frame::{self, Reason, StreamId};
use crate::proto::{Error, Initiator};

use std::io;

/// Represents the state of an H2 stream
///
/// ```not_rust
///                              +--------+
///                      send PP |        | recv PP
///                     ,--------|  idle  |--------.
///                    /         |        |         \
///                   v          +--------+          v
///            +----------+          |           +----------+
///            |          |          | send H /  |          |
///     ,------| reserved |          | recv H    | reserved |------.
///     |      | (local)  |          |           | (remote) |      |
///     |      +----------+          v           +----------+      |
///     |          |             +--------+             |          |
///     |          |     recv ES |        | send ES     |          |
///     |   send H |     ,-------|  open  |-------.     | recv H   |
///     |          |    /        |        |        \    |          |
///     |          v   v         +--------+         v   v          |
///     |      +----------+          |           +----------+      |
///     |      |   half   |          |           |   half   |      |
///     |      |  closed  |          | send R /  |  closed  |      |
///     |      | (remote) |          | recv R    | (local)  |      |
///     |      +----------+          |           +----------+      |
///     |           |                |                 |           |
///     |           | send ES /      |       recv ES / |           |
///     |           | send R /       v        send R / |           |
///     |           | recv R     +--------+   recv R   |           |
///     | send R /  `----------->|        |<-----------'  send R / |
///     | recv R                 | closed |               recv R   |
///     `----------------------->|        |<----------------------'
///                              +--------+
///
///        send:   endpoint sends this frame
///        recv:   endpoint receives this frame
///
///        H:  HEADERS frame (with implied CONTINUATIONs)
///        PP: PUSH_PROMISE frame (with implied CONTINUATIONs)
///        ES: END_STREAM flag
///        R:  RST_STREAM frame
/// ```
///
/// Server push is disabled by this client, so the reserved states are
/// unreachable and not modelled.
#[derive(Debug, Clone, Default)]
pub struct State {
    inner: Inner,
}

#[derive(Debug, Clone, Default)]
enum Inner {
    #[default]
    Idle,
    Open {
        local: Peer,
        remote: Peer,
    },
    HalfClosedLocal(Peer),
    HalfClosedRemote(Peer),
    Closed(Cause),
}

#[derive(Debug, Copy, Clone, Default)]
enum Peer {
    #[default]
    AwaitingHeaders,
    Streaming,
}

#[derive(Debug, Clone)]
enum Cause {
    EndStream,
    Error(Error),
}

impl State {
    /// Opens the send-half of a stream. The client opens a stream by
    /// sending HEADERS.
    pub fn send_open(&mut self, eos: bool) {
        match self.inner {
            Inner::Idle => {
                self.inner = if eos {
                    Inner::HalfClosedLocal(Peer::AwaitingHeaders)
                } else {
                    Inner::Open {
                        local: Peer::Streaming,
                        remote: Peer::AwaitingHeaders,
                    }
                };
            }
            ref state => unreachable!("send_open: stream already opened; state={:?}", state),
        }
    }

    /// Opens the receive-half of the stream when a HEADERS frame is
    /// received.
    pub fn recv_open(&mut self, frame: &frame::Headers) -> Result<(), Error> {
        let eos = frame.is_end_stream();

        self.inner = match self.inner {
            Inner::Open {
                local,
                remote: Peer::AwaitingHeaders,
            } => {
                if eos {
                    Inner::HalfClosedRemote(local)
                } else {
                    Inner::Open {
                        local,
                        remote: if frame.is_informational() {
                            tracing::trace!("skipping 1xx response headers");
                            Peer::AwaitingHeaders
                        } else {
                            Peer::Streaming
                        },
                    }
                }
            }
            Inner::HalfClosedLocal(Peer::AwaitingHeaders) => {
                if eos {
                    Inner::Closed(Cause::EndStream)
                } else if frame.is_informational() {
                    tracing::trace!("skipping 1xx response headers");
                    Inner::HalfClosedLocal(Peer::AwaitingHeaders)
                } else {
                    Inner::HalfClosedLocal(Peer::Streaming)
                }
            }
            ref state => {
                proto_err!(conn: "recv_open: in unexpected state {:?}", state);
                return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
            }
        };

        Ok(())
    }

    /// Indicates that the remote side will not send more data to the local.
    pub fn recv_close(&mut self) -> Result<(), Error> {
        match self.inner {
            Inner::Open { local, .. } => {
                // The local side will continue to send data.
                tracing::trace!("recv_close: Open => HalfClosedRemote({:?})", local);
                self.inner = Inner::HalfClosedRemote(local);
                Ok(())
            }
            Inner::HalfClosedLocal(..) => {
                tracing::trace!("recv_close: HalfClosedLocal => Closed");
                self.inner = Inner::Closed(Cause::EndStream);
                Ok(())
            }
            ref state => {
                proto_err!(conn: "recv_close: in unexpected state {:?}", state);
                Err(Error::library_go_away(Reason::PROTOCOL_ERROR))
            }
        }
    }

    /// The remote explicitly sent a RST_STREAM.
    pub fn recv_reset(&mut self, frame: &frame::Reset) {
        match self.inner {
            Inner::Closed(..) => {}
            ref state => {
                tracing::trace!("recv_reset; frame={:?}; state={:?}", frame, state);
                self.inner = Inner::Closed(Cause::Error(Error::remote_reset(
                    frame.stream_id(),
                    frame.reason(),
                )));
            }
        }
    }

    /// Handle a connection-level error; every open stream moves to Closed.
    pub fn handle_error(&mut self, err: &Error) {
        match self.inner {
            Inner::Closed(..) => {}
            _ => {
                tracing::trace!("handle_error; err={:?}", err);
                self.inner = Inner::Closed(Cause::Error(err.clone()));
            }
        }
    }

    pub fn recv_eof(&mut self) {
        match self.inner {
            Inner::Closed(..) => {}
            ref state => {
                tracing::trace!("recv_eof; state={:?}", state);
                self.inner = Inner::Closed(Cause::Error(
                    io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "stream closed because of a broken pipe",
                    )
                    .into(),
                ));
            }
        }
    }

    /// Indicates that the local side will not send more data to the remote.
    pub fn send_close(&mut self) {
        match self.inner {
            Inner::Open { remote, .. } => {
                // The remote side will continue to send data.
                tracing::trace!("send_close: Open => HalfClosedLocal({:?})", remote);
                self.inner = Inner::HalfClosedLocal(remote);
            }
            Inner::HalfClosedRemote(..) => {
                tracing::trace!("send_close: HalfClosedRemote => Closed");
                self.inner = Inner::Closed(Cause::EndStream);
            }
            ref state => unreachable!("send_close: unexpected state {:?}", state),
        }
    }

    /// Set the stream state to reset locally.
    pub fn set_reset(&mut self, stream_id: StreamId, reason: Reason, initiator: Initiator) {
        self.inner = Inner::Closed(Cause::Error(Error::Reset(stream_id, reason, initiator)));
    }

    /// Returns true when the stream is in a state to receive its first
    /// (non-trailer) HEADERS.
    pub fn is_recv_headers(&self) -> bool {
        matches!(
            self.inner,
            Inner::Open {
                remote: Peer::AwaitingHeaders,
                ..
            } | Inner::HalfClosedLocal(Peer::AwaitingHeaders)
        )
    }

    pub fn is_recv_streaming(&self) -> bool {
        matches!(
            self.inner,
            Inner::Open {
                remote: Peer::Streaming,
                ..
            } | Inner::HalfClosedLocal(Peer::Streaming)
        )
    }

    pub fn is_send_streaming(&self) -> bool {
        matches!(
            self.inner,
            Inner::Open {
                local: Peer::Streaming,
                ..
            } | Inner::HalfClosedRemote(Peer::Streaming)
        )
    }

    /// Whether the remote half is already closed (END_STREAM seen or the
    /// stream is fully closed).
    pub fn is_recv_closed(&self) -> bool {
        matches!(
            self.inner,
            Inner::Closed(..) | Inner::HalfClosedRemote(..)
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.inner, Inner::Closed(_))
    }

    /// Whether the stream was closed by a RST_STREAM or an error, rather
    /// than a clean END_STREAM exchange.
    pub fn is_reset(&self) -> bool {
        match self.inner {
            Inner::Closed(Cause::EndStream) => false,
            Inner::Closed(_) => true,
            _ => false,
        }
    }

    /// The error that closed this stream, if any.
    #[cfg(test)]
    pub fn error(&self) -> Option<&Error> {
        match self.inner {
            Inner::Closed(Cause::Error(ref e)) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Head, Headers, Kind};
    use bytes::BytesMut;

    fn response_headers(stream_id: u32, eos: bool) -> Headers {
        let flags = if eos { 0x4 | 0x1 } else { 0x4 };
        let head = Head::new(Kind::Headers, flags, StreamId::from(stream_id));
        let (headers, _) = Headers::load(head, BytesMut::new()).unwrap();
        headers
    }

    #[test]
    fn request_response_lifecycle() {
        let mut state = State::default();

        state.send_open(true);
        assert!(state.is_recv_headers());
        assert!(!state.is_send_streaming());

        state.recv_open(&response_headers(1, false)).unwrap();
        assert!(state.is_recv_streaming());

        state.recv_close().unwrap();
        assert!(state.is_closed());
        assert!(!state.is_reset());
    }

    #[test]
    fn headers_on_closed_stream_is_a_connection_error() {
        let mut state = State::default();
        state.send_open(true);
        state.recv_open(&response_headers(1, true)).unwrap();
        assert!(state.is_closed());

        let err = state.recv_open(&response_headers(1, true)).unwrap_err();
        assert!(matches!(
            err,
            Error::GoAway(_, Reason::PROTOCOL_ERROR, Initiator::Library)
        ));
    }

    #[test]
    fn remote_reset_records_the_cause() {
        let mut state = State::default();
        state.send_open(false);
        state.recv_reset(&frame::Reset::new(StreamId::from(1), Reason::CANCEL));

        assert!(state.is_closed());
        assert!(state.is_reset());
        assert!(matches!(
            state.error(),
            Some(&Error::Reset(_, Reason::CANCEL, Initiator::Remote))
        ));
    }
}
