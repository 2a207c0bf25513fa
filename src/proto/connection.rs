use crate::codec::{Codec, ContinuationLimits};
use crate::frame::{self, Frame, Reason, StreamId};
use crate::proto::go_away::GoAway;
use crate::proto::ping_pong::PingPong;
use crate::proto::settings::Settings;
use crate::proto::streams::{Config as StreamsConfig, Streams};
use crate::proto::{Error, Initiator};

use bytes::Bytes;
use futures_core::Stream as _;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Sleep;

use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

/// If the peer fails to ACK our initial SETTINGS within this window, the
/// connection dies with SETTINGS_TIMEOUT.
const SETTINGS_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// An H2 client connection: owns the codec and drives the frame-level
/// state machines.
#[derive(Debug)]
pub(crate) struct Connection<T> {
    codec: Codec<T>,

    go_away: GoAway,
    ping_pong: PingPong,
    settings: Settings,
    streams: Streams,

    state: State,

    /// The error to surface once the close sequence finishes.
    error: Option<Error>,

    /// Armed until the initial SETTINGS exchange completes.
    settings_timer: Option<Pin<Box<Sleep>>>,
}

#[derive(Debug)]
enum State {
    /// Currently open in a sane state
    Open,

    /// The codec must be flushed and shut down, then the error (if any)
    /// surfaced.
    Closing(Reason, Initiator),

    /// In an errored state (or fully closed).
    Closed(Reason, Initiator),
}

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub local_settings: frame::Settings,
    pub continuation_limits: ContinuationLimits,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Builds a connection around a codec that has already written the
    /// preface and buffered the initial local SETTINGS.
    pub fn new(mut codec: Codec<T>, config: Config) -> Connection<T> {
        codec.set_continuation_limits(config.continuation_limits);

        Connection {
            codec,
            go_away: GoAway::new(),
            ping_pong: PingPong::new(),
            settings: Settings::new(config.local_settings.clone()),
            streams: Streams::new(StreamsConfig {
                local_settings: config.local_settings,
            }),
            state: State::Open,
            error: None,
            settings_timer: Some(Box::pin(tokio::time::sleep(SETTINGS_ACK_TIMEOUT))),
        }
    }

    /// A handle onto the stream registry, for request handles.
    pub fn streams(&self) -> Streams {
        self.streams.clone()
    }

    /// Drive the connection.
    ///
    /// Resolves once the peer closed the transport, a GOAWAY exchange
    /// finished, or a fatal error occurred.
    pub fn poll(&mut self, cx: &mut Context) -> Poll<Result<(), Error>> {
        // Request handles wake this task through the registry.
        self.streams.register_conn_waker(cx);

        loop {
            match self.state {
                State::Open => {
                    let result = match self.poll2(cx) {
                        Poll::Ready(result) => result,
                        Poll::Pending => {
                            // Push buffered frames toward the transport
                            // before parking.
                            if let Poll::Ready(Err(e)) = self.codec.flush(cx) {
                                self.handle_error(Error::from(e));
                                continue;
                            }
                            return Poll::Pending;
                        }
                    };

                    match result {
                        Ok(()) => {
                            self.state = State::Closing(Reason::NO_ERROR, Initiator::Library);
                        }
                        Err(e) => {
                            self.handle_error(e);
                        }
                    }
                }
                State::Closing(reason, initiator) => {
                    // Write any queued GOAWAY, drain the buffer, then close
                    // the transport.
                    if let Poll::Ready(Err(e)) =
                        self.go_away.send_pending_go_away(cx, &mut self.codec)
                    {
                        self.state = closed_from(e);
                        continue;
                    }

                    match ready!(self.codec.shutdown(cx)) {
                        Ok(()) => {}
                        Err(e) => {
                            tracing::debug!("error shutting down transport; err={}", e);
                        }
                    }

                    tracing::trace!("connection closing after flush");
                    self.state = State::Closed(reason, initiator);
                }
                State::Closed(reason, initiator) => {
                    return Poll::Ready(match self.error.take() {
                        Some(e) => Err(e),
                        None => take_error(reason, initiator),
                    });
                }
            }
        }
    }

    fn poll2(&mut self, cx: &mut Context) -> Poll<Result<(), Error>> {
        loop {
            // A graceful shutdown requested through a handle.
            if self.streams.take_user_close() {
                tracing::debug!("graceful shutdown requested");
                self.go_away
                    .go_away_now(frame::GoAway::new(StreamId::zero(), Reason::NO_ERROR));
            }

            self.poll_settings_timer(cx)?;

            // Write side, highest priority first: the ACK must precede any
            // frame depending on the new settings.
            ready!(self.settings.poll_send(cx, &mut self.codec, &self.streams))?;
            ready!(self.go_away.send_pending_go_away(cx, &mut self.codec))?;
            ready!(self.ping_pong.poll_send(cx, &mut self.codec, &self.streams))?;
            ready!(self.streams.poll_send_frames(cx, &mut self.codec))?;

            // A draining connection (local or remote GOAWAY) finishes once
            // nothing remains in flight.
            if self.streams.is_drained() {
                ready!(self.codec.flush(cx)).map_err(Error::from)?;
                if self.codec.is_write_empty() {
                    tracing::debug!("connection drained");
                    return Poll::Ready(Ok(()));
                }
            }

            match Pin::new(&mut self.codec).poll_next(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    self.dispatch(frame)?;
                }
                Poll::Ready(Some(Err(Error::Reset(id, reason, Initiator::Library)))) => {
                    // A stream-scoped protocol violation; the rest of the
                    // connection continues.
                    tracing::debug!("stream error; id={:?} reason={:?}", id, reason);
                    self.streams.send_reset(id, reason);
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Err(e));
                }
                Poll::Ready(None) => {
                    tracing::trace!("codec closed");
                    self.streams.recv_eof();
                    return Poll::Ready(Ok(()));
                }
                Poll::Pending => {
                    ready!(self.codec.flush(cx)).map_err(Error::from)?;
                    return Poll::Pending;
                }
            }
        }
    }

    fn dispatch(&mut self, frame: Frame) -> Result<(), Error> {
        match frame {
            Frame::Headers(frame) => {
                self.streams.recv_headers(frame)?;
            }
            Frame::Data(frame) => {
                self.streams.recv_data(frame)?;
            }
            Frame::Reset(frame) => {
                self.streams.recv_reset(frame)?;
            }
            Frame::WindowUpdate(frame) => {
                self.streams.recv_window_update(frame)?;
            }
            Frame::Settings(frame) => {
                self.settings
                    .recv_settings(frame, &mut self.codec, &self.streams)?;
            }
            Frame::Ping(frame) => {
                self.ping_pong.recv_ping(frame);
            }
            Frame::GoAway(frame) => {
                tracing::debug!("recv GOAWAY; frame={:?}", frame);
                self.streams.recv_go_away(&frame);

                if frame.reason() != Reason::NO_ERROR {
                    return Err(Error::remote_go_away(
                        frame.debug_data().clone(),
                        frame.reason(),
                    ));
                }
            }
            Frame::Priority(frame) => {
                // Parsed for validity; the client does not act on peer
                // priorities.
                tracing::trace!("ignoring PRIORITY; frame={:?}", frame);
            }
        }

        Ok(())
    }

    fn poll_settings_timer(&mut self, cx: &mut Context) -> Result<(), Error> {
        if self.settings.is_synced() {
            self.settings_timer = None;
            return Ok(());
        }

        if let Some(timer) = &mut self.settings_timer {
            if timer.as_mut().poll(cx).is_ready() {
                proto_err!(conn: "initial SETTINGS not acknowledged in time");
                return Err(Error::library_go_away(Reason::SETTINGS_TIMEOUT));
            }
        }

        Ok(())
    }

    /// React to a fatal connection error: fail every stream, queue the
    /// GOAWAY if we originated the failure, and move to the closing state.
    fn handle_error(&mut self, err: Error) {
        match err {
            Error::GoAway(debug_data, reason, initiator) => {
                let e = Error::GoAway(debug_data.clone(), reason, initiator);
                self.streams.handle_conn_error(&e);
                self.error = Some(e);

                if initiator != Initiator::Remote {
                    // The peer must learn why the connection dies.
                    self.go_away.go_away_now(frame::GoAway::with_debug_data(
                        StreamId::zero(),
                        reason,
                        debug_data,
                    ));
                }

                self.state = State::Closing(reason, initiator);
            }
            Error::Reset(..) => {
                // Stream errors are handled in poll2.
                unreachable!("stream error escalated to the connection");
            }
            e @ Error::Io(..) => {
                self.streams.handle_conn_error(&e);
                self.error = Some(e);
                self.state = State::Closed(Reason::INTERNAL_ERROR, Initiator::Library);
            }
        }
    }
}

fn closed_from(err: Error) -> State {
    match err {
        Error::GoAway(_, reason, initiator) | Error::Reset(_, reason, initiator) => {
            State::Closed(reason, initiator)
        }
        Error::Io(..) => State::Closed(Reason::INTERNAL_ERROR, Initiator::Library),
    }
}

fn take_error(reason: Reason, initiator: Initiator) -> Result<(), Error> {
    if reason == Reason::NO_ERROR {
        Ok(())
    } else {
        Err(Error::GoAway(Bytes::new(), reason, initiator))
    }
}
