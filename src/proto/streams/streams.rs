use super::flow_control::FlowControl;
use super::store::Store;
use super::stream::Stream;
use crate::codec::{Codec, SendError, UserError};
use crate::frame::{self, Frame, Pseudo, Reason, StreamId};
use crate::proto::{Error, Initiator, DEFAULT_INITIAL_WINDOW_SIZE};

use atomic_waker::AtomicWaker;
use bytes::Bytes;
use http::{HeaderMap, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use std::cmp;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};
use std::time::Duration;

/// The stream registry: shared between the connection task and every
/// request handle.
///
/// All mutations run under one mutex; the connection is woken through the
/// paired `AtomicWaker` whenever a handle queues work.
#[derive(Clone, Debug)]
pub(crate) struct Streams {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    registry: Mutex<Registry>,
    conn_waker: AtomicWaker,
}

#[derive(Debug)]
pub(crate) struct Config {
    /// The settings advertised in the handshake.
    pub local_settings: frame::Settings,
}

#[derive(Debug)]
struct Registry {
    /// Our advertised INITIAL_WINDOW_SIZE; applies to new stream receive
    /// windows.
    local_init_window: u32,

    /// Maximum header list size we enforce (informational here; the codec
    /// enforces it during decode).
    #[allow(dead_code)]
    local_max_header_list: Option<u32>,

    /// Peer view, updated by its SETTINGS frames.
    remote_init_window: u32,
    remote_max_frame_size: u32,
    remote_max_streams: Option<u32>,

    /// True once the peer's first SETTINGS frame has been ACKed. Requests
    /// queue before this point but are not transmitted.
    established: bool,

    /// Connection-scoped flow control.
    send_flow: FlowControl,
    recv_flow: FlowControl,
    recv_window_target: u32,
    recv_unclaimed: u32,

    /// Live streams.
    store: Store,

    /// The next stream ID to allocate. `None` when the space is exhausted.
    next_stream_id: Option<StreamId>,

    /// GOAWAY received from the peer: (last processed id, reason).
    go_away_remote: Option<(StreamId, Reason)>,

    /// The user asked for a graceful shutdown.
    user_close: bool,
    user_close_observed: bool,

    /// A fatal connection error; every subsequent operation fails with it.
    conn_error: Option<Error>,

    /// Frames awaiting the writer, in emission order. HEADERS enter this
    /// queue under the allocation lock, which is what guarantees stream
    /// ids hit the wire in ascending order.
    pending_control: VecDeque<Frame>,

    /// User pings not yet transmitted.
    pending_pings: VecDeque<oneshot::Sender<Duration>>,
}

impl Streams {
    pub fn new(config: Config) -> Self {
        let local_init_window = config
            .local_settings
            .initial_window_size()
            .unwrap_or(DEFAULT_INITIAL_WINDOW_SIZE);

        Streams {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    local_init_window,
                    local_max_header_list: config.local_settings.max_header_list_size(),
                    remote_init_window: DEFAULT_INITIAL_WINDOW_SIZE,
                    remote_max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
                    remote_max_streams: None,
                    established: false,
                    send_flow: FlowControl::new(DEFAULT_INITIAL_WINDOW_SIZE),
                    recv_flow: FlowControl::new(DEFAULT_INITIAL_WINDOW_SIZE),
                    recv_window_target: cmp::max(local_init_window, DEFAULT_INITIAL_WINDOW_SIZE),
                    recv_unclaimed: 0,
                    store: Store::new(),
                    next_stream_id: Some(StreamId::from(1)),
                    go_away_remote: None,
                    user_close: false,
                    user_close_observed: false,
                    conn_error: None,
                    pending_control: VecDeque::new(),
                    pending_pings: VecDeque::new(),
                }),
                conn_waker: AtomicWaker::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wake_connection(&self) {
        self.inner.conn_waker.wake();
    }

    // ===== Handle-facing API =====

    /// Open a new stream carrying `pseudo` + `fields`, with `body` queued
    /// for transmission. Returns the allocated id and the response
    /// completion channel.
    pub fn send_request(
        &self,
        pseudo: Pseudo,
        fields: HeaderMap,
        body: Bytes,
    ) -> Result<(StreamId, oneshot::Receiver<Result<Response<Bytes>, Error>>), SendError> {
        let mut me = self.lock();

        if let Some(ref err) = me.conn_error {
            return Err(SendError::Connection(err.clone()));
        }

        if me.go_away_remote.is_some() || me.user_close {
            return Err(UserError::Rejected.into());
        }

        if let Some(max) = me.remote_max_streams {
            if me.store.len() >= max as usize {
                return Err(UserError::StreamLimitReached.into());
            }
        }

        let stream_id = match me.next_stream_id {
            Some(id) => id,
            None => return Err(UserError::OverflowedStreamId.into()),
        };
        me.next_stream_id = stream_id.next_id().ok();

        let eos = body.is_empty();

        let mut frame = frame::Headers::new(stream_id, pseudo, fields);
        if eos {
            frame.set_end_stream();
        }

        tracing::trace!(
            "send_request; id={:?} eos={} body={}B",
            stream_id,
            eos,
            body.len()
        );

        let (tx, rx) = oneshot::channel();

        let send_window = me.remote_init_window;
        let recv_window = me.local_init_window;
        let stream = me.store.insert(stream_id, Stream::new(stream_id, send_window, recv_window));
        stream.state.send_open(eos);
        stream.pending_send = body;
        stream.pending_send_eos = !eos;
        stream.responder = Some(tx);

        me.pending_control.push_back(frame.into());

        drop(me);
        self.wake_connection();

        Ok((stream_id, rx))
    }

    /// Measure the connection round-trip time with a PING.
    pub fn ping(&self) -> Result<oneshot::Receiver<Duration>, SendError> {
        let mut me = self.lock();

        if let Some(ref err) = me.conn_error {
            return Err(SendError::Connection(err.clone()));
        }

        let (tx, rx) = oneshot::channel();
        me.pending_pings.push_back(tx);

        drop(me);
        self.wake_connection();

        Ok(rx)
    }

    /// Cancel a stream: RST_STREAM(CANCEL) is sent and all per-stream
    /// resources are released.
    pub fn cancel_stream(&self, id: StreamId) {
        let mut me = self.lock();

        if me.conn_error.is_some() {
            return;
        }

        if me.store.contains(id) {
            tracing::debug!("canceling stream; id={:?}", id);
            me.queue_reset(id, Reason::CANCEL, Initiator::User);
            drop(me);
            self.wake_connection();
        }
    }

    /// Begin a graceful shutdown: GOAWAY(NO_ERROR) once, then drain.
    pub fn graceful_close(&self) {
        let mut me = self.lock();
        me.user_close = true;
        drop(me);
        self.wake_connection();
    }

    /// Number of streams that have not fully closed yet.
    pub fn active_streams(&self) -> usize {
        self.lock().store.len()
    }

    /// Whether the connection can take another request right now.
    pub fn is_ready(&self) -> bool {
        let me = self.lock();

        if me.conn_error.is_some() || me.go_away_remote.is_some() || me.user_close {
            return false;
        }
        if me.next_stream_id.is_none() {
            return false;
        }
        match me.remote_max_streams {
            Some(max) => me.store.len() < max as usize,
            None => true,
        }
    }

    // ===== Connection-facing API =====

    pub fn register_conn_waker(&self, cx: &mut Context) {
        self.inner.conn_waker.register(cx.waker());
    }

    pub fn take_user_ping(&self) -> Option<oneshot::Sender<Duration>> {
        self.lock().pending_pings.pop_front()
    }

    /// True exactly once after `graceful_close` was requested.
    pub fn take_user_close(&self) -> bool {
        let mut me = self.lock();
        if me.user_close && !me.user_close_observed {
            me.user_close_observed = true;
            return true;
        }
        false
    }

    /// Whether the connection has drained and may finish after a graceful
    /// close.
    pub fn is_drained(&self) -> bool {
        let me = self.lock();
        (me.user_close || me.go_away_remote.is_some())
            && me.store.is_empty()
            && me.pending_control.is_empty()
    }

    /// Write queued control frames and eligible DATA to the codec.
    pub fn poll_send_frames<T>(
        &self,
        cx: &mut Context,
        codec: &mut Codec<T>,
    ) -> Poll<Result<(), Error>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut me = self.lock();
        let me = &mut *me;

        if !me.established {
            return Poll::Ready(Ok(()));
        }

        // Control frames first; their relative order is the emission order.
        while !me.pending_control.is_empty() {
            ready!(codec.poll_ready(cx)).map_err(Error::from)?;

            let frame = me.pending_control.pop_front().expect("checked non-empty");
            codec.buffer(frame).map_err(|e| {
                // Frames are pre-validated; the codec cannot reject them.
                tracing::error!("unexpected codec rejection; err={}", e);
                Error::library_go_away(Reason::INTERNAL_ERROR)
            })?;
        }

        // Then stream data, as far as both windows allow.
        for id in me.store.ids() {
            loop {
                let conn_available = me.send_flow.available();
                let max_frame = me.remote_max_frame_size;

                let stream = match me.store.find_mut(id) {
                    Some(stream) => stream,
                    None => break,
                };

                if !stream.has_pending_send() || !stream.state.is_send_streaming() {
                    break;
                }

                let len = cmp::min(
                    stream.pending_send.len() as u32,
                    cmp::min(stream.send_flow.available(), cmp::min(conn_available, max_frame)),
                );

                if len == 0 {
                    // Blocked on a window; other streams may still proceed.
                    break;
                }

                ready!(codec.poll_ready(cx)).map_err(Error::from)?;

                let chunk = stream.pending_send.split_to(len as usize);
                let drained = stream.pending_send.is_empty();

                let mut data = frame::Data::new(id, chunk);
                if drained && stream.pending_send_eos {
                    data.set_end_stream(true);
                    stream.pending_send_eos = false;
                    stream.state.send_close();
                }

                stream.send_flow.send_data(len);
                me.send_flow.send_data(len);

                codec.buffer(data.into()).map_err(|e| {
                    tracing::error!("unexpected codec rejection; err={}", e);
                    Error::library_go_away(Reason::INTERNAL_ERROR)
                })?;

                if drained {
                    me.release_if_closed(id);
                    break;
                }
            }
        }

        Poll::Ready(Ok(()))
    }

    /// A stream-scoped error detected outside the registry (codec level).
    pub fn send_reset(&self, id: StreamId, reason: Reason) {
        let mut me = self.lock();
        me.queue_reset(id, reason, Initiator::Library);
        drop(me);
        self.wake_connection();
    }

    pub fn recv_headers(&self, frame: frame::Headers) -> Result<(), Error> {
        let mut me = self.lock();
        me.recv_headers(frame)
    }

    pub fn recv_data(&self, frame: frame::Data) -> Result<(), Error> {
        let mut me = self.lock();
        me.recv_data(frame)
    }

    pub fn recv_reset(&self, frame: frame::Reset) -> Result<(), Error> {
        let mut me = self.lock();
        me.recv_reset(frame)
    }

    pub fn recv_window_update(&self, frame: frame::WindowUpdate) -> Result<(), Error> {
        let mut me = self.lock();
        me.recv_window_update(frame)
    }

    pub fn recv_go_away(&self, frame: &frame::GoAway) {
        let mut me = self.lock();
        me.recv_go_away(frame);
    }

    pub fn recv_eof(&self) {
        let mut me = self.lock();
        me.fail_all(Error::Io(
            std::io::ErrorKind::UnexpectedEof,
            Some("connection closed before message completed".to_string()),
        ));
    }

    /// Fail every open stream with a fatal connection error.
    pub fn handle_conn_error(&self, err: &Error) {
        let mut me = self.lock();
        me.fail_all(err.clone());
    }

    pub fn apply_remote_settings(
        &self,
        settings: &frame::Settings,
        is_initial: bool,
    ) -> Result<(), Error> {
        let mut me = self.lock();
        me.apply_remote_settings(settings, is_initial)
    }

    pub fn apply_local_settings(&self, settings: &frame::Settings) -> Result<(), Error> {
        let mut me = self.lock();
        me.apply_local_settings(settings)
    }
}

// ===== impl Registry =====

impl Registry {
    fn recv_headers(&mut self, frame: frame::Headers) -> Result<(), Error> {
        let id = frame.stream_id();

        if id.is_server_initiated() {
            // With push disabled the peer can never legally initiate a
            // stream.
            proto_err!(conn: "received HEADERS on server-initiated id={:?}", id);
            return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
        }

        if self.is_idle(id) {
            proto_err!(conn: "received HEADERS on idle stream id={:?}", id);
            return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
        }

        if !self.store.contains(id) {
            // Closed, most likely after a local reset; late frames are
            // discarded.
            tracing::trace!("dropping HEADERS for closed stream; id={:?}", id);
            return Ok(());
        }

        let eos = frame.is_end_stream();

        if frame.is_trailers() {
            let stream = self.store.find_mut(id).expect("stream checked above");

            if !stream.state.is_recv_streaming() {
                // Either a pseudo-less header block where a response was
                // expected (malformed message, RFC 9113 § 8.1.1) or
                // trailers after END_STREAM.
                let reason = if stream.state.is_recv_closed() {
                    Reason::STREAM_CLOSED
                } else {
                    Reason::PROTOCOL_ERROR
                };
                proto_err!(stream: "unexpected pseudo-less header block; id={:?}", id);
                self.queue_reset(id, reason, Initiator::Library);
                return Ok(());
            }

            if !eos {
                // Trailers must end the stream (RFC 9113 § 8.1).
                self.queue_reset(id, Reason::PROTOCOL_ERROR, Initiator::Library);
                return Ok(());
            }

            let (_, fields) = frame.into_parts();
            let stream = self.store.find_mut(id).expect("stream checked above");
            stream.response.trailers = Some(fields);
            stream.state.recv_close()?;
            stream.complete();
            self.release_if_closed(id);
            return Ok(());
        }

        {
            let stream = self.store.find_mut(id).expect("stream checked above");
            if !stream.state.is_recv_headers() {
                let reason = if stream.state.is_recv_closed() {
                    // Frames after END_STREAM are a stream error of type
                    // STREAM_CLOSED (RFC 7540 § 5.1).
                    Reason::STREAM_CLOSED
                } else {
                    // Pseudo fields repeated mid-stream: malformed message.
                    Reason::PROTOCOL_ERROR
                };
                self.queue_reset(id, reason, Initiator::Library);
                return Ok(());
            }
        }

        let is_informational = frame.is_informational();

        if is_informational && eos {
            self.queue_reset(id, Reason::PROTOCOL_ERROR, Initiator::Library);
            return Ok(());
        }

        match frame.status() {
            Some(status) if status.as_u16() < 600 => {}
            _ if is_informational => {}
            _ => {
                // A response must open with a :status in 100..=599.
                self.queue_reset(id, Reason::PROTOCOL_ERROR, Initiator::Library);
                return Ok(());
            }
        }

        let stream = self.store.find_mut(id).expect("stream checked above");
        stream.state.recv_open(&frame)?;

        if is_informational {
            tracing::trace!("discarding interim response; id={:?}", id);
            return Ok(());
        }

        let (pseudo, fields) = frame.into_parts();
        let stream = self.store.find_mut(id).expect("stream checked above");
        stream.response.status = pseudo.status;
        stream.response.headers = fields;

        if stream.state.is_recv_closed() {
            stream.complete();
            self.release_if_closed(id);
        }

        Ok(())
    }

    fn recv_data(&mut self, frame: frame::Data) -> Result<(), Error> {
        let id = frame.stream_id();
        let sz = frame.payload().len() as u32;

        // The connection window is charged for every DATA frame, stream
        // known or not; the bytes were transmitted either way.
        if let Err(reason) = self.recv_flow.recv_data(sz) {
            proto_err!(conn: "connection flow-control overrun; sz={}", sz);
            return Err(Error::library_go_away(reason));
        }
        self.recv_unclaimed += sz;

        // Connection refill is queued before any stream refill so that one
        // saturated stream cannot starve the connection window.
        if (self.recv_flow.window_size() as i64) < i64::from(self.recv_window_target) / 2 {
            let increment = self.recv_unclaimed;
            self.recv_flow
                .inc_window(increment)
                .map_err(Error::library_go_away)?;
            self.recv_unclaimed = 0;
            self.pending_control
                .push_back(frame::WindowUpdate::new(StreamId::zero(), increment).into());
        }

        if self.is_idle(id) || id.is_server_initiated() {
            proto_err!(conn: "received DATA on idle stream; id={:?}", id);
            return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
        }

        let stream = match self.store.find_mut(id) {
            Some(stream) => stream,
            None => {
                tracing::trace!("dropping DATA for closed stream; id={:?}", id);
                return Ok(());
            }
        };

        if !stream.state.is_recv_streaming() {
            // Receiving DATA on a half-closed(remote) stream is a stream
            // error of type STREAM_CLOSED (RFC 7540 § 5.1).
            let reason = if stream.state.is_recv_closed() {
                Reason::STREAM_CLOSED
            } else {
                Reason::PROTOCOL_ERROR
            };
            self.queue_reset(id, reason, Initiator::Library);
            return Ok(());
        }

        match stream.recv_data(sz) {
            Ok(Some(increment)) => {
                self.pending_control
                    .push_back(frame::WindowUpdate::new(id, increment).into());
            }
            Ok(None) => {}
            Err(reason) => {
                self.queue_reset(id, reason, Initiator::Library);
                return Ok(());
            }
        }

        let eos = frame.is_end_stream();
        let stream = self.store.find_mut(id).expect("stream checked above");
        stream.response.body.extend_from_slice(frame.payload());

        if eos {
            stream.state.recv_close()?;
            stream.complete();
            self.release_if_closed(id);
        }

        Ok(())
    }

    fn recv_reset(&mut self, frame: frame::Reset) -> Result<(), Error> {
        let id = frame.stream_id();

        if self.is_idle(id) || id.is_server_initiated() {
            proto_err!(conn: "received RST_STREAM on idle stream; id={:?}", id);
            return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
        }

        if let Some(stream) = self.store.find_mut(id) {
            tracing::debug!("recv RST_STREAM; id={:?} reason={:?}", id, frame.reason());

            stream.state.recv_reset(&frame);
            stream.pending_send = Bytes::new();
            stream.pending_send_eos = false;
            stream.fail(Error::remote_reset(id, frame.reason()));
            self.release_if_closed(id);
        }

        Ok(())
    }

    fn recv_window_update(&mut self, frame: frame::WindowUpdate) -> Result<(), Error> {
        let id = frame.stream_id();
        let increment = frame.size_increment();

        if id.is_zero() {
            if increment == 0 {
                // A connection-scoped WINDOW_UPDATE with a zero increment
                // is a connection error.
                proto_err!(conn: "connection WINDOW_UPDATE with zero increment");
                return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
            }

            self.send_flow
                .inc_window(increment)
                .map_err(Error::library_go_away)?;

            return Ok(());
        }

        if self.is_idle(id) || id.is_server_initiated() {
            proto_err!(conn: "received WINDOW_UPDATE on idle stream; id={:?}", id);
            return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
        }

        if !self.store.contains(id) {
            tracing::trace!("dropping WINDOW_UPDATE for closed stream; id={:?}", id);
            return Ok(());
        }

        if increment == 0 {
            // Stream-scoped zero increments reset the stream only.
            self.queue_reset(id, Reason::PROTOCOL_ERROR, Initiator::Library);
            return Ok(());
        }

        let stream = self.store.find_mut(id).expect("stream checked above");
        if let Err(reason) = stream.send_flow.inc_window(increment) {
            self.queue_reset(id, reason, Initiator::Library);
        }

        Ok(())
    }

    fn recv_go_away(&mut self, frame: &frame::GoAway) {
        let last_id = frame.last_stream_id();

        tracing::debug!(
            "recv GOAWAY; last_stream_id={:?} reason={:?}",
            last_id,
            frame.reason()
        );

        self.go_away_remote = Some((last_id, frame.reason()));

        // Streams the peer will not process are refused; the caller may
        // safely retry them elsewhere.
        let refused = self.store.drain_filter(|s| s.id > last_id);
        for mut stream in refused {
            stream.fail(Error::Reset(
                stream.id,
                Reason::REFUSED_STREAM,
                Initiator::Remote,
            ));
        }
    }

    fn apply_remote_settings(
        &mut self,
        settings: &frame::Settings,
        is_initial: bool,
    ) -> Result<(), Error> {
        if let Some(val) = settings.max_frame_size() {
            self.remote_max_frame_size = val;
        }

        if let Some(val) = settings.max_concurrent_streams() {
            self.remote_max_streams = Some(val);
        }

        if let Some(val) = settings.initial_window_size() {
            let delta = val as i64 - i64::from(self.remote_init_window);

            let mut failure = None;
            self.store.for_each(|stream| {
                if failure.is_none() && !stream.state.is_closed() {
                    if let Err(reason) = stream.send_flow.adjust_initial(delta as i32) {
                        failure = Some(reason);
                    }
                }
            });

            if let Some(reason) = failure {
                proto_err!(conn: "INITIAL_WINDOW_SIZE adjustment overflows a stream window");
                return Err(Error::library_go_away(reason));
            }

            self.remote_init_window = val;
        }

        if is_initial {
            self.established = true;

            // Raise the connection receive window to the configured target.
            let delta = self.recv_window_target.saturating_sub(DEFAULT_INITIAL_WINDOW_SIZE);
            if delta > 0 {
                self.recv_flow
                    .inc_window(delta)
                    .map_err(Error::library_go_away)?;
                self.pending_control
                    .push_back(frame::WindowUpdate::new(StreamId::zero(), delta).into());
            }
        }

        Ok(())
    }

    fn apply_local_settings(&mut self, settings: &frame::Settings) -> Result<(), Error> {
        if let Some(val) = settings.initial_window_size() {
            let delta = val as i64 - i64::from(self.local_init_window);

            let mut failure = None;
            self.store.for_each(|stream| {
                stream.recv_window_init = val;
                if failure.is_none() && !stream.state.is_closed() {
                    if let Err(reason) = stream.recv_flow.adjust_initial(delta as i32) {
                        failure = Some(reason);
                    }
                }
            });

            if let Some(reason) = failure {
                return Err(Error::library_go_away(reason));
            }

            self.local_init_window = val;
        }

        Ok(())
    }

    /// Queue an RST_STREAM and tear the stream down.
    fn queue_reset(&mut self, id: StreamId, reason: Reason, initiator: Initiator) {
        if let Some(stream) = self.store.find_mut(id) {
            if stream.state.is_closed() {
                return;
            }

            stream.state.set_reset(id, reason, initiator);
            stream.pending_send = Bytes::new();
            stream.pending_send_eos = false;
            stream.fail(Error::Reset(id, reason, initiator));
        } else {
            return;
        }

        self.pending_control
            .push_back(frame::Reset::new(id, reason).into());

        self.release_if_closed(id);
    }

    /// Drop the stream record once both halves are done with it; this is
    /// what releases the flow-control state.
    fn release_if_closed(&mut self, id: StreamId) {
        let done = self
            .store
            .find_mut(id)
            .map(|s| s.state.is_closed() && s.responder.is_none() && !s.has_pending_send())
            .unwrap_or(false);

        if done {
            tracing::trace!("releasing stream; id={:?}", id);
            self.store.remove(id);
        }
    }

    fn fail_all(&mut self, err: Error) {
        tracing::debug!("failing all streams; err={}", err);

        self.conn_error = Some(err.clone());
        self.pending_control.clear();

        let streams = self.store.drain_filter(|_| true);
        for mut stream in streams {
            stream.state.handle_error(&err);
            stream.fail(err.clone());
        }

        while let Some(ping) = self.pending_pings.pop_front() {
            drop(ping);
        }
    }

    /// A stream is idle if it sits above everything we have allocated.
    fn is_idle(&self, id: StreamId) -> bool {
        match self.next_stream_id {
            Some(next) => id >= next,
            None => false,
        }
    }
}
