use super::flow_control::FlowControl;
use super::state::State;
use crate::frame::StreamId;
use crate::proto::Error;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode, Version};
use tokio::sync::oneshot;

/// Trailer fields of a response, surfaced through the response extensions.
#[derive(Debug, Clone)]
pub struct Trailers(pub HeaderMap);

/// Per-stream record: state machine, both flow-control windows, the queued
/// request body and the response being assembled.
#[derive(Debug)]
pub(super) struct Stream {
    pub id: StreamId,

    pub state: State,

    /// How much more the peer will accept from us.
    pub send_flow: FlowControl,

    /// How much more we accept from the peer.
    pub recv_flow: FlowControl,

    /// Initial value of the receive window, for the refill threshold.
    pub recv_window_init: u32,

    /// Bytes consumed since the last WINDOW_UPDATE we sent for this stream.
    pub recv_unclaimed: u32,

    /// Request body bytes not yet written to the connection.
    pub pending_send: Bytes,

    /// Whether the final pending byte carries END_STREAM.
    pub pending_send_eos: bool,

    /// Response assembly; completed over one or more frames and handed to
    /// the caller as a single owned value.
    pub response: ResponseAssembly,

    /// One-shot completion releasing the caller.
    pub responder: Option<oneshot::Sender<Result<Response<Bytes>, Error>>>,
}

#[derive(Debug, Default)]
pub(super) struct ResponseAssembly {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: BytesMut,
    pub trailers: Option<HeaderMap>,
}

impl Stream {
    pub fn new(id: StreamId, send_window: u32, recv_window: u32) -> Stream {
        Stream {
            id,
            state: State::default(),
            send_flow: FlowControl::new(send_window),
            recv_flow: FlowControl::new(recv_window),
            recv_window_init: recv_window,
            recv_unclaimed: 0,
            pending_send: Bytes::new(),
            pending_send_eos: false,
            response: ResponseAssembly::default(),
            responder: None,
        }
    }

    /// Whether this stream has body bytes waiting for window capacity.
    pub fn has_pending_send(&self) -> bool {
        !self.pending_send.is_empty() || self.pending_send_eos
    }

    /// Account received data against this stream's window and report the
    /// WINDOW_UPDATE increment to emit, if the refill threshold was
    /// crossed.
    pub fn recv_data(&mut self, sz: u32) -> Result<Option<u32>, crate::frame::Reason> {
        self.recv_flow.recv_data(sz)?;
        self.recv_unclaimed += sz;

        if (self.recv_flow.window_size() as i64) < i64::from(self.recv_window_init) / 2 {
            let increment = self.recv_unclaimed;
            self.recv_flow.inc_window(increment)?;
            self.recv_unclaimed = 0;
            return Ok(Some(increment));
        }

        Ok(None)
    }

    /// Complete the caller with the assembled response.
    pub fn complete(&mut self) {
        if let Some(responder) = self.responder.take() {
            let assembly = std::mem::take(&mut self.response);

            let mut response = Response::new(assembly.body.freeze());
            *response.status_mut() = assembly.status.expect("response completed without status");
            *response.version_mut() = Version::HTTP_2;
            *response.headers_mut() = assembly.headers;

            if let Some(trailers) = assembly.trailers {
                response.extensions_mut().insert(Trailers(trailers));
            }

            // An error here just means the caller went away first.
            let _ = responder.send(Ok(response));
        }
    }

    /// Fail the caller, if it is still waiting.
    pub fn fail(&mut self, err: Error) {
        if let Some(responder) = self.responder.take() {
            let _ = responder.send(Err(err));
        }
    }
}
