use crate::codec::Codec;
use crate::frame::{self, Reason, StreamId};
use crate::proto::Error;

use tokio::io::{AsyncRead, AsyncWrite};

use std::task::{ready, Context, Poll};

/// Manages our sending of GOAWAY frames.
#[derive(Debug)]
pub(crate) struct GoAway {
    /// Records if we've sent any GOAWAY before.
    going_away: Option<GoingAway>,
    /// A GOAWAY frame that must be buffered in the Codec immediately.
    pending: Option<frame::GoAway>,
}

/// Keeps a memory of any GOAWAY frames we've sent before.
#[derive(Debug)]
struct GoingAway {
    /// Stores the highest stream ID of a GOAWAY that has been sent.
    ///
    /// It's illegal to send a subsequent GOAWAY with a higher ID.
    last_processed_id: StreamId,

    /// Records the error code of any GOAWAY frame sent.
    reason: Reason,
}

impl GoAway {
    pub(crate) fn new() -> Self {
        Self {
            going_away: None,
            pending: None,
        }
    }

    /// Enqueue a GOAWAY frame to be written.
    pub(crate) fn go_away(&mut self, f: frame::GoAway) {
        if let Some(ref going_away) = self.going_away {
            debug_assert!(
                f.last_stream_id() <= going_away.last_processed_id,
                "GOAWAY stream IDs shouldn't be higher; \
                 last_processed_id = {:?}, f.last_stream_id() = {:?}",
                going_away.last_processed_id,
                f.last_stream_id(),
            );
        }

        self.going_away = Some(GoingAway {
            last_processed_id: f.last_stream_id(),
            reason: f.reason(),
        });
        self.pending = Some(f);
    }

    pub(crate) fn go_away_now(&mut self, f: frame::GoAway) {
        if let Some(ref going_away) = self.going_away {
            // Prevent sending the same GOAWAY twice.
            if going_away.last_processed_id == f.last_stream_id()
                && going_away.reason == f.reason()
            {
                return;
            }
        }
        self.go_away(f);
    }

    /// Try to write a pending GOAWAY frame to the codec.
    pub(crate) fn send_pending_go_away<T>(
        &mut self,
        cx: &mut Context,
        codec: &mut Codec<T>,
    ) -> Poll<Result<(), Error>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if self.pending.is_some() {
            ready!(codec.poll_ready(cx)).map_err(Error::from)?;

            let frame = self.pending.take().expect("checked above");
            tracing::debug!("send GOAWAY; frame={:?}", frame);
            codec.buffer(frame.into()).expect("invalid GOAWAY frame");
        }

        Poll::Ready(Ok(()))
    }
}
