use crate::frame::{self, Error, Frame, Head, Kind, Reason, StreamId};

use bytes::BufMut;

/// A RST_STREAM frame, carrying the error code that terminated a stream.
#[derive(Debug, Eq, PartialEq)]
pub struct Reset {
    stream_id: StreamId,
    error_code: Reason,
}

impl Reset {
    pub fn new(stream_id: StreamId, error: Reason) -> Reset {
        Reset {
            stream_id,
            error_code: error,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn reason(&self) -> Reason {
        self.error_code
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Reset, Error> {
        debug_assert_eq!(head.kind(), Kind::Reset);

        // RST_STREAM frames MUST be associated with a stream.
        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        // A RST_STREAM frame with a length other than 4 octets MUST be
        // treated as a connection error of type FRAME_SIZE_ERROR.
        if payload.len() != 4 {
            return Err(Error::BadFrameSize);
        }

        let error_code = frame::util::unpack_octets_4(payload, 0);

        Ok(Reset {
            stream_id: head.stream_id(),
            error_code: error_code.into(),
        })
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        tracing::trace!(
            "encoding RST_STREAM; id={:?} code={:?}",
            self.stream_id,
            self.error_code
        );
        let head = Head::new(Kind::Reset, 0, self.stream_id);
        head.encode(4, dst);
        dst.put_u32(self.error_code.into());
    }
}

impl From<Reset> for Frame {
    fn from(src: Reset) -> Frame {
        Frame::Reset(src)
    }
}
