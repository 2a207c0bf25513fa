use crate::frame::{self, Error, Frame, Head, Kind, StreamId};

use bytes::BufMut;

const SIZE_INCREMENT_MASK: u32 = 1 << 31;

/// A WINDOW_UPDATE frame.
///
/// The stream identifier selects the scope: zero updates the connection
/// window, anything else the window of that stream.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct WindowUpdate {
    stream_id: StreamId,
    size_increment: u32,
}

impl WindowUpdate {
    pub fn new(stream_id: StreamId, size_increment: u32) -> WindowUpdate {
        WindowUpdate {
            stream_id,
            size_increment,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn size_increment(&self) -> u32 {
        self.size_increment
    }

    /// Builds a `WindowUpdate` frame from a raw frame.
    pub fn load(head: Head, payload: &[u8]) -> Result<WindowUpdate, Error> {
        debug_assert_eq!(head.kind(), Kind::WindowUpdate);

        // A WINDOW_UPDATE frame with a length other than 4 octets MUST be
        // treated as a connection error of type FRAME_SIZE_ERROR.
        if payload.len() != 4 {
            return Err(Error::BadFrameSize);
        }

        // The reserved most significant bit is ignored on receipt.
        let size_increment = frame::util::unpack_octets_4(payload, 0) & !SIZE_INCREMENT_MASK;

        Ok(WindowUpdate {
            stream_id: head.stream_id(),
            size_increment,
        })
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        tracing::trace!("encoding WINDOW_UPDATE; id={:?}", self.stream_id);
        let head = Head::new(Kind::WindowUpdate, 0, self.stream_id);
        head.encode(4, dst);
        dst.put_u32(self.size_increment & !SIZE_INCREMENT_MASK);
    }
}

impl From<WindowUpdate> for Frame {
    fn from(src: WindowUpdate) -> Frame {
        Frame::WindowUpdate(src)
    }
}
