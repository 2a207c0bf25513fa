use crate::frame::{util, Error, Frame, Head, Kind, StreamId};

use bytes::{BufMut, Bytes, BytesMut};

use std::fmt;

/// Data frame
///
/// Data frames convey arbitrary, variable-length sequences of octets
/// associated with a stream. One or more DATA frames are used, for instance,
/// to carry HTTP request or response payloads.
#[derive(Eq, PartialEq)]
pub struct Data {
    stream_id: StreamId,
    data: Bytes,
    flags: DataFlags,
    pad_len: Option<u8>,
}

#[derive(Copy, Clone, Default, Eq, PartialEq)]
struct DataFlags(u8);

const END_STREAM: u8 = 0x1;
const PADDED: u8 = 0x8;
const ALL: u8 = END_STREAM | PADDED;

impl Data {
    /// Creates a new DATA frame.
    pub fn new(stream_id: StreamId, payload: Bytes) -> Self {
        assert!(!stream_id.is_zero());

        Data {
            stream_id,
            data: payload,
            flags: DataFlags::default(),
            pad_len: None,
        }
    }

    /// Returns the stream identifier that this frame is associated with.
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Gets the value of the `END_STREAM` flag.
    ///
    /// If true, this frame is the last that the endpoint will send for the
    /// identified stream.
    pub fn is_end_stream(&self) -> bool {
        self.flags.is_end_stream()
    }

    /// Sets the value of the `END_STREAM` flag.
    pub fn set_end_stream(&mut self, val: bool) {
        if val {
            self.flags.set_end_stream();
        } else {
            self.flags.unset_end_stream();
        }
    }

    /// Returns the length of the frame payload in bytes.
    pub fn payload_len(&self) -> usize {
        self.data.len()
    }

    /// Returns a reference to this frame's payload.
    pub fn payload(&self) -> &Bytes {
        &self.data
    }

    /// Parse a DATA frame from its raw payload.
    ///
    /// Padding is validated and stripped here, so the resulting payload holds
    /// exactly the application data.
    pub fn load(head: Head, mut payload: BytesMut) -> Result<Data, Error> {
        debug_assert_eq!(head.kind(), Kind::Data);

        let flags = DataFlags::load(head.flag());

        // DATA frames MUST be associated with a stream. If received with the
        // stream identifier 0x0, the recipient MUST respond with a connection
        // error of type PROTOCOL_ERROR.
        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let pad_len = if flags.is_padded() {
            let len = util::strip_padding(&mut payload)?;
            Some(len)
        } else {
            None
        };

        Ok(Data {
            stream_id: head.stream_id(),
            data: payload.freeze(),
            flags,
            pad_len,
        })
    }

    pub(crate) fn head(&self) -> Head {
        Head::new(Kind::Data, self.flags.into(), self.stream_id)
    }

    /// Encode the frame into `dst`. Padding is never emitted.
    pub fn encode<T: BufMut>(&self, dst: &mut T) {
        let len = self.data.len();

        self.head().encode(len, dst);
        dst.put_slice(&self.data);
    }
}

impl From<Data> for Frame {
    fn from(src: Data) -> Self {
        Frame::Data(src)
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let mut f = fmt.debug_struct("Data");
        f.field("stream_id", &self.stream_id);
        if !self.flags.is_empty() {
            f.field("flags", &self.flags);
        }
        if let Some(ref pad_len) = self.pad_len {
            f.field("pad_len", pad_len);
        }
        // `data` purposefully excluded
        f.finish()
    }
}

// ===== impl DataFlags =====

impl DataFlags {
    fn load(bits: u8) -> DataFlags {
        DataFlags(bits & ALL)
    }

    fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn is_end_stream(&self) -> bool {
        self.0 & END_STREAM == END_STREAM
    }

    fn set_end_stream(&mut self) {
        self.0 |= END_STREAM
    }

    fn unset_end_stream(&mut self) {
        self.0 &= !END_STREAM
    }

    fn is_padded(&self) -> bool {
        self.0 & PADDED == PADDED
    }
}

impl From<DataFlags> for u8 {
    fn from(src: DataFlags) -> u8 {
        src.0
    }
}

impl fmt::Debug for DataFlags {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        util::debug_flags(fmt, self.0)
            .flag_if(self.is_end_stream(), "END_STREAM")
            .flag_if(self.is_padded(), "PADDED")
            .finish()
    }
}
