use crate::frame::StreamId;

use bytes::BufMut;

/// The 9-byte header shared by every HTTP/2 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    kind: Kind,
    flag: u8,
    stream_id: StreamId,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Data = 0,
    Headers = 1,
    Priority = 2,
    Reset = 3,
    Settings = 4,
    PushPromise = 5,
    Ping = 6,
    GoAway = 7,
    WindowUpdate = 8,
    Continuation = 9,
    Unknown,
}

// ===== impl Head =====

impl Head {
    pub fn new(kind: Kind, flag: u8, stream_id: StreamId) -> Head {
        Head {
            kind,
            flag,
            stream_id,
        }
    }

    /// Parse an HTTP/2 frame header, which is present in the first 9 bytes
    /// of a frame.
    pub fn parse(header: &[u8]) -> Head {
        let (stream_id, _) = StreamId::parse(&header[5..]);

        Head {
            kind: Kind::new(header[3]),
            flag: header[4],
            stream_id,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn flag(&self) -> u8 {
        self.flag
    }

    pub fn encode_len(&self) -> usize {
        super::HEADER_LEN
    }

    /// Write the frame header with the given payload length.
    ///
    /// All fields are written big-endian with byte shifts, so the encoding is
    /// identical on little-endian hosts. The reserved bit of the stream
    /// identifier is always written as zero.
    pub fn encode<T: BufMut>(&self, payload_len: usize, dst: &mut T) {
        debug_assert!(self.encode_len() <= dst.remaining_mut());
        debug_assert!(payload_len < (1 << 24));

        dst.put_uint(payload_len as u64, 3);
        dst.put_u8(self.kind as u8);
        dst.put_u8(self.flag);
        dst.put_u32(u32::from(self.stream_id));
    }
}

// ===== impl Kind =====

impl Kind {
    pub fn new(byte: u8) -> Kind {
        match byte {
            0 => Kind::Data,
            1 => Kind::Headers,
            2 => Kind::Priority,
            3 => Kind::Reset,
            4 => Kind::Settings,
            5 => Kind::PushPromise,
            6 => Kind::Ping,
            7 => Kind::GoAway,
            8 => Kind::WindowUpdate,
            9 => Kind::Continuation,
            _ => Kind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_the_wire_format() {
        let mut buf = bytes::BytesMut::with_capacity(9);
        let head = Head::new(Kind::Settings, 0x1, StreamId::zero());
        head.encode(6, &mut buf);

        assert_eq!(&buf[..], &[0, 0, 6, 4, 1, 0, 0, 0, 0]);

        let parsed = Head::parse(&buf);
        assert_eq!(parsed.kind(), Kind::Settings);
        assert_eq!(parsed.flag(), 0x1);
        assert_eq!(parsed.stream_id(), StreamId::zero());
    }

    #[test]
    fn parse_clears_the_reserved_bit() {
        let buf = [0, 0, 0, 0, 0, 0x80, 0, 0, 1];
        let head = Head::parse(&buf);
        assert_eq!(head.stream_id(), StreamId::from(1));
    }
}
