use crate::frame::{Error, Frame, Head, Kind, StreamId};
use bytes::BufMut;

const ACK_FLAG: u8 = 0x1;

pub type Payload = [u8; 8];

/// A PING frame.
///
/// PING frames carry 8 bytes of opaque data and are the mechanism for
/// measuring a round-trip time and for checking whether an idle connection
/// is still functional.
#[derive(Debug, Eq, PartialEq)]
pub struct Ping {
    ack: bool,
    payload: Payload,
}

impl Ping {
    pub fn new(payload: Payload) -> Ping {
        Ping {
            ack: false,
            payload,
        }
    }

    pub fn pong(payload: Payload) -> Ping {
        Ping { ack: true, payload }
    }

    pub fn is_ack(&self) -> bool {
        self.ack
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Builds a `Ping` frame from a raw frame.
    pub fn load(head: Head, bytes: &[u8]) -> Result<Ping, Error> {
        debug_assert_eq!(head.kind(), Kind::Ping);

        // PING frames are not associated with any individual stream. If a PING
        // frame is received with a stream identifier field value other than
        // 0x0, the recipient MUST respond with a connection error
        // (Section 5.4.1) of type PROTOCOL_ERROR.
        if !head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        // In addition to the frame header, PING frames MUST contain 8 octets of opaque
        // data in the payload.
        if bytes.len() != 8 {
            return Err(Error::BadFrameSize);
        }

        let mut payload = [0; 8];
        payload.copy_from_slice(bytes);

        // The PING frame defines the following flags:
        //
        // ACK (0x1): When set, bit 0 indicates that this PING frame is a PING
        //    response. An endpoint MUST set this flag in PING responses. An
        //    endpoint MUST NOT respond to PING frames containing this flag.
        let ack = head.flag() & ACK_FLAG != 0;

        Ok(Ping { ack, payload })
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        let sz = self.payload.len();
        tracing::trace!("encoding PING; ack={} len={}", self.ack, sz);

        let flags = if self.ack { ACK_FLAG } else { 0 };
        let head = Head::new(Kind::Ping, flags, StreamId::zero());

        head.encode(sz, dst);
        dst.put_slice(&self.payload);
    }
}

impl From<Ping> for Frame {
    fn from(src: Ping) -> Frame {
        Frame::Ping(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pong_echoes_the_payload() {
        let mut buf = bytes::BytesMut::new();
        Ping::pong(*b"buoyant_").encode(&mut buf);

        assert_eq!(&buf[..9], &[0, 0, 8, 6, 1, 0, 0, 0, 0]);
        assert_eq!(&buf[9..], b"buoyant_");
    }

    #[test]
    fn short_payload_is_a_frame_size_error() {
        let head = Head::new(Kind::Ping, 0, StreamId::zero());
        assert!(matches!(
            Ping::load(head, b"short"),
            Err(Error::BadFrameSize)
        ));
    }

    #[test]
    fn nonzero_stream_id_is_rejected() {
        let head = Head::new(Kind::Ping, 0, StreamId::from(1));
        assert!(matches!(
            Ping::load(head, b"12345678"),
            Err(Error::InvalidStreamId)
        ));
    }
}
