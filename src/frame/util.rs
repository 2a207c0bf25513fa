use std::fmt;

use super::Error;
use bytes::BytesMut;

/// Unpack four octets starting at `offset` as a big-endian u32.
///
/// Written with shifts rather than pointer tricks so the result does not
/// depend on the host byte order.
pub fn unpack_octets_4(buf: &[u8], offset: usize) -> u32 {
    (u32::from(buf[offset])) << 24
        | (u32::from(buf[offset + 1])) << 16
        | (u32::from(buf[offset + 2])) << 8
        | (u32::from(buf[offset + 3]))
}

/// Strip the padding length octet and trailing padding from a PADDED payload.
///
/// Returns the pad length. The payload must not be empty and the pad length
/// must be strictly smaller than the remaining payload, otherwise the frame
/// is malformed.
pub fn strip_padding(payload: &mut BytesMut) -> Result<u8, Error> {
    let payload_len = payload.len();
    if payload_len == 0 {
        // If this is the case, the frame is invalid as no padding length can
        // be extracted, even though the frame should be padded.
        return Err(Error::TooMuchPadding);
    }

    let pad_len = payload[0] as usize;

    if pad_len >= payload_len {
        // This is invalid: the padding length MUST be less than the length of
        // the payload data.
        return Err(Error::TooMuchPadding);
    }

    // Remove the pad length octet and the padding itself.
    let _ = payload.split_to(1);
    let _ = payload.split_off(payload_len - 1 - pad_len);

    Ok(pad_len as u8)
}

pub(super) fn debug_flags<'a, 'f: 'a>(
    fmt: &'a mut fmt::Formatter<'f>,
    bits: u8,
) -> DebugFlags<'a, 'f> {
    let result = write!(fmt, "({:#x}", bits);
    DebugFlags {
        fmt,
        result,
        started: false,
    }
}

pub(super) struct DebugFlags<'a, 'f: 'a> {
    fmt: &'a mut fmt::Formatter<'f>,
    result: fmt::Result,
    started: bool,
}

impl<'a, 'f: 'a> DebugFlags<'a, 'f> {
    pub(super) fn flag_if(&mut self, enabled: bool, name: &str) -> &mut Self {
        if enabled {
            self.result = self.result.and_then(|()| {
                let prefix = if self.started {
                    " | "
                } else {
                    self.started = true;
                    ": "
                };

                write!(self.fmt, "{}{}", prefix, name)
            });
        }
        self
    }

    pub(super) fn finish(&mut self) -> fmt::Result {
        self.result.and_then(|()| write!(self.fmt, ")"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_padding() {
        let mut payload = BytesMut::from(&[2u8, b'o', b'k', 0, 0][..]);
        let pad_len = strip_padding(&mut payload).unwrap();
        assert_eq!(pad_len, 2);
        assert_eq!(&payload[..], b"ok");
    }

    #[test]
    fn rejects_pad_length_covering_whole_payload() {
        let mut payload = BytesMut::from(&[4u8, 0, 0, 0, 0][..]);
        assert!(strip_padding(&mut payload).is_err());

        let mut empty = BytesMut::new();
        assert!(strip_padding(&mut empty).is_err());
    }
}
