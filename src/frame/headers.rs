use crate::frame::{util, Error, Frame, Head, Kind, StreamId};
use crate::hpack::{self, BytesStr, Header};

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};

use bytes::{BufMut, BytesMut};

use std::cmp;
use std::fmt;
use std::io::Cursor;

/// Header frame
///
/// This could be either a request or a response.
#[derive(Eq, PartialEq)]
pub struct Headers {
    /// The ID of the stream with which this frame is associated.
    stream_id: StreamId,

    /// The header block fragment
    header_block: HeaderBlock,

    /// The associated flags
    flags: HeadersFlag,
}

#[derive(Copy, Clone, Eq, PartialEq)]
pub struct HeadersFlag(u8);

#[derive(Debug, Eq, PartialEq, Default)]
struct HeaderBlock {
    /// The decoded header fields
    fields: HeaderMap,

    /// Pseudo headers, these are broken out as they must be sent as part of
    /// the headers frame.
    pseudo: Pseudo,
}

#[derive(Debug, Default, Eq, PartialEq)]
pub struct Pseudo {
    // Request
    pub method: Option<Method>,
    pub scheme: Option<BytesStr>,
    pub authority: Option<BytesStr>,
    pub path: Option<BytesStr>,

    // Response
    pub status: Option<StatusCode>,
}

/// An iterator yielding a header block in encoding order: pseudo headers
/// first, then the regular fields.
struct Iter {
    pseudo: Option<Pseudo>,
    fields: header::IntoIter<HeaderValue>,
    last_name: Option<HeaderName>,
}

const END_STREAM: u8 = 0x1;
const END_HEADERS: u8 = 0x4;
const PADDED: u8 = 0x8;
const PRIORITY: u8 = 0x20;
const ALL: u8 = END_STREAM | END_HEADERS | PADDED | PRIORITY;

// ===== impl Headers =====

impl Headers {
    /// Create a new HEADERS frame
    pub fn new(stream_id: StreamId, pseudo: Pseudo, fields: HeaderMap) -> Self {
        Headers {
            stream_id,
            header_block: HeaderBlock { fields, pseudo },
            flags: HeadersFlag::default(),
        }
    }

    /// Parse the frame-level fields (padding, priority) of a HEADERS frame.
    ///
    /// The returned buffer is the header block fragment; it is decoded
    /// separately once the full block, possibly spanning CONTINUATION
    /// frames, has been assembled.
    pub fn load(head: Head, mut src: BytesMut) -> Result<(Self, BytesMut), Error> {
        debug_assert_eq!(head.kind(), Kind::Headers);

        let flags = HeadersFlag::load(head.flag());

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        if flags.is_padded() {
            let _ = util::strip_padding(&mut src)?;
        }

        if flags.is_priority() {
            if src.len() < 5 {
                return Err(Error::InvalidPayloadLength);
            }

            let dependency = super::priority::StreamDependency::load(&src[..5])?;

            if dependency.dependency_id() == head.stream_id() {
                return Err(Error::InvalidDependencyId);
            }

            let _ = src.split_to(5);
        }

        let headers = Headers {
            stream_id: head.stream_id(),
            header_block: HeaderBlock::default(),
            flags,
        };

        Ok((headers, src))
    }

    /// Decode the complete header block into fields.
    ///
    /// The cumulative size of the decoded list is bounded by
    /// `max_header_list_size`; exceeding it fails the whole decode.
    pub fn load_hpack(
        &mut self,
        src: &BytesMut,
        max_header_list_size: usize,
        decoder: &mut hpack::Decoder,
    ) -> Result<(), Error> {
        self.header_block.load(src, max_header_list_size, decoder)
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags.is_end_headers()
    }

    pub fn set_end_headers(&mut self) {
        self.flags.set_end_headers();
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags.is_end_stream()
    }

    pub fn set_end_stream(&mut self) {
        self.flags.set_end_stream()
    }

    /// Returns `true` if the frame represents trailers
    ///
    /// Trailers are header frames that contain no pseudo headers.
    pub fn is_trailers(&self) -> bool {
        self.header_block.pseudo == Pseudo::default()
    }

    /// Whether this is an informational (1xx) response.
    pub fn is_informational(&self) -> bool {
        self.header_block
            .pseudo
            .status
            .map_or(false, |status| status.is_informational())
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.header_block.pseudo.status
    }

    pub fn into_parts(self) -> (Pseudo, HeaderMap) {
        (self.header_block.pseudo, self.header_block.fields)
    }

    /// Encode the frame, splitting the header block into HEADERS plus as
    /// many CONTINUATION frames as needed so that no fragment exceeds
    /// `max_frame_size`. END_HEADERS lands on the final fragment.
    pub fn encode(self, encoder: &mut hpack::Encoder, dst: &mut BytesMut, max_frame_size: usize) {
        debug_assert!(max_frame_size > 0);

        let stream_id = self.stream_id;
        let end_stream = self.flags.is_end_stream();

        let mut block = BytesMut::new();
        encoder.encode(
            Iter {
                pseudo: Some(self.header_block.pseudo),
                fields: self.header_block.fields.into_iter(),
                last_name: None,
            },
            &mut block,
        );
        let mut block = block.freeze();

        let frag = block.split_to(cmp::min(block.len(), max_frame_size));

        let mut flags = 0;
        if end_stream {
            flags |= END_STREAM;
        }
        if block.is_empty() {
            flags |= END_HEADERS;
        }

        tracing::trace!(
            "encoding HEADERS; id={:?} len={} end_headers={} end_stream={}",
            stream_id,
            frag.len(),
            block.is_empty(),
            end_stream
        );

        Head::new(Kind::Headers, flags, stream_id).encode(frag.len(), dst);
        dst.put_slice(&frag);

        while !block.is_empty() {
            let frag = block.split_to(cmp::min(block.len(), max_frame_size));
            let flags = if block.is_empty() { END_HEADERS } else { 0 };

            tracing::trace!(
                "encoding CONTINUATION; id={:?} len={} end_headers={}",
                stream_id,
                frag.len(),
                block.is_empty()
            );

            Head::new(Kind::Continuation, flags, stream_id).encode(frag.len(), dst);
            dst.put_slice(&frag);
        }
    }
}

impl From<Headers> for Frame {
    fn from(src: Headers) -> Self {
        Frame::Headers(src)
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("Headers");
        builder
            .field("stream_id", &self.stream_id)
            .field("flags", &self.flags);

        if let Some(ref status) = self.header_block.pseudo.status {
            builder.field("status", status);
        }

        if let Some(ref method) = self.header_block.pseudo.method {
            builder.field("method", method);
        }

        // `fields` purposefully excluded
        builder.finish()
    }
}

// ===== impl HeaderBlock =====

impl HeaderBlock {
    fn load(
        &mut self,
        src: &BytesMut,
        max_header_list_size: usize,
        decoder: &mut hpack::Decoder,
    ) -> Result<(), Error> {
        let mut reg = false;
        let mut malformed = false;
        let mut headers_size = 0;

        macro_rules! set_pseudo {
            ($field:ident, $val:expr) => {{
                if reg {
                    tracing::trace!("load_hpack; pseudo header after regular header");
                    malformed = true;
                } else if self.pseudo.$field.is_some() {
                    tracing::trace!("load_hpack; repeated pseudo header");
                    malformed = true;
                } else {
                    self.pseudo.$field = Some($val);
                }
            }};
        }

        let mut cursor = Cursor::new(&src[..]);

        decoder
            .decode(&mut cursor, |header| {
                headers_size += header.len();
                if headers_size > max_header_list_size {
                    tracing::debug!(
                        "load_hpack; header list size exceeds limit; max={}",
                        max_header_list_size
                    );
                    return Err(hpack::DecoderError::HeaderListTooLarge);
                }

                match header {
                    Header::Field { name, value } => {
                        // Connection-specific headers must not appear in an
                        // HTTP/2 message (RFC 9113 § 8.2.2); a message that
                        // carries one is malformed.
                        if is_connection_specific(&name, &value) {
                            tracing::trace!(
                                "load_hpack; connection-specific header: {:?}",
                                name
                            );
                            malformed = true;
                        } else {
                            reg = true;
                            self.fields.append(name, value);
                        }
                    }
                    Header::Authority(v) => set_pseudo!(authority, v),
                    Header::Method(v) => set_pseudo!(method, v),
                    Header::Scheme(v) => set_pseudo!(scheme, v),
                    Header::Path(v) => set_pseudo!(path, v),
                    Header::Status(v) => set_pseudo!(status, v),
                }

                Ok(())
            })
            .map_err(Error::Hpack)?;

        if malformed {
            return Err(Error::MalformedMessage);
        }

        Ok(())
    }
}

fn is_connection_specific(name: &HeaderName, value: &HeaderValue) -> bool {
    match *name {
        header::CONNECTION | header::TRANSFER_ENCODING | header::UPGRADE => true,
        header::TE => value.as_bytes() != b"trailers",
        _ => {
            let name = name.as_str();
            name == "keep-alive" || name == "proxy-connection"
        }
    }
}

// ===== impl Pseudo =====

impl Pseudo {
    pub fn request(method: Method, scheme: BytesStr, path: BytesStr) -> Self {
        Pseudo {
            method: Some(method),
            scheme: Some(scheme),
            authority: None,
            path: Some(path),
            status: None,
        }
    }

    /// Response pseudo headers; used by the frame-level test harness to
    /// play the server role.
    #[cfg(any(test, feature = "unstable"))]
    pub fn response(status: StatusCode) -> Self {
        Pseudo {
            method: None,
            scheme: None,
            authority: None,
            path: None,
            status: Some(status),
        }
    }

    pub fn set_authority(&mut self, authority: BytesStr) {
        self.authority = Some(authority);
    }
}

// ===== impl Iter =====

impl Iterator for Iter {
    type Item = Header;

    fn next(&mut self) -> Option<Self::Item> {
        use crate::hpack::Header::*;

        if let Some(ref mut pseudo) = self.pseudo {
            if let Some(method) = pseudo.method.take() {
                return Some(Method(method));
            }

            if let Some(scheme) = pseudo.scheme.take() {
                return Some(Scheme(scheme));
            }

            if let Some(authority) = pseudo.authority.take() {
                return Some(Authority(authority));
            }

            if let Some(path) = pseudo.path.take() {
                return Some(Path(path));
            }

            if let Some(status) = pseudo.status.take() {
                return Some(Status(status));
            }
        }

        self.pseudo = None;

        self.fields.next().map(|(name, value)| {
            if let Some(name) = name {
                self.last_name = Some(name);
            }

            Field {
                name: self
                    .last_name
                    .clone()
                    .expect("header map yielded a value before any name"),
                value,
            }
        })
    }
}

// ===== impl HeadersFlag =====

impl HeadersFlag {
    pub fn empty() -> HeadersFlag {
        HeadersFlag(0)
    }

    pub fn load(bits: u8) -> HeadersFlag {
        HeadersFlag(bits & ALL)
    }

    pub fn is_end_stream(&self) -> bool {
        self.0 & END_STREAM == END_STREAM
    }

    pub fn set_end_stream(&mut self) {
        self.0 |= END_STREAM;
    }

    pub fn is_end_headers(&self) -> bool {
        self.0 & END_HEADERS == END_HEADERS
    }

    pub fn set_end_headers(&mut self) {
        self.0 |= END_HEADERS;
    }

    pub fn is_padded(&self) -> bool {
        self.0 & PADDED == PADDED
    }

    pub fn is_priority(&self) -> bool {
        self.0 & PRIORITY == PRIORITY
    }
}

impl Default for HeadersFlag {
    /// Returns a `HeadersFlag` value with `END_HEADERS` set.
    fn default() -> Self {
        HeadersFlag(END_HEADERS)
    }
}

impl From<HeadersFlag> for u8 {
    fn from(src: HeadersFlag) -> u8 {
        src.0
    }
}

impl fmt::Debug for HeadersFlag {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        util::debug_flags(fmt, self.0)
            .flag_if(self.is_end_headers(), "END_HEADERS")
            .flag_if(self.is_end_stream(), "END_STREAM")
            .flag_if(self.is_padded(), "PADDED")
            .flag_if(self.is_priority(), "PRIORITY")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hpack::{Decoder, Encoder};

    fn encode_headers(headers: Headers, max_frame_size: usize) -> BytesMut {
        let mut encoder = Encoder::default();
        let mut dst = BytesMut::new();
        headers.encode(&mut encoder, &mut dst, max_frame_size);
        dst
    }

    fn sample_request() -> Headers {
        let pseudo = Pseudo::request(
            Method::GET,
            BytesStr::from_static("https"),
            BytesStr::from_static("/"),
        );
        let mut fields = HeaderMap::new();
        fields.insert(
            http::header::USER_AGENT,
            HeaderValue::from_static("h2-client/0.1"),
        );
        Headers::new(StreamId::from(1), pseudo, fields)
    }

    #[test]
    fn single_frame_carries_end_headers() {
        let buf = encode_headers(sample_request(), 16_384);

        let head = Head::parse(&buf);
        assert_eq!(head.kind(), Kind::Headers);
        assert_eq!(head.stream_id(), StreamId::from(1));
        assert_eq!(head.flag() & END_HEADERS, END_HEADERS);
    }

    #[test]
    fn oversized_block_splits_into_continuations() {
        let mut headers = sample_request();
        for i in 0..64 {
            let name: HeaderName = format!("x-filler-{:02}", i).parse().unwrap();
            headers.header_block.fields.insert(
                name,
                HeaderValue::from_static("abcdefghijklmnopqrstuvwxyz0123456789"),
            );
        }

        let buf = encode_headers(headers, 128);
        let mut frames = vec![];
        let mut rest = &buf[..];
        while !rest.is_empty() {
            let head = Head::parse(rest);
            let len = ((rest[0] as usize) << 16) | ((rest[1] as usize) << 8) | rest[2] as usize;
            assert!(len <= 128);
            frames.push((head.kind(), head.flag()));
            rest = &rest[9 + len..];
        }

        assert!(frames.len() > 1);
        assert_eq!(frames[0].0, Kind::Headers);
        assert_eq!(frames[0].1 & END_HEADERS, 0);
        for frame in &frames[1..frames.len() - 1] {
            assert_eq!(frame.0, Kind::Continuation);
            assert_eq!(frame.1 & END_HEADERS, 0);
        }
        let last = frames.last().unwrap();
        assert_eq!(last.0, Kind::Continuation);
        assert_eq!(last.1 & END_HEADERS, END_HEADERS);
    }

    #[test]
    fn decodes_its_own_encoding() {
        let buf = encode_headers(sample_request(), 16_384);

        let head = Head::parse(&buf);
        let payload = BytesMut::from(&buf[9..]);
        let (mut headers, fragment) = Headers::load(head, payload).unwrap();
        headers
            .load_hpack(&fragment, usize::MAX, &mut Decoder::default())
            .unwrap();

        let (pseudo, fields) = headers.into_parts();
        assert_eq!(pseudo.method, Some(Method::GET));
        assert_eq!(pseudo.path.as_deref(), Some("/"));
        assert_eq!(fields.get(http::header::USER_AGENT).unwrap(), "h2-client/0.1");
    }

    #[test]
    fn pseudo_after_regular_is_malformed() {
        // literal without indexing: user-agent then :path
        let mut encoder = Encoder::default();
        let mut block = BytesMut::new();
        encoder.encode(
            vec![
                crate::hpack::Header::new(
                    bytes::Bytes::from_static(b"user-agent"),
                    bytes::Bytes::from_static(b"x"),
                )
                .unwrap(),
                crate::hpack::Header::Path(BytesStr::from_static("/late")),
            ],
            &mut block,
        );

        let head = Head::new(Kind::Headers, END_HEADERS, StreamId::from(1));
        let (mut headers, _) = Headers::load(head, BytesMut::new()).unwrap();
        let err = headers
            .load_hpack(&block, usize::MAX, &mut Decoder::default())
            .unwrap_err();
        assert!(matches!(err, Error::MalformedMessage));
    }

    #[test]
    fn connection_specific_headers_are_malformed() {
        let mut encoder = Encoder::default();
        let mut block = BytesMut::new();
        encoder.encode(
            vec![crate::hpack::Header::new(
                bytes::Bytes::from_static(b"connection"),
                bytes::Bytes::from_static(b"keep-alive"),
            )
            .unwrap()],
            &mut block,
        );

        let head = Head::new(Kind::Headers, END_HEADERS, StreamId::from(1));
        let (mut headers, _) = Headers::load(head, BytesMut::new()).unwrap();
        let err = headers
            .load_hpack(&block, usize::MAX, &mut Decoder::default())
            .unwrap_err();
        assert!(matches!(err, Error::MalformedMessage));
    }

    #[test]
    fn header_list_size_budget_is_enforced() {
        let buf = encode_headers(sample_request(), 16_384);
        let head = Head::parse(&buf);
        let (mut headers, fragment) = Headers::load(head, BytesMut::from(&buf[9..])).unwrap();

        let err = headers
            .load_hpack(&fragment, 10, &mut Decoder::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Hpack(crate::hpack::DecoderError::HeaderListTooLarge)
        ));
    }
}
