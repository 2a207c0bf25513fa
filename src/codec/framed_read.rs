use crate::frame::{self, Frame, Head, Kind, Reason, StreamId};
use crate::hpack;
use crate::proto::Error;

use bytes::BytesMut;
use futures_core::Stream;
use tokio::io::AsyncRead;
use tokio_util::codec::length_delimited::LengthDelimitedCodec;
use tokio_util::codec::{FramedRead as LengthDelimited, LengthDelimitedCodecError};

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

// 16 MB "sane default" taken from golang http2
const DEFAULT_MAX_HEADER_LIST_SIZE: usize = 16 << 20;

/// Caps on a HEADERS/CONTINUATION sequence, guarding against unbounded
/// header floods (CVE-2024-27316 and friends).
#[derive(Debug, Clone, Copy)]
pub struct ContinuationLimits {
    /// Maximum number of CONTINUATION frames in one sequence.
    pub max_frames: usize,
    /// Maximum accumulated header block size across the sequence.
    pub max_accumulated: usize,
    /// Maximum size of a single CONTINUATION fragment.
    pub max_single: usize,
}

impl Default for ContinuationLimits {
    fn default() -> Self {
        ContinuationLimits {
            max_frames: 10,
            max_accumulated: 16_384,
            max_single: 8_192,
        }
    }
}

/// The frame-decoding half of the codec.
#[derive(Debug)]
pub struct FramedRead<T> {
    inner: LengthDelimited<T, LengthDelimitedCodec>,

    // hpack decoder state
    hpack: hpack::Decoder,

    max_header_list_size: usize,

    continuation_limits: ContinuationLimits,

    partial: Option<Partial>,
}

/// Partially loaded headers frame
#[derive(Debug)]
struct Partial {
    /// Frame awaiting the rest of its header block.
    frame: frame::Headers,

    /// Accumulated header block fragments.
    buf: BytesMut,

    /// Number of CONTINUATION frames consumed so far.
    continuation_frames: usize,
}

impl<T> FramedRead<T> {
    pub fn new(inner: LengthDelimited<T, LengthDelimitedCodec>) -> FramedRead<T> {
        FramedRead {
            inner,
            hpack: hpack::Decoder::new(frame::DEFAULT_SETTINGS_HEADER_TABLE_SIZE),
            max_header_list_size: DEFAULT_MAX_HEADER_LIST_SIZE,
            continuation_limits: ContinuationLimits::default(),
            partial: None,
        }
    }

    pub fn get_ref(&self) -> &T {
        self.inner.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Updates the max frame size setting.
    ///
    /// Must be within 16,384 and 16,777,215.
    pub fn set_max_frame_size(&mut self, val: usize) {
        assert!(
            frame::DEFAULT_MAX_FRAME_SIZE as usize <= val
                && val <= frame::MAX_MAX_FRAME_SIZE as usize
        );
        // The codec delimits on the length field alone, so the bound covers
        // the 9 byte header as well.
        self.inner
            .decoder_mut()
            .set_max_frame_length(val + frame::HEADER_LEN);
    }

    /// Update the max header list size setting.
    pub fn set_max_header_list_size(&mut self, val: usize) {
        self.max_header_list_size = val;
    }

    /// Update the HPACK decoder table bound from our HEADER_TABLE_SIZE.
    pub fn set_header_table_size(&mut self, val: usize) {
        self.hpack.set_max_table_size(val);
    }

    /// Replace the CONTINUATION flood caps.
    pub fn set_continuation_limits(&mut self, limits: ContinuationLimits) {
        self.continuation_limits = limits;
    }

    fn decode_frame(&mut self, mut bytes: BytesMut) -> Result<Option<Frame>, Error> {
        tracing::trace!("decoding frame from {}B", bytes.len());

        let head = Head::parse(&bytes);

        if self.partial.is_some() && head.kind() != Kind::Continuation {
            proto_err!(conn: "expected CONTINUATION, got {:?}", head.kind());
            return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
        }

        let kind = head.kind();

        tracing::trace!("    -> kind={:?}", kind);

        let frame = match kind {
            Kind::Settings => {
                let res = frame::Settings::load(head, &bytes[frame::HEADER_LEN..]);

                res.map_err(|e| {
                    proto_err!(conn: "failed to load SETTINGS frame; err={:?}", e);
                    let reason = match e {
                        frame::Error::InvalidPayloadAckSettings
                        | frame::Error::PartialSettingLength
                        | frame::Error::BadFrameSize => Reason::FRAME_SIZE_ERROR,
                        frame::Error::InvalidWindowSize => Reason::FLOW_CONTROL_ERROR,
                        _ => Reason::PROTOCOL_ERROR,
                    };
                    Error::library_go_away(reason)
                })?
                .into()
            }
            Kind::Ping => {
                let res = frame::Ping::load(head, &bytes[frame::HEADER_LEN..]);

                res.map_err(|e| {
                    proto_err!(conn: "failed to load PING frame; err={:?}", e);
                    let reason = match e {
                        frame::Error::BadFrameSize => Reason::FRAME_SIZE_ERROR,
                        _ => Reason::PROTOCOL_ERROR,
                    };
                    Error::library_go_away(reason)
                })?
                .into()
            }
            Kind::WindowUpdate => {
                let res = frame::WindowUpdate::load(head, &bytes[frame::HEADER_LEN..]);

                res.map_err(|e| {
                    proto_err!(conn: "failed to load WINDOW_UPDATE frame; err={:?}", e);
                    let reason = match e {
                        frame::Error::BadFrameSize => Reason::FRAME_SIZE_ERROR,
                        _ => Reason::PROTOCOL_ERROR,
                    };
                    Error::library_go_away(reason)
                })?
                .into()
            }
            Kind::Data => {
                let _ = bytes.split_to(frame::HEADER_LEN);
                let res = frame::Data::load(head, bytes);

                res.map_err(|e| {
                    proto_err!(conn: "failed to load DATA frame; err={:?}", e);
                    Error::library_go_away(Reason::PROTOCOL_ERROR)
                })?
                .into()
            }
            Kind::Headers => {
                let _ = bytes.split_to(frame::HEADER_LEN);

                // Parse the frame-level fields without touching the header
                // block yet.
                let (mut headers, payload) = match frame::Headers::load(head, bytes) {
                    Ok(res) => res,
                    Err(frame::Error::InvalidDependencyId) => {
                        proto_err!(stream: "invalid HEADERS dependency ID; stream={:?}", head.stream_id());
                        // A stream cannot depend on itself. An endpoint MUST
                        // treat this as a stream error (Section 5.4.2) of type
                        // `PROTOCOL_ERROR`.
                        return Err(Error::library_reset(
                            head.stream_id(),
                            Reason::PROTOCOL_ERROR,
                        ));
                    }
                    Err(e) => {
                        proto_err!(conn: "failed to load HEADERS frame; err={:?}", e);
                        return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
                    }
                };

                if headers.is_end_headers() {
                    self.decode_header_block(&mut headers, &payload)?;
                    headers.into()
                } else {
                    // The header block continues in CONTINUATION frames;
                    // defer decoding until the block is complete.
                    if payload.len() > self.continuation_limits.max_accumulated {
                        return Err(self.continuation_flood(head.stream_id()));
                    }

                    self.partial = Some(Partial {
                        frame: headers,
                        buf: payload,
                        continuation_frames: 0,
                    });

                    return Ok(None);
                }
            }
            Kind::Reset => {
                let res = frame::Reset::load(head, &bytes[frame::HEADER_LEN..]);
                res.map_err(|e| {
                    proto_err!(conn: "failed to load RST_STREAM frame; err={:?}", e);
                    let reason = match e {
                        frame::Error::BadFrameSize => Reason::FRAME_SIZE_ERROR,
                        _ => Reason::PROTOCOL_ERROR,
                    };
                    Error::library_go_away(reason)
                })?
                .into()
            }
            Kind::GoAway => {
                let res = frame::GoAway::load(head, &bytes[frame::HEADER_LEN..]);
                res.map_err(|e| {
                    proto_err!(conn: "failed to load GOAWAY frame; err={:?}", e);
                    let reason = match e {
                        frame::Error::BadFrameSize => Reason::FRAME_SIZE_ERROR,
                        _ => Reason::PROTOCOL_ERROR,
                    };
                    Error::library_go_away(reason)
                })?
                .into()
            }
            Kind::PushPromise => {
                // Push is disabled in the local settings; a peer that sends
                // PUSH_PROMISE anyway violates the protocol.
                proto_err!(conn: "received PUSH_PROMISE with push disabled");
                return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
            }
            Kind::Priority => {
                if head.stream_id().is_zero() {
                    // Invalid stream identifier
                    proto_err!(conn: "PRIORITY invalid stream ID 0");
                    return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
                }

                match frame::Priority::load(head, &bytes[frame::HEADER_LEN..]) {
                    Ok(frame) => frame.into(),
                    Err(frame::Error::InvalidDependencyId) => {
                        // A stream cannot depend on itself. An endpoint MUST
                        // treat this as a stream error of type PROTOCOL_ERROR.
                        proto_err!(stream: "PRIORITY invalid dependency ID; stream={:?}", head.stream_id());
                        return Err(Error::library_reset(
                            head.stream_id(),
                            Reason::PROTOCOL_ERROR,
                        ));
                    }
                    Err(frame::Error::BadFrameSize) => {
                        proto_err!(stream: "PRIORITY with bad frame size; stream={:?}", head.stream_id());
                        return Err(Error::library_reset(
                            head.stream_id(),
                            Reason::FRAME_SIZE_ERROR,
                        ));
                    }
                    Err(e) => {
                        proto_err!(conn: "failed to load PRIORITY frame; err={:?}", e);
                        return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
                    }
                }
            }
            Kind::Continuation => {
                let is_end_headers = (head.flag() & 0x4) == 0x4;

                let mut partial = match self.partial.take() {
                    Some(partial) => partial,
                    None => {
                        proto_err!(conn: "received unexpected CONTINUATION frame");
                        return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
                    }
                };

                // The stream identifiers must match
                if partial.frame.stream_id() != head.stream_id() {
                    proto_err!(conn: "CONTINUATION frame stream ID does not match previous frame stream ID");
                    return Err(Error::library_go_away(Reason::PROTOCOL_ERROR));
                }

                let fragment = &bytes[frame::HEADER_LEN..];

                partial.continuation_frames += 1;

                if partial.continuation_frames > self.continuation_limits.max_frames
                    || fragment.len() > self.continuation_limits.max_single
                    || partial.buf.len() + fragment.len() > self.continuation_limits.max_accumulated
                {
                    return Err(self.continuation_flood(head.stream_id()));
                }

                partial.buf.extend_from_slice(fragment);

                if !is_end_headers {
                    self.partial = Some(partial);
                    return Ok(None);
                }

                let Partial {
                    mut frame, buf, ..
                } = partial;

                self.decode_header_block(&mut frame, &buf)?;
                frame.set_end_headers();
                frame.into()
            }
            Kind::Unknown => {
                // Unknown frames are ignored
                return Ok(None);
            }
        };

        Ok(Some(frame))
    }

    /// Decode a complete header block into the frame, classifying failures.
    fn decode_header_block(
        &mut self,
        frame: &mut frame::Headers,
        src: &BytesMut,
    ) -> Result<(), Error> {
        match frame.load_hpack(src, self.max_header_list_size, &mut self.hpack) {
            Ok(()) => Ok(()),
            Err(frame::Error::MalformedMessage) => {
                proto_err!(stream: "malformed header block; stream={:?}", frame.stream_id());
                Err(Error::library_reset(
                    frame.stream_id(),
                    Reason::PROTOCOL_ERROR,
                ))
            }
            Err(e) => {
                proto_err!(conn: "failed HPACK decoding; err={:?}", e);
                Err(Error::library_go_away(Reason::COMPRESSION_ERROR))
            }
        }
    }

    fn continuation_flood(&self, stream_id: StreamId) -> Error {
        let limits = &self.continuation_limits;
        proto_err!(
            conn: "CONTINUATION flood; stream={:?} max_frames={} max_accumulated={} max_single={}",
            stream_id,
            limits.max_frames,
            limits.max_accumulated,
            limits.max_single
        );
        Error::library_go_away_data(Reason::PROTOCOL_ERROR, "CONTINUATION flood limit exceeded")
    }
}

impl<T> Stream for FramedRead<T>
where
    T: AsyncRead + Unpin,
{
    type Item = Result<Frame, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let bytes = match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => return Poll::Ready(Some(Err(map_err(e)))),
                None => return Poll::Ready(None),
            };

            tracing::trace!("read; bytes={}B", bytes.len());
            if let Some(frame) = self.decode_frame(bytes)? {
                tracing::debug!("received frame={:?}", frame);
                return Poll::Ready(Some(Ok(frame)));
            }
        }
    }
}

fn map_err(err: io::Error) -> Error {
    if let io::ErrorKind::InvalidData = err.kind() {
        if let Some(custom) = err.get_ref() {
            if custom.is::<LengthDelimitedCodecError>() {
                return Error::library_go_away(Reason::FRAME_SIZE_ERROR);
            }
        }
    }
    err.into()
}
