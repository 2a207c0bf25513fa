use crate::codec::UserError;
use crate::frame::{self, Frame, FrameSize};
use crate::hpack;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// The frame-encoding half of the codec.
///
/// Frames are serialized into a single write buffer which is flushed to the
/// transport; the buffer doubles as the bounded outbound queue that
/// back-pressures producers when the transport is slow.
#[derive(Debug)]
pub struct FramedWrite<T> {
    /// Upstream `AsyncWrite`
    inner: T,

    /// HPACK encoder
    hpack: hpack::Encoder,

    /// Write buffer
    buf: BytesMut,

    /// Max frame size, this is specified by the peer
    max_frame_size: FrameSize,
}

/// Initialize the connection with this amount of write buffer.
const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1_024;

/// Buffering more than this backpressures frame producers until the
/// transport drains.
const BACKPRESSURE_BOUNDARY: usize = DEFAULT_BUFFER_CAPACITY;

impl<T> FramedWrite<T>
where
    T: AsyncWrite + Unpin,
{
    pub fn new(inner: T) -> FramedWrite<T> {
        FramedWrite {
            inner,
            hpack: hpack::Encoder::default(),
            buf: BytesMut::with_capacity(DEFAULT_BUFFER_CAPACITY),
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Returns `Ready` when `buffer` can be called with another frame.
    pub fn poll_ready(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        if !self.has_capacity() {
            // Try flushing
            ready!(self.flush(cx))?;

            if !self.has_capacity() {
                return Poll::Pending;
            }
        }

        Poll::Ready(Ok(()))
    }

    /// Buffer a frame.
    ///
    /// `poll_ready` must be called first to ensure capacity.
    pub fn buffer(&mut self, item: Frame) -> Result<(), UserError> {
        tracing::debug!("send frame={:?}", item);

        match item {
            Frame::Data(frame) => {
                if frame.payload_len() > self.max_frame_size as usize {
                    return Err(UserError::PayloadTooBig);
                }

                frame.encode(&mut self.buf);
            }
            Frame::Headers(frame) => {
                frame.encode(&mut self.hpack, &mut self.buf, self.max_frame_size as usize);
            }
            Frame::Settings(frame) => {
                frame.encode(&mut self.buf);
            }
            Frame::Ping(frame) => {
                frame.encode(&mut self.buf);
            }
            Frame::GoAway(frame) => {
                frame.encode(&mut self.buf);
            }
            Frame::WindowUpdate(frame) => {
                frame.encode(&mut self.buf);
            }
            Frame::Reset(frame) => {
                frame.encode(&mut self.buf);
            }
            Frame::Priority(_) => {
                // Peer priorities are parsed but never re-emitted.
                unreachable!("client never sends PRIORITY frames");
            }
        }

        Ok(())
    }

    /// Flush buffered data to the transport.
    pub fn flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        tracing::trace!("flush; buffered={}B", self.buf.len());

        while !self.buf.is_empty() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.buf))?;

            if n == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write frame to transport",
                )));
            }

            self.buf.advance(n);
        }

        ready!(Pin::new(&mut self.inner).poll_flush(cx))?;

        Poll::Ready(Ok(()))
    }

    /// Close the transport after flushing any remaining frames.
    pub fn shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        ready!(self.flush(cx))?;
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    fn has_capacity(&self) -> bool {
        self.buf.len() < BACKPRESSURE_BOUNDARY
    }

    /// Whether frames are still waiting to hit the transport.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl<T> FramedWrite<T> {
    /// Update the peer's advertised max frame size.
    pub fn set_max_frame_size(&mut self, val: usize) {
        assert!(val <= frame::MAX_MAX_FRAME_SIZE as usize);
        self.max_frame_size = val as FrameSize;
    }

    /// Update the peer's advertised header table size; the HPACK encoder
    /// will emit the matching size update in its next block.
    pub fn set_header_table_size(&mut self, val: usize) {
        self.hpack.update_max_size(val);
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

// The read half of the codec wraps the write half, so reads are forwarded
// through.
impl<T: AsyncRead + Unpin> AsyncRead for FramedWrite<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
