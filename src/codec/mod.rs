mod error;
mod framed_read;
mod framed_write;

pub use self::error::{SendError, UserError};
pub use self::framed_read::{ContinuationLimits, FramedRead};
pub use self::framed_write::FramedWrite;

use crate::frame::{self, Frame};
use crate::proto::Error;

use futures_core::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::length_delimited;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// The full frame codec: a deframer wrapped around an encoder wrapped
/// around the transport.
#[derive(Debug)]
pub struct Codec<T> {
    inner: FramedRead<FramedWrite<T>>,
}

impl<T> Codec<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns a new `Codec` with the default max frame size
    pub fn new(io: T) -> Self {
        Self::with_max_recv_frame_size(io, frame::DEFAULT_MAX_FRAME_SIZE as usize)
    }

    /// Returns a new `Codec` with the given maximum accepted frame size.
    pub fn with_max_recv_frame_size(io: T, max_frame_size: usize) -> Self {
        // Wrap with writer
        let framed_write = FramedWrite::new(io);

        // Delimit the frames
        let delimited = length_delimited::Builder::new()
            .big_endian()
            .length_field_length(3)
            .length_adjustment(9)
            .num_skip(0) // Don't skip the header
            .new_read(framed_write);

        let mut inner = FramedRead::new(delimited);

        // Use FramedRead's method since it checks the value is within range
        inner.set_max_frame_size(max_frame_size);

        Codec { inner }
    }
}

impl<T> Codec<T> {
    /// Updates the max received frame size.
    ///
    /// The change takes effect the next time a frame is decoded. In other
    /// words, if a frame is currently in process of being decoded with a
    /// frame size greater than `val` but less than the max frame size in
    /// effect before calling this function, then the frame will be allowed.
    pub fn set_max_recv_frame_size(&mut self, val: usize) {
        self.inner.set_max_frame_size(val)
    }

    /// Updates the max sent frame size; set from the peer's SETTINGS.
    pub fn set_max_send_frame_size(&mut self, val: usize) {
        self.framed_write().set_max_frame_size(val)
    }

    /// Updates the peer's header table size; the HPACK encoder emits the
    /// matching dynamic table size update.
    pub fn set_send_header_table_size(&mut self, val: usize) {
        self.framed_write().set_header_table_size(val)
    }

    /// Updates the decoder's view of our HEADER_TABLE_SIZE setting.
    pub fn set_recv_header_table_size(&mut self, val: usize) {
        self.inner.set_header_table_size(val)
    }

    /// Update the max header list size setting, enforced during decode.
    pub fn set_max_recv_header_list_size(&mut self, val: usize) {
        self.inner.set_max_header_list_size(val);
    }

    /// Replace the CONTINUATION flood caps.
    pub fn set_continuation_limits(&mut self, limits: ContinuationLimits) {
        self.inner.set_continuation_limits(limits);
    }

    /// Returns a reference to the underlying transport.
    pub fn get_ref(&self) -> &T {
        self.inner.get_ref().get_ref()
    }

    /// Returns a mutable reference to the underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut().get_mut()
    }

    fn framed_write(&mut self) -> &mut FramedWrite<T> {
        self.inner.get_mut()
    }
}

impl<T> Codec<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns `Ready` when the codec can buffer the next frame.
    pub fn poll_ready(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.framed_write().poll_ready(cx)
    }

    /// Buffer a frame for sending.
    ///
    /// `poll_ready` must be called first.
    pub fn buffer(&mut self, item: Frame) -> Result<(), UserError> {
        self.framed_write().buffer(item)
    }

    /// Flush buffered frames to the transport.
    pub fn flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.framed_write().flush(cx)
    }

    /// Shut the transport down after draining the write buffer.
    pub fn shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        self.framed_write().shutdown(cx)
    }

    /// Whether all buffered frames have hit the transport.
    pub fn is_write_empty(&self) -> bool {
        // Peeking at the writer does not require AsyncWrite, but get_ref
        // keeps the accessor chain symmetrical.
        self.inner.get_ref().is_empty()
    }
}

impl<T> Stream for Codec<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    type Item = Result<Frame, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<T> futures_sink::Sink<Frame> for Codec<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    type Error = SendError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), SendError>> {
        self.framed_write().poll_ready(cx).map_err(Into::into)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Frame) -> Result<(), SendError> {
        self.buffer(item).map_err(Into::into)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), SendError>> {
        self.framed_write().flush(cx).map_err(Into::into)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), SendError>> {
        self.framed_write().shutdown(cx).map_err(Into::into)
    }
}
