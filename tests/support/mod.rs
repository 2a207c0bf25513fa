//! A frame-level peer for driving the client: the test side of the
//! in-memory transport wrapped in the crate's own codec.

#![allow(dead_code)]

use h2_client::codec::Codec;
use h2_client::frame::{self, Frame, Pseudo, StreamId};
use h2_client::transport::mock::Mock;

use bytes::Bytes;
use futures_core::Stream;
use http::{HeaderMap, HeaderValue, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use std::future::poll_fn;
use std::pin::Pin;

pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// The server end of a mock connection.
pub struct MockServer {
    codec: Codec<Mock>,
}

impl MockServer {
    /// Accept a client connection: consume the preface, swap SETTINGS and
    /// ACK the client's.
    pub async fn accept(io: Mock) -> MockServer {
        MockServer::accept_with_settings(io, frame::Settings::default()).await
    }

    pub async fn accept_with_settings(mut io: Mock, settings: frame::Settings) -> MockServer {
        let mut preface = [0u8; 24];
        io.read_exact(&mut preface).await.expect("client preface");
        assert_eq!(&preface[..], PREFACE, "client preface mismatch");

        let mut server = MockServer {
            codec: Codec::new(io),
        };

        let frame = server.recv_frame().await;
        match frame {
            Frame::Settings(settings) => assert!(!settings.is_ack()),
            other => panic!("expected client SETTINGS, got {:?}", other),
        }

        server.send_frame(settings.into()).await;
        server.send_frame(frame::Settings::ack().into()).await;

        // The client acknowledges our settings before anything else.
        let frame = server.recv_frame().await;
        match frame {
            Frame::Settings(settings) => assert!(settings.is_ack()),
            other => panic!("expected client SETTINGS ACK, got {:?}", other),
        }

        server
    }

    /// Receive the next frame, panicking on EOF or a protocol error.
    pub async fn recv_frame(&mut self) -> Frame {
        self.try_recv_frame()
            .await
            .expect("unexpected end of stream")
    }

    /// Receive the next frame, or `None` on EOF.
    pub async fn try_recv_frame(&mut self) -> Option<Frame> {
        poll_fn(|cx| Pin::new(&mut self.codec).poll_next(cx))
            .await
            .map(|res| res.expect("peer frame error"))
    }

    /// Expect the transport to be closed.
    pub async fn recv_eof(&mut self) {
        let frame = self.try_recv_frame().await;
        assert!(frame.is_none(), "expected EOF, got {:?}", frame);
    }

    pub async fn send_frame(&mut self, frame: Frame) {
        self.codec.buffer(frame).expect("mock peer frame rejected");
        self.flush().await;
    }

    /// Write raw bytes, bypassing the codec's validation. This is how the
    /// peer misbehaves on purpose.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.flush().await;
        self.codec
            .get_mut()
            .write_all(bytes)
            .await
            .expect("raw write failed");
    }

    async fn flush(&mut self) {
        poll_fn(|cx| self.codec.flush(cx)).await.expect("flush failed");
    }
}

/// A response HEADERS frame carrying `:status` plus the given fields.
pub fn response(stream_id: u32, status: u16, fields: &[(&str, &str)], eos: bool) -> Frame {
    let mut map = HeaderMap::new();
    for (name, value) in fields {
        map.append(
            name.parse::<http::header::HeaderName>().unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }

    let mut headers = frame::Headers::new(
        StreamId::from(stream_id),
        Pseudo::response(StatusCode::from_u16(status).unwrap()),
        map,
    );
    if eos {
        headers.set_end_stream();
    }

    headers.into()
}

/// A trailers HEADERS frame (no pseudo fields, END_STREAM set).
pub fn trailers(stream_id: u32, fields: &[(&str, &str)]) -> Frame {
    let mut map = HeaderMap::new();
    for (name, value) in fields {
        map.append(
            name.parse::<http::header::HeaderName>().unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }

    let mut headers = frame::Headers::new(StreamId::from(stream_id), Pseudo::default(), map);
    headers.set_end_stream();
    headers.into()
}

/// A DATA frame.
pub fn data(stream_id: u32, payload: &'static [u8], eos: bool) -> Frame {
    let mut frame = frame::Data::new(StreamId::from(stream_id), Bytes::from_static(payload));
    frame.set_end_stream(eos);
    frame.into()
}

/// A WINDOW_UPDATE frame.
pub fn window_update(stream_id: u32, increment: u32) -> Frame {
    frame::WindowUpdate::new(StreamId::from(stream_id), increment).into()
}

/// The 9-byte header of a raw frame.
pub fn raw_head(len: usize, kind: u8, flags: u8, stream_id: u32) -> Vec<u8> {
    vec![
        (len >> 16) as u8,
        (len >> 8) as u8,
        len as u8,
        kind,
        flags,
        (stream_id >> 24) as u8,
        (stream_id >> 16) as u8,
        (stream_id >> 8) as u8,
        stream_id as u8,
    ]
}
