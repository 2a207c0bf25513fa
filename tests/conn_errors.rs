mod support;

use support::*;

use h2_client::client;
use h2_client::frame::{self, Frame, Reason, StreamId};
use h2_client::transport::mock;

use bytes::Bytes;
use http::Request;

fn get(uri: &str) -> Request<Bytes> {
    Request::builder().uri(uri).body(Bytes::new()).unwrap()
}

#[tokio::test]
async fn oversized_data_frame_is_a_frame_size_error() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    let connection = tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let resp = h2.send_request(get("https://example.com/")).unwrap();
    srv.recv_frame().await;

    // One byte past the advertised MAX_FRAME_SIZE.
    let mut raw = raw_head(16_385, 0, 0, 1);
    raw.extend(std::iter::repeat(0u8).take(16_385));
    srv.send_raw(&raw).await;

    match srv.recv_frame().await {
        Frame::GoAway(goaway) => {
            assert_eq!(goaway.reason(), Reason::FRAME_SIZE_ERROR);
        }
        other => panic!("expected GOAWAY, got {:?}", other),
    }
    srv.recv_eof().await;

    // The in-flight stream fails with the connection.
    let err = resp.await.unwrap_err();
    assert_eq!(err.reason(), Some(Reason::FRAME_SIZE_ERROR));

    let err = connection.await.unwrap().unwrap_err();
    assert_eq!(err.reason(), Some(Reason::FRAME_SIZE_ERROR));
}

#[tokio::test]
async fn settings_ack_with_payload_is_a_frame_size_error() {
    let (io, peer) = mock::pair();

    let (_h2, connection) = client::handshake(io).await.unwrap();
    let connection = tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    // SETTINGS with the ACK flag and a 6 byte payload.
    let mut raw = raw_head(6, 4, 0x1, 0);
    raw.extend_from_slice(&[0, 3, 0, 0, 0, 100]);
    srv.send_raw(&raw).await;

    match srv.recv_frame().await {
        Frame::GoAway(goaway) => {
            assert_eq!(goaway.reason(), Reason::FRAME_SIZE_ERROR);
        }
        other => panic!("expected GOAWAY, got {:?}", other),
    }

    let err = connection.await.unwrap().unwrap_err();
    assert_eq!(err.reason(), Some(Reason::FRAME_SIZE_ERROR));
}

#[tokio::test]
async fn continuation_flood_is_contained() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    let connection = tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let resp = h2.send_request(get("https://example.com/")).unwrap();
    srv.recv_frame().await;

    // HEADERS without END_HEADERS opens a continuation sequence...
    let mut raw = raw_head(1, 1, 0, 1);
    raw.push(0x88);
    srv.send_raw(&raw).await;

    // ...and the peer never finishes it.
    for _ in 0..11 {
        let mut raw = raw_head(1, 9, 0, 1);
        raw.push(0x86);
        srv.send_raw(&raw).await;
    }

    match srv.recv_frame().await {
        Frame::GoAway(goaway) => {
            assert_eq!(goaway.reason(), Reason::PROTOCOL_ERROR);
            let debug = String::from_utf8_lossy(goaway.debug_data()).to_string();
            assert!(debug.contains("flood"), "debug data: {:?}", debug);
        }
        other => panic!("expected GOAWAY, got {:?}", other),
    }

    assert!(resp.await.is_err());
    assert!(connection.await.unwrap().is_err());
}

#[tokio::test]
async fn interleaved_frame_during_continuation_is_a_protocol_error() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    let connection = tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let _resp = h2.send_request(get("https://example.com/")).unwrap();
    srv.recv_frame().await;

    // Open a continuation sequence, then interleave a PING.
    let mut raw = raw_head(1, 1, 0, 1);
    raw.push(0x88);
    srv.send_raw(&raw).await;

    let mut raw = raw_head(8, 6, 0, 0);
    raw.extend_from_slice(b"12345678");
    srv.send_raw(&raw).await;

    match srv.recv_frame().await {
        Frame::GoAway(goaway) => {
            assert_eq!(goaway.reason(), Reason::PROTOCOL_ERROR);
        }
        other => panic!("expected GOAWAY, got {:?}", other),
    }

    assert!(connection.await.unwrap().is_err());
}

#[tokio::test]
async fn push_promise_is_rejected() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    let connection = tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let _resp = h2.send_request(get("https://example.com/")).unwrap();
    srv.recv_frame().await;

    // PUSH_PROMISE for stream 2 on stream 1; push is always disabled.
    let mut raw = raw_head(5, 5, 0x4, 1);
    raw.extend_from_slice(&[0, 0, 0, 2, 0x88]);
    srv.send_raw(&raw).await;

    match srv.recv_frame().await {
        Frame::GoAway(goaway) => {
            assert_eq!(goaway.reason(), Reason::PROTOCOL_ERROR);
        }
        other => panic!("expected GOAWAY, got {:?}", other),
    }

    assert!(connection.await.unwrap().is_err());
}

#[tokio::test]
async fn headers_on_an_idle_stream_is_a_protocol_error() {
    let (io, peer) = mock::pair();

    let (_h2, connection) = client::handshake(io).await.unwrap();
    let connection = tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    // The client never opened stream 1.
    srv.send_frame(response(1, 200, &[], true)).await;

    match srv.recv_frame().await {
        Frame::GoAway(goaway) => {
            assert_eq!(goaway.reason(), Reason::PROTOCOL_ERROR);
        }
        other => panic!("expected GOAWAY, got {:?}", other),
    }

    assert!(connection.await.unwrap().is_err());
}

#[tokio::test]
async fn goaway_refuses_streams_above_the_threshold() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    let connection = tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let resp1 = h2.send_request(get("https://example.com/a")).unwrap();
    let resp3 = h2.send_request(get("https://example.com/b")).unwrap();
    srv.recv_frame().await;
    srv.recv_frame().await;

    srv.send_frame(frame::GoAway::new(StreamId::from(1), Reason::NO_ERROR).into())
        .await;

    // Stream 3 was not processed; it fails with REFUSED_STREAM semantics.
    let err = resp3.await.unwrap_err();
    assert!(err.is_refused_stream());

    // New streams are rejected locally.
    let err = h2.send_request(get("https://example.com/c")).unwrap_err();
    assert!(err.to_string().contains("going away"));

    // Stream 1 completes normally and the connection drains cleanly.
    srv.send_frame(response(1, 200, &[], true)).await;
    assert_eq!(resp1.await.unwrap().status(), 200);

    connection.await.unwrap().unwrap();
}

#[tokio::test]
async fn goaway_with_an_error_code_fails_everything() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    let connection = tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let resp = h2.send_request(get("https://example.com/")).unwrap();
    srv.recv_frame().await;

    srv.send_frame(
        frame::GoAway::with_debug_data(
            StreamId::zero(),
            Reason::ENHANCE_YOUR_CALM,
            Bytes::from_static(b"slow down"),
        )
        .into(),
    )
    .await;

    // Unprocessed streams are treated as refused (RFC 7540 § 6.8)...
    let err = resp.await.unwrap_err();
    assert!(err.is_refused_stream());
    assert!(err.is_remote());

    // ...while the connection itself surfaces the GOAWAY code.
    let err = connection.await.unwrap().unwrap_err();
    assert_eq!(err.reason(), Some(Reason::ENHANCE_YOUR_CALM));
}
