mod support;

use support::*;

use h2_client::client;
use h2_client::frame::{Frame, Reason, StreamId};
use h2_client::transport::mock;

use bytes::Bytes;
use http::{Method, Request, StatusCode};

fn get(uri: &str) -> Request<Bytes> {
    Request::builder().uri(uri).body(Bytes::new()).unwrap()
}

#[tokio::test]
async fn zero_window_update_resets_the_stream_only() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let resp = h2.send_request(get("https://example.com/")).unwrap();
    srv.recv_frame().await;

    srv.send_frame(window_update(1, 0)).await;

    match srv.recv_frame().await {
        Frame::Reset(reset) => {
            assert_eq!(reset.stream_id(), StreamId::from(1));
            assert_eq!(reset.reason(), Reason::PROTOCOL_ERROR);
        }
        other => panic!("expected RST_STREAM, got {:?}", other),
    }

    let err = resp.await.unwrap_err();
    assert!(err.is_reset());
    assert_eq!(err.reason(), Some(Reason::PROTOCOL_ERROR));

    // The connection stays open: a second request succeeds.
    let resp = h2.send_request(get("https://example.com/again")).unwrap();
    srv.recv_frame().await;
    srv.send_frame(response(3, 200, &[], true)).await;
    assert_eq!(resp.await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn zero_window_update_on_the_connection_is_fatal() {
    let (io, peer) = mock::pair();

    let (_h2, connection) = client::handshake(io).await.unwrap();
    let connection = tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    srv.send_frame(window_update(0, 0)).await;

    match srv.recv_frame().await {
        Frame::GoAway(goaway) => {
            assert_eq!(goaway.reason(), Reason::PROTOCOL_ERROR);
        }
        other => panic!("expected GOAWAY, got {:?}", other),
    }

    assert!(connection.await.unwrap().is_err());
}

#[tokio::test]
async fn window_update_overflow_is_a_flow_control_error() {
    let (io, peer) = mock::pair();

    let (_h2, connection) = client::handshake(io).await.unwrap();
    let connection = tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    // 65_535 (initial) + 2^31-1 overflows the connection send window.
    srv.send_frame(window_update(0, (1 << 31) - 1)).await;

    match srv.recv_frame().await {
        Frame::GoAway(goaway) => {
            assert_eq!(goaway.reason(), Reason::FLOW_CONTROL_ERROR);
        }
        other => panic!("expected GOAWAY, got {:?}", other),
    }

    assert!(connection.await.unwrap().is_err());
}

#[tokio::test]
async fn received_data_triggers_window_refills_connection_first() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let resp = h2.send_request(get("https://example.com/big")).unwrap();
    srv.recv_frame().await;

    srv.send_frame(response(1, 200, &[], false)).await;

    // Three full frames take both windows from 65_535 down to 16_383,
    // crossing the half-way refill threshold on the third.
    static PAYLOAD: [u8; 16_384] = [0u8; 16_384];
    for _ in 0..3 {
        srv.send_frame(data(1, &PAYLOAD, false)).await;
    }

    match srv.recv_frame().await {
        Frame::WindowUpdate(wu) => {
            assert_eq!(wu.stream_id(), StreamId::zero());
            assert_eq!(wu.size_increment(), 49_152);
        }
        other => panic!("expected connection WINDOW_UPDATE, got {:?}", other),
    }

    match srv.recv_frame().await {
        Frame::WindowUpdate(wu) => {
            assert_eq!(wu.stream_id(), StreamId::from(1));
            assert_eq!(wu.size_increment(), 49_152);
        }
        other => panic!("expected stream WINDOW_UPDATE, got {:?}", other),
    }

    srv.send_frame(data(1, b"tail", true)).await;

    let response = resp.await.unwrap();
    assert_eq!(response.body().len(), 49_152 + 4);
}

#[tokio::test]
async fn sending_pauses_until_the_peer_opens_the_window() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let body: Bytes = vec![7u8; 100_000].into();
    let request = Request::builder()
        .method(Method::POST)
        .uri("https://example.com/upload")
        .body(body)
        .unwrap();
    let resp = h2.send_request(request).unwrap();

    match srv.recv_frame().await {
        Frame::Headers(headers) => assert!(!headers.is_end_stream()),
        other => panic!("expected HEADERS, got {:?}", other),
    }

    // The peer's initial window admits exactly 65_535 bytes, in frames no
    // larger than MAX_FRAME_SIZE.
    let mut received = 0usize;
    while received < 65_535 {
        match srv.recv_frame().await {
            Frame::Data(data) => {
                assert!(data.payload_len() <= 16_384);
                assert!(!data.is_end_stream());
                received += data.payload_len();
            }
            other => panic!("expected DATA, got {:?}", other),
        }
    }
    assert_eq!(received, 65_535);

    // Open both windows; the remainder (with END_STREAM) follows.
    srv.send_frame(window_update(0, 65_535)).await;
    srv.send_frame(window_update(1, 65_535)).await;

    let mut eos = false;
    while !eos {
        match srv.recv_frame().await {
            Frame::Data(data) => {
                received += data.payload_len();
                eos = data.is_end_stream();
            }
            other => panic!("expected DATA, got {:?}", other),
        }
    }
    assert_eq!(received, 100_000);

    srv.send_frame(response(1, 204, &[], true)).await;
    assert_eq!(resp.await.unwrap().status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn peer_overrunning_the_stream_window_is_a_stream_error() {
    let (io, peer) = mock::pair();

    // Advertise a tiny per-stream receive window.
    let mut builder = client::Builder::new();
    builder.initial_window_size(100);
    let (mut h2, connection) = builder.handshake(io).await.unwrap();
    tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let resp = h2.send_request(get("https://example.com/")).unwrap();
    srv.recv_frame().await;

    srv.send_frame(response(1, 200, &[], false)).await;

    // 200 bytes against a 100 byte stream window.
    static PAYLOAD: [u8; 200] = [0u8; 200];
    srv.send_frame(data(1, &PAYLOAD, false)).await;

    match srv.recv_frame().await {
        Frame::Reset(reset) => {
            assert_eq!(reset.stream_id(), StreamId::from(1));
            assert_eq!(reset.reason(), Reason::FLOW_CONTROL_ERROR);
        }
        other => panic!("expected RST_STREAM, got {:?}", other),
    }

    let err = resp.await.unwrap_err();
    assert_eq!(err.reason(), Some(Reason::FLOW_CONTROL_ERROR));
}
