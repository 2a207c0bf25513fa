mod support;

use support::*;

use h2_client::client;
use h2_client::frame::{Frame, Reason, StreamId};
use h2_client::transport::mock;
use h2_client::Trailers;

use bytes::Bytes;
use http::{Method, Request, StatusCode};

fn get(uri: &str) -> Request<Bytes> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Bytes::new())
        .unwrap()
}

#[tokio::test]
async fn basic_get() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    let connection = tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let resp = h2.send_request(get("https://example.com/")).unwrap();

    let frame = srv.recv_frame().await;
    let headers = match frame {
        Frame::Headers(headers) => headers,
        other => panic!("expected HEADERS, got {:?}", other),
    };

    assert_eq!(headers.stream_id(), StreamId::from(1));
    assert!(headers.is_end_headers());
    assert!(headers.is_end_stream());

    let (pseudo, _fields) = headers.into_parts();
    assert_eq!(pseudo.method, Some(Method::GET));
    assert_eq!(pseudo.scheme.as_deref(), Some("https"));
    assert_eq!(pseudo.path.as_deref(), Some("/"));
    assert_eq!(pseudo.authority.as_deref(), Some("example.com"));

    srv.send_frame(response(1, 200, &[("content-type", "text/plain")], false))
        .await;
    srv.send_frame(data(1, b"OK", true)).await;

    let response = resp.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.version(), http::Version::HTTP_2);
    assert_eq!(response.headers().get("content-type").unwrap(), "text/plain");
    assert_eq!(response.body().as_ref(), b"OK");

    drop(h2);
    drop(srv);
    let _ = connection.await;
}

#[tokio::test]
async fn concurrent_streams_resolve_independently() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let resp1 = h2.send_request(get("https://example.com/a")).unwrap();
    let resp3 = h2.send_request(get("https://example.com/b")).unwrap();
    let resp5 = h2.send_request(get("https://example.com/c")).unwrap();

    // Stream ids are odd and hit the wire in ascending order.
    let mut seen = Vec::new();
    for _ in 0..3 {
        match srv.recv_frame().await {
            Frame::Headers(headers) => seen.push(u32::from(headers.stream_id())),
            other => panic!("expected HEADERS, got {:?}", other),
        }
    }
    assert_eq!(seen, vec![1, 3, 5]);

    // Responses interleave: 3 first, then 1, then 5.
    srv.send_frame(response(3, 200, &[], false)).await;
    srv.send_frame(data(3, b"three", true)).await;
    srv.send_frame(response(1, 200, &[], false)).await;
    srv.send_frame(data(1, b"one", true)).await;
    srv.send_frame(response(5, 200, &[], false)).await;
    srv.send_frame(data(5, b"five", true)).await;

    assert_eq!(resp1.await.unwrap().body().as_ref(), b"one");
    assert_eq!(resp3.await.unwrap().body().as_ref(), b"three");
    assert_eq!(resp5.await.unwrap().body().as_ref(), b"five");
}

#[tokio::test]
async fn request_body_rides_in_data_frames() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("https://example.com/upload")
        .body(Bytes::from_static(b"hello body"))
        .unwrap();
    let resp = h2.send_request(request).unwrap();

    match srv.recv_frame().await {
        Frame::Headers(headers) => {
            // END_STREAM belongs to the final DATA frame here.
            assert!(!headers.is_end_stream());
        }
        other => panic!("expected HEADERS, got {:?}", other),
    }

    match srv.recv_frame().await {
        Frame::Data(data) => {
            assert_eq!(data.payload().as_ref(), b"hello body");
            assert!(data.is_end_stream());
        }
        other => panic!("expected DATA, got {:?}", other),
    }

    srv.send_frame(response(1, 204, &[], true)).await;

    let response = resp.await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.body().is_empty());
}

#[tokio::test]
async fn trailers_surface_in_response_extensions() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let resp = h2.send_request(get("https://example.com/")).unwrap();
    srv.recv_frame().await;

    srv.send_frame(response(1, 200, &[], false)).await;
    srv.send_frame(data(1, b"payload", false)).await;
    srv.send_frame(trailers(1, &[("grpc-status", "0")])).await;

    let response = resp.await.unwrap();
    assert_eq!(response.body().as_ref(), b"payload");

    let trailers = response.extensions().get::<Trailers>().expect("trailers");
    assert_eq!(trailers.0.get("grpc-status").unwrap(), "0");
}

#[tokio::test]
async fn dropping_the_response_future_cancels_the_stream() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let resp = h2.send_request(get("https://example.com/")).unwrap();
    srv.recv_frame().await;

    drop(resp);

    match srv.recv_frame().await {
        Frame::Reset(reset) => {
            assert_eq!(reset.stream_id(), StreamId::from(1));
            assert_eq!(reset.reason(), Reason::CANCEL);
        }
        other => panic!("expected RST_STREAM, got {:?}", other),
    }

    // The connection is still usable afterwards.
    let resp = h2.send_request(get("https://example.com/again")).unwrap();
    match srv.recv_frame().await {
        Frame::Headers(headers) => assert_eq!(headers.stream_id(), StreamId::from(3)),
        other => panic!("expected HEADERS, got {:?}", other),
    }
    srv.send_frame(response(3, 200, &[], true)).await;
    assert_eq!(resp.await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn rst_stream_fails_only_its_stream() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let resp1 = h2.send_request(get("https://example.com/a")).unwrap();
    let resp3 = h2.send_request(get("https://example.com/b")).unwrap();
    srv.recv_frame().await;
    srv.recv_frame().await;

    srv.send_frame(h2_client::frame::Reset::new(StreamId::from(1), Reason::REFUSED_STREAM).into())
        .await;

    let err = resp1.await.unwrap_err();
    assert!(err.is_reset());
    assert!(err.is_remote());
    assert!(err.is_refused_stream());

    srv.send_frame(response(3, 200, &[], true)).await;
    assert_eq!(resp3.await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn ping_measures_round_trip() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let ping = h2.ping().unwrap();

    let payload = match srv.recv_frame().await {
        Frame::Ping(ping) => {
            assert!(!ping.is_ack());
            *ping.payload()
        }
        other => panic!("expected PING, got {:?}", other),
    };

    srv.send_frame(h2_client::frame::Ping::pong(payload).into())
        .await;

    let rtt = ping.await.unwrap();
    assert!(rtt <= std::time::Duration::from_secs(5));
}

#[tokio::test]
async fn peer_pings_are_acknowledged() {
    let (io, peer) = mock::pair();

    let (_h2, connection) = client::handshake(io).await.unwrap();
    tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    srv.send_frame(h2_client::frame::Ping::new(*b"feedbeef").into())
        .await;

    match srv.recv_frame().await {
        Frame::Ping(pong) => {
            assert!(pong.is_ack());
            assert_eq!(pong.payload(), b"feedbeef");
        }
        other => panic!("expected PING ACK, got {:?}", other),
    }
}

#[tokio::test]
async fn connection_specific_headers_are_rejected_before_emission() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    tokio::spawn(connection);
    let _srv = MockServer::accept(peer).await;

    for (name, value) in [
        ("connection", "keep-alive"),
        ("keep-alive", "timeout=5"),
        ("proxy-connection", "keep-alive"),
        ("transfer-encoding", "chunked"),
        ("upgrade", "websocket"),
        ("te", "gzip"),
    ] {
        let request = Request::builder()
            .uri("https://example.com/")
            .header(name, value)
            .body(Bytes::new())
            .unwrap();

        let err = h2.send_request(request).unwrap_err();
        assert!(err.to_string().contains("malformed"), "header {}", name);
    }

    // `te: trailers` is the one allowed TE value.
    let request = Request::builder()
        .uri("https://example.com/")
        .header("te", "trailers")
        .body(Bytes::new())
        .unwrap();
    assert!(h2.send_request(request).is_ok());
}

#[tokio::test]
async fn authority_value_case_is_preserved() {
    let (io, peer) = mock::pair();

    let (mut h2, connection) = client::handshake(io).await.unwrap();
    tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    let _resp = h2.send_request(get("https://Example.COM/")).unwrap();

    match srv.recv_frame().await {
        Frame::Headers(headers) => {
            let (pseudo, _) = headers.into_parts();
            assert_eq!(pseudo.authority.as_deref(), Some("Example.COM"));
        }
        other => panic!("expected HEADERS, got {:?}", other),
    }
}

#[tokio::test]
async fn graceful_close_sends_goaway_and_finishes() {
    let (io, peer) = mock::pair();

    let (h2, connection) = client::handshake(io).await.unwrap();
    let connection = tokio::spawn(connection);

    let mut srv = MockServer::accept(peer).await;

    h2.graceful_close();

    match srv.recv_frame().await {
        Frame::GoAway(goaway) => {
            assert_eq!(goaway.reason(), Reason::NO_ERROR);
        }
        other => panic!("expected GOAWAY, got {:?}", other),
    }

    srv.recv_eof().await;
    connection.await.unwrap().unwrap();
}
