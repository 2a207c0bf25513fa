mod support;

use support::*;

use h2_client::client::Client;
use h2_client::frame::Frame;
use h2_client::transport::{mock, Alpn, Connect, ConnectFuture, Connected, Origin};
use h2_client::{Config, Error, Reason};

use bytes::Bytes;
use http::Request;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Hands out in-memory transports; the peer end is served by a canned
/// HTTP/2 responder.
struct MockConnector {
    connects: Arc<AtomicUsize>,
    alpn: Alpn,
    refuse: bool,
}

impl MockConnector {
    fn new(alpn: Alpn) -> (MockConnector, Arc<AtomicUsize>) {
        let connects = Arc::new(AtomicUsize::new(0));
        (
            MockConnector {
                connects: connects.clone(),
                alpn,
                refuse: false,
            },
            connects,
        )
    }

    fn refusing() -> (MockConnector, Arc<AtomicUsize>) {
        let connects = Arc::new(AtomicUsize::new(0));
        (
            MockConnector {
                connects: connects.clone(),
                alpn: Alpn::H2,
                refuse: true,
            },
            connects,
        )
    }
}

impl Connect for MockConnector {
    fn connect(&self, _origin: &Origin) -> ConnectFuture {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let alpn = self.alpn;
        let refuse = self.refuse;

        Box::pin(async move {
            if refuse {
                return Err(Error::from(Reason::INTERNAL_ERROR));
            }

            let (io, peer) = mock::pair();
            tokio::spawn(serve(peer));
            Ok(Connected::new(io, alpn))
        })
    }
}

/// Answers every request with `200 pooled`.
async fn serve(peer: mock::Mock) {
    let mut srv = MockServer::accept(peer).await;

    loop {
        match srv.try_recv_frame().await {
            Some(Frame::Headers(headers)) => {
                let id = u32::from(headers.stream_id());
                srv.send_frame(response(id, 200, &[], false)).await;
                srv.send_frame(data(id, b"pooled", true)).await;
            }
            Some(_) => {}
            None => return,
        }
    }
}

fn get(uri: &str) -> Request<Bytes> {
    Request::builder().uri(uri).body(Bytes::new()).unwrap()
}

#[tokio::test]
async fn requests_reuse_the_pooled_connection() {
    let (connector, connects) = MockConnector::new(Alpn::H2);
    let client = Client::with_connector(Arc::new(connector), Config::default());

    for _ in 0..3 {
        let response = client.request(get("https://example.com/")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.body().as_ref(), b"pooled");
    }

    assert_eq!(connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_origins_get_distinct_connections() {
    let (connector, connects) = MockConnector::new(Alpn::H2);
    let client = Client::with_connector(Arc::new(connector), Config::default());

    client.request(get("https://a.example.com/")).await.unwrap();
    client.request(get("https://b.example.com/")).await.unwrap();
    client.request(get("https://a.example.com/")).await.unwrap();

    assert_eq!(connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn breaker_opens_after_repeated_connect_failures() {
    let (connector, connects) = MockConnector::refusing();
    let mut config = Config::default();
    config.circuit_breaker_failure_threshold = 3;
    let client = Client::with_connector(Arc::new(connector), config);

    for _ in 0..3 {
        let err = client.request(get("https://down.example.com/")).await.unwrap_err();
        assert!(!err.is_circuit_open());
    }

    // The breaker now refuses locally, without dialing.
    let err = client.request(get("https://down.example.com/")).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(connects.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn cleartext_origins_require_prior_knowledge() {
    let (connector, connects) = MockConnector::new(Alpn::H2);
    let client = Client::with_connector(Arc::new(connector), Config::default());

    let err = client.request(get("http://example.com/")).await.unwrap_err();
    assert_eq!(err.reason(), Some(Reason::HTTP_1_1_REQUIRED));
    // The negotiator failed fast; nothing was dialed.
    assert_eq!(connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn prior_knowledge_enables_cleartext_h2() {
    let (connector, _connects) = MockConnector::new(Alpn::H2);
    let mut config = Config::default();
    config.h2_prior_knowledge = true;
    let client = Client::with_connector(Arc::new(connector), config);

    let response = client.request(get("http://example.com/")).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn http11_alpn_outcome_is_memoized() {
    let (connector, connects) = MockConnector::new(Alpn::Http11);
    let mut config = Config::default();
    // Keep the breaker out of the way for this test.
    config.circuit_breaker_enabled = false;
    let client = Client::with_connector(Arc::new(connector), config);

    let err = client.request(get("https://old.example.com/")).await.unwrap_err();
    assert_eq!(err.reason(), Some(Reason::HTTP_1_1_REQUIRED));
    assert_eq!(connects.load(Ordering::SeqCst), 1);

    // The memo answers the second request without another dial.
    let err = client.request(get("https://old.example.com/")).await.unwrap_err();
    assert_eq!(err.reason(), Some(Reason::HTTP_1_1_REQUIRED));
    assert_eq!(connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn slow_responses_hit_the_request_deadline() {
    struct BlackHole;

    impl Connect for BlackHole {
        fn connect(&self, _origin: &Origin) -> ConnectFuture {
            Box::pin(async move {
                let (io, peer) = mock::pair();
                // Accept the connection but never answer requests.
                tokio::spawn(async move {
                    let mut srv = MockServer::accept(peer).await;
                    while srv.try_recv_frame().await.is_some() {}
                });
                Ok(Connected::new(io, Alpn::H2))
            })
        }
    }

    let mut config = Config::default();
    config.default_timeout = Duration::from_millis(100);
    let client = Client::with_connector(Arc::new(BlackHole), config);

    let err = client.request(get("https://slow.example.com/")).await.unwrap_err();
    assert!(err.is_timeout());
}
