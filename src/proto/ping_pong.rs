use crate::codec::Codec;
use crate::frame::Ping;
use crate::proto::{Error, Streams};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use std::collections::{HashMap, VecDeque};
use std::task::{ready, Context, Poll};
use std::time::{Duration, Instant};

/// Acknowledges ping requests from the remote and measures round-trip
/// times for pings we originate.
///
/// > Receivers of a PING frame that does not include an ACK flag MUST send
/// > a PING frame with the ACK flag set in response, with an identical
/// > payload. PING responses SHOULD be given higher priority than any
/// > other frame.
#[derive(Debug, Default)]
pub(crate) struct PingPong {
    /// Pongs owed to the peer, in arrival order.
    pending_pongs: VecDeque<[u8; 8]>,

    /// User pings accepted but not yet written.
    pending_user: VecDeque<oneshot::Sender<Duration>>,

    /// In-flight pings by payload, with their send timestamps.
    sent: HashMap<[u8; 8], (Instant, oneshot::Sender<Duration>)>,

    /// Source of unique ping payloads.
    counter: u64,
}

impl PingPong {
    pub(crate) fn new() -> Self {
        PingPong::default()
    }

    /// Handle an inbound PING.
    pub(crate) fn recv_ping(&mut self, ping: Ping) {
        if ping.is_ack() {
            match self.sent.remove(ping.payload()) {
                Some((sent_at, tx)) => {
                    let rtt = sent_at.elapsed();
                    tracing::trace!("recv PING ACK; rtt={:?}", rtt);
                    let _ = tx.send(rtt);
                }
                None => {
                    // Unsolicited ACKs are ignored per RFC 7540 § 6.7.
                    tracing::trace!("recv PING ACK with unknown payload");
                }
            }
        } else {
            self.pending_pongs.push_back(ping.into_payload());
        }
    }

    /// Write owed pongs and queued user pings.
    pub(crate) fn poll_send<T>(
        &mut self,
        cx: &mut Context,
        codec: &mut Codec<T>,
        streams: &Streams,
    ) -> Poll<Result<(), Error>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(&payload) = self.pending_pongs.front() {
            ready!(codec.poll_ready(cx)).map_err(Error::from)?;

            codec
                .buffer(Ping::pong(payload).into())
                .expect("invalid PING frame");
            self.pending_pongs.pop_front();
        }

        // Collect newly requested user pings.
        while let Some(tx) = streams.take_user_ping() {
            self.pending_user.push_back(tx);
        }

        while !self.pending_user.is_empty() {
            ready!(codec.poll_ready(cx)).map_err(Error::from)?;

            let tx = self.pending_user.pop_front().expect("checked non-empty");
            let payload = self.next_payload();

            codec
                .buffer(Ping::new(payload).into())
                .expect("invalid PING frame");
            self.sent.insert(payload, (Instant::now(), tx));
        }

        Poll::Ready(Ok(()))
    }

    fn next_payload(&mut self) -> [u8; 8] {
        self.counter = self.counter.wrapping_add(1);
        self.counter.to_be_bytes()
    }
}
