//! Per-origin protocol negotiation.
//!
//! HTTPS origins are decided by the TLS connector's ALPN result; cleartext
//! origins speak h2c only in prior-knowledge mode. The deprecated
//! `Upgrade: h2c` mechanism (RFC 9113 § 3.2) is never used. Outcomes are
//! memoized per origin so later requests skip the decision.

use crate::error::Error;
use crate::frame::Reason;
use crate::transport::{Origin, Scheme};

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The protocol selected for an origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// HTTP/2 over TLS, selected by ALPN.
    H2,
    /// Cleartext HTTP/2 by prior knowledge.
    H2c,
    /// The peer only speaks HTTP/1.1; this client hands the origin back to
    /// the embedder's HTTP/1.1 stack.
    H11,
}

#[derive(Debug, Clone, Copy)]
struct Memo {
    protocol: Protocol,
    decided_at: Instant,
}

/// Memoizes per-origin protocol outcomes with a TTL.
#[derive(Debug)]
pub struct Negotiator {
    memo: Mutex<HashMap<Origin, Memo>>,
    ttl: Duration,
}

impl Negotiator {
    pub fn new(ttl: Duration) -> Negotiator {
        Negotiator {
            memo: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// The memoized protocol for `origin`, if still fresh.
    pub fn lookup(&self, origin: &Origin) -> Option<Protocol> {
        let memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());

        memo.get(origin).and_then(|entry| {
            if entry.decided_at.elapsed() < self.ttl {
                Some(entry.protocol)
            } else {
                None
            }
        })
    }

    /// Record a negotiation outcome.
    pub fn record(&self, origin: &Origin, protocol: Protocol) {
        let mut memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());

        memo.insert(
            origin.clone(),
            Memo {
                protocol,
                decided_at: Instant::now(),
            },
        );
    }

    /// Decide whether dialing `origin` can possibly yield an h2 transport.
    ///
    /// Fails fast without touching the wire when the answer is known to be
    /// no: a cleartext origin without prior knowledge (Upgrade is never
    /// sent), or a memoized http/1.1-only peer.
    pub fn plan(&self, origin: &Origin, prior_knowledge: bool) -> Result<(), Error> {
        match origin.scheme {
            Scheme::Http => {
                if prior_knowledge {
                    Ok(())
                } else {
                    tracing::debug!(
                        "cleartext origin without prior knowledge; origin={}",
                        origin
                    );
                    Err(Reason::HTTP_1_1_REQUIRED.into())
                }
            }
            Scheme::Https => match self.lookup(origin) {
                Some(Protocol::H11) => Err(Reason::HTTP_1_1_REQUIRED.into()),
                _ => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(scheme: Scheme) -> Origin {
        Origin::new(scheme, "example.com", scheme.default_port())
    }

    #[test]
    fn cleartext_requires_prior_knowledge() {
        let negotiator = Negotiator::new(Duration::from_secs(60));

        assert!(negotiator.plan(&origin(Scheme::Http), true).is_ok());

        let err = negotiator.plan(&origin(Scheme::Http), false).unwrap_err();
        assert_eq!(err.reason(), Some(Reason::HTTP_1_1_REQUIRED));
    }

    #[test]
    fn memoized_h11_fails_fast() {
        let negotiator = Negotiator::new(Duration::from_secs(60));
        let origin = origin(Scheme::Https);

        assert!(negotiator.plan(&origin, false).is_ok());

        negotiator.record(&origin, Protocol::H11);
        let err = negotiator.plan(&origin, false).unwrap_err();
        assert_eq!(err.reason(), Some(Reason::HTTP_1_1_REQUIRED));
    }

    #[test]
    fn memo_expires_after_ttl() {
        let negotiator = Negotiator::new(Duration::from_millis(0));
        let origin = origin(Scheme::Https);

        negotiator.record(&origin, Protocol::H11);
        // With a zero TTL the memo is immediately stale.
        assert_eq!(negotiator.lookup(&origin), None);
        assert!(negotiator.plan(&origin, false).is_ok());
    }

    #[test]
    fn h2_memo_is_returned_while_fresh() {
        let negotiator = Negotiator::new(Duration::from_secs(60));
        let origin = origin(Scheme::Https);

        negotiator.record(&origin, Protocol::H2);
        assert_eq!(negotiator.lookup(&origin), Some(Protocol::H2));
    }
}
