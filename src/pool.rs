//! An origin-keyed cache of live connections.
//!
//! Each entry carries a health score in `[0, 100]`. Scores start at 100,
//! gain a little on success and lose a lot on failure; slow responses cost
//! extra. Entries below the health floor, or with a high error rate, are
//! evicted on the next checkout. The pool never dials by itself: creation
//! is driven by the client, serialized per origin through [`create_lock`]
//! so concurrent callers coalesce onto a single new connection.
//!
//! [`create_lock`]: Pool::create_lock

use crate::client::SendRequest;
use crate::transport::Origin;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Score of a fresh connection.
const INITIAL_SCORE: f64 = 100.0;

/// Entries scoring below this are unhealthy.
const HEALTH_FLOOR: f64 = 30.0;

/// Reward for a successful request.
const SUCCESS_DELTA: f64 = 2.0;

/// Penalty for a failed request.
const FAILURE_DELTA: f64 = 25.0;

/// Extra penalty when a request took longer than [`SLOW_RTT`].
const SLOW_DELTA: f64 = 5.0;

const SLOW_RTT: Duration = Duration::from_secs(1);

/// Identifies a pooled entry for `release`.
#[derive(Debug)]
pub struct Token {
    origin: Origin,
    serial: u64,
}

#[derive(Debug)]
struct Entry {
    serial: u64,
    sender: SendRequest,
    created_at: Instant,
    last_used: Instant,
    request_count: u64,
    error_count: u64,
    score: f64,
}

impl Entry {
    fn is_healthy(&self) -> bool {
        if self.score < HEALTH_FLOOR {
            return false;
        }

        // A young connection gets the benefit of the doubt; after that an
        // error rate above one half is disqualifying.
        self.request_count < 10 || self.error_count * 2 <= self.request_count
    }
}

#[derive(Debug, Default)]
struct PoolState {
    entries: HashMap<Origin, Vec<Entry>>,
    creating: HashMap<Origin, Arc<tokio::sync::Mutex<()>>>,
    next_serial: u64,
}

/// The connection pool.
#[derive(Debug)]
pub(crate) struct Pool {
    state: Mutex<PoolState>,
    max_size: usize,
    idle_timeout: Duration,
}

impl Pool {
    pub fn new(max_size: usize, idle_timeout: Duration) -> Pool {
        Pool {
            state: Mutex::new(PoolState::default()),
            max_size,
            idle_timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The highest-scored healthy connection with spare capacity, if any.
    ///
    /// Dead and unhealthy entries encountered on the way are evicted.
    pub fn checkout(&self, origin: &Origin) -> Option<(SendRequest, Token)> {
        let mut state = self.lock();

        let entries = state.entries.get_mut(origin)?;

        entries.retain(|entry| {
            let keep = entry.is_healthy();
            if !keep {
                tracing::debug!(
                    "evicting unhealthy connection; origin={} score={:.0}",
                    origin,
                    entry.score
                );
                entry.sender.graceful_close();
            }
            keep
        });

        let best = entries
            .iter_mut()
            .filter(|entry| entry.sender.is_ready())
            .max_by(|a, b| a.score.total_cmp(&b.score))?;

        best.last_used = Instant::now();

        Some((
            best.sender.clone(),
            Token {
                origin: origin.clone(),
                serial: best.serial,
            },
        ))
    }

    /// The per-origin creation lock; callers hold it while dialing so a
    /// thundering herd produces one connection, not many.
    pub fn create_lock(&self, origin: &Origin) -> Arc<tokio::sync::Mutex<()>> {
        let mut state = self.lock();
        state
            .creating
            .entry(origin.clone())
            .or_default()
            .clone()
    }

    /// Insert a freshly established connection, evicting the
    /// globally-lowest score when the pool is full.
    pub fn insert(&self, origin: Origin, sender: SendRequest) -> Token {
        let mut state = self.lock();

        let total: usize = state.entries.values().map(Vec::len).sum();
        if total >= self.max_size {
            evict_worst(&mut state);
        }

        state.next_serial += 1;
        let serial = state.next_serial;
        let now = Instant::now();

        state.entries.entry(origin.clone()).or_default().push(Entry {
            serial,
            sender,
            created_at: now,
            last_used: now,
            request_count: 0,
            error_count: 0,
            score: INITIAL_SCORE,
        });

        tracing::debug!("pooled new connection; origin={}", origin);

        Token { origin, serial }
    }

    /// Record a request outcome against the entry's health score.
    pub fn release(&self, token: Token, success: bool, rtt: Duration) {
        let mut state = self.lock();

        let Some(entries) = state.entries.get_mut(&token.origin) else {
            return;
        };
        let Some(entry) = entries.iter_mut().find(|e| e.serial == token.serial) else {
            // Evicted while the request was in flight.
            return;
        };

        entry.request_count += 1;
        entry.last_used = Instant::now();

        if success {
            entry.score = (entry.score + SUCCESS_DELTA).min(INITIAL_SCORE);
        } else {
            entry.error_count += 1;
            entry.score -= FAILURE_DELTA;
        }

        if rtt > SLOW_RTT {
            entry.score -= SLOW_DELTA;
        }

        entry.score = entry.score.max(0.0);

        tracing::trace!(
            "released connection; origin={} success={} rtt={:?} score={:.0}",
            token.origin,
            success,
            rtt,
            entry.score
        );
    }

    /// Close connections idle past the TTL.
    pub fn cleanup_expired(&self) {
        let idle_timeout = self.idle_timeout;
        let mut state = self.lock();

        for (origin, entries) in state.entries.iter_mut() {
            entries.retain(|entry| {
                let expired =
                    entry.sender.active_streams() == 0 && entry.last_used.elapsed() > idle_timeout;
                if expired {
                    tracing::debug!(
                        "closing idle connection; origin={} age={:?}",
                        origin,
                        entry.created_at.elapsed()
                    );
                    entry.sender.graceful_close();
                }
                !expired
            });
        }

        state.entries.retain(|_, entries| !entries.is_empty());
    }

}

fn evict_worst(state: &mut PoolState) {
    let mut worst: Option<(Origin, u64, f64)> = None;

    for (origin, entries) in state.entries.iter() {
        for entry in entries {
            let is_worse = match worst {
                Some((_, _, score)) => entry.score < score,
                None => true,
            };
            if is_worse {
                worst = Some((origin.clone(), entry.serial, entry.score));
            }
        }
    }

    if let Some((origin, serial, score)) = worst {
        tracing::debug!(
            "pool full; evicting lowest-scored connection; origin={} score={:.0}",
            origin,
            score
        );

        if let Some(entries) = state.entries.get_mut(&origin) {
            if let Some(pos) = entries.iter().position(|e| e.serial == serial) {
                let entry = entries.remove(pos);
                entry.sender.graceful_close();
            }
            if entries.is_empty() {
                state.entries.remove(&origin);
            }
        }
    }
}
