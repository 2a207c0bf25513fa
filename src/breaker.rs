//! Per-origin circuit breakers.
//!
//! A breaker transitions Closed → Open after a run of consecutive
//! failures, refuses calls while Open, and lets a single probe through
//! once the recovery timeout elapses (HalfOpen). The probe's outcome
//! decides between snapping shut again and reopening for traffic. State
//! can optionally be persisted across restarts as a small JSON document.

use crate::error::Error;

use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Traffic flows normally.
    Closed,
    /// Calls are refused locally.
    Open,
    /// One probe request is allowed through.
    HalfOpen,
}

impl BreakerState {
    fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }

    fn from_str(s: &str) -> Option<BreakerState> {
        match s {
            "closed" => Some(BreakerState::Closed),
            "open" => Some(BreakerState::Open),
            "half_open" => Some(BreakerState::HalfOpen),
            _ => None,
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker tuning knobs.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before probing.
    pub recovery_timeout: Duration,
    /// Optional deadline applied by [`CircuitBreaker::execute`].
    pub call_timeout: Option<Duration>,
}

impl Default for BreakerConfig {
    fn default() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            call_timeout: None,
        }
    }
}

/// A snapshot of breaker counters, persisted verbatim as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: String,
    pub consecutive_failures: u32,
    pub failure_count: u64,
    pub success_count: u64,
    pub total_requests: u64,
    /// Seconds since the Unix epoch, set while the breaker is open.
    pub opened_at: Option<u64>,
}

/// Storage for breaker snapshots.
pub trait BreakerStore: Send + Sync {
    fn load(&self, name: &str) -> Option<BreakerSnapshot>;
    fn store(&self, snapshot: &BreakerSnapshot);
}

/// Keeps snapshots in process memory; the default.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    snapshots: Mutex<HashMap<String, BreakerSnapshot>>,
}

impl BreakerStore for InMemoryStore {
    fn load(&self, name: &str) -> Option<BreakerSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    fn store(&self, snapshot: &BreakerSnapshot) {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(snapshot.name.clone(), snapshot.clone());
    }
}

/// One JSON file per breaker under a directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> FileStore {
        FileStore { dir: dir.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        // Origins contain `/` and `:`; keep the file name flat.
        let safe: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl BreakerStore for FileStore {
    fn load(&self, name: &str) -> Option<BreakerSnapshot> {
        let bytes = std::fs::read(self.path(name)).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::debug!("discarding corrupt breaker snapshot; name={} err={}", name, e);
                None
            }
        }
    }

    fn store(&self, snapshot: &BreakerSnapshot) {
        let _ = std::fs::create_dir_all(&self.dir);
        match serde_json::to_vec_pretty(snapshot) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(self.path(&snapshot.name), bytes) {
                    tracing::debug!(
                        "failed to persist breaker snapshot; name={} err={}",
                        snapshot.name,
                        e
                    );
                }
            }
            Err(e) => {
                tracing::debug!("failed to serialize breaker snapshot; err={}", e);
            }
        }
    }
}

/// Point-in-time counters handed to the failure callback.
#[derive(Debug, Clone)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub failure_count: u64,
    pub success_count: u64,
    pub total_requests: u64,
}

type StateChangeHook = dyn Fn(BreakerState, BreakerState) + Send + Sync;
type FailureHook = dyn Fn(&Error, &BreakerStats) + Send + Sync;

#[derive(Debug)]
struct Counters {
    state: BreakerState,
    consecutive_failures: u32,
    failure_count: u64,
    success_count: u64,
    total_requests: u64,
    opened_at: Option<SystemTime>,
    probe_in_flight: bool,
}

/// A named circuit breaker.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    counters: Mutex<Counters>,
    on_state_change: Option<Box<StateChangeHook>>,
    on_failure: Option<Box<FailureHook>>,
    store: Option<Arc<dyn BreakerStore>>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> CircuitBreaker {
        CircuitBreaker {
            name: name.into(),
            config,
            counters: Mutex::new(Counters {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                failure_count: 0,
                success_count: 0,
                total_requests: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            on_state_change: None,
            on_failure: None,
            store: None,
        }
    }

    /// Attach a persistence adapter, restoring any stored state.
    pub fn with_store(mut self, store: Arc<dyn BreakerStore>) -> CircuitBreaker {
        if let Some(snapshot) = store.load(&self.name) {
            let mut counters = self.lock();
            if let Some(state) = BreakerState::from_str(&snapshot.state) {
                counters.state = state;
            }
            counters.consecutive_failures = snapshot.consecutive_failures;
            counters.failure_count = snapshot.failure_count;
            counters.success_count = snapshot.success_count;
            counters.total_requests = snapshot.total_requests;
            counters.opened_at = snapshot
                .opened_at
                .map(|secs| UNIX_EPOCH + Duration::from_secs(secs));
        }

        self.store = Some(store);
        self
    }

    /// Invoked on every state transition, holding the breaker lock.
    pub fn on_state_change<F>(mut self, hook: F) -> CircuitBreaker
    where
        F: Fn(BreakerState, BreakerState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Box::new(hook));
        self
    }

    /// Invoked on every recorded failure, holding the breaker lock.
    pub fn on_failure<F>(mut self, hook: F) -> CircuitBreaker
    where
        F: Fn(&Error, &BreakerStats) + Send + Sync + 'static,
    {
        self.on_failure = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a call may proceed right now.
    ///
    /// While Open this flips to HalfOpen once the recovery timeout
    /// elapses; in HalfOpen exactly one in-flight probe is permitted.
    pub fn should_allow(&self) -> bool {
        let mut counters = self.lock();

        match counters.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = counters
                    .opened_at
                    .and_then(|at| at.elapsed().ok())
                    .unwrap_or(Duration::ZERO);

                if elapsed >= self.config.recovery_timeout {
                    self.transition(&mut counters, BreakerState::HalfOpen);
                    counters.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if counters.probe_in_flight {
                    false
                } else {
                    counters.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a success: a HalfOpen probe closes the breaker.
    pub fn record_success(&self) {
        let mut counters = self.lock();

        counters.total_requests += 1;
        counters.success_count += 1;
        counters.consecutive_failures = 0;
        counters.probe_in_flight = false;

        if counters.state != BreakerState::Closed {
            counters.opened_at = None;
            self.transition(&mut counters, BreakerState::Closed);
        }

        self.persist(&counters);
    }

    /// Record a failure, transitioning per the threshold rules.
    pub fn record_failure(&self, err: &Error) {
        let mut counters = self.lock();

        counters.total_requests += 1;
        counters.failure_count += 1;
        counters.consecutive_failures += 1;
        counters.probe_in_flight = false;

        match counters.state {
            BreakerState::Closed => {
                if counters.consecutive_failures >= self.config.failure_threshold {
                    counters.opened_at = Some(SystemTime::now());
                    self.transition(&mut counters, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => {
                // The probe failed; snap shut again.
                counters.opened_at = Some(SystemTime::now());
                self.transition(&mut counters, BreakerState::Open);
            }
            BreakerState::Open => {}
        }

        if let Some(ref hook) = self.on_failure {
            let stats = BreakerStats {
                state: counters.state,
                consecutive_failures: counters.consecutive_failures,
                failure_count: counters.failure_count,
                success_count: counters.success_count,
                total_requests: counters.total_requests,
            };
            hook(err, &stats);
        }

        self.persist(&counters);
    }

    /// Gate `op` through the breaker and record its outcome.
    pub async fn execute<F, T>(&self, op: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        if !self.should_allow() {
            return Err(Error::circuit_open());
        }

        let result = match self.config.call_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, op).await {
                Ok(result) => result,
                Err(_) => Err(Error::timeout()),
            },
            None => op.await,
        };

        match &result {
            Ok(_) => self.record_success(),
            Err(e) => self.record_failure(e),
        }

        result
    }

    fn transition(&self, counters: &mut Counters, to: BreakerState) {
        let from = counters.state;
        if from == to {
            return;
        }

        tracing::debug!("breaker {}: {} -> {}", self.name, from, to);
        counters.state = to;

        if let Some(ref hook) = self.on_state_change {
            hook(from, to);
        }
    }

    fn persist(&self, counters: &Counters) {
        if let Some(ref store) = self.store {
            store.store(&BreakerSnapshot {
                name: self.name.clone(),
                state: counters.state.as_str().to_string(),
                consecutive_failures: counters.consecutive_failures,
                failure_count: counters.failure_count,
                success_count: counters.success_count,
                total_requests: counters.total_requests,
                opened_at: counters.opened_at.and_then(|at| {
                    at.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
                }),
            });
        }
    }
}

/// Lazily creates one breaker per name.
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    config: BreakerConfig,
    store: Option<Arc<dyn BreakerStore>>,
}

impl fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("config", &self.config)
            .finish()
    }
}

impl BreakerRegistry {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> BreakerRegistry {
        BreakerRegistry {
            breakers: Mutex::new(HashMap::new()),
            config: BreakerConfig {
                failure_threshold,
                recovery_timeout,
                call_timeout: None,
            },
            store: None,
        }
    }

    /// Share a persistence adapter across every breaker in the registry.
    pub fn with_store(mut self, store: Arc<dyn BreakerStore>) -> BreakerRegistry {
        self.store = Some(store);
        self
    }

    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());

        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let mut breaker = CircuitBreaker::new(name, self.config.clone());
                if let Some(ref store) = self.store {
                    breaker = breaker.with_store(store.clone());
                }
                Arc::new(breaker)
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn failure() -> Error {
        Error::from(crate::frame::Reason::INTERNAL_ERROR)
    }

    fn config(threshold: u32, recovery: Duration) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: recovery,
            call_timeout: None,
        }
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new("t", config(3, Duration::from_secs(60)));

        for _ in 0..2 {
            breaker.record_failure(&failure());
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.should_allow());

        breaker.record_failure(&failure());
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.should_allow());
    }

    #[test]
    fn success_resets_the_failure_run() {
        let breaker = CircuitBreaker::new("t", config(3, Duration::from_secs(60)));

        breaker.record_failure(&failure());
        breaker.record_failure(&failure());
        breaker.record_success();
        breaker.record_failure(&failure());
        breaker.record_failure(&failure());

        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_allows_a_single_probe() {
        let breaker = CircuitBreaker::new("t", config(1, Duration::ZERO));

        breaker.record_failure(&failure());
        assert_eq!(breaker.state(), BreakerState::Open);

        // Recovery timeout (zero) has elapsed: one probe goes through.
        assert!(breaker.should_allow());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(!breaker.should_allow());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.should_allow());
    }

    #[test]
    fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new("t", config(1, Duration::ZERO));

        breaker.record_failure(&failure());
        assert!(breaker.should_allow());
        breaker.record_failure(&failure());
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn state_change_hook_fires_under_transitions() {
        let transitions = Arc::new(AtomicUsize::new(0));
        let seen = transitions.clone();

        let breaker = CircuitBreaker::new("t", config(1, Duration::ZERO))
            .on_state_change(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
            });

        breaker.record_failure(&failure()); // -> Open
        assert!(breaker.should_allow()); // -> HalfOpen
        breaker.record_success(); // -> Closed

        assert_eq!(transitions.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn snapshot_round_trips_through_a_store() {
        let store = Arc::new(InMemoryStore::default());

        {
            let breaker = CircuitBreaker::new("origin", config(1, Duration::from_secs(60)))
                .with_store(store.clone());
            breaker.record_failure(&failure());
            assert_eq!(breaker.state(), BreakerState::Open);
        }

        let restored = CircuitBreaker::new("origin", config(1, Duration::from_secs(60)))
            .with_store(store.clone());
        assert_eq!(restored.state(), BreakerState::Open);
        assert!(!restored.should_allow());

        let snapshot = store.load("origin").unwrap();
        assert_eq!(snapshot.state, "open");
        assert_eq!(snapshot.failure_count, 1);
        assert!(snapshot.opened_at.is_some());
    }

    #[tokio::test]
    async fn execute_gates_and_records() {
        let breaker = CircuitBreaker::new("t", config(1, Duration::from_secs(60)));

        let err = breaker
            .execute(async { Err::<(), _>(failure()) })
            .await
            .unwrap_err();
        assert!(!err.is_circuit_open());

        let err = breaker.execute(async { Ok::<_, Error>(()) }).await.unwrap_err();
        assert!(err.is_circuit_open());
    }
}
