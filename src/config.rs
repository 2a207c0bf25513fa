use crate::codec::ContinuationLimits;
use crate::frame;

use std::time::Duration;

/// Client configuration.
///
/// Every knob has a working default; `Config::default()` plus the
/// environment override is what `Client::new` runs with.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cap on pooled connections per client.
    pub connection_pool_size: usize,

    /// TLS peer-certificate verification. Carried to the embedder's TLS
    /// connector; may be overridden by `H2_CLIENT_VERIFY_SSL`.
    pub verify_ssl: bool,

    /// Per-request deadline.
    pub default_timeout: Duration,

    /// Transport establishment deadline.
    pub connect_timeout: Duration,

    /// Speak cleartext HTTP/2 to `http://` origins without the deprecated
    /// Upgrade dance. `https://` origins still use TLS + ALPN.
    pub h2_prior_knowledge: bool,

    /// Whether per-origin circuit breakers gate requests.
    pub circuit_breaker_enabled: bool,

    /// Consecutive failures before a breaker opens.
    pub circuit_breaker_failure_threshold: u32,

    /// How long an open breaker waits before probing.
    pub circuit_breaker_recovery_timeout: Duration,

    /// Advertised in the local SETTINGS.
    pub max_concurrent_streams: u32,

    /// Advertised INITIAL_WINDOW_SIZE.
    pub initial_window_size: u32,

    /// Advertised MAX_FRAME_SIZE; must stay in 16_384..=16_777_215.
    pub max_frame_size: u32,

    /// Advertised MAX_HEADER_LIST_SIZE; enforced during HPACK decode when
    /// set.
    pub max_header_list_size: Option<u32>,

    /// CONTINUATION flood caps.
    pub continuation_max_frames: usize,
    pub continuation_max_accumulated: usize,
    pub continuation_max_single: usize,

    /// Idle pooled connections past this age are closed by
    /// `Pool::cleanup_expired`.
    pub pool_idle_timeout: Duration,

    /// How long a per-origin protocol decision stays memoized.
    pub negotiation_memo_ttl: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            connection_pool_size: 10,
            verify_ssl: true,
            default_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            h2_prior_knowledge: false,
            circuit_breaker_enabled: true,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_recovery_timeout: Duration::from_secs(60),
            max_concurrent_streams: 100,
            initial_window_size: frame::DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: None,
            continuation_max_frames: 10,
            continuation_max_accumulated: 16_384,
            continuation_max_single: 8_192,
            pool_idle_timeout: Duration::from_secs(90),
            negotiation_memo_ttl: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// The defaults with environment overrides applied.
    pub fn from_env() -> Config {
        let mut config = Config::default();

        if let Ok(val) = std::env::var("H2_CLIENT_VERIFY_SSL") {
            match val.to_ascii_lowercase().as_str() {
                "0" | "false" | "no" => config.verify_ssl = false,
                "1" | "true" | "yes" => config.verify_ssl = true,
                other => {
                    tracing::debug!("ignoring invalid H2_CLIENT_VERIFY_SSL={:?}", other);
                }
            }
        }

        config
    }

    /// The SETTINGS frame advertised during the handshake.
    pub(crate) fn local_settings(&self) -> frame::Settings {
        let mut settings = frame::Settings::default();

        // This client never accepts pushes.
        settings.set_enable_push(false);
        settings.set_max_concurrent_streams(Some(self.max_concurrent_streams));

        if self.initial_window_size != frame::DEFAULT_INITIAL_WINDOW_SIZE {
            settings.set_initial_window_size(Some(self.initial_window_size));
        }

        if self.max_frame_size != frame::DEFAULT_MAX_FRAME_SIZE {
            settings.set_max_frame_size(Some(self.max_frame_size));
        }

        if let Some(max) = self.max_header_list_size {
            settings.set_max_header_list_size(Some(max));
        }

        settings
    }

    pub(crate) fn continuation_limits(&self) -> ContinuationLimits {
        ContinuationLimits {
            max_frames: self.continuation_max_frames,
            max_accumulated: self.continuation_max_accumulated,
            max_single: self.continuation_max_single,
        }
    }
}
