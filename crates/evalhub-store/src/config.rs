//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::DEFAULT_CACHE_TTL;

/// Cache and purchase-settle settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a fetched slice is served from memory (default: 120 000 ms).
    pub cache_ttl: Duration,

    /// Wait after the checkout closes before looking for the webhook's
    /// effect (default: 3 000 ms).
    pub purchase_settle_delay: Duration,

    /// Re-checks for the new order or subscription after the first one
    /// that follows the settle delay (default: 4).
    pub purchase_poll_attempts: u32,

    /// First wait between polls; doubles every round (default: 1 000 ms).
    pub purchase_poll_backoff: Duration,

    /// Where the signed-in `{user, profile}` pair is persisted (optional).
    pub session_file: Option<PathBuf>,
}

impl StoreConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cache_ttl: env_millis("CACHE_TTL_MS").unwrap_or(defaults.cache_ttl),
            purchase_settle_delay: env_millis("PURCHASE_SETTLE_DELAY_MS")
                .unwrap_or(defaults.purchase_settle_delay),
            purchase_poll_attempts: std::env::var("PURCHASE_POLL_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.purchase_poll_attempts),
            purchase_poll_backoff: env_millis("PURCHASE_POLL_BACKOFF_MS")
                .unwrap_or(defaults.purchase_poll_backoff),
            session_file: std::env::var("SESSION_FILE").ok().map(PathBuf::from),
        }
    }

    /// Waits between purchase polls: the initial backoff doubled each round.
    #[must_use]
    pub fn poll_schedule(&self) -> Vec<Duration> {
        (0..self.purchase_poll_attempts)
            .map(|round| self.purchase_poll_backoff.saturating_mul(1 << round.min(16)))
            .collect()
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring non-numeric duration");
            None
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            purchase_settle_delay: Duration::from_millis(3_000),
            purchase_poll_attempts: 4,
            purchase_poll_backoff: Duration::from_millis(1_000),
            session_file: None,
        }
    }
}
