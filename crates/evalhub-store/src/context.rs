//! Collaborators shared by every store.

use std::sync::Arc;

use evalhub_client::Backend;

use crate::cache::CacheEnv;
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::hooks::{Notifier, TracingNotifier};

/// Backend, clock, notifier and settings handed to each store.
///
/// Stores are built from a context instead of reaching for globals, so tests
/// run any number of independent instances side by side.
#[derive(Clone)]
pub struct StoreContext {
    /// Remote backend.
    pub backend: Arc<dyn Backend>,
    /// Time source for TTLs and transition stamps.
    pub clock: Arc<dyn Clock>,
    /// Toast channel.
    pub notifier: Arc<dyn Notifier>,
    /// Cache and purchase settings.
    pub config: StoreConfig,
}

impl StoreContext {
    /// Wall clock, tracing notices and default settings.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotifier),
            config: StoreConfig::default(),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the settings.
    #[must_use]
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// A fresh cache environment for one store.
    #[must_use]
    pub fn cache_env(&self) -> CacheEnv {
        CacheEnv::new(
            Arc::clone(&self.clock),
            Arc::clone(&self.notifier),
            self.config.cache_ttl,
        )
    }
}

impl std::fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
