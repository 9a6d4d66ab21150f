//! Client-side cache-and-mutate stores for the evalhub marketplace.
//!
//! This crate keeps the data each role works with in memory and performs
//! every write against the backend:
//!
//! - [`IdentityStore`] - the signed-in user and profile, auth flows
//! - [`StudentStore`] - plans, purchases, answers, mentorship, notifications
//! - [`FacultyStore`] - assigned answers and mentorship sessions
//! - [`AdminStore`] - platform-wide lists and administrative actions
//!
//! # Caching
//!
//! Each list lives in a [`Slice`]. A fetch is served from memory while the
//! slice is younger than the TTL (120 s by default); [`FetchOptions::FORCE`]
//! always goes to the backend. Mutations force-refetch the slices they touch
//! once the write succeeds. A failed follow-up reload is logged and leaves
//! the previous value and stamp in place.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use evalhub_client::{ClientConfig, RestBackend};
//! use evalhub_store::{IdentityStore, StoreConfig, StoreContext};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(RestBackend::new(&ClientConfig::from_env())?);
//! let ctx = StoreContext::new(backend).with_config(StoreConfig::from_env());
//!
//! let identity = IdentityStore::new(&ctx);
//! identity.hydrate().await?;
//! let route = identity.login("asha@example.com", "secret").await?;
//! println!("landing on {}", route.path());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod persistence;
pub mod stores;

pub use cache::{CacheEnv, FetchOptions, Slice, StoreStatus, DEFAULT_CACHE_TTL};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use context::StoreContext;
pub use error::{Result, StoreError};
pub use hooks::{
    BroadcastNotifier, CheckoutOutcome, CheckoutRequest, CheckoutTarget, CheckoutWidget, Confirm,
    FixedConfirm, Notice, NoticeLevel, Notifier, TracingNotifier,
};
pub use persistence::{
    JsonFilePersistence, MemoryPersistence, PersistedIdentity, SessionPersistence,
};
pub use stores::admin::{AdminStore, AnswerPage, NewUser, UserDetail};
pub use stores::faculty::{Evaluation, FacultyStore};
pub use stores::identity::{IdentityStore, RecoveryParams, Route};
pub use stores::student::{NotificationFeed, PurchaseOutcome, StudentStore};
