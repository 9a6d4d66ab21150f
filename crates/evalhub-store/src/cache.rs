//! Time-boxed cache slices.
//!
//! A [`Slice`] holds one named piece of a store's state (`answers`, `plans`,
//! ...) together with the time it was last loaded. Reads inside the TTL are
//! served from memory; anything else goes to the backend and replaces the
//! value wholesale. Staleness is only resolved when a caller forces a
//! reload, which every mutation does for the slices it affects.
//!
//! Concurrent callers of a cold or forced slice share one request: non-forced
//! callers join whatever is in flight, and a response is dropped if a newer
//! request for the same slice has started since. Callers of the dropped
//! request wait for the newer one instead.
//!
//! A store whose data belongs to the signed-in user builds its environment
//! with [`CacheEnv::owned_by`]. Each slice remembers the user it was loaded
//! for and reads as empty once a different user (or nobody) is signed in.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use evalhub_core::UserId;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::clock::Clock;
use crate::error::{Result, StoreError};
use crate::hooks::{Notice, Notifier};

/// How long a loaded slice counts as fresh.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(120_000);

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Options accepted by every fetch action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip the freshness check and always call the backend.
    pub force: bool,
}

impl FetchOptions {
    /// Serve from cache when fresh.
    pub const CACHED: Self = Self { force: false };

    /// Always reload.
    pub const FORCE: Self = Self { force: true };
}

#[derive(Debug, Default)]
struct StatusInner {
    loading: HashSet<String>,
    error: Option<String>,
}

/// Loading flags and the last error of one store.
///
/// Flags are keyed by name so any number of per-entity flags
/// (`plan_sync_{id}`, `session_{id}`) can coexist with the slice flags.
#[derive(Debug, Default)]
pub struct StoreStatus {
    inner: Mutex<StatusInner>,
}

impl StoreStatus {
    /// Whether `key` is loading.
    #[must_use]
    pub fn is_loading(&self, key: &str) -> bool {
        lock(&self.inner).loading.contains(key)
    }

    /// Whether anything in the store is loading.
    #[must_use]
    pub fn any_loading(&self) -> bool {
        !lock(&self.inner).loading.is_empty()
    }

    /// Keys currently loading, sorted.
    #[must_use]
    pub fn loading_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.inner).loading.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Message of the last failure, cleared when the next load starts.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        lock(&self.inner).error.clone()
    }

    fn set_error(&self, error: Option<String>) {
        lock(&self.inner).error = error;
    }

    fn set_loading(&self, key: &str, loading: bool) {
        let mut inner = lock(&self.inner);
        if loading {
            inner.loading.insert(key.to_string());
        } else {
            inner.loading.remove(key);
        }
    }

    /// Mark `key` loading and clear the error until the guard drops.
    pub fn begin(self: &Arc<Self>, key: impl Into<String>) -> LoadingGuard {
        let key = key.into();
        {
            let mut inner = lock(&self.inner);
            inner.loading.insert(key.clone());
            inner.error = None;
        }
        LoadingGuard {
            status: Arc::clone(self),
            key,
        }
    }
}

/// Clears a loading flag when dropped, whatever the outcome.
#[derive(Debug)]
pub struct LoadingGuard {
    status: Arc<StoreStatus>,
    key: String,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.status.set_loading(&self.key, false);
    }
}

type OwnerFn = Arc<dyn Fn() -> Option<UserId> + Send + Sync>;

/// What a slice needs from its store: status, clock, notices and the TTL.
#[derive(Clone)]
pub struct CacheEnv {
    status: Arc<StoreStatus>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    ttl: Duration,
    owner: Option<OwnerFn>,
}

impl CacheEnv {
    /// Build an environment with a fresh status.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>, ttl: Duration) -> Self {
        Self {
            status: Arc::new(StoreStatus::default()),
            clock,
            notifier,
            ttl,
            owner: None,
        }
    }

    /// Scope every slice to the user `owner` reports. A slice loaded for
    /// one user is a miss for any other.
    #[must_use]
    pub fn owned_by(mut self, owner: impl Fn() -> Option<UserId> + Send + Sync + 'static) -> Self {
        self.owner = Some(Arc::new(owner));
        self
    }

    fn current_owner(&self) -> Option<UserId> {
        self.owner.as_ref().and_then(|owner| owner())
    }

    /// Create an empty slice named `key`.
    #[must_use]
    pub fn slice<T>(&self, key: impl Into<String>) -> Slice<T> {
        Slice {
            key: key.into(),
            state: Arc::new(Mutex::new(SliceState {
                data: None,
                last_fetched: None,
                seq: 0,
                in_flight: None,
                owner: None,
            })),
            env: self.clone(),
        }
    }

    /// The store's status.
    #[must_use]
    pub fn status(&self) -> &Arc<StoreStatus> {
        &self.status
    }

    /// The store's clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Show a success notice.
    pub fn succeed(&self, message: impl Into<String>) {
        self.notifier.notify(Notice::success(message));
    }

    /// Show an info notice.
    pub fn inform(&self, message: impl Into<String>) {
        self.notifier.notify(Notice::info(message));
    }

    /// Report a failure. Client-side rejections only produce a notice;
    /// backend failures also become the store's error.
    pub fn fail(&self, err: &StoreError) {
        if err.is_client_side() {
            tracing::debug!(error = %err, "Action rejected before calling the backend");
        } else {
            tracing::warn!(error = %err, "Store action failed");
            self.status.set_error(Some(err.to_string()));
        }
        self.notifier.notify(Notice::error(err.to_string()));
    }

    /// Run an action under a keyed loading flag, reporting failure.
    ///
    /// # Errors
    ///
    /// Returns whatever the action returns.
    pub async fn track<T, Fut>(&self, key: impl Into<String>, action: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let _guard = self.status.begin(key);
        let outcome = action.await;
        if let Err(err) = &outcome {
            self.fail(err);
        }
        outcome
    }
}

impl std::fmt::Debug for CacheEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEnv")
            .field("status", &self.status)
            .field("ttl", &self.ttl)
            .field("owned", &self.owner.is_some())
            .finish_non_exhaustive()
    }
}

type SharedFetch<T> = Shared<BoxFuture<'static, Result<Arc<T>>>>;

struct SliceState<T> {
    data: Option<Arc<T>>,
    last_fetched: Option<DateTime<Utc>>,
    seq: u64,
    in_flight: Option<SharedFetch<T>>,
    owner: Option<UserId>,
}

/// One cached value with its own TTL stamp and loading flag.
pub struct Slice<T> {
    key: String,
    state: Arc<Mutex<SliceState<T>>>,
    env: CacheEnv,
}

impl<T> Clone for Slice<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            state: Arc::clone(&self.state),
            env: self.env.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Slice<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Slice")
            .field("key", &self.key)
            .field("loaded", &state.data.is_some())
            .field("last_fetched", &state.last_fetched)
            .field("seq", &state.seq)
            .finish()
    }
}

impl<T: Send + Sync + 'static> Slice<T> {
    /// Slice name, also its loading-flag key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Lock the state, dropping it first if it was loaded for another user.
    fn state(&self) -> MutexGuard<'_, SliceState<T>> {
        let owner = self.env.current_owner();
        let mut state = lock(&self.state);
        if state.owner != owner {
            if state.data.is_some() || state.in_flight.is_some() {
                tracing::debug!(slice = %self.key, "Signed-in user changed, dropping cached value");
            }
            state.data = None;
            state.last_fetched = None;
            state.seq += 1;
            state.in_flight = None;
            state.owner = owner;
            self.env.status.set_loading(&self.key, false);
        }
        state
    }

    /// Cached value, if loaded for the current user.
    #[must_use]
    pub fn data(&self) -> Option<Arc<T>> {
        self.state().data.clone()
    }

    /// When the value was last loaded from the backend.
    #[must_use]
    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        self.state().last_fetched
    }

    /// Whether a load for this slice is running.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.env.status.is_loading(&self.key)
    }

    /// Whether the cached value is present and inside the TTL.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        let state = self.state();
        state.data.is_some() && state.last_fetched.is_some_and(|at| self.fresh_since(at))
    }

    fn fresh_since(&self, at: DateTime<Utc>) -> bool {
        match (self.env.clock.now() - at).to_std() {
            Ok(elapsed) => elapsed < self.env.ttl,
            // The clock went backwards; treat as just loaded.
            Err(_) => true,
        }
    }

    /// Return the cached value when fresh, otherwise load it.
    ///
    /// `load` is only invoked when a request actually starts. On failure the
    /// previous value stays in place, the store error is set and a notice is
    /// shown.
    ///
    /// # Errors
    ///
    /// Returns the load's error, shared by every caller that joined it.
    pub async fn fetch<F, Fut>(&self, options: FetchOptions, load: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let request = {
            let mut state = self.state();
            if !options.force {
                if let (Some(data), Some(at)) = (&state.data, state.last_fetched) {
                    if self.fresh_since(at) {
                        tracing::debug!(slice = %self.key, "Cache hit");
                        return Ok(Arc::clone(data));
                    }
                }
            }
            let joinable = if options.force {
                None
            } else {
                state.in_flight.clone()
            };
            match joinable {
                Some(in_flight) => {
                    tracing::debug!(slice = %self.key, "Joining in-flight fetch");
                    in_flight
                }
                None => self.start(&mut state, load()),
            }
        };
        request.await
    }

    fn start<Fut>(&self, state: &mut SliceState<T>, load: Fut) -> SharedFetch<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        state.seq += 1;
        let seq = state.seq;
        let owner = state.owner;
        tracing::debug!(slice = %self.key, seq, "Fetching from backend");

        self.env.status.set_loading(&self.key, true);
        self.env.status.set_error(None);

        let slot = Arc::clone(&self.state);
        let env = self.env.clone();
        let key = self.key.clone();

        let request = async move {
            let outcome = load.await;
            let newer = {
                let mut state = lock(&slot);
                if state.seq == seq {
                    state.in_flight = None;
                    env.status.set_loading(&key, false);
                    match outcome {
                        Ok(value) => {
                            let value = Arc::new(value);
                            state.data = Some(Arc::clone(&value));
                            state.last_fetched = Some(env.clock.now());
                            return Ok(value);
                        }
                        Err(err) => {
                            drop(state);
                            env.fail(&err);
                            return Err(err);
                        }
                    }
                }
                tracing::warn!(
                    slice = %key,
                    seq,
                    latest = state.seq,
                    "Discarding response superseded by a newer fetch"
                );
                if state.owner != owner {
                    None
                } else if let Some(newer) = state.in_flight.clone() {
                    Some(newer)
                } else if let Some(latest) = state.data.clone() {
                    return Ok(latest);
                } else {
                    None
                }
            };
            match newer {
                Some(newer) => newer.await,
                // Cleared or re-scoped; nothing newer belongs to this caller.
                None => outcome.map(Arc::new),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(request.clone());
        request
    }

    /// Swap the cached value without touching the TTL stamp. Returns the
    /// previous value so optimistic edits can be rolled back.
    pub fn replace(&self, data: Option<Arc<T>>) -> Option<Arc<T>> {
        std::mem::replace(&mut self.state().data, data)
    }

    /// Derive a new cached value from the current one. No-op when empty.
    /// Returns the previous value.
    pub fn modify(&self, f: impl FnOnce(&T) -> T) -> Option<Arc<T>> {
        let mut state = self.state();
        let previous = state.data.clone()?;
        state.data = Some(Arc::new(f(&previous)));
        Some(previous)
    }

    /// Forget the value and abandon any running load.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.data = None;
        state.last_fetched = None;
        state.seq += 1;
        state.in_flight = None;
        self.env.status.set_loading(&self.key, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::hooks::TracingNotifier;
    use evalhub_client::ClientError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn env(clock: Arc<ManualClock>) -> CacheEnv {
        CacheEnv::new(clock, Arc::new(TracingNotifier), DEFAULT_CACHE_TTL)
    }

    fn counting(calls: &Arc<AtomicUsize>, value: u32) -> impl Future<Output = Result<u32>> {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    }

    #[tokio::test]
    async fn second_fetch_inside_ttl_is_a_cache_hit() {
        let clock = Arc::new(ManualClock::default());
        let slice = env(Arc::clone(&clock)).slice::<u32>("answers");
        let calls = Arc::new(AtomicUsize::new(0));

        let first = slice
            .fetch(FetchOptions::CACHED, || counting(&calls, 1))
            .await
            .unwrap();
        clock.advance(chrono::Duration::milliseconds(119_999));
        let second = slice
            .fetch(FetchOptions::CACHED, || counting(&calls, 2))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn expired_slice_reloads() {
        let clock = Arc::new(ManualClock::default());
        let slice = env(Arc::clone(&clock)).slice::<u32>("plans");
        let calls = Arc::new(AtomicUsize::new(0));

        slice
            .fetch(FetchOptions::CACHED, || counting(&calls, 1))
            .await
            .unwrap();
        clock.advance(chrono::Duration::milliseconds(120_000));
        let value = slice
            .fetch(FetchOptions::CACHED, || counting(&calls, 2))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*value, 2);
    }

    #[tokio::test]
    async fn force_always_reloads_and_restamps() {
        let clock = Arc::new(ManualClock::default());
        let slice = env(Arc::clone(&clock)).slice::<u32>("orders");
        let calls = Arc::new(AtomicUsize::new(0));

        slice
            .fetch(FetchOptions::CACHED, || counting(&calls, 1))
            .await
            .unwrap();
        let stamped = slice.last_fetched().unwrap();
        clock.advance(chrono::Duration::milliseconds(5));
        slice
            .fetch(FetchOptions::FORCE, || counting(&calls, 2))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(slice.last_fetched().unwrap() > stamped);
    }

    #[tokio::test]
    async fn failure_keeps_stale_value_and_sets_error() {
        let clock = Arc::new(ManualClock::default());
        let env = env(Arc::clone(&clock));
        let slice = env.slice::<u32>("subscriptions");

        slice.fetch(FetchOptions::CACHED, || async { Ok(7) }).await.unwrap();
        let err = slice
            .fetch(FetchOptions::FORCE, || async {
                Err(StoreError::from(ClientError::Api {
                    code: None,
                    message: "permission denied".into(),
                    status: 403,
                }))
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "permission denied");
        assert_eq!(slice.data().as_deref(), Some(&7));
        assert_eq!(env.status().error().as_deref(), Some("permission denied"));
        assert!(!slice.is_loading());
    }

    #[tokio::test]
    async fn concurrent_cold_fetches_share_one_request() {
        let slice = env(Arc::new(ManualClock::default())).slice::<u32>("answers");
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let gated = {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                rx.await.ok();
                Ok(3)
            }
        };

        let first = slice.fetch(FetchOptions::CACHED, gated);
        let second = slice.fetch(FetchOptions::CACHED, || counting(&calls, 99));
        let release = async {
            tokio::task::yield_now().await;
            tx.send(()).ok();
        };
        let (a, b, ()) = tokio::join!(first, second, release);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*a.unwrap(), 3);
        assert_eq!(*b.unwrap(), 3);
    }

    #[tokio::test]
    async fn superseded_response_is_discarded() {
        let slice = env(Arc::new(ManualClock::default())).slice::<u32>("sessions");
        let (slow_tx, slow_rx) = tokio::sync::oneshot::channel::<()>();

        let slow = slice.fetch(FetchOptions::FORCE, || async move {
            slow_rx.await.ok();
            Ok(1)
        });
        let fast = async {
            tokio::task::yield_now().await;
            let value = slice
                .fetch(FetchOptions::FORCE, || async { Ok(2) })
                .await
                .unwrap();
            slow_tx.send(()).ok();
            value
        };
        let (old, new) = tokio::join!(slow, fast);

        // The older caller is handed the newer value.
        assert_eq!(*old.unwrap(), 2);
        assert_eq!(*new, 2);
        assert_eq!(slice.data().as_deref(), Some(&2));
        assert!(!slice.is_loading());
    }

    #[tokio::test]
    async fn slices_scoped_to_owner_miss_for_another_user() {
        let signed_in = Arc::new(Mutex::new(Some(UserId::generate())));
        let owner = Arc::clone(&signed_in);
        let slice = env(Arc::new(ManualClock::default()))
            .owned_by(move || *lock(&owner))
            .slice::<u32>("answers");
        let calls = Arc::new(AtomicUsize::new(0));

        slice
            .fetch(FetchOptions::CACHED, || counting(&calls, 1))
            .await
            .unwrap();
        *lock(&signed_in) = None;
        assert!(slice.data().is_none());

        *lock(&signed_in) = Some(UserId::generate());
        let value = slice
            .fetch(FetchOptions::CACHED, || counting(&calls, 2))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*value, 2);
    }

    #[tokio::test]
    async fn loading_guard_clears_on_error() {
        let env = env(Arc::new(ManualClock::default()));
        let result: Result<()> = env
            .track("plan_sync_1", async {
                Err(StoreError::Validation("Price must be positive".into()))
            })
            .await;

        assert!(result.is_err());
        assert!(!env.status().is_loading("plan_sync_1"));
        // Client-side rejections do not become the store error.
        assert!(env.status().error().is_none());
    }

    #[test]
    fn modify_and_replace_leave_stamp_alone() {
        let slice = env(Arc::new(ManualClock::default())).slice::<Vec<u32>>("notifications");
        assert!(slice.modify(|v| v.clone()).is_none());
        slice.replace(Some(Arc::new(vec![1, 2])));
        let previous = slice.modify(|v| v.iter().map(|x| x * 10).collect()).unwrap();
        assert_eq!(*previous, vec![1, 2]);
        assert_eq!(slice.data().as_deref(), Some(&vec![10, 20]));
        assert!(slice.last_fetched().is_none());
    }
}
