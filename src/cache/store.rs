//! Keyed fetch cache with single-flight loading.
//!
//! Every key has at most one outstanding loader at a time. Loaders run as
//! spawned tasks, so a fetch finishes and populates the cache even when every
//! caller has stopped waiting for it.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use lru::LruCache;
use metrics::{counter, histogram};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::entry::{CacheEntry, EntrySnapshot, EntryStatus};
use super::error::FetchError;
use super::keys::{KeyScope, ResourceKey};
use super::lock::mutex_lock;
use super::mutation::MutationRecord;
use super::notify::{Binding, Callback, NotificationBatch, Subscribers, Subscription};

const SOURCE: &str = "cache::store";

pub const METRIC_HIT: &str = "memwall_cache_hit_total";
pub const METRIC_STALE_HIT: &str = "memwall_cache_stale_hit_total";
pub const METRIC_MISS: &str = "memwall_cache_miss_total";
pub const METRIC_JOIN: &str = "memwall_cache_join_total";
pub const METRIC_EVICT: &str = "memwall_cache_evict_total";
pub const METRIC_FETCH_ERROR: &str = "memwall_cache_fetch_error_total";
pub const METRIC_INVALIDATE: &str = "memwall_cache_invalidate_total";
pub const METRIC_RESET: &str = "memwall_cache_reset_total";
pub const METRIC_FETCH_MS: &str = "memwall_cache_fetch_ms";

type FetchResult<V> = Result<V, FetchError>;
type SharedFetch<V> = Shared<BoxFuture<'static, FetchResult<V>>>;

/// What `get` does once a fresh value is not available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Return the stale value now and refresh in the background.
    #[default]
    StaleWhileRevalidate,
    /// Wait for the refresh before returning.
    BlockUntilFresh,
}

/// Per-call overrides for `get_with`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Freshness window; `None` uses the window configured for the key's domain.
    pub freshness: Option<Duration>,
    pub policy: StalePolicy,
}

impl FetchOptions {
    pub fn blocking() -> Self {
        Self {
            freshness: None,
            policy: StalePolicy::BlockUntilFresh,
        }
    }

    pub fn with_freshness(mut self, window: Duration) -> Self {
        self.freshness = Some(window);
        self
    }
}

struct Flight<V> {
    id: u64,
    shared: SharedFetch<V>,
    abort: AbortHandle,
}

struct State<V> {
    entries: LruCache<ResourceKey, CacheEntry<V>>,
    flights: HashMap<ResourceKey, Flight<V>>,
    next_flight: u64,
}

struct Inner<V> {
    config: CacheConfig,
    state: Mutex<State<V>>,
    subscribers: Arc<Subscribers<V>>,
}

/// Outcome of the locked part of `get`.
enum Lookup<V> {
    Ready(V),
    Wait(SharedFetch<V>),
}

/// Request-deduplicating, subscriber-aware cache keyed by `ResourceKey`.
///
/// Cloning is cheap; clones share the same state.
pub struct FetchCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for FetchCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> FetchCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        let entries = LruCache::new(config.max_entries_non_zero());
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    entries,
                    flights: HashMap::new(),
                    next_flight: 0,
                }),
                subscribers: Arc::new(Subscribers::new()),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Return the value for `key`, loading it with `loader` when needed.
    ///
    /// Fresh values return without calling `loader`. Stale values return
    /// immediately while a background refresh runs. Absent or failed entries
    /// wait for the loader, joining any fetch already in flight for this key.
    pub async fn get<F, Fut>(&self, key: &ResourceKey, loader: F) -> FetchResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        self.get_with(key, loader, FetchOptions::default()).await
    }

    pub async fn get_with<F, Fut>(
        &self,
        key: &ResourceKey,
        loader: F,
        options: FetchOptions,
    ) -> FetchResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let window = options
            .freshness
            .unwrap_or_else(|| self.inner.config.freshness_for(key.domain()));
        let domain = key.domain().as_str();
        let mut batch = NotificationBatch::new();

        let lookup = {
            let mut state = mutex_lock(&self.inner.state, SOURCE, "get");
            let now = Instant::now();
            let cached = state
                .entries
                .get(key)
                .map(|entry| (entry.status(now, window), entry.value().cloned()));

            match cached {
                Some((EntryStatus::Fresh, Some(value))) => {
                    counter!(METRIC_HIT, "domain" => domain).increment(1);
                    Lookup::Ready(value)
                }
                Some((EntryStatus::Stale, Some(value)))
                    if options.policy == StalePolicy::StaleWhileRevalidate =>
                {
                    counter!(METRIC_STALE_HIT, "domain" => domain).increment(1);
                    if !state.flights.contains_key(key) {
                        debug!(key = %key, "Revalidating stale entry in background");
                        let _ = self.start_flight(&mut state, key, loader, &mut batch);
                    }
                    Lookup::Ready(value)
                }
                _ => Lookup::Wait(self.join_or_start(&mut state, key, loader, &mut batch)),
            }
        };

        batch.dispatch();

        match lookup {
            Lookup::Ready(value) => Ok(value),
            Lookup::Wait(shared) => shared.await,
        }
    }

    /// Load `key` from the network regardless of freshness, still joining an
    /// in-flight fetch instead of starting a second one.
    pub async fn refetch<F, Fut>(&self, key: &ResourceKey, loader: F) -> FetchResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let mut batch = NotificationBatch::new();
        let shared = {
            let mut state = mutex_lock(&self.inner.state, SOURCE, "refetch");
            self.join_or_start(&mut state, key, loader, &mut batch)
        };
        batch.dispatch();
        shared.await
    }

    /// Synchronous read; never triggers a fetch.
    pub fn peek(&self, key: &ResourceKey) -> Option<V> {
        mutex_lock(&self.inner.state, SOURCE, "peek")
            .entries
            .peek(key)
            .and_then(|entry| entry.value().cloned())
    }

    pub fn snapshot(&self, key: &ResourceKey) -> EntrySnapshot<V> {
        let state = mutex_lock(&self.inner.state, SOURCE, "snapshot");
        self.snapshot_locked(&state, key, Instant::now())
    }

    pub fn is_fetching(&self, key: &ResourceKey) -> bool {
        mutex_lock(&self.inner.state, SOURCE, "is_fetching")
            .flights
            .contains_key(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        mutex_lock(&self.inner.state, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Store `value` for `key` as fresh and notify its subscribers.
    ///
    /// A fetch already in flight for the key keeps running for its callers,
    /// but its result no longer lands in the cache.
    pub fn set_value(&self, key: &ResourceKey, value: V) {
        let mut batch = NotificationBatch::new();
        {
            let mut state = mutex_lock(&self.inner.state, SOURCE, "set_value");
            let now = Instant::now();
            self.write_value(&mut state, key, value, now, &mut batch);
            self.queue_snapshot(&state, key, now, &mut batch);
        }
        batch.dispatch();
    }

    /// Remove the cached value and in-flight marker for `key`.
    pub fn invalidate(&self, key: &ResourceKey) -> bool {
        self.invalidate_many([key.clone()]) > 0
    }

    /// Invalidate several keys as one step; subscribers of all of them are
    /// notified together once every key is gone. Returns how many keys held
    /// data or a pending fetch.
    pub fn invalidate_many<I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = ResourceKey>,
    {
        let record = MutationRecord::new().invalidate_all(keys.into_iter().map(KeyScope::Exact));
        self.apply(&record)
    }

    /// Invalidate every key selected by `scope`.
    pub fn invalidate_scope(&self, scope: KeyScope) -> usize {
        self.apply(&MutationRecord::new().invalidate(scope))
    }

    /// Apply a mutation's invalidations and optimistic patches atomically.
    ///
    /// Invalidations run first, then patches; a key that is both removed and
    /// patched ends up holding the patch. One notification batch follows.
    /// Returns the number of keys whose state changed.
    pub fn apply(&self, record: &MutationRecord<V>) -> usize {
        let mut batch = NotificationBatch::new();
        let touched = {
            let mut state = mutex_lock(&self.inner.state, SOURCE, "apply");
            let now = Instant::now();

            let mut targets: BTreeSet<ResourceKey> = BTreeSet::new();
            for scope in record.invalidations() {
                match scope {
                    KeyScope::Exact(key) => {
                        targets.insert(key.clone());
                    }
                    _ => {
                        targets.extend(
                            state
                                .entries
                                .iter()
                                .map(|(key, _)| key)
                                .chain(state.flights.keys())
                                .filter(|key| scope.matches(key))
                                .cloned(),
                        );
                    }
                }
            }

            let mut touched: BTreeSet<ResourceKey> = BTreeSet::new();
            for key in targets {
                let had_entry = state.entries.pop(&key).is_some();
                let had_flight = state.flights.remove(&key).is_some();
                if had_entry || had_flight {
                    counter!(METRIC_INVALIDATE, "domain" => key.domain().as_str()).increment(1);
                    touched.insert(key);
                }
            }

            for (key, value) in record.patches() {
                self.write_value(&mut state, key, value.clone(), now, &mut batch);
                touched.insert(key.clone());
            }

            for key in &touched {
                self.queue_snapshot(&state, key, now, &mut batch);
            }

            if !touched.is_empty() {
                info!(
                    mutation_id = %record.id(),
                    keys = ?touched.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "Cache invalidation applied"
                );
            }
            touched.len()
        };
        batch.dispatch();
        touched
    }

    /// Drop every entry and subscription and abort every in-flight fetch.
    ///
    /// Callers waiting on an aborted fetch receive a `Cancelled` error.
    /// Each live subscriber receives one final empty snapshot; bindings then
    /// report themselves closed.
    pub fn clear_all(&self) {
        let (entries, flights) = {
            let mut state = mutex_lock(&self.inner.state, SOURCE, "clear_all");
            let entries = state.entries.len();
            let flights = state.flights.len();
            for (_, flight) in state.flights.drain() {
                flight.abort.abort();
            }
            state.entries.clear();
            (entries, flights)
        };

        let callbacks = self.inner.subscribers.drain();
        let subscribers = callbacks.len();
        let mut batch = NotificationBatch::new();
        batch.push(callbacks, EntrySnapshot::empty());
        batch.dispatch();

        counter!(METRIC_RESET).increment(1);
        info!(entries, flights, subscribers, "Cache cleared");
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Invoke `callback` whenever the value, status or error of `key` changes.
    pub fn subscribe<F>(&self, key: &ResourceKey, callback: F) -> Subscription<V>
    where
        F: Fn(&EntrySnapshot<V>) + Send + Sync + 'static,
    {
        let callback: Arc<Callback<V>> = Arc::new(callback);
        Subscription::new(key.clone(), &self.inner.subscribers, callback)
    }

    /// Current snapshot plus a subscription, in one call.
    pub fn bind(&self, key: &ResourceKey) -> Binding<V> {
        // Registering under the state lock keeps a concurrent update from
        // slipping between the initial snapshot and the subscription.
        let state = mutex_lock(&self.inner.state, SOURCE, "bind");
        let initial = self.snapshot_locked(&state, key, Instant::now());
        Binding::new(key.clone(), &self.inner.subscribers, initial)
    }

    pub fn subscriber_count(&self, key: &ResourceKey) -> usize {
        self.inner.subscribers.count(key)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn join_or_start<F, Fut>(
        &self,
        state: &mut State<V>,
        key: &ResourceKey,
        loader: F,
        batch: &mut NotificationBatch<V>,
    ) -> SharedFetch<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        if let Some(flight) = state.flights.get(key) {
            counter!(METRIC_JOIN, "domain" => key.domain().as_str()).increment(1);
            debug!(key = %key, flight_id = flight.id, "Joining in-flight fetch");
            return flight.shared.clone();
        }
        counter!(METRIC_MISS, "domain" => key.domain().as_str()).increment(1);
        self.start_flight(state, key, loader, batch)
    }

    fn start_flight<F, Fut>(
        &self,
        state: &mut State<V>,
        key: &ResourceKey,
        loader: F,
        batch: &mut NotificationBatch<V>,
    ) -> SharedFetch<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let id = state.next_flight;
        state.next_flight += 1;

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = AssertUnwindSafe(async move { loader().await })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(FetchError::transport("loader panicked")));
            histogram!(METRIC_FETCH_MS, "domain" => task_key.domain().as_str())
                .record(started.elapsed().as_secs_f64() * 1000.0);
            complete(&inner, &task_key, id, &result);
            result
        });
        let abort = task.abort_handle();
        let shared = async move {
            match task.await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => Err(FetchError::cancelled()),
                Err(err) => Err(FetchError::transport(format!("fetch task failed: {err}"))),
            }
        }
        .boxed()
        .shared();

        state.flights.insert(
            key.clone(),
            Flight {
                id,
                shared: shared.clone(),
                abort,
            },
        );

        if state.entries.peek(key).is_none() {
            self.insert_entry(state, key, CacheEntry::loading(), batch);
        }
        self.queue_snapshot(state, key, Instant::now(), batch);

        debug!(key = %key, flight_id = id, "Fetch started");
        shared
    }

    fn write_value(
        &self,
        state: &mut State<V>,
        key: &ResourceKey,
        value: V,
        now: Instant,
        batch: &mut NotificationBatch<V>,
    ) {
        state.flights.remove(key);
        match state.entries.get_mut(key) {
            Some(entry) => entry.resolve(value, now),
            None => self.insert_entry(state, key, CacheEntry::resolved(value, now), batch),
        }
    }

    fn insert_entry(
        &self,
        state: &mut State<V>,
        key: &ResourceKey,
        entry: CacheEntry<V>,
        batch: &mut NotificationBatch<V>,
    ) {
        insert_entry(state, &self.inner.subscribers, key, entry, batch);
    }

    fn snapshot_locked(&self, state: &State<V>, key: &ResourceKey, now: Instant) -> EntrySnapshot<V> {
        snapshot_locked(&self.inner.config, state, key, now)
    }

    fn queue_snapshot(
        &self,
        state: &State<V>,
        key: &ResourceKey,
        now: Instant,
        batch: &mut NotificationBatch<V>,
    ) {
        let callbacks = self.inner.subscribers.callbacks(key);
        if !callbacks.is_empty() {
            batch.push(callbacks, self.snapshot_locked(state, key, now));
        }
    }
}

/// Insert under the LRU bound. Subscribers of an evicted key are told it is
/// empty again.
fn insert_entry<V: Clone>(
    state: &mut State<V>,
    subscribers: &Subscribers<V>,
    key: &ResourceKey,
    entry: CacheEntry<V>,
    batch: &mut NotificationBatch<V>,
) {
    if let Some((evicted, _)) = state.entries.push(key.clone(), entry)
        && &evicted != key
    {
        counter!(METRIC_EVICT, "domain" => evicted.domain().as_str()).increment(1);
        debug!(key = %evicted, "Cache entry evicted");
        let snapshot = EntrySnapshot {
            fetching: state.flights.contains_key(&evicted),
            ..EntrySnapshot::empty()
        };
        batch.push(subscribers.callbacks(&evicted), snapshot);
    }
}

fn snapshot_locked<V: Clone>(
    config: &CacheConfig,
    state: &State<V>,
    key: &ResourceKey,
    now: Instant,
) -> EntrySnapshot<V> {
    let fetching = state.flights.contains_key(key);
    let window = config.freshness_for(key.domain());
    match state.entries.peek(key) {
        Some(entry) => entry.snapshot(now, window, fetching),
        None => EntrySnapshot {
            fetching,
            ..EntrySnapshot::empty()
        },
    }
}

/// Record a finished fetch, unless the key was invalidated, patched or
/// cleared while it ran.
fn complete<V: Clone>(inner: &Inner<V>, key: &ResourceKey, id: u64, result: &FetchResult<V>) {
    let mut batch = NotificationBatch::new();
    {
        let mut state = mutex_lock(&inner.state, SOURCE, "complete");
        if state.flights.get(key).map(|flight| flight.id) != Some(id) {
            debug!(key = %key, flight_id = id, "Discarding superseded fetch result");
            return;
        }
        state.flights.remove(key);

        let now = Instant::now();
        match result {
            Ok(value) => match state.entries.get_mut(key) {
                Some(entry) => entry.resolve(value.clone(), now),
                None => insert_entry(
                    &mut state,
                    &inner.subscribers,
                    key,
                    CacheEntry::resolved(value.clone(), now),
                    &mut batch,
                ),
            },
            Err(error) => {
                counter!(METRIC_FETCH_ERROR, "domain" => key.domain().as_str()).increment(1);
                warn!(key = %key, error = %error, "Fetch failed; keeping last known value");
                match state.entries.get_mut(key) {
                    Some(entry) => entry.fail(error.clone()),
                    None => insert_entry(
                        &mut state,
                        &inner.subscribers,
                        key,
                        CacheEntry::failed(error.clone()),
                        &mut batch,
                    ),
                }
            }
        }

        let callbacks = inner.subscribers.callbacks(key);
        if !callbacks.is_empty() {
            batch.push(callbacks, snapshot_locked(&inner.config, &state, key, now));
        }
    }
    batch.dispatch();
}
