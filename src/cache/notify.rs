//! Subscriber registry and consumer-side handles.
//!
//! The registry only holds `Weak` references to callbacks; the `Subscription`
//! handle owned by the consumer keeps the callback alive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tokio::sync::watch;
use tracing::trace;

use super::entry::EntrySnapshot;
use super::keys::ResourceKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::notify";

pub(crate) type Callback<V> = dyn Fn(&EntrySnapshot<V>) + Send + Sync;

struct Listener<V> {
    id: u64,
    callback: Weak<Callback<V>>,
    active: Arc<AtomicBool>,
}

/// Callbacks registered per key.
pub(crate) struct Subscribers<V> {
    listeners: RwLock<HashMap<ResourceKey, Vec<Listener<V>>>>,
    next_id: AtomicU64,
}

impl<V> Subscribers<V> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn register(
        &self,
        key: &ResourceKey,
        callback: &Arc<Callback<V>>,
        active: &Arc<AtomicBool>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        rw_write(&self.listeners, SOURCE, "register")
            .entry(key.clone())
            .or_default()
            .push(Listener {
                id,
                callback: Arc::downgrade(callback),
                active: Arc::clone(active),
            });
        id
    }

    /// Remove one listener; returns false when it was already gone.
    pub(crate) fn remove(&self, key: &ResourceKey, id: u64) -> bool {
        let mut listeners = rw_write(&self.listeners, SOURCE, "remove");
        let Some(list) = listeners.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|listener| listener.id != id && listener.callback.strong_count() > 0);
        let removed = list.len() < before;
        if list.is_empty() {
            listeners.remove(key);
        }
        removed
    }

    /// Live callbacks for `key`.
    pub(crate) fn callbacks(&self, key: &ResourceKey) -> Vec<Arc<Callback<V>>> {
        rw_read(&self.listeners, SOURCE, "callbacks")
            .get(key)
            .map(|list| {
                list.iter()
                    .filter_map(|listener| listener.callback.upgrade())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every registration and hand back the callbacks that were still live.
    ///
    /// The owning handles are marked inactive before the callbacks are returned.
    pub(crate) fn drain(&self) -> Vec<Arc<Callback<V>>> {
        let drained = std::mem::take(&mut *rw_write(&self.listeners, SOURCE, "drain"));
        drained
            .into_values()
            .flatten()
            .filter_map(|listener| {
                listener.active.store(false, Ordering::Release);
                listener.callback.upgrade()
            })
            .collect()
    }

    pub(crate) fn count(&self, key: &ResourceKey) -> usize {
        rw_read(&self.listeners, SOURCE, "count")
            .get(key)
            .map(|list| {
                list.iter()
                    .filter(|listener| listener.callback.strong_count() > 0)
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Notifications collected while the cache lock is held, delivered after it
/// is released.
pub(crate) struct NotificationBatch<V> {
    pending: Vec<(Vec<Arc<Callback<V>>>, EntrySnapshot<V>)>,
}

impl<V> NotificationBatch<V> {
    pub(crate) fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, callbacks: Vec<Arc<Callback<V>>>, snapshot: EntrySnapshot<V>) {
        if !callbacks.is_empty() {
            self.pending.push((callbacks, snapshot));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.iter().map(|(callbacks, _)| callbacks.len()).sum()
    }

    pub(crate) fn dispatch(self) {
        let deliveries = self.len();
        for (callbacks, snapshot) in self.pending {
            for callback in callbacks {
                callback(&snapshot);
            }
        }
        if deliveries > 0 {
            trace!(deliveries, "Cache notifications delivered");
        }
    }
}

/// Consumer-owned registration of interest in one key.
///
/// Dropping the handle unsubscribes. `unsubscribe` may be called any number
/// of times, including after the cache was cleared.
pub struct Subscription<V> {
    key: ResourceKey,
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<Subscribers<V>>,
    _callback: Arc<Callback<V>>,
}

impl<V> Subscription<V> {
    pub(crate) fn new(
        key: ResourceKey,
        registry: &Arc<Subscribers<V>>,
        callback: Arc<Callback<V>>,
    ) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let id = registry.register(&key, &callback, &active);
        Self {
            key,
            id,
            active,
            registry: Arc::downgrade(registry),
            _callback: callback,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// False once unsubscribed, dropped from the registry by `clear_all`,
    /// or after the cache itself is gone.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && self.registry.strong_count() > 0
    }

    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.key, self.id);
        }
    }
}

impl<V> Drop for Subscription<V> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Read-and-subscribe binding for one key.
///
/// Holds the latest snapshot in a watch channel; `changed` resolves on the
/// next notification, or with `None` once the binding no longer receives
/// any.
pub struct Binding<V> {
    receiver: watch::Receiver<EntrySnapshot<V>>,
    subscription: Subscription<V>,
}

impl<V: Clone + Send + Sync + 'static> Binding<V> {
    pub(crate) fn new(
        key: ResourceKey,
        registry: &Arc<Subscribers<V>>,
        initial: EntrySnapshot<V>,
    ) -> Self {
        let (sender, receiver) = watch::channel(initial);
        let callback: Arc<Callback<V>> = Arc::new(move |snapshot: &EntrySnapshot<V>| {
            sender.send_replace(snapshot.clone());
        });
        Self {
            receiver,
            subscription: Subscription::new(key, registry, callback),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        self.subscription.key()
    }

    pub fn current(&self) -> EntrySnapshot<V> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next notification and return the new snapshot.
    ///
    /// A snapshot delivered before detachment is still returned; after that
    /// the binding yields `None` instead of waiting forever.
    pub async fn changed(&mut self) -> Option<EntrySnapshot<V>> {
        if !self.receiver.has_changed().unwrap_or(false) && !self.subscription.is_active() {
            return None;
        }
        // The sender lives inside our own subscription, so it cannot close first.
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }
}
