//! Per-key cache entries and the snapshots handed to subscribers.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use super::error::FetchError;

/// Observable state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    /// Nothing cached and nothing requested.
    Empty,
    /// First fetch in flight; no value yet.
    Loading,
    /// Value within its freshness window.
    Fresh,
    /// Value older than its freshness window.
    Stale,
    /// Latest fetch failed; any previous value is retained.
    Error,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntryStatus::Empty => "empty",
            EntryStatus::Loading => "loading",
            EntryStatus::Fresh => "fresh",
            EntryStatus::Stale => "stale",
            EntryStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Status as recorded; `Stale` is derived from age at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recorded {
    Loading,
    Resolved,
    Failed,
}

pub(crate) struct CacheEntry<V> {
    value: Option<V>,
    recorded: Recorded,
    fetched_at: Option<Instant>,
    error: Option<FetchError>,
}

impl<V: Clone> CacheEntry<V> {
    pub(crate) fn loading() -> Self {
        Self {
            value: None,
            recorded: Recorded::Loading,
            fetched_at: None,
            error: None,
        }
    }

    pub(crate) fn resolved(value: V, now: Instant) -> Self {
        Self {
            value: Some(value),
            recorded: Recorded::Resolved,
            fetched_at: Some(now),
            error: None,
        }
    }

    pub(crate) fn failed(error: FetchError) -> Self {
        Self {
            value: None,
            recorded: Recorded::Failed,
            fetched_at: None,
            error: Some(error),
        }
    }

    pub(crate) fn resolve(&mut self, value: V, now: Instant) {
        self.value = Some(value);
        self.recorded = Recorded::Resolved;
        self.fetched_at = Some(now);
        self.error = None;
    }

    /// Record a failure; the last good value stays in place.
    pub(crate) fn fail(&mut self, error: FetchError) {
        self.recorded = Recorded::Failed;
        self.error = Some(error);
    }

    pub(crate) fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub(crate) fn status(&self, now: Instant, window: Duration) -> EntryStatus {
        match self.recorded {
            Recorded::Loading => EntryStatus::Loading,
            Recorded::Failed => EntryStatus::Error,
            Recorded::Resolved => match self.fetched_at {
                Some(at) if now.saturating_duration_since(at) < window => EntryStatus::Fresh,
                _ => EntryStatus::Stale,
            },
        }
    }

    pub(crate) fn snapshot(&self, now: Instant, window: Duration, fetching: bool) -> EntrySnapshot<V> {
        EntrySnapshot {
            value: self.value.clone(),
            status: self.status(now, window),
            error: self.error.clone(),
            fetching,
        }
    }
}

/// Point-in-time view of a key: `{value, status, error}` plus whether a
/// fetch is currently running for it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot<V> {
    pub value: Option<V>,
    pub status: EntryStatus,
    pub error: Option<FetchError>,
    pub fetching: bool,
}

impl<V> EntrySnapshot<V> {
    pub fn empty() -> Self {
        Self {
            value: None,
            status: EntryStatus::Empty,
            error: None,
            fetching: false,
        }
    }

    /// True when the consumer has nothing to show and nothing is coming.
    pub fn needs_fetch(&self) -> bool {
        self.status == EntryStatus::Empty && !self.fetching
    }
}

impl<V> Default for EntrySnapshot<V> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn resolved_entry_ages_into_stale() {
        let entry = CacheEntry::resolved("v1", Instant::now());
        assert_eq!(entry.status(Instant::now(), WINDOW), EntryStatus::Fresh);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(entry.status(Instant::now(), WINDOW), EntryStatus::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_window_is_immediately_stale() {
        let entry = CacheEntry::resolved("v1", Instant::now());
        assert_eq!(
            entry.status(Instant::now(), Duration::ZERO),
            EntryStatus::Stale
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_previous_value() {
        let mut entry = CacheEntry::resolved("v1", Instant::now());
        entry.fail(FetchError::status(500, "boom"));

        let snapshot = entry.snapshot(Instant::now(), WINDOW, false);
        assert_eq!(snapshot.status, EntryStatus::Error);
        assert_eq!(snapshot.value, Some("v1"));
        assert_eq!(snapshot.error.map(|e| e.message), Some("boom".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_clears_error() {
        let mut entry: CacheEntry<&str> = CacheEntry::failed(FetchError::transport("offline"));
        entry.resolve("v2", Instant::now());

        let snapshot = entry.snapshot(Instant::now(), WINDOW, false);
        assert_eq!(snapshot.status, EntryStatus::Fresh);
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn empty_snapshot_needs_fetch() {
        let snapshot: EntrySnapshot<()> = EntrySnapshot::empty();
        assert!(snapshot.needs_fetch());

        let loading = EntrySnapshot::<()> {
            fetching: true,
            ..EntrySnapshot::empty()
        };
        assert!(!loading.needs_fetch());
    }
}
