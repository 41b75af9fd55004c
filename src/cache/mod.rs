//! Memwall data synchronization core.
//!
//! A keyed fetch cache sitting between consumers and the remote API:
//!
//! - **Keys**: `ResourceKey` names every cacheable resource; `KeyScope`
//!   selects families of keys.
//! - **Store**: `FetchCache` deduplicates concurrent loads per key, serves
//!   fresh values without network access and revalidates stale ones in the
//!   background.
//! - **Mutations**: `MutationRecord` carries the invalidations and optimistic
//!   patches of a write; `FetchCache::apply` runs them as one step.
//! - **Subscriptions**: `Subscription` and `Binding` deliver entry snapshots
//!   whenever a key changes.
//! - **Session**: `SessionGate` clears everything when the signed-in identity
//!   changes.
//!
//! ## Configuration
//!
//! Freshness windows and the entry bound come from the `[cache]` section of
//! `memwall.toml`:
//!
//! ```toml
//! [cache]
//! max_entries = 512
//!
//! [cache.freshness]
//! my_walls_secs = 300
//! shared_walls_secs = 120
//! # ... see config.rs for all options
//! ```

mod config;
mod entry;
mod error;
mod keys;
mod lock;
mod mutation;
mod notify;
mod session;
mod store;

pub use config::{CacheConfig, FreshnessWindows, LONG_WINDOW, MEDIUM_WINDOW, SHORT_WINDOW};
pub use entry::{EntrySnapshot, EntryStatus};
pub use error::{DEFAULT_ERROR_MESSAGE, ErrorKind, FetchError};
pub(crate) use lock::mutex_lock;
pub use keys::{KeyDomain, KeyScope, ResourceKey};
pub use mutation::MutationRecord;
pub use notify::{Binding, Subscription};
pub use session::{CacheReset, SessionGate, SessionState, Transition, UserId};
pub use store::{FetchCache, FetchOptions, StalePolicy};

/// Metric names, for recorders and dashboards.
pub mod metric_names {
    pub use super::session::METRIC_TRANSITION as SESSION_TRANSITION;
    pub use super::store::{
        METRIC_EVICT as EVICT, METRIC_FETCH_ERROR as FETCH_ERROR, METRIC_FETCH_MS as FETCH_MS,
        METRIC_HIT as HIT, METRIC_INVALIDATE as INVALIDATE, METRIC_JOIN as JOIN,
        METRIC_MISS as MISS, METRIC_RESET as RESET, METRIC_STALE_HIT as STALE_HIT,
    };
}
