//! Cache configuration.
//!
//! Freshness windows per key domain and the entry bound, loaded from the
//! `[cache]` section of `memwall.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use super::keys::KeyDomain;

// Default windows in seconds.
const SHORT_SECS: u64 = 2 * 60;
const MEDIUM_SECS: u64 = 5 * 60;
const LONG_SECS: u64 = 10 * 60;
const STATS_SECS: u64 = 60;
const DEFAULT_MAX_ENTRIES: usize = 512;

/// How long a fetched value counts as fresh, per key domain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FreshnessWindows {
    pub session_secs: u64,
    pub user_stats_secs: u64,
    pub my_walls_secs: u64,
    pub shared_walls_secs: u64,
    pub wall_secs: u64,
    pub wall_members_secs: u64,
    pub memories_page_secs: u64,
    pub memory_secs: u64,
}

impl Default for FreshnessWindows {
    fn default() -> Self {
        Self {
            session_secs: 0,
            user_stats_secs: STATS_SECS,
            my_walls_secs: MEDIUM_SECS,
            shared_walls_secs: SHORT_SECS,
            wall_secs: MEDIUM_SECS,
            wall_members_secs: SHORT_SECS,
            memories_page_secs: SHORT_SECS,
            memory_secs: MEDIUM_SECS,
        }
    }
}

impl FreshnessWindows {
    /// Every domain shares one window; handy for tests and scripts.
    pub fn uniform(window: Duration) -> Self {
        let secs = window.as_secs();
        Self {
            session_secs: secs,
            user_stats_secs: secs,
            my_walls_secs: secs,
            shared_walls_secs: secs,
            wall_secs: secs,
            wall_members_secs: secs,
            memories_page_secs: secs,
            memory_secs: secs,
        }
    }

    pub fn for_domain(&self, domain: KeyDomain) -> Duration {
        let secs = match domain {
            KeyDomain::Session => self.session_secs,
            KeyDomain::UserStats => self.user_stats_secs,
            KeyDomain::MyWalls => self.my_walls_secs,
            KeyDomain::SharedWalls => self.shared_walls_secs,
            KeyDomain::Wall => self.wall_secs,
            KeyDomain::WallMembers => self.wall_members_secs,
            KeyDomain::MemoriesPage => self.memories_page_secs,
            KeyDomain::Memory => self.memory_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Reference windows from the UI's short/medium/long tiers.
pub const SHORT_WINDOW: Duration = Duration::from_secs(SHORT_SECS);
pub const MEDIUM_WINDOW: Duration = Duration::from_secs(MEDIUM_SECS);
pub const LONG_WINDOW: Duration = Duration::from_secs(LONG_SECS);

/// Cache configuration from `memwall.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached entries before least-recently-used eviction.
    pub max_entries: usize,
    /// Freshness window per key domain.
    pub freshness: FreshnessWindows,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            freshness: FreshnessWindows::default(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            max_entries: settings.max_entries,
            freshness: settings.freshness.clone(),
        }
    }
}

impl CacheConfig {
    /// Returns the entry bound as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn freshness_for(&self, domain: KeyDomain) -> Duration {
        self.freshness.for_domain(domain)
    }
}
