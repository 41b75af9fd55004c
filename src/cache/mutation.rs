//! Cache effects of a completed mutation.
//!
//! A `MutationRecord` lists the key scopes a write makes stale and the
//! optimistic values to store right away. The cache applies a record as one
//! step.

use std::fmt;

use uuid::Uuid;

use super::keys::{KeyScope, ResourceKey};

/// Invalidations and patches produced by one mutation.
#[derive(Debug, Clone)]
pub struct MutationRecord<V> {
    id: Uuid,
    invalidations: Vec<KeyScope>,
    patches: Vec<(ResourceKey, V)>,
}

impl<V> Default for MutationRecord<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Display for MutationRecord<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MutationRecord {{ id: {}, invalidate: {}, patch: {} }}",
            self.id,
            self.invalidations.len(),
            self.patches.len(),
        )
    }
}

impl<V> MutationRecord<V> {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            invalidations: Vec::new(),
            patches: Vec::new(),
        }
    }

    /// Mark `scope` stale. Duplicate scopes are kept once.
    pub fn invalidate(mut self, scope: impl Into<KeyScope>) -> Self {
        let scope = scope.into();
        if !self.invalidations.contains(&scope) {
            self.invalidations.push(scope);
        }
        self
    }

    pub fn invalidate_all<I>(self, scopes: I) -> Self
    where
        I: IntoIterator<Item = KeyScope>,
    {
        scopes.into_iter().fold(self, Self::invalidate)
    }

    /// Store `value` for `key` as fresh once the invalidations ran.
    /// A later patch for the same key replaces an earlier one.
    pub fn patch(mut self, key: ResourceKey, value: V) -> Self {
        self.patches.retain(|(existing, _)| existing != &key);
        self.patches.push((key, value));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn invalidations(&self) -> &[KeyScope] {
        &self.invalidations
    }

    pub fn patches(&self) -> impl Iterator<Item = (&ResourceKey, &V)> {
        self.patches.iter().map(|(key, value)| (key, value))
    }

    pub fn is_empty(&self) -> bool {
        self.invalidations.is_empty() && self.patches.is_empty()
    }

    /// Whether applying this record touches `key`.
    pub fn affects(&self, key: &ResourceKey) -> bool {
        self.invalidations.iter().any(|scope| scope.matches(key))
            || self.patches.iter().any(|(patched, _)| patched == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_scopes_are_merged() {
        let record: MutationRecord<()> = MutationRecord::new()
            .invalidate(ResourceKey::MyWalls)
            .invalidate(ResourceKey::MyWalls)
            .invalidate(KeyScope::MemoryPages("W1".into()));

        assert_eq!(record.invalidations().len(), 2);
    }

    #[test]
    fn later_patch_wins() {
        let record = MutationRecord::new()
            .patch(ResourceKey::wall("W1"), "old")
            .patch(ResourceKey::wall("W1"), "new");

        let patches: Vec<_> = record.patches().collect();
        assert_eq!(patches, vec![(&ResourceKey::wall("W1"), &"new")]);
    }

    #[test]
    fn affects_covers_scopes_and_patches() {
        let record = MutationRecord::new()
            .invalidate(KeyScope::MemoryPages("W1".into()))
            .patch(ResourceKey::memory("W1", "M1"), 1);

        assert!(record.affects(&ResourceKey::memories_page("W1", 4)));
        assert!(record.affects(&ResourceKey::memory("W1", "M1")));
        assert!(!record.affects(&ResourceKey::memories_page("W2", 1)));
        assert!(!record.is_empty());
        assert!(MutationRecord::<u8>::new().is_empty());
    }

    #[test]
    fn records_get_distinct_ids() {
        let a: MutationRecord<()> = MutationRecord::new();
        let b: MutationRecord<()> = MutationRecord::new();
        assert_ne!(a.id(), b.id());
    }
}
