//! Resource key definitions.
//!
//! Defines `ResourceKey` for cacheable server resources and `KeyScope` for
//! selecting families of keys during invalidation.

use std::fmt;

/// Identifies one cacheable unit of server-held data.
///
/// Keys compare structurally: two keys built from equal parameters address the
/// same cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    // Singletons
    /// Current session status as reported by the server.
    Session,
    /// Dashboard counters for the signed-in user.
    UserStats,
    /// Walls owned by the signed-in user.
    MyWalls,
    /// Walls shared with the signed-in user.
    SharedWalls,

    // Per-wall
    /// A single wall by id.
    Wall(String),
    /// Member list of a wall.
    WallMembers(String),
    /// One page of a wall's memory feed (pages start at 1).
    MemoriesPage { wall_id: String, page: u32 },
    /// A single memory.
    Memory { wall_id: String, memory_id: String },
}

/// Coarse grouping of keys; freshness windows are configured per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDomain {
    Session,
    UserStats,
    MyWalls,
    SharedWalls,
    Wall,
    WallMembers,
    MemoriesPage,
    Memory,
}

impl KeyDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyDomain::Session => "session",
            KeyDomain::UserStats => "user_stats",
            KeyDomain::MyWalls => "my_walls",
            KeyDomain::SharedWalls => "shared_walls",
            KeyDomain::Wall => "wall",
            KeyDomain::WallMembers => "wall_members",
            KeyDomain::MemoriesPage => "memories_page",
            KeyDomain::Memory => "memory",
        }
    }
}

impl ResourceKey {
    pub fn wall(id: impl Into<String>) -> Self {
        Self::Wall(id.into())
    }

    pub fn wall_members(wall_id: impl Into<String>) -> Self {
        Self::WallMembers(wall_id.into())
    }

    pub fn memories_page(wall_id: impl Into<String>, page: u32) -> Self {
        Self::MemoriesPage {
            wall_id: wall_id.into(),
            page,
        }
    }

    pub fn memory(wall_id: impl Into<String>, memory_id: impl Into<String>) -> Self {
        Self::Memory {
            wall_id: wall_id.into(),
            memory_id: memory_id.into(),
        }
    }

    pub fn domain(&self) -> KeyDomain {
        match self {
            ResourceKey::Session => KeyDomain::Session,
            ResourceKey::UserStats => KeyDomain::UserStats,
            ResourceKey::MyWalls => KeyDomain::MyWalls,
            ResourceKey::SharedWalls => KeyDomain::SharedWalls,
            ResourceKey::Wall(_) => KeyDomain::Wall,
            ResourceKey::WallMembers(_) => KeyDomain::WallMembers,
            ResourceKey::MemoriesPage { .. } => KeyDomain::MemoriesPage,
            ResourceKey::Memory { .. } => KeyDomain::Memory,
        }
    }

    /// The wall this key belongs to, if any.
    pub fn wall_id(&self) -> Option<&str> {
        match self {
            ResourceKey::Wall(id) | ResourceKey::WallMembers(id) => Some(id),
            ResourceKey::MemoriesPage { wall_id, .. } | ResourceKey::Memory { wall_id, .. } => {
                Some(wall_id)
            }
            _ => None,
        }
    }

    /// Whether the data behind this key belongs to the signed-in user.
    ///
    /// Identity-scoped keys are only fetched while a user is authenticated.
    pub fn is_identity_scoped(&self) -> bool {
        !matches!(self, ResourceKey::Session)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Session => f.write_str("auth/status"),
            ResourceKey::UserStats => f.write_str("user/stats"),
            ResourceKey::MyWalls => f.write_str("walls/my"),
            ResourceKey::SharedWalls => f.write_str("walls/shared"),
            ResourceKey::Wall(id) => write!(f, "walls/{id}"),
            ResourceKey::WallMembers(id) => write!(f, "walls/{id}/members"),
            ResourceKey::MemoriesPage { wall_id, page } => {
                write!(f, "walls/{wall_id}/memories?page={page}")
            }
            ResourceKey::Memory { wall_id, memory_id } => {
                write!(f, "walls/{wall_id}/memories/{memory_id}")
            }
        }
    }
}

/// Selects a set of keys for invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyScope {
    /// Exactly one key.
    Exact(ResourceKey),
    /// Every page of a wall's memory feed.
    MemoryPages(String),
    /// Every key that belongs to a wall (detail, members, pages, memories).
    Wall(String),
}

impl KeyScope {
    pub fn matches(&self, key: &ResourceKey) -> bool {
        match self {
            KeyScope::Exact(exact) => exact == key,
            KeyScope::MemoryPages(wall) => matches!(
                key,
                ResourceKey::MemoriesPage { wall_id, .. } if wall_id == wall
            ),
            KeyScope::Wall(wall) => key.wall_id() == Some(wall.as_str()),
        }
    }
}

impl From<ResourceKey> for KeyScope {
    fn from(key: ResourceKey) -> Self {
        KeyScope::Exact(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_compare_by_value() {
        let owned = String::from("W1");
        assert_eq!(ResourceKey::wall("W1"), ResourceKey::Wall(owned));
        assert_eq!(
            ResourceKey::memories_page("W1", 2),
            ResourceKey::MemoriesPage {
                wall_id: "W1".to_string(),
                page: 2,
            }
        );
        assert_ne!(ResourceKey::wall("W1"), ResourceKey::wall_members("W1"));
        assert_ne!(
            ResourceKey::memories_page("W1", 1),
            ResourceKey::memories_page("W1", 2)
        );
    }

    #[test]
    fn equal_keys_share_one_map_slot() {
        let mut slots = std::collections::HashMap::new();
        slots.insert(ResourceKey::memory("W1", "M1"), 1);
        slots.insert(ResourceKey::memory(String::from("W1"), String::from("M1")), 2);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[&ResourceKey::memory("W1", "M1")], 2);
    }

    #[test]
    fn memory_pages_scope_covers_only_pages_of_that_wall() {
        let scope = KeyScope::MemoryPages("W1".to_string());

        assert!(scope.matches(&ResourceKey::memories_page("W1", 1)));
        assert!(scope.matches(&ResourceKey::memories_page("W1", 7)));
        assert!(!scope.matches(&ResourceKey::memories_page("W2", 1)));
        assert!(!scope.matches(&ResourceKey::memory("W1", "M1")));
        assert!(!scope.matches(&ResourceKey::wall("W1")));
    }

    #[test]
    fn wall_scope_covers_every_key_of_the_wall() {
        let scope = KeyScope::Wall("W1".to_string());

        assert!(scope.matches(&ResourceKey::wall("W1")));
        assert!(scope.matches(&ResourceKey::wall_members("W1")));
        assert!(scope.matches(&ResourceKey::memories_page("W1", 3)));
        assert!(scope.matches(&ResourceKey::memory("W1", "M9")));
        assert!(!scope.matches(&ResourceKey::MyWalls));
        assert!(!scope.matches(&ResourceKey::wall("W2")));
    }

    #[test]
    fn session_is_the_only_unscoped_key() {
        assert!(!ResourceKey::Session.is_identity_scoped());
        assert!(ResourceKey::UserStats.is_identity_scoped());
        assert!(ResourceKey::wall("W1").is_identity_scoped());
    }

    #[test]
    fn display_reads_like_a_path() {
        assert_eq!(
            ResourceKey::memories_page("W1", 2).to_string(),
            "walls/W1/memories?page=2"
        );
        assert_eq!(ResourceKey::MyWalls.to_string(), "walls/my");
    }
}
