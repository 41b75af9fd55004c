//! Dependency table: which cached keys each write makes stale.
//!
//! Every server-side write the client performs is described by a `Mutation`.
//! `Mutation::record` turns it into the `MutationRecord` the cache applies
//! before the write is reported back to its caller.

use std::fmt;

use memwall_api_types::{Memory, Wall, WallDetail};

use crate::cache::{KeyScope, MutationRecord, ResourceKey};

use super::resources::Resource;

/// A completed write, carrying whatever the server returned for it.
#[derive(Debug, Clone)]
pub enum Mutation {
    WallCreated { wall: Wall },
    /// `detail` is the server's updated wall merged with the viewer-specific
    /// fields already known to the client.
    WallUpdated { detail: WallDetail },
    WallDeleted { wall_id: String },
    MemberInvited { wall_id: String },
    MemberRoleUpdated { wall_id: String, user_id: String },
    MemberRemoved { wall_id: String, user_id: String },
    MemoryCreated { memory: Memory },
    MemoryUpdated { memory: Memory },
    MemoryDeleted { wall_id: String, memory_id: String },
    PasswordUpdated,
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::WallCreated { .. } => "wall_created",
            Mutation::WallUpdated { .. } => "wall_updated",
            Mutation::WallDeleted { .. } => "wall_deleted",
            Mutation::MemberInvited { .. } => "member_invited",
            Mutation::MemberRoleUpdated { .. } => "member_role_updated",
            Mutation::MemberRemoved { .. } => "member_removed",
            Mutation::MemoryCreated { .. } => "memory_created",
            Mutation::MemoryUpdated { .. } => "memory_updated",
            Mutation::MemoryDeleted { .. } => "memory_deleted",
            Mutation::PasswordUpdated => "password_updated",
        }
    }

    /// Invalidations and optimistic patches for this write.
    pub fn record(&self) -> MutationRecord<Resource> {
        let record = MutationRecord::new();
        match self {
            Mutation::WallCreated { .. } => wall_lists(record),
            Mutation::WallUpdated { detail } => wall_lists(record).patch(
                ResourceKey::wall(detail.wall.id.clone()),
                Resource::Wall(detail.clone()),
            ),
            Mutation::WallDeleted { wall_id } => {
                wall_lists(record).invalidate(KeyScope::Wall(wall_id.clone()))
            }
            // Member counts show up on the wall, the owner's list and the stats.
            Mutation::MemberInvited { wall_id } | Mutation::MemberRemoved { wall_id, .. } => {
                record
                    .invalidate(ResourceKey::wall_members(wall_id.clone()))
                    .invalidate(ResourceKey::wall(wall_id.clone()))
                    .invalidate(ResourceKey::MyWalls)
                    .invalidate(ResourceKey::UserStats)
            }
            Mutation::MemberRoleUpdated { wall_id, .. } => {
                record.invalidate(ResourceKey::wall_members(wall_id.clone()))
            }
            Mutation::MemoryCreated { memory } => memory_lists(record, &memory.wall_id),
            Mutation::MemoryUpdated { memory } => memory_lists(record, &memory.wall_id).patch(
                ResourceKey::memory(memory.wall_id.clone(), memory.id.clone()),
                Resource::Memory(memory.clone()),
            ),
            Mutation::MemoryDeleted { wall_id, memory_id } => memory_lists(record, wall_id)
                .invalidate(ResourceKey::memory(wall_id.clone(), memory_id.clone())),
            Mutation::PasswordUpdated => record,
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn wall_lists(record: MutationRecord<Resource>) -> MutationRecord<Resource> {
    record
        .invalidate(ResourceKey::MyWalls)
        .invalidate(ResourceKey::SharedWalls)
        .invalidate(ResourceKey::UserStats)
}

/// Memory counts are aggregated into both wall lists, the wall detail and the
/// dashboard stats.
fn memory_lists(record: MutationRecord<Resource>, wall_id: &str) -> MutationRecord<Resource> {
    wall_lists(record)
        .invalidate(KeyScope::MemoryPages(wall_id.to_string()))
        .invalidate(ResourceKey::wall(wall_id))
}
