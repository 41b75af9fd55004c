//! Provider trait describing the remote API.

use async_trait::async_trait;
use memwall_api_types::{
    CreateMemoryData, CreateWallData, InviteUserData, LoginData, MemoriesPage, Memory,
    RegisterData, Role, SessionStatus, SharedWall, UpdateMemoryData, UpdatePasswordData,
    UpdateWallData, User, UserStats, Wall, WallDetail, WallMember,
};

use crate::cache::FetchError;

pub type ProviderResult<T> = Result<T, FetchError>;

/// Memory feed page size used by every list request.
pub const MEMORIES_PAGE_LIMIT: u32 = 20;

/// Remote source of truth for every resource the client caches.
///
/// Failures carry an HTTP-like status and a human-readable message.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    // Reads
    async fn fetch_session(&self) -> ProviderResult<SessionStatus>;
    async fn fetch_stats(&self, user_id: &str) -> ProviderResult<UserStats>;
    async fn fetch_my_walls(&self) -> ProviderResult<Vec<Wall>>;
    async fn fetch_shared_walls(&self) -> ProviderResult<Vec<SharedWall>>;
    async fn fetch_wall(&self, wall_id: &str) -> ProviderResult<WallDetail>;
    async fn fetch_members(&self, wall_id: &str) -> ProviderResult<Vec<WallMember>>;
    async fn fetch_memories_page(&self, wall_id: &str, page: u32) -> ProviderResult<MemoriesPage>;
    async fn fetch_memory(&self, wall_id: &str, memory_id: &str) -> ProviderResult<Memory>;

    // Walls
    async fn create_wall(&self, data: &CreateWallData) -> ProviderResult<Wall>;
    async fn update_wall(&self, wall_id: &str, data: &UpdateWallData) -> ProviderResult<Wall>;
    async fn delete_wall(&self, wall_id: &str) -> ProviderResult<()>;

    // Members
    async fn invite_user(&self, wall_id: &str, data: &InviteUserData) -> ProviderResult<()>;
    async fn update_role(&self, wall_id: &str, user_id: &str, role: Role) -> ProviderResult<()>;
    async fn remove_member(&self, wall_id: &str, user_id: &str) -> ProviderResult<()>;

    // Memories
    async fn create_memory(&self, wall_id: &str, data: &CreateMemoryData)
    -> ProviderResult<Memory>;
    async fn update_memory(
        &self,
        wall_id: &str,
        memory_id: &str,
        data: &UpdateMemoryData,
    ) -> ProviderResult<Memory>;
    async fn delete_memory(&self, wall_id: &str, memory_id: &str) -> ProviderResult<()>;

    // Identity
    async fn login(&self, data: &LoginData) -> ProviderResult<User>;
    async fn register(&self, data: &RegisterData) -> ProviderResult<User>;
    async fn logout(&self) -> ProviderResult<()>;
    async fn update_password(&self, data: &UpdatePasswordData) -> ProviderResult<()>;
}
