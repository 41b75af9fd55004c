//! Client façade tying the provider, the fetch cache and the session gate
//! together.
//!
//! Reads go through the cache. Writes call the provider, apply the write's
//! invalidations, and only then return. Identity changes go through the
//! session gate, which clears the cache.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use memwall_api_types::{
    CreateMemoryData, CreateWallData, InviteUserData, LoginData, MemoriesPage, Memory, Role,
    SessionStatus, SharedWall, UpdateMemoryData, UpdatePasswordData, UpdateWallData, User,
    UserStats, Wall, WallDetail, WallMember,
};
use tracing::{debug, info, instrument, warn};

use crate::cache::{
    Binding, CacheConfig, EntrySnapshot, EntryStatus, FetchCache, FetchError, FetchOptions, ResourceKey,
    SessionGate, SessionState, Subscription, UserId,
};
use crate::domain::validation::{self, RegisterForm};

use super::error::AppError;
use super::mutations::Mutation;
use super::provider::{ProviderResult, ResourceProvider};
use super::resources::Resource;

type Loader = Box<dyn FnOnce() -> BoxFuture<'static, ProviderResult<Resource>> + Send>;

#[derive(Clone)]
pub struct WallClient {
    provider: Arc<dyn ResourceProvider>,
    cache: FetchCache<Resource>,
    session: Arc<SessionGate>,
}

impl WallClient {
    pub fn new(provider: Arc<dyn ResourceProvider>, config: CacheConfig) -> Self {
        let cache = FetchCache::new(config);
        let session = Arc::new(SessionGate::new(Arc::new(cache.clone())));
        Self {
            provider,
            cache,
            session,
        }
    }

    pub fn cache(&self) -> &FetchCache<Resource> {
        &self.cache
    }

    pub fn session(&self) -> &SessionGate {
        &self.session
    }

    pub fn session_state(&self) -> SessionState {
        self.session.current()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Cached read of `key`, loading it from the provider when needed.
    pub async fn fetch(&self, key: &ResourceKey) -> ProviderResult<Resource> {
        self.fetch_with(key, FetchOptions::default()).await
    }

    pub async fn fetch_with(
        &self,
        key: &ResourceKey,
        options: FetchOptions,
    ) -> ProviderResult<Resource> {
        let loader = self.loader(key)?;
        self.cache.get_with(key, loader, options).await
    }

    /// Go to the provider even when the cached value is fresh.
    pub async fn refetch(&self, key: &ResourceKey) -> ProviderResult<Resource> {
        let loader = self.loader(key)?;
        self.cache.refetch(key, loader).await
    }

    pub fn peek(&self, key: &ResourceKey) -> Option<Resource> {
        self.cache.peek(key)
    }

    /// Current state of `key` plus a live subscription to it.
    ///
    /// Starts a background load when nothing is cached or the value is
    /// stale. Must be called from within a tokio runtime.
    pub fn watch(&self, key: &ResourceKey) -> Binding<Resource> {
        let binding = self.cache.bind(key);
        let current = binding.current();
        let revalidate = !current.fetching
            && matches!(current.status, EntryStatus::Stale | EntryStatus::Error);
        if current.needs_fetch() || revalidate {
            let client = self.clone();
            let key = key.clone();
            tokio::spawn(async move {
                if let Err(err) = client.fetch(&key).await {
                    debug!(key = %key, error = %err, "Background load for binding failed");
                }
            });
        }
        binding
    }

    pub fn subscribe<F>(&self, key: &ResourceKey, callback: F) -> Subscription<Resource>
    where
        F: Fn(&EntrySnapshot<Resource>) + Send + Sync + 'static,
    {
        self.cache.subscribe(key, callback)
    }

    pub async fn session_status(&self) -> ProviderResult<SessionStatus> {
        self.fetch(&ResourceKey::Session).await?.try_into()
    }

    pub async fn user_stats(&self) -> ProviderResult<UserStats> {
        self.fetch(&ResourceKey::UserStats).await?.try_into()
    }

    pub async fn my_walls(&self) -> ProviderResult<Vec<Wall>> {
        self.fetch(&ResourceKey::MyWalls).await?.try_into()
    }

    pub async fn shared_walls(&self) -> ProviderResult<Vec<SharedWall>> {
        self.fetch(&ResourceKey::SharedWalls).await?.try_into()
    }

    pub async fn wall(&self, wall_id: &str) -> ProviderResult<WallDetail> {
        self.fetch(&ResourceKey::wall(wall_id)).await?.try_into()
    }

    pub async fn members(&self, wall_id: &str) -> ProviderResult<Vec<WallMember>> {
        self.fetch(&ResourceKey::wall_members(wall_id))
            .await?
            .try_into()
    }

    pub async fn memories(&self, wall_id: &str, page: u32) -> ProviderResult<MemoriesPage> {
        self.fetch(&ResourceKey::memories_page(wall_id, page))
            .await?
            .try_into()
    }

    pub async fn memory(&self, wall_id: &str, memory_id: &str) -> ProviderResult<Memory> {
        self.fetch(&ResourceKey::memory(wall_id, memory_id))
            .await?
            .try_into()
    }

    /// Loader for `key`, bound to the identity that is signed in right now.
    ///
    /// Identity-scoped keys are refused without a network call while nobody
    /// is signed in.
    fn loader(&self, key: &ResourceKey) -> ProviderResult<Loader> {
        let user_id = self.session.user_id();
        if key.is_identity_scoped() && user_id.is_none() {
            debug!(key = %key, "Refusing identity-scoped fetch without a session");
            return Err(FetchError::unauthenticated());
        }
        let provider = Arc::clone(&self.provider);
        let key = key.clone();
        Ok(Box::new(move || load(provider, key, user_id).boxed()))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Run a provider write, then apply its invalidations before returning.
    async fn mutate<T, Fut, P>(&self, call: Fut, plan: P) -> Result<T, AppError>
    where
        Fut: Future<Output = ProviderResult<T>>,
        P: FnOnce(&T) -> Mutation,
    {
        if !self.session.is_authenticated() {
            return Err(FetchError::unauthenticated().into());
        }
        let output = call.await?;
        let mutation = plan(&output);
        let record = mutation.record();
        let touched = self.cache.apply(&record);
        info!(mutation = %mutation, mutation_id = %record.id(), touched, "Mutation applied");
        Ok(output)
    }

    #[instrument(skip(self, data))]
    pub async fn create_wall(&self, data: &CreateWallData) -> Result<Wall, AppError> {
        validation::validate_create_wall(data)?;
        self.mutate(self.provider.create_wall(data), |wall| {
            Mutation::WallCreated { wall: wall.clone() }
        })
        .await
    }

    /// Update a wall; the cached detail keeps the viewer's role and the
    /// owner's display name, which the update response does not carry.
    #[instrument(skip(self, data))]
    pub async fn update_wall(
        &self,
        wall_id: &str,
        data: &UpdateWallData,
    ) -> Result<WallDetail, AppError> {
        validation::validate_update_wall(data)?;
        let previous = self
            .cache
            .peek(&ResourceKey::wall(wall_id))
            .and_then(|resource| WallDetail::try_from(resource).ok());
        let call = async {
            let wall = self.provider.update_wall(wall_id, data).await?;
            let mut detail = WallDetail::from(wall);
            if let Some(previous) = previous {
                detail.role = previous.role;
                detail.created_by_name = previous.created_by_name;
            }
            Ok::<_, FetchError>(detail)
        };
        self.mutate(call, |detail| Mutation::WallUpdated {
            detail: detail.clone(),
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_wall(&self, wall_id: &str) -> Result<(), AppError> {
        self.mutate(self.provider.delete_wall(wall_id), |_| {
            Mutation::WallDeleted {
                wall_id: wall_id.to_string(),
            }
        })
        .await
    }

    #[instrument(skip(self, data))]
    pub async fn invite_user(&self, wall_id: &str, data: &InviteUserData) -> Result<(), AppError> {
        validation::validate_invite(data)?;
        self.mutate(self.provider.invite_user(wall_id, data), |_| {
            Mutation::MemberInvited {
                wall_id: wall_id.to_string(),
            }
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn update_member_role(
        &self,
        wall_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<(), AppError> {
        self.mutate(self.provider.update_role(wall_id, user_id, role), |_| {
            Mutation::MemberRoleUpdated {
                wall_id: wall_id.to_string(),
                user_id: user_id.to_string(),
            }
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn remove_member(&self, wall_id: &str, user_id: &str) -> Result<(), AppError> {
        self.mutate(self.provider.remove_member(wall_id, user_id), |_| {
            Mutation::MemberRemoved {
                wall_id: wall_id.to_string(),
                user_id: user_id.to_string(),
            }
        })
        .await
    }

    #[instrument(skip(self, data))]
    pub async fn create_memory(
        &self,
        wall_id: &str,
        data: &CreateMemoryData,
    ) -> Result<Memory, AppError> {
        validation::validate_create_memory(data)?;
        self.mutate(self.provider.create_memory(wall_id, data), |memory| {
            Mutation::MemoryCreated {
                memory: memory.clone(),
            }
        })
        .await
    }

    #[instrument(skip(self, data))]
    pub async fn update_memory(
        &self,
        wall_id: &str,
        memory_id: &str,
        data: &UpdateMemoryData,
    ) -> Result<Memory, AppError> {
        validation::validate_update_memory(data)?;
        self.mutate(
            self.provider.update_memory(wall_id, memory_id, data),
            |memory| Mutation::MemoryUpdated {
                memory: memory.clone(),
            },
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_memory(&self, wall_id: &str, memory_id: &str) -> Result<(), AppError> {
        self.mutate(self.provider.delete_memory(wall_id, memory_id), |_| {
            Mutation::MemoryDeleted {
                wall_id: wall_id.to_string(),
                memory_id: memory_id.to_string(),
            }
        })
        .await
    }

    #[instrument(skip(self, data))]
    pub async fn change_password(&self, data: &UpdatePasswordData) -> Result<(), AppError> {
        validation::validate_password_change(data)?;
        self.mutate(self.provider.update_password(data), |_| {
            Mutation::PasswordUpdated
        })
        .await
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Ask the server who is signed in and publish the answer.
    #[instrument(skip(self))]
    pub async fn check_session(&self) -> Result<SessionStatus, AppError> {
        let resource = match self.refetch(&ResourceKey::Session).await {
            Ok(resource) => resource,
            Err(err) => {
                // An unresolved check counts as signed out.
                let transition = self.session.sign_out();
                warn!(error = %err, state = %transition.to, "Session check failed");
                return Err(err.into());
            }
        };
        let status = SessionStatus::try_from(resource)?;
        let transition = match status.authenticated_user() {
            Some(user) => self.session.sign_in(user.id.clone()),
            None => self.session.sign_out(),
        };
        debug!(state = %transition.to, "Session check resolved");
        Ok(status)
    }

    #[instrument(skip(self, data), fields(email = %data.email))]
    pub async fn login(&self, data: &LoginData) -> Result<User, AppError> {
        validation::validate_login(data)?;
        let user = self.provider.login(data).await?;
        self.session.establish(SessionState::Authenticated(user.id.clone()));
        Ok(user)
    }

    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn register(&self, form: RegisterForm) -> Result<User, AppError> {
        validation::validate_register(&form)?;
        let user = self.provider.register(&form.into_payload()).await?;
        self.session.establish(SessionState::Authenticated(user.id.clone()));
        Ok(user)
    }

    /// End the session. Local identity and cache are always cleared, even
    /// when the server call fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if let Err(err) = self.provider.logout().await {
            warn!(error = %err, "Logout request failed; clearing local session anyway");
        }
        self.session.establish(SessionState::Anonymous);
    }

    pub fn current_user_id(&self) -> Option<UserId> {
        self.session.user_id()
    }
}

async fn load(
    provider: Arc<dyn ResourceProvider>,
    key: ResourceKey,
    user_id: Option<UserId>,
) -> ProviderResult<Resource> {
    match key {
        ResourceKey::Session => provider.fetch_session().await.map(Resource::from),
        ResourceKey::UserStats => {
            let user_id = user_id.ok_or_else(FetchError::unauthenticated)?;
            provider.fetch_stats(&user_id).await.map(Resource::from)
        }
        ResourceKey::MyWalls => provider.fetch_my_walls().await.map(Resource::from),
        ResourceKey::SharedWalls => provider.fetch_shared_walls().await.map(Resource::from),
        ResourceKey::Wall(wall_id) => provider.fetch_wall(&wall_id).await.map(Resource::from),
        ResourceKey::WallMembers(wall_id) => {
            provider.fetch_members(&wall_id).await.map(Resource::from)
        }
        ResourceKey::MemoriesPage { wall_id, page } => provider
            .fetch_memories_page(&wall_id, page)
            .await
            .map(Resource::from),
        ResourceKey::Memory { wall_id, memory_id } => provider
            .fetch_memory(&wall_id, &memory_id)
            .await
            .map(Resource::from),
    }
}
