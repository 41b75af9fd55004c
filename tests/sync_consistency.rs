//! Consistency guarantees of the client: single-flight reads, coordinated
//! invalidation after writes and cache resets on identity changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use memwall::application::client::WallClient;
use memwall::application::provider::{ProviderResult, ResourceProvider};
use memwall::application::resources::Resource;
use memwall::cache::{CacheConfig, EntryStatus, ErrorKind, FetchError, ResourceKey, SessionState};
use memwall::domain::validation::RegisterForm;
use memwall_api_types::{
    CreateMemoryData, CreateWallData, InviteUserData, LoginData, MemoriesPage, Memory,
    Pagination, RegisterData, Role, SessionStatus, SharedWall, UpdateMemoryData,
    UpdatePasswordData, UpdateWallData, User, UserRef, UserStats, Wall, WallDetail, WallMember,
};
use time::OffsetDateTime;

fn wall(id: &str, name: &str) -> Wall {
    Wall {
        id: id.into(),
        name: name.into(),
        description: String::new(),
        cover_image: None,
        created_by: "u1".into(),
        created_at: OffsetDateTime::UNIX_EPOCH,
        updated_at: OffsetDateTime::UNIX_EPOCH,
        memory_count: 0,
        member_count: 1,
    }
}

fn memory(wall_id: &str, id: &str, title: &str) -> Memory {
    Memory {
        id: id.into(),
        wall_id: wall_id.into(),
        created_by: UserRef {
            id: "u1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
        },
        title: title.into(),
        content: String::new(),
        memory_date: OffsetDateTime::UNIX_EPOCH,
        assets: Vec::new(),
        created_at: OffsetDateTime::UNIX_EPOCH,
        updated_at: OffsetDateTime::UNIX_EPOCH,
    }
}

fn user(id: &str) -> User {
    User {
        id: id.into(),
        name: format!("User {id}"),
        email: format!("{id}@example.com"),
    }
}

/// In-memory provider that records how often each operation runs.
#[derive(Default)]
struct FakeProvider {
    walls: Mutex<Vec<Wall>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    session_user: Mutex<Option<User>>,
    fail_reads: AtomicBool,
    fail_logout: AtomicBool,
    fail_session: AtomicBool,
}

impl FakeProvider {
    fn with_walls(walls: Vec<Wall>) -> Arc<Self> {
        let provider = Self::default();
        *provider.walls.lock().unwrap() = walls;
        Arc::new(provider)
    }

    fn calls(&self, op: &'static str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    fn record(&self, op: &'static str) {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
    }

    fn read_guard(&self) -> ProviderResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(FetchError::status(500, "Internal server error"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ResourceProvider for FakeProvider {
    async fn fetch_session(&self) -> ProviderResult<SessionStatus> {
        self.record("fetch_session");
        if self.fail_session.load(Ordering::SeqCst) {
            return Err(FetchError::transport("connection refused"));
        }
        Ok(match self.session_user.lock().unwrap().clone() {
            Some(user) => SessionStatus {
                authenticated: true,
                user: Some(user),
            },
            None => SessionStatus::anonymous(),
        })
    }

    async fn fetch_stats(&self, _user_id: &str) -> ProviderResult<UserStats> {
        self.record("fetch_stats");
        self.read_guard()?;
        Ok(UserStats {
            my_walls_count: self.walls.lock().unwrap().len() as u64,
            ..UserStats::default()
        })
    }

    async fn fetch_my_walls(&self) -> ProviderResult<Vec<Wall>> {
        self.record("fetch_my_walls");
        self.read_guard()?;
        Ok(self.walls.lock().unwrap().clone())
    }

    async fn fetch_shared_walls(&self) -> ProviderResult<Vec<SharedWall>> {
        self.record("fetch_shared_walls");
        self.read_guard()?;
        Ok(Vec::new())
    }

    async fn fetch_wall(&self, wall_id: &str) -> ProviderResult<WallDetail> {
        self.record("fetch_wall");
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.read_guard()?;
        let walls = self.walls.lock().unwrap();
        let wall = walls
            .iter()
            .find(|wall| wall.id == wall_id)
            .cloned()
            .ok_or_else(|| FetchError::status(404, "Wall not found"))?;
        Ok(WallDetail {
            wall,
            role: Some(Role::Admin),
            created_by_name: Some("Ada".into()),
        })
    }

    async fn fetch_members(&self, _wall_id: &str) -> ProviderResult<Vec<WallMember>> {
        self.record("fetch_members");
        self.read_guard()?;
        Ok(Vec::new())
    }

    async fn fetch_memories_page(&self, wall_id: &str, page: u32) -> ProviderResult<MemoriesPage> {
        self.record("fetch_memories_page");
        self.read_guard()?;
        Ok(MemoriesPage {
            memories: vec![memory(wall_id, "M1", "Beach")],
            pagination: Pagination {
                current_page: page,
                total_pages: 1,
                total_count: 1,
                has_next_page: false,
                has_prev_page: false,
            },
        })
    }

    async fn fetch_memory(&self, wall_id: &str, memory_id: &str) -> ProviderResult<Memory> {
        self.record("fetch_memory");
        self.read_guard()?;
        Ok(memory(wall_id, memory_id, "Beach"))
    }

    async fn create_wall(&self, data: &CreateWallData) -> ProviderResult<Wall> {
        self.record("create_wall");
        let created = wall("W-new", &data.name);
        self.walls.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_wall(&self, wall_id: &str, data: &UpdateWallData) -> ProviderResult<Wall> {
        self.record("update_wall");
        let mut walls = self.walls.lock().unwrap();
        let wall = walls
            .iter_mut()
            .find(|wall| wall.id == wall_id)
            .ok_or_else(|| FetchError::status(404, "Wall not found"))?;
        if let Some(name) = &data.name {
            wall.name = name.clone();
        }
        Ok(wall.clone())
    }

    async fn delete_wall(&self, wall_id: &str) -> ProviderResult<()> {
        self.record("delete_wall");
        self.walls.lock().unwrap().retain(|wall| wall.id != wall_id);
        Ok(())
    }

    async fn invite_user(&self, _wall_id: &str, _data: &InviteUserData) -> ProviderResult<()> {
        self.record("invite_user");
        Ok(())
    }

    async fn update_role(&self, _wall_id: &str, _user_id: &str, _role: Role) -> ProviderResult<()> {
        self.record("update_role");
        Ok(())
    }

    async fn remove_member(&self, _wall_id: &str, _user_id: &str) -> ProviderResult<()> {
        self.record("remove_member");
        Ok(())
    }

    async fn create_memory(
        &self,
        wall_id: &str,
        data: &CreateMemoryData,
    ) -> ProviderResult<Memory> {
        self.record("create_memory");
        Ok(memory(wall_id, "M2", &data.title))
    }

    async fn update_memory(
        &self,
        wall_id: &str,
        memory_id: &str,
        data: &UpdateMemoryData,
    ) -> ProviderResult<Memory> {
        self.record("update_memory");
        let title = data.title.clone().unwrap_or_else(|| "Beach".into());
        Ok(memory(wall_id, memory_id, &title))
    }

    async fn delete_memory(&self, _wall_id: &str, _memory_id: &str) -> ProviderResult<()> {
        self.record("delete_memory");
        Ok(())
    }

    async fn login(&self, data: &LoginData) -> ProviderResult<User> {
        self.record("login");
        let id = data.email.split('@').next().unwrap_or_default();
        let user = user(id);
        *self.session_user.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    async fn register(&self, data: &RegisterData) -> ProviderResult<User> {
        self.record("register");
        let user = User {
            id: "u-new".into(),
            name: data.name.clone(),
            email: data.email.clone(),
        };
        *self.session_user.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    async fn logout(&self) -> ProviderResult<()> {
        self.record("logout");
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(FetchError::transport("connection reset"));
        }
        *self.session_user.lock().unwrap() = None;
        Ok(())
    }

    async fn update_password(&self, _data: &UpdatePasswordData) -> ProviderResult<()> {
        self.record("update_password");
        Ok(())
    }
}

fn client(provider: &Arc<FakeProvider>) -> WallClient {
    WallClient::new(provider.clone(), CacheConfig::default())
}

async fn signed_in(provider: &Arc<FakeProvider>, id: &str) -> WallClient {
    let client = client(provider);
    client
        .login(&LoginData {
            email: format!("{id}@example.com"),
            password: "hunter22".into(),
        })
        .await
        .expect("login");
    client
}

fn wall_name(resource: Option<Resource>) -> Option<String> {
    match resource {
        Some(Resource::Wall(detail)) => Some(detail.wall.name),
        _ => None,
    }
}

#[tokio::test]
async fn concurrent_reads_share_one_provider_call() {
    let provider = FakeProvider::with_walls(vec![wall("W1", "Trip")]);
    let client = signed_in(&provider, "u1").await;

    let (first, second) = tokio::join!(client.wall("W1"), client.wall("W1"));

    assert_eq!(first.expect("first").wall.name, "Trip");
    assert_eq!(second.expect("second").wall.name, "Trip");
    assert_eq!(provider.calls("fetch_wall"), 1);
}

#[tokio::test]
async fn failed_refresh_keeps_last_good_value() {
    let provider = FakeProvider::with_walls(vec![wall("W1", "Trip")]);
    let client = signed_in(&provider, "u1").await;
    client.wall("W1").await.expect("initial load");

    provider.fail_reads.store(true, Ordering::SeqCst);
    let key = ResourceKey::wall("W1");
    let err = client.refetch(&key).await.unwrap_err();

    assert_eq!(err.status_code(), Some(500));
    assert_eq!(wall_name(client.peek(&key)).as_deref(), Some("Trip"));
    assert_eq!(client.cache().snapshot(&key).status, EntryStatus::Error);
}

#[tokio::test]
async fn write_invalidates_dependents_before_single_notification() {
    let provider = FakeProvider::with_walls(vec![wall("W1", "Trip")]);
    let client = signed_in(&provider, "u1").await;
    client.my_walls().await.expect("my walls");
    client.shared_walls().await.expect("shared walls");
    client.user_stats().await.expect("stats");

    let notifications = Arc::new(AtomicUsize::new(0));
    let consistent = Arc::new(AtomicBool::new(true));
    let subscription = {
        let observer = client.clone();
        let notifications = notifications.clone();
        let consistent = consistent.clone();
        client.subscribe(&ResourceKey::SharedWalls, move |_| {
            notifications.fetch_add(1, Ordering::SeqCst);
            let others_cleared = observer.peek(&ResourceKey::MyWalls).is_none()
                && observer.peek(&ResourceKey::UserStats).is_none();
            consistent.fetch_and(others_cleared, Ordering::SeqCst);
        })
    };

    client
        .create_wall(&CreateWallData {
            name: "Holidays".into(),
            description: None,
            cover_image: None,
        })
        .await
        .expect("create wall");

    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert!(consistent.load(Ordering::SeqCst));
    subscription.unsubscribe();
}

#[tokio::test]
async fn login_before_first_check_drops_anonymous_reads() {
    let provider = FakeProvider::with_walls(Vec::new());
    let client = client(&provider);
    assert_eq!(client.session_state(), SessionState::Unknown);

    let before = client.session_status().await.expect("anonymous status");
    assert!(!before.authenticated);

    client
        .login(&LoginData {
            email: "u1@example.com".into(),
            password: "hunter22".into(),
        })
        .await
        .expect("login");

    assert!(client.peek(&ResourceKey::Session).is_none());
    let after = client.session_status().await.expect("status after login");
    assert!(after.authenticated);
    assert_eq!(provider.calls("fetch_session"), 2);
}

#[tokio::test]
async fn register_before_first_check_drops_anonymous_reads() {
    let provider = FakeProvider::with_walls(Vec::new());
    let client = client(&provider);
    client.session_status().await.expect("anonymous status");

    let user = client
        .register(RegisterForm {
            name: "Grace".into(),
            email: "grace@example.com".into(),
            password: "hunter22".into(),
            confirm_password: "hunter22".into(),
        })
        .await
        .expect("register");

    assert_eq!(client.current_user_id().as_deref(), Some(user.id.as_str()));
    assert!(client.peek(&ResourceKey::Session).is_none());
    assert!(client.session_status().await.expect("status").authenticated);
}

#[tokio::test]
async fn failed_first_session_check_counts_as_signed_out() {
    let provider = FakeProvider::with_walls(Vec::new());
    provider.fail_session.store(true, Ordering::SeqCst);
    let client = client(&provider);

    assert!(client.check_session().await.is_err());
    assert_eq!(client.session_state(), SessionState::Anonymous);
}

#[tokio::test]
async fn failed_session_check_signs_out_and_clears() {
    let provider = FakeProvider::with_walls(vec![wall("W1", "Trip")]);
    let client = signed_in(&provider, "u1").await;
    client.my_walls().await.expect("my walls");

    provider.fail_session.store(true, Ordering::SeqCst);
    assert!(client.check_session().await.is_err());

    assert_eq!(client.session_state(), SessionState::Anonymous);
    assert!(client.peek(&ResourceKey::MyWalls).is_none());
}

#[tokio::test]
async fn switching_identity_drops_previous_users_data() {
    let provider = FakeProvider::with_walls(vec![wall("W1", "Trip")]);
    let client = signed_in(&provider, "u1").await;
    client.my_walls().await.expect("my walls");
    client.wall("W1").await.expect("wall");

    client.logout().await;
    assert!(client.peek(&ResourceKey::MyWalls).is_none());

    client
        .login(&LoginData {
            email: "u2@example.com".into(),
            password: "hunter22".into(),
        })
        .await
        .expect("second login");

    assert_eq!(client.session_state(), SessionState::Authenticated("u2".into()));
    assert!(client.peek(&ResourceKey::MyWalls).is_none());
    assert!(client.peek(&ResourceKey::wall("W1")).is_none());
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn direct_identity_swap_also_clears_cache() {
    let provider = FakeProvider::with_walls(vec![wall("W1", "Trip")]);
    let client = signed_in(&provider, "u1").await;
    client.my_walls().await.expect("my walls");

    let transition = client.session().sign_in("u2");

    assert!(transition.cache_cleared);
    assert!(client.peek(&ResourceKey::MyWalls).is_none());
}

#[tokio::test]
async fn unsubscribe_twice_and_after_clear_is_harmless() {
    let provider = FakeProvider::with_walls(vec![wall("W1", "Trip")]);
    let client = signed_in(&provider, "u1").await;
    let subscription = client.subscribe(&ResourceKey::MyWalls, |_| {});
    client.my_walls().await.expect("my walls");

    subscription.unsubscribe();
    subscription.unsubscribe();
    client.logout().await;
    subscription.unsubscribe();

    assert_eq!(client.cache().subscriber_count(&ResourceKey::MyWalls), 0);
}

#[tokio::test]
async fn wall_rename_end_to_end() {
    let provider = FakeProvider::with_walls(vec![wall("W1", "Trip")]);
    let client = signed_in(&provider, "u1").await;

    let (a, b) = tokio::join!(client.wall("W1"), client.wall("W1"));
    assert_eq!(a.expect("a").wall.name, "Trip");
    assert_eq!(b.expect("b").wall.name, "Trip");
    assert_eq!(provider.calls("fetch_wall"), 1);
    client.my_walls().await.expect("my walls");
    let list_loads = provider.calls("fetch_my_walls");

    let updated = client
        .update_wall(
            "W1",
            &UpdateWallData {
                name: Some("Trip 2025".into()),
                ..UpdateWallData::default()
            },
        )
        .await
        .expect("update wall");

    // The patched detail keeps fields the update response lacks.
    assert_eq!(updated.role, Some(Role::Admin));
    assert_eq!(
        wall_name(client.peek(&ResourceKey::wall("W1"))).as_deref(),
        Some("Trip 2025")
    );
    assert!(client.peek(&ResourceKey::MyWalls).is_none());

    let walls = client.my_walls().await.expect("refetched list");
    assert_eq!(provider.calls("fetch_my_walls"), list_loads + 1);
    assert!(walls.iter().any(|wall| wall.name == "Trip 2025"));
}

#[tokio::test]
async fn logout_clears_state_even_when_server_call_fails() {
    let provider = FakeProvider::with_walls(vec![wall("W1", "Trip")]);
    let client = signed_in(&provider, "u1").await;
    client.my_walls().await.expect("my walls");
    client.user_stats().await.expect("stats");
    provider.fail_logout.store(true, Ordering::SeqCst);

    client.logout().await;

    assert_eq!(provider.calls("logout"), 1);
    assert_eq!(client.current_user_id(), None);
    assert!(client.peek(&ResourceKey::MyWalls).is_none());
    assert!(client.peek(&ResourceKey::UserStats).is_none());
}

#[tokio::test]
async fn identity_scoped_reads_need_a_session() {
    let provider = FakeProvider::with_walls(vec![wall("W1", "Trip")]);
    let client = client(&provider);

    let err = client.my_walls().await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unauthenticated);
    assert_eq!(provider.calls("fetch_my_walls"), 0);
}

#[tokio::test]
async fn session_check_publishes_server_identity() {
    let provider = FakeProvider::with_walls(Vec::new());
    *provider.session_user.lock().unwrap() = Some(user("u7"));
    let client = client(&provider);

    let status = client.check_session().await.expect("session check");

    assert!(status.authenticated);
    assert_eq!(client.current_user_id().as_deref(), Some("u7"));
}

#[tokio::test]
async fn invalid_input_never_reaches_provider() {
    let provider = FakeProvider::with_walls(Vec::new());
    let client = signed_in(&provider, "u1").await;

    let err = client
        .create_wall(&CreateWallData {
            name: "   ".into(),
            description: None,
            cover_image: None,
        })
        .await
        .unwrap_err();

    assert!(err.fetch_error().is_none());
    assert_eq!(provider.calls("create_wall"), 0);
}

#[tokio::test]
async fn memory_edit_patches_memory_and_drops_pages() {
    let provider = FakeProvider::with_walls(vec![wall("W1", "Trip")]);
    let client = signed_in(&provider, "u1").await;
    client.memories("W1", 1).await.expect("page 1");
    client.memories("W1", 2).await.expect("page 2");
    client.memory("W1", "M1").await.expect("memory");

    client
        .update_memory(
            "W1",
            "M1",
            &UpdateMemoryData {
                title: Some("Sunset".into()),
                ..UpdateMemoryData::default()
            },
        )
        .await
        .expect("update memory");

    assert!(client.peek(&ResourceKey::memories_page("W1", 1)).is_none());
    assert!(client.peek(&ResourceKey::memories_page("W1", 2)).is_none());
    match client.peek(&ResourceKey::memory("W1", "M1")) {
        Some(Resource::Memory(memory)) => assert_eq!(memory.title, "Sunset"),
        other => panic!("expected patched memory, got {other:?}"),
    }
}

#[tokio::test]
async fn role_change_only_touches_member_list() {
    let provider = FakeProvider::with_walls(vec![wall("W1", "Trip")]);
    let client = signed_in(&provider, "u1").await;
    client.members("W1").await.expect("members");
    client.my_walls().await.expect("my walls");

    client
        .update_member_role("W1", "u2", Role::Admin)
        .await
        .expect("role update");

    assert!(client.peek(&ResourceKey::wall_members("W1")).is_none());
    assert!(client.peek(&ResourceKey::MyWalls).is_some());
}

#[tokio::test]
async fn binding_follows_background_load() {
    let provider = FakeProvider::with_walls(vec![wall("W1", "Trip")]);
    let client = signed_in(&provider, "u1").await;

    let mut binding = client.watch(&ResourceKey::wall("W1"));
    let mut snapshot = binding.current();
    while snapshot.status != EntryStatus::Fresh {
        snapshot = binding.changed().await.expect("binding open");
    }

    assert_eq!(wall_name(snapshot.value).as_deref(), Some("Trip"));
    assert_eq!(provider.calls("fetch_wall"), 1);
}
