//! `ResourceProvider` backed by the Memory Wall REST API.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use memwall_api_types::{
    ApiEnvelope, ApiErrorBody, CreateMemoryData, CreateWallData, InviteUserData, LoginData,
    MemoriesPage, Memory, RegisterData, Role, SessionStatus, SharedWall, UpdateMemoryData,
    UpdatePasswordData, UpdateRoleData, UpdateWallData, User, UserPayload, UserStats, Wall,
    WallDetail, WallMember,
};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::application::provider::{MEMORIES_PAGE_LIMIT, ProviderResult, ResourceProvider};
use crate::cache::FetchError;
use crate::config::ApiSettings;
use crate::infra::error::InfraError;

use super::boundary::{AuthBoundary, Navigator};

pub struct HttpProvider {
    client: Client,
    base: Url,
    boundary: AuthBoundary,
}

impl HttpProvider {
    /// Build a client with a cookie store, so the session cookie set by login
    /// is replayed on every following request.
    pub fn new(api: &ApiSettings, navigator: Arc<dyn Navigator>) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(api.user_agent.as_str())
            .timeout(api.timeout)
            .cookie_store(true)
            .build()
            .map_err(|err| InfraError::http(err.to_string()))?;
        Ok(Self {
            client,
            base: api.base_url.clone(),
            boundary: AuthBoundary::new(navigator),
        })
    }

    pub fn boundary(&self) -> &AuthBoundary {
        &self.boundary
    }

    /// Base URL plus percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> ProviderResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::transport(format!("base URL `{}` cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> ProviderResult<T> {
        let url = self.endpoint(segments)?;
        let body = self.send(Method::GET, url, |request| request).await?;
        decode_data(&body)
    }

    async fn send_json<B, T>(&self, method: Method, segments: &[&str], payload: &B) -> ProviderResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        let body = self
            .send(method, url, |request| request.json(payload))
            .await?;
        decode_data(&body)
    }

    async fn send_unit<B>(&self, method: Method, segments: &[&str], payload: Option<&B>) -> ProviderResult<()>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = self.endpoint(segments)?;
        self.send(method, url, |request| match payload {
            Some(payload) => request.json(payload),
            None => request,
        })
        .await
        .map(|_| ())
    }

    /// Send one request and return the body of a successful response.
    ///
    /// Failures are classified, passed through the auth boundary and
    /// returned; they never panic or retry.
    async fn send<F>(&self, method: Method, url: Url, build: F) -> ProviderResult<Vec<u8>>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let started = Instant::now();
        let request = build(self.client.request(method.clone(), url.clone()));

        let result = match request.send().await {
            Ok(response) => {
                let status = response.status();
                match response.bytes().await {
                    Ok(body) => {
                        debug!(
                            %method,
                            path = url.path(),
                            status = status.as_u16(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "API response"
                        );
                        if status.is_success() {
                            Ok(body.to_vec())
                        } else {
                            Err(status_error(status, &body))
                        }
                    }
                    Err(err) => Err(transport_error(&err)),
                }
            }
            Err(err) => Err(transport_error(&err)),
        };

        if let Err(err) = &result {
            warn!(%method, path = url.path(), error = %err, "API request failed");
            self.boundary.on_failure(err);
        }
        result
    }
}

fn decode_data<T: DeserializeOwned>(body: &[u8]) -> ProviderResult<T> {
    serde_json::from_slice::<ApiEnvelope<T>>(body)
        .map(|envelope| envelope.data)
        .map_err(|err| FetchError::decode(format!("failed to parse response body: {err}")))
}

/// Message order: response body `message`, then a transport-style
/// description of the status, then the default.
fn status_error(status: StatusCode, body: &[u8]) -> FetchError {
    let message = serde_json::from_slice::<ApiErrorBody>(body)
        .ok()
        .and_then(|body| body.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));
    FetchError::status(status.as_u16(), message)
}

fn transport_error(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::timeout(err.to_string())
    } else if err.is_decode() {
        FetchError::decode(err.to_string())
    } else {
        FetchError::transport(err.to_string())
    }
}

#[async_trait]
impl ResourceProvider for HttpProvider {
    #[instrument(skip(self))]
    async fn fetch_session(&self) -> ProviderResult<SessionStatus> {
        self.get(&["auth", "status"]).await
    }

    // The server derives the user from the session cookie.
    #[instrument(skip(self))]
    async fn fetch_stats(&self, user_id: &str) -> ProviderResult<UserStats> {
        self.get(&["auth", "stats"]).await
    }

    #[instrument(skip(self))]
    async fn fetch_my_walls(&self) -> ProviderResult<Vec<Wall>> {
        self.get(&["walls"]).await
    }

    #[instrument(skip(self))]
    async fn fetch_shared_walls(&self) -> ProviderResult<Vec<SharedWall>> {
        self.get(&["walls", "shared"]).await
    }

    #[instrument(skip(self))]
    async fn fetch_wall(&self, wall_id: &str) -> ProviderResult<WallDetail> {
        self.get(&["walls", wall_id]).await
    }

    #[instrument(skip(self))]
    async fn fetch_members(&self, wall_id: &str) -> ProviderResult<Vec<WallMember>> {
        self.get(&["walls", wall_id, "members"]).await
    }

    #[instrument(skip(self))]
    async fn fetch_memories_page(&self, wall_id: &str, page: u32) -> ProviderResult<MemoriesPage> {
        let mut url = self.endpoint(&["walls", wall_id, "memories"])?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("limit", &MEMORIES_PAGE_LIMIT.to_string());
        let body = self.send(Method::GET, url, |request| request).await?;
        decode_data(&body)
    }

    #[instrument(skip(self))]
    async fn fetch_memory(&self, wall_id: &str, memory_id: &str) -> ProviderResult<Memory> {
        self.get(&["walls", wall_id, "memories", memory_id]).await
    }

    #[instrument(skip(self, data))]
    async fn create_wall(&self, data: &CreateWallData) -> ProviderResult<Wall> {
        self.send_json(Method::POST, &["walls"], data).await
    }

    #[instrument(skip(self, data))]
    async fn update_wall(&self, wall_id: &str, data: &UpdateWallData) -> ProviderResult<Wall> {
        self.send_json(Method::PUT, &["walls", wall_id], data).await
    }

    #[instrument(skip(self))]
    async fn delete_wall(&self, wall_id: &str) -> ProviderResult<()> {
        self.send_unit::<()>(Method::DELETE, &["walls", wall_id], None)
            .await
    }

    #[instrument(skip(self, data))]
    async fn invite_user(&self, wall_id: &str, data: &InviteUserData) -> ProviderResult<()> {
        self.send_unit(
            Method::POST,
            &["walls", wall_id, "members", "invite"],
            Some(data),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn update_role(&self, wall_id: &str, user_id: &str, role: Role) -> ProviderResult<()> {
        self.send_unit(
            Method::PUT,
            &["walls", wall_id, "members", user_id, "role"],
            Some(&UpdateRoleData { role }),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn remove_member(&self, wall_id: &str, user_id: &str) -> ProviderResult<()> {
        self.send_unit::<()>(
            Method::DELETE,
            &["walls", wall_id, "members", user_id],
            None,
        )
        .await
    }

    #[instrument(skip(self, data))]
    async fn create_memory(
        &self,
        wall_id: &str,
        data: &CreateMemoryData,
    ) -> ProviderResult<Memory> {
        self.send_json(Method::POST, &["walls", wall_id, "memories"], data)
            .await
    }

    #[instrument(skip(self, data))]
    async fn update_memory(
        &self,
        wall_id: &str,
        memory_id: &str,
        data: &UpdateMemoryData,
    ) -> ProviderResult<Memory> {
        self.send_json(
            Method::PUT,
            &["walls", wall_id, "memories", memory_id],
            data,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_memory(&self, wall_id: &str, memory_id: &str) -> ProviderResult<()> {
        self.send_unit::<()>(
            Method::DELETE,
            &["walls", wall_id, "memories", memory_id],
            None,
        )
        .await
    }

    #[instrument(skip(self, data), fields(email = %data.email))]
    async fn login(&self, data: &LoginData) -> ProviderResult<User> {
        self.send_json::<_, UserPayload>(Method::POST, &["auth", "login"], data)
            .await
            .map(|payload| payload.user)
    }

    #[instrument(skip(self, data), fields(email = %data.email))]
    async fn register(&self, data: &RegisterData) -> ProviderResult<User> {
        self.send_json::<_, UserPayload>(Method::POST, &["auth", "register"], data)
            .await
            .map(|payload| payload.user)
    }

    #[instrument(skip(self))]
    async fn logout(&self) -> ProviderResult<()> {
        self.send_unit::<()>(Method::POST, &["auth", "logout"], None)
            .await
    }

    #[instrument(skip(self, data))]
    async fn update_password(&self, data: &UpdatePasswordData) -> ProviderResult<()> {
        self.send_unit(Method::PUT, &["auth", "password"], Some(data))
            .await
    }
}
