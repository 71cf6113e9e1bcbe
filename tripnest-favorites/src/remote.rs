//! Favorites backend client
//!
//! `POST /favorites` toggles one `{item_type, item_id}`; `GET /favorites`
//! returns the authoritative list.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tripnest_common::events::DesiredState;
use tripnest_common::ItemType;

use crate::error::{RemoteError, ResolutionError};
use crate::model::{CanonicalKey, DisplayPayload, RawId, RawIdentifiers};
use crate::resolver;

/// Body of `POST /favorites`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleRequest {
    pub item_type: ItemType,
    pub item_id: String,
}

impl From<&CanonicalKey> for ToggleRequest {
    fn from(key: &CanonicalKey) -> Self {
        Self {
            item_type: key.item_type(),
            item_id: key.normalized_id().to_string(),
        }
    }
}

/// How the backend acknowledged a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAck {
    Applied,
    /// 404 while removing: another session already removed it
    AlreadyAbsent,
}

/// One entry of `GET /favorites`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFavorite {
    pub item_type: ItemType,
    pub item_id: RawId,
    #[serde(flatten)]
    pub payload: DisplayPayload,
}

impl RemoteFavorite {
    pub fn canonical_key(&self) -> Result<CanonicalKey, ResolutionError> {
        let ids = RawIdentifiers {
            item_id: Some(self.item_id.clone()),
            ..Default::default()
        };
        resolver::resolve(self.item_type, &ids)
    }
}

#[async_trait]
pub trait RemoteFavoritesApi: Send + Sync {
    /// Ask the backend to make `request` match `desired`
    async fn set_favorite(
        &self,
        request: &ToggleRequest,
        desired: DesiredState,
    ) -> Result<RemoteAck, RemoteError>;

    /// Full authoritative list for the signed-in user
    async fn list_favorites(&self) -> Result<Vec<RemoteFavorite>, RemoteError>;
}

/// Session tokens are owned elsewhere; this only reads the current one
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Fixed token (CLI, tests)
#[derive(Debug, Clone)]
pub struct StaticToken(pub Option<String>);

impl AccessTokenProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Bare(Vec<RemoteFavorite>),
    Wrapped { favorites: Vec<RemoteFavorite> },
}

/// reqwest-backed client
pub struct HttpRemoteFavorites {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl HttpRemoteFavorites {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tripnest-favorites/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self) -> String {
        format!("{}/favorites", self.base_url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.access_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl RemoteFavoritesApi for HttpRemoteFavorites {
    async fn set_favorite(
        &self,
        request: &ToggleRequest,
        desired: DesiredState,
    ) -> Result<RemoteAck, RemoteError> {
        debug!(
            "POST {} {}:{} (desired {:?})",
            self.url(),
            request.item_type,
            request.item_id,
            desired
        );

        let response = self
            .authorized(self.client.post(self.url()))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(RemoteAck::Applied);
        }
        if status == StatusCode::NOT_FOUND && desired == DesiredState::Absent {
            return Ok(RemoteAck::AlreadyAbsent);
        }
        Err(status_error(response).await)
    }

    async fn list_favorites(&self) -> Result<Vec<RemoteFavorite>, RemoteError> {
        let response = self.authorized(self.client.get(self.url())).send().await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response.text().await?;
        let parsed: ListResponse =
            serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(match parsed {
            ListResponse::Bare(list) => list,
            ListResponse::Wrapped { favorites } => favorites,
        })
    }
}

async fn status_error(response: reqwest::Response) -> RemoteError {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return RemoteError::Unauthenticated(status.as_u16());
    }
    let body = response.text().await.unwrap_or_default();
    RemoteError::Status {
        status: status.as_u16(),
        body,
    }
}
