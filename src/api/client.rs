/// Management API client - thin reqwest wrapper with error classification
use super::{ApiErrorBody, ApplyResponse, ManagementApi, TeamPayload, UserRecord};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL, e.g. https://manage.example.com/api/v1
    pub base_url: String,
    /// Bearer token
    pub token: Option<String>,
    pub timeout: Duration,
    /// User-Agent header for HTTP requests
    pub user_agent: String,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            token: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("roster-sync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Client for the remote management API
#[derive(Clone)]
pub struct ManagementClient {
    http_client: Client,
    base_url: String,
    token: Option<String>,
}

impl ManagementClient {
    /// Create a new client
    pub fn new(config: &ApiClientConfig) -> SyncResult<Self> {
        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Connectivity probe
    pub async fn ping(&self) -> SyncResult<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.send(self.http_client.get(&url)).await?;
        check_status(response).await.map(|_| ())
    }

    /// Look up a user by email
    pub async fn lookup_user(&self, email: &str) -> SyncResult<UserRecord> {
        let url = format!("{}/users", self.base_url);
        let response = self
            .send(self.http_client.get(&url).query(&[("email", email)]))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(format!("No user with email {}", email)));
        }

        parse_json(check_status(response).await?).await
    }

    /// Create or replace a team with the given members
    pub async fn apply_team(&self, payload: &TeamPayload) -> SyncResult<ApplyResponse> {
        let url = format!("{}/teams/{}", self.base_url, payload.name);
        let response = self.send(self.http_client.put(&url).json(payload)).await?;
        parse_json(check_status(response).await?).await
    }

    async fn send(&self, request: RequestBuilder) -> SyncResult<Response> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request.send().await.map_err(map_transport_error)
    }
}

#[async_trait]
impl ManagementApi for ManagementClient {
    async fn ping(&self) -> SyncResult<()> {
        ManagementClient::ping(self).await
    }

    async fn apply_team(&self, payload: &TeamPayload) -> SyncResult<ApplyResponse> {
        ManagementClient::apply_team(self, payload).await
    }
}

/// Map reqwest transport failures onto error kinds
fn map_transport_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Transient(format!("Request timeout: {}", e))
    } else if e.is_connect() {
        SyncError::Transient(format!("Connection refused: {}", e))
    } else if e.is_request() || e.is_body() {
        SyncError::Transient(format!("Network error: {}", e))
    } else {
        SyncError::Remote(e.to_string())
    }
}

async fn check_status(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body.trim().to_string()
            }
        });

    debug!("Remote API error {}: {}", status, message);
    Err(SyncError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> SyncResult<T> {
    response
        .json()
        .await
        .map_err(|e| SyncError::Remote(format!("Invalid response body: {}", e)))
}
