/// Control plane client module - talks to the AlertPriority API
///
/// The orchestrator only depends on the [`ControlPlane`] and [`ResultSink`]
/// traits, so tests can swap the HTTP client for an in-memory fake.
pub mod types;

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

use crate::USER_AGENT;
use crate::config::Config;
use crate::monitoring::Assignment;

pub use types::{
    HeartbeatRequest, MonitorsResponse, PollerStatus, RegisterRequest, RegisterResponse, ResultBatch,
    SubmitResultsResponse,
};

const API_PREFIX: &str = "/api/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RESPONSE_BYTES: usize = 1024 * 1024;
const TOKEN_HEADER: &str = "x-poller-token";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to create client: {0}")]
    Build(reqwest::Error),
    #[error("invalid poller token")]
    InvalidToken,
    #[error("failed to encode request: {0}")]
    Encode(serde_json::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(serde_json::Error),
}

/// Where result batches go
#[async_trait::async_trait]
pub trait ResultSink: Send + Sync {
    async fn submit_results(&self, batch: &ResultBatch) -> Result<SubmitResultsResponse, ClientError>;
}

/// Everything the poller needs from the control plane
#[async_trait::async_trait]
pub trait ControlPlane: ResultSink {
    async fn register(&self, hostname: &str, version: &str) -> Result<RegisterResponse, ClientError>;

    async fn fetch_assignments(&self) -> Result<Vec<Assignment>, ClientError>;

    async fn heartbeat(&self, heartbeat: &HeartbeatRequest) -> Result<(), ClientError>;
}

/// HTTP client for `<api_url>/api/v1`
pub struct ControlPlaneClient {
    http: Client,
    base_url: String,
}

impl ControlPlaneClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let mut token = HeaderValue::from_str(&config.poller_token).map_err(|_| ClientError::InvalidToken)?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, token);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self { http, base_url: format!("{}{API_PREFIX}", config.api_url.trim_end_matches('/')) })
    }

    /// Send `body` as JSON and return at most 1 MiB of the reply body.
    async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Vec<u8>, ClientError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut request = self.http.request(method.clone(), format!("{}{path}", self.base_url));
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body).map_err(ClientError::Encode)?);
        }

        let mut response = request.send().await?;
        let status = response.status().as_u16();

        let mut bytes = Vec::new();
        while bytes.len() < MAX_RESPONSE_BYTES {
            let Some(chunk) = response.chunk().await? else { break };
            let take = chunk.len().min(MAX_RESPONSE_BYTES - bytes.len());
            bytes.extend_from_slice(&chunk[..take]);
        }

        if status >= 400 {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            warn!(%method, path, status, %body, "Control plane rejected request");
            return Err(ClientError::Status { status, body });
        }

        Ok(bytes)
    }

    /// Like [`send`](Self::send), decoding the reply. An empty reply decodes
    /// to `R::default()`.
    async fn do_json<B, R>(&self, method: Method, path: &str, body: Option<&B>) -> Result<R, ClientError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned + Default,
    {
        let bytes = self.send(method, path, body).await?;
        if bytes.is_empty() {
            return Ok(R::default());
        }
        serde_json::from_slice(&bytes).map_err(ClientError::Decode)
    }
}

#[async_trait::async_trait]
impl ResultSink for ControlPlaneClient {
    async fn submit_results(&self, batch: &ResultBatch) -> Result<SubmitResultsResponse, ClientError> {
        self.do_json(Method::POST, "/poller/results", Some(batch)).await
    }
}

#[async_trait::async_trait]
impl ControlPlane for ControlPlaneClient {
    async fn register(&self, hostname: &str, version: &str) -> Result<RegisterResponse, ClientError> {
        let request = RegisterRequest { hostname: hostname.to_string(), version: version.to_string() };
        self.do_json(Method::POST, "/poller/register", Some(&request)).await
    }

    async fn fetch_assignments(&self) -> Result<Vec<Assignment>, ClientError> {
        let response: MonitorsResponse = self.do_json::<(), _>(Method::GET, "/poller/monitors", None).await?;
        Ok(response.monitors)
    }

    async fn heartbeat(&self, heartbeat: &HeartbeatRequest) -> Result<(), ClientError> {
        self.send(Method::POST, "/poller/heartbeat", Some(heartbeat)).await.map(|_| ())
    }
}
