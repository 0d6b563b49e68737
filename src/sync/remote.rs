//! Remote store: the HTTP API the engine synchronizes with
//!
//! JSON over HTTPS with a cookie session. Every call is bounded by the
//! configured request timeout.

use crate::config::EngineConfig;
use crate::error::{LingoError, Result};
use crate::types::{DeleteResponse, Entry, ImportSummary, MarkRequest, SessionInfo, UserDataBundle};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, COOKIE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

/// Operations the engine needs from the store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `GET /api/session`
    async fn session(&self) -> Result<SessionInfo>;

    /// `GET /api/data`
    async fn fetch_data(&self) -> Result<UserDataBundle>;

    /// `POST /api/mark`
    async fn mark(&self, request: &MarkRequest) -> Result<Entry>;

    /// `DELETE /api/entries/{uuid}`
    async fn delete_entry(&self, uuid: &str) -> Result<DeleteResponse>;

    /// `POST /api/import` with a legacy bundle
    async fn import(&self, bundle: &serde_json::Value) -> Result<ImportSummary>;
}

/// Error body returned by the store
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

/// reqwest-backed [`RemoteStore`]
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(cookie) = config.session_cookie.as_deref() {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| LingoError::InvalidOperation(format!("Invalid session cookie: {}", e)))?;
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .map_err(|e| LingoError::NetworkOrTimeout(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.backend_base().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(CONTENT_TYPE, "application/json")
    }

    /// Send, map the status, decode the body
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        debug!("{} -> {}", what, status);

        match status {
            StatusCode::UNAUTHORIZED => {
                warn!("{}: session expired or missing", what);
                Err(LingoError::Unauthorized {
                    status: status.as_u16(),
                })
            }
            s if s.is_success() => {
                let body = response.text().await?;
                serde_json::from_str::<T>(&body).map_err(|e| {
                    LingoError::InvalidDataShape(format!("{}: {}", what, e))
                })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorResponse>(&body)
                    .ok()
                    .and_then(|e| e.error)
                    .or_else(|| {
                        let trimmed = body.trim();
                        (!trimmed.is_empty()).then(|| trimmed.to_string())
                    });
                warn!("{} failed with {}: {:?}", what, status, message);
                Err(LingoError::RequestFailed {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn session(&self) -> Result<SessionInfo> {
        self.send(self.request(Method::GET, "/api/session"), "GET /api/session")
            .await
    }

    async fn fetch_data(&self) -> Result<UserDataBundle> {
        self.send(self.request(Method::GET, "/api/data"), "GET /api/data")
            .await
    }

    async fn mark(&self, request: &MarkRequest) -> Result<Entry> {
        self.send(
            self.request(Method::POST, "/api/mark").json(request),
            "POST /api/mark",
        )
        .await
    }

    async fn delete_entry(&self, uuid: &str) -> Result<DeleteResponse> {
        let path = format!("/api/entries/{}", uuid);
        self.send(self.request(Method::DELETE, &path), "DELETE /api/entries")
            .await
    }

    async fn import(&self, bundle: &serde_json::Value) -> Result<ImportSummary> {
        self.send(
            self.request(Method::POST, "/api/import").json(bundle),
            "POST /api/import",
        )
        .await
    }
}
