//! HTTP Transport
//!
//! Talks to the answering service over its REST API:
//! - `POST /query` - JSON `{ "query": ... }`, answers `{ "answer", "data"? }`
//! - `POST /upload` - multipart form with a single `file` field
//!
//! No timeout is applied unless one is configured; a stalled request simply
//! keeps the turn waiting.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use super::traits::{QueryRequest, QueryResponse, Transport, TransportError};
use crate::config::ChatConfig;
use crate::files::FileHandle;

/// reqwest-backed transport
#[derive(Clone, Debug)]
pub struct HttpTransport {
    /// Base URL without trailing slash
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the default client (no timeout)
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialised.
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_timeout(base_url, None)
    }

    /// Create a transport with an optional overall request timeout
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialised.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(base_url, builder.build()?))
    }

    /// Create a transport around an existing client
    pub fn with_client(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http_client,
        }
    }

    /// Create from `ChatConfig`
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialised.
    pub fn from_config(config: &ChatConfig) -> Result<Self, reqwest::Error> {
        Self::with_timeout(config.base_url.clone(), config.request_timeout)
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get query endpoint URL
    fn query_url(&self) -> String {
        format!("{}/query", self.base_url)
    }

    /// Get upload endpoint URL
    fn upload_url(&self) -> String {
        format!("{}/upload", self.base_url)
    }

    /// Send a prepared request and reject non-success statuses
    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| map_send_error(endpoint, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Map a reqwest send failure onto the transport taxonomy
fn map_send_error(endpoint: &str, error: &reqwest::Error) -> TransportError {
    if error.is_connect() {
        TransportError::Unreachable {
            endpoint: endpoint.to_string(),
            reason: error.to_string(),
        }
    } else {
        TransportError::Io {
            endpoint: endpoint.to_string(),
            reason: error.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, TransportError> {
        let url = self.query_url();
        tracing::debug!(url = %url, "Sending query");

        let response = self
            .send(&url, self.http_client.post(&url).json(request))
            .await?;

        let body = response.bytes().await.map_err(|e| TransportError::Io {
            endpoint: url.clone(),
            reason: e.to_string(),
        })?;

        serde_json::from_slice(&body).map_err(|e| TransportError::Decode {
            endpoint: url,
            reason: e.to_string(),
        })
    }

    async fn upload(&self, file: &FileHandle) -> Result<(), TransportError> {
        let url = self.upload_url();
        tracing::debug!(url = %url, file = file.name(), bytes = file.len(), "Uploading file");

        let part = Part::bytes(file.bytes().to_vec()).file_name(file.name().to_string());
        let part = match part.mime_str(file.content_type()) {
            Ok(part) => part,
            Err(e) => {
                tracing::debug!(error = %e, "Unusable content type, sending without one");
                Part::bytes(file.bytes().to_vec()).file_name(file.name().to_string())
            }
        };
        let form = Form::new().part("file", part);

        // Body is ignored on success
        self.send(&url, self.http_client.post(&url).multipart(form))
            .await
            .map(|_| ())
    }
}
