//! Backend process channel
//!
//! The backend runs one resolution process at a time. Opening a session
//! starts it and returns its chunked NDJSON output; input lines and the
//! terminate signal go over separate POST calls.

use crate::error::{ResolveError, ResolveResult};
use crate::models::ResolveRequest;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use serde_json::json;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info};

/// Raw byte chunks of the backend output stream
pub type ByteStream = Pin<Box<dyn Stream<Item = ResolveResult<Vec<u8>>> + Send>>;

/// Backend process channel seam
#[async_trait]
pub trait BackendChannel: Send + Sync {
    /// Start processing `request`; returns the output stream
    async fn open(&self, request: &ResolveRequest) -> ResolveResult<ByteStream>;

    /// Write one line to the process's stdin
    async fn send_input(&self, input: &str) -> ResolveResult<()>;

    /// Ask the backend to kill the running process
    async fn terminate(&self) -> ResolveResult<()>;
}

/// HTTP implementation of [`BackendChannel`]
pub struct HttpBackendClient {
    client: Client,
    base_url: String,
}

impl HttpBackendClient {
    /// Create a client for the backend at `base_url`
    ///
    /// No overall request timeout is set: the open call streams for as long
    /// as the backend process runs.
    pub fn new(base_url: impl Into<String>) -> ResolveResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(mfo_common::config::get_user_agent())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> ResolveResult<()> {
        let response = self
            .client
            .post(self.url(path))
            .timeout(Duration::from_secs(10))
            .json(&body)
            .send()
            .await
            .map_err(|e| ResolveError::Backend(format!("{} failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ResolveError::Backend(format!(
                "{} returned status {}: {}",
                path,
                status,
                detail.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BackendChannel for HttpBackendClient {
    async fn open(&self, request: &ResolveRequest) -> ResolveResult<ByteStream> {
        info!(
            path = %request.display_path(),
            action = %request.action,
            "Opening backend process"
        );

        let response = self
            .client
            .post(self.url("/api/process"))
            .json(request)
            .send()
            .await
            .map_err(|e| ResolveError::Backend(format!("Failed to start process: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ResolveError::Backend(format!(
                "Backend refused request ({}): {}",
                status,
                detail.trim()
            )));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ResolveError::from));
        Ok(Box::pin(stream))
    }

    async fn send_input(&self, input: &str) -> ResolveResult<()> {
        debug!(input = %input, "Sending input to backend");
        self.post_json("/api/process/input", json!({ "input": input }))
            .await
    }

    async fn terminate(&self) -> ResolveResult<()> {
        info!("Terminating backend process");
        self.post_json("/api/process/terminate", json!({})).await
    }
}
