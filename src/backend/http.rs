//! HTTP backend — `POST` JSON for viewport slices, `POST` JSON with a
//! streamed newline-delimited body for the timeline.
//!
//! No request timeout is set: liveness of both calls is left to the
//! transport. All error envelopes are private to this module.

use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, error, trace};

use super::{BackendError, ByteStream, TimelineRequest, ViewportRequest, ViewportResponse};

/// Reusable client for the graph endpoints. Cheap to clone because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    viewport_url: String,
    timeline_url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    /// `api_key`, when present, is sent as `Authorization: Bearer <key>`.
    pub fn new(
        api_base_url: &str,
        viewport_path: &str,
        timeline_path: &str,
        api_key: Option<String>,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            viewport_url: join_url(api_base_url, viewport_path),
            timeline_url: join_url(api_base_url, timeline_path),
            api_key,
        })
    }

    pub fn viewport_url(&self) -> &str {
        &self.viewport_url
    }

    pub fn timeline_url(&self) -> &str {
        &self.timeline_url
    }

    fn post(&self, url: &str) -> RequestBuilder {
        let req = self.client.post(url);
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    pub async fn fetch_viewport(&self, request: &ViewportRequest) -> Result<ViewportResponse, BackendError> {
        debug!(
            url = %self.viewport_url,
            viewport = ?request.viewport,
            tags = request.container_tags.len(),
            limit = request.limit,
            "sending viewport request"
        );

        let response = self
            .post(&self.viewport_url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.viewport_url, error = %e, "viewport request failed (transport)");
                BackendError::Transport(e.to_string())
            })?;

        let response = check_status(response).await?;

        let parsed = response.json::<ViewportResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize viewport response");
            BackendError::Decode(format!("failed to parse viewport body: {e}"))
        })?;

        trace!(
            documents = parsed.documents.len(),
            edges = parsed.edges.len(),
            "viewport response decoded"
        );
        Ok(parsed)
    }

    pub async fn open_timeline(&self, request: &TimelineRequest) -> Result<ByteStream, BackendError> {
        debug!(
            url = %self.timeline_url,
            tags = request.container_tags.len(),
            batch_size = request.batch_size,
            "opening timeline stream"
        );

        let response = self
            .post(&self.timeline_url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.timeline_url, error = %e, "timeline request failed (transport)");
                BackendError::Transport(e.to_string())
            })?;

        let response = check_status(response).await?;

        let body = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| BackendError::Transport(format!("timeline body read failed: {e}")))
        });
        Ok(body.boxed())
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

// Error envelopes used by the graph API: `{ "error": { "message" } }` or a
// flat `{ "message" }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorEnvelope {
    Nested { error: ErrorBody },
    Flat { message: String },
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope::Nested { error }) => error.message,
        Ok(ErrorEnvelope::Flat { message }) => message,
        Err(_) => body.to_string(),
    }
}

/// Pass a successful response through, or turn it into a structured error.
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    let message = error_message(&body);

    error!(%status, %message, "graph request returned HTTP error");
    Err(BackendError::Status { status: status.as_u16(), message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("https://api.example.com/", "/v3/x"), "https://api.example.com/v3/x");
        assert_eq!(join_url("https://api.example.com", "v3/x"), "https://api.example.com/v3/x");
    }

    #[test]
    fn backend_builds_endpoint_urls() {
        let b = HttpBackend::new(
            "http://localhost:8787/",
            "/v3/documents/graph/viewport",
            "/v3/documents/graph/timeline",
            None,
        )
        .unwrap();
        assert_eq!(b.viewport_url(), "http://localhost:8787/v3/documents/graph/viewport");
        assert_eq!(b.timeline_url(), "http://localhost:8787/v3/documents/graph/timeline");
    }

    #[test]
    fn error_message_reads_envelopes() {
        assert_eq!(error_message(r#"{"error":{"message":"bad tags"}}"#), "bad tags");
        assert_eq!(error_message(r#"{"message":"unauthorized"}"#), "unauthorized");
        assert_eq!(error_message("gateway down"), "gateway down");
    }
}
