//! Graph backend abstraction.
//!
//! `GraphBackend` is an enum over concrete backends. Add a variant + module
//! for each additional transport. Instances are cheap to clone and shared by
//! the viewport coordinator and the timeline streamer.
//!
//! Enum dispatch keeps async methods plain `async fn` without trait objects.

pub mod fixture;
pub mod http;

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{BackendConfig, BackendKind};
use crate::graph::{Document, SimilarityEdge, ViewportBounds};

pub use fixture::FixtureBackend;
pub use http::HttpBackend;

// ── Error ─────────────────────────────────────────────────────────────────────

/// Transport-level failure. `Clone` so it can be kept as observable state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("fixture error: {0}")]
    Fixture(String),
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportRequest {
    pub viewport: ViewportBounds,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_tags: Vec<String>,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewportResponse {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub edges: Vec<SimilarityEdge>,
    /// Bounds the server actually used; may be clamped.
    #[serde(default)]
    pub viewport: Option<ViewportBounds>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_tags: Vec<String>,
    pub batch_size: u32,
}

/// Response body of the timeline call as arbitrarily sized byte chunks.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, BackendError>>;

// ── Backend enum ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum GraphBackend {
    Http(HttpBackend),
    Fixture(FixtureBackend),
}

impl GraphBackend {
    /// Build the backend selected in config. `api_key` is only used by the
    /// HTTP backend.
    pub fn from_config(config: &BackendConfig, api_key: Option<String>) -> Result<Self, BackendError> {
        match config.kind {
            BackendKind::Http => Ok(Self::Http(HttpBackend::new(
                &config.api_base_url,
                &config.viewport_path,
                &config.timeline_path,
                api_key,
            )?)),
            BackendKind::Fixture => {
                let fixture = match &config.fixture_dir {
                    Some(dir) => FixtureBackend::from_dir(dir)?,
                    None => FixtureBackend::new(),
                };
                Ok(Self::Fixture(fixture))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Fixture(_) => "fixture",
        }
    }

    /// One request/response viewport call.
    pub async fn fetch_viewport(&self, request: &ViewportRequest) -> Result<ViewportResponse, BackendError> {
        match self {
            Self::Http(b) => b.fetch_viewport(request).await,
            Self::Fixture(b) => b.fetch_viewport(request).await,
        }
    }

    /// Open the timeline call and hand back its body as a byte stream.
    pub async fn open_timeline(&self, request: &TimelineRequest) -> Result<ByteStream, BackendError> {
        match self {
            Self::Http(b) => b.open_timeline(request).await,
            Self::Fixture(b) => b.open_timeline(request).await,
        }
    }
}

impl From<FixtureBackend> for GraphBackend {
    fn from(b: FixtureBackend) -> Self {
        Self::Fixture(b)
    }
}

impl From<HttpBackend> for GraphBackend {
    fn from(b: HttpBackend) -> Self {
        Self::Http(b)
    }
}
