//! In-memory backend serving scripted responses.
//!
//! Used for offline runs (`kind = "fixture"`) and throughout the tests. Every
//! request is recorded so callers can assert how many network calls were
//! actually issued. Clones share the same script and request log.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::StreamExt;
use tracing::debug;

use super::{BackendError, ByteStream, TimelineRequest, ViewportRequest, ViewportResponse};

const VIEWPORT_FILE: &str = "viewport.json";
const TIMELINE_FILE: &str = "timeline.ndjson";

#[derive(Debug, Clone, Default)]
pub struct FixtureBackend {
    inner: Arc<Mutex<FixtureState>>,
}

#[derive(Debug, Default)]
struct FixtureState {
    /// Consumed front to back; once empty, `fallback` answers.
    viewport_replies: VecDeque<Result<ViewportResponse, BackendError>>,
    fallback: Option<ViewportResponse>,
    viewport_latency: Duration,
    viewport_requests: Vec<ViewportRequest>,

    timeline_chunks: Vec<Vec<u8>>,
    timeline_open_error: Option<BackendError>,
    timeline_body_error: Option<BackendError>,
    chunk_delay: Duration,
    timeline_requests: Vec<TimelineRequest>,
}

impl FixtureBackend {
    /// Empty backend: viewport calls echo the requested bounds with no data,
    /// the timeline body is empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `viewport.json` and `timeline.ndjson` from `dir`. Either file may
    /// be absent.
    pub fn from_dir(dir: &Path) -> Result<Self, BackendError> {
        let fixture = Self::new();

        let viewport_path = dir.join(VIEWPORT_FILE);
        if viewport_path.exists() {
            let raw = std::fs::read_to_string(&viewport_path).map_err(|e| {
                BackendError::Fixture(format!("cannot read {}: {e}", viewport_path.display()))
            })?;
            let response: ViewportResponse = serde_json::from_str(&raw).map_err(|e| {
                BackendError::Fixture(format!("parse error in {}: {e}", viewport_path.display()))
            })?;
            fixture.state().fallback = Some(response);
        }

        let timeline_path = dir.join(TIMELINE_FILE);
        if timeline_path.exists() {
            let body = std::fs::read(&timeline_path).map_err(|e| {
                BackendError::Fixture(format!("cannot read {}: {e}", timeline_path.display()))
            })?;
            fixture.state().timeline_chunks = vec![body];
        }

        debug!(dir = %dir.display(), "fixture backend loaded");
        Ok(fixture)
    }

    fn state(&self) -> MutexGuard<'_, FixtureState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Script: viewport ─────────────────────────────────────────────────────

    /// Answer every viewport call (after queued replies) with `response`.
    pub fn with_viewport(self, response: ViewportResponse) -> Self {
        self.state().fallback = Some(response);
        self
    }

    /// Queue a one-off reply for the next unanswered viewport call.
    pub fn push_viewport_reply(&self, response: ViewportResponse) {
        self.state().viewport_replies.push_back(Ok(response));
    }

    /// Queue a one-off failure for the next unanswered viewport call.
    pub fn push_viewport_error(&self, error: BackendError) {
        self.state().viewport_replies.push_back(Err(error));
    }

    /// Delay each viewport reply, keeping the request in flight.
    pub fn with_viewport_latency(self, latency: Duration) -> Self {
        self.state().viewport_latency = latency;
        self
    }

    // ── Script: timeline ─────────────────────────────────────────────────────

    /// Serve the timeline body as exactly these chunks.
    pub fn with_timeline_chunks(self, chunks: Vec<Vec<u8>>) -> Self {
        self.state().timeline_chunks = chunks;
        self
    }

    /// Serve `body` split into chunks of `chunk_size` bytes, ignoring line and
    /// UTF-8 boundaries.
    pub fn with_timeline_body(self, body: &str, chunk_size: usize) -> Self {
        let chunks = body.as_bytes().chunks(chunk_size.max(1)).map(<[u8]>::to_vec).collect();
        self.with_timeline_chunks(chunks)
    }

    /// Wait this long before yielding each chunk.
    pub fn with_chunk_delay(self, delay: Duration) -> Self {
        self.state().chunk_delay = delay;
        self
    }

    /// Fail the timeline call before any body is produced.
    pub fn with_timeline_open_error(self, error: BackendError) -> Self {
        self.state().timeline_open_error = Some(error);
        self
    }

    /// Yield `error` after the last chunk, as a dropped connection would.
    pub fn with_timeline_body_error(self, error: BackendError) -> Self {
        self.state().timeline_body_error = Some(error);
        self
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn viewport_calls(&self) -> usize {
        self.state().viewport_requests.len()
    }

    pub fn viewport_requests(&self) -> Vec<ViewportRequest> {
        self.state().viewport_requests.clone()
    }

    pub fn timeline_calls(&self) -> usize {
        self.state().timeline_requests.len()
    }

    pub fn timeline_requests(&self) -> Vec<TimelineRequest> {
        self.state().timeline_requests.clone()
    }

    // ── Backend surface ──────────────────────────────────────────────────────

    pub async fn fetch_viewport(&self, request: &ViewportRequest) -> Result<ViewportResponse, BackendError> {
        let latency = {
            let mut state = self.state();
            state.viewport_requests.push(request.clone());
            state.viewport_latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        match state.viewport_replies.pop_front() {
            Some(reply) => reply,
            None => Ok(state.fallback.clone().unwrap_or_else(|| ViewportResponse {
                viewport: Some(request.viewport),
                ..ViewportResponse::default()
            })),
        }
    }

    pub async fn open_timeline(&self, request: &TimelineRequest) -> Result<ByteStream, BackendError> {
        let (items, delay) = {
            let mut state = self.state();
            state.timeline_requests.push(request.clone());
            if let Some(err) = state.timeline_open_error.clone() {
                return Err(err);
            }
            let mut items: Vec<Result<Vec<u8>, BackendError>> =
                state.timeline_chunks.iter().cloned().map(Ok).collect();
            if let Some(err) = state.timeline_body_error.clone() {
                items.push(Err(err));
            }
            (items, state.chunk_delay)
        };

        let body = futures_util::stream::unfold(items.into_iter(), move |mut rest| async move {
            let item = rest.next()?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some((item, rest))
        });
        Ok(body.boxed())
    }
}
