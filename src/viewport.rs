//! Viewport fetch coordination.
//!
//! Turns a requested world-space rectangle into at most one outstanding
//! backend call and merges the answer into the session store. Repeated calls
//! for the same `(bounds, filter, limit)` are suppressed once one of them has
//! succeeded; a failed attempt leaves the fingerprint uncommitted so the same
//! bounds can be retried.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::backend::{BackendError, GraphBackend, ViewportRequest};
use crate::graph::{SharedStore, ViewportBounds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    /// A bound was NaN or infinite.
    InvalidBounds,
    /// Another fetch is outstanding.
    InFlight,
    /// Same request as the last successful one.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Loaded { documents: usize, edges: usize },
    Skipped(SkipReason),
    Failed(BackendError),
    /// Cancelled or reset while in flight; the response was discarded.
    Cancelled,
}

pub struct ViewportCoordinator {
    backend: GraphBackend,
    store: SharedStore,
    state: Mutex<ViewportState>,
}

struct ViewportState {
    enabled: bool,
    tickets: u64,
    in_flight: Option<InFlight>,
    last_fingerprint: Option<String>,
    current_viewport: Option<ViewportBounds>,
    last_error: Option<BackendError>,
}

struct InFlight {
    ticket: u64,
    cancel: CancellationToken,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintInput<'a> {
    bounds: &'a ViewportBounds,
    container_tags: &'a [String],
    limit: u32,
}

/// Structural fingerprint of a viewport request: sha256 over its canonical
/// JSON form, hex encoded.
pub fn fingerprint(bounds: &ViewportBounds, container_tags: &[String], limit: u32) -> String {
    let input = FingerprintInput { bounds, container_tags, limit };
    let canonical = serde_json::to_vec(&input).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

impl ViewportCoordinator {
    pub fn new(backend: GraphBackend, store: SharedStore) -> Self {
        Self {
            backend,
            store,
            state: Mutex::new(ViewportState {
                enabled: true,
                tickets: 0,
                in_flight: None,
                last_fingerprint: None,
                current_viewport: None,
                last_error: None,
            }),
        }
    }

    /// Fetch the slice inside `bounds` and merge it into the store.
    ///
    /// Never errors across the call: failures come back as
    /// [`FetchOutcome::Failed`] and are also kept as [`Self::last_error`].
    pub async fn fetch(&self, bounds: ViewportBounds, container_tags: &[String], limit: u32) -> FetchOutcome {
        let (ticket, cancel, fp) = {
            let mut state = self.state();
            if !state.enabled {
                debug!("viewport fetching disabled, skipping");
                return FetchOutcome::Skipped(SkipReason::Disabled);
            }
            if state.in_flight.is_some() {
                debug!("viewport fetch already in flight, skipping");
                return FetchOutcome::Skipped(SkipReason::InFlight);
            }
            if !bounds.is_finite() {
                warn!(?bounds, "non-finite viewport bounds, skipping fetch");
                return FetchOutcome::Skipped(SkipReason::InvalidBounds);
            }
            let fp = fingerprint(&bounds, container_tags, limit);
            if state.last_fingerprint.as_deref() == Some(fp.as_str()) {
                debug!("viewport unchanged since last fetch, skipping");
                return FetchOutcome::Skipped(SkipReason::Duplicate);
            }

            state.tickets += 1;
            let cancel = CancellationToken::new();
            state.in_flight = Some(InFlight { ticket: state.tickets, cancel: cancel.clone() });
            state.last_error = None;
            (state.tickets, cancel, fp)
        };

        let request = ViewportRequest { viewport: bounds, container_tags: container_tags.to_vec(), limit };
        debug!(?bounds, limit, tags = container_tags.len(), "fetching viewport");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.backend.fetch_viewport(&request) => Some(result),
        };

        let mut state = self.state();
        let current = state.in_flight.as_ref().is_some_and(|f| f.ticket == ticket);
        if current {
            state.in_flight = None;
        }
        let result = match result {
            Some(result) if current => result,
            _ => {
                debug!(ticket, "discarding response of cancelled viewport fetch");
                return FetchOutcome::Cancelled;
            }
        };

        match result {
            Ok(response) => {
                let documents = response.documents.len();
                let edges = response.edges.len();
                {
                    let mut store = self.store.lock();
                    store.upsert_documents(response.documents);
                    store.set_edges(response.edges);
                }
                state.current_viewport = Some(response.viewport.unwrap_or(bounds));
                state.last_fingerprint = Some(fp);
                debug!(documents, edges, "viewport loaded");
                FetchOutcome::Loaded { documents, edges }
            }
            Err(e) => {
                error!(error = %e, "viewport fetch failed");
                state.last_error = Some(e.clone());
                FetchOutcome::Failed(e)
            }
        }
    }

    /// Cancel the outstanding fetch, if any. Its response will be discarded.
    pub fn cancel(&self) -> bool {
        match self.state().in_flight.take() {
            Some(in_flight) => {
                in_flight.cancel.cancel();
                debug!(ticket = in_flight.ticket, "viewport fetch cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel and forget every piece of bookkeeping. The store itself is
    /// cleared by the owner of the session.
    pub fn reset(&self) {
        self.cancel();
        let mut state = self.state();
        state.last_fingerprint = None;
        state.current_viewport = None;
        state.last_error = None;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state().enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn is_loading(&self) -> bool {
        self.state().in_flight.is_some()
    }

    /// Bounds of the last successful fetch, as echoed by the server.
    pub fn current_viewport(&self) -> Option<ViewportBounds> {
        self.state().current_viewport
    }

    pub fn last_error(&self) -> Option<BackendError> {
        self.state().last_error.clone()
    }

    /// Documents loaded so far in this session.
    pub fn total_loaded(&self) -> usize {
        self.store.lock().len()
    }

    fn state(&self) -> MutexGuard<'_, ViewportState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
