//! One graph session: a store plus the viewport coordinator and timeline
//! streamer that write into it, scoped to a single filter.
//!
//! Sessions are constructed explicitly and passed around; two sessions never
//! share state. Changing the filter cancels outstanding work before the store
//! is cleared, so a late response cannot repopulate it.

use std::sync::{Mutex, MutexGuard};

use tracing::info;

use crate::backend::GraphBackend;
use crate::config::Config;
use crate::graph::{layout, GraphSnapshot, SharedStore, ViewportBounds};
use crate::timeline::{StreamOutcome, TimelineConsumer, TimelineStreamer};
use crate::viewport::{FetchOutcome, ViewportCoordinator};

pub struct GraphSession {
    store: SharedStore,
    viewport: ViewportCoordinator,
    timeline: TimelineStreamer,
    filter: Mutex<Vec<String>>,
    limit: u32,
    initial_size: f64,
}

impl GraphSession {
    pub fn new(backend: GraphBackend, config: &Config) -> Self {
        let store = SharedStore::new();
        Self {
            viewport: ViewportCoordinator::new(backend.clone(), store.clone()),
            timeline: TimelineStreamer::new(
                backend,
                store.clone(),
                config.timeline.batch_size,
                config.timeline.batch_delay,
            ),
            store,
            filter: Mutex::new(config.container_tags.clone()),
            limit: config.viewport.limit,
            initial_size: config.viewport.initial_size,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn viewport(&self) -> &ViewportCoordinator {
        &self.viewport
    }

    pub fn timeline(&self) -> &TimelineStreamer {
        &self.timeline
    }

    pub fn filter(&self) -> Vec<String> {
        self.filter_lock().clone()
    }

    /// Switch to a new tag filter. Returns `false` when the filter is
    /// unchanged (compared as the joined tag list), in which case nothing is
    /// reset.
    pub fn set_filter(&self, container_tags: Vec<String>) -> bool {
        {
            let current = self.filter_lock();
            if current.join(",") == container_tags.join(",") {
                return false;
            }
        }
        self.reset();
        info!(tags = ?container_tags, "graph filter changed");
        *self.filter_lock() = container_tags;
        true
    }

    /// Cancel the in-flight fetch and any running stream, then clear the
    /// store and the viewport bookkeeping.
    pub fn reset(&self) {
        self.viewport.reset();
        self.timeline.stop();
        self.store.lock().reset();
    }

    /// Fetch the slice inside `bounds` under the current filter.
    pub async fn fetch_viewport(&self, bounds: ViewportBounds) -> FetchOutcome {
        let filter = self.filter();
        self.viewport.fetch(bounds, &filter, self.limit).await
    }

    /// Fetch the origin-centred initial viewport.
    pub async fn fetch_initial_viewport(&self) -> FetchOutcome {
        self.fetch_viewport(ViewportBounds::centered(self.initial_size)).await
    }

    /// Stream the whole filtered corpus. Viewport fetching is disabled until
    /// [`Self::stop_timeline`] is called.
    pub async fn start_timeline(&self, consumer: &dyn TimelineConsumer) -> StreamOutcome {
        self.viewport.cancel();
        self.viewport.set_enabled(false);
        let filter = self.filter();
        self.timeline.start(&filter, consumer).await
    }

    /// Stop any running stream and re-enable viewport fetching.
    pub fn stop_timeline(&self) {
        self.timeline.stop();
        self.viewport.set_enabled(true);
    }

    /// Renderable graph for everything loaded so far, with viewport edge
    /// admission applied.
    pub fn graph(&self) -> GraphSnapshot {
        layout::viewport_graph(&self.store.lock())
    }

    pub fn total_loaded(&self) -> usize {
        self.store.lock().len()
    }

    /// Tear the session down: cancel everything and drop loaded data.
    pub fn dispose(self) {
        self.reset();
    }

    fn filter_lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.filter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
