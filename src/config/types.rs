//! Public configuration types.
//!
//! These are the resolved, ready-to-use structs the loader components
//! consume. Raw TOML deserialization types live in `raw.rs`.

use std::path::PathBuf;
use std::time::Duration;

/// Which transport serves graph data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Http,
    Fixture,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Origin of the graph API, without a trailing path.
    pub api_base_url: String,
    pub viewport_path: String,
    pub timeline_path: String,
    /// Directory holding `viewport.json` / `timeline.ndjson` for the fixture
    /// backend (already expanded, no `~`).
    pub fixture_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ViewportConfig {
    /// Maximum documents requested per viewport call.
    pub limit: u32,
    /// Side length of the initial origin-centred viewport.
    pub initial_size: f64,
}

#[derive(Debug, Clone)]
pub struct TimelineConfig {
    /// Documents per streamed batch, requested from the server.
    pub batch_size: u32,
    /// Minimum gap between two batches handed to the consumer.
    pub batch_delay: Duration,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub backend: BackendConfig,
    /// From `GRAPH_LOADER_API_KEY` only. Never sourced from TOML.
    pub api_key: Option<String>,
    pub viewport: ViewportConfig,
    pub timeline: TimelineConfig,
    /// Active contextual tag set. Empty means unfiltered.
    pub container_tags: Vec<String>,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self { limit: 200, initial_size: 2000.0 }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self { batch_size: 5, batch_delay: Duration::from_millis(400) }
    }
}
