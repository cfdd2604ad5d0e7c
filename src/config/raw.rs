//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.

use serde::Deserialize;

/// Raw TOML shape, the serde target before resolution.
#[derive(Deserialize, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub app: RawApp,
    #[serde(default)]
    pub backend: RawBackend,
    #[serde(default)]
    pub viewport: RawViewport,
    #[serde(default)]
    pub timeline: RawTimeline,
    #[serde(default)]
    pub filter: RawFilter,
}

#[derive(Deserialize)]
pub(super) struct RawApp {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Deserialize)]
pub(super) struct RawBackend {
    /// `"http"` or `"fixture"`.
    #[serde(default = "default_backend_kind")]
    pub kind: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_viewport_path")]
    pub viewport_path: String,
    #[serde(default = "default_timeline_path")]
    pub timeline_path: String,
    #[serde(default)]
    pub fixture_dir: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct RawViewport {
    #[serde(default = "default_viewport_limit")]
    pub limit: u32,
    #[serde(default = "default_initial_size")]
    pub initial_size: f64,
}

#[derive(Deserialize)]
pub(super) struct RawTimeline {
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

#[derive(Deserialize, Default)]
pub(super) struct RawFilter {
    #[serde(default)]
    pub container_tags: Vec<String>,
}

impl Default for RawApp {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

impl Default for RawBackend {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            api_base_url: default_api_base_url(),
            viewport_path: default_viewport_path(),
            timeline_path: default_timeline_path(),
            fixture_dir: None,
        }
    }
}

impl Default for RawViewport {
    fn default() -> Self {
        Self { limit: default_viewport_limit(), initial_size: default_initial_size() }
    }
}

impl Default for RawTimeline {
    fn default() -> Self {
        Self { batch_size: default_batch_size(), batch_delay_ms: default_batch_delay_ms() }
    }
}

pub(super) fn default_log_level() -> String { "info".to_string() }
pub(super) fn default_backend_kind() -> String { "http".to_string() }
pub(super) fn default_api_base_url() -> String { "https://api.supermemory.ai".to_string() }
pub(super) fn default_viewport_path() -> String { "/v3/documents/graph/viewport".to_string() }
pub(super) fn default_timeline_path() -> String { "/v3/documents/graph/timeline".to_string() }
fn default_viewport_limit() -> u32 { 200 }
fn default_initial_size() -> f64 { 2000.0 }
fn default_batch_size() -> u32 { 5 }
fn default_batch_delay_ms() -> u64 { 400 }
