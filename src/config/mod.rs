//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory (or
//! the file given with `-f`), then applies `GRAPH_LOADER_*` env overrides.
//!
//! # Module layout
//!
//! - **types** — resolved configuration structs (`Config`, `BackendConfig`, …).
//! - **raw** — TOML deserialization types with serde defaults; private.
//! - **load** — `load`, `load_from`, `expand_home` and `[meta] base` merging.

mod load;
mod raw;
mod types;

pub use load::{expand_home, load, load_from};
pub use types::*;

impl Config {
    /// Fixture backend, no API key, no pacing delay. Safe for tests.
    pub fn test_default() -> Self {
        Self {
            log_level: "info".into(),
            backend: BackendConfig {
                kind: BackendKind::Fixture,
                api_base_url: raw::default_api_base_url(),
                viewport_path: raw::default_viewport_path(),
                timeline_path: raw::default_timeline_path(),
                fixture_dir: None,
            },
            api_key: None,
            viewport: ViewportConfig::default(),
            timeline: TimelineConfig {
                batch_size: 5,
                batch_delay: std::time::Duration::ZERO,
            },
            container_tags: Vec::new(),
        }
    }
}
