//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains, and
//! applies `GRAPH_LOADER_LOG_LEVEL` / `GRAPH_LOADER_API_URL` overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

use super::raw::RawConfig;
use super::types::*;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Lay `overlay` over `base`. Tables merge key by key; arrays such as
/// `container_tags` and scalars replace the base value.
fn overlay(base: toml::Value, top: toml::Value) -> toml::Value {
    let (mut merged, top) = match (base, top) {
        (toml::Value::Table(merged), toml::Value::Table(top)) => (merged, top),
        (_, top) => return top,
    };
    for (key, value) in top {
        let value = match merged.remove(&key) {
            Some(under) => overlay(under, value),
            None => value,
        };
        merged.insert(key, value);
    }
    toml::Value::Table(merged)
}

/// Read `path` and everything its `[meta] base` chain points at, most basic
/// file first. `chain` is the files already on the way down; a repeat is a
/// cycle and is reported with the whole chain.
fn resolve_chain(path: &Path, chain: &mut Vec<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if chain.contains(&canonical) {
        let trail: Vec<String> = chain.iter().chain([&canonical]).map(|p| p.display().to_string()).collect();
        return Err(AppError::Config(format!("circular base reference: {}", trail.join(" -> "))));
    }
    chain.push(canonical);

    let text = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    let mut value: toml::Value = toml::from_str(&text)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    // [meta] describes this file only; it never merges into the result
    let base = value
        .as_table_mut()
        .and_then(|t| t.remove("meta"))
        .and_then(|meta| meta.get("base").and_then(toml::Value::as_str).map(PathBuf::from));

    match base {
        Some(base) => {
            let base = if base.is_absolute() {
                base
            } else {
                path.parent().unwrap_or(Path::new(".")).join(base)
            };
            Ok(overlay(resolve_chain(&base, chain)?, value))
        }
        None => Ok(value),
    }
}

/// Load config from the given path, or `config/default.toml`, then apply
/// env-var overrides. Without an explicit path and without the default file,
/// built-in defaults are used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let log_level_override = env::var("GRAPH_LOADER_LOG_LEVEL").ok();
    let api_url_override = env::var("GRAPH_LOADER_API_URL").ok();
    let api_key = env::var("GRAPH_LOADER_API_KEY").ok().filter(|k| !k.is_empty());

    let path = match config_path {
        Some(p) => Some(Path::new(p)),
        None => Some(Path::new(DEFAULT_CONFIG_PATH)).filter(|p| p.exists()),
    };

    let mut config = match path {
        Some(p) => load_from(p, log_level_override.as_deref(), api_url_override.as_deref())?,
        None => resolve(
            RawConfig::default(),
            log_level_override.as_deref(),
            api_url_override.as_deref(),
        )?,
    };
    config.api_key = api_key;
    Ok(config)
}

/// Internal loader. Accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    log_level_override: Option<&str>,
    api_url_override: Option<&str>,
) -> Result<Config, AppError> {
    let merged_val = resolve_chain(path, &mut Vec::new())?;

    let parsed: RawConfig = Deserialize::deserialize(merged_val).map_err(|e: toml::de::Error| {
        AppError::Config(format!("config error in {}: {e}", path.display()))
    })?;

    resolve(parsed, log_level_override, api_url_override)
}

fn resolve(
    parsed: RawConfig,
    log_level_override: Option<&str>,
    api_url_override: Option<&str>,
) -> Result<Config, AppError> {
    let kind = match parsed.backend.kind.as_str() {
        "http" => BackendKind::Http,
        "fixture" => BackendKind::Fixture,
        other => {
            return Err(AppError::Config(format!(
                "unknown backend kind '{other}' (expected \"http\" or \"fixture\")"
            )));
        }
    };

    if parsed.viewport.limit == 0 {
        return Err(AppError::Config("viewport.limit must be at least 1".into()));
    }
    if !(parsed.viewport.initial_size.is_finite() && parsed.viewport.initial_size > 0.0) {
        return Err(AppError::Config("viewport.initial_size must be a positive number".into()));
    }
    if parsed.timeline.batch_size == 0 {
        return Err(AppError::Config("timeline.batch_size must be at least 1".into()));
    }

    Ok(Config {
        log_level: log_level_override.unwrap_or(&parsed.app.log_level).to_string(),
        backend: BackendConfig {
            kind,
            api_base_url: api_url_override.unwrap_or(&parsed.backend.api_base_url).to_string(),
            viewport_path: parsed.backend.viewport_path,
            timeline_path: parsed.backend.timeline_path,
            fixture_dir: parsed.backend.fixture_dir.as_deref().map(expand_home),
        },
        api_key: None,
        viewport: ViewportConfig {
            limit: parsed.viewport.limit,
            initial_size: parsed.viewport.initial_size,
        },
        timeline: TimelineConfig {
            batch_size: parsed.timeline.batch_size,
            batch_delay: Duration::from_millis(parsed.timeline.batch_delay_ms),
        },
        container_tags: parsed.filter.container_tags,
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
