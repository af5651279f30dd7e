//! Layered YAML config.
//!
//! Layers merge base first, later layers winning leaf by leaf. The merged
//! document is checked for secret literals, serialized with sorted keys and
//! hashed, so two runs can be compared by `config_hash` alone.

use std::fs;

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

mod keys;
mod secrets;
mod settings;

pub use keys::{report_unused_keys, UnusedKeyPolicy, UnusedKeyReport, CONSUMED_POINTERS};
pub use secrets::{resolve_secrets, ResolvedSecrets};
pub use settings::{AppConfig, DaemonConfig, DatabaseConfig, NotificationsConfig, SchedulerConfig};

/// Comma-separated list of YAML layers, used when no `--config` flag is given.
pub const ENV_CONFIG_PATHS: &str = "PDK_CONFIG";

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Hex SHA-256 of `canonical_json`.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the merged document.
    pub fn app_config(&self) -> Result<AppConfig> {
        AppConfig::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("failed to read config layer {p}")))
        .collect::<Result<Vec<_>>>()?;
    load_layered_yaml_from_strings(&docs.iter().map(String::as_str).collect::<Vec<_>>())
}

/// Layers named by `PDK_CONFIG`, or none when unset.
pub fn config_paths_from_env() -> Vec<String> {
    std::env::var(ENV_CONFIG_PATHS)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Load `paths`, falling back to `PDK_CONFIG`, falling back to an empty
/// document (all defaults).
pub fn load_effective(paths: &[String]) -> Result<LoadedConfig> {
    let paths = if paths.is_empty() {
        config_paths_from_env()
    } else {
        paths.to_vec()
    };
    load_layered_yaml(&paths.iter().map(String::as_str).collect::<Vec<_>>())
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());
    for (i, raw) in yaml_docs.iter().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        let layer: Value =
            serde_yaml::from_str(raw).with_context(|| format!("config layer {i} is not valid yaml"))?;
        overlay(&mut merged, layer);
    }

    keys::reject_secret_literals(&merged)?;

    let canonical_json =
        serde_json::to_string(&with_sorted_keys(&merged)).context("serialize merged config")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; any other value in `top` replaces `base`.
fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(into), Value::Object(from)) => {
            for (k, v) in from {
                match into.get_mut(&k) {
                    Some(slot) => overlay(slot, v),
                    None => {
                        into.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

fn with_sorted_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), with_sorted_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(with_sorted_keys).collect()),
        other => other.clone(),
    }
}
