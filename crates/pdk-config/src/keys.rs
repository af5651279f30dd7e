//! Leaf-level checks over the merged document: which keys nothing reads,
//! and which values look like pasted credentials.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-pointer prefixes read by [`crate::AppConfig`]. A leaf under any of
/// these is consumed; anything else is reported by [`report_unused_keys`].
pub const CONSUMED_POINTERS: &[&str] = &[
    "/database/max_connections",
    "/database/acquire_timeout_ms",
    "/database/statement_timeout_ms",
    "/scheduler/enabled",
    "/scheduler/run_at",
    "/scheduler/timezone",
    "/notifications/webhook_url_env",
    "/notifications/timeout_ms",
    "/daemon/bind_addr",
];

/// Values starting with one of these abort loading. Config holds env var
/// names, never the secret itself.
const SECRET_PREFIXES: &[&str] = &[
    "postgres://",
    "postgresql://",
    "https://hooks.",
    "xoxb-",
    "xoxp-",
    "ghp_",
    "AKIA",
    "sk-",
    "-----BEGIN",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Sorted, deduplicated.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// List leaves no component reads. Under `Fail` any such leaf is an error.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let mut unused: Vec<String> = leaves(config_json)
        .into_iter()
        .map(|(ptr, _)| ptr)
        .filter(|ptr| !CONSUMED_POINTERS.iter().any(|c| covers(c, ptr)))
        .collect();
    unused.sort();
    unused.dedup();

    if policy == UnusedKeyPolicy::Fail && !unused.is_empty() {
        let shown = unused.iter().take(12).map(String::as_str).collect::<Vec<_>>();
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s): {}",
            unused.len(),
            shown.join(", ")
        );
    }
    Ok(UnusedKeyReport {
        unused_leaf_pointers: unused,
    })
}

/// Fail on the first string leaf that looks like a credential. The value
/// itself never reaches the error.
pub(crate) fn reject_secret_literals(doc: &Value) -> Result<()> {
    for (ptr, value) in leaves(doc) {
        let Some(s) = value.as_str().map(str::trim) else {
            continue;
        };
        if s.len() >= 8 && SECRET_PREFIXES.iter().any(|p| s.starts_with(p)) {
            bail!("CONFIG_SECRET_DETECTED leaf={ptr} value=REDACTED");
        }
    }
    Ok(())
}

/// `prefix` covers itself and anything below it: "/a/b" covers "/a/b/c"
/// but not "/a/bc".
fn covers(prefix: &str, ptr: &str) -> bool {
    match ptr.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Every scalar in `doc` with its RFC 6901 pointer. A scalar root is "/".
fn leaves(doc: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    let mut stack = vec![(String::new(), doc)];
    while let Some((ptr, v)) = stack.pop() {
        match v {
            Value::Object(map) => {
                for (k, child) in map {
                    let token = k.replace('~', "~0").replace('/', "~1");
                    stack.push((format!("{ptr}/{token}"), child));
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    stack.push((format!("{ptr}/{i}"), child));
                }
            }
            scalar if ptr.is_empty() => out.push(("/".to_string(), scalar)),
            scalar => out.push((ptr, scalar)),
        }
    }
    out
}
