//! Runtime secret resolution.
//!
//! Config carries env var NAMES. This module reads the values at startup and
//! keeps them out of `Debug` output.

use anyhow::Result;

use crate::AppConfig;

#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    /// Present only when `notifications.webhook_url_env` names a set,
    /// non-blank variable.
    pub webhook_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

pub fn resolve_secrets(cfg: &AppConfig) -> Result<ResolvedSecrets> {
    let webhook_url = cfg
        .notifications
        .webhook_url_env
        .as_deref()
        .and_then(resolve_env);
    Ok(ResolvedSecrets { webhook_url })
}

/// Blank values count as unset.
fn resolve_env(var_name: &str) -> Option<String> {
    let name = var_name.trim();
    if name.is_empty() {
        return None;
    }
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
