//! Typed view of the merged config document.
//!
//! Every section is optional; missing keys take their defaults. Keep
//! [`crate::CONSUMED_POINTERS`] in step with the fields below.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationsConfig,
    pub daemon: DaemonConfig,
}

impl AppConfig {
    /// Deserialize and validate. Unknown keys are ignored here; see
    /// [`crate::report_unused_keys`].
    pub fn from_json(v: &Value) -> Result<Self> {
        let cfg: AppConfig =
            serde_json::from_value(v.clone()).context("config does not match AppConfig")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(anyhow!("CONFIG_INVALID database.max_connections must be > 0"));
        }
        self.scheduler.run_at_time()?;
        self.scheduler.tz()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    pub statement_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_ms: 5_000,
            statement_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Local wall-clock time, "HH:MM".
    pub run_at: String,
    /// IANA zone name.
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_at: "00:01".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn run_at_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.run_at.trim(), "%H:%M")
            .map_err(|_| anyhow!("CONFIG_INVALID scheduler.run_at={:?} (want HH:MM)", self.run_at))
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| anyhow!("CONFIG_INVALID scheduler.timezone={:?}", self.timezone))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Name of the env var holding the webhook URL. Never the URL itself.
    pub webhook_url_env: Option<String>,
    pub timeout_ms: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            webhook_url_env: None,
            timeout_ms: 3_000,
        }
    }
}

impl NotificationsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub bind_addr: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8899".to_string(),
        }
    }
}
