//! Best-effort notification delivery.
//!
//! Notifications are built inside a unit of work but only handed to the
//! dispatcher after commit. Delivery runs on a spawned task; a failure is
//! logged at WARN and dropped. Nothing here can undo committed state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use pdk_schemas::Notification;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[async_trait::async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Fire-and-forget front of a [`Notifier`].
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Spawn delivery of `batch` and return immediately. The handle is only
    /// useful to tests; callers normally drop it.
    pub fn dispatch(&self, batch: Vec<Notification>) -> Option<JoinHandle<()>> {
        if batch.is_empty() {
            return None;
        }
        let notifier = Arc::clone(&self.notifier);
        Some(tokio::spawn(async move {
            for n in &batch {
                if let Err(err) = notifier.notify(n).await {
                    warn!(
                        kind = n.kind.as_str(),
                        order_id = %n.order_id,
                        error = %format!("{err:#}"),
                        "notification delivery failed"
                    );
                }
            }
        }))
    }
}

/// Writes each notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &Notification) -> Result<()> {
        info!(
            kind = n.kind.as_str(),
            order_id = %n.order_id,
            pole_id = %n.pole_id,
            recipients = n.recipients.len(),
            "{}",
            n.message
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to an external sender.
///
/// The URL usually embeds a token; it is never logged.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("webhook http client build failed")?;
        Ok(Self { http, url })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, n: &Notification) -> Result<()> {
        let resp = self
            .http
            .post(&self.url)
            .json(n)
            .send()
            .await
            .context("webhook request failed")?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("webhook http error status={}", status.as_u16()));
        }
        Ok(())
    }
}

/// Delivers to every inner notifier. One failing sink does not stop the
/// others; the call fails if any of them failed.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(sinks: Vec<Arc<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn Notifier>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait::async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, n: &Notification) -> Result<()> {
        let mut failed = 0usize;
        for sink in &self.sinks {
            if let Err(err) = sink.notify(n).await {
                failed += 1;
                warn!(kind = n.kind.as_str(), error = %format!("{err:#}"), "notification sink failed");
            }
        }
        if failed > 0 {
            return Err(anyhow!("{failed} of {} notification sinks failed", self.sinks.len()));
        }
        Ok(())
    }
}
