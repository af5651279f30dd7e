//! Shared runtime state for pdk-daemon.
//!
//! Handlers receive `State<Arc<AppState<S>>>` from Axum. The engine and the
//! scheduler are generic over the store so tests can run the same router on
//! an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pdk_engine::{DailyScheduler, LifecycleEngine, LifecycleStore, Notifier};
use pdk_schemas::Notification;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Notification(Notification),
    LogLine { level: String, msg: String },
}

pub fn new_bus() -> broadcast::Sender<BusMsg> {
    let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
    bus
}

/// Publishes committed notifications onto the SSE bus. Having no
/// subscribers is not a delivery failure.
#[derive(Clone)]
pub struct BusNotifier {
    bus: broadcast::Sender<BusMsg>,
}

impl BusNotifier {
    pub fn new(bus: broadcast::Sender<BusMsg>) -> Self {
        Self { bus }
    }
}

#[async_trait::async_trait]
impl Notifier for BusNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let _ = self.bus.send(BusMsg::Notification(notification.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState<S: LifecycleStore> {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub engine: Arc<LifecycleEngine<S>>,
    pub scheduler: Arc<DailyScheduler<S>>,
}

impl<S: LifecycleStore> AppState<S> {
    /// `bus` must be the sender the engine's [`BusNotifier`] publishes to.
    pub fn new(bus: broadcast::Sender<BusMsg>, engine: Arc<LifecycleEngine<S>>) -> Self {
        let scheduler = Arc::new(DailyScheduler::new(Arc::clone(&engine)));
        Self {
            bus,
            build: BuildInfo {
                service: "pdk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            engine,
            scheduler,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
