//! pdk-engine
//!
//! Order lifecycle engine and daily scheduler, generic over the
//! [`LifecycleStore`] unit-of-work seam.

mod clock;
mod engine;
mod error;
mod notify;
mod pg;
mod scheduler;
mod store;

pub use clock::{Clock, SystemClock};
pub use engine::{CreateOrders, LifecycleEngine};
pub use error::{EngineError, EngineResult};
pub use notify::{FanoutNotifier, LogNotifier, NotificationDispatcher, Notifier, WebhookNotifier};
pub use pg::PgStore;
pub use scheduler::{next_run_after, DailyReport, DailyScheduler, RunOutcome};
pub use store::LifecycleStore;
