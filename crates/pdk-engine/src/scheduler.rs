//! Daily scheduler: activation of due SCHEDULED orders and expiry of
//! finished LIVE orders, acting as [`Actor::System`].
//!
//! The whole pass is one unit of work. It either commits every change it
//! made or none of them.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use pdk_schemas::{
    Actor, HistoryEntry, HistoryEvent, Notification, NotificationKind, OrderStatus, Recipient,
};
use pdk_workflow::validate_transition;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::{EngineResult, LifecycleEngine, LifecycleStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyReport {
    pub run_date: NaiveDate,
    pub activated: Vec<Uuid>,
    pub expired: Vec<Uuid>,
}

impl DailyReport {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "run_date": self.run_date.to_string(),
            "activated": self.activated,
            "expired": self.expired,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(DailyReport),
    /// Another run held the guard.
    Skipped,
}

pub struct DailyScheduler<S: LifecycleStore> {
    engine: Arc<LifecycleEngine<S>>,
    running: Mutex<()>,
}

impl<S: LifecycleStore> DailyScheduler<S> {
    pub fn new(engine: Arc<LifecycleEngine<S>>) -> Self {
        Self {
            engine,
            running: Mutex::new(()),
        }
    }

    /// Run one daily pass now. Never waits for a run already in progress.
    pub async fn run_once(&self) -> EngineResult<RunOutcome> {
        let Ok(_guard) = self.running.try_lock() else {
            info!("daily run already in progress; skipped");
            return Ok(RunOutcome::Skipped);
        };

        let today = self.engine.clock.today();
        let mut tx = self.engine.store.begin().await?;
        let result = self.pass_in_tx(&mut tx, today).await;
        let result = self.engine.finish(tx, "daily_run", result).await;

        match result {
            Ok((report, notes)) => {
                info!(
                    run_date = %report.run_date,
                    activated = report.activated.len(),
                    expired = report.expired.len(),
                    "daily run committed"
                );
                self.engine.dispatcher.dispatch(notes);
                Ok(RunOutcome::Completed(report))
            }
            Err(err) => {
                error!(run_date = %today, code = err.code(), error = %err, "daily run failed; nothing committed");
                Err(err)
            }
        }
    }

    async fn pass_in_tx(
        &self,
        tx: &mut S::Tx,
        today: NaiveDate,
    ) -> EngineResult<(DailyReport, Vec<Notification>)> {
        let engine = &self.engine;
        let store = &engine.store;
        let system = Actor::system();
        let now = engine.clock.now();
        let mut notes = Vec::new();
        let mut report = DailyReport {
            run_date: today,
            activated: Vec::new(),
            expired: Vec::new(),
        };

        // (a) SCHEDULED -> PENDING, pole held from today.
        for order in store.due_for_activation(tx, today).await? {
            validate_transition(order.status, OrderStatus::Pending, system.role())?;
            store
                .update_order_status(tx, order.order_id, OrderStatus::Pending, now)
                .await?;
            store
                .append_history(
                    tx,
                    &HistoryEntry::new(
                        order.order_id,
                        system,
                        HistoryEvent::StatusChange {
                            from: order.status,
                            to: OrderStatus::Pending,
                            rollback: false,
                        },
                        Some(format!("start date {} reached", order.start_date)),
                        now,
                    ),
                )
                .await?;
            engine.occupy_pole(tx, order.pole_id).await?;

            notes.push(Notification::new(
                NotificationKind::OrderActivated,
                order.order_id,
                order.pole_id,
                vec![Recipient::Admins],
                format!("order activated; lease starts {}", order.start_date),
                now,
            ));
            report.activated.push(order.order_id);
        }

        // (b) LIVE -> EXPIRED. The pole stays OCCUPIED until dismount.
        for order in store.due_for_expiry(tx, today).await? {
            validate_transition(order.status, OrderStatus::Expired, system.role())?;
            store
                .update_order_status(tx, order.order_id, OrderStatus::Expired, now)
                .await?;
            store
                .append_history(
                    tx,
                    &HistoryEntry::new(
                        order.order_id,
                        system,
                        HistoryEvent::StatusChange {
                            from: order.status,
                            to: OrderStatus::Expired,
                            rollback: false,
                        },
                        Some(format!("end date {} passed", order.end_date)),
                        now,
                    ),
                )
                .await?;

            let recipient = order
                .field_user_id
                .map(Recipient::User)
                .unwrap_or(Recipient::Admins);
            notes.push(Notification::new(
                NotificationKind::OrderExpired,
                order.order_id,
                order.pole_id,
                vec![recipient],
                format!("lease ended {}; banner awaits dismount", order.end_date),
                now,
            ));
            report.expired.push(order.order_id);
        }

        Ok((report, notes))
    }

    /// Sleep until each local `run_at` in `tz`, run, repeat. A failed run
    /// waits for the next tick.
    pub fn spawn_daily(self: Arc<Self>, run_at: NaiveTime, tz: Tz) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let now = self.engine.clock.now();
                let next = next_run_after(now, run_at, tz);
                let wait = (next - now).to_std().unwrap_or(StdDuration::ZERO);
                info!(next_run = %next, "daily scheduler sleeping");
                tokio::time::sleep(wait).await;
                // Errors are logged inside run_once.
                let _ = self.run_once().await;
            }
        })
    }
}

/// The first local `run_at` in `tz` strictly after `now`.
///
/// A `run_at` that falls in a DST gap fires one hour later; an ambiguous one
/// fires at its first occurrence.
pub fn next_run_after(now: DateTime<Utc>, run_at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let mut day = now.with_timezone(&tz).date_naive();
    for _ in 0..3 {
        let local = day.and_time(run_at);
        let instant = tz
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest());
        if let Some(t) = instant {
            let t = t.with_timezone(&Utc);
            if t > now {
                return t;
            }
        }
        day += Duration::days(1);
    }
    now + Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn next_run_same_day_when_before_run_at() {
        let next = next_run_after(at("2025-01-10T00:00:30Z"), hm(0, 1), Tz::UTC);
        assert_eq!(next, at("2025-01-10T00:01:00Z"));
    }

    #[test]
    fn next_run_is_strictly_after_now() {
        let next = next_run_after(at("2025-01-10T00:01:00Z"), hm(0, 1), Tz::UTC);
        assert_eq!(next, at("2025-01-11T00:01:00Z"));
    }

    #[test]
    fn next_run_uses_local_midnight() {
        // 23:30 UTC on Jan 9 is 00:30 on Jan 10 in Madrid (UTC+1).
        let next = next_run_after(at("2025-01-09T23:30:00Z"), hm(0, 1), chrono_tz::Europe::Madrid);
        assert_eq!(next, at("2025-01-10T23:01:00Z"));
        let next = next_run_after(at("2025-01-09T22:30:00Z"), hm(0, 1), chrono_tz::Europe::Madrid);
        assert_eq!(next, at("2025-01-09T23:01:00Z"));
    }

    #[test]
    fn next_run_skips_dst_gap_forward() {
        // Europe/Madrid jumps 02:00 -> 03:00 on 2025-03-30.
        let next = next_run_after(at("2025-03-30T00:00:00Z"), hm(2, 30), chrono_tz::Europe::Madrid);
        assert_eq!(next, at("2025-03-30T01:30:00Z"));
    }
}
