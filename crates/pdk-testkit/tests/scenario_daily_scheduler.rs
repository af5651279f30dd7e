//! Scenario: the daily scheduler pass.
//!
//! # Invariants under test
//!
//! - SCHEDULED orders whose start date is today become PENDING and occupy
//!   their pole; tomorrow's do not.
//! - LIVE orders whose end date has passed become EXPIRED; the pole stays
//!   OCCUPIED until dismount.
//! - Scheduler changes are attributed to the system actor.
//! - A pass that fails part-way commits nothing and can simply run again.
//! - A second run while one is in progress is skipped.

use std::time::Duration;

use pdk_engine::{CreateOrders, LifecycleStore, RunOutcome};
use pdk_schemas::{Actor, NotificationKind, OrderStatus, PoleStatus, Recipient};
use pdk_testkit::{day, Harness};
use uuid::Uuid;

async fn book(h: &Harness, pole: Uuid, start: &str, end: &str) -> Uuid {
    let op = h.operator().await;
    h.engine
        .create_orders(
            CreateOrders {
                pole_ids: vec![pole],
                account_id: Uuid::new_v4(),
                start: day(start),
                end: day(end),
                price_micros: 0,
            },
            &op,
        )
        .await
        .unwrap()[0]
        .order_id
}

fn completed(outcome: RunOutcome) -> pdk_engine::DailyReport {
    match outcome {
        RunOutcome::Completed(r) => r,
        RunOutcome::Skipped => panic!("run was skipped"),
    }
}

#[tokio::test]
async fn activation_happens_on_the_start_day() {
    let h = Harness::new(day("2025-01-10"));
    let pole = h.add_pole("P-act").await;
    let order_id = book(&h, pole, "2025-01-11", "2025-01-31").await;
    let sched = h.scheduler();

    let report = completed(sched.run_once().await.unwrap());
    assert!(report.activated.is_empty(), "start date is tomorrow");
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Available));

    h.clock.advance_days(1);
    let report = completed(sched.run_once().await.unwrap());
    assert_eq!(report.run_date, day("2025-01-11"));
    assert_eq!(report.activated, vec![order_id]);
    assert_eq!(h.store.order(order_id).await.unwrap().status, OrderStatus::Pending);
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));

    let last = h.store.history_of(order_id).await.pop().unwrap();
    assert_eq!(last.actor, Actor::System);
    assert_eq!(last.event.new_status(), Some(OrderStatus::Pending));

    let seen = h.notifier.wait_for(2).await;
    assert!(seen.iter().any(|n| n.kind == NotificationKind::OrderActivated));

    // Idempotent: nothing left to do on a repeat run.
    let report = completed(sched.run_once().await.unwrap());
    assert!(report.activated.is_empty() && report.expired.is_empty());
}

#[tokio::test]
async fn expiry_keeps_the_pole_occupied() {
    let h = Harness::new(day("2025-01-10"));
    let pole = h.add_pole("P-exp").await;
    let order_id = book(&h, pole, "2025-01-10", "2025-01-20").await;
    let live = h.walk_to(order_id, OrderStatus::Live).await.unwrap();
    let sched = h.scheduler();

    h.clock.set_day(day("2025-01-20"));
    let report = completed(sched.run_once().await.unwrap());
    assert!(report.expired.is_empty(), "end date itself is still leased");

    h.clock.set_day(day("2025-01-21"));
    let report = completed(sched.run_once().await.unwrap());
    assert_eq!(report.expired, vec![order_id]);
    assert_eq!(h.store.order(order_id).await.unwrap().status, OrderStatus::Expired);
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));

    let field = live.field_user_id.unwrap();
    let mut tries = 0;
    loop {
        let seen = h.notifier.notifications();
        if let Some(n) = seen.iter().find(|n| n.kind == NotificationKind::OrderExpired) {
            assert_eq!(n.recipients, vec![Recipient::User(field)]);
            break;
        }
        tries += 1;
        assert!(tries < 200, "expiry notification never arrived");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn failed_pass_commits_nothing() {
    let h = Harness::new(day("2025-01-10"));
    let p_act = h.add_pole("P-f1").await;
    let to_activate = book(&h, p_act, "2025-01-11", "2025-01-31").await;
    h.clock.advance_days(1);
    let sched = h.scheduler();

    // Activation is written, then the expiry query fails.
    h.store.fail_next("due_for_expiry");
    let err = sched.run_once().await.unwrap_err();
    assert_eq!(err.code(), "STORAGE");
    assert_eq!(h.store.order(to_activate).await.unwrap().status, OrderStatus::Scheduled);
    assert_eq!(h.store.pole_status(p_act).await, Some(PoleStatus::Available));
    assert_eq!(h.store.history_of(to_activate).await.len(), 1);

    let report = completed(sched.run_once().await.unwrap());
    assert_eq!(report.activated, vec![to_activate]);
}

#[tokio::test]
async fn overlapping_run_is_skipped() {
    let h = Harness::new(day("2025-01-10"));
    let sched = h.scheduler();

    // Hold the store so the first run blocks inside its pass.
    let held = h.store.begin().await.unwrap();
    let first = {
        let sched = sched.clone();
        tokio::spawn(async move { sched.run_once().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(sched.run_once().await.unwrap(), RunOutcome::Skipped);

    h.store.rollback(held).await.unwrap();
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
}
