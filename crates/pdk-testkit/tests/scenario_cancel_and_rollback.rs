//! Scenario: admin corrections.
//!
//! # Invariants under test
//!
//! - Cancellation is admin-only, needs a reason, records who and why, and
//!   frees the pole unless another order still holds it.
//! - Rollback targets are the statuses the order has left plus the safety
//!   set; anything else is INVALID_ROLLBACK_TARGET listing the legal set.
//! - Rollback entries are flagged in history and re-project the pole:
//!   PENDING releases it only while the start date is still ahead, every
//!   other occupying target holds it, LIVE and EXPIRED included.
//! - Reviving an EXPIRED order re-checks its dates against bookings made
//!   after it expired.
//! - Terminal orders cannot be cancelled or rolled back.

use pdk_engine::CreateOrders;
use pdk_schemas::{NotificationKind, OrderStatus, PoleStatus};
use pdk_testkit::{day, id_of, Harness};
use pdk_workflow::WorkflowError;
use uuid::Uuid;

async fn order_on(h: &Harness, pole: Uuid, start: &str, end: &str) -> Uuid {
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

#[tokio::test]
async fn cancel_frees_the_pole_and_records_metadata() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let pole = h.add_pole("P-c").await;
    let order_id = order_on(&h, pole, "2025-01-10", "2025-02-10").await;
    h.walk_to(order_id, OrderStatus::Printing).await.unwrap();

    let order = h
        .engine
        .cancel_order(order_id, "  artwork rejected  ", &admin)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    let c = order.cancellation.expect("cancellation metadata");
    assert_eq!(c.reason, "artwork rejected");
    assert_eq!(c.cancelled_by, Some(id_of(&admin)));
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Available));

    // created, printer assigned, printing, cancelled
    let seen = h.notifier.wait_for(4).await;
    assert!(seen.iter().any(|n| n.kind == NotificationKind::OrderCancelled));

    let err = h.engine.cancel_order(order_id, "again", &admin).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_CURRENT_STATE");
}

#[tokio::test]
async fn cancel_requires_admin_and_a_reason() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let op = h.operator().await;
    let pole = h.add_pole("P-c2").await;
    let order_id = order_on(&h, pole, "2025-01-10", "2025-02-10").await;

    let err = h.engine.cancel_order(order_id, "please", &op).await.unwrap_err();
    assert_eq!(err.code(), "ROLE_NOT_AUTHORIZED");
    let err = h.engine.cancel_order(order_id, "   ", &admin).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
    assert_eq!(h.store.order(order_id).await.unwrap().status, OrderStatus::Pending);
}

#[tokio::test]
async fn cancelling_one_of_two_occupying_orders_keeps_pole_occupied() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let pole = h.add_pole("P-two").await;
    let a = order_on(&h, pole, "2025-01-10", "2025-01-20").await;
    let b = order_on(&h, pole, "2025-01-25", "2025-02-05").await;
    // b starts in the future; bring it into the occupying set manually.
    h.walk_to(b, OrderStatus::Pending).await.unwrap();

    h.engine.cancel_order(a, "duplicate booking", &admin).await.unwrap();
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));

    h.engine.cancel_order(b, "duplicate booking", &admin).await.unwrap();
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Available));
}

#[tokio::test]
async fn rollback_targets_follow_history_and_safety_set() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let pole = h.add_pole("P-rb").await;
    let order_id = order_on(&h, pole, "2025-01-10", "2025-02-10").await;
    h.walk_to(order_id, OrderStatus::Live).await.unwrap();

    let err = h
        .engine
        .rollback_status(order_id, OrderStatus::Scheduled, &admin, "not reachable")
        .await
        .unwrap_err();
    match err.as_workflow() {
        Some(WorkflowError::InvalidRollbackTarget { target, allowed }) => {
            assert_eq!(*target, OrderStatus::Scheduled);
            assert_eq!(
                allowed,
                &vec![OrderStatus::Pending, OrderStatus::Printing, OrderStatus::AwaitingMount]
            );
        }
        other => panic!("expected InvalidRollbackTarget, got {other:?}"),
    }

    let err = h
        .engine
        .rollback_status(order_id, OrderStatus::Live, &admin, "same")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_ROLLBACK_TARGET");

    let order = h
        .engine
        .rollback_status(order_id, OrderStatus::AwaitingMount, &admin, "mount photo was blurry")
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::AwaitingMount);
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));

    let last = h.store.history_of(order_id).await.pop().unwrap();
    assert!(last.event.is_rollback());
    assert_eq!(last.event.old_status(), Some(OrderStatus::Live));
    assert_eq!(last.note.as_deref(), Some("mount photo was blurry"));
}

#[tokio::test]
async fn rollback_to_pending_before_start_releases_the_pole() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let pole = h.add_pole("P-rb2").await;
    let order_id = order_on(&h, pole, "2025-01-20", "2025-02-10").await;
    h.walk_to(order_id, OrderStatus::Live).await.unwrap();
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));

    h.engine
        .rollback_status(order_id, OrderStatus::Pending, &admin, "reprint")
        .await
        .unwrap();
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Available));
    // Still booked even though the pole reads free.
    assert!(!h
        .engine
        .check_availability(pole, day("2025-01-25"), day("2025-01-30"), None)
        .await
        .unwrap());

    // PRINTING was left once, so it stays a legal target.
    h.engine
        .rollback_status(order_id, OrderStatus::Printing, &admin, "undo")
        .await
        .unwrap();
    assert_eq!(h.store.order(order_id).await.unwrap().status, OrderStatus::Printing);
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));
}

#[tokio::test]
async fn rollback_to_pending_after_start_keeps_the_pole() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let pole = h.add_pole("P-rb4").await;
    let order_id = order_on(&h, pole, "2025-01-10", "2025-02-10").await;
    h.walk_to(order_id, OrderStatus::Live).await.unwrap();

    h.engine
        .rollback_status(order_id, OrderStatus::Pending, &admin, "reprint")
        .await
        .unwrap();
    assert_eq!(h.store.order(order_id).await.unwrap().status, OrderStatus::Pending);
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));

    // Walking forward again never leaves the pole reading free.
    h.walk_to(order_id, OrderStatus::Live).await.unwrap();
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));
    h.walk_to(order_id, OrderStatus::Expired).await.unwrap();
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));
}

#[tokio::test]
async fn rollback_to_live_reoccupies_a_released_pole() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let pole = h.add_pole("P-rb5").await;
    let order_id = order_on(&h, pole, "2025-01-20", "2025-02-10").await;
    h.walk_to(order_id, OrderStatus::Live).await.unwrap();
    h.engine
        .rollback_status(order_id, OrderStatus::Pending, &admin, "reprint")
        .await
        .unwrap();
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Available));

    // LIVE is in the history as an old status, so it is a legal target.
    let order = h
        .engine
        .rollback_status(order_id, OrderStatus::Live, &admin, "reprint not needed")
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Live);
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));

    let order = h
        .engine
        .transition_status(order_id, OrderStatus::Expired, &admin, None)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Expired);
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));
}

#[tokio::test]
async fn reviving_an_expired_order_respects_newer_bookings() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let pole = h.add_pole("P-rb6").await;
    let a = order_on(&h, pole, "2025-01-10", "2025-01-31").await;
    h.walk_to(a, OrderStatus::Expired).await.unwrap();

    // An expired order no longer blocks its dates.
    let b = order_on(&h, pole, "2025-01-15", "2025-01-20").await;
    assert_eq!(h.store.order(b).await.unwrap().status, OrderStatus::Scheduled);

    let err = h
        .engine
        .rollback_status(a, OrderStatus::Live, &admin, "dismount was early")
        .await
        .unwrap_err();
    match err.as_workflow() {
        Some(WorkflowError::PoleConflict {
            conflicting_order_id,
            ..
        }) => assert_eq!(*conflicting_order_id, b),
        other => panic!("expected PoleConflict, got {other:?}"),
    }
    assert_eq!(h.store.order(a).await.unwrap().status, OrderStatus::Expired);
    assert!(!h.store.history_of(a).await.iter().any(|e| e.event.is_rollback()));

    h.engine.cancel_order(b, "make room", &admin).await.unwrap();
    let order = h
        .engine
        .rollback_status(a, OrderStatus::Live, &admin, "dismount was early")
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Live);
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));
    assert!(!h
        .engine
        .check_availability(pole, day("2025-01-15"), day("2025-01-20"), None)
        .await
        .unwrap());
}

#[tokio::test]
async fn rollback_is_admin_only_and_never_leaves_terminal() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let op = h.operator().await;
    let pole = h.add_pole("P-rb3").await;
    let order_id = order_on(&h, pole, "2025-01-10", "2025-02-10").await;
    h.walk_to(order_id, OrderStatus::Printing).await.unwrap();

    let err = h
        .engine
        .rollback_status(order_id, OrderStatus::Pending, &op, "wrong printer")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ROLE_NOT_AUTHORIZED");

    let err = h
        .engine
        .rollback_status(order_id, OrderStatus::Pending, &admin, "")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");

    h.engine.cancel_order(order_id, "lost contract", &admin).await.unwrap();
    let err = h
        .engine
        .rollback_status(order_id, OrderStatus::Pending, &admin, "revive")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_CURRENT_STATE");
}
