//! Scenario: date edits, availability reads and proof uploads.
//!
//! # Invariants under test
//!
//! - Rescheduling re-checks availability excluding the order itself.
//! - Moving the start into the future turns PENDING into SCHEDULED and
//!   frees the pole; moving it to today does the reverse.
//! - Only SCHEDULED or PENDING orders can be rescheduled.
//! - Proofs are refused on terminal orders and for unassigned field users.

use pdk_engine::CreateOrders;
use pdk_schemas::{Actor, HistoryEvent, OrderStatus, PoleStatus, ProofType, UserRole};
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

#[tokio::test]
async fn reschedule_excludes_self_and_reprojects_the_pole() {
    let h = Harness::new(day("2025-01-10"));
    let op = h.operator().await;
    let pole = h.add_pole("P-rs").await;
    let order_id = book(&h, pole, "2025-01-10", "2025-01-31").await;
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));

    // Overlaps only its own current range.
    let moved = h
        .engine
        .reschedule_order(order_id, day("2025-01-15"), day("2025-02-05"), &op)
        .await
        .unwrap();
    assert_eq!(moved.status, OrderStatus::Scheduled);
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Available));

    let history = h.store.history_of(order_id).await;
    assert!(history
        .iter()
        .any(|e| matches!(e.event, HistoryEvent::ScheduleChange { .. })));
    assert_eq!(history.last().unwrap().event.new_status(), Some(OrderStatus::Scheduled));

    let back = h
        .engine
        .reschedule_order(order_id, day("2025-01-10"), day("2025-01-20"), &op)
        .await
        .unwrap();
    assert_eq!(back.status, OrderStatus::Pending);
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Occupied));
}

#[tokio::test]
async fn reschedule_into_a_neighbour_conflicts() {
    let h = Harness::new(day("2025-01-10"));
    let op = h.operator().await;
    let pole = h.add_pole("P-rs2").await;
    let a = book(&h, pole, "2025-01-10", "2025-01-20").await;
    let b = book(&h, pole, "2025-02-01", "2025-02-10").await;

    let err = h
        .engine
        .reschedule_order(b, day("2025-01-20"), day("2025-02-10"), &op)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "POLE_CONFLICT");
    assert_eq!(h.store.order(b).await.unwrap().start_date, day("2025-02-01"));

    assert!(!h
        .engine
        .check_availability(pole, day("2025-01-15"), day("2025-01-25"), None)
        .await
        .unwrap());
    assert!(h
        .engine
        .check_availability(pole, day("2025-01-15"), day("2025-01-25"), Some(a))
        .await
        .unwrap());
}

#[tokio::test]
async fn work_in_progress_cannot_be_rescheduled() {
    let h = Harness::new(day("2025-01-10"));
    let op = h.operator().await;
    let pole = h.add_pole("P-rs3").await;
    let order_id = book(&h, pole, "2025-01-10", "2025-01-20").await;
    h.walk_to(order_id, OrderStatus::Printing).await.unwrap();

    let err = h
        .engine
        .reschedule_order(order_id, day("2025-01-12"), day("2025-01-22"), &op)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_CURRENT_STATE");
}

#[tokio::test]
async fn availability_read_validates_input() {
    let h = Harness::new(day("2025-01-10"));
    let pole = h.add_pole("P-av").await;

    let err = h
        .engine
        .check_availability(pole, day("2025-01-20"), day("2025-01-20"), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");

    let err = h
        .engine
        .check_availability(Uuid::new_v4(), day("2025-01-20"), day("2025-01-21"), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn proof_upload_scope() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let pole = h.add_pole("P-pr").await;
    let order_id = book(&h, pole, "2025-01-10", "2025-01-20").await;
    h.walk_to(order_id, OrderStatus::AwaitingMount).await.unwrap();

    let stranger = h.add_user(UserRole::Field).await;
    let err = h
        .engine
        .record_proof(order_id, ProofType::ProofMount, "s3://x.jpg", &stranger)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ROLE_NOT_AUTHORIZED");

    let printer = h.add_user(UserRole::Printer).await;
    let err = h
        .engine
        .record_proof(order_id, ProofType::ProofMount, "s3://x.jpg", &printer)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ROLE_NOT_AUTHORIZED");

    let err = h
        .engine
        .record_proof(order_id, ProofType::ProofMount, "  ", &admin)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");

    let field_id = h.store.order(order_id).await.unwrap().field_user_id.unwrap();
    let proof = h
        .engine
        .record_proof(
            order_id,
            ProofType::ProofMount,
            "s3://proofs/p-pr.jpg",
            &Actor::user(field_id, UserRole::Field),
        )
        .await
        .unwrap();
    assert_eq!(proof.uploaded_by, Some(field_id));

    h.engine.cancel_order(order_id, "site closed", &admin).await.unwrap();
    let err = h
        .engine
        .record_proof(order_id, ProofType::ProofDismount, "s3://late.jpg", &admin)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_CURRENT_STATE");
}
