//! Scenario: the evidence gate holds for every role, including admin.
//!
//! # Invariants under test
//!
//! - PENDING -> PRINTING without a printer fails with MISSING_PRECONDITION,
//!   even for admin, and writes nothing.
//! - Role checks come before evidence: a printer is refused on PENDING.
//! - Printer and field actors only move orders assigned to them.
//! - Admin still cannot leave the allowed-next column.
//! - The full happy path ends COMPLETED with the pole AVAILABLE.

use pdk_engine::CreateOrders;
use pdk_schemas::{OrderStatus, PoleStatus, ProofType, UserRole};
use pdk_testkit::{day, id_of, Harness};
use pdk_workflow::{Requirement, WorkflowError};
use uuid::Uuid;

async fn pending_order(h: &Harness) -> (Uuid, Uuid) {
    let op = h.operator().await;
    let pole = h.add_pole("P-ev").await;
    let orders = h
        .engine
        .create_orders(
            CreateOrders {
                pole_ids: vec![pole],
                account_id: Uuid::new_v4(),
                start: day("2025-01-10"),
                end: day("2025-02-10"),
                price_micros: 0,
            },
            &op,
        )
        .await
        .unwrap();
    (orders[0].order_id, pole)
}

#[tokio::test]
async fn admin_without_printer_is_missing_precondition() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let (order_id, _) = pending_order(&h).await;

    let err = h
        .engine
        .transition_status(order_id, OrderStatus::Printing, &admin, None)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err.as_workflow(),
            Some(WorkflowError::MissingPrecondition {
                requirement: Requirement::AssignedPrinter
            })
        ),
        "got {err}"
    );

    let order = h.store.order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(h.store.history_of(order_id).await.len(), 1, "only the creation entry");
}

#[tokio::test]
async fn printer_is_refused_on_pending_before_evidence() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let printer = h.add_user(UserRole::Printer).await;
    let (order_id, _) = pending_order(&h).await;
    h.engine
        .assign_printer(order_id, id_of(&printer), &admin)
        .await
        .unwrap();

    let err = h
        .engine
        .transition_status(order_id, OrderStatus::Printing, &printer, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ROLE_NOT_AUTHORIZED");
}

#[tokio::test]
async fn printer_only_moves_own_orders() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let mine = h.add_user(UserRole::Printer).await;
    let other = h.add_user(UserRole::Printer).await;
    let (order_id, _) = pending_order(&h).await;

    h.engine.assign_printer(order_id, id_of(&mine), &admin).await.unwrap();
    h.engine
        .transition_status(order_id, OrderStatus::Printing, &admin, None)
        .await
        .unwrap();
    let field = h.add_user(UserRole::Field).await;
    h.engine.assign_field_team(order_id, id_of(&field), &admin).await.unwrap();

    let err = h
        .engine
        .transition_status(order_id, OrderStatus::AwaitingMount, &other, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ROLE_NOT_AUTHORIZED");

    let order = h
        .engine
        .transition_status(order_id, OrderStatus::AwaitingMount, &mine, Some("printed".into()))
        .await
        .expect("assigned printer advances");
    assert_eq!(order.status, OrderStatus::AwaitingMount);
}

#[tokio::test]
async fn field_team_needs_mount_proof_to_go_live() {
    let h = Harness::new(day("2025-01-10"));
    let (order_id, _) = pending_order(&h).await;
    h.walk_to(order_id, OrderStatus::AwaitingMount).await.unwrap();
    let field_id = h.store.order(order_id).await.unwrap().field_user_id.unwrap();
    let field = pdk_schemas::Actor::user(field_id, UserRole::Field);

    let err = h
        .engine
        .transition_status(order_id, OrderStatus::Live, &field, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_workflow(),
        Some(WorkflowError::MissingPrecondition {
            requirement: Requirement::MountProof
        })
    ));

    h.engine
        .record_proof(order_id, ProofType::ProofMount, "s3://proofs/p1-mount.jpg", &field)
        .await
        .unwrap();
    let order = h
        .engine
        .transition_status(order_id, OrderStatus::Live, &field, None)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Live);
}

#[tokio::test]
async fn admin_cannot_jump_outside_the_table() {
    let h = Harness::new(day("2025-01-10"));
    let admin = h.admin().await;
    let (order_id, _) = pending_order(&h).await;

    let err = h
        .engine
        .transition_status(order_id, OrderStatus::Live, &admin, None)
        .await
        .unwrap_err();
    match err.as_workflow() {
        Some(WorkflowError::TransitionNotAllowed { from, to, allowed }) => {
            assert_eq!(*from, OrderStatus::Pending);
            assert_eq!(*to, OrderStatus::Live);
            assert_eq!(allowed, &vec![OrderStatus::Printing, OrderStatus::Cancelled]);
        }
        other => panic!("expected TransitionNotAllowed, got {other:?}"),
    }
}

#[tokio::test]
async fn happy_path_completes_and_frees_the_pole() {
    let h = Harness::new(day("2025-01-10"));
    let (order_id, pole) = pending_order(&h).await;

    let order = h.walk_to(order_id, OrderStatus::Completed).await.unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(h.store.pole_status(pole).await, Some(PoleStatus::Available));

    let statuses: Vec<OrderStatus> = h
        .engine
        .order_history(order_id)
        .await
        .unwrap()
        .iter()
        .filter_map(|e| e.event.new_status())
        .collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatus::Pending,
            OrderStatus::Printing,
            OrderStatus::AwaitingMount,
            OrderStatus::Live,
            OrderStatus::Expired,
            OrderStatus::Completed,
        ]
    );

    let admin = h.admin().await;
    let err = h
        .engine
        .transition_status(order_id, OrderStatus::Cancelled, &admin, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_CURRENT_STATE");
}
