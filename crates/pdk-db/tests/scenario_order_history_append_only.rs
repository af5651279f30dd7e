//! Scenario: order_history is append-only and closed enums are CHECKed.
//!
//! # Invariants under test
//!
//! - UPDATE and DELETE on `order_history` are rejected by the trigger.
//! - `orders.status` and `orders` date ranges are constrained at the DB level.
//! - History round-trips through `append_history` / `history` in order.
//!
//! DB-backed test. Skips if `PDK_DATABASE_URL` is not set.

use chrono::{NaiveDate, SubsecRound, Utc};
use pdk_schemas::{
    Actor, HistoryEntry, HistoryEvent, Order, OrderStatus, Pole, PoleStatus, UserRole,
};
use uuid::Uuid;

fn is_check_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        db_err.code().as_deref() == Some("23514")
    } else {
        false
    }
}

#[tokio::test]
async fn history_rejects_mutation_and_orders_reject_bad_values() -> anyhow::Result<()> {
    let url = match std::env::var(pdk_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: PDK_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    pdk_db::migrate(&pool).await?;

    let mut conn = pool.acquire().await?;

    let pole = Pole {
        pole_id: Uuid::new_v4(),
        code: format!("TEST-{}", Uuid::new_v4().simple()),
        latitude: 40.0,
        longitude: -3.7,
        status: PoleStatus::Available,
        deleted_at: None,
    };
    pdk_db::insert_pole(&mut *conn, &pole).await?;

    // timestamptz keeps microseconds
    let now = Utc::now().trunc_subsecs(6);
    let start = NaiveDate::from_ymd_opt(2030, 1, 10).unwrap();
    let order = Order {
        order_id: Uuid::new_v4(),
        pole_id: pole.pole_id,
        account_id: Uuid::new_v4(),
        start_date: start,
        end_date: NaiveDate::from_ymd_opt(2030, 2, 10).unwrap(),
        status: OrderStatus::Scheduled,
        printer_id: None,
        field_user_id: None,
        price_micros: 1_000_000,
        cancellation: None,
        created_by: None,
        created_at: now,
        updated_at: now,
    };
    pdk_db::insert_order(&mut *conn, &order).await?;

    let admin = Actor::user(Uuid::new_v4(), UserRole::Admin);
    let created = HistoryEntry::new(
        order.order_id,
        admin,
        HistoryEvent::Created { status: OrderStatus::Scheduled },
        None,
        now,
    );
    let activated = HistoryEntry::new(
        order.order_id,
        Actor::system(),
        HistoryEvent::StatusChange {
            from: OrderStatus::Scheduled,
            to: OrderStatus::Pending,
            rollback: false,
        },
        Some("daily activation".to_string()),
        now,
    );
    pdk_db::append_history(&mut *conn, &created).await?;
    pdk_db::append_history(&mut *conn, &activated).await?;

    let got = pdk_db::history(&mut *conn, order.order_id).await?;
    assert_eq!(got, vec![created.clone(), activated]);

    // --- append-only trigger ---
    let upd = sqlx::query("update order_history set note = 'edited' where entry_id = $1")
        .bind(created.entry_id)
        .execute(&mut *conn)
        .await;
    assert!(upd.is_err(), "UPDATE on order_history must be rejected");

    let del = sqlx::query("delete from order_history where entry_id = $1")
        .bind(created.entry_id)
        .execute(&mut *conn)
        .await;
    assert!(del.is_err(), "DELETE on order_history must be rejected");

    // --- CHECK constraints ---
    let bad_status = sqlx::query("update orders set status = 'ON_HOLD' where order_id = $1")
        .bind(order.order_id)
        .execute(&mut *conn)
        .await
        .expect_err("unknown status must be rejected");
    assert!(is_check_violation(&bad_status), "{bad_status:?}");

    let bad_range = sqlx::query("update orders set end_date = start_date where order_id = $1")
        .bind(order.order_id)
        .execute(&mut *conn)
        .await
        .expect_err("end == start must be rejected");
    assert!(is_check_violation(&bad_range), "{bad_range:?}");

    // --- row reads ---
    let fetched = pdk_db::fetch_order(&mut *conn, order.order_id, false)
        .await?
        .expect("order must exist");
    assert_eq!(fetched.status, OrderStatus::Scheduled);
    assert_eq!(fetched.range(), order.range());

    let due = pdk_db::due_for_activation(&mut *conn, start).await?;
    assert!(due.iter().any(|o| o.order_id == order.order_id));

    Ok(())
}
