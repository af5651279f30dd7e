//! Pole, order, proof and user statements.
//!
//! Every function takes `&mut PgConnection` so the caller decides the
//! transaction boundary. Pass `&mut *tx` for a `Transaction<'_, Postgres>`.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use pdk_schemas::{
    AssignmentSlot, Booking, Cancellation, DateRange, Order, OrderStatus, Pole, PoleStatus,
    ProofArtifact, ProofType, UserRef, UserRole,
};
use pdk_workflow::WorkflowError;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

const ORDER_COLUMNS: &str = r#"
    order_id, pole_id, account_id, start_date, end_date, status,
    printer_id, field_user_id, price_micros,
    cancel_reason, cancelled_at, cancelled_by,
    created_by, created_at, updated_at
"#;

/// A status string the CHECK constraint should have rejected surfaces as a
/// typed workflow error rather than a decode failure.
fn decode_order_status(raw: &str) -> Result<OrderStatus> {
    OrderStatus::parse(raw).map_err(|e| {
        anyhow::Error::new(WorkflowError::InvalidCurrentState {
            status: raw.to_string(),
            reason: e.to_string(),
        })
    })
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    let cancel_reason: Option<String> = row.try_get("cancel_reason")?;
    let cancelled_at: Option<DateTime<Utc>> = row.try_get("cancelled_at")?;
    let cancellation = match (cancel_reason, cancelled_at) {
        (Some(reason), Some(cancelled_at)) => Some(Cancellation {
            reason,
            cancelled_at,
            cancelled_by: row.try_get("cancelled_by")?,
        }),
        _ => None,
    };

    Ok(Order {
        order_id: row.try_get("order_id")?,
        pole_id: row.try_get("pole_id")?,
        account_id: row.try_get("account_id")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        status: decode_order_status(&row.try_get::<String, _>("status")?)?,
        printer_id: row.try_get("printer_id")?,
        field_user_id: row.try_get("field_user_id")?,
        price_micros: row.try_get("price_micros")?,
        cancellation,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn pole_from_row(row: &PgRow) -> Result<Pole> {
    Ok(Pole {
        pole_id: row.try_get("pole_id")?,
        code: row.try_get("code")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        status: PoleStatus::parse(&row.try_get::<String, _>("status")?)?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

// ---------------------------------------------------------------------------
// Poles
// ---------------------------------------------------------------------------

pub async fn insert_pole(conn: &mut PgConnection, pole: &Pole) -> Result<()> {
    sqlx::query(
        r#"
        insert into poles (pole_id, code, latitude, longitude, status, deleted_at)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(pole.pole_id)
    .bind(&pole.code)
    .bind(pole.latitude)
    .bind(pole.longitude)
    .bind(pole.status.as_str())
    .bind(pole.deleted_at)
    .execute(&mut *conn)
    .await
    .context("insert_pole failed")?;
    Ok(())
}

/// Live (non-deleted) pole, no lock.
pub async fn fetch_pole(conn: &mut PgConnection, pole_id: Uuid) -> Result<Option<Pole>> {
    let row = sqlx::query(
        r#"
        select pole_id, code, latitude, longitude, status, deleted_at
        from poles
        where pole_id = $1 and deleted_at is null
        "#,
    )
    .bind(pole_id)
    .fetch_optional(&mut *conn)
    .await
    .context("fetch_pole failed")?;

    row.as_ref().map(pole_from_row).transpose()
}

/// Row-lock a live pole. Serializes the read-check-insert of bookings on it.
pub async fn lock_pole(conn: &mut PgConnection, pole_id: Uuid) -> Result<Option<Pole>> {
    let row = sqlx::query(
        r#"
        select pole_id, code, latitude, longitude, status, deleted_at
        from poles
        where pole_id = $1 and deleted_at is null
        for update
        "#,
    )
    .bind(pole_id)
    .fetch_optional(&mut *conn)
    .await
    .context("lock_pole failed")?;

    row.as_ref().map(pole_from_row).transpose()
}

pub async fn set_pole_status(
    conn: &mut PgConnection,
    pole_id: Uuid,
    status: PoleStatus,
) -> Result<()> {
    sqlx::query("update poles set status = $2 where pole_id = $1")
        .bind(pole_id)
        .bind(status.as_str())
        .execute(&mut *conn)
        .await
        .context("set_pole_status failed")?;
    Ok(())
}

/// Bookings on a pole that may still matter to the availability check.
/// Terminal orders are filtered here; the remaining status filter is applied
/// by the caller.
pub async fn pole_bookings(conn: &mut PgConnection, pole_id: Uuid) -> Result<Vec<Booking>> {
    let rows = sqlx::query(
        r#"
        select order_id, status, start_date, end_date
        from orders
        where pole_id = $1
          and status not in ('COMPLETED','CANCELLED')
        order by start_date
        "#,
    )
    .bind(pole_id)
    .fetch_all(&mut *conn)
    .await
    .context("pole_bookings failed")?;

    rows.iter()
        .map(|row| {
            let start: NaiveDate = row.try_get("start_date")?;
            let end: NaiveDate = row.try_get("end_date")?;
            Ok(Booking {
                order_id: row.try_get("order_id")?,
                status: decode_order_status(&row.try_get::<String, _>("status")?)?,
                range: DateRange::new(start, end),
            })
        })
        .collect()
}

/// Orders on the pole in an occupying status, optionally ignoring one.
pub async fn count_occupying_orders(
    conn: &mut PgConnection,
    pole_id: Uuid,
    exclude: Option<Uuid>,
) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from orders
        where pole_id = $1
          and status in ('PENDING','PRINTING','AWAITING_MOUNT','LIVE','EXPIRED')
          and ($2::uuid is null or order_id <> $2)
        "#,
    )
    .bind(pole_id)
    .bind(exclude)
    .fetch_one(&mut *conn)
    .await
    .context("count_occupying_orders failed")?;
    Ok(n)
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
    let cancel = order.cancellation.as_ref();
    sqlx::query(
        r#"
        insert into orders (
          order_id, pole_id, account_id, start_date, end_date, status,
          printer_id, field_user_id, price_micros,
          cancel_reason, cancelled_at, cancelled_by,
          created_by, created_at, updated_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15
        )
        "#,
    )
    .bind(order.order_id)
    .bind(order.pole_id)
    .bind(order.account_id)
    .bind(order.start_date)
    .bind(order.end_date)
    .bind(order.status.as_str())
    .bind(order.printer_id)
    .bind(order.field_user_id)
    .bind(order.price_micros)
    .bind(cancel.map(|c| c.reason.clone()))
    .bind(cancel.map(|c| c.cancelled_at))
    .bind(cancel.and_then(|c| c.cancelled_by))
    .bind(order.created_by)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await
    .context("insert_order failed")?;
    Ok(())
}

/// Fetch an order. `lock = true` takes `FOR UPDATE` on the row, so
/// concurrent mutations of the same order serialize.
pub async fn fetch_order(
    conn: &mut PgConnection,
    order_id: Uuid,
    lock: bool,
) -> Result<Option<Order>> {
    let sql = format!(
        "select {ORDER_COLUMNS} from orders where order_id = $1{}",
        if lock { " for update" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await
        .context("fetch_order failed")?;

    row.as_ref().map(order_from_row).transpose()
}

pub async fn update_order_status(
    conn: &mut PgConnection,
    order_id: Uuid,
    status: OrderStatus,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("update orders set status = $2, updated_at = $3 where order_id = $1")
        .bind(order_id)
        .bind(status.as_str())
        .bind(updated_at)
        .execute(&mut *conn)
        .await
        .context("update_order_status failed")?;
    Ok(())
}

pub async fn update_order_schedule(
    conn: &mut PgConnection,
    order_id: Uuid,
    range: DateRange,
    status: OrderStatus,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        update orders
        set start_date = $2, end_date = $3, status = $4, updated_at = $5
        where order_id = $1
        "#,
    )
    .bind(order_id)
    .bind(range.start)
    .bind(range.end)
    .bind(status.as_str())
    .bind(updated_at)
    .execute(&mut *conn)
    .await
    .context("update_order_schedule failed")?;
    Ok(())
}

pub async fn set_assignee(
    conn: &mut PgConnection,
    order_id: Uuid,
    slot: AssignmentSlot,
    user_id: Option<Uuid>,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    let sql = match slot {
        AssignmentSlot::Printer => {
            "update orders set printer_id = $2, updated_at = $3 where order_id = $1"
        }
        AssignmentSlot::FieldTeam => {
            "update orders set field_user_id = $2, updated_at = $3 where order_id = $1"
        }
    };
    sqlx::query(sql)
        .bind(order_id)
        .bind(user_id)
        .bind(updated_at)
        .execute(&mut *conn)
        .await
        .context("set_assignee failed")?;
    Ok(())
}

pub async fn mark_cancelled(
    conn: &mut PgConnection,
    order_id: Uuid,
    cancellation: &Cancellation,
) -> Result<()> {
    sqlx::query(
        r#"
        update orders
        set status = 'CANCELLED',
            cancel_reason = $2,
            cancelled_at = $3,
            cancelled_by = $4,
            updated_at = $3
        where order_id = $1
        "#,
    )
    .bind(order_id)
    .bind(&cancellation.reason)
    .bind(cancellation.cancelled_at)
    .bind(cancellation.cancelled_by)
    .execute(&mut *conn)
    .await
    .context("mark_cancelled failed")?;
    Ok(())
}

/// SCHEDULED orders whose start has arrived, locked for the daily run.
pub async fn due_for_activation(conn: &mut PgConnection, today: NaiveDate) -> Result<Vec<Order>> {
    let sql = format!(
        "select {ORDER_COLUMNS} from orders \
         where status = 'SCHEDULED' and start_date <= $1 \
         order by start_date, order_id for update"
    );
    let rows = sqlx::query(&sql)
        .bind(today)
        .fetch_all(&mut *conn)
        .await
        .context("due_for_activation failed")?;
    rows.iter().map(order_from_row).collect()
}

/// LIVE orders whose end date has passed, locked for the daily run.
pub async fn due_for_expiry(conn: &mut PgConnection, today: NaiveDate) -> Result<Vec<Order>> {
    let sql = format!(
        "select {ORDER_COLUMNS} from orders \
         where status = 'LIVE' and end_date < $1 \
         order by end_date, order_id for update"
    );
    let rows = sqlx::query(&sql)
        .bind(today)
        .fetch_all(&mut *conn)
        .await
        .context("due_for_expiry failed")?;
    rows.iter().map(order_from_row).collect()
}

// ---------------------------------------------------------------------------
// Proofs
// ---------------------------------------------------------------------------

pub async fn has_proof(
    conn: &mut PgConnection,
    order_id: Uuid,
    proof_type: ProofType,
) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1 from order_proofs where order_id = $1 and proof_type = $2
        )
        "#,
    )
    .bind(order_id)
    .bind(proof_type.as_str())
    .fetch_one(&mut *conn)
    .await
    .context("has_proof failed")?;
    Ok(exists)
}

pub async fn insert_proof(conn: &mut PgConnection, proof: &ProofArtifact) -> Result<()> {
    sqlx::query(
        r#"
        insert into order_proofs (proof_id, order_id, proof_type, file_ref, uploaded_by, uploaded_at)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(proof.proof_id)
    .bind(proof.order_id)
    .bind(proof.proof_type.as_str())
    .bind(&proof.file_ref)
    .bind(proof.uploaded_by)
    .bind(proof.uploaded_at)
    .execute(&mut *conn)
    .await
    .context("insert_proof failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub async fn insert_user(conn: &mut PgConnection, user: &UserRef) -> Result<()> {
    sqlx::query(
        r#"
        insert into app_users (user_id, role, display_name, active)
        values ($1, $2, $3, $4)
        on conflict (user_id) do update
          set role = excluded.role,
              display_name = excluded.display_name,
              active = excluded.active
        "#,
    )
    .bind(user.user_id)
    .bind(user.role.as_str())
    .bind(&user.display_name)
    .bind(user.active)
    .execute(&mut *conn)
    .await
    .context("insert_user failed")?;
    Ok(())
}

pub async fn fetch_user(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<UserRef>> {
    let row = sqlx::query(
        "select user_id, role, display_name, active from app_users where user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await
    .context("fetch_user failed")?;

    match row {
        Some(row) => Ok(Some(UserRef {
            user_id: row.try_get("user_id")?,
            role: UserRole::parse(&row.try_get::<String, _>("role")?)?,
            display_name: row.try_get("display_name")?,
            active: row.try_get("active")?,
        })),
        None => Ok(None),
    }
}
