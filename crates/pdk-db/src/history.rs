//! `order_history`: append-only. A trigger rejects UPDATE and DELETE, and
//! this module only ever inserts and reads.

use anyhow::{anyhow, Context, Result};
use pdk_schemas::{Actor, HistoryEntry, HistoryEvent, Role, UserRole};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

pub async fn append_history(conn: &mut PgConnection, entry: &HistoryEntry) -> Result<()> {
    let details = serde_json::to_value(&entry.event).context("encode history event failed")?;
    sqlx::query(
        r#"
        insert into order_history (
          entry_id, order_id, kind, old_status, new_status, is_rollback,
          details, actor_id, actor_role, note, recorded_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11
        )
        "#,
    )
    .bind(entry.entry_id)
    .bind(entry.order_id)
    .bind(entry.event.kind())
    .bind(entry.event.old_status().map(|s| s.as_str()))
    .bind(entry.event.new_status().map(|s| s.as_str()))
    .bind(entry.event.is_rollback())
    .bind(details)
    .bind(entry.actor.user_id())
    .bind(entry.actor.role().as_str())
    .bind(&entry.note)
    .bind(entry.recorded_at)
    .execute(&mut *conn)
    .await
    .context("append_history failed")?;
    Ok(())
}

/// Full history of an order in insertion order.
pub async fn history(conn: &mut PgConnection, order_id: Uuid) -> Result<Vec<HistoryEntry>> {
    let rows = sqlx::query(
        r#"
        select entry_id, order_id, details, actor_id, actor_role, note, recorded_at
        from order_history
        where order_id = $1
        order by seq
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await
    .context("history failed")?;

    rows.iter()
        .map(|row| {
            let details: serde_json::Value = row.try_get("details")?;
            let event: HistoryEvent =
                serde_json::from_value(details).context("decode history event failed")?;
            let actor = decode_actor(row.try_get("actor_id")?, &row.try_get::<String, _>("actor_role")?)?;
            Ok(HistoryEntry {
                entry_id: row.try_get("entry_id")?,
                order_id: row.try_get("order_id")?,
                actor,
                note: row.try_get("note")?,
                recorded_at: row.try_get("recorded_at")?,
                event,
            })
        })
        .collect()
}

fn decode_actor(actor_id: Option<Uuid>, role: &str) -> Result<Actor> {
    match Role::from_stored(role)? {
        Role::System => Ok(Actor::system()),
        _ => {
            let id = actor_id.ok_or_else(|| anyhow!("history row for role {role} has no actor_id"))?;
            Ok(Actor::user(id, UserRole::parse(role)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_actor_maps_system_and_users() {
        assert_eq!(decode_actor(None, "system").unwrap(), Actor::system());
        let id = Uuid::new_v4();
        assert_eq!(
            decode_actor(Some(id), "printer").unwrap(),
            Actor::user(id, UserRole::Printer)
        );
        assert!(decode_actor(None, "admin").is_err());
        assert!(decode_actor(Some(id), "root").is_err());
    }
}
