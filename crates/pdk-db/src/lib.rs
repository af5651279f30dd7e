use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod history;
mod orders;

pub use history::{append_history, history};
pub use orders::{
    count_occupying_orders, due_for_activation, due_for_expiry, fetch_order, fetch_pole,
    fetch_user, has_proof, insert_order, insert_pole, insert_proof, insert_user, lock_pole,
    mark_cancelled, pole_bookings, set_assignee, set_pole_status, update_order_schedule,
    update_order_status,
};

pub const ENV_DB_URL: &str = "PDK_DATABASE_URL";

/// Pool bounds. Every statement runs under `statement_timeout`, so no
/// allocation check or transition can block indefinitely.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub statement_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_millis(5_000),
            statement_timeout: Duration::from_millis(5_000),
        }
    }
}

/// Connect to Postgres using PDK_DATABASE_URL and default pool settings.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, PoolSettings::default()).await
}

pub async fn connect(url: &str, settings: PoolSettings) -> Result<PgPool> {
    let timeout_ms = settings.statement_timeout.as_millis();
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                let sql = format!("set statement_timeout = {timeout_ms}");
                sqlx::query(&sql).execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_orders_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}
