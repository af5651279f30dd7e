use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pdk_config::UnusedKeyPolicy;
use pdk_engine::{
    DailyScheduler, LifecycleEngine, LogNotifier, NotificationDispatcher, PgStore, RunOutcome,
    SystemClock,
};
use pdk_schemas::{Actor, HistoryEntry, HistoryEvent, Order};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pdk")]
#[command(about = "PoleDesk CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> overrides)
        #[arg(required = true)]
        paths: Vec<String>,

        /// Fail instead of warning when a key is not consumed by any component.
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Daily scheduler commands
    Scheduler {
        #[command(subcommand)]
        cmd: SchedulerCmd,
    },

    /// Read-only order queries
    Order {
        #[command(subcommand)]
        cmd: OrderCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum SchedulerCmd {
    /// Run one activation/expiry pass for today and print the report.
    RunOnce {
        /// Layered config paths in merge order. Falls back to PDK_CONFIG.
        #[arg(long = "config", value_delimiter = ',')]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum OrderCmd {
    /// Print the order row
    Show {
        #[arg(long)]
        id: String,
    },

    /// Print the audit trail, oldest first
    History {
        #[arg(long)]
        id: String,
    },

    /// Check whether a pole is free for [start, end]
    Availability {
        #[arg(long)]
        pole: String,

        /// YYYY-MM-DD
        #[arg(long)]
        start: String,

        /// YYYY-MM-DD
        #[arg(long)]
        end: String,

        /// Order whose own booking is ignored (rescheduling)
        #[arg(long)]
        exclude: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = pdk_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = pdk_db::status(&pool).await?;
                    println!("db_ok={} has_orders_table={}", s.ok, s.has_orders_table);
                }
                DbCmd::Migrate => {
                    pdk_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths, strict } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = pdk_config::load_layered_yaml(&path_refs)?;
            let policy = if strict {
                UnusedKeyPolicy::Fail
            } else {
                UnusedKeyPolicy::Warn
            };
            let report = pdk_config::report_unused_keys(&loaded.config_json, policy)?;
            for ptr in &report.unused_leaf_pointers {
                eprintln!("unused_key={ptr}");
            }
            loaded.app_config()?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Scheduler { cmd } => match cmd {
            SchedulerCmd::RunOnce { config_paths } => {
                let loaded = pdk_config::load_effective(&config_paths)?;
                let cfg = loaded.app_config()?;
                let tz = cfg.scheduler.tz()?;

                let url = std::env::var(pdk_db::ENV_DB_URL)
                    .with_context(|| format!("missing env var {}", pdk_db::ENV_DB_URL))?;
                let pool = pdk_db::connect(
                    &url,
                    pdk_db::PoolSettings {
                        max_connections: cfg.database.max_connections,
                        acquire_timeout: cfg.database.acquire_timeout(),
                        statement_timeout: cfg.database.statement_timeout(),
                    },
                )
                .await?;

                let engine = Arc::new(LifecycleEngine::new(
                    Arc::new(PgStore::new(pool)),
                    Arc::new(SystemClock::new(tz)),
                    NotificationDispatcher::new(Arc::new(LogNotifier)),
                ));
                let scheduler = DailyScheduler::new(engine);

                match scheduler.run_once().await? {
                    RunOutcome::Completed(report) => {
                        println!("run_date={}", report.run_date);
                        println!("activated={}", report.activated.len());
                        println!("expired={}", report.expired.len());
                        println!("activated_ids={}", join_ids(&report.activated));
                        println!("expired_ids={}", join_ids(&report.expired));
                    }
                    RunOutcome::Skipped => println!("skipped=true"),
                }
            }
        },

        Commands::Order { cmd } => match cmd {
            OrderCmd::Show { id } => {
                let order_id = parse_uuid(&id, "id")?;
                let engine = read_engine().await?;
                print_order(&engine.get_order(order_id).await?);
            }
            OrderCmd::History { id } => {
                let order_id = parse_uuid(&id, "id")?;
                let engine = read_engine().await?;
                let entries = engine.order_history(order_id).await?;
                println!("order_id={} entries={}", order_id, entries.len());
                for e in &entries {
                    println!("{}", history_line(e));
                }
            }
            OrderCmd::Availability {
                pole,
                start,
                end,
                exclude,
            } => {
                let pole_id = parse_uuid(&pole, "pole")?;
                let start = parse_date(&start, "start")?;
                let end = parse_date(&end, "end")?;
                let exclude = exclude
                    .as_deref()
                    .map(|s| parse_uuid(s, "exclude"))
                    .transpose()?;
                let engine = read_engine().await?;
                let available = engine
                    .check_availability(pole_id, start, end, exclude)
                    .await?;
                println!(
                    "pole_id={} start={} end={} available={}",
                    pole_id, start, end, available
                );
            }
        },
    }

    Ok(())
}

fn init_tracing() {
    // Logs go to stderr; stdout carries key=value output only.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}

/// Engine for read-only queries. Nothing it runs emits notifications.
async fn read_engine() -> Result<LifecycleEngine<PgStore>> {
    let pool = pdk_db::connect_from_env().await?;
    Ok(LifecycleEngine::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(SystemClock::utc()),
        NotificationDispatcher::new(Arc::new(LogNotifier)),
    ))
}

fn parse_uuid(s: &str, flag: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).with_context(|| format!("invalid --{flag} uuid"))
}

fn parse_date(s: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid --{flag} date (expected YYYY-MM-DD)"))
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn opt_id(id: &Option<Uuid>) -> String {
    id.map(|u| u.to_string()).unwrap_or_else(|| "null".to_string())
}

fn actor_label(actor: &Actor) -> String {
    match actor {
        Actor::User { id, role } => format!("{}:{}", role, id),
        Actor::System => "system".to_string(),
    }
}

fn print_order(o: &Order) {
    println!("order_id={}", o.order_id);
    println!("pole_id={}", o.pole_id);
    println!("account_id={}", o.account_id);
    println!("status={}", o.status.as_str());
    println!("start_date={}", o.start_date);
    println!("end_date={}", o.end_date);
    println!("printer_id={}", opt_id(&o.printer_id));
    println!("field_user_id={}", opt_id(&o.field_user_id));
    println!("price_micros={}", o.price_micros);
    match &o.cancellation {
        Some(c) => {
            println!("cancelled_at_utc={}", c.cancelled_at.to_rfc3339());
            println!("cancelled_by={}", opt_id(&c.cancelled_by));
            println!("cancel_reason={}", c.reason);
        }
        None => println!("cancelled_at_utc=null"),
    }
    println!("created_at_utc={}", o.created_at.to_rfc3339());
    println!("updated_at_utc={}", o.updated_at.to_rfc3339());
}

fn history_line(e: &HistoryEntry) -> String {
    let detail = match &e.event {
        HistoryEvent::Created { status } => format!("status={}", status.as_str()),
        HistoryEvent::StatusChange { from, to, rollback } => format!(
            "from={} to={} rollback={}",
            from.as_str(),
            to.as_str(),
            rollback
        ),
        HistoryEvent::AssignmentChange {
            slot,
            previous,
            next,
        } => format!(
            "slot={} previous={} next={}",
            slot.as_str(),
            opt_id(previous),
            opt_id(next)
        ),
        HistoryEvent::ScheduleChange { previous, next } => format!(
            "previous={}..{} next={}..{}",
            previous.start, previous.end, next.start, next.end
        ),
    };
    format!(
        "recorded_at_utc={} kind={} {} actor={} note={}",
        e.recorded_at.to_rfc3339(),
        e.event.kind(),
        detail,
        actor_label(&e.actor),
        e.note.as_deref().unwrap_or("")
    )
}
