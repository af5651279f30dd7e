//! pdk-daemon entry point.
//!
//! Thin on purpose: tracing, config, the Postgres-backed engine, the daily
//! timer, middleware, then the HTTP server. Handlers live in `routes.rs`;
//! shared state lives in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{bail, Context};
use axum::http::{HeaderValue, Method};
use clap::Parser;
use pdk_config::{report_unused_keys, resolve_secrets, UnusedKeyPolicy};
use pdk_daemon::{routes, state};
use pdk_engine::{
    FanoutNotifier, LifecycleEngine, LogNotifier, NotificationDispatcher, Notifier, PgStore,
    SystemClock, WebhookNotifier,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "pdk-daemon")]
#[command(about = "PoleDesk order lifecycle service", long_about = None)]
struct Args {
    /// Layered config paths in merge order (base -> overrides). Falls back
    /// to PDK_CONFIG.
    #[arg(long = "config", value_delimiter = ',')]
    config: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience).
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();
    let args = Args::parse();

    let loaded = pdk_config::load_effective(&args.config)?;
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for ptr in &report.unused_leaf_pointers {
        warn!(key = %ptr, "unused config key");
    }
    let cfg = loaded.app_config()?;
    let secrets = resolve_secrets(&cfg)?;
    info!(config_hash = %loaded.config_hash, "config loaded");

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
    let db = pdk_db::status(&pool).await?;
    if !db.has_orders_table {
        bail!("database schema missing; run `pdk db migrate` first");
    }

    let tz = cfg.scheduler.tz()?;
    let bus = state::new_bus();

    let mut fanout = FanoutNotifier::new(vec![
        Arc::new(LogNotifier) as Arc<dyn Notifier>,
        Arc::new(state::BusNotifier::new(bus.clone())),
    ]);
    if let Some(url) = secrets.webhook_url.clone() {
        fanout.push(Arc::new(WebhookNotifier::new(
            url,
            cfg.notifications.timeout(),
        )?));
    }

    let engine = Arc::new(LifecycleEngine::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(SystemClock::new(tz)),
        NotificationDispatcher::new(Arc::new(fanout)),
    ));
    let shared = Arc::new(state::AppState::new(bus.clone(), engine));

    if cfg.scheduler.enabled {
        let run_at = cfg.scheduler.run_at_time()?;
        info!(run_at = %run_at, timezone = %tz, "daily scheduler enabled");
        Arc::clone(&shared.scheduler).spawn_daily(run_at, tz);
    } else {
        warn!("daily scheduler disabled by config");
    }

    state::spawn_heartbeat(bus, Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr: SocketAddr = cfg
        .daemon
        .bind_addr
        .parse()
        .with_context(|| format!("invalid daemon.bind_addr {:?}", cfg.daemon.bind_addr))?;
    info!("pdk-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
