//! Axum router and all HTTP handlers for pdk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers only translate HTTP to engine calls: every
//! rule lives in the engine.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use pdk_engine::{CreateOrders, LifecycleStore, RunOutcome};
use pdk_schemas::{Actor, OrderStatus, ProofType, UserRole};
use pdk_workflow::authz::{self, ADMIN_ONLY};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;
use uuid::Uuid;

use crate::{
    api_types::{
        AssignRequest, AvailabilityQuery, AvailabilityResponse, CancelRequest,
        CreateOrdersRequest, HealthResponse, HistoryResponse, OrdersResponse, ProofRequest,
        RollbackRequest, ScheduleRequest, SchedulerRunResponse, TransitionRequest,
    },
    error::ApiError,
    state::{AppState, BusMsg},
};

pub const HEADER_ACTOR_ID: &str = "x-actor-id";
pub const HEADER_ACTOR_ROLE: &str = "x-actor-role";

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router<S: LifecycleStore>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/v1/health", get(health::<S>))
        .route("/v1/stream", get(stream::<S>))
        .route("/v1/orders", post(create_orders::<S>))
        .route("/v1/orders/:id", get(get_order::<S>))
        .route("/v1/orders/:id/history", get(order_history::<S>))
        .route("/v1/orders/:id/status", post(transition_status::<S>))
        .route("/v1/orders/:id/printer", post(assign_printer::<S>))
        .route("/v1/orders/:id/field-team", post(assign_field_team::<S>))
        .route("/v1/orders/:id/cancel", post(cancel_order::<S>))
        .route("/v1/orders/:id/rollback", post(rollback_status::<S>))
        .route("/v1/orders/:id/schedule", post(reschedule_order::<S>))
        .route("/v1/orders/:id/proofs", post(record_proof::<S>))
        .route("/v1/poles/:id/availability", get(check_availability::<S>))
        .route("/v1/scheduler/run", post(scheduler_run::<S>))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Actor resolution
// ---------------------------------------------------------------------------

/// Acting identity from `x-actor-id` + `x-actor-role`. The system role can
/// never be claimed over HTTP.
pub fn actor_from_headers(headers: &HeaderMap) -> ApiResult<Actor> {
    let id = headers
        .get(HEADER_ACTOR_ID)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthenticated("missing x-actor-id header"))?;
    let id = Uuid::parse_str(id.trim())
        .map_err(|_| ApiError::unauthenticated("x-actor-id is not a uuid"))?;

    let role = headers
        .get(HEADER_ACTOR_ROLE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthenticated("missing x-actor-role header"))?;
    let role = UserRole::parse(role).map_err(|_| {
        ApiError::unauthenticated("x-actor-role must be one of admin|operator|printer|field")
    })?;

    Ok(Actor::user(id, role))
}

fn parse_status(s: &str) -> ApiResult<OrderStatus> {
    OrderStatus::parse(s.trim()).map_err(|e| ApiError::bad_request(e.to_string()))
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health<S: LifecycleStore>(
    State(st): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub(crate) async fn create_orders<S: LifecycleStore>(
    State(st): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrdersRequest>,
) -> ApiResult<(StatusCode, Json<OrdersResponse>)> {
    let actor = actor_from_headers(&headers)?;
    let orders = st
        .engine
        .create_orders(
            CreateOrders {
                pole_ids: req.pole_ids,
                account_id: req.account_id,
                start: req.start,
                end: req.end,
                price_micros: req.price_micros,
            },
            &actor,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(OrdersResponse { orders })))
}

pub(crate) async fn get_order<S: LifecycleStore>(
    State(st): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Response> {
    actor_from_headers(&headers)?;
    let order = st.engine.get_order(id).await?;
    Ok(Json(order).into_response())
}

pub(crate) async fn order_history<S: LifecycleStore>(
    State(st): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<HistoryResponse>> {
    actor_from_headers(&headers)?;
    let entries = st.engine.order_history(id).await?;
    Ok(Json(HistoryResponse {
        order_id: id,
        entries,
    }))
}

pub(crate) async fn transition_status<S: LifecycleStore>(
    State(st): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<TransitionRequest>,
) -> ApiResult<Response> {
    let actor = actor_from_headers(&headers)?;
    let requested = parse_status(&req.status)?;
    let order = st
        .engine
        .transition_status(id, requested, &actor, req.note)
        .await?;
    Ok(Json(order).into_response())
}

pub(crate) async fn assign_printer<S: LifecycleStore>(
    State(st): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Response> {
    let actor = actor_from_headers(&headers)?;
    let order = st.engine.assign_printer(id, req.user_id, &actor).await?;
    Ok(Json(order).into_response())
}

pub(crate) async fn assign_field_team<S: LifecycleStore>(
    State(st): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Response> {
    let actor = actor_from_headers(&headers)?;
    let order = st.engine.assign_field_team(id, req.user_id, &actor).await?;
    Ok(Json(order).into_response())
}

pub(crate) async fn cancel_order<S: LifecycleStore>(
    State(st): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> ApiResult<Response> {
    let actor = actor_from_headers(&headers)?;
    let order = st.engine.cancel_order(id, &req.reason, &actor).await?;
    Ok(Json(order).into_response())
}

pub(crate) async fn rollback_status<S: LifecycleStore>(
    State(st): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<RollbackRequest>,
) -> ApiResult<Response> {
    let actor = actor_from_headers(&headers)?;
    let target = parse_status(&req.target)?;
    let order = st
        .engine
        .rollback_status(id, target, &actor, &req.reason)
        .await?;
    Ok(Json(order).into_response())
}

pub(crate) async fn reschedule_order<S: LifecycleStore>(
    State(st): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<ScheduleRequest>,
) -> ApiResult<Response> {
    let actor = actor_from_headers(&headers)?;
    let order = st
        .engine
        .reschedule_order(id, req.start, req.end, &actor)
        .await?;
    Ok(Json(order).into_response())
}

pub(crate) async fn record_proof<S: LifecycleStore>(
    State(st): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<ProofRequest>,
) -> ApiResult<Response> {
    let actor = actor_from_headers(&headers)?;
    let proof_type =
        ProofType::parse(req.proof_type.trim()).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let proof = st
        .engine
        .record_proof(id, proof_type, &req.file_ref, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(proof)).into_response())
}

// ---------------------------------------------------------------------------
// GET /v1/poles/:id/availability
// ---------------------------------------------------------------------------

pub(crate) async fn check_availability<S: LifecycleStore>(
    State(st): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(pole_id): Path<Uuid>,
    Query(q): Query<AvailabilityQuery>,
) -> ApiResult<Json<AvailabilityResponse>> {
    actor_from_headers(&headers)?;
    let available = st
        .engine
        .check_availability(pole_id, q.start, q.end, q.exclude)
        .await?;
    Ok(Json(AvailabilityResponse {
        pole_id,
        start: q.start,
        end: q.end,
        available,
    }))
}

// ---------------------------------------------------------------------------
// POST /v1/scheduler/run
// ---------------------------------------------------------------------------

/// On-demand daily pass. Returns 409 while another pass is running.
pub(crate) async fn scheduler_run<S: LifecycleStore>(
    State(st): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let actor = actor_from_headers(&headers)?;
    authz::require_role(&actor, ADMIN_ONLY, "trigger the daily run")?;

    match st.scheduler.run_once().await? {
        RunOutcome::Completed(report) => {
            info!(run_date = %report.run_date, "scheduler/run");
            let _ = st.bus.send(BusMsg::LogLine {
                level: "INFO".to_string(),
                msg: format!(
                    "daily run {}: {} activated, {} expired",
                    report.run_date,
                    report.activated.len(),
                    report.expired.len()
                ),
            });
            Ok(Json(SchedulerRunResponse {
                run_date: report.run_date,
                activated: report.activated,
                expired: report.expired,
            })
            .into_response())
        }
        RunOutcome::Skipped => Err(ApiError::new(
            StatusCode::CONFLICT,
            "SCHEDULER_BUSY",
            "a daily run is already in progress",
        )),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream<S: LifecycleStore>(State(st): State<Arc<AppState<S>>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Notification(_) => "notification",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
