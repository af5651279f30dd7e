//! Request and response types for all pdk-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use chrono::NaiveDate;
use pdk_schemas::{HistoryEntry, Order};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine code, e.g. "POLE_CONFLICT".
    pub error: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrdersRequest {
    pub pole_ids: Vec<Uuid>,
    pub account_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub price_micros: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub order_id: Uuid,
    pub entries: Vec<HistoryEntry>,
}

/// Status strings use the stored form, e.g. "AWAITING_MOUNT".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofRequest {
    /// "PROOF_MOUNT" | "PROOF_DISMOUNT"
    pub proof_type: String,
    pub file_ref: String,
}

// ---------------------------------------------------------------------------
// /v1/poles/:id/availability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub exclude: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub pole_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub available: bool,
}

// ---------------------------------------------------------------------------
// /v1/scheduler/run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerRunResponse {
    pub run_date: NaiveDate,
    pub activated: Vec<Uuid>,
    pub expired: Vec<Uuid>,
}
