use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pdk_schemas::{
    AssignmentSlot, Booking, Cancellation, DateRange, HistoryEntry, Order, OrderStatus, Pole,
    PoleStatus, ProofArtifact, ProofType, UserRef,
};
use uuid::Uuid;

/// Persistence seam of the lifecycle engine.
///
/// ## Unit of work
///
/// Every per-order operation takes `&mut Self::Tx`, one open transaction:
///
/// 1. `begin()` opens it
/// 2. operations run against `&mut tx`
/// 3. `commit(tx)` makes every write visible at once, or `rollback(tx)`
///    discards them
///
/// A `Tx` dropped without `commit` MUST NOT become visible.
///
/// ## Locking
///
/// `lock_pole` and `fetch_order(.., lock = true)` hold the row until the
/// unit of work ends. `due_for_activation` / `due_for_expiry` lock every row
/// they return.
#[async_trait]
pub trait LifecycleStore: Send + Sync + 'static {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> Result<()>;
    async fn rollback(&self, tx: Self::Tx) -> Result<()>;

    // -- poles --------------------------------------------------------------

    /// Live pole without a lock. Soft-deleted poles read as `None`.
    async fn fetch_pole(&self, tx: &mut Self::Tx, pole_id: Uuid) -> Result<Option<Pole>>;
    /// Live pole, row-locked. Soft-deleted poles read as `None`.
    async fn lock_pole(&self, tx: &mut Self::Tx, pole_id: Uuid) -> Result<Option<Pole>>;
    async fn set_pole_status(
        &self,
        tx: &mut Self::Tx,
        pole_id: Uuid,
        status: PoleStatus,
    ) -> Result<()>;
    /// Non-terminal bookings on the pole.
    async fn pole_bookings(&self, tx: &mut Self::Tx, pole_id: Uuid) -> Result<Vec<Booking>>;
    async fn count_occupying_orders(
        &self,
        tx: &mut Self::Tx,
        pole_id: Uuid,
        exclude: Option<Uuid>,
    ) -> Result<i64>;

    // -- orders -------------------------------------------------------------

    async fn insert_order(&self, tx: &mut Self::Tx, order: &Order) -> Result<()>;
    async fn fetch_order(
        &self,
        tx: &mut Self::Tx,
        order_id: Uuid,
        lock: bool,
    ) -> Result<Option<Order>>;
    async fn update_order_status(
        &self,
        tx: &mut Self::Tx,
        order_id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;
    async fn update_order_schedule(
        &self,
        tx: &mut Self::Tx,
        order_id: Uuid,
        range: DateRange,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;
    async fn set_assignee(
        &self,
        tx: &mut Self::Tx,
        order_id: Uuid,
        slot: AssignmentSlot,
        user_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<()>;
    async fn mark_cancelled(
        &self,
        tx: &mut Self::Tx,
        order_id: Uuid,
        cancellation: &Cancellation,
    ) -> Result<()>;
    async fn due_for_activation(&self, tx: &mut Self::Tx, today: NaiveDate) -> Result<Vec<Order>>;
    async fn due_for_expiry(&self, tx: &mut Self::Tx, today: NaiveDate) -> Result<Vec<Order>>;

    // -- audit --------------------------------------------------------------

    async fn append_history(&self, tx: &mut Self::Tx, entry: &HistoryEntry) -> Result<()>;
    async fn history(&self, tx: &mut Self::Tx, order_id: Uuid) -> Result<Vec<HistoryEntry>>;

    // -- proofs / identity --------------------------------------------------

    async fn has_proof(
        &self,
        tx: &mut Self::Tx,
        order_id: Uuid,
        proof_type: ProofType,
    ) -> Result<bool>;
    async fn insert_proof(&self, tx: &mut Self::Tx, proof: &ProofArtifact) -> Result<()>;
    async fn fetch_user(&self, tx: &mut Self::Tx, user_id: Uuid) -> Result<Option<UserRef>>;
}
