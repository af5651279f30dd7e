//! Postgres adapter for [`LifecycleStore`]: one sqlx transaction per unit of work.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pdk_schemas::{
    AssignmentSlot, Booking, Cancellation, DateRange, HistoryEntry, Order, OrderStatus, Pole,
    PoleStatus, ProofArtifact, ProofType, UserRef,
};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::LifecycleStore;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LifecycleStore for PgStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx> {
        self.pool.begin().await.context("begin transaction failed")
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        tx.commit().await.context("commit failed")
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<()> {
        tx.rollback().await.context("rollback failed")
    }

    async fn fetch_pole(&self, tx: &mut Self::Tx, pole_id: Uuid) -> Result<Option<Pole>> {
        pdk_db::fetch_pole(&mut **tx, pole_id).await
    }

    async fn lock_pole(&self, tx: &mut Self::Tx, pole_id: Uuid) -> Result<Option<Pole>> {
        pdk_db::lock_pole(&mut **tx, pole_id).await
    }

    async fn set_pole_status(
        &self,
        tx: &mut Self::Tx,
        pole_id: Uuid,
        status: PoleStatus,
    ) -> Result<()> {
        pdk_db::set_pole_status(&mut **tx, pole_id, status).await
    }

    async fn pole_bookings(&self, tx: &mut Self::Tx, pole_id: Uuid) -> Result<Vec<Booking>> {
        pdk_db::pole_bookings(&mut **tx, pole_id).await
    }

    async fn count_occupying_orders(
        &self,
        tx: &mut Self::Tx,
        pole_id: Uuid,
        exclude: Option<Uuid>,
    ) -> Result<i64> {
        pdk_db::count_occupying_orders(&mut **tx, pole_id, exclude).await
    }

    async fn insert_order(&self, tx: &mut Self::Tx, order: &Order) -> Result<()> {
        pdk_db::insert_order(&mut **tx, order).await
    }

    async fn fetch_order(
        &self,
        tx: &mut Self::Tx,
        order_id: Uuid,
        lock: bool,
    ) -> Result<Option<Order>> {
        pdk_db::fetch_order(&mut **tx, order_id, lock).await
    }

    async fn update_order_status(
        &self,
        tx: &mut Self::Tx,
        order_id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        pdk_db::update_order_status(&mut **tx, order_id, status, at).await
    }

    async fn update_order_schedule(
        &self,
        tx: &mut Self::Tx,
        order_id: Uuid,
        range: DateRange,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        pdk_db::update_order_schedule(&mut **tx, order_id, range, status, at).await
    }

    async fn set_assignee(
        &self,
        tx: &mut Self::Tx,
        order_id: Uuid,
        slot: AssignmentSlot,
        user_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        pdk_db::set_assignee(&mut **tx, order_id, slot, user_id, at).await
    }

    async fn mark_cancelled(
        &self,
        tx: &mut Self::Tx,
        order_id: Uuid,
        cancellation: &Cancellation,
    ) -> Result<()> {
        pdk_db::mark_cancelled(&mut **tx, order_id, cancellation).await
    }

    async fn due_for_activation(&self, tx: &mut Self::Tx, today: NaiveDate) -> Result<Vec<Order>> {
        pdk_db::due_for_activation(&mut **tx, today).await
    }

    async fn due_for_expiry(&self, tx: &mut Self::Tx, today: NaiveDate) -> Result<Vec<Order>> {
        pdk_db::due_for_expiry(&mut **tx, today).await
    }

    async fn append_history(&self, tx: &mut Self::Tx, entry: &HistoryEntry) -> Result<()> {
        pdk_db::append_history(&mut **tx, entry).await
    }

    async fn history(&self, tx: &mut Self::Tx, order_id: Uuid) -> Result<Vec<HistoryEntry>> {
        pdk_db::history(&mut **tx, order_id).await
    }

    async fn has_proof(
        &self,
        tx: &mut Self::Tx,
        order_id: Uuid,
        proof_type: ProofType,
    ) -> Result<bool> {
        pdk_db::has_proof(&mut **tx, order_id, proof_type).await
    }

    async fn insert_proof(&self, tx: &mut Self::Tx, proof: &ProofArtifact) -> Result<()> {
        pdk_db::insert_proof(&mut **tx, proof).await
    }

    async fn fetch_user(&self, tx: &mut Self::Tx, user_id: Uuid) -> Result<Option<UserRef>> {
        pdk_db::fetch_user(&mut **tx, user_id).await
    }
}
