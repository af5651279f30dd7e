//! In-memory [`LifecycleStore`].
//!
//! A `MemoryTx` holds the store-wide lock for its whole life and works on a
//! staged copy of the state. `commit` swaps the copy in; `rollback` or drop
//! throws it away. Every unit of work is therefore fully serialized, which is
//! stricter than row locks but gives the same observable guarantees.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pdk_engine::LifecycleStore;
use pdk_schemas::{
    AssignmentSlot, Booking, Cancellation, DateRange, HistoryEntry, Order, OrderStatus, Pole,
    PoleStatus, ProofArtifact, ProofType, UserRef,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub poles: BTreeMap<Uuid, Pole>,
    pub orders: BTreeMap<Uuid, Order>,
    pub history: Vec<HistoryEntry>,
    pub proofs: Vec<ProofArtifact>,
    pub users: BTreeMap<Uuid, UserRef>,
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    /// One-shot injected failures, keyed by store method name.
    faults: StdMutex<BTreeSet<&'static str>>,
    /// Every `lock_pole` call, in call order.
    pole_locks: StdMutex<Vec<Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` (a [`LifecycleStore`] method name) fail.
    pub fn fail_next(&self, op: &'static str) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op);
    }

    fn trip(&self, op: &'static str) -> Result<()> {
        let hit = self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(op);
        if hit {
            bail!("injected failure in {op}");
        }
        Ok(())
    }

    /// Drain the pole ids passed to `lock_pole` so far.
    pub fn take_pole_locks(&self) -> Vec<Uuid> {
        std::mem::take(&mut *self.pole_locks.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Committed state, waiting for any open unit of work to end.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    pub async fn seed_pole(&self, pole: Pole) {
        self.state.lock().await.poles.insert(pole.pole_id, pole);
    }

    pub async fn seed_user(&self, user: UserRef) {
        self.state.lock().await.users.insert(user.user_id, user);
    }

    /// Insert a committed order as-is, bypassing the engine.
    pub async fn seed_order(&self, order: Order) {
        self.state.lock().await.orders.insert(order.order_id, order);
    }

    pub async fn seed_proof(&self, proof: ProofArtifact) {
        self.state.lock().await.proofs.push(proof);
    }

    pub async fn pole_status(&self, pole_id: Uuid) -> Option<PoleStatus> {
        self.state.lock().await.poles.get(&pole_id).map(|p| p.status)
    }

    pub async fn order(&self, order_id: Uuid) -> Option<Order> {
        self.state.lock().await.orders.get(&order_id).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    pub async fn history_of(&self, order_id: Uuid) -> Vec<HistoryEntry> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect()
    }
}

fn live_pole(state: &MemoryState, pole_id: Uuid) -> Option<Pole> {
    state
        .poles
        .get(&pole_id)
        .filter(|p| p.deleted_at.is_none())
        .cloned()
}

fn order_mut(state: &mut MemoryState, order_id: Uuid) -> Result<&mut Order> {
    state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| anyhow!("order {order_id} not found"))
}

#[async_trait]
impl LifecycleStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        self.trip("begin")?;
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTx {
            guard,
            staged,
        })
    }

    async fn commit(&self, tx: MemoryTx) -> Result<()> {
        self.trip("commit")?;
        let MemoryTx { mut guard, staged } = tx;
        *guard = staged;
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<()> {
        drop(tx);
        Ok(())
    }

    async fn fetch_pole(&self, tx: &mut MemoryTx, pole_id: Uuid) -> Result<Option<Pole>> {
        self.trip("fetch_pole")?;
        Ok(live_pole(&tx.staged, pole_id))
    }

    async fn lock_pole(&self, tx: &mut MemoryTx, pole_id: Uuid) -> Result<Option<Pole>> {
        self.trip("lock_pole")?;
        self.pole_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pole_id);
        Ok(live_pole(&tx.staged, pole_id))
    }

    async fn set_pole_status(
        &self,
        tx: &mut MemoryTx,
        pole_id: Uuid,
        status: PoleStatus,
    ) -> Result<()> {
        self.trip("set_pole_status")?;
        let pole = tx
            .staged
            .poles
            .get_mut(&pole_id)
            .ok_or_else(|| anyhow!("pole {pole_id} not found"))?;
        pole.status = status;
        Ok(())
    }

    async fn pole_bookings(&self, tx: &mut MemoryTx, pole_id: Uuid) -> Result<Vec<Booking>> {
        self.trip("pole_bookings")?;
        Ok(tx
            .staged
            .orders
            .values()
            .filter(|o| o.pole_id == pole_id)
            .filter(|o| !matches!(o.status, OrderStatus::Completed | OrderStatus::Cancelled))
            .map(Booking::from)
            .collect())
    }

    async fn count_occupying_orders(
        &self,
        tx: &mut MemoryTx,
        pole_id: Uuid,
        exclude: Option<Uuid>,
    ) -> Result<i64> {
        self.trip("count_occupying_orders")?;
        let n = tx
            .staged
            .orders
            .values()
            .filter(|o| o.pole_id == pole_id && o.status.occupies_pole())
            .filter(|o| Some(o.order_id) != exclude)
            .count();
        Ok(n as i64)
    }

    async fn insert_order(&self, tx: &mut MemoryTx, order: &Order) -> Result<()> {
        self.trip("insert_order")?;
        if order.end_date <= order.start_date {
            bail!("orders_range_check violated");
        }
        if tx.staged.orders.contains_key(&order.order_id) {
            bail!("duplicate order id {}", order.order_id);
        }
        tx.staged.orders.insert(order.order_id, order.clone());
        Ok(())
    }

    async fn fetch_order(
        &self,
        tx: &mut MemoryTx,
        order_id: Uuid,
        _lock: bool,
    ) -> Result<Option<Order>> {
        self.trip("fetch_order")?;
        Ok(tx.staged.orders.get(&order_id).cloned())
    }

    async fn update_order_status(
        &self,
        tx: &mut MemoryTx,
        order_id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.trip("update_order_status")?;
        let o = order_mut(&mut tx.staged, order_id)?;
        o.status = status;
        o.updated_at = at;
        Ok(())
    }

    async fn update_order_schedule(
        &self,
        tx: &mut MemoryTx,
        order_id: Uuid,
        range: DateRange,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.trip("update_order_schedule")?;
        let o = order_mut(&mut tx.staged, order_id)?;
        o.start_date = range.start;
        o.end_date = range.end;
        o.status = status;
        o.updated_at = at;
        Ok(())
    }

    async fn set_assignee(
        &self,
        tx: &mut MemoryTx,
        order_id: Uuid,
        slot: AssignmentSlot,
        user_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.trip("set_assignee")?;
        let o = order_mut(&mut tx.staged, order_id)?;
        match slot {
            AssignmentSlot::Printer => o.printer_id = user_id,
            AssignmentSlot::FieldTeam => o.field_user_id = user_id,
        }
        o.updated_at = at;
        Ok(())
    }

    async fn mark_cancelled(
        &self,
        tx: &mut MemoryTx,
        order_id: Uuid,
        cancellation: &Cancellation,
    ) -> Result<()> {
        self.trip("mark_cancelled")?;
        let o = order_mut(&mut tx.staged, order_id)?;
        o.status = OrderStatus::Cancelled;
        o.cancellation = Some(cancellation.clone());
        o.updated_at = cancellation.cancelled_at;
        Ok(())
    }

    async fn due_for_activation(&self, tx: &mut MemoryTx, today: NaiveDate) -> Result<Vec<Order>> {
        self.trip("due_for_activation")?;
        Ok(tx
            .staged
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Scheduled && o.start_date <= today)
            .cloned()
            .collect())
    }

    async fn due_for_expiry(&self, tx: &mut MemoryTx, today: NaiveDate) -> Result<Vec<Order>> {
        self.trip("due_for_expiry")?;
        Ok(tx
            .staged
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Live && o.end_date < today)
            .cloned()
            .collect())
    }

    async fn append_history(&self, tx: &mut MemoryTx, entry: &HistoryEntry) -> Result<()> {
        self.trip("append_history")?;
        tx.staged.history.push(entry.clone());
        Ok(())
    }

    async fn history(&self, tx: &mut MemoryTx, order_id: Uuid) -> Result<Vec<HistoryEntry>> {
        self.trip("history")?;
        Ok(tx
            .staged
            .history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn has_proof(
        &self,
        tx: &mut MemoryTx,
        order_id: Uuid,
        proof_type: ProofType,
    ) -> Result<bool> {
        self.trip("has_proof")?;
        Ok(tx
            .staged
            .proofs
            .iter()
            .any(|p| p.order_id == order_id && p.proof_type == proof_type))
    }

    async fn insert_proof(&self, tx: &mut MemoryTx, proof: &ProofArtifact) -> Result<()> {
        self.trip("insert_proof")?;
        tx.staged.proofs.push(proof.clone());
        Ok(())
    }

    async fn fetch_user(&self, tx: &mut MemoryTx, user_id: Uuid) -> Result<Option<UserRef>> {
        self.trip("fetch_user")?;
        Ok(tx.staged.users.get(&user_id).cloned())
    }
}
