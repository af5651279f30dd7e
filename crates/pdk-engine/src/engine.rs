//! Order lifecycle engine.
//!
//! Every mutating operation follows the same shape:
//!
//! ```text
//! begin -> load + lock -> validate -> write order, audit, pole -> commit
//!                                                                 |
//!                                          dispatch notifications <'
//! ```
//!
//! A refusal or fault anywhere before commit rolls the whole unit back.
//! Notifications are built alongside the writes but only dispatched once
//! the commit succeeded.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use pdk_schemas::{
    Actor, AssignmentSlot, Cancellation, DateRange, HistoryEntry, HistoryEvent, Notification,
    NotificationKind, Order, OrderStatus, PoleStatus, ProofArtifact, ProofType, Recipient,
    UserRole,
};
use pdk_workflow::authz::{self, ADMIN_ONLY, ORDER_MANAGERS};
use pdk_workflow::{
    check_evidence, ensure_available, is_available, required_evidence, rollback_pole_effect,
    validate_range, validate_rollback, validate_transition, PoleEffect, Readiness, Requirement,
    WorkflowError,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{Clock, EngineError, EngineResult, LifecycleStore, NotificationDispatcher};

/// Input of [`LifecycleEngine::create_orders`]: one order per pole, all
/// sharing account, range and price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrders {
    pub pole_ids: Vec<Uuid>,
    pub account_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub price_micros: i64,
}

pub struct LifecycleEngine<S: LifecycleStore> {
    pub(crate) store: Arc<S>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) dispatcher: NotificationDispatcher,
}

impl<S: LifecycleStore> LifecycleEngine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, dispatcher: NotificationDispatcher) -> Self {
        Self {
            store,
            clock,
            dispatcher,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // -----------------------------------------------------------------------
    // Unit-of-work plumbing
    // -----------------------------------------------------------------------

    /// Commit on `Ok`, roll back on `Err`. A failed rollback is logged; the
    /// original error is what the caller sees.
    pub(crate) async fn finish<T>(
        &self,
        tx: S::Tx,
        op: &'static str,
        result: EngineResult<T>,
    ) -> EngineResult<T> {
        match result {
            Ok(value) => {
                self.store.commit(tx).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rb) = self.store.rollback(tx).await {
                    warn!(op, error = %format!("{rb:#}"), "rollback failed");
                }
                warn!(op, code = err.code(), error = %err, "unit of work rolled back");
                Err(err)
            }
        }
    }

    async fn locked_order(&self, tx: &mut S::Tx, order_id: Uuid) -> EngineResult<Order> {
        self.store
            .fetch_order(tx, order_id, true)
            .await?
            .ok_or_else(|| WorkflowError::not_found("order", order_id).into())
    }

    /// Mark the pole OCCUPIED if it is AVAILABLE. Externally managed states
    /// are left alone, and a soft-deleted pole is invisible.
    pub(crate) async fn occupy_pole(&self, tx: &mut S::Tx, pole_id: Uuid) -> EngineResult<()> {
        if let Some(pole) = self.store.lock_pole(tx, pole_id).await? {
            if pole.status == PoleStatus::Available {
                self.store
                    .set_pole_status(tx, pole_id, PoleStatus::Occupied)
                    .await?;
            }
        }
        Ok(())
    }

    /// Mark the pole AVAILABLE unless another order still occupies it.
    async fn release_pole(
        &self,
        tx: &mut S::Tx,
        pole_id: Uuid,
        leaving: Uuid,
    ) -> EngineResult<()> {
        let Some(pole) = self.store.lock_pole(tx, pole_id).await? else {
            return Ok(());
        };
        if pole.status != PoleStatus::Occupied {
            return Ok(());
        }
        let others = self
            .store
            .count_occupying_orders(tx, pole_id, Some(leaving))
            .await?;
        if others == 0 {
            self.store
                .set_pole_status(tx, pole_id, PoleStatus::Available)
                .await?;
        }
        Ok(())
    }

    /// Facts the evidence gate needs for `from -> to`. Only the required one
    /// is looked up.
    async fn readiness(
        &self,
        tx: &mut S::Tx,
        order: &Order,
        to: OrderStatus,
    ) -> EngineResult<Readiness> {
        let mut r = Readiness::default();
        match required_evidence(order.status, to) {
            Some(Requirement::AssignedPrinter) => r.printer_assigned = order.printer_id.is_some(),
            Some(Requirement::AssignedFieldUser) => {
                r.field_user_assigned = order.field_user_id.is_some()
            }
            Some(Requirement::MountProof) => {
                r.mount_proof = self
                    .store
                    .has_proof(tx, order.order_id, ProofType::ProofMount)
                    .await?
            }
            Some(Requirement::DismountProof) => {
                r.dismount_proof = self
                    .store
                    .has_proof(tx, order.order_id, ProofType::ProofDismount)
                    .await?
            }
            None => {}
        }
        Ok(r)
    }

    fn initial_status(&self, start: NaiveDate) -> OrderStatus {
        if start > self.clock.today() {
            OrderStatus::Scheduled
        } else {
            OrderStatus::Pending
        }
    }

    // -----------------------------------------------------------------------
    // CreateOrder
    // -----------------------------------------------------------------------

    /// Create one order per pole. Any conflict fails the whole batch.
    pub async fn create_orders(&self, req: CreateOrders, actor: &Actor) -> EngineResult<Vec<Order>> {
        authz::require_role(actor, ORDER_MANAGERS, "create orders")?;
        if req.pole_ids.is_empty() {
            return Err(WorkflowError::InvalidInput("at least one pole is required".into()).into());
        }
        if req.price_micros < 0 {
            return Err(WorkflowError::InvalidInput("price must not be negative".into()).into());
        }
        let range = DateRange::new(req.start, req.end);
        validate_range(&range, self.clock.today())?;

        let mut tx = self.store.begin().await?;
        let result = self.create_in_tx(&mut tx, &req, range, actor).await;
        let (orders, notes) = self.finish(tx, "create_orders", result).await?;

        for o in &orders {
            info!(order_id = %o.order_id, pole_id = %o.pole_id, status = %o.status, "order created");
        }
        self.dispatcher.dispatch(notes);
        Ok(orders)
    }

    async fn create_in_tx(
        &self,
        tx: &mut S::Tx,
        req: &CreateOrders,
        range: DateRange,
        actor: &Actor,
    ) -> EngineResult<(Vec<Order>, Vec<Notification>)> {
        let now = self.clock.now();
        let status = self.initial_status(range.start);
        let mut orders = Vec::with_capacity(req.pole_ids.len());
        let mut notes = Vec::with_capacity(req.pole_ids.len());

        // Every pole is locked before any check, in ascending id order.
        // The availability reads and inserts below run under these locks.
        let mut poles = BTreeMap::new();
        for pole_id in req.pole_ids.iter().copied().collect::<BTreeSet<Uuid>>() {
            let pole = self
                .store
                .lock_pole(tx, pole_id)
                .await?
                .ok_or_else(|| WorkflowError::not_found("pole", pole_id))?;
            poles.insert(pole_id, pole);
        }

        for &pole_id in &req.pole_ids {
            let pole = poles
                .get(&pole_id)
                .ok_or_else(|| WorkflowError::not_found("pole", pole_id))?;
            let bookings = self.store.pole_bookings(tx, pole_id).await?;
            ensure_available(pole_id, &bookings, &range, None)?;

            let order = Order {
                order_id: Uuid::new_v4(),
                pole_id,
                account_id: req.account_id,
                start_date: range.start,
                end_date: range.end,
                status,
                printer_id: None,
                field_user_id: None,
                price_micros: req.price_micros,
                cancellation: None,
                created_by: actor.user_id(),
                created_at: now,
                updated_at: now,
            };
            self.store.insert_order(tx, &order).await?;
            self.store
                .append_history(
                    tx,
                    &HistoryEntry::new(order.order_id, *actor, HistoryEvent::Created { status }, None, now),
                )
                .await?;

            if status.occupies_pole() && pole.status == PoleStatus::Available {
                self.store
                    .set_pole_status(tx, pole_id, PoleStatus::Occupied)
                    .await?;
            }

            notes.push(Notification::new(
                NotificationKind::OrderCreated,
                order.order_id,
                pole_id,
                vec![Recipient::Admins],
                format!(
                    "order created on pole {} for {} .. {} ({status})",
                    pole.code, range.start, range.end
                ),
                now,
            ));
            orders.push(order);
        }
        Ok((orders, notes))
    }

    // -----------------------------------------------------------------------
    // TransitionStatus
    // -----------------------------------------------------------------------

    pub async fn transition_status(
        &self,
        order_id: Uuid,
        requested: OrderStatus,
        actor: &Actor,
        note: Option<String>,
    ) -> EngineResult<Order> {
        let mut tx = self.store.begin().await?;
        let result = self
            .transition_in_tx(&mut tx, order_id, requested, actor, note)
            .await;
        let (order, from, notes) = self.finish(tx, "transition_status", result).await?;

        info!(
            order_id = %order.order_id,
            pole_id = %order.pole_id,
            from = %from,
            to = %order.status,
            actor_role = %actor.role(),
            "order status changed"
        );
        self.dispatcher.dispatch(notes);
        Ok(order)
    }

    async fn transition_in_tx(
        &self,
        tx: &mut S::Tx,
        order_id: Uuid,
        requested: OrderStatus,
        actor: &Actor,
        note: Option<String>,
    ) -> EngineResult<(Order, OrderStatus, Vec<Notification>)> {
        let mut order = self.locked_order(tx, order_id).await?;
        let from = order.status;

        authz::check_assignment_scope(actor, &order)?;
        validate_transition(from, requested, actor.role())?;
        let readiness = self.readiness(tx, &order, requested).await?;
        check_evidence(from, requested, &readiness)?;

        let now = self.clock.now();
        self.store
            .update_order_status(tx, order_id, requested, now)
            .await?;
        self.store
            .append_history(
                tx,
                &HistoryEntry::new(
                    order_id,
                    *actor,
                    HistoryEvent::StatusChange {
                        from,
                        to: requested,
                        rollback: false,
                    },
                    note,
                    now,
                ),
            )
            .await?;

        if requested.is_terminal() {
            self.release_pole(tx, order.pole_id, order_id).await?;
        } else if requested.occupies_pole() {
            self.occupy_pole(tx, order.pole_id).await?;
        }

        order.status = requested;
        order.updated_at = now;

        let mut recipients = vec![Recipient::Admins];
        let next_hand = match requested {
            OrderStatus::Printing => order.printer_id,
            OrderStatus::AwaitingMount | OrderStatus::Expired => order.field_user_id,
            _ => None,
        };
        recipients.extend(next_hand.map(Recipient::User));
        let notes = vec![Notification::new(
            NotificationKind::StatusChanged,
            order_id,
            order.pole_id,
            recipients,
            format!("order moved {from} -> {requested}"),
            now,
        )];
        Ok((order, from, notes))
    }

    // -----------------------------------------------------------------------
    // AssignPrinter / AssignFieldTeam
    // -----------------------------------------------------------------------

    pub async fn assign_printer(
        &self,
        order_id: Uuid,
        printer_id: Uuid,
        actor: &Actor,
    ) -> EngineResult<Order> {
        self.assign(order_id, AssignmentSlot::Printer, printer_id, actor)
            .await
    }

    pub async fn assign_field_team(
        &self,
        order_id: Uuid,
        field_user_id: Uuid,
        actor: &Actor,
    ) -> EngineResult<Order> {
        self.assign(order_id, AssignmentSlot::FieldTeam, field_user_id, actor)
            .await
    }

    /// Set the assignee of `slot`. Re-assigning the current assignee is a
    /// no-op: no audit entry, no notification.
    pub async fn assign(
        &self,
        order_id: Uuid,
        slot: AssignmentSlot,
        user_id: Uuid,
        actor: &Actor,
    ) -> EngineResult<Order> {
        authz::require_role(actor, ORDER_MANAGERS, "assign orders")?;

        let mut tx = self.store.begin().await?;
        let result = self.assign_in_tx(&mut tx, order_id, slot, user_id, actor).await;
        let (order, notes) = self.finish(tx, "assign", result).await?;

        if !notes.is_empty() {
            info!(order_id = %order_id, slot = slot.as_str(), assignee = %user_id, "order assigned");
        }
        self.dispatcher.dispatch(notes);
        Ok(order)
    }

    async fn assign_in_tx(
        &self,
        tx: &mut S::Tx,
        order_id: Uuid,
        slot: AssignmentSlot,
        user_id: Uuid,
        actor: &Actor,
    ) -> EngineResult<(Order, Vec<Notification>)> {
        // Row lock: a concurrent assignment waits here and then reads our write.
        let mut order = self.locked_order(tx, order_id).await?;
        if order.status.is_terminal() {
            return Err(WorkflowError::terminal(order.status).into());
        }

        let previous = order.assignee(slot);
        if previous == Some(user_id) {
            return Ok((order, Vec::new()));
        }

        let expected = match slot {
            AssignmentSlot::Printer => UserRole::Printer,
            AssignmentSlot::FieldTeam => UserRole::Field,
        };
        let user = self
            .store
            .fetch_user(tx, user_id)
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| WorkflowError::not_found("user", user_id))?;
        if user.role != expected {
            return Err(WorkflowError::InvalidAssignee { user_id, expected }.into());
        }

        let now = self.clock.now();
        self.store
            .set_assignee(tx, order_id, slot, Some(user_id), now)
            .await?;
        self.store
            .append_history(
                tx,
                &HistoryEntry::new(
                    order_id,
                    *actor,
                    HistoryEvent::AssignmentChange {
                        slot,
                        previous,
                        next: Some(user_id),
                    },
                    None,
                    now,
                ),
            )
            .await?;

        match slot {
            AssignmentSlot::Printer => order.printer_id = Some(user_id),
            AssignmentSlot::FieldTeam => order.field_user_id = Some(user_id),
        }
        order.updated_at = now;

        let kind = match slot {
            AssignmentSlot::Printer => NotificationKind::PrinterAssigned,
            AssignmentSlot::FieldTeam => NotificationKind::FieldTeamAssigned,
        };
        let notes = vec![Notification::new(
            kind,
            order_id,
            order.pole_id,
            vec![Recipient::User(user_id)],
            format!("{} assigned order {order_id}", user.display_name),
            now,
        )];
        Ok((order, notes))
    }

    // -----------------------------------------------------------------------
    // CancelOrder
    // -----------------------------------------------------------------------

    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        reason: &str,
        actor: &Actor,
    ) -> EngineResult<Order> {
        authz::require_role(actor, ADMIN_ONLY, "cancel orders")?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::InvalidInput("a cancellation reason is required".into()).into());
        }

        let mut tx = self.store.begin().await?;
        let result = self.cancel_in_tx(&mut tx, order_id, reason, actor).await;
        let (order, from, notes) = self.finish(tx, "cancel_order", result).await?;

        info!(order_id = %order_id, pole_id = %order.pole_id, from = %from, "order cancelled");
        self.dispatcher.dispatch(notes);
        Ok(order)
    }

    async fn cancel_in_tx(
        &self,
        tx: &mut S::Tx,
        order_id: Uuid,
        reason: &str,
        actor: &Actor,
    ) -> EngineResult<(Order, OrderStatus, Vec<Notification>)> {
        let mut order = self.locked_order(tx, order_id).await?;
        let from = order.status;
        if from.is_terminal() {
            return Err(WorkflowError::terminal(from).into());
        }

        let now = self.clock.now();
        let cancellation = Cancellation {
            reason: reason.to_string(),
            cancelled_at: now,
            cancelled_by: actor.user_id(),
        };
        self.store.mark_cancelled(tx, order_id, &cancellation).await?;
        self.store
            .append_history(
                tx,
                &HistoryEntry::new(
                    order_id,
                    *actor,
                    HistoryEvent::StatusChange {
                        from,
                        to: OrderStatus::Cancelled,
                        rollback: false,
                    },
                    Some(reason.to_string()),
                    now,
                ),
            )
            .await?;
        self.release_pole(tx, order.pole_id, order_id).await?;

        order.status = OrderStatus::Cancelled;
        order.cancellation = Some(cancellation);
        order.updated_at = now;

        let mut recipients: Vec<Recipient> = [order.printer_id, order.field_user_id]
            .into_iter()
            .flatten()
            .map(Recipient::User)
            .collect();
        recipients.push(Recipient::Admins);
        let notes = vec![Notification::new(
            NotificationKind::OrderCancelled,
            order_id,
            order.pole_id,
            recipients,
            format!("order cancelled: {reason}"),
            now,
        )];
        Ok((order, from, notes))
    }

    // -----------------------------------------------------------------------
    // RollbackStatus
    // -----------------------------------------------------------------------

    pub async fn rollback_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: &Actor,
        reason: &str,
    ) -> EngineResult<Order> {
        authz::require_role(actor, ADMIN_ONLY, "roll back orders")?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::InvalidInput("a rollback reason is required".into()).into());
        }

        let mut tx = self.store.begin().await?;
        let result = self.rollback_in_tx(&mut tx, order_id, target, actor, reason).await;
        let (order, from, notes) = self.finish(tx, "rollback_status", result).await?;

        info!(order_id = %order_id, from = %from, to = %target, "order rolled back");
        self.dispatcher.dispatch(notes);
        Ok(order)
    }

    async fn rollback_in_tx(
        &self,
        tx: &mut S::Tx,
        order_id: Uuid,
        target: OrderStatus,
        actor: &Actor,
        reason: &str,
    ) -> EngineResult<(Order, OrderStatus, Vec<Notification>)> {
        let mut order = self.locked_order(tx, order_id).await?;
        let from = order.status;
        let history = self.store.history(tx, order_id).await?;
        validate_rollback(from, target, &history)?;

        // An EXPIRED order no longer holds its dates; reviving it must not
        // land on a booking made since.
        if !from.blocks_allocation() && target.blocks_allocation() {
            self.store.lock_pole(tx, order.pole_id).await?;
            let bookings = self.store.pole_bookings(tx, order.pole_id).await?;
            ensure_available(order.pole_id, &bookings, &order.range(), Some(order_id))?;
        }

        let now = self.clock.now();
        self.store.update_order_status(tx, order_id, target, now).await?;
        self.store
            .append_history(
                tx,
                &HistoryEntry::new(
                    order_id,
                    *actor,
                    HistoryEvent::StatusChange {
                        from,
                        to: target,
                        rollback: true,
                    },
                    Some(reason.to_string()),
                    now,
                ),
            )
            .await?;

        let starts_later = order.start_date > self.clock.today();
        match rollback_pole_effect(from, target, starts_later) {
            PoleEffect::Release => self.release_pole(tx, order.pole_id, order_id).await?,
            PoleEffect::Occupy => self.occupy_pole(tx, order.pole_id).await?,
            PoleEffect::Unchanged => {}
        }

        order.status = target;
        order.updated_at = now;

        let notes = vec![Notification::new(
            NotificationKind::OrderRolledBack,
            order_id,
            order.pole_id,
            vec![Recipient::Admins],
            format!("order rolled back {from} -> {target}: {reason}"),
            now,
        )];
        Ok((order, from, notes))
    }

    // -----------------------------------------------------------------------
    // RescheduleOrder
    // -----------------------------------------------------------------------

    /// Move an order that has not started work yet to new dates.
    pub async fn reschedule_order(
        &self,
        order_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        actor: &Actor,
    ) -> EngineResult<Order> {
        authz::require_role(actor, ORDER_MANAGERS, "reschedule orders")?;
        let range = DateRange::new(start, end);
        validate_range(&range, self.clock.today())?;

        let mut tx = self.store.begin().await?;
        let result = self.reschedule_in_tx(&mut tx, order_id, range, actor).await;
        let (order, notes) = self.finish(tx, "reschedule_order", result).await?;

        info!(order_id = %order_id, start = %start, end = %end, status = %order.status, "order rescheduled");
        self.dispatcher.dispatch(notes);
        Ok(order)
    }

    async fn reschedule_in_tx(
        &self,
        tx: &mut S::Tx,
        order_id: Uuid,
        range: DateRange,
        actor: &Actor,
    ) -> EngineResult<(Order, Vec<Notification>)> {
        let mut order = self.locked_order(tx, order_id).await?;
        let from = order.status;
        if !matches!(from, OrderStatus::Scheduled | OrderStatus::Pending) {
            return Err(WorkflowError::InvalidCurrentState {
                status: from.as_str().to_string(),
                reason: "only SCHEDULED or PENDING orders can be rescheduled".into(),
            }
            .into());
        }

        self.store
            .lock_pole(tx, order.pole_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("pole", order.pole_id))?;
        let bookings = self.store.pole_bookings(tx, order.pole_id).await?;
        ensure_available(order.pole_id, &bookings, &range, Some(order_id))?;

        let previous = order.range();
        let to = self.initial_status(range.start);
        let now = self.clock.now();
        self.store
            .update_order_schedule(tx, order_id, range, to, now)
            .await?;
        self.store
            .append_history(
                tx,
                &HistoryEntry::new(
                    order_id,
                    *actor,
                    HistoryEvent::ScheduleChange {
                        previous,
                        next: range,
                    },
                    None,
                    now,
                ),
            )
            .await?;

        let mut notes = Vec::new();
        if to != from {
            self.store
                .append_history(
                    tx,
                    &HistoryEntry::new(
                        order_id,
                        *actor,
                        HistoryEvent::StatusChange {
                            from,
                            to,
                            rollback: false,
                        },
                        Some("status recomputed from new start date".into()),
                        now,
                    ),
                )
                .await?;
            if to.occupies_pole() {
                self.occupy_pole(tx, order.pole_id).await?;
            } else {
                self.release_pole(tx, order.pole_id, order_id).await?;
            }
            notes.push(Notification::new(
                NotificationKind::StatusChanged,
                order_id,
                order.pole_id,
                vec![Recipient::Admins],
                format!("order rescheduled to {} .. {} ({from} -> {to})", range.start, range.end),
                now,
            ));
        }

        order.start_date = range.start;
        order.end_date = range.end;
        order.status = to;
        order.updated_at = now;
        Ok((order, notes))
    }

    // -----------------------------------------------------------------------
    // RecordProof
    // -----------------------------------------------------------------------

    pub async fn record_proof(
        &self,
        order_id: Uuid,
        proof_type: ProofType,
        file_ref: &str,
        actor: &Actor,
    ) -> EngineResult<ProofArtifact> {
        let file_ref = file_ref.trim();
        if file_ref.is_empty() {
            return Err(WorkflowError::InvalidInput("file reference is required".into()).into());
        }

        let mut tx = self.store.begin().await?;
        let result = self
            .record_proof_in_tx(&mut tx, order_id, proof_type, file_ref, actor)
            .await;
        let proof = self.finish(tx, "record_proof", result).await?;

        info!(order_id = %order_id, proof_type = %proof_type, "proof recorded");
        Ok(proof)
    }

    async fn record_proof_in_tx(
        &self,
        tx: &mut S::Tx,
        order_id: Uuid,
        proof_type: ProofType,
        file_ref: &str,
        actor: &Actor,
    ) -> EngineResult<ProofArtifact> {
        let order = self.locked_order(tx, order_id).await?;
        if order.status.is_terminal() {
            return Err(WorkflowError::terminal(order.status).into());
        }
        authz::check_proof_scope(actor, &order)?;

        let proof = ProofArtifact {
            proof_id: Uuid::new_v4(),
            order_id,
            proof_type,
            file_ref: file_ref.to_string(),
            uploaded_by: actor.user_id(),
            uploaded_at: self.clock.now(),
        };
        self.store.insert_proof(tx, &proof).await?;
        Ok(proof)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Explicit availability check. `exclude` skips the order being edited.
    pub async fn check_availability(
        &self,
        pole_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<Uuid>,
    ) -> EngineResult<bool> {
        if end <= start {
            return Err(WorkflowError::InvalidInput(format!(
                "end date {end} must be after start date {start}"
            ))
            .into());
        }
        let range = DateRange::new(start, end);

        let mut tx = self.store.begin().await?;
        let result = async {
            self.store
                .fetch_pole(&mut tx, pole_id)
                .await?
                .ok_or_else(|| WorkflowError::not_found("pole", pole_id))?;
            let bookings = self.store.pole_bookings(&mut tx, pole_id).await?;
            Ok::<_, EngineError>(is_available(&bookings, &range, exclude))
        }
        .await;
        self.finish(tx, "check_availability", result).await
    }

    pub async fn get_order(&self, order_id: Uuid) -> EngineResult<Order> {
        let mut tx = self.store.begin().await?;
        let result = async {
            self.store
                .fetch_order(&mut tx, order_id, false)
                .await?
                .ok_or_else(|| EngineError::from(WorkflowError::not_found("order", order_id)))
        }
        .await;
        self.finish(tx, "get_order", result).await
    }

    pub async fn order_history(&self, order_id: Uuid) -> EngineResult<Vec<HistoryEntry>> {
        let mut tx = self.store.begin().await?;
        let result = async {
            if self.store.fetch_order(&mut tx, order_id, false).await?.is_none() {
                return Err(WorkflowError::not_found("order", order_id).into());
            }
            Ok::<_, EngineError>(self.store.history(&mut tx, order_id).await?)
        }
        .await;
        self.finish(tx, "order_history", result).await
    }
}
