//! Append-only audit stream for orders.
//!
//! One stream carries both real status transitions and assignment/schedule
//! edits. The event is a tagged variant, so an assignment change never has to
//! masquerade as a same-status "transition".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Actor, DateRange, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSlot {
    Printer,
    FieldTeam,
}

impl AssignmentSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentSlot::Printer => "printer",
            AssignmentSlot::FieldTeam => "field_team",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEvent {
    Created {
        status: OrderStatus,
    },
    StatusChange {
        from: OrderStatus,
        to: OrderStatus,
        rollback: bool,
    },
    AssignmentChange {
        slot: AssignmentSlot,
        previous: Option<Uuid>,
        next: Option<Uuid>,
    },
    ScheduleChange {
        previous: DateRange,
        next: DateRange,
    },
}

impl HistoryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            HistoryEvent::Created { .. } => "created",
            HistoryEvent::StatusChange { .. } => "status_change",
            HistoryEvent::AssignmentChange { .. } => "assignment_change",
            HistoryEvent::ScheduleChange { .. } => "schedule_change",
        }
    }

    /// Status the order left, for real transitions only.
    pub fn old_status(&self) -> Option<OrderStatus> {
        match self {
            HistoryEvent::StatusChange { from, .. } => Some(*from),
            _ => None,
        }
    }

    pub fn new_status(&self) -> Option<OrderStatus> {
        match self {
            HistoryEvent::Created { status } => Some(*status),
            HistoryEvent::StatusChange { to, .. } => Some(*to),
            _ => None,
        }
    }

    pub fn is_rollback(&self) -> bool {
        matches!(self, HistoryEvent::StatusChange { rollback: true, .. })
    }
}

/// Immutable audit record. Written exactly once, never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub entry_id: Uuid,
    pub order_id: Uuid,
    pub actor: Actor,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub event: HistoryEvent,
}

impl HistoryEntry {
    pub fn new(
        order_id: Uuid,
        actor: Actor,
        event: HistoryEvent,
        note: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            order_id,
            actor,
            note,
            recorded_at,
            event,
        }
    }
}
