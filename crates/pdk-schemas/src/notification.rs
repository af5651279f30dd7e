use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderCreated,
    StatusChanged,
    PrinterAssigned,
    FieldTeamAssigned,
    OrderCancelled,
    OrderRolledBack,
    /// Scheduler promoted SCHEDULED -> PENDING.
    OrderActivated,
    /// Scheduler moved LIVE -> EXPIRED.
    OrderExpired,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderCreated => "order_created",
            NotificationKind::StatusChanged => "status_changed",
            NotificationKind::PrinterAssigned => "printer_assigned",
            NotificationKind::FieldTeamAssigned => "field_team_assigned",
            NotificationKind::OrderCancelled => "order_cancelled",
            NotificationKind::OrderRolledBack => "order_rolled_back",
            NotificationKind::OrderActivated => "order_activated",
            NotificationKind::OrderExpired => "order_expired",
        }
    }
}

/// Delivery target. Resolving `Admins` to concrete contacts is the sender's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    User(Uuid),
    Admins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub order_id: Uuid,
    pub pole_id: Uuid,
    pub recipients: Vec<Recipient>,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        order_id: Uuid,
        pole_id: Uuid,
        recipients: Vec<Recipient>,
        message: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            order_id,
            pole_id,
            recipients,
            message: message.into(),
            occurred_at,
        }
    }
}
