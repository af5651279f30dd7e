//! pdk-schemas
//!
//! Domain records shared by every PoleDesk crate. No business logic lives
//! here beyond small, total helpers on the types themselves.

mod history;
mod notification;
mod status;

pub use history::{AssignmentSlot, HistoryEntry, HistoryEvent};
pub use notification::{Notification, NotificationKind, Recipient};
pub use status::{OrderStatus, ParseEnumError, PoleStatus, ProofType, Role, UserRole};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Who is performing an engine call.
///
/// `System` is the identity of the daily scheduler. It has no user id and
/// can only be produced by [`Actor::system`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    User { id: Uuid, role: UserRole },
    System,
}

impl Actor {
    pub fn user(id: Uuid, role: UserRole) -> Self {
        Actor::User { id, role }
    }

    pub fn system() -> Self {
        Actor::System
    }

    pub fn role(&self) -> Role {
        match self {
            Actor::User { role, .. } => Role::from(*role),
            Actor::System => Role::System,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::User { id, .. } => Some(*id),
            Actor::System => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }
}

// ---------------------------------------------------------------------------
// DateRange
// ---------------------------------------------------------------------------

/// Inclusive day range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// `true` if `other` lies entirely inside `self`.
    pub fn covers(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ---------------------------------------------------------------------------
// Pole / Order / users / proofs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pole {
    pub pole_id: Uuid,
    /// Derived from the location by the pole registry.
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status: PoleStatus,
    /// Soft-delete marker. Deleted poles are invisible to the engine.
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
    pub cancelled_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub pole_id: Uuid,
    pub account_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: OrderStatus,
    pub printer_id: Option<Uuid>,
    pub field_user_id: Option<Uuid>,
    /// Integer micros; never a float.
    pub price_micros: i64,
    pub cancellation: Option<Cancellation>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }

    pub fn assignee(&self, slot: AssignmentSlot) -> Option<Uuid> {
        match slot {
            AssignmentSlot::Printer => self.printer_id,
            AssignmentSlot::FieldTeam => self.field_user_id,
        }
    }
}

/// A booked date range on a pole, as seen by the availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub range: DateRange,
}

impl From<&Order> for Booking {
    fn from(o: &Order) -> Self {
        Booking {
            order_id: o.order_id,
            status: o.status,
            range: o.range(),
        }
    }
}

/// Identity record backing assignment validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub user_id: Uuid,
    pub role: UserRole,
    pub display_name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofArtifact {
    pub proof_id: Uuid,
    pub order_id: Uuid,
    pub proof_type: ProofType,
    /// Opaque reference into the external file store.
    pub file_ref: String,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: DateTime<Utc>,
}
