//! Closed status and role vocabularies.
//!
//! Every value that crosses a storage or wire boundary as a string has a
//! canonical `as_str` form and a fallible `parse`. Storage holds the same
//! upper-case strings the CHECK constraints in `pdk-db` enumerate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Returned when a string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of an order.
///
/// ```text
/// SCHEDULED ─► PENDING ─► PRINTING ─► AWAITING_MOUNT ─► LIVE ─► EXPIRED ─► COMPLETED
///     │           │           │              │            └──────────────────►┘
///     └───────────┴───────────┴──────────────┴──► CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Start date is in the future; the pole is not yet held.
    Scheduled,
    /// Active lease waiting for a printer.
    Pending,
    Printing,
    AwaitingMount,
    /// Banner is physically on the pole.
    Live,
    /// End date passed; banner still mounted until the field team dismounts it.
    Expired,
    /// **Terminal.**
    Completed,
    /// **Terminal.**
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Scheduled,
        OrderStatus::Pending,
        OrderStatus::Printing,
        OrderStatus::AwaitingMount,
        OrderStatus::Live,
        OrderStatus::Expired,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Scheduled => "SCHEDULED",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Printing => "PRINTING",
            OrderStatus::AwaitingMount => "AWAITING_MOUNT",
            OrderStatus::Live => "LIVE",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s {
            "SCHEDULED" => Ok(OrderStatus::Scheduled),
            "PENDING" => Ok(OrderStatus::Pending),
            "PRINTING" => Ok(OrderStatus::Printing),
            "AWAITING_MOUNT" => Ok(OrderStatus::AwaitingMount),
            "LIVE" => Ok(OrderStatus::Live),
            "EXPIRED" => Ok(OrderStatus::Expired),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(ParseEnumError::new("order status", other)),
        }
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Statuses that hold the pole right now. EXPIRED keeps holding it until
    /// the dismount is confirmed.
    pub fn occupies_pole(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending
                | OrderStatus::Printing
                | OrderStatus::AwaitingMount
                | OrderStatus::Live
                | OrderStatus::Expired
        )
    }

    /// Statuses whose date range the availability check treats as booked.
    pub fn blocks_allocation(&self) -> bool {
        !matches!(
            self,
            OrderStatus::Completed | OrderStatus::Expired | OrderStatus::Cancelled
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::parse(s)
    }
}

// ---------------------------------------------------------------------------
// PoleStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoleStatus {
    Available,
    Occupied,
    /// Externally managed; the engine never overwrites it.
    Maintenance,
    /// Externally managed; the engine never overwrites it.
    Inactive,
}

impl PoleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoleStatus::Available => "AVAILABLE",
            PoleStatus::Occupied => "OCCUPIED",
            PoleStatus::Maintenance => "MAINTENANCE",
            PoleStatus::Inactive => "INACTIVE",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s {
            "AVAILABLE" => Ok(PoleStatus::Available),
            "OCCUPIED" => Ok(PoleStatus::Occupied),
            "MAINTENANCE" => Ok(PoleStatus::Maintenance),
            "INACTIVE" => Ok(PoleStatus::Inactive),
            other => Err(ParseEnumError::new("pole status", other)),
        }
    }

    /// AVAILABLE and OCCUPIED are projections of order state; the other two
    /// are set by operators outside the lifecycle engine.
    pub fn is_engine_managed(&self) -> bool {
        matches!(self, PoleStatus::Available | PoleStatus::Occupied)
    }
}

impl fmt::Display for PoleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Roles a human account can hold. There is deliberately no `System` here:
/// external input can only ever resolve to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Operator,
    Printer,
    Field,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Operator => "operator",
            UserRole::Printer => "printer",
            UserRole::Field => "field",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "operator" => Ok(UserRole::Operator),
            "printer" => Ok(UserRole::Printer),
            "field" => Ok(UserRole::Field),
            _ => Err(ParseEnumError::new("user role", s)),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserRole::parse(s)
    }
}

/// Role as seen by the transition rule table: every user role plus the
/// internal `System` role the daily scheduler acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operator,
    Printer,
    Field,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Operator => "operator",
            Role::Printer => "printer",
            Role::Field => "field",
            Role::System => "system",
        }
    }

    /// Parse a role string read back from storage (audit rows can carry `system`).
    pub fn from_stored(s: &str) -> Result<Self, ParseEnumError> {
        if s == "system" {
            return Ok(Role::System);
        }
        UserRole::parse(s)
            .map(Role::from)
            .map_err(|_| ParseEnumError::new("role", s))
    }
}

impl From<UserRole> for Role {
    fn from(r: UserRole) -> Self {
        match r {
            UserRole::Admin => Role::Admin,
            UserRole::Operator => Role::Operator,
            UserRole::Printer => Role::Printer,
            UserRole::Field => Role::Field,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProofType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofType {
    ProofMount,
    ProofDismount,
}

impl ProofType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofType::ProofMount => "PROOF_MOUNT",
            ProofType::ProofDismount => "PROOF_DISMOUNT",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ParseEnumError> {
        match s {
            "PROOF_MOUNT" => Ok(ProofType::ProofMount),
            "PROOF_DISMOUNT" => Ok(ProofType::ProofDismount),
            other => Err(ParseEnumError::new("proof type", other)),
        }
    }
}

impl fmt::Display for ProofType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
