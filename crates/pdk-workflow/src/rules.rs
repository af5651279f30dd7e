//! Transition rule table.
//!
//! # Table
//!
//! ```text
//! current          allowed next                 roles (admin always passes)
//! SCHEDULED        PENDING, CANCELLED           admin, operator, system
//! PENDING          PRINTING, CANCELLED          admin, operator
//! PRINTING         AWAITING_MOUNT, CANCELLED    admin, operator, printer
//! AWAITING_MOUNT   LIVE, CANCELLED              admin, operator, field
//! LIVE             EXPIRED, COMPLETED           admin, system
//! EXPIRED          COMPLETED                    admin, operator, field
//! COMPLETED        (terminal)
//! CANCELLED        (terminal)
//! ```
//!
//! The admin bypass applies to the role column only. An admin still cannot
//! request a status outside the allowed-next column.

use pdk_schemas::{OrderStatus, Role};

use crate::WorkflowError;

/// One row of the table.
#[derive(Debug, PartialEq, Eq)]
pub struct TransitionRule {
    pub allowed_next: &'static [OrderStatus],
    pub roles: &'static [Role],
}

static SCHEDULED: TransitionRule = TransitionRule {
    allowed_next: &[OrderStatus::Pending, OrderStatus::Cancelled],
    roles: &[Role::Admin, Role::Operator, Role::System],
};

static PENDING: TransitionRule = TransitionRule {
    allowed_next: &[OrderStatus::Printing, OrderStatus::Cancelled],
    roles: &[Role::Admin, Role::Operator],
};

static PRINTING: TransitionRule = TransitionRule {
    allowed_next: &[OrderStatus::AwaitingMount, OrderStatus::Cancelled],
    roles: &[Role::Admin, Role::Operator, Role::Printer],
};

static AWAITING_MOUNT: TransitionRule = TransitionRule {
    allowed_next: &[OrderStatus::Live, OrderStatus::Cancelled],
    roles: &[Role::Admin, Role::Operator, Role::Field],
};

static LIVE: TransitionRule = TransitionRule {
    allowed_next: &[OrderStatus::Expired, OrderStatus::Completed],
    roles: &[Role::Admin, Role::System],
};

static EXPIRED: TransitionRule = TransitionRule {
    allowed_next: &[OrderStatus::Completed],
    roles: &[Role::Admin, Role::Operator, Role::Field],
};

/// Look up the rule for `current`. Terminal statuses have none.
pub fn rule_for(current: OrderStatus) -> Option<&'static TransitionRule> {
    match current {
        OrderStatus::Scheduled => Some(&SCHEDULED),
        OrderStatus::Pending => Some(&PENDING),
        OrderStatus::Printing => Some(&PRINTING),
        OrderStatus::AwaitingMount => Some(&AWAITING_MOUNT),
        OrderStatus::Live => Some(&LIVE),
        OrderStatus::Expired => Some(&EXPIRED),
        OrderStatus::Completed | OrderStatus::Cancelled => None,
    }
}

/// Validate `current -> requested` for an actor holding `role`.
///
/// Check order: rule exists, then requested is reachable, then role.
///
/// # Errors
/// - [`WorkflowError::InvalidCurrentState`] when `current` has no rule.
/// - [`WorkflowError::TransitionNotAllowed`] when `requested` is not in the
///   allowed-next set (the error carries that set).
/// - [`WorkflowError::RoleNotAuthorized`] when `role` is not listed, unless
///   `role` is [`Role::Admin`].
pub fn validate_transition(
    current: OrderStatus,
    requested: OrderStatus,
    role: Role,
) -> Result<(), WorkflowError> {
    let rule = rule_for(current).ok_or_else(|| WorkflowError::InvalidCurrentState {
        status: current.as_str().to_string(),
        reason: "no transition rule for a terminal status".to_string(),
    })?;

    if !rule.allowed_next.contains(&requested) {
        return Err(WorkflowError::TransitionNotAllowed {
            from: current,
            to: requested,
            allowed: rule.allowed_next.to_vec(),
        });
    }

    if role != Role::Admin && !rule.roles.contains(&role) {
        return Err(WorkflowError::RoleNotAuthorized {
            role,
            action: format!("move an order from {current} to {requested}"),
        });
    }

    Ok(())
}

/// Same as [`validate_transition`] for a status string read from storage.
/// An unknown string is treated as a status with no rule.
pub fn validate_transition_raw(
    current: &str,
    requested: OrderStatus,
    role: Role,
) -> Result<(), WorkflowError> {
    let current = OrderStatus::parse(current).map_err(|e| WorkflowError::InvalidCurrentState {
        status: current.to_string(),
        reason: e.to_string(),
    })?;
    validate_transition(current, requested, role)
}

pub fn is_transition_allowed(current: OrderStatus, requested: OrderStatus, role: Role) -> bool {
    validate_transition(current, requested, role).is_ok()
}
