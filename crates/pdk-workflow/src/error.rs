use pdk_schemas::{OrderStatus, Role, UserRole};
use uuid::Uuid;

/// Evidence or assignment an order must carry before a transition commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    AssignedPrinter,
    AssignedFieldUser,
    MountProof,
    DismountProof,
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Requirement::AssignedPrinter => "an assigned printer is required",
            Requirement::AssignedFieldUser => "an assigned field user is required",
            Requirement::MountProof => "at least one PROOF_MOUNT artifact is required",
            Requirement::DismountProof => "at least one PROOF_DISMOUNT artifact is required",
        };
        f.write_str(s)
    }
}

/// Typed, synchronous failures of the order lifecycle. None of them are
/// retried by the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    /// No rule exists for the current status: a terminal status, or a value
    /// read from storage that is not a known status.
    #[error("INVALID_CURRENT_STATE: {status}: {reason}")]
    InvalidCurrentState { status: String, reason: String },

    #[error("TRANSITION_NOT_ALLOWED: {from} -> {to}; allowed: [{}]", join_statuses(.allowed))]
    TransitionNotAllowed {
        from: OrderStatus,
        to: OrderStatus,
        allowed: Vec<OrderStatus>,
    },

    #[error("ROLE_NOT_AUTHORIZED: role {role} may not {action}")]
    RoleNotAuthorized { role: Role, action: String },

    /// Structural readiness check. Never bypassed by any role.
    #[error("MISSING_PRECONDITION: {requirement}")]
    MissingPrecondition { requirement: Requirement },

    #[error("POLE_CONFLICT: pole {pole_id} is already booked by order {conflicting_order_id}")]
    PoleConflict {
        pole_id: Uuid,
        conflicting_order_id: Uuid,
    },

    #[error("INVALID_ROLLBACK_TARGET: {target}; allowed: [{}]", join_statuses(.allowed))]
    InvalidRollbackTarget {
        target: OrderStatus,
        allowed: Vec<OrderStatus>,
    },

    #[error("NOT_FOUND: {entity} {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    #[error("INVALID_ASSIGNEE: user {user_id} is not an active {expected}")]
    InvalidAssignee { user_id: Uuid, expected: UserRole },
}

impl WorkflowError {
    /// Stable machine-readable code (the prefix of the display string).
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::InvalidCurrentState { .. } => "INVALID_CURRENT_STATE",
            WorkflowError::TransitionNotAllowed { .. } => "TRANSITION_NOT_ALLOWED",
            WorkflowError::RoleNotAuthorized { .. } => "ROLE_NOT_AUTHORIZED",
            WorkflowError::MissingPrecondition { .. } => "MISSING_PRECONDITION",
            WorkflowError::PoleConflict { .. } => "POLE_CONFLICT",
            WorkflowError::InvalidRollbackTarget { .. } => "INVALID_ROLLBACK_TARGET",
            WorkflowError::NotFound { .. } => "NOT_FOUND",
            WorkflowError::InvalidInput(_) => "INVALID_INPUT",
            WorkflowError::InvalidAssignee { .. } => "INVALID_ASSIGNEE",
        }
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        WorkflowError::NotFound { entity, id }
    }

    pub fn terminal(status: OrderStatus) -> Self {
        WorkflowError::InvalidCurrentState {
            status: status.as_str().to_string(),
            reason: "order is in a terminal status".to_string(),
        }
    }
}

fn join_statuses(statuses: &[OrderStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
