//! Evidence gate: structural readiness checks for specific transitions.
//!
//! These are not authorization checks. No role, the top admin role
//! included, can skip them.

use pdk_schemas::OrderStatus;

use crate::{Requirement, WorkflowError};

/// Facts about an order the gate inspects. The engine fills in only the
/// fact [`required_evidence`] asks for; the rest can stay `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub printer_assigned: bool,
    pub field_user_assigned: bool,
    pub mount_proof: bool,
    pub dismount_proof: bool,
}

impl Readiness {
    fn satisfies(&self, req: Requirement) -> bool {
        match req {
            Requirement::AssignedPrinter => self.printer_assigned,
            Requirement::AssignedFieldUser => self.field_user_assigned,
            Requirement::MountProof => self.mount_proof,
            Requirement::DismountProof => self.dismount_proof,
        }
    }
}

/// The requirement gating `from -> to`, if any.
pub fn required_evidence(from: OrderStatus, to: OrderStatus) -> Option<Requirement> {
    match (from, to) {
        (OrderStatus::Pending, OrderStatus::Printing) => Some(Requirement::AssignedPrinter),
        (OrderStatus::Printing, OrderStatus::AwaitingMount) => {
            Some(Requirement::AssignedFieldUser)
        }
        (OrderStatus::AwaitingMount, OrderStatus::Live) => Some(Requirement::MountProof),
        (OrderStatus::Expired, OrderStatus::Completed) => Some(Requirement::DismountProof),
        _ => None,
    }
}

/// # Errors
/// [`WorkflowError::MissingPrecondition`] naming the unmet requirement.
pub fn check_evidence(
    from: OrderStatus,
    to: OrderStatus,
    readiness: &Readiness,
) -> Result<(), WorkflowError> {
    match required_evidence(from, to) {
        Some(req) if !readiness.satisfies(req) => {
            Err(WorkflowError::MissingPrecondition { requirement: req })
        }
        _ => Ok(()),
    }
}
