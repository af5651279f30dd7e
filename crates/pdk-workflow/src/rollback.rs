//! Administrative rollback: legal target set and pole side effect.

use std::collections::BTreeSet;

use pdk_schemas::{HistoryEntry, OrderStatus};

use crate::WorkflowError;

/// Always-legal rollback targets, independent of history.
pub const ROLLBACK_SAFETY_SET: [OrderStatus; 3] = [
    OrderStatus::Pending,
    OrderStatus::Printing,
    OrderStatus::AwaitingMount,
];

/// Every status the order has ever left, plus [`ROLLBACK_SAFETY_SET`].
///
/// Only real status changes count. Creation, assignment and schedule
/// entries carry no `old_status`.
pub fn rollback_targets(history: &[HistoryEntry]) -> BTreeSet<OrderStatus> {
    let mut targets: BTreeSet<OrderStatus> = ROLLBACK_SAFETY_SET.into_iter().collect();
    targets.extend(history.iter().filter_map(|e| e.event.old_status()));
    targets
}

/// # Errors
/// - [`WorkflowError::InvalidCurrentState`] when `current` is terminal.
/// - [`WorkflowError::InvalidRollbackTarget`] when `target` is outside the
///   legal set or equals `current`.
pub fn validate_rollback(
    current: OrderStatus,
    target: OrderStatus,
    history: &[HistoryEntry],
) -> Result<(), WorkflowError> {
    if current.is_terminal() {
        return Err(WorkflowError::terminal(current));
    }
    let targets = rollback_targets(history);
    if target == current || !targets.contains(&target) {
        return Err(WorkflowError::InvalidRollbackTarget {
            target,
            allowed: targets.into_iter().filter(|s| *s != current).collect(),
        });
    }
    Ok(())
}

/// What a rollback does to the pole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoleEffect {
    /// Release the pole unless another order still occupies it.
    Release,
    Occupy,
    Unchanged,
}

/// Pole re-projection for a rollback from `prior` to `target`.
///
/// SCHEDULED, or PENDING on an order whose start is still ahead
/// (`starts_later`), releases the pole when `prior` held it. Every other
/// occupying target, LIVE/EXPIRED included, forces it occupied.
pub fn rollback_pole_effect(prior: OrderStatus, target: OrderStatus, starts_later: bool) -> PoleEffect {
    let holds = target.occupies_pole() && !(target == OrderStatus::Pending && starts_later);
    if holds {
        PoleEffect::Occupy
    } else if prior.occupies_pole() {
        PoleEffect::Release
    } else {
        PoleEffect::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pdk_schemas::{Actor, AssignmentSlot, HistoryEvent};
    use uuid::Uuid;
    use OrderStatus::*;

    fn change(order_id: Uuid, from: OrderStatus, to: OrderStatus) -> HistoryEntry {
        HistoryEntry::new(
            order_id,
            Actor::system(),
            HistoryEvent::StatusChange {
                from,
                to,
                rollback: false,
            },
            None,
            Utc::now(),
        )
    }

    #[test]
    fn targets_union_history_and_safety_set() {
        let id = Uuid::new_v4();
        let history = vec![
            HistoryEntry::new(id, Actor::system(), HistoryEvent::Created { status: Scheduled }, None, Utc::now()),
            change(id, Scheduled, Pending),
            change(id, Pending, Printing),
            change(id, Printing, AwaitingMount),
            change(id, AwaitingMount, Live),
        ];
        let targets = rollback_targets(&history);
        assert_eq!(
            targets.into_iter().collect::<Vec<_>>(),
            vec![Scheduled, Pending, Printing, AwaitingMount]
        );
    }

    #[test]
    fn assignment_entries_do_not_contribute_targets() {
        let id = Uuid::new_v4();
        let history = vec![HistoryEntry::new(
            id,
            Actor::system(),
            HistoryEvent::AssignmentChange {
                slot: AssignmentSlot::Printer,
                previous: None,
                next: Some(Uuid::new_v4()),
            },
            None,
            Utc::now(),
        )];
        assert_eq!(rollback_targets(&history).len(), ROLLBACK_SAFETY_SET.len());
    }

    #[test]
    fn live_is_a_target_only_after_the_order_left_it() {
        let id = Uuid::new_v4();
        let err = validate_rollback(Printing, Live, &[]).unwrap_err();
        assert_eq!(err.code(), "INVALID_ROLLBACK_TARGET");
        let history = vec![change(id, Live, Expired)];
        assert!(validate_rollback(Expired, Live, &history).is_ok());
    }

    #[test]
    fn terminal_and_same_status_are_rejected() {
        assert_eq!(
            validate_rollback(Completed, Pending, &[]).unwrap_err().code(),
            "INVALID_CURRENT_STATE"
        );
        assert_eq!(
            validate_rollback(Cancelled, Pending, &[]).unwrap_err().code(),
            "INVALID_CURRENT_STATE"
        );
        assert_eq!(
            validate_rollback(Pending, Pending, &[]).unwrap_err().code(),
            "INVALID_ROLLBACK_TARGET"
        );
    }

    #[test]
    fn pole_effect_follows_target() {
        assert_eq!(rollback_pole_effect(Live, Pending, true), PoleEffect::Release);
        assert_eq!(rollback_pole_effect(Pending, Scheduled, true), PoleEffect::Release);
        assert_eq!(rollback_pole_effect(Scheduled, Pending, true), PoleEffect::Unchanged);
        assert_eq!(rollback_pole_effect(Expired, Live, false), PoleEffect::Occupy);
        assert_eq!(rollback_pole_effect(Live, Printing, false), PoleEffect::Occupy);
    }

    #[test]
    fn pending_on_a_started_order_keeps_the_pole() {
        assert_eq!(rollback_pole_effect(Live, Pending, false), PoleEffect::Occupy);
        assert_eq!(rollback_pole_effect(Scheduled, Pending, false), PoleEffect::Occupy);
        assert_eq!(rollback_pole_effect(Live, Scheduled, false), PoleEffect::Release);
    }
}
