//! Operation-level authorization outside the transition table.

use pdk_schemas::{Actor, Order, Role};

use crate::WorkflowError;

pub const ORDER_MANAGERS: &[Role] = &[Role::Admin, Role::Operator];
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

pub fn require_role(actor: &Actor, roles: &[Role], action: &str) -> Result<(), WorkflowError> {
    let role = actor.role();
    if roles.contains(&role) {
        Ok(())
    } else {
        Err(WorkflowError::RoleNotAuthorized {
            role,
            action: action.to_string(),
        })
    }
}

/// Printer and field actors may only act on orders assigned to them.
pub fn check_assignment_scope(actor: &Actor, order: &Order) -> Result<(), WorkflowError> {
    let assignee = match actor.role() {
        Role::Printer => order.printer_id,
        Role::Field => order.field_user_id,
        _ => return Ok(()),
    };
    if assignee.is_some() && assignee == actor.user_id() {
        Ok(())
    } else {
        Err(WorkflowError::RoleNotAuthorized {
            role: actor.role(),
            action: format!("act on order {} which is not assigned to them", order.order_id),
        })
    }
}

/// Proof uploads: admin and operator always, field only on its own orders.
pub fn check_proof_scope(actor: &Actor, order: &Order) -> Result<(), WorkflowError> {
    match actor.role() {
        Role::Admin | Role::Operator => Ok(()),
        Role::Field => check_assignment_scope(actor, order),
        role => Err(WorkflowError::RoleNotAuthorized {
            role,
            action: "record proof artifacts".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use pdk_schemas::{OrderStatus, UserRole};
    use uuid::Uuid;

    fn order(printer: Option<Uuid>, field: Option<Uuid>) -> Order {
        let day = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        Order {
            order_id: Uuid::new_v4(),
            pole_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            start_date: day,
            end_date: day.succ_opt().unwrap(),
            status: OrderStatus::Printing,
            printer_id: printer,
            field_user_id: field,
            price_micros: 0,
            cancellation: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn system_actor_is_never_an_order_manager() {
        let err = require_role(&Actor::system(), ORDER_MANAGERS, "create orders").unwrap_err();
        assert_eq!(err.code(), "ROLE_NOT_AUTHORIZED");
        let op = Actor::user(Uuid::new_v4(), UserRole::Operator);
        assert!(require_role(&op, ORDER_MANAGERS, "create orders").is_ok());
        assert!(require_role(&op, ADMIN_ONLY, "cancel orders").is_err());
    }

    #[test]
    fn printer_scoped_to_own_orders() {
        let me = Uuid::new_v4();
        let actor = Actor::user(me, UserRole::Printer);
        assert!(check_assignment_scope(&actor, &order(Some(me), None)).is_ok());
        assert!(check_assignment_scope(&actor, &order(Some(Uuid::new_v4()), None)).is_err());
        assert!(check_assignment_scope(&actor, &order(None, Some(me))).is_err());
    }

    #[test]
    fn operators_are_not_scoped() {
        let actor = Actor::user(Uuid::new_v4(), UserRole::Operator);
        assert!(check_assignment_scope(&actor, &order(None, None)).is_ok());
    }

    #[test]
    fn proof_scope_rules() {
        let me = Uuid::new_v4();
        let field = Actor::user(me, UserRole::Field);
        assert!(check_proof_scope(&field, &order(None, Some(me))).is_ok());
        assert!(check_proof_scope(&field, &order(None, None)).is_err());
        let printer = Actor::user(me, UserRole::Printer);
        assert!(check_proof_scope(&printer, &order(Some(me), None)).is_err());
    }
}
