//! pdk-workflow
//!
//! Pure order lifecycle logic. Nothing in this crate touches a database,
//! a clock or the network; the engine feeds it facts and acts on its verdicts.
//!
//! - [`rules`]: transition rule table
//! - [`evidence`]: assignment and proof preconditions
//! - [`availability`]: pole booking overlap
//! - [`rollback`]: administrative rollback targets
//! - [`authz`]: operation-level role checks

pub mod authz;
pub mod availability;
mod error;
pub mod evidence;
pub mod rollback;
pub mod rules;

pub use availability::{ensure_available, find_conflict, is_available, ranges_conflict, validate_range};
pub use error::{Requirement, WorkflowError};
pub use evidence::{check_evidence, required_evidence, Readiness};
pub use rollback::{rollback_pole_effect, rollback_targets, validate_rollback, PoleEffect};
pub use rules::{is_transition_allowed, rule_for, validate_transition, validate_transition_raw};
