//! Availability checker: the single overlap rule for pole bookings.
//!
//! Ranges are inclusive day ranges. A candidate conflicts with an existing
//! booking when any of three clauses holds:
//!
//! - (a) the existing range contains the candidate start
//! - (b) the existing range contains the candidate end
//! - (c) the candidate range covers the existing range
//!
//! (c) is the only clause that catches a candidate strictly larger than the
//! booking on both sides. All three are kept.

use chrono::NaiveDate;
use pdk_schemas::{Booking, DateRange};
use uuid::Uuid;

use crate::WorkflowError;

pub fn ranges_conflict(existing: &DateRange, candidate: &DateRange) -> bool {
    let starts_inside = existing.contains(candidate.start);
    let ends_inside = existing.contains(candidate.end);
    let covers_existing = candidate.covers(existing);
    starts_inside || ends_inside || covers_existing
}

/// First booking that blocks `candidate`. Bookings in COMPLETED, EXPIRED or
/// CANCELLED never block, and `exclude` (the order being edited) is skipped.
pub fn find_conflict<'a>(
    bookings: &'a [Booking],
    candidate: &DateRange,
    exclude: Option<Uuid>,
) -> Option<&'a Booking> {
    bookings.iter().find(|b| {
        b.status.blocks_allocation()
            && Some(b.order_id) != exclude
            && ranges_conflict(&b.range, candidate)
    })
}

pub fn is_available(bookings: &[Booking], candidate: &DateRange, exclude: Option<Uuid>) -> bool {
    find_conflict(bookings, candidate, exclude).is_none()
}

/// Map a conflict to the engine error for `pole_id`.
pub fn ensure_available(
    pole_id: Uuid,
    bookings: &[Booking],
    candidate: &DateRange,
    exclude: Option<Uuid>,
) -> Result<(), WorkflowError> {
    match find_conflict(bookings, candidate, exclude) {
        Some(b) => Err(WorkflowError::PoleConflict {
            pole_id,
            conflicting_order_id: b.order_id,
        }),
        None => Ok(()),
    }
}

/// Shape checks on a requested lease range: `end > start` and the start is
/// not in the past relative to `today`.
pub fn validate_range(range: &DateRange, today: NaiveDate) -> Result<(), WorkflowError> {
    if range.end <= range.start {
        return Err(WorkflowError::InvalidInput(format!(
            "end date {} must be after start date {}",
            range.end, range.start
        )));
    }
    if range.start < today {
        return Err(WorkflowError::InvalidInput(format!(
            "start date {} is before today {}",
            range.start, today
        )));
    }
    Ok(())
}
