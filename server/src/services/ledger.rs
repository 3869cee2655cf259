//! Capacity Ledger: every change to `available_tickets` goes through a
//! conditional write inside a unit of work.

use uuid::Uuid;

use crate::store::{CapacitySnapshot, UnitOfWork};
use crate::utils::error::AppError;

pub const INSUFFICIENT_TICKETS: &str = "insufficient tickets";

/// Reads and locks the conference row for the rest of the unit of work.
pub async fn read_capacity(
    uow: &mut dyn UnitOfWork,
    conference_id: Uuid,
) -> Result<CapacitySnapshot, AppError> {
    uow.lock_conference(conference_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("conference {conference_id} not found")))
}

pub async fn decrement(
    uow: &mut dyn UnitOfWork,
    conference_id: Uuid,
    amount: i32,
) -> Result<(), AppError> {
    if uow.decrement_available(conference_id, amount).await? {
        Ok(())
    } else {
        Err(AppError::Conflict(INSUFFICIENT_TICKETS.to_string()))
    }
}

pub async fn release(
    uow: &mut dyn UnitOfWork,
    conference_id: Uuid,
    amount: i32,
) -> Result<(), AppError> {
    if uow.increment_available(conference_id, amount).await? {
        Ok(())
    } else {
        Err(AppError::InternalServerError(format!(
            "ledger inconsistency: releasing {amount} ticket(s) would exceed total for conference {conference_id}"
        )))
    }
}

/// Moves the ledger by the change in held capacity of one booking.
pub async fn adjust(
    uow: &mut dyn UnitOfWork,
    conference_id: Uuid,
    held_before: i32,
    held_after: i32,
) -> Result<(), AppError> {
    match held_after - held_before {
        0 => Ok(()),
        delta if delta > 0 => decrement(uow, conference_id, delta).await,
        delta => release(uow, conference_id, -delta).await,
    }
}
