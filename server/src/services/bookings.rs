//! Booking Transaction Engine.
//!
//! Every path that changes held capacity runs inside one unit of work. It
//! locks the conference row first and the booking row second, checks, writes
//! the booking, moves the ledger with a conditional write, reconciles tickets
//! and commits. Any early return drops the unit of work and rolls the whole
//! attempt back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::gate::{authorize_booking_read, ensure_owner, require_role};
use crate::auth::Identity;
use crate::models::{Booking, BookingStatus, NewBooking, Role};
use crate::services::ledger::{self, INSUFFICIENT_TICKETS};
use crate::services::{tickets, window, with_timeout};
use crate::state::AppState;
use crate::store::{CapacitySnapshot, Store, UnitOfWork};
use crate::utils::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub conference_id: Uuid,
    pub tickets_booked: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingRequest {
    pub tickets_booked: Option<i32>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingReceipt {
    pub booking_id: Uuid,
    pub conference_id: Uuid,
    pub tickets_booked: i32,
    pub ticket_codes: Vec<String>,
    pub message: String,
}

fn validate_quantity(tickets_booked: i32) -> Result<(), AppError> {
    if tickets_booked <= 0 {
        return Err(AppError::ValidationError(
            "tickets_booked must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn booking_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("booking {id} not found"))
}

pub async fn create_booking(
    state: &AppState,
    identity: &Identity,
    request: CreateBookingRequest,
    now: DateTime<Utc>,
) -> Result<BookingReceipt, AppError> {
    require_role(identity, Role::Customer)?;
    validate_quantity(request.tickets_booked)?;

    let receipt = with_timeout(
        state.tx_timeout,
        commit_booking(state.store.as_ref(), identity.user_id, &request, now),
    )
    .await?;

    info!(
        booking_id = %receipt.booking_id,
        conference_id = %receipt.conference_id,
        tickets = receipt.tickets_booked,
        "Booking committed"
    );
    Ok(receipt)
}

async fn commit_booking(
    store: &dyn Store,
    user_id: Uuid,
    request: &CreateBookingRequest,
    now: DateTime<Utc>,
) -> Result<BookingReceipt, AppError> {
    let mut uow = store.begin().await?;

    let capacity = ledger::read_capacity(uow.as_mut(), request.conference_id).await?;
    if !capacity.is_bookable() {
        return Err(AppError::Conflict("conference not bookable".to_string()));
    }
    if request.tickets_booked > capacity.available {
        return Err(AppError::Conflict(INSUFFICIENT_TICKETS.to_string()));
    }

    let booking = uow
        .insert_booking(NewBooking {
            user_id,
            conference_id: request.conference_id,
            tickets_booked: request.tickets_booked,
            status: BookingStatus::Completed,
            created_at: now,
        })
        .await?;

    // available >= n is re-checked by the write itself.
    ledger::decrement(uow.as_mut(), request.conference_id, request.tickets_booked).await?;

    let issued = tickets::allocate(uow.as_mut(), &booking, now).await?;
    uow.commit().await?;

    Ok(BookingReceipt {
        booking_id: booking.id,
        conference_id: booking.conference_id,
        tickets_booked: booking.tickets_booked,
        ticket_codes: issued.into_iter().map(|t| t.ticket_code).collect(),
        message: format!(
            "Booking confirmed: {} ticket(s) for '{}'",
            booking.tickets_booked, capacity.title
        ),
    })
}

/// Customers read their own bookings; organizers read bookings for the
/// conferences they own.
pub async fn get_booking(
    state: &AppState,
    identity: &Identity,
    booking_id: Uuid,
) -> Result<Booking, AppError> {
    let booking = state
        .store
        .booking_by_id(booking_id)
        .await?
        .ok_or_else(|| booking_not_found(booking_id))?;

    let organizer_id = match identity.role {
        Role::Customer => None,
        Role::Organizer => state
            .store
            .conference_by_id(booking.conference_id)
            .await?
            .map(|c| c.organizer_id),
    };

    authorize_booking_read(identity, &booking, organizer_id)?;
    Ok(booking)
}

/// Rejects changes that would edit a cancelled booking in place. Reinstating
/// it (moving back to a holding status) is allowed and re-acquires capacity.
fn check_transition(
    current: &Booking,
    tickets_booked: i32,
    status: BookingStatus,
) -> Result<(), AppError> {
    if current.status == BookingStatus::Cancelled
        && status == BookingStatus::Cancelled
        && tickets_booked != current.tickets_booked
    {
        return Err(AppError::Conflict(
            "invalid state transition: a cancelled booking cannot change quantity".to_string(),
        ));
    }
    Ok(())
}

pub async fn update_booking(
    state: &AppState,
    identity: &Identity,
    booking_id: Uuid,
    request: UpdateBookingRequest,
    now: DateTime<Utc>,
) -> Result<Booking, AppError> {
    require_role(identity, Role::Customer)?;

    let status = request
        .status
        .as_deref()
        .map(str::parse::<BookingStatus>)
        .transpose()?;
    if let Some(quantity) = request.tickets_booked {
        validate_quantity(quantity)?;
    }
    if status.is_none() && request.tickets_booked.is_none() {
        return Err(AppError::ValidationError(
            "nothing to update: provide tickets_booked or status".to_string(),
        ));
    }

    let updated = with_timeout(
        state.tx_timeout,
        apply_update(
            state.store.as_ref(),
            identity,
            booking_id,
            request.tickets_booked,
            status,
            now,
        ),
    )
    .await?;

    info!(
        booking_id = %updated.id,
        conference_id = %updated.conference_id,
        tickets = updated.tickets_booked,
        status = ?updated.status,
        "Booking updated"
    );
    Ok(updated)
}

/// Locks the booking's conference row and then the booking row. Conference
/// deletion takes the same two locks in the same order.
async fn lock_in_order(
    uow: &mut dyn UnitOfWork,
    booking_id: Uuid,
) -> Result<(Booking, CapacitySnapshot), AppError> {
    let conference_id = uow
        .booking_conference(booking_id)
        .await?
        .ok_or_else(|| booking_not_found(booking_id))?;
    let capacity = ledger::read_capacity(uow, conference_id).await?;

    // The booking may have gone while we waited for the conference lock.
    let booking = uow
        .lock_booking(booking_id)
        .await?
        .filter(|b| b.conference_id == conference_id)
        .ok_or_else(|| booking_not_found(booking_id))?;
    Ok((booking, capacity))
}

async fn apply_update(
    store: &dyn Store,
    identity: &Identity,
    booking_id: Uuid,
    tickets_booked: Option<i32>,
    status: Option<BookingStatus>,
    now: DateTime<Utc>,
) -> Result<Booking, AppError> {
    let mut uow = store.begin().await?;

    let (current, capacity) = lock_in_order(uow.as_mut(), booking_id).await?;
    ensure_owner(identity, current.user_id, "booking")?;
    window::ensure_mutable(current.created_at, now)?;

    let next_tickets = tickets_booked.unwrap_or(current.tickets_booked);
    let next_status = status.unwrap_or(current.status);
    check_transition(&current, next_tickets, next_status)?;

    let held_before = current.held_tickets();
    let held_after = if next_status.holds_capacity() {
        next_tickets
    } else {
        0
    };

    if held_after != held_before {
        if held_after > held_before && !capacity.is_bookable() {
            return Err(AppError::Conflict("conference not bookable".to_string()));
        }
        ledger::adjust(uow.as_mut(), current.conference_id, held_before, held_after).await?;
    }

    let updated = uow
        .update_booking(booking_id, next_tickets, next_status)
        .await?;
    tickets::allocate(uow.as_mut(), &updated, now).await?;
    uow.commit().await?;

    Ok(updated)
}

/// Releases the held capacity and removes the booking with its tickets.
pub async fn delete_booking(
    state: &AppState,
    identity: &Identity,
    booking_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    require_role(identity, Role::Customer)?;

    let released = with_timeout(
        state.tx_timeout,
        remove_booking(state.store.as_ref(), identity, booking_id, now),
    )
    .await?;

    info!(%booking_id, released, "Booking deleted");
    Ok(())
}

async fn remove_booking(
    store: &dyn Store,
    identity: &Identity,
    booking_id: Uuid,
    now: DateTime<Utc>,
) -> Result<i32, AppError> {
    let mut uow = store.begin().await?;

    let (booking, _) = lock_in_order(uow.as_mut(), booking_id).await?;
    ensure_owner(identity, booking.user_id, "booking")?;
    window::ensure_mutable(booking.created_at, now)?;

    let held = booking.held_tickets();
    if held > 0 {
        ledger::release(uow.as_mut(), booking.conference_id, held).await?;
    }

    if !uow.delete_booking(booking_id).await? {
        return Err(booking_not_found(booking_id));
    }
    uow.commit().await?;
    Ok(held)
}
