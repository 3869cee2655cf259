//! Authorization predicates. Pure: they only accept or reject.
//!
//! Callers authenticate first (the [`AuthUser`](super::AuthUser) extractor),
//! then check role, then load the resource (`NotFound`) and finally check
//! ownership.

use uuid::Uuid;

use crate::auth::Identity;
use crate::models::{Booking, Role};
use crate::utils::error::AppError;

pub fn require_role(identity: &Identity, role: Role) -> Result<(), AppError> {
    if identity.role == role {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "only a {role} may perform this action"
        )))
    }
}

pub fn ensure_owner(identity: &Identity, owner_id: Uuid, resource: &str) -> Result<(), AppError> {
    if identity.user_id == owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("not your {resource}")))
    }
}

/// Customers read their own bookings; organizers read bookings made for
/// conferences they own.
pub fn authorize_booking_read(
    identity: &Identity,
    booking: &Booking,
    conference_organizer_id: Option<Uuid>,
) -> Result<(), AppError> {
    match identity.role {
        Role::Customer => ensure_owner(identity, booking.user_id, "booking"),
        Role::Organizer => match conference_organizer_id {
            Some(organizer_id) => ensure_owner(identity, organizer_id, "conference"),
            None => Err(AppError::Forbidden("not your conference".to_string())),
        },
    }
}
