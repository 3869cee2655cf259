//! Ticket Allocator.
//!
//! A `completed` booking owns exactly `tickets_booked` tickets and any other
//! booking owns none. [`allocate`] moves a booking's ticket set toward that
//! target and is idempotent, so it can run inside the booking's own unit of
//! work, on read, and from the background sweep without coordination.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::gate::{ensure_owner, require_role};
use crate::auth::Identity;
use crate::models::{Booking, Role, Ticket};
use crate::services::{window, with_timeout};
use crate::state::AppState;
use crate::store::{Store, UnitOfWork};
use crate::utils::error::AppError;

pub const TICKET_CODE_PREFIX: &str = "tkt-";
const SWEEP_BATCH: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub ticket_code: String,
}

/// Random v4 UUIDs, so codes stay unique across processes without a shared
/// counter. The `UNIQUE(ticket_code)` constraint has the final say.
pub fn generate_codes(count: usize) -> Vec<String> {
    (0..count)
        .map(|_| format!("{TICKET_CODE_PREFIX}{}", Uuid::new_v4().simple()))
        .collect()
}

/// Issues missing tickets or revokes surplus ones (newest first) and returns
/// the resulting set, oldest first.
pub async fn allocate(
    uow: &mut dyn UnitOfWork,
    booking: &Booking,
    now: DateTime<Utc>,
) -> Result<Vec<Ticket>, AppError> {
    let mut tickets = uow.tickets_for_booking(booking.id).await?;
    let target = booking.expected_ticket_count();

    if tickets.len() < target {
        let codes = generate_codes(target - tickets.len());
        let issued = uow.insert_tickets(booking.id, &codes, now).await?;
        debug!(booking_id = %booking.id, issued = issued.len(), "Tickets issued");
        tickets.extend(issued);
    } else if tickets.len() > target {
        let surplus: Vec<Uuid> = tickets.split_off(target).iter().map(|t| t.id).collect();
        let revoked = uow.delete_tickets(&surplus).await?;
        debug!(booking_id = %booking.id, revoked, "Tickets revoked");
    }

    Ok(tickets)
}

/// Reconciles one booking in its own unit of work. `None` if the booking no
/// longer exists.
pub async fn reconcile_booking(
    store: &dyn Store,
    booking_id: Uuid,
) -> Result<Option<Vec<Ticket>>, AppError> {
    let mut uow = store.begin().await?;
    let Some(booking) = uow.lock_booking(booking_id).await? else {
        return Ok(None);
    };
    let tickets = allocate(uow.as_mut(), &booking, Utc::now()).await?;
    uow.commit().await?;
    Ok(Some(tickets))
}

/// One sweep over bookings whose ticket count drifted from their target.
/// Returns how many were repaired.
pub async fn reconcile_pending(store: &dyn Store, limit: i64) -> Result<usize, AppError> {
    let drifted = store.bookings_with_ticket_drift(limit).await?;
    let mut repaired = 0;

    for booking_id in drifted {
        match reconcile_booking(store, booking_id).await {
            Ok(Some(_)) => repaired += 1,
            Ok(None) => {}
            Err(e) => warn!(%booking_id, error = %e, "Ticket reconciliation failed"),
        }
    }

    if repaired > 0 {
        info!(repaired, "Reconciled ticket sets");
    }
    Ok(repaired)
}

pub fn spawn_reconciler(state: AppState, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let sweep = reconcile_pending(state.store.as_ref(), SWEEP_BATCH);
            if let Err(e) = with_timeout(state.tx_timeout * 4, sweep).await {
                warn!(error = %e, "Ticket reconciliation sweep failed");
            }
        }
    })
}

/// Owning customer only. Repairs the ticket set before returning it.
pub async fn tickets_for_booking(
    state: &AppState,
    identity: &Identity,
    booking_id: Uuid,
) -> Result<Vec<Ticket>, AppError> {
    require_role(identity, Role::Customer)?;
    with_timeout(
        state.tx_timeout,
        owned_tickets(state.store.as_ref(), identity, booking_id),
    )
    .await
}

async fn owned_tickets(
    store: &dyn Store,
    identity: &Identity,
    booking_id: Uuid,
) -> Result<Vec<Ticket>, AppError> {
    let mut uow = store.begin().await?;
    let booking = uow
        .lock_booking(booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;
    ensure_owner(identity, booking.user_id, "booking")?;

    let tickets = allocate(uow.as_mut(), &booking, Utc::now()).await?;
    uow.commit().await?;
    Ok(tickets)
}

pub fn normalize_code(raw: &str) -> Result<String, AppError> {
    let code = raw.trim().to_lowercase();
    if code.is_empty() {
        return Err(AppError::ValidationError(
            "ticket_code must not be empty".to_string(),
        ));
    }
    Ok(code)
}

pub async fn update_ticket_code(
    state: &AppState,
    identity: &Identity,
    ticket_id: Uuid,
    request: UpdateTicketRequest,
    now: DateTime<Utc>,
) -> Result<Ticket, AppError> {
    require_role(identity, Role::Customer)?;
    let code = normalize_code(&request.ticket_code)?;

    let ticket = state
        .store
        .ticket_by_id(ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("ticket {ticket_id} not found")))?;

    with_timeout(
        state.tx_timeout,
        rewrite_code(state.store.as_ref(), identity, &ticket, &code, now),
    )
    .await
}

async fn rewrite_code(
    store: &dyn Store,
    identity: &Identity,
    ticket: &Ticket,
    code: &str,
    now: DateTime<Utc>,
) -> Result<Ticket, AppError> {
    let not_found = || AppError::NotFound(format!("ticket {} not found", ticket.id));

    let mut uow = store.begin().await?;
    let booking = uow.lock_booking(ticket.booking_id).await?.ok_or_else(not_found)?;
    ensure_owner(identity, booking.user_id, "ticket")?;
    window::ensure_mutable(booking.created_at, now)?;

    let updated = uow
        .update_ticket_code(ticket.id, code)
        .await?
        .ok_or_else(not_found)?;
    uow.commit().await?;

    info!(ticket_id = %ticket.id, booking_id = %booking.id, "Ticket code updated");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::models::{BookingStatus, NewBooking, NewConference};
    use crate::store::MemoryStore;

    #[test]
    fn test_generated_codes_are_distinct() {
        let codes = generate_codes(500);
        let unique: HashSet<&String> = codes.iter().collect();
        assert_eq!(unique.len(), 500);
        assert!(codes.iter().all(|c| c.starts_with(TICKET_CODE_PREFIX) && c.len() == 36));
    }

    #[test]
    fn test_code_normalization() {
        assert_eq!(normalize_code("  VIP-Front ").unwrap(), "vip-front");
        assert!(matches!(normalize_code("   "), Err(AppError::ValidationError(_))));
    }

    async fn seeded_booking(store: &MemoryStore, tickets: i32) -> Booking {
        let conference = store
            .insert_conference(NewConference {
                title: "RustConf".to_string(),
                description: String::new(),
                location: "Portland".to_string(),
                event_time: Utc::now(),
                total_tickets: 50,
                organizer_id: Uuid::new_v4(),
            })
            .await
            .unwrap();

        let mut uow = store.begin().await.unwrap();
        let booking = uow
            .insert_booking(NewBooking {
                user_id: Uuid::new_v4(),
                conference_id: conference.id,
                tickets_booked: tickets,
                status: BookingStatus::Completed,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        uow.commit().await.unwrap();
        booking
    }

    #[tokio::test]
    async fn test_allocate_is_idempotent() {
        let store = MemoryStore::new();
        let booking = seeded_booking(&store, 3).await;

        let mut uow = store.begin().await.unwrap();
        let first = allocate(uow.as_mut(), &booking, Utc::now()).await.unwrap();
        let second = allocate(uow.as_mut(), &booking, Utc::now()).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(first.len(), 3);
        let first_ids: HashSet<Uuid> = first.iter().map(|t| t.id).collect();
        let second_ids: HashSet<Uuid> = second.iter().map(|t| t.id).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(store.ticket_count().await, 3);
    }

    #[tokio::test]
    async fn test_allocate_revokes_for_cancelled_booking() {
        let store = MemoryStore::new();
        let mut booking = seeded_booking(&store, 2).await;

        let mut uow = store.begin().await.unwrap();
        allocate(uow.as_mut(), &booking, Utc::now()).await.unwrap();
        booking.status = BookingStatus::Cancelled;
        let left = allocate(uow.as_mut(), &booking, Utc::now()).await.unwrap();
        uow.commit().await.unwrap();

        assert!(left.is_empty());
        assert_eq!(store.ticket_count().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_repairs_missing_tickets() {
        let store = MemoryStore::new();
        let booking = seeded_booking(&store, 4).await;
        assert_eq!(store.ticket_count().await, 0);

        let repaired = reconcile_pending(&store, 10).await.unwrap();
        assert_eq!(repaired, 1);
        assert_eq!(store.ticket_count().await, 4);

        assert_eq!(store.drop_tickets_of(booking.id).await, 4);
        reconcile_pending(&store, 10).await.unwrap();
        assert_eq!(store.ticket_count().await, 4);

        // Nothing left to do.
        assert_eq!(reconcile_pending(&store, 10).await.unwrap(), 0);
    }
}
