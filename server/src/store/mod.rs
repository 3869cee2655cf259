//! Persistence boundary.
//!
//! [`Store`] covers single-statement reads and writes. Anything that must be
//! all-or-nothing goes through a [`UnitOfWork`] obtained from
//! [`Store::begin`]: dropping a unit of work without calling
//! [`UnitOfWork::commit`] rolls back every write made through it.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Booking, BookingStatus, Conference, ConferenceChanges, ConferenceStatus, NewBooking,
    NewConference, NewUser, Ticket, User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write; carries the field name.
    #[error("unique constraint violated on {0}")]
    UniqueViolation(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Capacity Ledger view of a conference, read inside a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacitySnapshot {
    pub title: String,
    pub available: i32,
    pub total: i32,
    pub status: ConferenceStatus,
    pub organizer_id: Uuid,
}

impl CapacitySnapshot {
    /// Only ongoing conferences accept new or larger bookings.
    pub fn is_bookable(&self) -> bool {
        self.status == ConferenceStatus::Ongoing
    }
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn update_user_names(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn insert_conference(&self, conference: NewConference) -> Result<Conference, StoreError>;
    async fn conference_by_id(&self, id: Uuid) -> Result<Option<Conference>, StoreError>;
    async fn conferences_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Conference>, StoreError>;

    async fn booking_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;
    async fn ticket_by_id(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;

    /// Bookings whose issued-ticket count differs from what their status
    /// calls for.
    async fn bookings_with_ticket_drift(&self, limit: i64) -> Result<Vec<Uuid>, StoreError>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    /// Reads the ledger row and locks it until the unit of work ends.
    async fn lock_conference(&mut self, id: Uuid) -> Result<Option<CapacitySnapshot>, StoreError>;

    /// `available -= amount` only if `available >= amount`. Returns whether
    /// the row was updated.
    async fn decrement_available(&mut self, id: Uuid, amount: i32) -> Result<bool, StoreError>;

    /// `available += amount` only if the result stays within `total`.
    async fn increment_available(&mut self, id: Uuid, amount: i32) -> Result<bool, StoreError>;

    /// Writes only the fields set in `changes`.
    async fn update_conference(
        &mut self,
        id: Uuid,
        changes: ConferenceChanges,
    ) -> Result<Option<Conference>, StoreError>;
    async fn count_holding_bookings(&mut self, conference_id: Uuid) -> Result<i64, StoreError>;
    async fn delete_conference(&mut self, id: Uuid) -> Result<bool, StoreError>;

    async fn insert_booking(&mut self, booking: NewBooking) -> Result<Booking, StoreError>;
    /// Conference of a booking, read without taking any lock.
    async fn booking_conference(&mut self, booking_id: Uuid) -> Result<Option<Uuid>, StoreError>;
    async fn lock_booking(&mut self, id: Uuid) -> Result<Option<Booking>, StoreError>;
    async fn update_booking(
        &mut self,
        id: Uuid,
        tickets_booked: i32,
        status: BookingStatus,
    ) -> Result<Booking, StoreError>;
    async fn delete_booking(&mut self, id: Uuid) -> Result<bool, StoreError>;

    /// Tickets of a booking, oldest first.
    async fn tickets_for_booking(&mut self, booking_id: Uuid) -> Result<Vec<Ticket>, StoreError>;
    async fn insert_tickets(
        &mut self,
        booking_id: Uuid,
        codes: &[String],
        issued_at: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, StoreError>;
    async fn delete_tickets(&mut self, ids: &[Uuid]) -> Result<u64, StoreError>;
    async fn update_ticket_code(
        &mut self,
        id: Uuid,
        code: &str,
    ) -> Result<Option<Ticket>, StoreError>;

    /// Locks the user row and every booking of the user, then reports how
    /// many non-cancelled bookings and organized conferences reference it.
    async fn user_dependents(&mut self, user_id: Uuid) -> Result<Option<(i64, i64)>, StoreError>;
    /// Removes the user with its cancelled bookings. Returns `false`, leaving
    /// the user in place, if any other booking still references it.
    async fn delete_user(&mut self, id: Uuid) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
