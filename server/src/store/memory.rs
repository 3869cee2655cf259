//! In-process store used by the test suites and for running the server
//! without PostgreSQL.
//!
//! A unit of work holds the table lock for its whole lifetime and writes to a
//! private copy that replaces the shared tables on commit, so units of work
//! are serializable and an uncommitted one leaves no trace.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::{
    Booking, BookingStatus, Conference, ConferenceChanges, ConferenceStatus, NewBooking,
    NewConference, NewUser, Ticket, User,
};
use crate::store::{CapacitySnapshot, Store, StoreError, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    conferences: HashMap<Uuid, Conference>,
    bookings: HashMap<Uuid, Booking>,
    tickets: HashMap<Uuid, Ticket>,
}

impl Tables {
    fn email_taken(&self, email: &str) -> bool {
        self.users.values().any(|u| u.email == email)
    }

    fn code_taken(&self, code: &str, except: Option<Uuid>) -> bool {
        self.tickets
            .values()
            .any(|t| t.ticket_code == code && Some(t.id) != except)
    }

    fn tickets_of(&self, booking_id: Uuid) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .values()
            .filter(|t| t.booking_id == booking_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.id.cmp(&b.id)));
        tickets
    }

    fn remove_booking(&mut self, id: Uuid) -> bool {
        self.tickets.retain(|_, t| t.booking_id != id);
        self.bookings.remove(&id).is_some()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total tickets issued across all bookings.
    pub async fn ticket_count(&self) -> usize {
        self.tables.lock().await.tickets.len()
    }

    /// Removes tickets of a booking without touching the booking, leaving
    /// the kind of gap the reconciler repairs.
    pub async fn drop_tickets_of(&self, booking_id: Uuid) -> usize {
        let mut tables = self.tables.lock().await;
        let before = tables.tickets.len();
        tables.tickets.retain(|_, t| t.booking_id != booking_id);
        before - tables.tickets.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.email_taken(&user.email) {
            return Err(StoreError::UniqueViolation("email".to_string()));
        }
        let created = User {
            id: Uuid::new_v4(),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user_names(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.users.get_mut(&id).map(|user| {
            user.first_name = first_name.to_string();
            user.last_name = last_name.to_string();
            user.clone()
        }))
    }

    async fn insert_conference(&self, conference: NewConference) -> Result<Conference, StoreError> {
        let created = Conference {
            id: Uuid::new_v4(),
            title: conference.title,
            description: conference.description,
            location: conference.location,
            event_time: conference.event_time,
            total_tickets: conference.total_tickets,
            available_tickets: conference.total_tickets,
            organizer_id: conference.organizer_id,
            status: ConferenceStatus::Ongoing,
            created_at: Utc::now(),
        };
        self.tables
            .lock()
            .await
            .conferences
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn conference_by_id(&self, id: Uuid) -> Result<Option<Conference>, StoreError> {
        Ok(self.tables.lock().await.conferences.get(&id).cloned())
    }

    async fn conferences_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Conference>, StoreError> {
        let tables = self.tables.lock().await;
        let mut found: Vec<Conference> = tables
            .conferences
            .values()
            .filter(|c| c.event_time >= from && c.event_time <= until)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.event_time);
        Ok(found)
    }

    async fn booking_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.tables.lock().await.bookings.get(&id).cloned())
    }

    async fn ticket_by_id(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        Ok(self.tables.lock().await.tickets.get(&id).cloned())
    }

    async fn bookings_with_ticket_drift(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.tables.lock().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(tables
            .bookings
            .values()
            .filter(|b| tables.tickets_of(b.id).len() != b.expected_ticket_count())
            .map(|b| b.id)
            .take(limit)
            .collect())
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_conference(&mut self, id: Uuid) -> Result<Option<CapacitySnapshot>, StoreError> {
        Ok(self.working.conferences.get(&id).map(|c| CapacitySnapshot {
            title: c.title.clone(),
            available: c.available_tickets,
            total: c.total_tickets,
            status: c.status,
            organizer_id: c.organizer_id,
        }))
    }

    async fn decrement_available(&mut self, id: Uuid, amount: i32) -> Result<bool, StoreError> {
        match self.working.conferences.get_mut(&id) {
            Some(c) if c.available_tickets >= amount => {
                c.available_tickets -= amount;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_available(&mut self, id: Uuid, amount: i32) -> Result<bool, StoreError> {
        match self.working.conferences.get_mut(&id) {
            Some(c) if c.available_tickets + amount <= c.total_tickets => {
                c.available_tickets += amount;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_conference(
        &mut self,
        id: Uuid,
        changes: ConferenceChanges,
    ) -> Result<Option<Conference>, StoreError> {
        Ok(self.working.conferences.get_mut(&id).map(|conference| {
            if let Some(title) = changes.title {
                conference.title = title;
            }
            if let Some(description) = changes.description {
                conference.description = description;
            }
            if let Some(location) = changes.location {
                conference.location = location;
            }
            if let Some(event_time) = changes.event_time {
                conference.event_time = event_time;
            }
            if let Some(status) = changes.status {
                conference.status = status;
            }
            conference.clone()
        }))
    }

    async fn count_holding_bookings(&mut self, conference_id: Uuid) -> Result<i64, StoreError> {
        let count = self
            .working
            .bookings
            .values()
            .filter(|b| b.conference_id == conference_id && b.status.holds_capacity())
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn delete_conference(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let booking_ids: Vec<Uuid> = self
            .working
            .bookings
            .values()
            .filter(|b| b.conference_id == id)
            .map(|b| b.id)
            .collect();
        for booking_id in booking_ids {
            self.working.remove_booking(booking_id);
        }
        Ok(self.working.conferences.remove(&id).is_some())
    }

    async fn insert_booking(&mut self, booking: NewBooking) -> Result<Booking, StoreError> {
        let created = Booking {
            id: Uuid::new_v4(),
            user_id: booking.user_id,
            conference_id: booking.conference_id,
            tickets_booked: booking.tickets_booked,
            status: booking.status,
            created_at: booking.created_at,
        };
        self.working.bookings.insert(created.id, created.clone());
        Ok(created)
    }

    async fn booking_conference(&mut self, booking_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        Ok(self.working.bookings.get(&booking_id).map(|b| b.conference_id))
    }

    async fn lock_booking(&mut self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.working.bookings.get(&id).cloned())
    }

    async fn update_booking(
        &mut self,
        id: Uuid,
        tickets_booked: i32,
        status: BookingStatus,
    ) -> Result<Booking, StoreError> {
        let booking = self
            .working
            .bookings
            .get_mut(&id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        booking.tickets_booked = tickets_booked;
        booking.status = status;
        Ok(booking.clone())
    }

    async fn delete_booking(&mut self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.working.remove_booking(id))
    }

    async fn tickets_for_booking(&mut self, booking_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        Ok(self.working.tickets_of(booking_id))
    }

    async fn insert_tickets(
        &mut self,
        booking_id: Uuid,
        codes: &[String],
        issued_at: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, StoreError> {
        let mut tickets = Vec::with_capacity(codes.len());
        for code in codes {
            if self.working.code_taken(code, None) {
                return Err(StoreError::UniqueViolation("ticket_code".to_string()));
            }
            let ticket = Ticket {
                id: Uuid::new_v4(),
                booking_id,
                ticket_code: code.clone(),
                issued_at,
            };
            self.working.tickets.insert(ticket.id, ticket.clone());
            tickets.push(ticket);
        }
        Ok(tickets)
    }

    async fn delete_tickets(&mut self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let removed = ids
            .iter()
            .filter(|id| self.working.tickets.remove(*id).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn update_ticket_code(
        &mut self,
        id: Uuid,
        code: &str,
    ) -> Result<Option<Ticket>, StoreError> {
        if self.working.code_taken(code, Some(id)) {
            return Err(StoreError::UniqueViolation("ticket_code".to_string()));
        }
        Ok(self.working.tickets.get_mut(&id).map(|ticket| {
            ticket.ticket_code = code.to_string();
            ticket.clone()
        }))
    }

    async fn user_dependents(&mut self, user_id: Uuid) -> Result<Option<(i64, i64)>, StoreError> {
        if !self.working.users.contains_key(&user_id) {
            return Ok(None);
        }
        let bookings = self
            .working
            .bookings
            .values()
            .filter(|b| b.user_id == user_id && b.status.holds_capacity())
            .count();
        let conferences = self
            .working
            .conferences
            .values()
            .filter(|c| c.organizer_id == user_id)
            .count();
        Ok(Some((bookings as i64, conferences as i64)))
    }

    async fn delete_user(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let booking_ids: Vec<Uuid> = self
            .working
            .bookings
            .values()
            .filter(|b| b.user_id == id && b.status == BookingStatus::Cancelled)
            .map(|b| b.id)
            .collect();
        for booking_id in booking_ids {
            self.working.remove_booking(booking_id);
        }
        if self.working.bookings.values().any(|b| b.user_id == id) {
            return Ok(false);
        }
        Ok(self.working.users.remove(&id).is_some())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
