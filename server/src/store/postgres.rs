use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::models::{
    Booking, BookingStatus, Conference, ConferenceChanges, ConferenceStatus, NewBooking,
    NewConference, NewUser, Ticket, User,
};
use crate::store::{CapacitySnapshot, Store, StoreError, UnitOfWork};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unique_on(field: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |err| match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::UniqueViolation(field.to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, first_name, last_name, email, role, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, first_name, last_name, email, role, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(user.role)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(unique_on("email"))
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, role, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, role, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_user_names(
        &self,
        id: Uuid,
        first_name: &str,
        last_name: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3
            WHERE id = $1
            RETURNING id, first_name, last_name, email, role, password_hash, created_at
            "#,
        )
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_conference(&self, conference: NewConference) -> Result<Conference, StoreError> {
        let created = sqlx::query_as::<_, Conference>(
            r#"
            INSERT INTO conferences
                (id, title, description, location, event_time,
                 total_tickets, available_tickets, organizer_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $8)
            RETURNING id, title, description, location, event_time,
                      total_tickets, available_tickets, organizer_id, status, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&conference.title)
        .bind(&conference.description)
        .bind(&conference.location)
        .bind(conference.event_time)
        .bind(conference.total_tickets)
        .bind(conference.organizer_id)
        .bind(ConferenceStatus::Ongoing)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn conference_by_id(&self, id: Uuid) -> Result<Option<Conference>, StoreError> {
        let conference = sqlx::query_as::<_, Conference>(
            r#"
            SELECT id, title, description, location, event_time,
                   total_tickets, available_tickets, organizer_id, status, created_at
            FROM conferences
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conference)
    }

    async fn conferences_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Conference>, StoreError> {
        let conferences = sqlx::query_as::<_, Conference>(
            r#"
            SELECT id, title, description, location, event_time,
                   total_tickets, available_tickets, organizer_id, status, created_at
            FROM conferences
            WHERE event_time BETWEEN $1 AND $2
            ORDER BY event_time
            "#,
        )
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;
        Ok(conferences)
    }

    async fn booking_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            SELECT id, user_id, conference_id, tickets_booked, status, created_at
            FROM bookings
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn ticket_by_id(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let ticket = sqlx::query_as::<_, Ticket>(
            "SELECT id, booking_id, ticket_code, issued_at FROM tickets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    async fn bookings_with_ticket_drift(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT b.id
            FROM bookings b
            LEFT JOIN tickets t ON t.booking_id = b.id
            GROUP BY b.id, b.status, b.tickets_booked
            HAVING COUNT(t.id) <> CASE WHEN b.status = 'completed' THEN b.tickets_booked ELSE 0 END
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

/// One database transaction. Dropping it without `commit` rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_conference(&mut self, id: Uuid) -> Result<Option<CapacitySnapshot>, StoreError> {
        let row = sqlx::query_as::<_, (String, i32, i32, ConferenceStatus, Uuid)>(
            r#"
            SELECT title, available_tickets, total_tickets, status, organizer_id
            FROM conferences
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|(title, available, total, status, organizer_id)| CapacitySnapshot {
            title,
            available,
            total,
            status,
            organizer_id,
        }))
    }

    async fn decrement_available(&mut self, id: Uuid, amount: i32) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE conferences
            SET available_tickets = available_tickets - $2
            WHERE id = $1 AND available_tickets >= $2
            "#,
        )
        .bind(id)
        .bind(amount)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn increment_available(&mut self, id: Uuid, amount: i32) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE conferences
            SET available_tickets = available_tickets + $2
            WHERE id = $1 AND available_tickets + $2 <= total_tickets
            "#,
        )
        .bind(id)
        .bind(amount)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_conference(
        &mut self,
        id: Uuid,
        changes: ConferenceChanges,
    ) -> Result<Option<Conference>, StoreError> {
        let updated = sqlx::query_as::<_, Conference>(
            r#"
            UPDATE conferences
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                location = COALESCE($4, location),
                event_time = COALESCE($5, event_time),
                status = COALESCE($6, status)
            WHERE id = $1
            RETURNING id, title, description, location, event_time,
                      total_tickets, available_tickets, organizer_id, status, created_at
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.location)
        .bind(changes.event_time)
        .bind(changes.status)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(updated)
    }

    async fn count_holding_bookings(&mut self, conference_id: Uuid) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bookings WHERE conference_id = $1 AND status <> 'cancelled'",
        )
        .bind(conference_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn delete_conference(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM conferences WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_booking(&mut self, booking: NewBooking) -> Result<Booking, StoreError> {
        let created = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (id, user_id, conference_id, tickets_booked, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, conference_id, tickets_booked, status, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(booking.user_id)
        .bind(booking.conference_id)
        .bind(booking.tickets_booked)
        .bind(booking.status)
        .bind(booking.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(created)
    }

    async fn booking_conference(&mut self, booking_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let conference_id =
            sqlx::query_scalar::<_, Uuid>("SELECT conference_id FROM bookings WHERE id = $1")
                .bind(booking_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(conference_id)
    }

    async fn lock_booking(&mut self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            SELECT id, user_id, conference_id, tickets_booked, status, created_at
            FROM bookings
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(booking)
    }

    async fn update_booking(
        &mut self,
        id: Uuid,
        tickets_booked: i32,
        status: BookingStatus,
    ) -> Result<Booking, StoreError> {
        let updated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET tickets_booked = $2, status = $3
            WHERE id = $1
            RETURNING id, user_id, conference_id, tickets_booked, status, created_at
            "#,
        )
        .bind(id)
        .bind(tickets_booked)
        .bind(status)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(updated)
    }

    async fn delete_booking(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn tickets_for_booking(&mut self, booking_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT id, booking_id, ticket_code, issued_at
            FROM tickets
            WHERE booking_id = $1
            ORDER BY issued_at, id
            "#,
        )
        .bind(booking_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(tickets)
    }

    async fn insert_tickets(
        &mut self,
        booking_id: Uuid,
        codes: &[String],
        issued_at: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, StoreError> {
        let mut tickets = Vec::with_capacity(codes.len());
        for code in codes {
            let ticket = sqlx::query_as::<_, Ticket>(
                r#"
                INSERT INTO tickets (id, booking_id, ticket_code, issued_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id, booking_id, ticket_code, issued_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(booking_id)
            .bind(code)
            .bind(issued_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(unique_on("ticket_code"))?;
            tickets.push(ticket);
        }
        Ok(tickets)
    }

    async fn delete_tickets(&mut self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn update_ticket_code(
        &mut self,
        id: Uuid,
        code: &str,
    ) -> Result<Option<Ticket>, StoreError> {
        sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET ticket_code = $2
            WHERE id = $1
            RETURNING id, booking_id, ticket_code, issued_at
            "#,
        )
        .bind(id)
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(unique_on("ticket_code"))
    }

    async fn user_dependents(&mut self, user_id: Uuid) -> Result<Option<(i64, i64)>, StoreError> {
        let exists = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        // Row locks on every booking of the user, so a concurrent
        // reinstatement either commits first and is counted here or waits.
        let statuses = sqlx::query_scalar::<_, BookingStatus>(
            "SELECT status FROM bookings WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;
        let bookings = statuses
            .iter()
            .filter(|status| **status != BookingStatus::Cancelled)
            .count() as i64;

        let conferences =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM conferences WHERE organizer_id = $1")
                .bind(user_id)
                .fetch_one(&mut *self.tx)
                .await?;

        Ok(Some((bookings, conferences)))
    }

    async fn delete_user(&mut self, id: Uuid) -> Result<bool, StoreError> {
        sqlx::query("DELETE FROM bookings WHERE user_id = $1 AND status = 'cancelled'")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        let result = sqlx::query(
            r#"
            DELETE FROM users
            WHERE id = $1
              AND NOT EXISTS (SELECT 1 FROM bookings WHERE user_id = $1)
            "#,
        )
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
