use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Completed,
    Cancelled,
    Failed,
}

impl BookingStatus {
    /// Every status except `cancelled` keeps its seats out of the pool.
    pub fn holds_capacity(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

impl FromStr for BookingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "failed" => Ok(BookingStatus::Failed),
            other => Err(AppError::ValidationError(format!(
                "invalid booking status '{other}': must be completed, cancelled or failed"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub conference_id: Uuid,
    pub tickets_booked: i32,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Seats this booking currently takes from the conference.
    pub fn held_tickets(&self) -> i32 {
        if self.status.holds_capacity() {
            self.tickets_booked
        } else {
            0
        }
    }

    /// Number of tickets that should exist for this booking.
    pub fn expected_ticket_count(&self) -> usize {
        match self.status {
            BookingStatus::Completed => usize::try_from(self.tickets_booked).unwrap_or(0),
            BookingStatus::Cancelled | BookingStatus::Failed => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: Uuid,
    pub conference_id: Uuid,
    pub tickets_booked: i32,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(status: BookingStatus, tickets: i32) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            conference_id: Uuid::new_v4(),
            tickets_booked: tickets,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_cancelled_booking_releases_capacity() {
        assert_eq!(booking(BookingStatus::Completed, 3).held_tickets(), 3);
        assert_eq!(booking(BookingStatus::Failed, 3).held_tickets(), 3);
        assert_eq!(booking(BookingStatus::Cancelled, 3).held_tickets(), 0);
    }

    #[test]
    fn test_only_completed_bookings_carry_tickets() {
        assert_eq!(booking(BookingStatus::Completed, 4).expected_ticket_count(), 4);
        assert_eq!(booking(BookingStatus::Failed, 4).expected_ticket_count(), 0);
        assert_eq!(booking(BookingStatus::Cancelled, 4).expected_ticket_count(), 0);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(" CANCELLED ".parse::<BookingStatus>().unwrap(), BookingStatus::Cancelled);
        assert!(matches!(
            "refunded".parse::<BookingStatus>(),
            Err(AppError::ValidationError(_))
        ));
    }
}
