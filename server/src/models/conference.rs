use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "conference_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConferenceStatus {
    Ongoing,
    Completed,
    Cancelled,
}

impl FromStr for ConferenceStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ongoing" => Ok(ConferenceStatus::Ongoing),
            "completed" => Ok(ConferenceStatus::Completed),
            "cancelled" => Ok(ConferenceStatus::Cancelled),
            other => Err(AppError::ValidationError(format!(
                "invalid conference status '{other}': must be ongoing, completed or cancelled"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conference {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub event_time: DateTime<Utc>,
    pub total_tickets: i32,
    pub available_tickets: i32,
    pub organizer_id: Uuid,
    pub status: ConferenceStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConference {
    pub title: String,
    pub description: String,
    pub location: String,
    pub event_time: DateTime<Utc>,
    pub total_tickets: i32,
    pub organizer_id: Uuid,
}

/// Organizer-editable fields; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct ConferenceChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    pub status: Option<ConferenceStatus>,
}
