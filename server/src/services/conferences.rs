use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::gate::{ensure_owner, require_role};
use crate::auth::Identity;
use crate::models::{Conference, ConferenceChanges, ConferenceStatus, NewConference, Role};
use crate::services::{ledger, with_timeout};
use crate::state::AppState;
use crate::store::Store;
use crate::utils::error::AppError;

pub const DEFAULT_UPCOMING_DAYS: i64 = 30;
pub const MAX_UPCOMING_DAYS: i64 = 90;

#[derive(Debug, Deserialize)]
pub struct CreateConferenceRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub location: String,
    /// RFC 3339, e.g. `2026-09-01T09:00:00Z`.
    pub event_time: String,
    pub total_tickets: i32,
}

/// Omitted fields keep their current value.
#[derive(Debug, Deserialize)]
pub struct UpdateConferenceRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub event_time: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    pub days: Option<String>,
}

fn non_empty(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub fn parse_event_time(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            AppError::ValidationError(
                "invalid event_time: expected RFC 3339, e.g. 2026-09-01T09:00:00Z".to_string(),
            )
        })
}

/// `None` means the default window. Accepts 1..=90.
pub fn parse_days(raw: Option<&str>) -> Result<i64, AppError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_UPCOMING_DAYS);
    };
    let days = raw.trim().parse::<i64>().map_err(|_| {
        AppError::ValidationError(format!("invalid days '{raw}': must be an integer"))
    })?;
    if days <= 0 || days > MAX_UPCOMING_DAYS {
        return Err(AppError::ValidationError(format!(
            "days must be between 1 and {MAX_UPCOMING_DAYS}"
        )));
    }
    Ok(days)
}

fn conference_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("conference {id} not found"))
}

pub async fn create_conference(
    state: &AppState,
    identity: &Identity,
    request: CreateConferenceRequest,
) -> Result<Conference, AppError> {
    require_role(identity, Role::Organizer)?;

    let title = non_empty("title", &request.title)?;
    let location = non_empty("location", &request.location)?;
    let event_time = parse_event_time(&request.event_time)?;
    if request.total_tickets <= 0 {
        return Err(AppError::ValidationError(
            "total_tickets must be greater than 0".to_string(),
        ));
    }

    let conference = state
        .store
        .insert_conference(NewConference {
            title,
            description: request.description.trim().to_string(),
            location,
            event_time,
            total_tickets: request.total_tickets,
            organizer_id: identity.user_id,
        })
        .await?;

    info!(
        conference_id = %conference.id,
        organizer_id = %identity.user_id,
        tickets = conference.total_tickets,
        "Conference created"
    );
    Ok(conference)
}

pub async fn get_conference(state: &AppState, id: Uuid) -> Result<Conference, AppError> {
    state
        .store
        .conference_by_id(id)
        .await?
        .ok_or_else(|| conference_not_found(id))
}

/// Conferences whose event time falls within the next `days` days.
pub async fn upcoming_conferences(
    state: &AppState,
    days: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<Conference>, AppError> {
    let days = parse_days(days)?;
    let conferences = state
        .store
        .conferences_between(now, now + Duration::days(days))
        .await?;
    Ok(conferences)
}

pub async fn update_conference(
    state: &AppState,
    identity: &Identity,
    id: Uuid,
    request: UpdateConferenceRequest,
) -> Result<Conference, AppError> {
    require_role(identity, Role::Organizer)?;

    // Everything is validated before the first read.
    let title = request.title.as_deref().map(|t| non_empty("title", t)).transpose()?;
    let location = request
        .location
        .as_deref()
        .map(|l| non_empty("location", l))
        .transpose()?;
    let event_time = request.event_time.as_deref().map(parse_event_time).transpose()?;
    let status = request
        .status
        .as_deref()
        .map(str::parse::<ConferenceStatus>)
        .transpose()?;

    let changes = ConferenceChanges {
        title,
        description: request.description.map(|d| d.trim().to_string()),
        location,
        event_time,
        status,
    };

    let updated = with_timeout(
        state.tx_timeout,
        revise_conference(state.store.as_ref(), identity, id, changes),
    )
    .await?;

    info!(conference_id = %id, status = ?updated.status, "Conference updated");
    Ok(updated)
}

async fn revise_conference(
    store: &dyn Store,
    identity: &Identity,
    id: Uuid,
    changes: ConferenceChanges,
) -> Result<Conference, AppError> {
    let mut uow = store.begin().await?;

    let capacity = ledger::read_capacity(uow.as_mut(), id).await?;
    ensure_owner(identity, capacity.organizer_id, "conference")?;

    let updated = uow
        .update_conference(id, changes)
        .await?
        .ok_or_else(|| conference_not_found(id))?;
    uow.commit().await?;
    Ok(updated)
}

/// Refused while any booking still holds capacity. Cancelled bookings and
/// their tickets go with the conference.
pub async fn delete_conference(
    state: &AppState,
    identity: &Identity,
    id: Uuid,
) -> Result<(), AppError> {
    require_role(identity, Role::Organizer)?;
    with_timeout(
        state.tx_timeout,
        remove_conference(state.store.as_ref(), identity, id),
    )
    .await?;

    info!(conference_id = %id, "Conference deleted");
    Ok(())
}

async fn remove_conference(
    store: &dyn Store,
    identity: &Identity,
    id: Uuid,
) -> Result<(), AppError> {
    let mut uow = store.begin().await?;

    let capacity = ledger::read_capacity(uow.as_mut(), id).await?;
    ensure_owner(identity, capacity.organizer_id, "conference")?;

    let holding = uow.count_holding_bookings(id).await?;
    if holding > 0 {
        return Err(AppError::Conflict(format!(
            "conference has {holding} active booking(s); they must be cancelled first"
        )));
    }

    if !uow.delete_conference(id).await? {
        return Err(conference_not_found(id));
    }
    uow.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::auth::ClaimIssuer;
    use crate::services::bookings::{self, CreateBookingRequest};
    use crate::store::MemoryStore;

    fn state(store: &MemoryStore) -> AppState {
        AppState::new(
            Arc::new(store.clone()),
            ClaimIssuer::new("conference-tests-secret-0123456789abcdef").unwrap(),
            std::time::Duration::from_secs(5),
        )
    }

    fn organizer() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            role: Role::Organizer,
        }
    }

    fn create_request(event_time: &str, total_tickets: i32) -> CreateConferenceRequest {
        CreateConferenceRequest {
            title: "RustConf".to_string(),
            description: "Systems programming".to_string(),
            location: "Portland".to_string(),
            event_time: event_time.to_string(),
            total_tickets,
        }
    }

    #[test]
    fn test_days_parameter() {
        assert_eq!(parse_days(None).unwrap(), DEFAULT_UPCOMING_DAYS);
        assert_eq!(parse_days(Some("90")).unwrap(), 90);
        assert!(matches!(parse_days(Some("0")), Err(AppError::ValidationError(_))));
        assert!(matches!(parse_days(Some("91")), Err(AppError::ValidationError(_))));
        assert!(matches!(parse_days(Some("soon")), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_event_time_must_be_rfc3339() {
        assert!(parse_event_time("2026-09-01T09:00:00+02:00").is_ok());
        assert!(matches!(
            parse_event_time("2026-09-01 09:00"),
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_created_conference_is_full_and_ongoing() {
        let store = MemoryStore::new();
        let state = state(&store);

        let conference = create_conference(&state, &organizer(), create_request("2030-01-01T10:00:00Z", 50))
            .await
            .unwrap();

        assert_eq!(conference.available_tickets, 50);
        assert_eq!(conference.status, ConferenceStatus::Ongoing);
    }

    #[tokio::test]
    async fn test_customer_cannot_create() {
        let store = MemoryStore::new();
        let customer = Identity {
            user_id: Uuid::new_v4(),
            role: Role::Customer,
        };
        let err = create_conference(&state(&store), &customer, create_request("2030-01-01T10:00:00Z", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_zero_capacity_rejected() {
        let store = MemoryStore::new();
        let err = create_conference(&state(&store), &organizer(), create_request("2030-01-01T10:00:00Z", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_only_owner_updates() {
        let store = MemoryStore::new();
        let state = state(&store);
        let owner = organizer();
        let conference = create_conference(&state, &owner, create_request("2030-01-01T10:00:00Z", 5))
            .await
            .unwrap();

        let change = || UpdateConferenceRequest {
            title: None,
            description: None,
            location: Some("Montreal".to_string()),
            event_time: None,
            status: Some("completed".to_string()),
        };

        let err = update_conference(&state, &organizer(), conference.id, change())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let updated = update_conference(&state, &owner, conference.id, change()).await.unwrap();
        assert_eq!(updated.location, "Montreal");
        assert_eq!(updated.status, ConferenceStatus::Completed);
        assert_eq!(updated.title, "RustConf");
    }

    #[tokio::test]
    async fn test_concurrent_partial_updates_both_land() {
        let store = MemoryStore::new();
        let state = state(&store);
        let owner = organizer();
        let conference = create_conference(&state, &owner, create_request("2030-01-01T10:00:00Z", 5))
            .await
            .unwrap();

        let retitle = UpdateConferenceRequest {
            title: Some("RustConf EU".to_string()),
            description: None,
            location: None,
            event_time: None,
            status: None,
        };
        let relocate = UpdateConferenceRequest {
            title: None,
            description: None,
            location: Some("Montreal".to_string()),
            event_time: None,
            status: None,
        };
        let (a, b) = tokio::join!(
            update_conference(&state, &owner, conference.id, retitle),
            update_conference(&state, &owner, conference.id, relocate),
        );
        a.unwrap();
        b.unwrap();

        let stored = get_conference(&state, conference.id).await.unwrap();
        assert_eq!(stored.title, "RustConf EU");
        assert_eq!(stored.location, "Montreal");
        assert_eq!(stored.description, "Systems programming");
    }

    #[tokio::test]
    async fn test_update_of_missing_conference_is_not_found() {
        let store = MemoryStore::new();
        let err = update_conference(
            &state(&store),
            &organizer(),
            Uuid::new_v4(),
            UpdateConferenceRequest {
                title: Some("Ghost".to_string()),
                description: None,
                location: None,
                event_time: None,
                status: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upcoming_window() {
        let store = MemoryStore::new();
        let state = state(&store);
        let owner = organizer();
        let now = Utc::now();

        for offset in [5, 45] {
            let at = (now + Duration::days(offset)).to_rfc3339();
            create_conference(&state, &owner, create_request(&at, 5)).await.unwrap();
        }

        assert_eq!(upcoming_conferences(&state, None, now).await.unwrap().len(), 1);
        assert_eq!(upcoming_conferences(&state, Some("60"), now).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_blocked_by_active_booking() {
        let store = MemoryStore::new();
        let state = state(&store);
        let owner = organizer();
        let customer = Identity {
            user_id: Uuid::new_v4(),
            role: Role::Customer,
        };
        let conference = create_conference(&state, &owner, create_request("2030-01-01T10:00:00Z", 5))
            .await
            .unwrap();

        bookings::create_booking(
            &state,
            &customer,
            CreateBookingRequest {
                conference_id: conference.id,
                tickets_booked: 2,
            },
            Utc::now(),
        )
        .await
        .unwrap();

        let err = delete_conference(&state, &owner, conference.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(store.conference_by_id(conference.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_without_bookings() {
        let store = MemoryStore::new();
        let state = state(&store);
        let owner = organizer();
        let conference = create_conference(&state, &owner, create_request("2030-01-01T10:00:00Z", 5))
            .await
            .unwrap();

        delete_conference(&state, &owner, conference.id).await.unwrap();
        assert!(matches!(
            get_conference(&state, conference.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
