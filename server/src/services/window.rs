//! Time gate for changes to bookings and tickets.

use chrono::{DateTime, Duration, Utc};

use crate::utils::error::AppError;

pub const MUTABILITY_WINDOW_HOURS: i64 = 4;

pub fn mutability_window() -> Duration {
    Duration::hours(MUTABILITY_WINDOW_HOURS)
}

/// Inclusive at the boundary: a change exactly `window` after creation is
/// still allowed.
pub fn allowed(created_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now - created_at <= window
}

pub fn ensure_mutable(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AppError> {
    if allowed(created_at, now, mutability_window()) {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "window expired: changes are only allowed within {MUTABILITY_WINDOW_HOURS} hours of booking"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_boundaries() {
        let created = Utc::now();
        let window = mutability_window();

        assert!(allowed(created, created, window));
        assert!(allowed(created, created + window - Duration::seconds(1), window));
        assert!(allowed(created, created + window, window));
        assert!(!allowed(created, created + window + Duration::seconds(1), window));
    }

    #[test]
    fn test_expired_window_is_a_conflict() {
        let created = Utc::now() - Duration::hours(5);
        assert!(matches!(
            ensure_mutable(created, Utc::now()),
            Err(AppError::Conflict(msg)) if msg.starts_with("window expired")
        ));
    }
}
