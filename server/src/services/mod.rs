//! Domain operations. Handlers authenticate and decode; everything that
//! decides, locks or writes lives here.

pub mod bookings;
pub mod conferences;
pub mod ledger;
pub mod tickets;
pub mod users;
pub mod window;

use std::future::Future;
use std::time::Duration;

use crate::utils::error::AppError;

/// Bounds a unit of work. On expiry the future is dropped, which rolls back
/// whatever it had started.
pub async fn with_timeout<F, T>(limit: Duration, work: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(limit, work).await.map_err(|_| {
        AppError::ServiceUnavailable("the request timed out, please retry".to_string())
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_is_retryable() {
        let result: Result<(), AppError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: Result<(), AppError> = with_timeout(Duration::from_secs(1), async {
            Err(AppError::Conflict("insufficient tickets".to_string()))
        })
        .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }
}
