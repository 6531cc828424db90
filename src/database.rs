//! Database query timeout helpers
//!
//! Bounds every store call so a stalled Postgres surfaces as an error
//! instead of hanging the request.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

/// Default timeout for database queries
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum TimeoutError {
    Timeout(Duration),
    Database(sqlx::Error),
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutError::Timeout(after) => {
                write!(f, "Database operation timed out after {:?}", after)
            }
            TimeoutError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for TimeoutError {}

impl From<TimeoutError> for AppError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Timeout(_) => AppError::StoreUnavailable(err.to_string()),
            TimeoutError::Database(e) => AppError::from(e),
        }
    }
}

/// Execute a query with timeout
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(TimeoutError::Database(e)),
        Err(_) => Err(TimeoutError::Timeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_timeout() {
        let result = with_timeout(Duration::from_millis(100), async { Ok::<_, sqlx::Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_stalled_call_becomes_store_unavailable() {
        let stalled = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, sqlx::Error>(())
        };

        let err = with_timeout(Duration::from_millis(10), stalled).await.unwrap_err();
        assert!(matches!(err, TimeoutError::Timeout(_)));
        assert!(matches!(AppError::from(err), AppError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_database_error_passes_through() {
        let result = with_timeout(DEFAULT_QUERY_TIMEOUT, async {
            Err::<(), _>(sqlx::Error::RowNotFound)
        })
        .await;

        assert!(matches!(AppError::from(result.unwrap_err()), AppError::Database(_)));
    }
}
