/// Error types for Listing Service
///
/// Cache and database failures surface as 503 so clients retry instead of
/// treating an outage as an empty listing.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use ranked_cache::CacheError;
use thiserror::Error;

/// Result type for listing-service operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Seconds clients are told to wait before retrying a 503.
const RETRY_AFTER_SECS: &str = "1";

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Task queue error: {0}")]
    Queue(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the client may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status_code(), StatusCode::SERVICE_UNAVAILABLE)
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Cache(err) => match err {
                CacheError::LockTimeout { .. }
                | CacheError::StoreUnavailable(_)
                | CacheError::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                CacheError::InconsistentSortMode(_) => StatusCode::BAD_REQUEST,
                CacheError::Serialization(_) | CacheError::InvalidData(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::Database(_) | AppError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let retryable = self.is_retryable();

        let mut builder = HttpResponse::build(status);
        if retryable {
            builder.insert_header(("Retry-After", RETRY_AFTER_SECS));
        }
        builder.json(serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "retryable": retryable,
        }))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Queue(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
