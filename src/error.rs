use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use std::fmt;

/// Application-wide error type. Variants map onto the error taxonomy in
/// the ingestion design: transient transport failures are retried by the
/// caller, rate limits and verification failures are never silently
/// swallowed, and invariant violations are rejected at the API boundary.
#[derive(Debug)]
pub enum AppError {
    DatabaseError(String),
    ValidationError(String),
    AuthError(String),
    NotFound(String),
    InternalError(String),
    /// Timeout, 5xx, connection reset on a Reddit call. Retriable.
    TransientTransport(String),
    /// 429 or `remaining == 0` observed on a Reddit call. Not counted
    /// against a worker's `max_retries`.
    RateLimited { retry_after_secs: u64 },
    /// 401/403 on an authenticated Reddit call.
    AuthFailure(String),
    /// `verify_comments_present` returned 0 when comments were expected.
    VerificationFailed { post_id: String },
    /// Primary-subreddit removal, subreddit list over the 100 cap, etc.
    InvariantViolation(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::AuthError(msg) => write!(f, "Authentication error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::TransientTransport(msg) => write!(f, "Transient transport error: {}", msg),
            AppError::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited, retry after {}s", retry_after_secs)
            }
            AppError::AuthFailure(msg) => write!(f, "Reddit auth failure: {}", msg),
            AppError::VerificationFailed { post_id } => {
                write!(f, "Verification failed for post {}", post_id)
            }
            AppError::InvariantViolation(msg) => write!(f, "Invariant violation: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Transient transport, rate-limit, and verification failures are
    /// retriable; auth failures, invariant violations, and 404-shaped
    /// not-found errors are not.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AppError::TransientTransport(_) | AppError::RateLimited { .. }
        )
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            AppError::TransientTransport(e.to_string())
        } else if let Some(status) = e.status() {
            if status.as_u16() == 429 {
                AppError::RateLimited { retry_after_secs: 60 }
            } else if status.as_u16() == 401 || status.as_u16() == 403 {
                AppError::AuthFailure(e.to_string())
            } else if status.is_server_error() {
                AppError::TransientTransport(e.to_string())
            } else {
                AppError::InternalError(e.to_string())
            }
        } else {
            AppError::TransientTransport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::InternalError(format!("JSON error: {}", e))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::InternalError(format!("IO error: {}", e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::DatabaseError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::TransientTransport(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("rate limited, retry after {}s", retry_after_secs),
            ),
            AppError::AuthFailure(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::VerificationFailed { post_id } => (
                StatusCode::CONFLICT,
                format!("verification failed for post {}", post_id),
            ),
            AppError::InvariantViolation(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

// Convenient Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;
